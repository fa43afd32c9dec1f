//! Wire grammar of the micro:bit serial bridge.
//!
//! Every frame is one newline-terminated ASCII line:
//! - `C[<id>]<NAME>[<args>]` commands sent by the host
//! - `R[<id>]<NAME>[<value>]` responses, optionally behind `t[...]` diagnostics
//! - `P...` periodic telemetry, readable or compact
//!
//! This crate is pure: it builds and classifies lines, it never touches I/O.

pub mod codec;
pub mod error;
pub mod id;
pub mod periodic;

pub use codec::{
    classify, encode_command, parse_body, parse_error_value, CommandFrame, FrameKind,
    ResponseFrame, ResponseValue, ERROR_NAME,
};
pub use error::{FrameError, Result};
pub use id::{CorrelationId, IdGenerator, IdLengthPolicy, MAX_ID_LEN, MIN_ID_LEN};
pub use periodic::{
    parse_fields, CompactRecord, Field, PeriodicFrame, PeriodicLayout, COMPACT_RECORD_LEN,
};
