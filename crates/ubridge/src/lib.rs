//! Host-side client for the micro:bit serial bridge.
//!
//! The bridge is a micro:bit that speaks a line-oriented, correlation-tagged
//! command/response protocol over USB serial while also streaming periodic
//! sensor telemetry. This crate re-exports the layers that implement it.
//!
//! # Crate Structure
//!
//! - [`transport`]: line transport over serial ports or any byte stream
//! - [`frame`]: wire grammar (correlation ids, commands, responses, periodic frames)
//! - [`session`]: correlation engine, command catalog, handshake, simulator

/// Re-export transport types.
pub mod transport {
    pub use ubridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ubridge_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use ubridge_session::*;
}
