//! Line-oriented transport for the micro:bit serial bridge.
//!
//! The bridge speaks newline-terminated ASCII over a USB-serial link. This
//! crate is the lowest layer: it turns any byte stream with read timeouts
//! into a [`LineTransport`] that yields complete lines and accepts raw
//! writes.
//!
//! - [`LineStream`] buffers a `Read + Write` link and splits it into lines
//! - `serial` (behind the `serial` feature) opens real serial ports and
//!   discovers the bridge by USB vendor/product id

pub mod error;
pub mod stream;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use stream::{split_line, LineStream, DEFAULT_MAX_LINE};
pub use traits::{LineTransport, ReadTimeout};

#[cfg(feature = "serial")]
pub use serial::{
    find_port, list_ports, open_serial, PortInfo, SerialConfig, SerialLink, DEFAULT_BAUD_RATE,
    MICROBIT_PID, MICROBIT_VID,
};
