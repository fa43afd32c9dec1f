use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A duplex connection that yields newline-terminated lines.
///
/// Lines may arrive at any time, including between a command write and its
/// matching response. Implementations strip the `\n` terminator and an
/// optional preceding `\r`.
pub trait LineTransport {
    /// Write raw bytes to the link.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read the next complete line, waiting at most `timeout`.
    ///
    /// `Ok(None)` means no complete line arrived in time. It is not
    /// end-of-stream; that is reported as [`TransportError::Closed`].
    ///
    /// [`TransportError::Closed`]: crate::TransportError::Closed
    fn read_line(&mut self, timeout: Duration) -> Result<Option<Bytes>>;
}

impl<T: LineTransport + ?Sized> LineTransport for Box<T> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(bytes)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).read_line(timeout)
    }
}

impl<T: LineTransport + ?Sized> LineTransport for &mut T {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(bytes)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).read_line(timeout)
    }
}

/// A byte link whose blocking reads can be bounded.
///
/// Reads that hit the bound must fail with `WouldBlock` or `TimedOut`.
pub trait ReadTimeout {
    /// Bound subsequent blocking reads to `timeout`.
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

// Sockets reject a zero timeout.
fn at_least_one_ms(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

#[cfg(unix)]
impl ReadTimeout for std::os::unix::net::UnixStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, Some(at_least_one_ms(timeout)))
    }
}

impl ReadTimeout for std::net::TcpStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, Some(at_least_one_ms(timeout)))
    }
}
