/// Errors that can occur on the bridge transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// No port matched the requested USB vendor/product id.
    #[error("no serial port found for USB device {vid:04x}:{pid:04x}")]
    NotFound { vid: u16, pid: u16 },

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link reached end-of-stream.
    #[error("transport closed")]
    Closed,

    /// A line grew past the configured maximum without a terminator.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
