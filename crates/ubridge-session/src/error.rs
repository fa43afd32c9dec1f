use std::fmt;
use std::time::Duration;

/// Rejection code carried by an `ERROR[<code>]` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// `1`: the argument was not acceptable (generic failure).
    InvalidArgument,
    /// `2`: the argument was outside the accepted range.
    OutOfRange,
    Other(u32),
}

impl DeviceErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => DeviceErrorCode::InvalidArgument,
            2 => DeviceErrorCode::OutOfRange,
            other => DeviceErrorCode::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            DeviceErrorCode::InvalidArgument => 1,
            DeviceErrorCode::OutOfRange => 2,
            DeviceErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErrorCode::InvalidArgument => write!(f, "ERROR[1] (invalid argument)"),
            DeviceErrorCode::OutOfRange => write!(f, "ERROR[2] (out of range)"),
            DeviceErrorCode::Other(code) => write!(f, "ERROR[{code}]"),
        }
    }
}

/// Errors that can occur during a bridge session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ubridge_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ubridge_frame::FrameError),

    /// No matching response arrived before the deadline.
    #[error("no response to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// A line that is neither the expected response nor periodic data.
    #[error("protocol violation while waiting for '{command}': unexpected line '{line}'")]
    ProtocolViolation { command: String, line: String },

    /// The device answered with `ERROR[<code>]`.
    #[error("device rejected '{command}' with {code}")]
    DeviceRejected {
        command: String,
        code: DeviceErrorCode,
    },

    /// Periodic frames arrived during a command that does not tolerate them.
    #[error("{count} periodic frame(s) received while waiting for '{command}'")]
    UnexpectedPeriodic { command: String, count: usize },

    /// The response name or value differed from what the command requires.
    #[error("unexpected response to '{command}': expected '{expected}', got '{actual}'")]
    UnexpectedValue {
        command: String,
        expected: String,
        actual: String,
    },

    /// An argument failed local validation; nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A command was issued while another is awaiting its response.
    #[error("another exchange is already in flight")]
    ExchangeInFlight,

    /// `complete` was called with nothing pending.
    #[error("no exchange is pending")]
    NoExchangePending,

    /// A previous violation left the link in an unknown state.
    #[error("connection is suspect after a protocol violation; resync first")]
    ConnectionSuspect,
}

pub type Result<T> = std::result::Result<T, SessionError>;
