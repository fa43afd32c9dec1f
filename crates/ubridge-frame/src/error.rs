/// Errors that can occur while encoding or decoding bridge frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A correlation id was empty, too long, or not uppercase hex.
    #[error("invalid correlation id '{0}' (expected 1-8 uppercase hex characters)")]
    InvalidCorrelationId(String),

    /// A command name contained characters outside `A-Z0-9`.
    #[error("invalid command name '{0}'")]
    InvalidCommandName(String),

    /// A line is not a `C[id]NAME[args]` command.
    #[error("not a command frame: '{0}'")]
    InvalidCommand(String),

    /// Command arguments contained a line terminator or non-printable byte.
    #[error("invalid command arguments '{0}'")]
    InvalidArguments(String),

    /// A line did not follow the response grammar.
    #[error("invalid response frame: {0}")]
    InvalidResponse(String),

    /// A compact periodic record had the wrong length or bad digits.
    #[error("invalid compact record: {0}")]
    InvalidCompactRecord(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
