use thiserror::Error;

#[derive(Error, Debug)]
pub enum CathodeError {
    /// A sequence handed to the serializer that it cannot encode. External
    /// input never produces this; unrecognized input becomes a token.
    #[error("malformed sequence: {0}")]
    MalformedSequence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("replay error: {0}")]
    Replay(String),

    /// A widget-tree fault that escaped because the rescue wrapper was
    /// disabled.
    #[error("widget tree fault: {0}")]
    Rescue(String),
}

pub type Result<T> = std::result::Result<T, CathodeError>;
