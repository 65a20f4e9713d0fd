use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("malformed event block: {0}")]
    MalformedEvent(String),

    #[error("failed to send action through channel")]
    SendError,

    #[error("action timed out waiting for a response")]
    ResponseTimeout,
}
