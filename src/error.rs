use thiserror::Error;

/// Fatal errors that abort startup or force the daemon to exit.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("AMI login rejected: {0}")]
    AmiLoginRejected(String),

    #[error("AMI transport error: {0}")]
    Ami(#[from] crate::pbx::AmiError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
