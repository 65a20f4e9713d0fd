use thiserror::Error;

/// §7 K1/K2: every CRM gateway verb returns this discriminant instead of panicking or
/// retrying internally. The orchestrator matches on it and always proceeds to the next
/// state-machine step regardless of outcome (§7 propagation policy).
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("transport error contacting CRM: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("CRM returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("CRM response had no `result` field: {error}: {description}")]
    Semantic { error: String, description: String },

    #[error("CRM response body was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("recording file not found or unreadable: {0}")]
    MissingRecording(String),

    #[error("CRM did not return an upload URL for the attach-record request")]
    MissingUploadUrl,
}
