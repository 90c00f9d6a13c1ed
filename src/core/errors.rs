use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("Could not read {file}: {reason}")]
    UnreadableDocument { file: String, reason: String },
    #[error("Could not extract sufficient text from {0}")]
    NoTextExtracted(String),
    #[error("Google API request failed with status {status}: {body}")]
    GoogleApi { status: u16, body: String },
    #[error("{channel} request failed with status {status}: {body}")]
    NotificationApi {
        channel: String,
        status: u16,
        body: String,
    },
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("Role not found: {0}")]
    RoleNotFound(String),
    #[error("Candidate row not found: {0}")]
    RowNotFound(usize),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::GoogleApi { status, .. } | CoreError::NotificationApi { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}
