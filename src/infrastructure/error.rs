use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("Not logged in: calendar credentials are missing")]
    AuthMissing,
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
    #[error("Unparsable event time: {0}")]
    ParseFailed(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Calendar engine has stopped")]
    EngineStopped,
}

impl InfraError {
    /// Fetch-level errors that should present the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::AuthMissing)
    }
}
