use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Invalid backend response: {0}")]
    ParseError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Backend error: {code} - {message}")]
    RemoteError { code: String, message: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => BackendError::NotFound(err.to_string()),
            other => BackendError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::ParseError(err.to_string())
    }
}
