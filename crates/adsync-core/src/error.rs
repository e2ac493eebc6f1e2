use thiserror::Error;

/// Application-wide error types for adsync.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A remote API answered with an error status.
    #[error("API error (HTTP {status_code}): {message}")]
    ApiError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Credentials were rejected or could not be exchanged for a token.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Quota or rate limit exceeded on the ads platform.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The wire schema could not be mapped to a warehouse schema.
    #[error("Schema translation error: {0}")]
    TranslationError(String),

    /// Writing a staged blob to object storage failed.
    #[error("Storage write error: {0}")]
    StorageWriteError(String),

    /// A warehouse load job failed or could not be observed.
    #[error("Load job error: {0}")]
    LoadJobError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A full refresh cycle is already running in this process.
    #[error("A refresh cycle is already in progress")]
    CycleInProgress,

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth redelivering.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::ApiError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error must abort the whole stage instead of a
    /// single account's task.
    pub fn is_fatal_for_stage(&self) -> bool {
        matches!(self, AppError::TranslationError(_))
    }
}
