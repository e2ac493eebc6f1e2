use std::time::Duration;

use adsync_core::error::AppError;
use reqwest::{Client, Response};
use serde::Deserialize;

pub(crate) const USER_AGENT: &str = concat!("adsync/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

/// Map a transport-level reqwest failure.
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

// ---- Google API error envelope ----

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into an error, reading Google's
/// `{"error": {"message": ...}}` envelope when present.
pub(crate) async fn status_error(response: Response) -> AppError {
    let status_code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

    classify(status_code, message)
}

pub(crate) fn classify(status_code: u16, message: String) -> AppError {
    match status_code {
        401 | 403 => AppError::AuthError(message),
        429 => AppError::RateLimitExceeded,
        _ => AppError::ApiError {
            message,
            status_code,
            retryable: status_code >= 500,
        },
    }
}
