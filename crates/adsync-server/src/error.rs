use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use adsync_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::CycleInProgress => (StatusCode::CONFLICT, "cycle_in_progress"),
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::AuthError(_) => (StatusCode::BAD_GATEWAY, "upstream_auth_error"),
            AppError::ApiError { .. } | AppError::HttpError(_) | AppError::NetworkError(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AppError::StorageWriteError(_) => (StatusCode::BAD_GATEWAY, "storage_error"),
            AppError::LoadJobError(_) => (StatusCode::BAD_GATEWAY, "load_job_error"),
            AppError::TranslationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "translation_error"),
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Generic(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(AppError::CycleInProgress).classify().0, StatusCode::CONFLICT);
        assert_eq!(
            ApiError(AppError::RateLimitExceeded).classify().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError(AppError::AuthError("expired".into())).classify().0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(AppError::TranslationError("depth".into())).classify(),
            (StatusCode::INTERNAL_SERVER_ERROR, "translation_error")
        );
    }
}
