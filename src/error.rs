use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::hub::ClientId;

/// Caller-attributable hub errors, returned synchronously from subscribe
/// calls. Background machinery never produces these.
#[derive(Debug, Error)]
pub enum HubError {
    /// The client is not registered
    #[error("client {0} is not registered")]
    UnknownClient(ClientId),

    /// The client already holds the per-client subscription cap
    #[error("client {0} reached its subscription limit")]
    SubscriptionLimitExceeded(ClientId),
}

impl HubError {
    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::UnknownClient(_) => "UNKNOWN_CLIENT",
            HubError::SubscriptionLimitExceeded(_) => "SUBSCRIPTION_LIMIT_EXCEEDED",
        }
    }
}

/// Upstream watch connection failures. Handled internally by the
/// reconnect machinery; self-healed or converted into a single
/// `watch-error` event, never returned to hub callers.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Request errors
    #[error("watch request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success response from the watch endpoint
    #[error("watch endpoint returned HTTP {0}")]
    Status(u16),

    /// Stream read errors
    #[error("watch stream read failed: {0}")]
    Read(String),
}

/// Application error types for the HTTP surface
#[derive(Debug, Error)]
pub enum AppError {
    /// Registration refused at the client cap
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Hub errors
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Hub(HubError::UnknownClient(_)) => StatusCode::NOT_FOUND,
            AppError::Hub(HubError::SubscriptionLimitExceeded(_)) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            AppError::Hub(e) => e.error_code(),
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        tracing::error!(
            error_code = error_code,
            status_code = status.as_u16(),
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
