use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Queue write failed: {0}")]
    QueueWrite(#[source] StoreError),

    #[error("Malformed entry at {key}: {source}")]
    MalformedEntry {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Publish failed: {0}")]
    PublishFailed(#[source] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<StoreError> for NotificationError {
    fn from(err: StoreError) -> Self {
        NotificationError::StoreUnavailable(err)
    }
}

impl NotificationError {
    /// Stable machine-readable code, also used as a log field
    pub fn code(&self) -> &'static str {
        match self {
            NotificationError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            NotificationError::QueueWrite(_) => "QUEUE_WRITE_ERROR",
            NotificationError::MalformedEntry { .. } => "MALFORMED_ENTRY",
            NotificationError::InvalidEvent(_) => "INVALID_EVENT",
            NotificationError::InvalidKey(_) => "INVALID_KEY",
            NotificationError::PublishFailed(_) => "PUBLISH_FAILED",
            NotificationError::Serialization(_) => "SERIALIZATION_ERROR",
            NotificationError::Config(_) => "CONFIG_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            NotificationError::InvalidEvent(_) | NotificationError::InvalidKey(_) => {
                StatusCode::BAD_REQUEST
            }
            NotificationError::StoreUnavailable(_) | NotificationError::QueueWrite(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            NotificationError::MalformedEntry { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            NotificationError::PublishFailed(_)
            | NotificationError::Serialization(_)
            | NotificationError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let log_message = self.to_string();

        // Precondition failures are the caller's to fix, keep them verbatim
        let client_message = match &self {
            NotificationError::InvalidEvent(_) | NotificationError::InvalidKey(_) => {
                log_message.clone()
            }
            NotificationError::StoreUnavailable(_) | NotificationError::QueueWrite(_)
                if is_production() =>
            {
                "Service temporarily unavailable".to_string()
            }
            _ if is_production() => "Internal server error".to_string(),
            _ => log_message.clone(),
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
