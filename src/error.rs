use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure reported by a generation backend.
///
/// Cloneable so a single failed call can be handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("no healthy backend available")]
    NoHealthyUpstream,

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    Decode(String),

    #[error("generation queue unavailable")]
    QueueClosed,

    #[error("{0}")]
    Other(String),
}

/// Errors that cross the HTTP boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Generation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Model is still loading")]
    NotReady,

    #[error("Invalid request: {}", .0.body_text())]
    InvalidRequest(#[from] JsonRejection),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] prometheus::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Backend(_) | GatewayError::Telemetry(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidRequest(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            GatewayError::Backend(e) => tracing::warn!(error = %e, "generation failed"),
            GatewayError::Telemetry(e) => tracing::error!(error = %e, "telemetry error"),
            GatewayError::NotReady => tracing::debug!("rejecting request, backend not ready"),
            GatewayError::InvalidRequest(e) => tracing::debug!(error = %e, "rejecting malformed body"),
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failure_carries_reason() {
        let err = GatewayError::from(BackendError::Other("out of memory".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Generation failed: out of memory");
    }

    #[test]
    fn missing_content_type_keeps_rejection_status() {
        let err = GatewayError::from(JsonRejection::from(
            axum::extract::rejection::MissingJsonContentType::default(),
        ));
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(err.to_string().starts_with("Invalid request:"));
    }

    #[test]
    fn not_ready_is_service_unavailable() {
        assert_eq!(GatewayError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
