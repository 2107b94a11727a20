use crate::domain::error::{PipelineError, VerificationError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// HTTP face of [`PipelineError`]. The provider only reads the status code:
/// 4xx for payloads that will never verify or parse, 5xx for anything a
/// redelivery might fix.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        Self(err.into())
    }
}

fn internal(err: &PipelineError) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, retryable = err.is_retryable(), "webhook processing failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PipelineError::Verification(VerificationError::NotConfigured)
            | PipelineError::NotConfigured(_) => {
                tracing::error!(error = %self.0, "webhook received but not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "not_configured",
                    self.0.to_string(),
                )
            }
            PipelineError::Verification(err) => {
                tracing::warn!(error = %err, "rejected webhook");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_error",
                    format!("Webhook Error: {err}"),
                )
            }
            PipelineError::Payload(msg) | PipelineError::Validation(msg) => {
                tracing::warn!(error = %msg, "rejected webhook payload");
                (StatusCode::BAD_REQUEST, "invalid_payload", msg.clone())
            }
            PipelineError::Serialization(err) => {
                tracing::warn!(error = %err, "rejected webhook payload");
                (StatusCode::BAD_REQUEST, "invalid_payload", err.to_string())
            }
            PipelineError::SessionNotFound(_) | PipelineError::SessionMetadataMissing { .. } => {
                tracing::error!(error = %self.0, "unresolvable payment correlation");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "unresolvable_event",
                    self.0.to_string(),
                )
            }
            PipelineError::PurchaseNotFound(_)
            | PipelineError::UserNotFound(_)
            | PipelineError::CourseNotFound(_) => {
                tracing::warn!(error = %self.0, "referenced record missing, awaiting redelivery");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "record_not_found",
                    self.0.to_string(),
                )
            }
            err @ (PipelineError::Store(_)
            | PipelineError::Provider(_)
            | PipelineError::Internal(_)) => internal(err),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
