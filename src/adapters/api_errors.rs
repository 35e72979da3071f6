use crate::domain::error::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// HTTP face of `PipelineError`. Providers only ever see `{"error": "..."}`.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PipelineError::WebhookSignature(_) => {
                (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
            }
            PipelineError::MalformedPayload(_) => {
                (StatusCode::BAD_REQUEST, "Invalid payload".to_string())
            }
            PipelineError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PipelineError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            PipelineError::MissingSecret => {
                tracing::error!("webhook secret not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook secret not configured".to_string(),
                )
            }
            PipelineError::Provider(err) => {
                tracing::warn!("provider error: {err}");
                (StatusCode::BAD_GATEWAY, "provider error".to_string())
            }
            PipelineError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            PipelineError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
