use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("webhook secret not configured")]
    MissingSecret,

    #[error("provider: {0}")]
    Provider(String),

    #[error("not found: {0}")]
    NotFound(String),
}
