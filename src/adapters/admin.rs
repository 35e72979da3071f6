use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{audit::WebhookRecord, error::PipelineError},
        infra::postgres::{payment_repo, webhook_repo},
        services::reconciliation::{self, BatchReport, ManualStatus, SweepOptions},
    },
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, Request, State},
        http::{StatusCode, header},
        middleware::{self, Next},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    chrono::Utc,
    serde::Deserialize,
    uuid::Uuid,
};

const DEFAULT_ACTOR: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub payment_ids: Vec<Uuid>,
    #[serde(default)]
    pub actor: Option<String>,
}

impl BulkRequest {
    fn actor(&self) -> &str {
        self.actor
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ACTOR)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    pub staleness_minutes: Option<i64>,
    pub batch_limit: Option<i64>,
}

/// Operator routes, all behind the bearer token.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/payments/mark-refunded", post(mark_refunded))
        .route("/payments/mark-failed", post(mark_failed))
        .route("/payments/reconcile-from-audit", post(reconcile_from_audit))
        .route("/payments/reconcile-with-provider", post(reconcile_with_provider))
        .route("/payments/sweep", post(sweep))
        .route("/payments/{id}/webhooks", get(payment_webhooks))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

async fn require_admin_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (state.admin_token.as_deref(), provided) {
        (Some(expected), Some(provided)) if expected == provided.trim() => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "admin request rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "unauthorized" })),
            )
                .into_response()
        }
    }
}

async fn mark_refunded(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report =
        reconciliation::mark_status(&state.pool, &req.payment_ids, ManualStatus::Refunded, req.actor())
            .await?;
    Ok(Json(report))
}

async fn mark_failed(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report =
        reconciliation::mark_status(&state.pool, &req.payment_ids, ManualStatus::Failed, req.actor())
            .await?;
    Ok(Json(report))
}

async fn reconcile_from_audit(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report =
        reconciliation::reconcile_from_audit(&state.pool, &req.payment_ids, req.actor()).await?;
    Ok(Json(report))
}

async fn reconcile_with_provider(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = reconciliation::reconcile_with_provider(
        &state.pool,
        &state.providers,
        &req.payment_ids,
        req.actor(),
    )
    .await?;
    Ok(Json(report))
}

/// The body is optional; an empty one runs with the configured defaults.
async fn sweep(State(state): State<AppState>, body: Bytes) -> Result<Json<BatchReport>, ApiError> {
    let req: SweepRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SweepRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| PipelineError::Validation(format!("invalid sweep request: {e}")))?
    };
    let opts = SweepOptions {
        staleness_minutes: req.staleness_minutes.unwrap_or(state.sweep.staleness_minutes),
        batch_limit: req.batch_limit.unwrap_or(state.sweep.batch_limit),
    };
    let report =
        reconciliation::sweep_stale_payments(&state.pool, &state.providers, opts, Utc::now())
            .await?;
    Ok(Json(report))
}

async fn payment_webhooks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WebhookRecord>>, ApiError> {
    if payment_repo::get(&state.pool, id).await?.is_none() {
        return Err(PipelineError::NotFound(format!("payment {id}")).into());
    }
    let rows = webhook_repo::list_for_payment(&state.pool, id).await?;
    Ok(Json(rows))
}
