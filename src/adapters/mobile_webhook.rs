use {
    crate::{
        AppState,
        adapters::{
            api_errors::ApiError, normalize::normalize, signature::verify_hmac_sha256,
            stripe_webhook::header_value,
        },
        domain::{audit::NewWebhookRecord, error::PipelineError, provider::Provider},
        services::payment_pipeline::{archive, archive_rejected, payload_from_body, process_webhook_event},
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    serde_json::{Value, json},
};

const GATEWAY_SIGNATURE_HEADERS: [&str; 2] = ["X-Signature-Hmac", "X-Signature"];
const MOBILE_MONEY_SIGNATURE_HEADERS: [&str; 2] =
    ["X-MobileMoney-Signature-Hmac", "X-MobileMoney-Signature"];

#[tracing::instrument(name = "webhook.mobile_gateway", skip_all)]
pub async fn mobile_gateway_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = header_value(&headers, &GATEWAY_SIGNATURE_HEADERS);
    let secret = state.pesapal_webhook_secret.as_deref();
    handle_hmac_webhook(&state, Provider::MobileGateway, secret, signature, &body).await
}

#[tracing::instrument(name = "webhook.mobile_money", skip_all)]
pub async fn mobile_money_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = header_value(&headers, &MOBILE_MONEY_SIGNATURE_HEADERS);
    let secret = state.mobile_money_webhook_secret.as_deref();
    handle_hmac_webhook(&state, Provider::MobileMoney, secret, signature, &body).await
}

/// Shared path for the HMAC-signed providers. No secret configured means every
/// delivery is rejected.
async fn handle_hmac_webhook(
    state: &AppState,
    provider: Provider,
    secret: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
) -> Result<Json<Value>, ApiError> {
    if !verify_hmac_sha256(secret, body, signature) {
        tracing::warn!(
            %provider,
            secret_configured = secret.is_some(),
            signature_present = signature.is_some(),
            "webhook signature rejected"
        );
        if let Err(e) = archive_rejected(&state.pool, provider, body).await {
            tracing::error!(%provider, error = %e, "could not audit rejected webhook");
        }
        return Err(PipelineError::WebhookSignature(format!("{provider} hmac mismatch")).into());
    }

    let payload = payload_from_body(body);
    if !payload.is_object() {
        tracing::warn!(%provider, "signed webhook body is not a json object");
        archive(
            &state.pool,
            NewWebhookRecord::new(provider.as_str(), payload).signature(true),
        )
        .await?;
        return Err(PipelineError::MalformedPayload("expected a json object".into()).into());
    }

    match normalize(provider, &payload) {
        Some(event) => {
            process_webhook_event(&state.pool, &event, payload).await?;
        }
        None => {
            archive(
                &state.pool,
                NewWebhookRecord::new(provider.as_str(), payload).signature(true),
            )
            .await?;
        }
    }
    Ok(Json(json!({ "status": "ok" })))
}
