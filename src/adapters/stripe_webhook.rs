use {
    crate::{
        AppState,
        adapters::{api_errors::ApiError, normalize::normalize, signature::verify_card_event},
        domain::{audit::NewWebhookRecord, error::PipelineError, provider::Provider},
        services::payment_pipeline::{
            archive, archive_rejected, payload_from_body, process_webhook_event,
        },
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    serde_json::{Value, json},
};

const SIGNATURE_HEADERS: [&str; 2] = ["Stripe-Signature", "X-Signature"];

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
}

/// Card processor webhook. The SDK verifies the signature; financial events
/// go through the ledger, everything else is archived and acknowledged.
#[tracing::instrument(
    name = "webhook.card",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn card_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(secret) = state.stripe_webhook_secret.as_deref() else {
        return Err(PipelineError::MissingSecret.into());
    };

    let signature = header_value(&headers, &SIGNATURE_HEADERS);
    if let Err(e) = verify_card_event(&body, signature, secret) {
        tracing::warn!(error = %e, "card webhook rejected");
        if let Err(audit_err) = archive_rejected(&state.pool, Provider::Card, &body).await {
            tracing::error!(error = %audit_err, "could not audit rejected card webhook");
        }
        return Err(e.into());
    }

    let raw_event = payload_from_body(&body);
    let event_type = raw_event
        .get("type")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let event_id = raw_event
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    tracing::Span::current()
        .record("event_id", tracing::field::debug(&event_id))
        .record("event_type", tracing::field::debug(&event_type));

    let Some(event) = normalize(Provider::Card, &raw_event) else {
        let mut record = NewWebhookRecord::new(Provider::Card.as_str(), raw_event)
            .event_id(event_id)
            .signature(true);
        record.event_type = event_type;
        archive(&state.pool, record).await?;
        tracing::info!("card event without financial data, archived");
        return Ok(Json(json!({ "received": true })));
    };

    process_webhook_event(&state.pool, &event, raw_event).await?;
    Ok(Json(json!({ "status": "ok" })))
}
