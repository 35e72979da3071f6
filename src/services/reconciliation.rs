use {
    crate::adapters::normalize::{map_gateway_response, status_from_stored_payload},
    crate::domain::{
        audit::{NewWebhookRecord, Trigger},
        error::PipelineError,
        id::ExternalId,
        payment::{Payment, PaymentStatus},
        provider::{Provider, ProviderClients},
    },
    crate::infra::postgres::{payment_repo, webhook_repo},
    crate::services::payment_pipeline::{LedgerWrite, commit},
    chrono::{DateTime, TimeDelta, Utc},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    sqlx::PgPool,
    std::collections::HashSet,
    uuid::Uuid,
};

/// Per-batch counters returned to operators. `reconciled` only counts
/// payments whose stored status actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub reconciled: usize,
    pub noop: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Reconciled,
    Noop,
    Error,
}

impl BatchReport {
    fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Reconciled => self.reconciled += 1,
            ItemOutcome::Noop => self.noop += 1,
            ItemOutcome::Error => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    pub staleness_minutes: i64,
    pub batch_limit: i64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            staleness_minutes: 10,
            batch_limit: 200,
        }
    }
}

impl SweepOptions {
    /// Oldest `updated_at` a payment may have and still be left alone.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, PipelineError> {
        TimeDelta::try_minutes(self.staleness_minutes.max(0))
            .and_then(|staleness| now.checked_sub_signed(staleness))
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "staleness_minutes out of range, got: {}",
                    self.staleness_minutes
                ))
            })
    }
}

/// Operator-chosen status override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualStatus {
    Refunded,
    Failed,
}

impl ManualStatus {
    fn status(self) -> PaymentStatus {
        match self {
            Self::Refunded => PaymentStatus::refunded(),
            Self::Failed => PaymentStatus::failed(),
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::Refunded => "mark_refunded",
            Self::Failed => "mark_failed",
        }
    }
}

/// Ask each payment's provider for its authoritative status.
pub async fn reconcile_with_provider(
    pool: &PgPool,
    clients: &ProviderClients,
    payment_ids: &[Uuid],
    actor: &str,
) -> Result<BatchReport, PipelineError> {
    let payments = load_selection(pool, payment_ids).await?;
    let mut report = BatchReport::default();
    for payment in &payments {
        let outcome = reconcile_payment(pool, clients, payment, Trigger::Admin, Some(actor)).await;
        report.record(outcome);
    }
    tracing::info!(?report, actor, "provider reconciliation finished");
    Ok(report)
}

/// Scheduled self-healing pass over unsettled payments older than the
/// staleness threshold. `now` is injected so runs are reproducible.
#[tracing::instrument(
    name = "reconcile.sweep",
    skip_all,
    fields(staleness_minutes = opts.staleness_minutes, batch_limit = opts.batch_limit)
)]
pub async fn sweep_stale_payments(
    pool: &PgPool,
    clients: &ProviderClients,
    opts: SweepOptions,
    now: DateTime<Utc>,
) -> Result<BatchReport, PipelineError> {
    let cutoff = opts.cutoff(now)?;
    let stale = payment_repo::select_stale(pool, cutoff, opts.batch_limit.max(0)).await?;

    let mut report = BatchReport::default();
    if stale.is_empty() {
        tracing::debug!("no stale payments");
        return Ok(report);
    }

    for payment in &stale {
        let outcome = reconcile_payment(pool, clients, payment, Trigger::Cron, None).await;
        report.record(outcome);
    }
    tracing::info!(?report, "stale payment sweep finished");
    Ok(report)
}

/// Re-derive each payment's status from its most recent audit row, with no
/// outbound call. Every payment gets an audit row, even when nothing is known.
pub async fn reconcile_from_audit(
    pool: &PgPool,
    payment_ids: &[Uuid],
    actor: &str,
) -> Result<BatchReport, PipelineError> {
    let payments = load_selection(pool, payment_ids).await?;
    let mut report = BatchReport::default();
    for payment in &payments {
        let outcome = match reconcile_from_latest_webhook(pool, payment, actor).await {
            Ok(outcome) => outcome,
            Err(e) => item_failed(pool, payment, Trigger::Admin, Some(actor), e).await,
        };
        report.record(outcome);
    }
    tracing::info!(?report, actor, "audit-trail reconciliation finished");
    Ok(report)
}

/// Operator override to `refunded` or `failed`.
pub async fn mark_status(
    pool: &PgPool,
    payment_ids: &[Uuid],
    target: ManualStatus,
    actor: &str,
) -> Result<BatchReport, PipelineError> {
    let payments = load_selection(pool, payment_ids).await?;
    let status = target.status();
    let mut report = BatchReport::default();

    for payment in &payments {
        let provider = payment.provider.clone();
        let payload = json!({ "action": target.action(), "admin": actor });
        let write = LedgerWrite::SetStatus {
            payment_id: payment.id,
            status: &status,
        };
        let result = commit(pool, write, move |outcome| {
            let event_type = if outcome.status_changed() {
                "admin.manual_status_update"
            } else {
                "admin.manual_status_update.noop"
            };
            NewWebhookRecord::new(provider, payload)
                .event_type(event_type)
                .signature(true)
        })
        .await;

        let outcome = match result {
            Ok(outcome) if outcome.status_changed() => ItemOutcome::Reconciled,
            Ok(_) => ItemOutcome::Noop,
            Err(e) => item_failed(pool, payment, Trigger::Admin, Some(actor), e).await,
        };
        report.record(outcome);
    }

    tracing::info!(?report, actor, action = target.action(), "manual status update finished");
    Ok(report)
}

async fn load_selection(pool: &PgPool, payment_ids: &[Uuid]) -> Result<Vec<Payment>, PipelineError> {
    let mut unique = Vec::with_capacity(payment_ids.len());
    let mut seen = HashSet::new();
    for id in payment_ids {
        if seen.insert(*id) {
            unique.push(*id);
        }
    }

    let payments = payment_repo::find_by_ids(pool, &unique).await?;
    if payments.len() < unique.len() {
        let found: HashSet<Uuid> = payments.iter().map(|p| p.id).collect();
        for id in unique.iter().filter(|id| !found.contains(id)) {
            tracing::warn!(payment_id = %id, "unknown payment id, skipped");
        }
    }
    Ok(payments)
}

/// One batch item. Never fails: anything unexpected becomes an `.error` audit row.
async fn reconcile_payment(
    pool: &PgPool,
    clients: &ProviderClients,
    payment: &Payment,
    trigger: Trigger,
    actor: Option<&str>,
) -> ItemOutcome {
    let result = match Provider::parse(&payment.provider) {
        Some(Provider::Card) => reconcile_card(pool, clients, payment, trigger, actor).await,
        Some(Provider::MobileGateway) => {
            reconcile_gateway(pool, clients, payment, trigger, actor).await
        }
        _ => record_noop(pool, payment, trigger, actor, "unsupported-provider").await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => item_failed(pool, payment, trigger, actor, e).await,
    }
}

async fn reconcile_card(
    pool: &PgPool,
    clients: &ProviderClients,
    payment: &Payment,
    trigger: Trigger,
    actor: Option<&str>,
) -> Result<ItemOutcome, PipelineError> {
    let Some(card) = clients.card.as_ref() else {
        return record_noop(pool, payment, trigger, actor, "provider-credentials-missing").await;
    };
    let Some(intent_id) = payment
        .external_id
        .as_deref()
        .and_then(|id| ExternalId::new(id).ok())
    else {
        return record_noop(pool, payment, trigger, actor, "missing-external-id").await;
    };

    let provider_tag = format!("provider.{}", Provider::Card);

    match card.retrieve_intent(&intent_id).await {
        Ok(snapshot) => {
            let status = snapshot.status.as_deref().and_then(PaymentStatus::new);
            let payload = with_actor(
                json!({
                    "payment_intent": intent_id.as_str(),
                    "status": snapshot.status,
                    "amount_received": snapshot.amount_received,
                    "currency": snapshot.currency,
                    "inferred_status": status.as_ref().map(PaymentStatus::as_str),
                }),
                actor,
            );
            let record = NewWebhookRecord::new(Provider::Card.as_str(), payload)
                .event_type(trigger.tag(&provider_tag))
                .signature(true);
            apply_status(pool, payment.id, status.as_ref(), record).await
        }
        Err(e) => {
            tracing::warn!(
                payment_id = %payment.id,
                external_id = %intent_id.as_str(),
                error = %e,
                "card provider lookup failed"
            );
            let payload = json!({
                "payment_intent": intent_id.as_str(),
                "error": e.to_string(),
            });
            record_provider_error(pool, payment.id, Provider::Card, trigger, &provider_tag, payload, actor)
                .await
        }
    }
}

async fn reconcile_gateway(
    pool: &PgPool,
    clients: &ProviderClients,
    payment: &Payment,
    trigger: Trigger,
    actor: Option<&str>,
) -> Result<ItemOutcome, PipelineError> {
    let Some(gateway) = clients.mobile_gateway.as_ref() else {
        return record_noop(pool, payment, trigger, actor, "provider-credentials-missing").await;
    };
    let order_tracking_id = payment.order_tracking_id();
    let transaction_tracking_id = payment
        .external_id
        .as_deref()
        .filter(|id| !id.trim().is_empty());
    if order_tracking_id.is_none() && transaction_tracking_id.is_none() {
        return record_noop(pool, payment, trigger, actor, "missing-identifiers").await;
    }

    let provider_tag = format!("provider.{}", Provider::MobileGateway);
    let ids = json!({
        "order_tracking_id": order_tracking_id,
        "transaction_tracking_id": transaction_tracking_id,
    });

    match gateway
        .transaction_status(order_tracking_id, transaction_tracking_id)
        .await
    {
        Ok(Some(response)) => {
            let status = map_gateway_response(&response);
            let mut payload = ids;
            payload["response"] = response;
            payload["inferred_status"] = json!(status.as_ref().map(PaymentStatus::as_str));
            let record = NewWebhookRecord::new(Provider::MobileGateway.as_str(), with_actor(payload, actor))
                .event_type(trigger.tag(&provider_tag))
                .signature(true);
            apply_status(pool, payment.id, status.as_ref(), record).await
        }
        Ok(None) => {
            tracing::warn!(payment_id = %payment.id, "gateway returned no status for either identifier");
            let mut payload = ids;
            payload["response"] = Value::Null;
            payload["error"] = json!("no status returned");
            record_provider_error(
                pool,
                payment.id,
                Provider::MobileGateway,
                trigger,
                &provider_tag,
                payload,
                actor,
            )
            .await
        }
        Err(e) => {
            tracing::warn!(payment_id = %payment.id, error = %e, "gateway status lookup failed");
            let mut payload = ids;
            payload["response"] = Value::Null;
            payload["error"] = json!(e.to_string());
            record_provider_error(
                pool,
                payment.id,
                Provider::MobileGateway,
                trigger,
                &provider_tag,
                payload,
                actor,
            )
            .await
        }
    }
}

async fn reconcile_from_latest_webhook(
    pool: &PgPool,
    payment: &Payment,
    actor: &str,
) -> Result<ItemOutcome, PipelineError> {
    let Some(latest) = webhook_repo::latest_for_payment(pool, payment.id).await? else {
        let record = NewWebhookRecord::new(
            payment.provider.clone(),
            json!({ "note": "no prior webhook found", "admin": actor }),
        )
        .event_type("admin.reconcile.requested")
        .signature(true);
        commit(pool, LedgerWrite::AuditOnly { payment_id: Some(payment.id) }, move |_| record).await?;
        return Ok(ItemOutcome::Noop);
    };

    let status = status_from_stored_payload(&payment.provider, &latest.raw_payload);
    if status.is_none() {
        tracing::warn!(
            payment_id = %payment.id,
            webhook_id = %latest.id,
            event_type = ?latest.event_type,
            "could not infer status from latest webhook"
        );
    }

    let event_type = if status.is_some() {
        "admin.reconcile.applied"
    } else {
        "admin.reconcile.noop"
    };
    let record = NewWebhookRecord::new(
        payment.provider.clone(),
        json!({
            "from_webhook_id": latest.id.to_string(),
            "inferred_status": status.as_ref().map(PaymentStatus::as_str),
            "admin": actor,
        }),
    )
    .event_type(event_type)
    .signature(true);

    apply_status(pool, payment.id, status.as_ref(), record).await
}

/// Status-only ledger write plus its audit row. Amounts are never touched.
async fn apply_status(
    pool: &PgPool,
    payment_id: Uuid,
    status: Option<&PaymentStatus>,
    record: NewWebhookRecord,
) -> Result<ItemOutcome, PipelineError> {
    let write = match status {
        Some(status) => LedgerWrite::SetStatus { payment_id, status },
        None => LedgerWrite::AuditOnly {
            payment_id: Some(payment_id),
        },
    };
    let outcome = commit(pool, write, move |_| record).await?;

    if outcome.status_changed() {
        tracing::info!(%payment_id, status = ?status.map(PaymentStatus::as_str), "payment status reconciled");
        Ok(ItemOutcome::Reconciled)
    } else {
        Ok(ItemOutcome::Noop)
    }
}

async fn record_noop(
    pool: &PgPool,
    payment: &Payment,
    trigger: Trigger,
    actor: Option<&str>,
    reason: &str,
) -> Result<ItemOutcome, PipelineError> {
    tracing::debug!(payment_id = %payment.id, provider = %payment.provider, reason, "reconciliation skipped");
    let payload = with_actor(
        json!({ "reason": reason, "provider": payment.provider }),
        actor,
    );
    let record = NewWebhookRecord::new(payment.provider.clone(), payload)
        .event_type(trigger.tag("noop"))
        .signature(true);
    commit(pool, LedgerWrite::AuditOnly { payment_id: Some(payment.id) }, move |_| record).await?;
    Ok(ItemOutcome::Noop)
}

async fn record_provider_error(
    pool: &PgPool,
    payment_id: Uuid,
    provider: Provider,
    trigger: Trigger,
    provider_tag: &str,
    payload: Value,
    actor: Option<&str>,
) -> Result<ItemOutcome, PipelineError> {
    let record = NewWebhookRecord::new(provider.as_str(), with_actor(payload, actor))
        .event_type(trigger.tag(&format!("{provider_tag}.error")))
        .signature(true);
    commit(pool, LedgerWrite::AuditOnly { payment_id: Some(payment_id) }, move |_| record).await?;
    Ok(ItemOutcome::Error)
}

/// Last resort for a batch item: audit the failure if the database lets us,
/// and keep going either way.
async fn item_failed(
    pool: &PgPool,
    payment: &Payment,
    trigger: Trigger,
    actor: Option<&str>,
    error: PipelineError,
) -> ItemOutcome {
    tracing::error!(payment_id = %payment.id, error = %error, "reconciliation item failed");

    let record = NewWebhookRecord::new(
        payment.provider.clone(),
        with_actor(json!({ "error": error.to_string() }), actor),
    )
    .event_type(trigger.tag("error"))
    .signature(true);
    if let Err(e) = commit(pool, LedgerWrite::AuditOnly { payment_id: Some(payment.id) }, move |_| record).await {
        tracing::error!(payment_id = %payment.id, error = %e, "could not audit reconciliation failure");
    }
    ItemOutcome::Error
}

fn with_actor(mut payload: Value, actor: Option<&str>) -> Value {
    if let (Some(actor), Some(object)) = (actor, payload.as_object_mut()) {
        object.insert("admin".into(), json!(actor));
    }
    payload
}
