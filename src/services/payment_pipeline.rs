use {
    crate::domain::{
        audit::{NewWebhookRecord, jsonb_safe},
        error::PipelineError,
        event::NormalizedEvent,
        payment::PaymentStatus,
        provider::Provider,
    },
    crate::infra::postgres::{payment_repo, webhook_repo},
    chrono::Utc,
    sqlx::PgPool,
    tracing::Span,
    uuid::Uuid,
};

/// What the ledger should do with a payment inside the unit of work.
#[derive(Debug, Clone, Copy)]
pub enum LedgerWrite<'a> {
    /// Insert or partially update the payment keyed by the event's external id.
    Upsert(&'a NormalizedEvent),
    /// Status-only write, skipped when the payment already has `status`.
    SetStatus {
        payment_id: Uuid,
        status: &'a PaymentStatus,
    },
    /// No ledger change; the audit row is linked to `payment_id` if given.
    AuditOnly { payment_id: Option<Uuid> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Created(Uuid),
    Updated { id: Uuid, previous_status: String },
    StatusChanged { id: Uuid, from: String },
    Unchanged(Uuid),
    Archived { payment_id: Option<Uuid> },
}

impl LedgerOutcome {
    pub fn payment_id(&self) -> Option<Uuid> {
        match self {
            Self::Created(id) | Self::Unchanged(id) => Some(*id),
            Self::Updated { id, .. } | Self::StatusChanged { id, .. } => Some(*id),
            Self::Archived { payment_id } => *payment_id,
        }
    }

    /// True when the stored status was actually changed by a status-only write.
    pub fn status_changed(&self) -> bool {
        matches!(self, Self::StatusChanged { .. })
    }
}

/// The ledger unit of work: one payment write and one audit append, committed
/// together or not at all.
///
/// The audit row is built from the outcome so it can say what happened; its
/// payment link and `processed_at` are always set here.
#[tracing::instrument(
    name = "ledger.commit",
    skip_all,
    fields(payment_id = tracing::field::Empty)
)]
pub async fn commit<'a, F>(
    pool: &PgPool,
    write: LedgerWrite<'a>,
    audit_for: F,
) -> Result<LedgerOutcome, PipelineError>
where
    F: FnOnce(&LedgerOutcome) -> NewWebhookRecord + Send,
{
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let outcome = match write {
        LedgerWrite::Upsert(event) => {
            let Some(external_id) = event.external_id.as_ref() else {
                return Err(PipelineError::Validation(
                    "event carries no external id".into(),
                ));
            };

            // Serialize all writers for this external id.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(external_id.as_str())
                .execute(&mut *tx)
                .await?;

            match payment_repo::find_by_external_id_tx(&mut tx, external_id.as_str()).await? {
                None => {
                    let id = Uuid::now_v7();
                    payment_repo::insert_from_event(&mut tx, id, external_id, event).await?;
                    LedgerOutcome::Created(id)
                }
                Some(existing) => {
                    payment_repo::update_from_event(&mut tx, existing.id, event).await?;
                    LedgerOutcome::Updated {
                        id: existing.id,
                        previous_status: existing.status,
                    }
                }
            }
        }
        LedgerWrite::SetStatus { payment_id, status } => {
            let existing = payment_repo::lock_by_id(&mut tx, payment_id)
                .await?
                .ok_or_else(|| PipelineError::NotFound(format!("payment {payment_id}")))?;

            if existing.has_status(status) {
                LedgerOutcome::Unchanged(existing.id)
            } else {
                payment_repo::set_status(&mut tx, existing.id, status).await?;
                LedgerOutcome::StatusChanged {
                    id: existing.id,
                    from: existing.status,
                }
            }
        }
        LedgerWrite::AuditOnly { payment_id } => LedgerOutcome::Archived { payment_id },
    };

    let mut audit = audit_for(&outcome);
    audit.payment_id = outcome.payment_id();
    audit.processed_at = Some(Utc::now());
    webhook_repo::insert_webhook(&mut tx, &audit).await?;

    tx.commit().await?;

    if let Some(id) = outcome.payment_id() {
        Span::current().record("payment_id", tracing::field::display(id));
    }
    Ok(outcome)
}

/// Apply a verified, normalized webhook. Events without an external id are
/// archived with no ledger effect.
pub async fn process_webhook_event(
    pool: &PgPool,
    event: &NormalizedEvent,
    raw_payload: serde_json::Value,
) -> Result<LedgerOutcome, PipelineError> {
    let mut record = NewWebhookRecord::new(event.provider.as_str(), raw_payload)
        .signature(true)
        .event_id(event.event_id.as_ref().map(|id| id.as_str().to_string()));
    record.event_type = event.event_type.clone();

    let write = match &event.external_id {
        Some(_) => LedgerWrite::Upsert(event),
        None => {
            tracing::warn!(
                provider = %event.provider,
                event_type = ?event.event_type,
                "financial event without external id, archived only"
            );
            LedgerWrite::AuditOnly { payment_id: None }
        }
    };

    let outcome = commit(pool, write, move |_| record).await?;

    match &outcome {
        LedgerOutcome::Created(id) => tracing::info!(
            payment_id = %id,
            provider = %event.provider,
            status = %event.status,
            "payment created"
        ),
        LedgerOutcome::Updated {
            id,
            previous_status,
        } => tracing::info!(
            payment_id = %id,
            provider = %event.provider,
            from = %previous_status,
            to = %event.status,
            "payment updated"
        ),
        _ => {}
    }
    Ok(outcome)
}

/// Store a delivery that has no ledger effect (unhandled event type, payload
/// that is not an object) with a null payment link.
pub async fn archive(pool: &PgPool, record: NewWebhookRecord) -> Result<(), PipelineError> {
    commit(pool, LedgerWrite::AuditOnly { payment_id: None }, move |_| {
        record
    })
    .await?;
    Ok(())
}

/// Audit a delivery that failed signature or payload verification.
pub async fn archive_rejected(
    pool: &PgPool,
    provider: Provider,
    body: &[u8],
) -> Result<(), PipelineError> {
    let record = NewWebhookRecord::new(provider.as_str(), payload_from_body(body)).signature(false);
    archive(pool, record).await
}

/// Best-effort JSON view of a raw body, safe to store. Normalizers read this
/// view too, so nothing derived from it can carry a NUL into the ledger.
pub fn payload_from_body(body: &[u8]) -> serde_json::Value {
    let value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => serde_json::json!({
            "unparsed_body": String::from_utf8_lossy(body),
        }),
    };
    jsonb_safe(value)
}
