use {
    crate::domain::{
        error::PipelineError,
        event::NormalizedEvent,
        id::ExternalId,
        money::{Currency, MoneyAmount},
        payment::{Payment, PaymentStatus, UNSETTLED_STATUSES},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

const SELECT_PAYMENT: &str = r#"
    SELECT id, provider, status, currency, amount, method, external_id, external_reference,
           giving_id, donation_id, metadata, created_at, updated_at
    FROM payments
"#;

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Payment>, PipelineError> {
    let sql = format!("{SELECT_PAYMENT} WHERE id = $1");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Payment>, PipelineError> {
    let sql = format!("{SELECT_PAYMENT} WHERE external_id = $1");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Payments for a bulk admin action, in creation order. Unknown ids are simply absent.
pub async fn find_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Payment>, PipelineError> {
    let sql = format!("{SELECT_PAYMENT} WHERE id = ANY($1) ORDER BY created_at, id");
    let rows = sqlx::query_as::<_, Payment>(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Unsettled payments not touched since `cutoff`, oldest first.
pub async fn select_stale(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Payment>, PipelineError> {
    let sql = format!(
        "{SELECT_PAYMENT} WHERE status = ANY($1) AND updated_at < $2 ORDER BY updated_at, id LIMIT $3"
    );
    let statuses: Vec<&str> = UNSETTLED_STATUSES.to_vec();
    let rows = sqlx::query_as::<_, Payment>(&sql)
        .bind(statuses)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_by_external_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    external_id: &str,
) -> Result<Option<Payment>, PipelineError> {
    let sql = format!("{SELECT_PAYMENT} WHERE external_id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row)
}

pub async fn lock_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Payment>, PipelineError> {
    let sql = format!("{SELECT_PAYMENT} WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row)
}

/// First sighting of an external id. Missing amount and currency take the
/// column defaults the source system used (0, USD).
pub async fn insert_from_event(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    external_id: &ExternalId,
    event: &NormalizedEvent,
) -> Result<(), PipelineError> {
    let amount = event.amount.unwrap_or_else(MoneyAmount::zero);
    let currency = event.currency.clone().unwrap_or_else(Currency::usd);

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, provider, status, currency, amount, external_id, external_reference,
            giving_id, donation_id, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(id)
    .bind(event.provider.as_str())
    .bind(event.status.as_str())
    .bind(currency.as_str())
    .bind(amount.value())
    .bind(external_id.as_str())
    .bind(event.external_reference.as_deref())
    .bind(event.linked_entity.and_then(|l| l.giving_id()))
    .bind(event.linked_entity.and_then(|l| l.donation_id()))
    .bind(event.metadata.clone())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Partial update from a later event for the same external id. Status and
/// provider are always overwritten; everything else only when the event
/// actually carries it. A payment links to a giving or a donation, never
/// both, so a new link of one kind clears the other.
pub async fn update_from_event(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    event: &NormalizedEvent,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET provider = $2,
            status = $3,
            amount = COALESCE($4, amount),
            currency = COALESCE($5, currency),
            external_reference = COALESCE($6, external_reference),
            giving_id = CASE
                WHEN $7::uuid IS NOT NULL THEN $7::uuid
                WHEN $8::uuid IS NOT NULL THEN NULL
                ELSE giving_id
            END,
            donation_id = CASE
                WHEN $8::uuid IS NOT NULL THEN $8::uuid
                WHEN $7::uuid IS NOT NULL THEN NULL
                ELSE donation_id
            END,
            metadata = COALESCE($9, metadata),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(event.provider.as_str())
    .bind(event.status.as_str())
    .bind(event.amount.map(|a| a.value()))
    .bind(event.currency.as_ref().map(Currency::as_str))
    .bind(event.external_reference.as_deref())
    .bind(event.linked_entity.and_then(|l| l.giving_id()))
    .bind(event.linked_entity.and_then(|l| l.donation_id()))
    .bind(event.metadata.clone())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Status-only write used by reconciliation and operators. Amounts are never touched here.
pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: &PaymentStatus,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE payments SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
