use {
    crate::domain::{
        audit::{NewWebhookRecord, WebhookRecord},
        error::PipelineError,
    },
    sqlx::PgPool,
    uuid::Uuid,
};

const SELECT_WEBHOOK: &str = r#"
    SELECT id, provider, event_id, event_type, signature_valid, payment_id, raw_payload,
           received_at, processed_at, created_at, updated_at
    FROM payment_webhooks
"#;

/// Append one audit row. The table rejects updates and deletes, so this is the only write.
pub async fn insert_webhook(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &NewWebhookRecord,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO payment_webhooks (
            id, provider, event_id, event_type, signature_valid, payment_id, raw_payload,
            received_at, processed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.id)
    .bind(&record.provider)
    .bind(record.event_id.as_deref())
    .bind(record.event_type.as_deref())
    .bind(record.signature_valid)
    .bind(record.payment_id)
    .bind(&record.raw_payload)
    .bind(record.received_at)
    .bind(record.processed_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Most recent delivery linked to a payment; `created_at` breaks ties on `received_at`.
pub async fn latest_for_payment(
    pool: &PgPool,
    payment_id: Uuid,
) -> Result<Option<WebhookRecord>, PipelineError> {
    let sql = format!(
        "{SELECT_WEBHOOK} WHERE payment_id = $1 ORDER BY received_at DESC, created_at DESC, id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, WebhookRecord>(&sql)
        .bind(payment_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Full audit trail for a payment, newest first.
pub async fn list_for_payment(
    pool: &PgPool,
    payment_id: Uuid,
) -> Result<Vec<WebhookRecord>, PipelineError> {
    let sql = format!(
        "{SELECT_WEBHOOK} WHERE payment_id = $1 ORDER BY received_at DESC, created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, WebhookRecord>(&sql)
        .bind(payment_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
