use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    serde_json::Value,
    uuid::Uuid,
};

/// One inbound delivery or one reconciliation attempt, as it will be appended
/// to `payment_webhooks`. The payment link and `processed_at` are filled in by
/// the ledger when the row is committed.
#[derive(Debug, Clone)]
pub struct NewWebhookRecord {
    pub id: Uuid,
    pub provider: String,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub signature_valid: Option<bool>,
    pub payment_id: Option<Uuid>,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl NewWebhookRecord {
    pub fn new(provider: impl Into<String>, raw_payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider: provider.into(),
            event_id: None,
            event_type: None,
            signature_valid: None,
            payment_id: None,
            raw_payload: jsonb_safe(raw_payload),
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn event_id(mut self, event_id: Option<String>) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn signature(mut self, valid: bool) -> Self {
        self.signature_valid = Some(valid);
        self
    }
}

/// Postgres text and JSONB cannot hold NUL, so every NUL in a string or key
/// becomes U+FFFD. Everything else is kept as delivered.
pub fn jsonb_safe(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(replace_nul(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(jsonb_safe).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (replace_nul(k), jsonb_safe(v)))
                .collect(),
        ),
        other => other,
    }
}

fn replace_nul(s: String) -> String {
    if s.contains('\0') {
        s.replace('\0', "\u{FFFD}")
    } else {
        s
    }
}

/// Stored audit row (for reads).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookRecord {
    pub id: Uuid,
    pub provider: String,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub signature_valid: Option<bool>,
    pub payment_id: Option<Uuid>,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who asked for a reconciliation. Decides the audit tag prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Admin,
    Cron,
}

impl Trigger {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Cron => "cron",
        }
    }

    /// `admin.reconcile.provider.card`, `cron.reconcile.noop`, ...
    pub fn tag(&self, suffix: &str) -> String {
        format!("{}.reconcile.{suffix}", self.prefix())
    }
}
