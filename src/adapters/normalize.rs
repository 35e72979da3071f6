//! Provider payload → [`NormalizedEvent`].
//!
//! One normalizer per provider, selected by [`normalize`]. Field names and
//! defaults follow each provider's live webhook format. Reconciliation responses
//! use [`map_gateway_response`] instead, and stored audit payloads go through
//! [`status_from_stored_payload`].

use {
    crate::domain::{
        event::NormalizedEvent,
        id::{EventId, ExternalId},
        money::{Currency, MoneyAmount},
        payment::{LinkedEntity, PaymentStatus},
        provider::Provider,
    },
    serde_json::{Map, Value, json},
    uuid::Uuid,
};

/// Returns `None` for card events that carry no financial data.
pub fn normalize(provider: Provider, payload: &Value) -> Option<NormalizedEvent> {
    match provider {
        Provider::Card => normalize_card(payload),
        Provider::MobileGateway => Some(normalize_gateway(payload)),
        Provider::MobileMoney => Some(normalize_mobile_money(payload)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardEventKind {
    PaymentIntent,
    CheckoutSession,
}

impl CardEventKind {
    fn classify(event_type: &str) -> Option<Self> {
        if event_type.starts_with("payment_intent.") {
            Some(Self::PaymentIntent)
        } else if event_type.starts_with("checkout.session.") {
            Some(Self::CheckoutSession)
        } else {
            None
        }
    }
}

/// Checkout `payment_status` translation. Values outside the table pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckoutPaymentStatus {
    Paid,
    Unpaid,
}

impl CheckoutPaymentStatus {
    fn from_native(raw: &str) -> Option<Self> {
        match raw {
            "paid" => Some(Self::Paid),
            "unpaid" => Some(Self::Unpaid),
            _ => None,
        }
    }

    fn canonical(self) -> PaymentStatus {
        match self {
            Self::Paid => PaymentStatus::succeeded(),
            Self::Unpaid => PaymentStatus::failed(),
        }
    }
}

fn map_checkout_status(raw: &str) -> Option<PaymentStatus> {
    match CheckoutPaymentStatus::from_native(raw) {
        Some(known) => Some(known.canonical()),
        None => PaymentStatus::new(raw),
    }
}

fn normalize_card(event: &Value) -> Option<NormalizedEvent> {
    let event_type = event.get("type").and_then(Value::as_str)?;
    let kind = CardEventKind::classify(event_type)?;
    let object = event.pointer("/data/object").unwrap_or(&Value::Null);

    let currency = match object.get("currency").and_then(Value::as_str) {
        Some(code) => parse_currency(code),
        None => Some(Currency::usd()),
    };

    let (amount, external_id, status) = match kind {
        CardEventKind::PaymentIntent => {
            let minor = non_null(object, "amount_received").or_else(|| non_null(object, "amount"));
            (
                minor.and_then(minor_units),
                text_field(object, "id"),
                string_field(object, "status")
                    .and_then(PaymentStatus::new)
                    .unwrap_or_else(PaymentStatus::succeeded),
            )
        }
        CardEventKind::CheckoutSession => {
            let intent_id = match object.get("payment_intent") {
                Some(Value::Object(intent)) => intent.get("id").and_then(Value::as_str),
                Some(Value::String(id)) => Some(id.as_str()),
                _ => None,
            };
            (
                non_null(object, "amount_total").and_then(minor_units),
                intent_id
                    .and_then(|id| ExternalId::new(id).ok())
                    .or_else(|| text_field(object, "id")),
                string_field(object, "payment_status")
                    .and_then(map_checkout_status)
                    .unwrap_or_else(PaymentStatus::succeeded),
            )
        }
    };

    let metadata = object.get("metadata").filter(|m| m.is_object());

    Some(NormalizedEvent {
        provider: Provider::Card,
        external_id,
        external_reference: None,
        linked_entity: metadata.and_then(linked_entity_from),
        amount,
        currency,
        status,
        event_type: Some(event_type.to_string()),
        event_id: string_field(event, "id").and_then(|id| EventId::new(id).ok()),
        metadata: metadata.cloned(),
    })
}

fn normalize_gateway(payload: &Value) -> NormalizedEvent {
    let transaction_tracking_id = text_field(payload, "transaction_tracking_id");
    let order_tracking_id = text_field(payload, "order_tracking_id");

    let mut tracking = Map::new();
    if let Some(id) = &order_tracking_id {
        tracking.insert("order_tracking_id".into(), json!(id.as_str()));
    }
    if let Some(id) = &transaction_tracking_id {
        tracking.insert("transaction_tracking_id".into(), json!(id.as_str()));
    }

    NormalizedEvent {
        provider: Provider::MobileGateway,
        external_id: transaction_tracking_id.or(order_tracking_id),
        external_reference: string_field(payload, "reference").map(str::to_string),
        linked_entity: None,
        amount: payload.get("amount").and_then(MoneyAmount::parse_lenient),
        currency: payload_currency(payload),
        status: payload_status(payload),
        event_type: string_field(payload, "event_type").map(str::to_string),
        event_id: None,
        metadata: (!tracking.is_empty()).then(|| Value::Object(tracking)),
    }
}

fn normalize_mobile_money(payload: &Value) -> NormalizedEvent {
    let metadata = payload.get("metadata").filter(|m| m.is_object());
    let external_reference = metadata.and_then(|m| {
        scalar_text(m.get("giving_id")).or_else(|| scalar_text(m.get("donation_id")))
    });

    NormalizedEvent {
        provider: Provider::MobileMoney,
        external_id: text_field(payload, "transaction_id")
            .or_else(|| text_field(payload, "reference_id")),
        external_reference,
        linked_entity: metadata.and_then(linked_entity_from),
        amount: payload.get("amount").and_then(MoneyAmount::parse_lenient),
        currency: payload_currency(payload),
        status: payload_status(payload),
        event_type: string_field(payload, "event_type").map(str::to_string),
        event_id: None,
        metadata: metadata.cloned(),
    }
}

/// Gateway reconciliation status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Completed,
    Paid,
    Failed,
    Invalid,
    Pending,
    Processing,
}

impl GatewayStatus {
    /// Case-insensitive lookup of the gateway's native vocabulary.
    pub fn from_native(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "completed" => Some(Self::Completed),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "invalid" => Some(Self::Invalid),
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            _ => None,
        }
    }

    pub fn canonical(self) -> &'static str {
        match self {
            Self::Completed | Self::Paid => PaymentStatus::SUCCEEDED,
            Self::Failed | Self::Invalid => PaymentStatus::FAILED,
            Self::Pending => PaymentStatus::PENDING,
            Self::Processing => PaymentStatus::PROCESSING,
        }
    }
}

/// Derive a ledger status from a gateway status-query response. Unknown values
/// pass through lower-cased.
pub fn map_gateway_response(response: &Value) -> Option<PaymentStatus> {
    let raw = ["payment_status", "payment_status_description", "status"]
        .iter()
        .find_map(|key| scalar_text(response.get(*key)))?;
    match GatewayStatus::from_native(&raw) {
        Some(known) => PaymentStatus::new(known.canonical()),
        None => PaymentStatus::new(raw.to_lowercase()),
    }
}

/// Best-effort status inference from an already stored audit payload.
///
/// Live webhooks and our own reconciliation rows do not share field names, so
/// this applies the live-webhook rules without their defaults and then falls
/// back to the `inferred_status` key that reconciliation rows carry.
pub fn status_from_stored_payload(provider: &str, payload: &Value) -> Option<PaymentStatus> {
    let from_webhook = match Provider::parse(provider) {
        Some(Provider::Card) => {
            let object = payload.pointer("/data/object").unwrap_or(&Value::Null);
            match payload
                .get("type")
                .and_then(Value::as_str)
                .and_then(CardEventKind::classify)
            {
                Some(CardEventKind::PaymentIntent) => {
                    string_field(object, "status").and_then(PaymentStatus::new)
                }
                Some(CardEventKind::CheckoutSession) => {
                    string_field(object, "payment_status").and_then(map_checkout_status)
                }
                None => None,
            }
        }
        Some(Provider::MobileGateway | Provider::MobileMoney) => {
            string_field(payload, "status").and_then(PaymentStatus::new)
        }
        None => None,
    };

    from_webhook.or_else(|| string_field(payload, "inferred_status").and_then(PaymentStatus::new))
}

// ── Field helpers ──────────────────────────────────────────────────────────

fn non_null<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

fn string_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Strings and numbers both count as identifiers; mobile aggregators send either.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(object: &Value, key: &str) -> Option<ExternalId> {
    scalar_text(object.get(key)).and_then(|id| ExternalId::new(id).ok())
}

fn minor_units(value: &Value) -> Option<MoneyAmount> {
    value
        .as_i64()
        .and_then(|minor| {
            MoneyAmount::from_minor_units(minor)
                .inspect_err(|e| tracing::warn!(error = %e, "card amount ignored"))
                .ok()
        })
}

fn parse_currency(code: &str) -> Option<Currency> {
    match Currency::parse(code) {
        Ok(currency) => Some(currency),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unusable currency");
            None
        }
    }
}

fn payload_currency(payload: &Value) -> Option<Currency> {
    match string_field(payload, "currency") {
        Some(code) => parse_currency(code),
        None => Some(Currency::usd()),
    }
}

fn payload_status(payload: &Value) -> PaymentStatus {
    string_field(payload, "status")
        .and_then(PaymentStatus::new)
        .unwrap_or_else(PaymentStatus::pending)
}

/// `giving_id` wins over `donation_id`; a key that is present but not a UUID
/// yields no link rather than falling through to the other key.
fn linked_entity_from(metadata: &Value) -> Option<LinkedEntity> {
    let (raw, make): (_, fn(Uuid) -> LinkedEntity) = if let Some(v) = metadata.get("giving_id") {
        (v, LinkedEntity::Giving)
    } else if let Some(v) = metadata.get("donation_id") {
        (v, LinkedEntity::Donation)
    } else {
        return None;
    };

    let text = scalar_text(Some(raw))?;
    match Uuid::parse_str(&text) {
        Ok(id) => Some(make(id)),
        Err(_) => {
            tracing::warn!(reference = %text, "metadata reference is not a uuid, not linking");
            None
        }
    }
}
