use super::{
    id::{EventId, ExternalId},
    money::{Currency, MoneyAmount},
    payment::{LinkedEntity, PaymentStatus},
    provider::Provider,
};

/// Canonical shape every provider payload is mapped into before it touches the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub provider: Provider,
    /// `None` when the payload names no transaction; such events are archived only.
    pub external_id: Option<ExternalId>,
    pub external_reference: Option<String>,
    pub linked_entity: Option<LinkedEntity>,
    pub amount: Option<MoneyAmount>,
    /// `None` when the payload carried no usable code.
    pub currency: Option<Currency>,
    pub status: PaymentStatus,
    pub event_type: Option<String>,
    pub event_id: Option<EventId>,
    pub metadata: Option<serde_json::Value>,
}
