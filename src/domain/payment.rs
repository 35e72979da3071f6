use {
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Statuses that mean "still in flight". The staleness sweep only looks at these.
pub const UNSETTLED_STATUSES: [&str; 2] = [PaymentStatus::PENDING, PaymentStatus::PROCESSING];

const MAX_STATUS_LEN: usize = 50;

/// Provider-reported payment status.
///
/// Open set: providers introduce new values outside our control, so anything
/// non-blank is stored verbatim. The well-known constants are only used for
/// the staleness predicate and the translation tables in the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentStatus(String);

impl PaymentStatus {
    pub const PENDING: &'static str = "pending";
    pub const PROCESSING: &'static str = "processing";
    pub const SUCCEEDED: &'static str = "succeeded";
    pub const FAILED: &'static str = "failed";
    pub const REFUNDED: &'static str = "refunded";

    /// `None` for blank or oversized values; callers fall back to their default.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() || raw.chars().count() > MAX_STATUS_LEN {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn pending() -> Self {
        Self(Self::PENDING.to_string())
    }

    pub fn succeeded() -> Self {
        Self(Self::SUCCEEDED.to_string())
    }

    pub fn failed() -> Self {
        Self(Self::FAILED.to_string())
    }

    pub fn refunded() -> Self {
        Self(Self::REFUNDED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for PaymentStatus {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// The internal financial intent a payment settles. Giving and donation
/// records are owned by the CRUD layer; only their ids live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedEntity {
    Giving(Uuid),
    Donation(Uuid),
}

impl LinkedEntity {
    pub fn giving_id(&self) -> Option<Uuid> {
        match self {
            Self::Giving(id) => Some(*id),
            Self::Donation(_) => None,
        }
    }

    pub fn donation_id(&self) -> Option<Uuid> {
        match self {
            Self::Donation(id) => Some(*id),
            Self::Giving(_) => None,
        }
    }
}

/// Full payment record from DB (for reads).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub provider: String,
    pub status: String,
    pub currency: String,
    pub amount: Decimal,
    pub method: Option<String>,
    pub external_id: Option<String>,
    pub external_reference: Option<String>,
    pub giving_id: Option<Uuid>,
    pub donation_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn has_status(&self, status: &PaymentStatus) -> bool {
        self.status == status.as_str()
    }

    /// Order-tracking id for gateway status lookups: the one captured from the
    /// webhook when we have it, else our own reference.
    pub fn order_tracking_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("order_tracking_id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .or(self.external_reference.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_open_but_trimmed() {
        let s = PaymentStatus::new(" requires_payment_method ").unwrap();
        assert_eq!(s.as_str(), "requires_payment_method");
        assert!(PaymentStatus::new("  ").is_none());
        assert!(PaymentStatus::new("x".repeat(51)).is_none());
    }

    #[test]
    fn linked_entity_splits_into_columns() {
        let id = Uuid::now_v7();
        assert_eq!(LinkedEntity::Giving(id).giving_id(), Some(id));
        assert_eq!(LinkedEntity::Giving(id).donation_id(), None);
        assert_eq!(LinkedEntity::Donation(id).donation_id(), Some(id));
    }
}
