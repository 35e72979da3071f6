use {
    super::error::PipelineError,
    super::id::ExternalId,
    std::{fmt, future::Future, pin::Pin, sync::Arc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Card processor (Stripe).
    Card,
    /// Regional mobile-money gateway (Pesapal).
    MobileGateway,
    /// Generic mobile-money aggregator.
    MobileMoney,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::MobileGateway => "mobile-gateway-A",
            Self::MobileMoney => "mobile-gateway-generic",
        }
    }

    /// Accepts the stored names plus the legacy ones written before providers
    /// were renamed. Unknown names (including the `initiated` placeholder) are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "card" | "stripe" => Some(Self::Card),
            "mobile-gateway-a" | "pesapal" => Some(Self::MobileGateway),
            "mobile-gateway-generic" | "mobile_money" => Some(Self::MobileMoney),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What reconciliation gets back from the card provider. Amount and currency
/// are kept for the audit trail only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentSnapshot {
    pub status: Option<String>,
    pub amount_received: Option<i64>,
    pub currency: Option<String>,
}

impl IntentSnapshot {
    pub fn from_json(intent: &serde_json::Value) -> Self {
        Self {
            status: intent
                .get("status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            amount_received: intent.get("amount_received").and_then(|v| v.as_i64()),
            currency: intent
                .get("currency")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

pub trait CardGateway: Send + Sync {
    fn retrieve_intent(&self, id: &ExternalId) -> ProviderFuture<'_, IntentSnapshot>;
}

pub trait MobileGatewayApi: Send + Sync {
    /// Native status document for a transaction, or `None` when the gateway
    /// had no answer for either identifier.
    fn transaction_status<'a>(
        &'a self,
        order_tracking_id: Option<&'a str>,
        transaction_tracking_id: Option<&'a str>,
    ) -> ProviderFuture<'a, Option<serde_json::Value>>;
}

/// Outbound clients available to reconciliation. A missing client means the
/// provider has no credentials configured.
#[derive(Clone, Default)]
pub struct ProviderClients {
    pub card: Option<Arc<dyn CardGateway>>,
    pub mobile_gateway: Option<Arc<dyn MobileGatewayApi>>,
}
