use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// Provider-side transaction identifier (`pi_xxx`, a Pesapal tracking id,
/// a mobile-money transaction id). The idempotency key of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(PipelineError::Validation(
                "ExternalId must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Provider delivery identifier (`evt_xxx`). Only the card provider sends one.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(PipelineError::Validation(
                "EventId must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_is_trimmed() {
        let id = ExternalId::new("  tx123 ").unwrap();
        assert_eq!(id.as_str(), "tx123");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(ExternalId::new("   ").is_err());
        assert!(EventId::new("").is_err());
    }
}
