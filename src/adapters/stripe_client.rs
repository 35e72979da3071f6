use {
    crate::domain::{
        error::PipelineError,
        id::ExternalId,
        provider::{CardGateway, IntentSnapshot, ProviderFuture},
    },
    std::time::Duration,
};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct StripeProvider {
    client: stripe::Client,
    timeout: Duration,
}

impl StripeProvider {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            timeout: LOOKUP_TIMEOUT,
        }
    }
}

impl CardGateway for StripeProvider {
    fn retrieve_intent(&self, id: &ExternalId) -> ProviderFuture<'_, IntentSnapshot> {
        let id = id.clone();
        Box::pin(async move { self.retrieve_intent_inner(&id).await })
    }
}

impl StripeProvider {
    async fn retrieve_intent_inner(&self, id: &ExternalId) -> Result<IntentSnapshot, PipelineError> {
        let pi_id = id
            .as_str()
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| PipelineError::Provider(format!("invalid PaymentIntent id: {e}")))?;

        let pi = tokio::time::timeout(
            self.timeout,
            stripe::PaymentIntent::retrieve(&self.client, &pi_id, &[]),
        )
        .await
        .map_err(|_| {
            PipelineError::Provider(format!(
                "Stripe API: timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| PipelineError::Provider(format!("Stripe API: {e}")))?;

        // The typed object serializes back to the API's field names and
        // lowercase enum values, which is what the audit trail stores.
        let value = serde_json::to_value(&pi)?;
        Ok(IntentSnapshot::from_json(&value))
    }
}
