use {
    crate::domain::{
        error::PipelineError,
        provider::{MobileGatewayApi, ProviderFuture},
    },
    chrono::{DateTime, Utc},
    reqwest::{Client, StatusCode},
    serde::Deserialize,
    serde_json::Value,
    std::{sync::Arc, time::Duration},
    tokio::sync::Mutex,
};

pub const DEFAULT_BASE_URL: &str = "https://pay.pesapal.com/v3";
const DEFAULT_TOKEN_TTL_SECS: i64 = 1200;

#[derive(Debug, Clone)]
pub struct PesapalConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub timeout: Duration,
}

impl PesapalConfig {
    pub fn new(base_url: &str, consumer_key: &str, consumer_secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Access-token cache shared by every client built on it. Tokens are
/// refreshed lazily once `expires_at` has passed.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_valid(&self, now: DateTime<Utc>) -> Option<String> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    pub async fn store(&self, token: String, expires_at: DateTime<Utc>) {
        *self.slot.lock().await = Some(CachedToken { token, expires_at });
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}

/// Reuse window for a token that lives `expires_in` seconds: one minute of
/// slack, never less than one minute.
pub fn token_ttl(expires_in: i64) -> chrono::Duration {
    chrono::Duration::seconds((expires_in - 60).max(60))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<Value>,
    #[serde(rename = "expiryDate")]
    expiry_date: Option<String>,
}

impl TokenResponse {
    fn lifetime_secs(&self, now: DateTime<Utc>) -> i64 {
        let from_expires_in = self.expires_in.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let from_expiry_date = || {
            self.expiry_date
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| (at.with_timezone(&Utc) - now).num_seconds())
        };
        from_expires_in
            .filter(|secs| *secs > 0)
            .or_else(from_expiry_date)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
    }
}

pub struct PesapalClient {
    config: PesapalConfig,
    client: Client,
    tokens: Arc<TokenCache>,
}

impl PesapalClient {
    pub fn new(config: PesapalConfig, tokens: Arc<TokenCache>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Provider(format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    /// Cached bearer token, requesting a new one when the cached token expired.
    pub async fn access_token(&self) -> Result<String, PipelineError> {
        let now = Utc::now();
        if let Some(token) = self.tokens.get_valid(now).await {
            return Ok(token);
        }

        let url = format!("{}/api/Auth/RequestToken", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "consumerKey": self.config.consumer_key,
                "consumerSecret": self.config.consumer_secret,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("pesapal token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Provider(format!(
                "pesapal token request: HTTP {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(format!("pesapal token response: {e}")))?;

        let lifetime = body.lifetime_secs(now);
        let token = body
            .token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::Provider("pesapal token response carried no token".into()))?;

        self.tokens.store(token.clone(), now + token_ttl(lifetime)).await;
        tracing::debug!(ttl_secs = token_ttl(lifetime).num_seconds(), "pesapal token refreshed");
        Ok(token)
    }

    async fn status_by(
        &self,
        token: &str,
        param: &str,
        value: &str,
    ) -> Result<Option<Value>, PipelineError> {
        let url = format!(
            "{}/api/Transactions/GetTransactionStatus",
            self.config.base_url
        );
        let response = self
            .client
            .get(&url)
            .query(&[(param, value)])
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("pesapal status request: {e}")))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.clear().await;
        }
        if response.status() != StatusCode::OK {
            tracing::debug!(param, status = %response.status(), "pesapal status lookup missed");
            return Ok(None);
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| PipelineError::Provider(format!("pesapal status response: {e}")))?;
        Ok(Some(body))
    }

    /// Order-tracking lookup first, then transaction-tracking; the first 200 wins.
    pub async fn get_transaction_status(
        &self,
        order_tracking_id: Option<&str>,
        transaction_tracking_id: Option<&str>,
    ) -> Result<Option<Value>, PipelineError> {
        let token = self.access_token().await?;

        if let Some(order) = order_tracking_id.filter(|s| !s.is_empty()) {
            if let Some(body) = self.status_by(&token, "orderTrackingId", order).await? {
                return Ok(Some(body));
            }
        }
        if let Some(tx) = transaction_tracking_id.filter(|s| !s.is_empty()) {
            if let Some(body) = self.status_by(&token, "transactionTrackingId", tx).await? {
                return Ok(Some(body));
            }
        }
        Ok(None)
    }
}

impl MobileGatewayApi for PesapalClient {
    fn transaction_status<'a>(
        &'a self,
        order_tracking_id: Option<&'a str>,
        transaction_tracking_id: Option<&'a str>,
    ) -> ProviderFuture<'a, Option<Value>> {
        Box::pin(self.get_transaction_status(order_tracking_id, transaction_tracking_id))
    }
}
