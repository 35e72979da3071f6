use {
    crate::{adapters::pesapal_client::DEFAULT_BASE_URL, services::reconciliation::SweepOptions},
    std::{str::FromStr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub database_max_connections: u32,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_key: Option<String>,
    pub pesapal_webhook_secret: Option<String>,
    pub mobile_money_webhook_secret: Option<String>,
    pub pesapal_base_url: String,
    pub pesapal_consumer_key: Option<String>,
    pub pesapal_consumer_secret: Option<String>,
    pub admin_api_token: Option<String>,
    pub sweep: SweepOptions,
    /// `None` disables the in-process sweeper.
    pub reconcile_interval: Option<Duration>,
    pub webhook_rate_limit: u32,
    pub webhook_rate_window: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let interval_secs: u64 = parse_or(&get, "RECONCILE_INTERVAL_SECS", 0, "number of seconds")?;
        let sweep = SweepOptions {
            staleness_minutes: parse_or(&get, "RECONCILE_STALE_MINUTES", 10, "number of minutes")?,
            batch_limit: parse_or(&get, "RECONCILE_BATCH_LIMIT", 200, "number")?,
        };
        if sweep.cutoff(chrono::Utc::now()).is_err() {
            return Err(ConfigError::Invalid {
                key: "RECONCILE_STALE_MINUTES",
                expected: "number of minutes",
                value: sweep.staleness_minutes.to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 20, "number")?,
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            stripe_api_key: get("STRIPE_API_KEY"),
            pesapal_webhook_secret: get("PESAPAL_WEBHOOK_SECRET"),
            mobile_money_webhook_secret: get("MOBILE_MONEY_WEBHOOK_SECRET"),
            pesapal_base_url: get("PESAPAL_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            pesapal_consumer_key: get("PESAPAL_CONSUMER_KEY"),
            pesapal_consumer_secret: get("PESAPAL_CONSUMER_SECRET"),
            admin_api_token: get("ADMIN_API_TOKEN"),
            sweep,
            reconcile_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            webhook_rate_limit: parse_or(&get, "WEBHOOK_RATE_LIMIT", 120, "number")?,
            webhook_rate_window: Duration::from_secs(parse_or(
                &get,
                "WEBHOOK_RATE_WINDOW_SECS",
                60,
                "number of seconds",
            )?),
        })
    }

    /// Both consumer credentials, when the gateway client can be built.
    pub fn pesapal_credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.pesapal_consumer_key.as_deref()?,
            self.pesapal_consumer_secret.as_deref()?,
        ))
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
    }
}
