pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    adapters::{
        admin,
        mobile_webhook::{mobile_gateway_webhook_handler, mobile_money_webhook_handler},
        pesapal_client::{PesapalClient, PesapalConfig, TokenCache},
        rate_limit::{RateLimiter, limit_webhooks},
        stripe_client::StripeProvider,
        stripe_webhook::card_webhook_handler,
    },
    axum::{
        Router,
        extract::DefaultBodyLimit,
        middleware,
        routing::{get, post},
    },
    config::Config,
    domain::{error::PipelineError, provider::ProviderClients},
    services::reconciliation::SweepOptions,
    std::sync::Arc,
};

/// Provider events are a few KB; anything near this is not a webhook.
pub const WEBHOOK_BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub stripe_webhook_secret: Option<Arc<str>>,
    pub pesapal_webhook_secret: Option<Arc<str>>,
    pub mobile_money_webhook_secret: Option<Arc<str>>,
    pub admin_token: Option<Arc<str>>,
    pub providers: ProviderClients,
    pub sweep: SweepOptions,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn from_config(pool: sqlx::PgPool, config: &Config) -> Result<Self, PipelineError> {
        Ok(Self {
            pool,
            stripe_webhook_secret: config.stripe_webhook_secret.as_deref().map(Arc::from),
            pesapal_webhook_secret: config.pesapal_webhook_secret.as_deref().map(Arc::from),
            mobile_money_webhook_secret: config
                .mobile_money_webhook_secret
                .as_deref()
                .map(Arc::from),
            admin_token: config.admin_api_token.as_deref().map(Arc::from),
            providers: provider_clients(config)?,
            sweep: config.sweep,
            rate_limiter: Arc::new(RateLimiter::new(
                config.webhook_rate_limit,
                config.webhook_rate_window,
            )),
        })
    }
}

/// Outbound clients for every provider that has credentials configured.
pub fn provider_clients(config: &Config) -> Result<ProviderClients, PipelineError> {
    let mut clients = ProviderClients::default();

    match config.stripe_api_key.as_deref() {
        Some(key) => clients.card = Some(Arc::new(StripeProvider::new(key))),
        None => tracing::info!("STRIPE_API_KEY not set, card reconciliation disabled"),
    }

    match config.pesapal_credentials() {
        Some((key, secret)) => {
            let pesapal = PesapalClient::new(
                PesapalConfig::new(&config.pesapal_base_url, key, secret),
                Arc::new(TokenCache::new()),
            )?;
            clients.mobile_gateway = Some(Arc::new(pesapal));
        }
        None => tracing::info!("Pesapal credentials not set, gateway reconciliation disabled"),
    }

    Ok(clients)
}

pub fn router(state: AppState) -> Router {
    let webhooks = Router::new()
        .route(
            "/payments/webhooks/stripe-equivalent",
            post(card_webhook_handler),
        )
        .route(
            "/payments/webhooks/mobile-gateway",
            post(mobile_gateway_webhook_handler),
        )
        .route(
            "/payments/webhooks/mobile-money-generic",
            post(mobile_money_webhook_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            limit_webhooks,
        ));

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(webhooks);

    if state.admin_token.is_some() {
        app = app.nest("/admin", admin::routes(state.clone()));
    }

    app.layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT))
        .with_state(state)
}
