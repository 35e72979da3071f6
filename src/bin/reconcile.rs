//! One sweep over stale payments, then exit. Meant for cron.

use {
    giving_sync::{
        config::Config, provider_clients, services::reconciliation::sweep_stale_payments,
    },
    sqlx::postgres::PgPoolOptions,
    std::{process::ExitCode, time::Duration},
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let clients = match provider_clients(&config) {
        Ok(clients) => clients,
        Err(e) => {
            tracing::error!(error = %e, "failed to build provider clients");
            return ExitCode::FAILURE;
        }
    };

    let result = sweep_stale_payments(&pool, &clients, config.sweep, chrono::Utc::now()).await;
    pool.close().await;

    match result {
        Ok(report) => {
            tracing::info!(
                processed = report.processed,
                reconciled = report.reconciled,
                noop = report.noop,
                errors = report.errors,
                "reconcile run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "reconcile run failed");
            ExitCode::FAILURE
        }
    }
}
