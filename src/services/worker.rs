use {
    crate::domain::provider::ProviderClients,
    crate::services::reconciliation::{SweepOptions, sweep_stale_payments},
    chrono::Utc,
    sqlx::PgPool,
    std::time::Duration,
    tokio::sync::watch,
};

/// Periodically sweep stale payments until shutdown. A failed run is logged
/// and retried on the next tick.
pub async fn run_sweeper(
    pool: PgPool,
    clients: ProviderClients,
    opts: SweepOptions,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        staleness_minutes = opts.staleness_minutes,
        batch_limit = opts.batch_limit,
        "reconciliation sweeper started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("reconciliation sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match sweep_stale_payments(&pool, &clients, opts, Utc::now()).await {
            Ok(report) if report.processed == 0 => {}
            Ok(report) => tracing::info!(?report, "sweep run complete"),
            Err(e) => tracing::error!(error = %e, "sweep run failed"),
        }
    }
}
