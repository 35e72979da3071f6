use {
    giving_sync::{AppState, config::Config, router, services::worker::run_sweeper},
    sqlx::postgres::PgPoolOptions,
    std::{net::SocketAddr, time::Duration},
    tokio::{signal, sync::watch},
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = AppState::from_config(pool.clone(), &config).expect("failed to build provider clients");
    if state.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, card webhooks will answer 500");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = config.reconcile_interval.map(|interval| {
        tokio::spawn(run_sweeper(
            pool.clone(),
            state.providers.clone(),
            config.sweep,
            interval,
            shutdown_rx.clone(),
        ))
    });

    let app = router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    pool.close().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
