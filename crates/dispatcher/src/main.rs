use std::sync::Arc;

use herald_common::clock::SystemClock;
use herald_common::config::AppConfig;
use herald_common::db;
use herald_dispatcher::{DispatchSettings, Dispatcher, shutdown};
use herald_notifier::build_channel;
use herald_store::PgNotificationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_dispatcher=info,herald_store=info,herald_notifier=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Herald dispatcher starting...");

    // Any failure up to here is fatal: the dispatcher never starts.
    let config = AppConfig::from_env()?;
    let channel = build_channel(&config)?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let dispatcher = Dispatcher::new(
        Arc::new(PgNotificationStore::new(pool)),
        channel,
        Arc::new(SystemClock),
        DispatchSettings::from(&config),
    );

    let (shutdown, signal) = shutdown::channel();
    let worker = tokio::spawn(async move { dispatcher.run(signal).await });

    wait_for_shutdown_signal().await;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    shutdown.trigger();

    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Dispatcher task ended abnormally");
        return Err(e.into());
    }

    tracing::info!("Herald dispatcher stopped.");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
