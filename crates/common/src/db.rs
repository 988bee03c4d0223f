use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// How long a tick or a writer waits for a free connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the pool shared by the notification writer and the dispatcher.
///
/// A dispatcher tick pins one connection for its whole batch, so
/// `max_connections` must leave headroom for writers running alongside it
/// (`AppConfig` enforces at least two).
/// Connections are pinged on checkout: after a database outage the next tick
/// gets a live connection or a clean acquire error, never a dead socket.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Notification store pool ready");
    Ok(pool)
}
