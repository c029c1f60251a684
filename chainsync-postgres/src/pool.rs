use std::time::Duration;

use chainsync_config::shared::{
    IntoConnectOptions, PgConnectionConfig, PgConnectionOptions, PoolConfig,
};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Builds a lazily connecting pool for the configured database.
///
/// No connection is opened until the first query, so a process can start while the database is
/// still coming up. Every connection applies the given session `options`.
pub fn connect_pool(
    config: &PgConnectionConfig,
    pool_config: &PoolConfig,
    options: &PgConnectionOptions,
) -> PgPool {
    PgPoolOptions::new()
        .max_connections(pool_config.max_connections)
        .acquire_timeout(Duration::from_millis(pool_config.acquire_timeout_ms))
        .connect_lazy_with(config.with_db(Some(options)))
}
