use chainsync_config::shared::{PgConnectionConfig, TlsConfig};
use chainsync_postgres::sqlx::test_utils::{create_pg_database, drop_pg_database};
use chainsync_postgres::types::TableName;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::executor::Executor;

/// Schema holding the tables created by tests.
pub const TEST_DATABASE_SCHEMA: &str = "test";

/// Creates a [`TableName`] in the test schema.
pub fn test_table_name(name: &str) -> TableName {
    TableName::new(TEST_DATABASE_SCHEMA, name)
}

/// Returns the connection settings of a fresh database on the local test server.
///
/// Reads `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`. The database name is random.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    }
}

/// A database created for one test and dropped with [`TestDatabase::drop_database`].
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Creates an empty database with a random name.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created.
    pub async fn spawn() -> Self {
        let config = local_pg_connection_config();
        let pool = create_pg_database(&config).await;

        Self { config, pool }
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.pool.clone())
    }

    /// Closes the pool and drops the database.
    pub async fn drop_database(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}
