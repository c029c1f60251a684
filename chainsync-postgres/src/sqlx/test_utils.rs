use chainsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use pg_escape::{quote_identifier, quote_literal};
use sqlx::{Connection, Executor, PgConnection, PgPool};

/// Opens a connection to the server without selecting the test database.
async fn connect_to_server(config: &PgConnectionConfig) -> Result<PgConnection, sqlx::Error> {
    PgConnection::connect_with(&config.without_db(None)).await
}

/// Creates the database named by `config` and returns a pool connected to it.
///
/// # Panics
/// Panics if the server is unreachable or the database cannot be created.
pub async fn create_pg_database(config: &PgConnectionConfig) -> PgPool {
    let mut connection = connect_to_server(config)
        .await
        .expect("failed to connect to the test server");
    connection
        .execute(&*format!("create database {}", quote_identifier(&config.name)))
        .await
        .expect("failed to create the test database");

    PgPool::connect_with(config.with_db(None))
        .await
        .expect("failed to connect to the test database")
}

/// Terminates the sessions of the database named by `config` and drops it.
///
/// Failures are only printed, so cleaning up a database that is already gone never fails a test.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match connect_to_server(config).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("warning: test database {} not dropped: {err}", config.name);
            return;
        }
    };

    let terminate = format!(
        "select pg_terminate_backend(pid) from pg_stat_activity \
         where datname = {} and pid <> pg_backend_pid()",
        quote_literal(&config.name)
    );
    let drop = format!(
        "drop database if exists {}",
        quote_identifier(&config.name)
    );

    for sql in [terminate, drop] {
        if let Err(err) = connection.execute(sql.as_str()).await {
            eprintln!("warning: cleanup of test database {} failed: {err}", config.name);
        }
    }
}
