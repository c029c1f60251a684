use chainsync_postgres::record::{Record, decode_rows};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use tracing::{debug, warn};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;

/// One parameterized SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub bindings: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }

    /// Creates a statement without parameters, typically DDL.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, vec![])
    }
}

/// Runs statements on a Postgres pool and decodes result rows into [`Record`]s.
///
/// Each call checks out one connection and returns it to the pool when the call completes,
/// whatever the outcome.
#[derive(Debug, Clone)]
pub struct Executor {
    pool: PgPool,
}

impl Executor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs one statement in its own implicit transaction.
    ///
    /// Any driver or server failure is returned as [`ErrorKind::QueryFailed`].
    pub async fn query(&self, sql: &str, bindings: &[Value]) -> SyncResult<Vec<Record>> {
        debug!(sql, bindings = bindings.len(), "running query");

        let rows = bind_all(sqlx::query(sql), bindings)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                sync_error!(ErrorKind::QueryFailed, "Query failed", err.to_string(), source: err)
            })?;

        Ok(decode_rows(&rows)?)
    }

    /// Runs one [`Statement`].
    pub async fn execute(&self, statement: &Statement) -> SyncResult<Vec<Record>> {
        self.query(&statement.sql, &statement.bindings).await
    }

    /// Runs all statements on one connection inside one transaction.
    ///
    /// Returns the records of every statement, in order. If any statement or the commit fails,
    /// the transaction is rolled back and a single [`ErrorKind::TransactionFailed`] error naming
    /// the failing statement is returned; no statement is partially applied.
    pub async fn transaction(&self, statements: &[Statement]) -> SyncResult<Vec<Vec<Record>>> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|err| transaction_error("Transaction could not be started", err))?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            debug!(sql = %statement.sql, index, "running statement in transaction");

            let outcome = bind_all(sqlx::query(&statement.sql), &statement.bindings)
                .fetch_all(&mut *transaction)
                .await;

            let rows = match outcome {
                Ok(rows) => rows,
                Err(err) => {
                    if let Err(rollback_err) = transaction.rollback().await {
                        warn!(error = %rollback_err, "failed to roll back transaction");
                    }

                    return Err(sync_error!(
                        ErrorKind::TransactionFailed,
                        "Transaction rolled back",
                        format!("statement {index} (`{}`) failed: {err}", statement.sql),
                        source: err
                    ));
                }
            };

            match decode_rows(&rows) {
                Ok(records) => results.push(records),
                Err(err) => {
                    if let Err(rollback_err) = transaction.rollback().await {
                        warn!(error = %rollback_err, "failed to roll back transaction");
                    }

                    return Err(SyncError::from(err).with_kind(ErrorKind::TransactionFailed));
                }
            }
        }

        // A failed commit leaves nothing applied; the connection is released when the
        // transaction is dropped.
        transaction
            .commit()
            .await
            .map_err(|err| transaction_error("Transaction could not be committed", err))?;

        Ok(results)
    }
}

fn transaction_error(description: &'static str, err: sqlx::Error) -> SyncError {
    sync_error!(ErrorKind::TransactionFailed, description, err.to_string(), source: err)
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    bindings: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in bindings {
        query = bind_value(query, value);
    }
    query
}

/// Binds a JSON value with the Postgres type matching its JSON type.
///
/// Arrays and objects are bound as `jsonb`. Statements built by
/// [`crate::store::builder::StatementBuilder`] cast placeholders to the column type, which
/// converts these to whatever the column holds.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(value) => query.bind(*value),
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                query.bind(value)
            } else if let Some(value) = number.as_f64() {
                query.bind(value)
            } else {
                query.bind(number.to_string())
            }
        }
        Value::String(value) => query.bind(value.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    }
}
