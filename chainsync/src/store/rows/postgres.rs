use async_trait::async_trait;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::{TableName, TableSpec};
use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorKind, SyncResult};
use crate::store::builder::{ColumnTypes, ConflictAction, OnConflict, StatementBuilder};
use crate::store::executor::Executor;
use crate::store::rows::RowStore;
use crate::sync_error;

/// [`RowStore`] backed by the domain tables in Postgres.
#[derive(Debug, Clone)]
pub struct PostgresRowStore {
    executor: Executor,
}

impl PostgresRowStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl RowStore for PostgresRowStore {
    async fn load_row(&self, table: &TableSpec, key: &Record) -> SyncResult<Option<Record>> {
        let types = ColumnTypes::from_spec(table);
        let statement = StatementBuilder::new(&table.name)
            .with_types(&types)
            .select(key, &[], Some(1));

        let mut rows = self.executor.execute(&statement).await?;

        Ok(rows.pop())
    }

    /// Writes all rows in one transaction, as `insert ... on conflict do update` statements
    /// targeting the primary uniqueness group.
    async fn upsert_rows(&self, table: &TableSpec, rows: Vec<Record>) -> SyncResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let types = ColumnTypes::from_spec(table);
        let builder = StatementBuilder::new(&table.name).with_types(&types);
        let on_conflict = table
            .primary_group()
            .map(|group| OnConflict::new(group.iter().cloned(), ConflictAction::DoUpdate));

        let statements = rows
            .iter()
            .map(|row| builder.insert(row, on_conflict.as_ref()))
            .collect::<Vec<_>>();

        debug!(table = %table.name, count = statements.len(), "upserting rows");

        self.executor
            .transaction(&statements)
            .await
            .map_err(|err| err.with_kind(ErrorKind::PersistenceFailed))?;

        Ok(rows.len())
    }

    async fn count_rows(&self, table: &TableName) -> SyncResult<u64> {
        let statement = StatementBuilder::new(table).count();
        let rows = self.executor.execute(&statement).await?;
        count_from_rows(table, &rows)
    }
}

/// Reads the `count` column of a single-row count result.
fn count_from_rows(table: &TableName, rows: &[Record]) -> SyncResult<u64> {
    rows.first()
        .and_then(|row| row.get("count"))
        .and_then(|value| match value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        })
        .ok_or_else(|| {
            sync_error!(
                ErrorKind::QueryFailed,
                "Row count missing from result",
                format!("table {table}")
            )
        })
}
