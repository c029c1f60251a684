use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::{TableName, TableSpec};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;
use crate::store::rows::RowStore;

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, Vec<Record>>,
}

/// In-memory [`RowStore`] for tests and dry runs.
///
/// Rows live in memory only and are lost when the process exits. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the rows of a table, in insertion order.
    pub async fn rows(&self, table: &TableName) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    /// Removes every row of every table.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.tables.clear();
    }
}

fn key_of(table: &TableName, group: &[String], row: &Record) -> SyncResult<Record> {
    group
        .iter()
        .map(|column| match row.get(column) {
            Some(value) if !value.is_null() => Ok((column.clone(), value.clone())),
            _ => Err(sync_error!(
                ErrorKind::PersistenceFailed,
                "Row is missing a key column",
                format!("column `{column}` of table {table}")
            )),
        })
        .collect()
}

fn matches(row: &Record, key: &Record) -> bool {
    key.iter().all(|(column, value)| row.get(column) == Some(value))
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn load_row(&self, table: &TableSpec, key: &Record) -> SyncResult<Option<Record>> {
        let inner = self.inner.lock().await;

        let row = inner
            .tables
            .get(&table.name)
            .and_then(|rows| rows.iter().find(|row| matches(row, key)))
            .cloned();

        Ok(row)
    }

    async fn upsert_rows(&self, table: &TableSpec, rows: Vec<Record>) -> SyncResult<usize> {
        let mut inner = self.inner.lock().await;
        let stored = inner.tables.entry(table.name.clone()).or_default();
        let count = rows.len();

        debug!(table = %table.name, count, "upserting rows in memory");

        // Key columns are NOT NULL in a materialized table, so a batch with a row lacking one is
        // rejected as a whole.
        let keyed = rows
            .into_iter()
            .map(|row| {
                let key = table.primary_group().map(|group| key_of(&table.name, group, &row));
                key.transpose().map(|key| (key, row))
            })
            .collect::<SyncResult<Vec<_>>>()?;

        for (key, row) in keyed {
            let position = key
                .as_ref()
                .and_then(|key| stored.iter().position(|stored_row| matches(stored_row, key)));
            match position {
                Some(index) => stored[index].extend(row),
                None => stored.push(row),
            }
        }

        Ok(count)
    }

    async fn count_rows(&self, table: &TableName) -> SyncResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(table).map_or(0, |rows| rows.len() as u64))
    }
}
