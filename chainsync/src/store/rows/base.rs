use async_trait::async_trait;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::{TableName, TableSpec};

use crate::error::SyncResult;

/// Storage of domain rows, as seen by handlers and the dispatcher.
///
/// Rows are identified by the columns of the table's primary uniqueness group (the first
/// `unique_by` group). Implementations must apply one [`RowStore::upsert_rows`] call atomically:
/// either every row is written or none is.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Loads the row whose columns match every entry of `key`.
    ///
    /// Returns the first match when `key` does not identify a single row.
    async fn load_row(&self, table: &TableSpec, key: &Record) -> SyncResult<Option<Record>>;

    /// Inserts the rows, replacing existing rows with the same primary uniqueness group values.
    ///
    /// Tables without a uniqueness group only get inserts. Returns the number of rows written.
    async fn upsert_rows(&self, table: &TableSpec, rows: Vec<Record>) -> SyncResult<usize>;

    /// Returns the number of rows stored in the table.
    async fn count_rows(&self, table: &TableName) -> SyncResult<u64>;
}
