use async_trait::async_trait;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::TableSpec;

use crate::error::SyncResult;
use crate::store::rows::RowStore;
use crate::types::{HandlerOutcome, Input};

/// Domain logic reacting to one kind of input.
///
/// Handlers never write directly. They describe their effects through the returned
/// [`HandlerOutcome`] and the dispatcher persists the rows and forwards the side effects.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, input: &Input, ctx: &HandlerContext<'_>) -> SyncResult<HandlerOutcome>;
}

/// Read access to the domain table, scoped to one handler invocation.
pub struct HandlerContext<'a> {
    table: &'a TableSpec,
    store: &'a dyn RowStore,
}

impl<'a> HandlerContext<'a> {
    pub fn new(table: &'a TableSpec, store: &'a dyn RowStore) -> Self {
        Self { table, store }
    }

    /// Returns the desired shape of the domain table.
    pub fn table(&self) -> &TableSpec {
        self.table
    }

    /// Loads the persisted domain row matching `key`.
    pub async fn load_row(&self, key: &Record) -> SyncResult<Option<Record>> {
        self.store.load_row(self.table, key).await
    }
}
