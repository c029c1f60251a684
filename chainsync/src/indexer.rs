//! Startup sequence tying materialization, backfill and live delivery together.

use std::sync::Arc;

use chainsync_config::shared::{CHAINSYNC_INDEXER_OPTIONS, IndexerConfig};
use chainsync_postgres::pool::connect_pool;
use chainsync_postgres::types::TableName;
use serde::Serialize;
use tracing::{error, info};

use crate::backfill::{AggregateStats, BackfillWindow, HttpInputSource, InputSource, backfill};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::dispatch::{Dispatcher, HandlerRegistry};
use crate::error::{SyncError, SyncResult};
use crate::live::{LiveSource, run_live};
use crate::schema::Materializer;
use crate::store::executor::Executor;
use crate::store::rows::postgres::PostgresRowStore;

/// Default bound on concurrently dispatched live inputs.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 8;

/// What one indexer run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexerReport {
    /// Domain tables, as materialized.
    pub tables: Vec<TableName>,
    /// Backfill counters, when a backfill ran.
    pub backfill: Option<AggregateStats>,
    /// Live inputs received before delivery stopped.
    pub live_inputs: u64,
}

/// Runs the registered domains end to end.
pub struct Indexer {
    materializer: Materializer,
    dispatcher: Dispatcher,
    backfill: Option<(Arc<dyn InputSource>, BackfillWindow)>,
    live: Option<Arc<dyn LiveSource>>,
    max_concurrent_dispatches: usize,
    shutdown_tx: ShutdownTx,
}

impl Indexer {
    pub fn new(materializer: Materializer, dispatcher: Dispatcher) -> Self {
        // Receivers are created through `subscribe`, the initial one is not needed.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            materializer,
            dispatcher,
            backfill: None,
            live: None,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
            shutdown_tx,
        }
    }

    /// Builds an indexer persisting to the configured database.
    ///
    /// When a backfill source is configured, the whole history is replayed; use
    /// [`Indexer::with_backfill`] to narrow the window. Live delivery is attached separately.
    pub fn from_config(config: &IndexerConfig, registry: HandlerRegistry) -> SyncResult<Self> {
        let pool = connect_pool(&config.database, &config.pool, &CHAINSYNC_INDEXER_OPTIONS);
        let executor = Executor::new(pool);
        let store = Arc::new(PostgresRowStore::new(executor.clone()));

        let mut indexer = Indexer::new(
            Materializer::new(executor),
            Dispatcher::new(store, registry),
        )
        .with_max_concurrent_dispatches(config.max_concurrent_dispatches);

        if let Some(backfill) = &config.backfill {
            let source = HttpInputSource::new(backfill)?;
            indexer = indexer.with_backfill(Arc::new(source), BackfillWindow::AllTime);
        }

        Ok(indexer)
    }

    /// Replays `window` from `source` before live delivery starts.
    pub fn with_backfill(mut self, source: Arc<dyn InputSource>, window: BackfillWindow) -> Self {
        self.backfill = Some((source, window));
        self
    }

    /// Delivers inputs from `source` once the backfill is done.
    pub fn with_live(mut self, source: Arc<dyn LiveSource>) -> Self {
        self.live = Some(source);
        self
    }

    pub fn with_max_concurrent_dispatches(mut self, max_concurrent_dispatches: usize) -> Self {
        self.max_concurrent_dispatches = max_concurrent_dispatches;
        self
    }

    /// Returns the sender that stops live delivery.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Materializes every domain table, runs the backfill if any, then delivers live inputs
    /// until the source closes or shutdown is requested.
    ///
    /// A table that cannot be materialized halts startup before any input is processed.
    pub async fn start(&self) -> SyncResult<IndexerReport> {
        let mut report = IndexerReport {
            tables: self.materialize_all().await?,
            ..IndexerReport::default()
        };

        if let Some((source, window)) = &self.backfill {
            let stats = backfill(source.as_ref(), &self.dispatcher, window.clone()).await?;
            info!(%stats, "backfill stats");
            report.backfill = Some(stats);
        }

        if let Some(source) = &self.live {
            report.live_inputs = run_live(
                source.as_ref(),
                &self.dispatcher,
                self.max_concurrent_dispatches,
                self.shutdown_tx.subscribe(),
            )
            .await?;
        }

        Ok(report)
    }

    /// Materializes the table of every registered domain.
    ///
    /// All tables are attempted; the failures are returned together.
    pub async fn materialize_all(&self) -> SyncResult<Vec<TableName>> {
        let mut tables: Vec<TableName> = vec![];
        let mut errors: Vec<SyncError> = vec![];

        for domain in self.dispatcher.registry().domains() {
            if tables.contains(&domain.table.name) {
                continue;
            }

            match self.materializer.materialize(&domain.table).await {
                Ok(table) => {
                    info!(domain = %domain.name, table = %table, "table ready");
                    tables.push(table);
                }
                Err(err) => {
                    error!(
                        domain = %domain.name,
                        table = %domain.table.name,
                        error = %err,
                        "table could not be materialized"
                    );
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(tables)
    }
}
