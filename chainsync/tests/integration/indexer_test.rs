use std::sync::Arc;

use chainsync::backfill::BackfillWindow;
use chainsync::dispatch::{Dispatcher, HandlerRegistry};
use chainsync::indexer::Indexer;
use chainsync::schema::Materializer;
use chainsync::store::rows::RowStore;
use chainsync::store::rows::postgres::PostgresRowStore;
use chainsync::test_utils::database::TestDatabase;
use chainsync::test_utils::handlers::{
    BALANCES_DOMAIN, PAIRS_DOMAIN, PairCreatedHandler, TransferHandler, balances_table,
    pair_created, pairs_table, transfer_event,
};
use chainsync::test_utils::sources::{MemoryInputSource, MemoryLiveSource};
use chainsync_config::shared::{IndexerConfig, PoolConfig};
use chainsync_telemetry::tracing::init_test_tracing;

fn registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .domain(BALANCES_DOMAIN, balances_table())
        .domain(PAIRS_DOMAIN, pairs_table())
        .on_event(BALANCES_DOMAIN, "erc20.Transfer", TransferHandler)
        .on_event(PAIRS_DOMAIN, "factory.PairCreated", PairCreatedHandler)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn indexer_materializes_backfills_and_follows_live_inputs() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let store = Arc::new(PostgresRowStore::new(executor.clone()));
    let dispatcher = Dispatcher::new(store.clone(), registry());

    let history = MemoryInputSource::new(vec![
        vec![transfer_event(1, "0x01", 5), pair_created(1, "0xaaa")],
        vec![transfer_event(2, "0x02", 3)],
    ]);
    let live = MemoryLiveSource::new(vec![
        transfer_event(3, "0x01", 2),
        transfer_event(4, "0x03", 1),
    ]);

    let indexer = Indexer::new(Materializer::new(executor), dispatcher)
        .with_backfill(Arc::new(history.clone()), BackfillWindow::AllTime)
        .with_live(Arc::new(live))
        .with_max_concurrent_dispatches(1);

    let report = indexer.start().await.unwrap();

    assert_eq!(report.tables, vec![balances_table().name, pairs_table().name]);
    let stats = report.backfill.unwrap();
    assert_eq!(history.fetch_count(), 2);
    assert_eq!(stats.inputs["erc20.Transfer"], 2);
    assert_eq!(stats.table_rows["public.balances"], 2);
    assert_eq!(report.live_inputs, 2);

    assert_eq!(store.count_rows(&balances_table().name).await.unwrap(), 3);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn table_failure_halts_startup() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();

    // A conflicting view makes the table impossible to create.
    executor
        .execute(&chainsync::store::executor::Statement::raw(
            "create view public.balances as select 1 as one",
        ))
        .await
        .unwrap();

    let history = MemoryInputSource::new(vec![vec![transfer_event(1, "0x01", 5)]]);
    let dispatcher = Dispatcher::new(Arc::new(PostgresRowStore::new(executor.clone())), registry());
    let indexer = Indexer::new(Materializer::new(executor), dispatcher)
        .with_backfill(Arc::new(history.clone()), BackfillWindow::AllTime);

    assert!(indexer.start().await.is_err());
    assert_eq!(history.fetch_count(), 0);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn indexer_built_from_config_materializes_its_domains() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let config = IndexerConfig {
        database: database.config.clone(),
        pool: PoolConfig::default(),
        backfill: None,
        max_concurrent_dispatches: IndexerConfig::DEFAULT_MAX_CONCURRENT_DISPATCHES,
    };

    let indexer = Indexer::from_config(&config, registry()).unwrap();
    let report = indexer.start().await.unwrap();

    assert_eq!(report.tables, vec![balances_table().name, pairs_table().name]);
    assert!(report.backfill.is_none());
    assert_eq!(report.live_inputs, 0);

    database.drop_database().await;
}
