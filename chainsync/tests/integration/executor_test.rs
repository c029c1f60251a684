use chainsync::error::ErrorKind;
use chainsync::schema::Materializer;
use chainsync::store::executor::Statement;
use chainsync::store::rows::RowStore;
use chainsync::store::rows::postgres::PostgresRowStore;
use chainsync::test_utils::database::{TestDatabase, test_table_name};
use chainsync::test_utils::handlers::balances_table;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::{ColumnSpec, TableSpec};
use chainsync_telemetry::tracing::init_test_tracing;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn failed_transaction_applies_nothing() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let spec = TableSpec::new(test_table_name("events"), vec![ColumnSpec::new("n", "int4")]);
    materializer.materialize(&spec).await.unwrap();

    let err = executor
        .transaction(&[
            Statement::new("insert into test.events (n) values ($1)", vec![json!(1)]),
            Statement::new("insert into test.events (n) values ($1)", vec![json!(2)]),
            Statement::raw("insert into test.missing (n) values (3)"),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    assert!(err.detail().unwrap().contains("statement 2"));
    assert_eq!(materializer.row_count(&spec.name).await.unwrap(), 0);

    // The pool is still usable afterwards.
    let results = executor
        .transaction(&[Statement::new(
            "insert into test.events (n) values ($1) returning n",
            vec![json!(4)],
        )])
        .await
        .unwrap();
    assert_eq!(results[0][0].get("n"), Some(&json!(4)));

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn query_decodes_rows_in_column_order() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();

    let rows = executor
        .query(
            "select $1::int8 as big, $2::text as label, 12.50::numeric as amount, \
             null::int4 as missing, true as flag, '{\"a\": 1}'::jsonb as doc",
            &[json!(9_007_199_254_740_993i64), json!("hello")],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(
        row.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["big", "label", "amount", "missing", "flag", "doc"]
    );
    assert_eq!(row["big"], json!("9007199254740993"));
    assert_eq!(row["label"], json!("hello"));
    assert_eq!(row["amount"], json!("12.50"));
    assert_eq!(row["missing"], json!(null));
    assert_eq!(row["flag"], json!(true));
    assert_eq!(row["doc"], json!({ "a": 1 }));

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn query_failure_is_reported() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;

    let err = database
        .executor()
        .query("select * from test.does_not_exist", &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryFailed);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn row_store_upserts_by_primary_group() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    Materializer::new(executor.clone())
        .materialize(&balances_table())
        .await
        .unwrap();
    let store = PostgresRowStore::new(executor);
    let table = balances_table();

    let row = |holder: &str, balance: i64| -> Record {
        let mut row = Record::new();
        row.insert("holder".to_string(), json!(holder));
        row.insert("balance".to_string(), json!(balance));
        row.insert("updated_at_block".to_string(), json!(1));
        row
    };

    let written = store
        .upsert_rows(&table, vec![row("0x01", 5), row("0x02", 1)])
        .await
        .unwrap();
    assert_eq!(written, 2);
    store.upsert_rows(&table, vec![row("0x01", 8)]).await.unwrap();

    assert_eq!(store.count_rows(&table.name).await.unwrap(), 2);

    let mut key = Record::new();
    key.insert("holder".to_string(), json!("0x01"));
    let loaded = store.load_row(&table, &key).await.unwrap().unwrap();
    assert_eq!(loaded["balance"], json!("8"));

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn row_store_round_trips_time_and_network_types() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let table = TableSpec::new(
        test_table_name("schedules"),
        vec![
            ColumnSpec::new("addr", "text"),
            ColumnSpec::new("opens_at", "timetz"),
            ColumnSpec::new("clock", "time"),
            ColumnSpec::new("block_date", "date"),
            ColumnSpec::new("span", "interval"),
            ColumnSpec::new("host", "inet"),
            ColumnSpec::new("network", "cidr"),
            ColumnSpec::new("code", "char(2)"),
            ColumnSpec::new("price", "numeric(10, 2)"),
        ],
    )
    .unique_by(["addr"]);
    Materializer::new(executor.clone())
        .materialize(&table)
        .await
        .unwrap();
    let store = PostgresRowStore::new(executor);

    let row = match json!({
        "addr": "0x01",
        "opens_at": "12:30:00+02",
        "clock": "08:00:00",
        "block_date": "2024-01-31",
        "span": "1 day 04:05:06.5",
        "host": "10.0.0.1",
        "network": "10.0.0.0/24",
        "code": "a",
        "price": "12.5",
    }) {
        serde_json::Value::Object(row) => row,
        _ => unreachable!(),
    };
    store.upsert_rows(&table, vec![row]).await.unwrap();

    let mut key = Record::new();
    key.insert("addr".to_string(), json!("0x01"));
    let loaded = store.load_row(&table, &key).await.unwrap().unwrap();

    assert_eq!(loaded["opens_at"], json!("12:30:00+02:00"));
    assert_eq!(loaded["clock"], json!("08:00:00"));
    assert_eq!(loaded["block_date"], json!("2024-01-31"));
    assert_eq!(loaded["span"], json!("1 day 04:05:06.5"));
    assert_eq!(loaded["host"], json!("10.0.0.1"));
    assert_eq!(loaded["network"], json!("10.0.0.0/24"));
    assert_eq!(loaded["code"], json!("a "));
    assert_eq!(loaded["price"], json!("12.50"));

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn query_renders_other_types_as_text() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();

    executor
        .execute(&Statement::raw("create type public.mood as enum ('calm', 'happy')"))
        .await
        .unwrap();

    let rows = executor
        .query(
            "select 'happy'::public.mood as mood, '192.168.0.1/24'::inet as host, \
             array['12:00:00+00'::timetz] as opens, 0.000001::numeric as tiny, \
             'NaN'::numeric as nan",
            &[],
        )
        .await
        .unwrap();

    let row = &rows[0];
    assert_eq!(row["mood"], json!("happy"));
    assert_eq!(row["host"], json!("192.168.0.1/24"));
    assert_eq!(row["opens"], json!(["12:00:00+00:00"]));
    assert_eq!(row["tiny"], json!("0.000001"));
    assert_eq!(row["nan"], json!("NaN"));

    database.drop_database().await;
}
