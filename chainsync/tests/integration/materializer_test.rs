use chainsync::error::ErrorKind;
use chainsync::schema::{DdlPlan, Materializer, diff};
use chainsync::store::executor::Statement;
use chainsync::test_utils::database::{TestDatabase, test_table_name};
use chainsync_postgres::types::{ColumnSpec, TableSpec};
use chainsync_telemetry::tracing::init_test_tracing;

fn transfers_spec() -> TableSpec {
    TableSpec::new(
        test_table_name("transfers"),
        vec![
            ColumnSpec::new("tx_hash", "varchar(66)"),
            ColumnSpec::new("log_index", "integer"),
            ColumnSpec::new("amount", "numeric(78, 0)").not_null().with_default("0"),
            ColumnSpec::new("token", "varchar").with_default("'eth'"),
            ColumnSpec::new("block_time", "timestamp with time zone"),
            ColumnSpec::new("topics", "text[]"),
            ColumnSpec::new("payload", "jsonb"),
        ],
    )
    .unique_by(["tx_hash", "log_index"])
    .unique_by(["payload", "token"])
    .index_by(["block_time"])
    .index_by(["token", "amount"])
}

#[tokio::test(flavor = "multi_thread")]
async fn materialized_table_round_trips() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let materializer = Materializer::new(database.executor());
    let desired = transfers_spec();

    let table = materializer.materialize(&desired).await.unwrap();
    assert_eq!(table, desired.name);

    let current = materializer.current_spec(&table).await.unwrap().unwrap();
    let diff = diff(&current.spec, &desired.clone().with_primary_group_not_null());
    assert!(diff.is_empty(), "unexpected diff: {diff:?}");

    assert_eq!(current.primary_key.unwrap().columns, vec!["id".to_string()]);
    assert!(current.spec.column("tx_hash").unwrap().not_null);
    assert!(!current.spec.column("token").unwrap().not_null);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn materialize_is_idempotent() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let materializer = Materializer::new(database.executor());
    let desired = transfers_spec();

    assert!(matches!(
        materializer.plan_for(&desired).await.unwrap(),
        DdlPlan::Create(_)
    ));

    materializer.materialize(&desired).await.unwrap();
    assert_eq!(materializer.plan_for(&desired).await.unwrap(), DdlPlan::Empty);

    materializer.materialize(&desired).await.unwrap();
    assert_eq!(materializer.plan_for(&desired).await.unwrap(), DdlPlan::Empty);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn nullability_change_keeps_rows() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let before = TableSpec::new(
        test_table_name("holders"),
        vec![ColumnSpec::new("addr", "varchar"), ColumnSpec::new("x", "int4")],
    );
    materializer.materialize(&before).await.unwrap();
    executor
        .execute(&Statement::raw(
            "insert into test.holders (addr, x) values ('0x01', 1)",
        ))
        .await
        .unwrap();

    let after = TableSpec::new(
        test_table_name("holders"),
        vec![
            ColumnSpec::new("addr", "varchar"),
            ColumnSpec::new("x", "int4").not_null(),
        ],
    )
    .index_by(["addr"]);
    let plan = materializer.plan_for(&after).await.unwrap();
    assert_eq!(plan.kind(), "incremental");

    materializer.materialize(&after).await.unwrap();

    assert_eq!(materializer.row_count(&after.name).await.unwrap(), 1);
    assert_eq!(materializer.plan_for(&after).await.unwrap(), DdlPlan::Empty);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn column_swap_replaces_table() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let before = TableSpec::new(test_table_name("swap"), vec![ColumnSpec::new("x", "int4")]);
    materializer.materialize(&before).await.unwrap();
    executor
        .execute(&Statement::raw("insert into test.swap (x) values (1)"))
        .await
        .unwrap();

    let after = TableSpec::new(test_table_name("swap"), vec![ColumnSpec::new("y", "int4")]);
    assert_eq!(materializer.plan_for(&after).await.unwrap().kind(), "replace");

    materializer.materialize(&after).await.unwrap();

    assert_eq!(materializer.row_count(&after.name).await.unwrap(), 0);
    let current = materializer.current_spec(&after.name).await.unwrap().unwrap();
    assert!(current.spec.column("x").is_none());
    assert!(current.spec.column("y").is_some());

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn removed_unique_group_is_dropped() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let materializer = Materializer::new(database.executor());

    let before = TableSpec::new(
        test_table_name("pairs"),
        vec![ColumnSpec::new("pair", "varchar"), ColumnSpec::new("token", "varchar")],
    )
    .unique_by(["pair"])
    .unique_by(["token"]);
    materializer.materialize(&before).await.unwrap();

    let after = TableSpec::new(
        test_table_name("pairs"),
        vec![ColumnSpec::new("pair", "varchar"), ColumnSpec::new("token", "varchar")],
    )
    .unique_by(["pair"]);
    materializer.materialize(&after).await.unwrap();

    let current = materializer.current_spec(&after.name).await.unwrap().unwrap();
    assert_eq!(current.unique_constraints.len(), 1);
    assert_eq!(current.unique_constraints[0].columns, vec!["pair".to_string()]);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_table_removes_rows() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let spec = TableSpec::new(test_table_name("logs"), vec![ColumnSpec::new("line", "text")]);
    materializer.materialize(&spec).await.unwrap();
    executor
        .execute(&Statement::raw(
            "insert into test.logs (line) values ('a'), ('b')",
        ))
        .await
        .unwrap();
    assert_eq!(materializer.row_count(&spec.name).await.unwrap(), 2);

    materializer.clear_table(&spec.name).await.unwrap();

    assert_eq!(materializer.row_count(&spec.name).await.unwrap(), 0);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_spec_is_rejected_before_ddl() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let materializer = Materializer::new(database.executor());

    let spec = TableSpec::new(test_table_name("broken"), vec![ColumnSpec::new("a", "int4")])
        .unique_by(["missing"]);

    let err = materializer.materialize(&spec).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTableSpec);
    assert!(materializer.current_spec(&spec.name).await.unwrap().is_none());

    database.drop_database().await;
}

/// One column per type bucket, each in a spelling other than the one the catalog reports.
fn every_type_spec() -> TableSpec {
    TableSpec::new(
        test_table_name("every_type"),
        vec![
            ColumnSpec::new("small", "smallint"),
            ColumnSpec::new("regular", "integer"),
            ColumnSpec::new("wide", "bigint"),
            ColumnSpec::new("amount", "numeric(78, 0)"),
            ColumnSpec::new("ratio", "decimal"),
            ColumnSpec::new("single", "real"),
            ColumnSpec::new("narrow", "float(24)"),
            ColumnSpec::new("precise", "float(53)"),
            ColumnSpec::new("fallback", "double precision"),
            ColumnSpec::new("flag", "boolean"),
            ColumnSpec::new("code", "char(1)"),
            ColumnSpec::new("addr", "character varying(42)"),
            ColumnSpec::new("label", "text"),
            ColumnSpec::new("doc", "json"),
            ColumnSpec::new("payload", "jsonb"),
            ColumnSpec::new("block_date", "date"),
            ColumnSpec::new("clock", "time without time zone"),
            ColumnSpec::new("opens", "timetz"),
            ColumnSpec::new("local_time", "timestamp(3)"),
            ColumnSpec::new("block_time", "timestamp with time zone"),
            ColumnSpec::new("topics", "text[]"),
            ColumnSpec::new("ids", "integer[]"),
            ColumnSpec::new("weights", "float(10)[]"),
        ],
    )
    .unique_by(["addr"])
    .index_by(["block_time"])
}

#[tokio::test(flavor = "multi_thread")]
async fn every_type_spelling_is_idempotent() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let materializer = Materializer::new(database.executor());
    let desired = every_type_spec();

    materializer.materialize(&desired).await.unwrap();
    assert_eq!(materializer.plan_for(&desired).await.unwrap(), DdlPlan::Empty);

    let current = materializer.current_spec(&desired.name).await.unwrap().unwrap();
    assert_eq!(current.spec.column("narrow").unwrap().typ, "float4");
    assert_eq!(current.spec.column("precise").unwrap().typ, "float8");
    assert_eq!(current.spec.column("weights").unwrap().typ, "float4[]");

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn float_precision_keeps_rows_across_runs() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let desired = TableSpec::new(
        test_table_name("prices"),
        vec![ColumnSpec::new("addr", "text"), ColumnSpec::new("price", "float(24)")],
    );
    materializer.materialize(&desired).await.unwrap();
    executor
        .execute(&Statement::raw(
            "insert into test.prices (addr, price) values ('0x01', 1.5)",
        ))
        .await
        .unwrap();

    assert_eq!(materializer.plan_for(&desired).await.unwrap(), DdlPlan::Empty);
    materializer.materialize(&desired).await.unwrap();

    assert_eq!(materializer.row_count(&desired.name).await.unwrap(), 1);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn serial_columns_are_idempotent() {
    init_test_tracing();
    let database = TestDatabase::spawn().await;
    let executor = database.executor();
    let materializer = Materializer::new(executor.clone());

    let mut flagged = ColumnSpec::new("seq", "int4");
    flagged.serial = true;
    let desired = TableSpec::new(
        test_table_name("sequenced"),
        vec![
            ColumnSpec::new("addr", "text"),
            flagged,
            ColumnSpec::new("n", "serial"),
            ColumnSpec::new("big", "bigserial"),
        ],
    );

    materializer.materialize(&desired).await.unwrap();
    assert_eq!(materializer.plan_for(&desired).await.unwrap(), DdlPlan::Empty);

    materializer.materialize(&desired).await.unwrap();
    executor
        .execute(&Statement::raw(
            "insert into test.sequenced (addr) values ('0x01'), ('0x02')",
        ))
        .await
        .unwrap();

    // The sequences are still attached.
    let rows = executor
        .query("select seq, n, big from test.sequenced order by seq", &[])
        .await
        .unwrap();
    assert_eq!(rows[1]["seq"], serde_json::json!(2));
    assert_eq!(rows[1]["n"], serde_json::json!(2));
    assert_eq!(rows[1]["big"], serde_json::json!(2));

    database.drop_database().await;
}
