use chainsync::store::builder::{OrderBy, SortDirection};
use chainsync_api::routes::ErrorMessage;
use chainsync_api::routes::query::{QueryRequest, QueryResponse};
use chainsync_postgres::record::Record;
use chainsync_telemetry::tracing::init_test_tracing;
use reqwest::StatusCode;
use serde_json::json;

use crate::support::test_app::{TestApp, spawn_test_app};

mod support {
    pub(crate) mod test_app;
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().expect("record must be a json object")
}

fn request(table: &str) -> QueryRequest {
    QueryRequest {
        schema: "public".to_string(),
        table: table.to_string(),
        filter: Record::new(),
        order_by: vec![],
        limit: None,
    }
}

async fn create_balances(app: &TestApp) {
    app.execute_sql(
        r#"
        create table public.balances (
            id bigserial primary key,
            holder varchar not null unique,
            balance numeric not null default 0,
            updated_at timestamptz
        );
        insert into public.balances (holder, balance, updated_at) values
            ('alice', 10, '2024-01-01T00:00:00Z'),
            ('bob', 5, '2024-01-02T00:00:00Z'),
            ('carol', 30, null);
        "#,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_matching_the_filter_are_returned() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;
    create_balances(&app).await;
    let mut query = request("balances");
    query.filter = record(json!({ "holder": "alice" }));

    // Act
    let response = app.query(&query).await;

    // Assert
    assert!(response.status().is_success());
    let response: QueryResponse = response.json().await.unwrap();
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0]["holder"], json!("alice"));
    assert_eq!(response.rows[0]["balance"], json!("10"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_are_ordered_and_limited() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;
    create_balances(&app).await;
    let mut query = request("balances");
    query.order_by = vec![OrderBy {
        column: "balance".to_string(),
        direction: SortDirection::Desc,
    }];
    query.limit = Some(2);

    // Act
    let response = app.query(&query).await;

    // Assert
    assert!(response.status().is_success());
    let response: QueryResponse = response.json().await.unwrap();
    let holders: Vec<_> = response
        .rows
        .iter()
        .map(|row| row["holder"].clone())
        .collect();
    assert_eq!(holders, vec![json!("carol"), json!("alice")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn string_filters_are_cast_to_the_column_type() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;
    create_balances(&app).await;
    let mut query = request("balances");
    query.filter = record(json!({ "updated_at": "2024-01-02T00:00:00Z" }));

    // Act
    let response = app.query(&query).await;

    // Assert
    assert!(response.status().is_success());
    let response: QueryResponse = response.json().await.unwrap();
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0]["holder"], json!("bob"));
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_defaults_to_public() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;
    create_balances(&app).await;

    // Act
    let response = app
        .post_raw("/v1/query", r#"{ "table": "balances" }"#)
        .await;

    // Assert
    assert!(response.status().is_success());
    let response: QueryResponse = response.json().await.unwrap();
    assert_eq!(response.rows.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_payload_is_a_bad_request() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app.post_raw("/v1/query", r#"{ "table": 42 }"#).await;

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorMessage = response.json().await.unwrap();
    assert!(!error.error.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn query_on_missing_table_is_a_server_error() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app.query(&request("missing")).await;

    // Assert
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorMessage = response.json().await.unwrap();
    assert!(error.error.starts_with("Query failed"));
}
