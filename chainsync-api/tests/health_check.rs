use chainsync_telemetry::tracing::init_test_tracing;

use crate::support::test_app::spawn_test_app;

mod support {
    pub(crate) mod test_app;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_works() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app.get("/health_check").await;

    // Assert
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn openapi_document_lists_the_routes() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app.get("/api-docs/openapi.json").await;

    // Assert
    assert!(response.status().is_success());
    let document: serde_json::Value = response.json().await.unwrap();
    let paths = document["paths"].as_object().unwrap();
    assert!(paths.contains_key("/v1/query"));
    assert!(paths.contains_key("/v1/transaction"));
    assert!(paths.contains_key("/health_check"));
}
