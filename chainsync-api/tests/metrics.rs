use chainsync_telemetry::tracing::init_test_tracing;

use crate::support::test_app::spawn_test_app;

mod support {
    pub(crate) mod test_app;
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_endpoint_works() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app.get("/metrics").await;

    // Assert
    assert!(response.status().is_success());
}
