use anyhow::Context;
use chainsync_api::startup::Application;
use chainsync_config::load_config;
use chainsync_config::shared::{ApiConfig, PgConnectionConfig};
use chainsync_telemetry::tracing::init_tracing;
use tracing::info;

/// Entry point of the chainsync HTTP control surface.
fn main() -> anyhow::Result<()> {
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config =
        load_config::<ApiConfig>().context("loading API configuration for server startup")?;
    config
        .validate()
        .context("validating API configuration for server startup")?;
    log_pg_connection_config(&config.database);

    let application = Application::build(config).await?;
    info!(port = application.port(), "chainsync api listening");
    application.run_until_stopped().await?;

    Ok(())
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    info!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "pg database options",
    );
}
