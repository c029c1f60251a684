use std::net::TcpListener;

use actix_web::{App, HttpResponse, HttpServer, dev::Server, error::JsonPayloadError, web};
use chainsync::store::executor::Executor;
use chainsync_config::shared::{ApiConfig, CHAINSYNC_API_OPTIONS};
use chainsync_postgres::pool::connect_pool;
use chainsync_telemetry::metrics::init_metrics_handle;
use sqlx::PgPool;
use tracing::warn;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;

use crate::routes::{
    ErrorMessage,
    health_check::health_check,
    metrics::metrics,
    query::{QueryRequest, QueryResponse, query},
    transaction::{Operation, TransactionRequest, TransactionResponse, transaction},
};

/// HTTP server of the control surface.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Binds the configured address and builds the server.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let connection_pool = connect_pool(&config.database, &config.pool, &CHAINSYNC_API_OPTIONS);

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(config, listener, connection_pool).await?;

        Ok(Self { port, server })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it receives a shutdown signal.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Creates the HTTP server with all routes and middleware on an already bound listener.
pub async fn run(
    config: ApiConfig,
    listener: TcpListener,
    connection_pool: PgPool,
) -> Result<Server, anyhow::Error> {
    let prometheus_handle = web::ThinData(init_metrics_handle()?);
    let config = web::Data::new(config);
    let executor = web::Data::new(Executor::new(connection_pool));

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::health_check::health_check,
            crate::routes::metrics::metrics,
        ),
        components(schemas(ErrorMessage)),
        nest(
            (path = "/v1", api = ApiV1)
        )
    )]
    struct ApiDoc;

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::query::query,
            crate::routes::transaction::transaction,
        ),
        components(schemas(
            QueryRequest,
            QueryResponse,
            TransactionRequest,
            TransactionResponse,
            Operation,
        ))
    )]
    struct ApiV1;

    let openapi = web::Data::new(ApiDoc::openapi());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(health_check)
            .service(metrics)
            .route("/api-docs/openapi.json", web::get().to(openapi_json))
            .service(web::scope("v1").service(query).service(transaction))
            .app_data(prometheus_handle.clone())
            .app_data(config.clone())
            .app_data(executor.clone())
            .app_data(openapi.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

async fn openapi_json(openapi: web::Data<utoipa::openapi::OpenApi>) -> HttpResponse {
    HttpResponse::Ok().json(openapi.get_ref())
}

/// Turns a payload that cannot be decoded into a `400` carrying an [`ErrorMessage`].
fn json_error_handler(
    err: JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    warn!(error = %err, "rejecting malformed json payload");

    let response = HttpResponse::BadRequest().json(ErrorMessage {
        error: err.to_string(),
    });

    actix_web::error::InternalError::from_response(err, response).into()
}
