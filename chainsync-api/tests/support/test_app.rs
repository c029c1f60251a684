#![allow(dead_code)]

use std::io;
use std::net::TcpListener;
use std::time::Duration;

use chainsync::test_utils::database::TestDatabase;
use chainsync_api::routes::query::QueryRequest;
use chainsync_api::routes::transaction::TransactionRequest;
use chainsync_api::startup::run;
use chainsync_config::shared::{ApiConfig, ApplicationSettings, PoolConfig};
use chainsync_postgres::sqlx::test_utils::drop_pg_database;
use sqlx::PgPool;
use tokio::runtime::Handle;
use tokio::time::sleep;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    config: ApiConfig,
    pool: PgPool,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs raw SQL against the test database, e.g. to create fixtures.
    pub async fn execute_sql(&self, sql: &str) {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .expect("failed to execute sql");
    }

    pub async fn query(&self, request: &QueryRequest) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/query", &self.address))
            .json(request)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn transaction(&self, request: &TransactionRequest) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/transaction", &self.address))
            .json(request)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.api_client
            .post(format!("{}{path}", &self.address))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}{path}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();

        // `block_in_place` requires the multithreaded runtime.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                Handle::current().block_on(async {
                    sleep(Duration::from_millis(100)).await;

                    self.pool.close().await;
                    drop_pg_database(&self.config.database).await;
                });
            });
        }));
    }
}

pub async fn spawn_test_app() -> TestApp {
    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let database = TestDatabase::spawn().await;

    let config = ApiConfig {
        database: database.config.clone(),
        application: ApplicationSettings {
            host: base_address.to_string(),
            port,
        },
        pool: PoolConfig::default(),
    };

    let server = run(config.clone(), listener, database.pool.clone())
        .await
        .expect("failed to bind address");

    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        config,
        pool: database.pool,
        server_handle,
    }
}
