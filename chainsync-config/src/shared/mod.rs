//! Shared configuration types for chainsync services.

mod api;
mod backfill;
mod base;
mod connection;
mod indexer;
mod pool;

pub use api::{ApiConfig, ApplicationSettings};
pub use backfill::BackfillSourceConfig;
pub use base::ValidationError;
pub use connection::{
    CHAINSYNC_API_OPTIONS, CHAINSYNC_INDEXER_OPTIONS, IntoConnectOptions, PgConnectionConfig,
    PgConnectionOptions, TlsConfig,
};
pub use indexer::IndexerConfig;
pub use pool::PoolConfig;
