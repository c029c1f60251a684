use serde::Deserialize;

use crate::Config;
use crate::shared::{BackfillSourceConfig, PgConnectionConfig, PoolConfig, ValidationError};

/// Configuration of an indexer process.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexerConfig {
    /// Database holding the materialized tables.
    pub database: PgConnectionConfig,
    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Historical input source. Backfill is skipped when absent.
    #[serde(default)]
    pub backfill: Option<BackfillSourceConfig>,
    /// Maximum number of live inputs dispatched at the same time.
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,
}

impl IndexerConfig {
    /// Default bound on concurrently dispatched live inputs.
    pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 8;

    /// Validates every nested section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.pool.validate()?;

        if let Some(backfill) = &self.backfill {
            backfill.validate()?;
        }

        if self.max_concurrent_dispatches == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_concurrent_dispatches".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Config for IndexerConfig {}

fn default_max_concurrent_dispatches() -> usize {
    IndexerConfig::DEFAULT_MAX_CONCURRENT_DISPATCHES
}
