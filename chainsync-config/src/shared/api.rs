use serde::Deserialize;

use crate::Config;
use crate::shared::{PgConnectionConfig, PoolConfig, ValidationError};

/// Configuration of the HTTP control surface.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiConfig {
    /// Database the routes run against.
    pub database: PgConnectionConfig,
    /// Listener settings.
    pub application: ApplicationSettings,
    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl ApiConfig {
    /// Validates every nested section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.pool.validate()
    }
}

impl Config for ApiConfig {}

/// Address the HTTP server binds to.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApplicationSettings {
    /// Host the server listens on.
    pub host: String,
    /// Port the server listens on. `0` selects a random free port.
    pub port: u16,
}
