use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Location and limits of the upstream service serving historical inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackfillSourceConfig {
    /// Endpoint accepting page requests.
    pub url: String,
    /// Upper bound, in milliseconds, for one page request.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of inputs requested per page, if the upstream honours it.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl BackfillSourceConfig {
    /// Default request timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// Validates the source settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "backfill.url".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "backfill.timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    BackfillSourceConfig::DEFAULT_TIMEOUT_MS
}
