use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::types::{Input, InputTarget};

/// Opaque position in the upstream history, handed back on the next fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Range of history to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackfillWindow {
    /// Inclusive block range.
    Blocks { from: u64, to: u64 },
    /// Inclusive time range.
    Dates {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// The latest `blocks` blocks.
    Recent { blocks: u64 },
    AllTime,
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    pub window: BackfillWindow,
    /// Inputs the registry has handlers for.
    pub targets: Vec<InputTarget>,
    /// `None` on the first request.
    pub cursor: Option<Cursor>,
}

/// One page of historical inputs, in upstream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub inputs: Vec<Input>,
    /// Where the next page starts. `None` ends the replay.
    #[serde(default)]
    pub cursor: Option<Cursor>,
}

/// Paged source of historical inputs.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Fetches one page.
    ///
    /// Implementations return [`crate::error::ErrorKind::FetchFailed`] or
    /// [`crate::error::ErrorKind::TransportFailed`] when the page cannot be obtained.
    async fn fetch_page(&self, request: &FetchRequest) -> SyncResult<Page>;
}
