use std::time::Duration;

use async_trait::async_trait;
use chainsync_config::shared::BackfillSourceConfig;
use serde::Serialize;
use tracing::debug;

use crate::backfill::{BackfillWindow, Cursor, FetchRequest, InputSource, Page};
use crate::error::{ErrorKind, SyncResult};
use crate::types::InputTarget;
use crate::{bail, sync_error};

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    window: &'a BackfillWindow,
    targets: &'a [InputTarget],
    cursor: Option<&'a Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
}

/// [`InputSource`] fetching pages from an HTTP endpoint.
///
/// Every page is one `POST` of a JSON page request to the configured URL, answered with a JSON
/// [`Page`]. Requests are bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpInputSource {
    client: reqwest::Client,
    url: String,
    page_size: Option<u32>,
}

impl HttpInputSource {
    pub fn new(config: &BackfillSourceConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                sync_error!(
                    ErrorKind::ConfigError,
                    "HTTP client could not be built",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl InputSource for HttpInputSource {
    async fn fetch_page(&self, request: &FetchRequest) -> SyncResult<Page> {
        let body = PageRequest {
            window: &request.window,
            targets: &request.targets,
            cursor: request.cursor.as_ref(),
            page_size: self.page_size,
        };

        debug!(url = %self.url, cursor = ?request.cursor, "requesting backfill page");

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            bail!(
                ErrorKind::FetchFailed,
                "Input source returned an error status",
                format!("{} returned {status}: {body}", self.url)
            );
        }

        let page = response.json::<Page>().await.map_err(|err| {
            sync_error!(
                ErrorKind::FetchFailed,
                "Input source returned an invalid page",
                err.to_string(),
                source: err
            )
        })?;

        Ok(page)
    }
}
