use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backfill::{Cursor, FetchRequest, InputSource, Page};
use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::live::LiveSource;
use crate::types::{Input, InputTarget};

/// [`InputSource`] serving fixed pages, addressed by their index as cursor.
#[derive(Debug, Clone)]
pub struct MemoryInputSource {
    pages: Arc<Vec<Vec<Input>>>,
    fail_past_end: bool,
    fetches: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MemoryInputSource {
    /// Serves `pages` in order. The last page has no cursor.
    pub fn new(pages: Vec<Vec<Input>>) -> Self {
        Self {
            pages: Arc::new(pages),
            fail_past_end: false,
            fetches: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Serves `pages` in order, all with a cursor, and fails the fetch that follows.
    pub fn failing_after(pages: Vec<Vec<Input>>) -> Self {
        Self {
            fail_past_end: true,
            ..Self::new(pages)
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputSource for MemoryInputSource {
    async fn fetch_page(&self, request: &FetchRequest) -> SyncResult<Page> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let index = match &request.cursor {
            None => 0,
            Some(cursor) => cursor.as_str().parse::<usize>().unwrap(),
        };

        let Some(inputs) = self.pages.get(index) else {
            bail!(
                ErrorKind::FetchFailed,
                "Page not available",
                format!("page {index}")
            );
        };

        let next = index + 1;
        let cursor = if next < self.pages.len() || self.fail_past_end {
            Some(Cursor::new(next.to_string()))
        } else {
            None
        };

        Ok(Page {
            inputs: inputs.clone(),
            cursor,
        })
    }
}

/// [`LiveSource`] delivering fixed inputs and closing the channel afterwards.
///
/// Only inputs matching a subscribed target are delivered.
#[derive(Debug, Clone)]
pub struct MemoryLiveSource {
    inputs: Arc<Vec<Input>>,
    subscriptions: Arc<Mutex<Vec<Vec<InputTarget>>>>,
}

impl MemoryLiveSource {
    pub fn new(inputs: Vec<Input>) -> Self {
        Self {
            inputs: Arc::new(inputs),
            subscriptions: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Returns the targets of every subscription made so far.
    pub fn subscriptions(&self) -> Vec<Vec<InputTarget>> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveSource for MemoryLiveSource {
    async fn subscribe(&self, targets: Vec<InputTarget>) -> SyncResult<mpsc::Receiver<Input>> {
        self.subscriptions.lock().unwrap().push(targets.clone());

        let (tx, rx) = mpsc::channel(16);
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            for input in inputs.iter() {
                if !targets.contains(&input.target()) {
                    continue;
                }
                if tx.send(input.clone()).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// [`LiveSource`] that never delivers anything and keeps the channel open.
#[derive(Debug, Clone, Default)]
pub struct PendingLiveSource {
    senders: Arc<Mutex<Vec<mpsc::Sender<Input>>>>,
}

#[async_trait]
impl LiveSource for PendingLiveSource {
    async fn subscribe(&self, _targets: Vec<InputTarget>) -> SyncResult<mpsc::Receiver<Input>> {
        let (tx, rx) = mpsc::channel(1);
        self.senders.lock().unwrap().push(tx);

        Ok(rx)
    }
}
