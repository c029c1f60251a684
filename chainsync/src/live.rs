//! Delivery of inputs as they happen upstream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;
use crate::types::{Input, InputTarget};

/// Source of inputs in real time.
#[async_trait]
pub trait LiveSource: Send + Sync {
    /// Starts delivering the inputs matching `targets`.
    ///
    /// Delivery ends when the source closes the channel.
    async fn subscribe(&self, targets: Vec<InputTarget>) -> SyncResult<mpsc::Receiver<Input>>;
}

/// Dispatches live inputs until the source closes or shutdown is requested.
///
/// Each input is dispatched on its own task, with at most `max_concurrent_dispatches` running
/// at once. In-flight dispatches are awaited before returning. Returns the number of inputs
/// received.
pub async fn run_live(
    source: &dyn LiveSource,
    dispatcher: &Dispatcher,
    max_concurrent_dispatches: usize,
    mut shutdown_rx: ShutdownRx,
) -> SyncResult<u64> {
    let targets = dispatcher.registry().targets();
    if targets.is_empty() {
        info!("no handlers registered, skipping live delivery");
        return Ok(0);
    }

    info!(targets = targets.len(), "subscribing to live inputs");
    let mut receiver = source.subscribe(targets).await?;

    let semaphore = Arc::new(Semaphore::new(max_concurrent_dispatches.max(1)));
    let mut tasks = JoinSet::new();
    let mut received = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("shutdown requested, stopping live delivery");
                break;
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    error!(error = %err, "live dispatch task failed");
                }
            }

            input = receiver.recv() => {
                let Some(input) = input else {
                    info!("live source closed");
                    break;
                };

                let permit = semaphore.clone().acquire_owned().await.map_err(|err| {
                    sync_error!(ErrorKind::Unknown, "Dispatch slots unavailable", source: err)
                })?;
                received += 1;

                let dispatcher = dispatcher.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    dispatcher.dispatch_all(&input).await
                });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "live dispatch task failed");
        }
    }

    info!(received, "live delivery stopped");

    Ok(received)
}
