use futures::future::join_all;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::backfill::{AggregateStats, BackfillWindow, Cursor, FetchRequest, InputSource, Page};
use crate::dispatch::Dispatcher;
use crate::error::SyncResult;
use crate::metrics::CHAINSYNC_BACKFILL_PAGES_TOTAL;

#[derive(Debug)]
enum BackfillState {
    Start,
    Fetching(Option<Cursor>),
    Processing(Page),
    Done,
}

/// Replays the inputs of `window` through `dispatcher`, one page at a time.
///
/// Pages are fetched and processed strictly in order, and the inputs of a page in the order the
/// source returned them. The run ends after the first page without a cursor, then the rows of
/// every domain table are counted concurrently. A failed fetch aborts the run.
pub async fn backfill(
    source: &dyn InputSource,
    dispatcher: &Dispatcher,
    window: BackfillWindow,
) -> SyncResult<AggregateStats> {
    let targets = dispatcher.registry().targets();
    let mut stats = AggregateStats::default();
    let mut state = BackfillState::Start;

    loop {
        state = match state {
            BackfillState::Start => {
                if targets.is_empty() {
                    info!("no handlers registered, skipping backfill");
                    BackfillState::Done
                } else {
                    info!(?window, targets = targets.len(), "starting backfill");
                    BackfillState::Fetching(None)
                }
            }
            BackfillState::Fetching(cursor) => {
                let request = FetchRequest {
                    window: window.clone(),
                    targets: targets.clone(),
                    cursor,
                };
                let page = source.fetch_page(&request).await?;

                stats.pages += 1;
                counter!(CHAINSYNC_BACKFILL_PAGES_TOTAL).increment(1);
                debug!(
                    page = stats.pages,
                    inputs = page.inputs.len(),
                    last = page.cursor.is_none(),
                    "fetched backfill page"
                );

                BackfillState::Processing(page)
            }
            BackfillState::Processing(page) => {
                for input in &page.inputs {
                    stats.record_input(input.name());
                    for result in dispatcher.dispatch_all(input).await {
                        stats.record_result(&result);
                    }
                }

                match page.cursor {
                    Some(cursor) => BackfillState::Fetching(Some(cursor)),
                    None => BackfillState::Done,
                }
            }
            BackfillState::Done => {
                count_table_rows(dispatcher, &mut stats).await;
                info!(%stats, "backfill completed");

                return Ok(stats);
            }
        }
    }
}

async fn count_table_rows(dispatcher: &Dispatcher, stats: &mut AggregateStats) {
    let store = dispatcher.store();
    let counts = join_all(dispatcher.registry().domains().iter().map(|domain| {
        let table = &domain.table.name;
        async move { (table, store.count_rows(table).await) }
    }))
    .await;

    for (table, count) in counts {
        match count {
            Ok(count) => {
                stats.table_rows.insert(table.to_string(), count);
            }
            Err(err) => {
                warn!(table = %table, error = %err, "failed to count table rows");
            }
        }
    }
}
