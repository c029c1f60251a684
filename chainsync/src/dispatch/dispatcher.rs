use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::dispatch::{HandlerContext, HandlerRegistry, RegisteredHandler};
use crate::metrics::{
    CHAINSYNC_DISPATCH_DURATION_SECONDS, CHAINSYNC_HANDLER_FAILURES_TOTAL,
    CHAINSYNC_INPUTS_DISPATCHED_TOTAL, CHAINSYNC_ROWS_PERSISTED_TOTAL, DOMAIN_LABEL,
    INPUT_NAME_LABEL,
};
use crate::store::rows::RowStore;
use crate::types::{HandlerResult, Input};

/// Hands inputs to their handlers and persists what the handlers return.
///
/// Every invocation gets a fresh [`HandlerContext`] and its side effects come back in the
/// returned [`HandlerResult`], so nothing carries over from one input to the next. Cloning is
/// cheap and clones share the store and the registry.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RowStore>,
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RowStore>, registry: HandlerRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Runs one handler on `input` and persists its rows in one transaction.
    ///
    /// Handler and persistence failures are logged and yield [`HandlerResult::empty`]; they
    /// never reach the caller.
    pub async fn dispatch(&self, input: &Input, handler: &RegisteredHandler) -> HandlerResult {
        let domain = &handler.domain;
        let started = Instant::now();

        counter!(
            CHAINSYNC_INPUTS_DISPATCHED_TOTAL,
            INPUT_NAME_LABEL => input.name().to_string(),
            DOMAIN_LABEL => domain.name.clone(),
        )
        .increment(1);

        let ctx = HandlerContext::new(&domain.table, self.store.as_ref());
        let outcome = match handler.handler.handle(input, &ctx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    input = input.name(),
                    origin = %input.origin(),
                    domain = %domain.name,
                    error = %err,
                    "handler failed, skipping input"
                );
                self.record_failure(input, &domain.name);

                return HandlerResult::empty();
            }
        };

        let mut result = HandlerResult {
            output_name: None,
            output_count: 0,
            published_events: outcome.published_events,
            registered_contracts: outcome.registered_contracts,
        };

        if !outcome.rows.is_empty() {
            match self.store.upsert_rows(&domain.table, outcome.rows).await {
                Ok(count) => {
                    counter!(
                        CHAINSYNC_ROWS_PERSISTED_TOTAL,
                        DOMAIN_LABEL => domain.name.clone(),
                    )
                    .increment(count as u64);

                    result.output_name = Some(domain.name.clone());
                    result.output_count = count;
                }
                Err(err) => {
                    warn!(
                        input = input.name(),
                        origin = %input.origin(),
                        domain = %domain.name,
                        error = %err,
                        "rows could not be persisted, skipping input"
                    );
                    self.record_failure(input, &domain.name);

                    return HandlerResult::empty();
                }
            }
        }

        histogram!(
            CHAINSYNC_DISPATCH_DURATION_SECONDS,
            DOMAIN_LABEL => domain.name.clone(),
        )
        .record(started.elapsed().as_secs_f64());

        debug!(
            input = input.name(),
            domain = %domain.name,
            rows = result.output_count,
            published = result.published_events.len(),
            registered = result.registered_contracts.len(),
            "input dispatched"
        );

        result
    }

    /// Runs every handler registered for the name and kind of `input`, in registration order.
    ///
    /// Handlers are isolated from each other: a failing one yields an empty result without
    /// affecting the others.
    pub async fn dispatch_all(&self, input: &Input) -> Vec<HandlerResult> {
        let mut results = vec![];
        for handler in self.registry.handlers_for(input) {
            results.push(self.dispatch(input, handler).await);
        }

        results
    }

    fn record_failure(&self, input: &Input, domain: &str) {
        counter!(
            CHAINSYNC_HANDLER_FAILURES_TOTAL,
            INPUT_NAME_LABEL => input.name().to_string(),
            DOMAIN_LABEL => domain.to_string(),
        )
        .increment(1);
    }
}
