//! Metric names and labels emitted by the engine.

/// Label for the qualified table name.
pub const TABLE_NAME_LABEL: &str = "table_name";

/// Label for the input name.
pub const INPUT_NAME_LABEL: &str = "input_name";

/// Label for the handler domain.
pub const DOMAIN_LABEL: &str = "domain";

/// Label for the kind of DDL plan applied.
pub const PLAN_KIND_LABEL: &str = "plan_kind";

/// Counter for inputs handed to a handler.
pub const CHAINSYNC_INPUTS_DISPATCHED_TOTAL: &str = "chainsync_inputs_dispatched_total";

/// Counter for handler invocations that failed or whose rows could not be persisted.
pub const CHAINSYNC_HANDLER_FAILURES_TOTAL: &str = "chainsync_handler_failures_total";

/// Counter for rows upserted by handlers.
pub const CHAINSYNC_ROWS_PERSISTED_TOTAL: &str = "chainsync_rows_persisted_total";

/// Counter for DDL statements executed by the materializer.
pub const CHAINSYNC_DDL_STATEMENTS_TOTAL: &str = "chainsync_ddl_statements_total";

/// Counter for backfill pages fetched.
pub const CHAINSYNC_BACKFILL_PAGES_TOTAL: &str = "chainsync_backfill_pages_total";

/// Histogram of the time spent dispatching one input, in seconds.
pub const CHAINSYNC_DISPATCH_DURATION_SECONDS: &str = "chainsync_dispatch_duration_seconds";
