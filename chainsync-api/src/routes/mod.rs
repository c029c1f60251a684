use chainsync::error::{ErrorKind, SyncError};
use chainsync::store::builder::ColumnTypes;
use chainsync::store::executor::Executor;
use chainsync_postgres::catalog;
use chainsync_postgres::types::TableName;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod health_check;
pub mod metrics;
pub mod query;
pub mod transaction;

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = "Update has no filter: refusing to update every row of table public.t")]
    pub error: String,
}

/// Default schema of the tables named in requests.
pub(crate) fn default_schema() -> String {
    "public".to_string()
}

/// Renders an engine error without its source location.
pub(crate) fn sync_error_message(err: &SyncError) -> String {
    match err.detail() {
        Some(detail) => format!("{}: {detail}", err.description()),
        None => err.description().to_string(),
    }
}

/// Whether an engine error was caused by the request rather than by its execution.
pub(crate) fn is_client_error(err: &SyncError) -> bool {
    err.kind() == ErrorKind::InvalidInput
}

/// Reads the column types of `table` to cast statement placeholders.
///
/// A missing table yields no types; the statement then fails on execution.
pub(crate) async fn read_column_types(
    executor: &Executor,
    table: &TableName,
) -> Result<ColumnTypes, sqlx::Error> {
    let pairs = catalog::column_types(executor.pool(), table).await?;

    Ok(ColumnTypes::from_pairs(pairs))
}
