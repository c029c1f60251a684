use std::collections::HashMap;
use std::collections::hash_map::Entry;

use actix_web::{
    HttpResponse, Responder, ResponseError,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json},
};
use chainsync::error::SyncError;
use chainsync::store::builder::{ColumnTypes, OnConflict, StatementBuilder};
use chainsync::store::executor::{Executor, Statement};
use chainsync_postgres::record::Record;
use chainsync_postgres::types::TableName;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::routes::{
    ErrorMessage, default_schema, is_client_error, read_column_types, sync_error_message,
};

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("The columns of table {0} could not be read")]
    ColumnTypes(TableName, #[source] sqlx::Error),

    #[error("Operation {index} is invalid: {}", sync_error_message(.source))]
    InvalidOperation {
        index: usize,
        #[source]
        source: SyncError,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl TransactionError {
    pub fn to_message(&self) -> String {
        match self {
            TransactionError::Sync(err) => sync_error_message(err),
            e => e.to_string(),
        }
    }
}

impl ResponseError for TransactionError {
    fn status_code(&self) -> StatusCode {
        match self {
            TransactionError::InvalidOperation { .. } => StatusCode::BAD_REQUEST,
            TransactionError::Sync(err) if is_client_error(err) => StatusCode::BAD_REQUEST,
            TransactionError::ColumnTypes(..) | TransactionError::Sync(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

/// One write of a transaction.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Insert {
        table: String,
        #[schema(value_type = Object)]
        row: Record,
        #[schema(value_type = Option<Object>)]
        #[serde(default)]
        on_conflict: Option<OnConflict>,
    },
    Update {
        table: String,
        #[schema(value_type = Object)]
        values: Record,
        #[schema(value_type = Object)]
        filter: Record,
    },
    Delete {
        table: String,
        #[schema(value_type = Object)]
        filter: Record,
    },
}

impl Operation {
    fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    fn to_statement(&self, builder: StatementBuilder<'_>) -> Result<Statement, SyncError> {
        match self {
            Operation::Insert {
                row, on_conflict, ..
            } => Ok(builder.insert(row, on_conflict.as_ref())),
            Operation::Update { values, filter, .. } => builder.update(values, filter),
            Operation::Delete { filter, .. } => builder.delete(filter),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// Schema of every table named by the operations.
    #[schema(example = "public")]
    #[serde(default = "default_schema")]
    pub schema: String,
    #[schema(required = true)]
    pub operations: Vec<Operation>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// Rows returned by each operation, in request order.
    #[schema(value_type = Vec<Vec<Object>>)]
    pub results: Vec<Vec<Record>>,
}

#[utoipa::path(
    summary = "Run a transaction",
    description = "Runs inserts, updates and deletes atomically. Either every operation is applied or none is.",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transaction committed", body = TransactionResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Tables"
)]
#[post("/transaction")]
pub async fn transaction(
    executor: Data<Executor>,
    request: Json<TransactionRequest>,
) -> Result<impl Responder, TransactionError> {
    let request = request.into_inner();

    let mut types: HashMap<TableName, ColumnTypes> = HashMap::new();
    let mut statements = Vec::with_capacity(request.operations.len());
    for (index, operation) in request.operations.iter().enumerate() {
        let table = TableName::new(request.schema.clone(), operation.table());
        let table_types = match types.entry(table.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                read_column_types(&executor, &table)
                    .await
                    .map_err(|err| TransactionError::ColumnTypes(table.clone(), err))?,
            ),
        };

        let builder = StatementBuilder::new(&table).with_types(table_types);
        let statement = operation
            .to_statement(builder)
            .map_err(|source| TransactionError::InvalidOperation { index, source })?;
        statements.push(statement);
    }

    let results = executor.transaction(&statements).await?;

    Ok(Json(TransactionResponse { results }))
}
