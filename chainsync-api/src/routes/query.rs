use actix_web::{
    HttpResponse, Responder, ResponseError,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json},
};
use chainsync::error::SyncError;
use chainsync::store::builder::{OrderBy, StatementBuilder};
use chainsync::store::executor::Executor;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::TableName;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::routes::{
    ErrorMessage, default_schema, is_client_error, read_column_types, sync_error_message,
};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("The columns of table {0} could not be read")]
    ColumnTypes(TableName, #[source] sqlx::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl QueryError {
    pub fn to_message(&self) -> String {
        match self {
            QueryError::Sync(err) => sync_error_message(err),
            e => e.to_string(),
        }
    }
}

impl ResponseError for QueryError {
    fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Sync(err) if is_client_error(err) => StatusCode::BAD_REQUEST,
            QueryError::ColumnTypes(..) | QueryError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryRequest {
    #[schema(example = "public")]
    #[serde(default = "default_schema")]
    pub schema: String,
    #[schema(example = "balances", required = true)]
    pub table: String,
    /// Equality conditions, combined with `and`.
    #[schema(value_type = Object)]
    #[serde(default)]
    pub filter: Record,
    #[schema(value_type = Vec<Object>)]
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[schema(example = 100)]
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResponse {
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Record>,
}

#[utoipa::path(
    summary = "Query a table",
    description = "Returns the rows of a table matching equality filters, optionally ordered and limited.",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Rows returned", body = QueryResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Tables"
)]
#[post("/query")]
pub async fn query(
    executor: Data<Executor>,
    request: Json<QueryRequest>,
) -> Result<impl Responder, QueryError> {
    let request = request.into_inner();
    let table = TableName::new(request.schema, request.table);

    let types = read_column_types(&executor, &table)
        .await
        .map_err(|err| QueryError::ColumnTypes(table.clone(), err))?;
    let statement = StatementBuilder::new(&table).with_types(&types).select(
        &request.filter,
        &request.order_by,
        request.limit,
    );

    let rows = executor.execute(&statement).await?;

    Ok(Json(QueryResponse { rows }))
}
