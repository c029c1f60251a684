use chainsync_postgres::catalog;
use chainsync_postgres::types::{IntrospectedTable, TableName, TableSpec};
use metrics::counter;
use pg_escape::quote_identifier;
use tracing::{debug, info};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::metrics::{CHAINSYNC_DDL_STATEMENTS_TOTAL, PLAN_KIND_LABEL, TABLE_NAME_LABEL};
use crate::schema::diff::diff;
use crate::schema::plan::{DdlPlan, plan, plan_creation};
use crate::store::executor::{Executor, Statement};
use crate::store::rows::RowStore;
use crate::store::rows::postgres::PostgresRowStore;
use crate::sync_error;

/// Converges live tables to their desired specs.
#[derive(Debug, Clone)]
pub struct Materializer {
    executor: Executor,
}

impl Materializer {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Makes the table described by `desired` exist with exactly that shape.
    ///
    /// Creates the schema when missing, creates the table when missing and otherwise applies
    /// the planned DDL in one transaction. Running it against a converged table issues no DDL.
    pub async fn materialize(&self, desired: &TableSpec) -> SyncResult<TableName> {
        let desired = prepare(desired)?;

        if !self.schema_exists(&desired.name).await? {
            info!(schema = %desired.name.schema, "creating schema");
            self.apply(
                &desired.name,
                "schema",
                &[Statement::raw(format!(
                    "create schema if not exists {}",
                    quote_identifier(&desired.name.schema)
                ))],
            )
            .await?;
        }

        let plan = self.plan_for(&desired).await?;
        if plan.is_empty() {
            debug!(table = %desired.name, "table is up to date");
            return Ok(desired.name);
        }

        info!(
            table = %desired.name,
            plan = plan.kind(),
            statements = plan.statements().len(),
            "applying table changes"
        );
        self.apply(&desired.name, plan.kind(), plan.statements())
            .await?;

        Ok(desired.name)
    }

    /// Returns the plan converging the live table to `desired`, without applying it.
    pub async fn plan_for(&self, desired: &TableSpec) -> SyncResult<DdlPlan> {
        let desired = prepare(desired)?;

        let Some(current) = self.current_spec(&desired.name).await? else {
            return Ok(DdlPlan::Create(plan_creation(&desired)));
        };

        let diff = diff(&current.spec, &desired);
        Ok(plan(&diff, &current, &desired))
    }

    /// Reads the live shape of `table`, or `None` when it does not exist.
    pub async fn current_spec(&self, table: &TableName) -> SyncResult<Option<IntrospectedTable>> {
        let pool = self.executor.pool();

        let exists = catalog::table_exists(pool, table)
            .await
            .map_err(|err| catalog_error(table, err))?;
        if !exists {
            return Ok(None);
        }

        let current = catalog::introspect_table(pool, table)
            .await
            .map_err(|err| catalog_error(table, err))?;

        Ok(Some(current))
    }

    /// Returns the number of rows in `table`.
    pub async fn row_count(&self, table: &TableName) -> SyncResult<u64> {
        PostgresRowStore::new(self.executor.clone())
            .count_rows(table)
            .await
    }

    /// Removes every row of `table` and restarts its sequences.
    pub async fn clear_table(&self, table: &TableName) -> SyncResult<()> {
        info!(table = %table, "clearing table");

        self.executor
            .execute(&Statement::raw(format!(
                "truncate table {} restart identity",
                table.as_quoted_identifier()
            )))
            .await?;

        Ok(())
    }

    async fn schema_exists(&self, table: &TableName) -> SyncResult<bool> {
        catalog::schema_exists(self.executor.pool(), &table.schema)
            .await
            .map_err(|err| catalog_error(table, err))
    }

    async fn apply(
        &self,
        table: &TableName,
        plan_kind: &'static str,
        statements: &[Statement],
    ) -> SyncResult<()> {
        self.executor.transaction(statements).await.map_err(|err| {
            sync_error!(
                ErrorKind::DdlFailed,
                "Table changes could not be applied",
                format!("table {table}: {err}"),
                source: err
            )
        })?;

        counter!(
            CHAINSYNC_DDL_STATEMENTS_TOTAL,
            TABLE_NAME_LABEL => table.to_string(),
            PLAN_KIND_LABEL => plan_kind,
        )
        .increment(statements.len() as u64);

        Ok(())
    }
}

fn prepare(desired: &TableSpec) -> SyncResult<TableSpec> {
    desired.validate()?;

    Ok(desired.clone().with_primary_group_not_null())
}

fn catalog_error(table: &TableName, err: sqlx::Error) -> SyncError {
    sync_error!(
        ErrorKind::CatalogReadFailed,
        "Table catalog could not be read",
        format!("schema {}, table {}: {err}", table.schema, table.name),
        source: err
    )
}
