use chainsync_postgres::types::{
    ColumnSpec, ConstraintOrigin, IntrospectedTable, TableName, TableSpec, normalize_type,
};
use pg_escape::quote_identifier;
use tracing::warn;

use crate::schema::diff::SchemaDiff;
use crate::store::executor::Statement;

const PRIMARY_KEY_COLUMN: &str = "id";
const FALLBACK_PRIMARY_KEY_COLUMN: &str = "_id";
const PRIMARY_KEY_TYPE: &str = "bigserial";

/// DDL needed to converge a table, always applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlPlan {
    /// The table already matches.
    Empty,
    /// Minimal set of alterations on the existing table.
    Incremental(Vec<Statement>),
    /// The table does not exist yet.
    Create(Vec<Statement>),
    /// The table is dropped and created again.
    Replace(Vec<Statement>),
}

impl DdlPlan {
    pub fn statements(&self) -> &[Statement] {
        match self {
            DdlPlan::Empty => &[],
            DdlPlan::Incremental(statements)
            | DdlPlan::Create(statements)
            | DdlPlan::Replace(statements) => statements,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DdlPlan::Empty)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DdlPlan::Empty => "empty",
            DdlPlan::Incremental(_) => "incremental",
            DdlPlan::Create(_) => "create",
            DdlPlan::Replace(_) => "replace",
        }
    }
}

/// Returns the name of the primary key column created together with the table.
///
/// A desired column flagged as primary key is used as is. Otherwise a `bigserial` column named
/// `id` is synthesized, or `_id` when `id` is already a desired column.
pub fn primary_key_column_name(desired: &TableSpec) -> String {
    if let Some(column) = desired.columns.iter().find(|column| column.primary_key) {
        return column.name.clone();
    }

    if desired.column(PRIMARY_KEY_COLUMN).is_some() {
        FALLBACK_PRIMARY_KEY_COLUMN.to_string()
    } else {
        PRIMARY_KEY_COLUMN.to_string()
    }
}

/// Plans the creation of `desired` from scratch.
///
/// Emits `CREATE TABLE` with the primary key column first, then the primary key constraint,
/// then one unique index per non-empty unique group and one index per non-empty index group.
pub fn plan_creation(desired: &TableSpec) -> Vec<Statement> {
    let table = desired.name.as_quoted_identifier();
    let primary_key = primary_key_column_name(desired);

    let mut definitions = Vec::with_capacity(desired.columns.len() + 1);
    if !desired.columns.iter().any(|column| column.primary_key) {
        definitions.push(format!(
            "{} {PRIMARY_KEY_TYPE}",
            quote_identifier(&primary_key)
        ));
    }
    definitions.extend(desired.columns.iter().map(column_definition));

    let mut statements = vec![
        Statement::raw(format!("create table {table} ({})", definitions.join(", "))),
        Statement::raw(format!(
            "alter table {table} add primary key ({})",
            quote_identifier(&primary_key)
        )),
    ];

    for group in desired.unique_by.iter().filter(|group| !group.is_empty()) {
        statements.push(create_index(&desired.name, group, true));
    }
    for group in desired.index_by.iter().filter(|group| !group.is_empty()) {
        statements.push(create_index(&desired.name, group, false));
    }

    statements
}

/// Turns a [`SchemaDiff`] into the DDL converging `current` to `desired`.
///
/// A diff that both adds and removes columns replaces the table. Any other non-empty diff is
/// applied in place, in this order: add columns, drop columns, alter defaults, alter
/// nullability, drop indexes, add unique indexes, add plain indexes.
pub fn plan(diff: &SchemaDiff, current: &IntrospectedTable, desired: &TableSpec) -> DdlPlan {
    if diff.is_empty() {
        return DdlPlan::Empty;
    }

    if diff.requires_replace() {
        let mut statements = vec![Statement::raw(format!(
            "drop table {}",
            desired.name.as_quoted_identifier()
        ))];
        statements.extend(plan_creation(desired));

        return DdlPlan::Replace(statements);
    }

    let table = current.spec.name.as_quoted_identifier();
    let mut statements = vec![];

    for column in &diff.columns_added {
        statements.push(Statement::raw(format!(
            "alter table {table} add column {}",
            column_definition(column)
        )));
    }

    for column in &diff.columns_removed {
        statements.push(Statement::raw(format!(
            "alter table {table} drop column {}",
            quote_identifier(&column.name)
        )));
    }

    for change in &diff.defaults_changed {
        let column = quote_identifier(&change.column);
        let action = match &change.after {
            Some(default) => format!("set default {default}"),
            None => "drop default".to_string(),
        };
        statements.push(Statement::raw(format!(
            "alter table {table} alter column {column} {action}"
        )));
    }

    for change in &diff.not_null_changed {
        let column = quote_identifier(&change.column);
        let action = if change.after {
            "set not null"
        } else {
            "drop not null"
        };
        statements.push(Statement::raw(format!(
            "alter table {table} alter column {column} {action}"
        )));
    }

    // Dropping a column drops its indexes too, hence `if exists`.
    for group in &diff.unique_index_diff.removed {
        let mut found = false;
        for constraint in current.unique_constraints_on(group) {
            found = true;
            let statement = match constraint.origin {
                ConstraintOrigin::Constraint => format!(
                    "alter table {table} drop constraint if exists {}",
                    quote_identifier(&constraint.name)
                ),
                ConstraintOrigin::UniqueIndex => format!(
                    "drop index if exists {}",
                    index_name(&current.spec.name, &constraint.name)
                ),
            };
            statements.push(Statement::raw(statement));
        }

        if !found {
            warn!(
                table = %current.spec.name,
                columns = ?group,
                "no catalog object found for removed unique group"
            );
        }
    }

    for group in &diff.plain_index_diff.removed {
        let mut found = false;
        for index in current.indexes_on(group) {
            found = true;
            statements.push(Statement::raw(format!(
                "drop index if exists {}",
                index_name(&current.spec.name, &index.name)
            )));
        }

        if !found {
            warn!(
                table = %current.spec.name,
                columns = ?group,
                "no catalog object found for removed index group"
            );
        }
    }

    for group in &diff.unique_index_diff.added {
        statements.push(create_index(&current.spec.name, group, true));
    }

    for group in &diff.plain_index_diff.added {
        statements.push(create_index(&current.spec.name, group, false));
    }

    DdlPlan::Incremental(statements)
}

fn column_definition(column: &ColumnSpec) -> String {
    let mut definition = format!("{} {}", quote_identifier(&column.name), column_type(column));

    if column.not_null {
        definition.push_str(" not null");
    }
    if let Some(default) = &column.default {
        definition.push_str(" default ");
        definition.push_str(default);
    }

    definition
}

fn column_type(column: &ColumnSpec) -> String {
    if !column.serial {
        return column.typ.clone();
    }

    match normalize_type(&column.typ).as_str() {
        "int2" => "smallserial".to_string(),
        "int4" => "serial".to_string(),
        "int8" => "bigserial".to_string(),
        _ => column.typ.clone(),
    }
}

fn create_index(table: &TableName, group: &[String], unique: bool) -> Statement {
    let columns = group
        .iter()
        .map(|column| quote_identifier(column).into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    let unique = if unique { "unique " } else { "" };

    Statement::raw(format!(
        "create {unique}index on {} ({columns})",
        table.as_quoted_identifier()
    ))
}

fn index_name(table: &TableName, index: &str) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(index)
    )
}
