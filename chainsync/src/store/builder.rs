//! Construction of quoted, parameterized DML statements.

use std::collections::HashMap;

use chainsync_postgres::record::Record;
use chainsync_postgres::types::{TableName, TableSpec, normalize_type};
use pg_escape::quote_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::store::executor::Statement;

/// Sort direction of an [`OrderBy`] clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One `order by` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// What to do when an insert hits an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    DoNothing,
    /// Overwrite every inserted column that is not part of the conflict target.
    DoUpdate,
}

/// Conflict target and action of an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnConflict {
    pub columns: Vec<String>,
    pub action: ConflictAction,
}

impl OnConflict {
    pub fn new<I, S>(columns: I, action: ConflictAction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

/// Column types used to cast placeholders.
///
/// Bindings are typed after their JSON type (text, `int8`, `float8`, `bool`, `jsonb`), so
/// without a cast Postgres rejects, for example, a string bound to a `timestamptz` column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypes {
    types: HashMap<String, String>,
}

impl ColumnTypes {
    /// Builds the cast types from the declared columns of a spec.
    pub fn from_spec(spec: &TableSpec) -> Self {
        Self::from_pairs(
            spec.columns
                .iter()
                .map(|column| (column.name.clone(), column.typ.clone())),
        )
    }

    /// Builds the cast types from `(column, type)` pairs, e.g. read from the catalog.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let types = pairs
            .into_iter()
            .map(|(column, typ)| (column, castable_type(&typ)))
            .collect();

        Self { types }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.types.get(column).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Serial pseudo-types are only valid in `CREATE TABLE`.
fn castable_type(typ: &str) -> String {
    match typ.trim().to_lowercase().as_str() {
        "smallserial" | "serial2" => "int2".to_string(),
        "serial" | "serial4" => "int4".to_string(),
        "bigserial" | "serial8" => "int8".to_string(),
        _ => typ.trim().to_string(),
    }
}

/// Builds statements against one table.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'a> {
    table: &'a TableName,
    types: Option<&'a ColumnTypes>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a TableName) -> Self {
        Self { table, types: None }
    }

    /// Casts placeholders of known columns to their type.
    pub fn with_types(mut self, types: &'a ColumnTypes) -> Self {
        self.types = Some(types);
        self
    }

    /// `select *` with equality filters, ordering and an optional limit.
    pub fn select(&self, filter: &Record, order_by: &[OrderBy], limit: Option<u64>) -> Statement {
        let mut params = Params::new(self.types);
        let mut sql = format!("select * from {}", self.table.as_quoted_identifier());

        push_where(&mut sql, &mut params, filter);

        if !order_by.is_empty() {
            let terms = order_by
                .iter()
                .map(|term| {
                    let direction = match term.direction {
                        SortDirection::Asc => "asc",
                        SortDirection::Desc => "desc",
                    };
                    format!("{} {direction}", quote_identifier(&term.column))
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" order by {terms}"));
        }

        if let Some(limit) = limit {
            sql.push_str(&format!(" limit {limit}"));
        }

        params.into_statement(sql)
    }

    /// `insert ... returning *`, optionally with an `on conflict` clause.
    pub fn insert(&self, row: &Record, on_conflict: Option<&OnConflict>) -> Statement {
        let mut params = Params::new(self.types);
        let table = self.table.as_quoted_identifier();

        let mut sql = if row.is_empty() {
            format!("insert into {table} default values")
        } else {
            let columns = row
                .keys()
                .map(|column| quote_identifier(column).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            let values = row
                .iter()
                .map(|(column, value)| params.push(column, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("insert into {table} ({columns}) values ({values})")
        };

        if let Some(on_conflict) = on_conflict {
            let target = quoted_list(&on_conflict.columns);
            let updates = row
                .keys()
                .filter(|column| !on_conflict.columns.contains(column))
                .map(|column| {
                    let column = quote_identifier(column);
                    format!("{column} = excluded.{column}")
                })
                .collect::<Vec<_>>();

            match on_conflict.action {
                ConflictAction::DoUpdate if !updates.is_empty() => {
                    sql.push_str(&format!(
                        " on conflict ({target}) do update set {}",
                        updates.join(", ")
                    ));
                }
                _ => sql.push_str(&format!(" on conflict ({target}) do nothing")),
            }
        }

        sql.push_str(" returning *");

        params.into_statement(sql)
    }

    /// `update ... returning *`. Both `values` and `filter` must be non-empty.
    pub fn update(&self, values: &Record, filter: &Record) -> SyncResult<Statement> {
        if values.is_empty() {
            bail!(
                ErrorKind::InvalidInput,
                "Update has no values",
                format!("no column to set in table {}", self.table)
            );
        }
        if filter.is_empty() {
            bail!(
                ErrorKind::InvalidInput,
                "Update has no filter",
                format!("refusing to update every row of table {}", self.table)
            );
        }

        let mut params = Params::new(self.types);
        let assignments = values
            .iter()
            .map(|(column, value)| {
                format!("{} = {}", quote_identifier(column), params.push(column, value))
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "update {} set {assignments}",
            self.table.as_quoted_identifier()
        );
        push_where(&mut sql, &mut params, filter);
        sql.push_str(" returning *");

        Ok(params.into_statement(sql))
    }

    /// `delete ... returning *`. The filter must be non-empty.
    pub fn delete(&self, filter: &Record) -> SyncResult<Statement> {
        if filter.is_empty() {
            bail!(
                ErrorKind::InvalidInput,
                "Delete has no filter",
                format!("refusing to delete every row of table {}", self.table)
            );
        }

        let mut params = Params::new(self.types);
        let mut sql = format!("delete from {}", self.table.as_quoted_identifier());
        push_where(&mut sql, &mut params, filter);
        sql.push_str(" returning *");

        Ok(params.into_statement(sql))
    }

    /// `select count(*) as count`.
    pub fn count(&self) -> Statement {
        Statement::raw(format!(
            "select count(*) as count from {}",
            self.table.as_quoted_identifier()
        ))
    }
}

fn push_where(sql: &mut String, params: &mut Params<'_>, filter: &Record) {
    if filter.is_empty() {
        return;
    }

    let conditions = filter
        .iter()
        .map(|(column, value)| {
            let quoted = quote_identifier(column);
            if value.is_null() {
                format!("{quoted} is null")
            } else {
                format!("{quoted} = {}", params.push(column, value))
            }
        })
        .collect::<Vec<_>>()
        .join(" and ");

    sql.push_str(&format!(" where {conditions}"));
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_identifier(column).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accumulates bindings and renders their placeholders.
struct Params<'a> {
    types: Option<&'a ColumnTypes>,
    bindings: Vec<Value>,
}

impl<'a> Params<'a> {
    fn new(types: Option<&'a ColumnTypes>) -> Self {
        Self {
            types,
            bindings: vec![],
        }
    }

    /// Returns the SQL to use for `value` in `column`.
    ///
    /// `NULL` is written inline: a bound null would be typed as text, which Postgres does not
    /// assign to columns of other types.
    fn push(&mut self, column: &str, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }

        let cast = self.types.and_then(|types| types.get(column));
        let binding = match cast {
            Some(typ) => prepare_for_cast(value, typ),
            None => value.clone(),
        };

        self.bindings.push(binding);
        let placeholder = format!("${}", self.bindings.len());

        match cast {
            Some(typ) => format!("{placeholder}::{typ}"),
            None => placeholder,
        }
    }

    fn into_statement(self, sql: String) -> Statement {
        Statement::new(sql, self.bindings)
    }
}

/// Rewrites a value so that the cast to `typ` accepts it.
///
/// JSON columns receive the JSON text of any value, array columns receive a Postgres array
/// literal.
fn prepare_for_cast(value: &Value, typ: &str) -> Value {
    let normalized = normalize_type(typ);

    if matches!(normalized.as_str(), "json" | "jsonb") {
        return Value::String(value.to_string());
    }

    match value {
        Value::Array(elements) if normalized.ends_with("[]") => {
            Value::String(array_literal(elements))
        }
        _ => value.clone(),
    }
}

/// Renders a Postgres array literal, e.g. `{1,NULL,"a b"}`.
fn array_literal(elements: &[Value]) -> String {
    let rendered = elements
        .iter()
        .map(|element| match element {
            Value::Null => "NULL".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Number(value) => value.to_string(),
            Value::Array(nested) => array_literal(nested),
            Value::String(value) => quote_array_element(value),
            Value::Object(_) => quote_array_element(&element.to_string()),
        })
        .collect::<Vec<_>>()
        .join(",");

    format!("{{{rendered}}}")
}

fn quote_array_element(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use chainsync_postgres::types::ColumnSpec;
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn balances() -> TableName {
        TableName::new("public", "balances")
    }

    #[test]
    fn select_with_filter_order_and_limit() {
        let table = balances();
        let statement = StatementBuilder::new(&table).select(
            &record(json!({ "holder": "0xabc", "deleted_at": null })),
            &[OrderBy {
                column: "block_number".to_string(),
                direction: SortDirection::Desc,
            }],
            Some(10),
        );

        assert_eq!(
            statement.sql,
            "select * from public.balances where holder = $1 and deleted_at is null \
             order by block_number desc limit 10"
        );
        assert_eq!(statement.bindings, vec![json!("0xabc")]);
    }

    #[test]
    fn upsert_updates_non_key_columns() {
        let table = balances();
        let statement = StatementBuilder::new(&table).insert(
            &record(json!({ "holder": "0xabc", "token": "0xdef", "amount": "10" })),
            Some(&OnConflict::new(["holder", "token"], ConflictAction::DoUpdate)),
        );

        assert_eq!(
            statement.sql,
            "insert into public.balances (holder, token, amount) values ($1, $2, $3) \
             on conflict (holder, token) do update set amount = excluded.amount returning *"
        );
        assert_eq!(statement.bindings.len(), 3);
    }

    #[test]
    fn upsert_of_key_columns_only_does_nothing() {
        let table = balances();
        let statement = StatementBuilder::new(&table).insert(
            &record(json!({ "holder": "0xabc" })),
            Some(&OnConflict::new(["holder"], ConflictAction::DoUpdate)),
        );

        assert!(statement.sql.ends_with("on conflict (holder) do nothing returning *"));
    }

    #[test]
    fn nulls_are_inlined() {
        let table = balances();
        let statement = StatementBuilder::new(&table)
            .insert(&record(json!({ "holder": "0xabc", "amount": null })), None);

        assert_eq!(
            statement.sql,
            "insert into public.balances (holder, amount) values ($1, NULL) returning *"
        );
        assert_eq!(statement.bindings, vec![json!("0xabc")]);
    }

    #[test]
    fn empty_row_inserts_defaults() {
        let table = balances();
        let statement = StatementBuilder::new(&table).insert(&Record::new(), None);

        assert_eq!(
            statement.sql,
            "insert into public.balances default values returning *"
        );
    }

    #[test]
    fn placeholders_are_cast_to_column_types() {
        let table = balances();
        let spec = TableSpec::new(
            table.clone(),
            vec![
                ColumnSpec::new("holder", "varchar(42)"),
                ColumnSpec::new("amount", "numeric(78, 0)"),
                ColumnSpec::new("seen_at", "timestamptz"),
                ColumnSpec::new("tags", "text[]"),
                ColumnSpec::new("meta", "jsonb"),
            ],
        );
        let types = ColumnTypes::from_spec(&spec);

        let statement = StatementBuilder::new(&table).with_types(&types).insert(
            &record(json!({
                "holder": "0xabc",
                "amount": "1000000000000000000000",
                "seen_at": "2024-01-01T00:00:00Z",
                "tags": ["a", "b \"c\""],
                "meta": "plain",
            })),
            None,
        );

        assert_eq!(
            statement.sql,
            "insert into public.balances (holder, amount, seen_at, tags, meta) values \
             ($1::varchar(42), $2::numeric(78, 0), $3::timestamptz, $4::text[], $5::jsonb) \
             returning *"
        );
        assert_eq!(statement.bindings[3], json!(r#"{"a","b \"c\""}"#));
        assert_eq!(statement.bindings[4], json!(r#""plain""#));
    }

    #[test]
    fn serial_types_cast_to_integers() {
        let types = ColumnTypes::from_pairs([
            ("id".to_string(), "bigserial".to_string()),
            ("n".to_string(), "serial".to_string()),
        ]);

        assert_eq!(types.get("id"), Some("int8"));
        assert_eq!(types.get("n"), Some("int4"));
    }

    #[test]
    fn update_and_delete_require_a_filter() {
        let table = balances();
        let builder = StatementBuilder::new(&table);
        let values = record(json!({ "amount": 1 }));

        let err = builder.update(&values, &Record::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = builder.delete(&Record::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let statement = builder
            .update(&values, &record(json!({ "holder": "0xabc" })))
            .unwrap();
        assert_eq!(
            statement.sql,
            "update public.balances set amount = $1 where holder = $2 returning *"
        );
        assert_eq!(statement.bindings, vec![json!(1), json!("0xabc")]);
    }

    #[test]
    fn identifiers_are_quoted() {
        let table = TableName::new("Indexer", "Transfer Events");
        let statement = StatementBuilder::new(&table)
            .delete(&record(json!({ "from": "0x1" })))
            .unwrap();

        assert_eq!(
            statement.sql,
            r#"delete from "Indexer"."Transfer Events" where "from" = $1 returning *"#
        );
    }

    #[test]
    fn nested_array_literals() {
        assert_eq!(array_literal(&[json!([1, 2]), json!([3, null])]), "{{1,2},{3,NULL}}");
    }
}
