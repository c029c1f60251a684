//! Introspection of live tables through the Postgres catalog.

use sqlx::{PgPool, Row};
use tracing::warn;

use crate::types::{
    ColumnSpec, ConstraintOrigin, ConstraintRecord, IndexRecord, IntrospectedTable, TableName,
    TableSpec, normalize_type,
};

/// Returns whether the schema (namespace) exists.
pub async fn schema_exists(pool: &PgPool, schema: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("select exists (select 1 from pg_namespace where nspname = $1)")
        .bind(schema)
        .fetch_one(pool)
        .await
}

/// Returns whether the table exists.
pub async fn table_exists(pool: &PgPool, table: &TableName) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        select exists (
            select 1 from pg_tables
            where schemaname = $1 and tablename::text = any($2)
        )
        "#,
    )
    .bind(&table.schema)
    .bind(name_variants(&table.name))
    .fetch_one(pool)
    .await
}

/// Reads the current shape of a table from the catalog.
///
/// The primary key column is excluded from the returned columns, and the index backing the
/// primary key is excluded from the indexes. Unique indexes that have no `pg_constraint` row
/// are reported as unique constraints with [`ConstraintOrigin::UniqueIndex`].
pub async fn introspect_table(
    pool: &PgPool,
    table: &TableName,
) -> Result<IntrospectedTable, sqlx::Error> {
    let names = name_variants(&table.name);

    let constraint_rows = sqlx::query(
        r#"
        select con.conname::text as name,
               con.contype::text as kind,
               pg_get_constraintdef(con.oid) as definition
        from pg_constraint con
        join pg_class rel on rel.oid = con.conrelid
        join pg_namespace nsp on nsp.oid = rel.relnamespace
        where nsp.nspname = $1
          and rel.relname::text = any($2)
          and con.contype in ('p', 'u')
        order by con.conname
        "#,
    )
    .bind(&table.schema)
    .bind(&names)
    .fetch_all(pool)
    .await?;

    let mut primary_key = None;
    let mut unique_constraints = Vec::new();
    for row in constraint_rows {
        let name: String = row.try_get("name")?;
        let kind: String = row.try_get("kind")?;
        let definition: String = row.try_get("definition")?;

        let Some(columns) = parse_column_list(&definition) else {
            warn!(
                table = %table,
                constraint = %name,
                definition = %definition,
                "ignoring constraint with an unparseable column list"
            );
            continue;
        };

        let record = ConstraintRecord::new(name, columns, ConstraintOrigin::Constraint);
        if kind == "p" {
            primary_key = Some(record);
        } else {
            unique_constraints.push(record);
        }
    }

    let index_rows = sqlx::query(
        r#"
        select indexname::text as name, indexdef as definition
        from pg_indexes
        where schemaname = $1 and tablename::text = any($2)
        order by indexname
        "#,
    )
    .bind(&table.schema)
    .bind(&names)
    .fetch_all(pool)
    .await?;

    let mut indexes = Vec::new();
    for row in index_rows {
        let name: String = row.try_get("name")?;
        let definition: String = row.try_get("definition")?;

        if primary_key.as_ref().is_some_and(|pk| pk.name == name) {
            continue;
        }

        let already_enumerated = unique_constraints.iter().any(|c| c.name == name);
        if already_enumerated {
            continue;
        }

        let Some(columns) = parse_column_list(&definition) else {
            warn!(
                table = %table,
                index = %name,
                definition = %definition,
                "ignoring index with an unparseable column list"
            );
            continue;
        };

        if is_unique_index_definition(&definition) {
            unique_constraints.push(ConstraintRecord::new(
                name,
                columns,
                ConstraintOrigin::UniqueIndex,
            ));
        } else {
            indexes.push(IndexRecord::new(name, columns));
        }
    }

    let column_rows = sqlx::query(
        r#"
        select column_name::text as name,
               data_type::text as data_type,
               udt_name::text as udt_name,
               is_nullable::text as is_nullable,
               column_default::text as column_default
        from information_schema.columns
        where table_schema = $1 and table_name::text = any($2)
        order by ordinal_position
        "#,
    )
    .bind(&table.schema)
    .bind(&names)
    .fetch_all(pool)
    .await?;

    let primary_key_columns = primary_key
        .as_ref()
        .map(|pk| pk.columns.clone())
        .unwrap_or_default();

    let mut columns = Vec::with_capacity(column_rows.len());
    for row in column_rows {
        let name: String = row.try_get("name")?;
        if primary_key_columns.contains(&name) {
            continue;
        }

        let data_type: String = row.try_get("data_type")?;
        let udt_name: String = row.try_get("udt_name")?;
        let is_nullable: String = row.try_get("is_nullable")?;
        let default: Option<String> = row.try_get("column_default")?;

        columns.push(ColumnSpec {
            name,
            typ: catalog_type_spelling(&data_type, &udt_name),
            not_null: is_nullable == "NO",
            default,
            primary_key: false,
            serial: false,
        });
    }

    let spec = TableSpec {
        name: table.clone(),
        columns,
        unique_by: unique_constraints
            .iter()
            .map(|constraint| constraint.columns.clone())
            .collect(),
        index_by: indexes.iter().map(|index| index.columns.clone()).collect(),
    };

    Ok(IntrospectedTable {
        spec,
        primary_key,
        unique_constraints,
        indexes,
    })
}

/// Returns every column of a table with its type as rendered by `format_type`, in table
/// order. Unlike [`introspect_table`], the primary key column is included.
pub async fn column_types(
    pool: &PgPool,
    table: &TableName,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        select att.attname::text as name,
               format_type(att.atttypid, att.atttypmod) as type_name
        from pg_attribute att
        join pg_class rel on rel.oid = att.attrelid
        join pg_namespace nsp on nsp.oid = rel.relnamespace
        where nsp.nspname = $1
          and rel.relname::text = any($2)
          and att.attnum > 0
          and not att.attisdropped
        order by att.attnum
        "#,
    )
    .bind(&table.schema)
    .bind(name_variants(&table.name))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| Ok((row.try_get("name")?, row.try_get("type_name")?)))
        .collect()
}

/// Returns whether an index definition describes a unique index.
///
/// `pg_indexes.indexdef` renders unique indexes as `CREATE UNIQUE INDEX ...`. Keeping the check
/// behind this function allows switching to `pg_index.indisunique` without touching callers.
pub fn is_unique_index_definition(definition: &str) -> bool {
    definition.to_lowercase().contains("unique index")
}

/// Extracts the column names of the first parenthesized list of a constraint or index
/// definition.
///
/// Handles `PRIMARY KEY (id)`, `UNIQUE (a, b)` and
/// `CREATE UNIQUE INDEX i ON s.t USING btree (a, b)`. Returns `None` when there is no list or
/// when an entry is an expression rather than a column.
pub fn parse_column_list(definition: &str) -> Option<Vec<String>> {
    let start = definition.find('(')?;

    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut end = None;
    for (offset, c) in definition[start..].char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset);
                    break;
                }
            }
            _ => {}
        }
    }

    let inner = &definition[start + 1..end?];
    let columns = split_top_level(inner)
        .into_iter()
        .map(parse_column_entry)
        .collect::<Option<Vec<_>>>()?;

    if columns.is_empty() {
        return None;
    }

    Some(columns)
}

/// Splits a column list on commas that are not inside quotes or parentheses.
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut part_start = 0;

    for (index, c) in list.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                parts.push(&list[part_start..index]);
                part_start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[part_start..]);

    parts
}

/// Parses one entry of a column list, accepting an optional sort direction.
fn parse_column_entry(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() || (entry.contains('(') && !entry.starts_with('"')) {
        return None;
    }

    let (name, rest) = match entry.strip_prefix('"') {
        Some(quoted) => {
            let close = quoted.find('"')?;
            (quoted[..close].to_string(), &quoted[close + 1..])
        }
        None => {
            let end = entry.find(char::is_whitespace).unwrap_or(entry.len());
            (entry[..end].to_string(), &entry[end..])
        }
    };

    let ordering_only = rest
        .split_whitespace()
        .all(|word| matches!(word.to_lowercase().as_str(), "asc" | "desc" | "nulls" | "first" | "last"));

    ordering_only.then_some(name)
}

/// Returns the spelling used for a catalog column type.
///
/// `information_schema` reports arrays as `ARRAY` and custom types as `USER-DEFINED`, in which
/// case `udt_name` carries the actual type.
fn catalog_type_spelling(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "ARRAY" => normalize_type(udt_name),
        "USER-DEFINED" => udt_name.to_string(),
        other => normalize_type(other),
    }
}

/// Returns the table name both as given and with surrounding double quotes removed or added, so
/// that catalog lookups match quoted and unquoted spellings alike.
fn name_variants(name: &str) -> Vec<String> {
    let unquoted = name.trim_matches('"').to_string();
    let quoted = format!("\"{unquoted}\"");

    let mut variants = vec![unquoted, quoted];
    if !variants.iter().any(|variant| variant == name) {
        variants.push(name.to_string());
    }

    variants
}
