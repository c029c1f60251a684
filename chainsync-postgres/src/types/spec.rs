use std::collections::HashSet;
use std::fmt;

use pg_escape::quote_identifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::normalize_type;

/// Fully qualified Postgres table name with schema and table components.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// The schema (namespace) containing the table.
    pub schema: String,
    /// The name of the table within the schema.
    pub name: String,
}

impl TableName {
    /// Creates a new [`TableName`] with the given schema and table name.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    ///
    /// Escapes both schema and table names according to Postgres identifier quoting rules to
    /// handle special characters and reserved keywords safely.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A single column of a [`TableSpec`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, unique within the table.
    pub name: String,
    /// SQL type as declared. Emitted verbatim in DDL; compared through [`normalize_type`].
    #[serde(rename = "type")]
    pub typ: String,
    /// Whether the column rejects `NULL`.
    #[serde(default)]
    pub not_null: bool,
    /// Raw SQL default expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Creation-time only: column is the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Creation-time only: column is backed by a sequence.
    #[serde(default)]
    pub serial: bool,
}

impl ColumnSpec {
    /// Creates a nullable column without default.
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            typ: typ.into(),
            not_null: false,
            default: None,
            primary_key: false,
            serial: false,
        }
    }

    /// Marks the column as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the raw SQL default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether a sequence backs the column, through the flag or a `*serial` type spelling.
    pub fn is_serial(&self) -> bool {
        self.serial
            || matches!(
                self.typ.trim().to_lowercase().as_str(),
                "smallserial" | "serial" | "bigserial" | "serial2" | "serial4" | "serial8"
            )
    }

    /// Returns the `(name, normalized type)` pair that identifies the column when diffing.
    pub fn identity(&self) -> (String, String) {
        (self.name.clone(), normalize_type(&self.typ))
    }
}

/// Errors raised by [`TableSpec::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableSpecError {
    #[error("column `{column}` is declared more than once in table {table}")]
    DuplicateColumn { table: TableName, column: String },

    #[error("{group} group references unknown column `{column}` in table {table}")]
    UnknownColumn {
        table: TableName,
        group: &'static str,
        column: String,
    },
}

/// Desired or current shape of one table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Qualified table name.
    pub name: TableName,
    /// Ordered columns.
    pub columns: Vec<ColumnSpec>,
    /// Unique groups. The first one is the primary uniqueness group.
    #[serde(default)]
    pub unique_by: Vec<Vec<String>>,
    /// Non-unique index groups.
    #[serde(default)]
    pub index_by: Vec<Vec<String>>,
}

impl TableSpec {
    /// Creates a spec without uniqueness or index groups.
    pub fn new(name: TableName, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name,
            columns,
            unique_by: vec![],
            index_by: vec![],
        }
    }

    /// Adds a unique group.
    pub fn unique_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_by
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a non-unique index group.
    pub fn index_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_by
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the column with the given name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns the primary uniqueness group, if any non-empty one is declared.
    pub fn primary_group(&self) -> Option<&[String]> {
        self.unique_by
            .first()
            .map(Vec::as_slice)
            .filter(|group| !group.is_empty())
    }

    /// Checks that column names are unique and that every group references known columns.
    pub fn validate(&self) -> Result<(), TableSpecError> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableSpecError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let groups = self
            .unique_by
            .iter()
            .map(|group| ("unique", group))
            .chain(self.index_by.iter().map(|group| ("index", group)));
        for (kind, group) in groups {
            if let Some(column) = group.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(TableSpecError::UnknownColumn {
                    table: self.name.clone(),
                    group: kind,
                    column: column.clone(),
                });
            }
        }

        Ok(())
    }

    /// Forces every column of the primary uniqueness group to `NOT NULL`.
    ///
    /// Only the first group is affected; secondary unique groups keep their declared
    /// nullability.
    pub fn with_primary_group_not_null(mut self) -> Self {
        let Some(group) = self.unique_by.first().cloned() else {
            return self;
        };

        for column in self.columns.iter_mut() {
            if group.contains(&column.name) {
                column.not_null = true;
            }
        }

        self
    }
}

/// Where a unique constraint was found in the catalog.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConstraintOrigin {
    /// A row of `pg_constraint`, dropped with `ALTER TABLE ... DROP CONSTRAINT`.
    Constraint,
    /// A unique index without a constraint row, dropped with `DROP INDEX`.
    UniqueIndex,
}

/// A primary key or unique constraint read from the catalog.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConstraintRecord {
    pub name: String,
    /// Column names, sorted.
    pub columns: Vec<String>,
    pub origin: ConstraintOrigin,
}

impl ConstraintRecord {
    pub fn new(name: impl Into<String>, mut columns: Vec<String>, origin: ConstraintOrigin) -> Self {
        columns.sort();
        Self {
            name: name.into(),
            columns,
            origin,
        }
    }
}

/// A non-unique index read from the catalog.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndexRecord {
    pub name: String,
    /// Column names, sorted.
    pub columns: Vec<String>,
}

impl IndexRecord {
    pub fn new(name: impl Into<String>, mut columns: Vec<String>) -> Self {
        columns.sort();
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// The current spec of a live table along with the named catalog objects it was built from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IntrospectedTable {
    /// Current spec, excluding the primary key column.
    pub spec: TableSpec,
    /// Primary key constraint, if the table has one.
    pub primary_key: Option<ConstraintRecord>,
    /// Unique constraints and unique indexes, excluding the primary key.
    pub unique_constraints: Vec<ConstraintRecord>,
    /// Non-unique indexes.
    pub indexes: Vec<IndexRecord>,
}

impl IntrospectedTable {
    /// Returns the unique constraints covering exactly the given sorted columns.
    pub fn unique_constraints_on<'a>(
        &'a self,
        columns: &'a [String],
    ) -> impl Iterator<Item = &'a ConstraintRecord> + 'a {
        self.unique_constraints
            .iter()
            .filter(move |constraint| constraint.columns == columns)
    }

    /// Returns the plain indexes covering exactly the given sorted columns.
    pub fn indexes_on<'a>(
        &'a self,
        columns: &'a [String],
    ) -> impl Iterator<Item = &'a IndexRecord> + 'a {
        self.indexes
            .iter()
            .filter(move |index| index.columns == columns)
    }
}
