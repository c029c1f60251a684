use std::collections::BTreeSet;

use chainsync_postgres::types::{ColumnSpec, TableSpec, normalize_default};
use serde::Serialize;

/// A column attribute that differs between the current and the desired table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange<T> {
    pub column: String,
    pub before: T,
    pub after: T,
}

/// Added and removed index groups, each a sorted column tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDiff {
    pub added: Vec<Vec<String>>,
    pub removed: Vec<Vec<String>>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Delta between a current and a desired table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    pub columns_added: Vec<ColumnSpec>,
    pub columns_removed: Vec<ColumnSpec>,
    pub defaults_changed: Vec<ValueChange<Option<String>>>,
    pub not_null_changed: Vec<ValueChange<bool>>,
    pub unique_index_diff: IndexDiff,
    pub plain_index_diff: IndexDiff,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.columns_added.is_empty()
            && self.columns_removed.is_empty()
            && self.defaults_changed.is_empty()
            && self.not_null_changed.is_empty()
            && self.unique_index_diff.is_empty()
            && self.plain_index_diff.is_empty()
    }

    /// Whether the table must be dropped and recreated instead of altered.
    ///
    /// Altering a table that both gains and loses columns risks ordering hazards between
    /// defaults, nullability and indexes of the columns being swapped.
    pub fn requires_replace(&self) -> bool {
        !self.columns_added.is_empty() && !self.columns_removed.is_empty()
    }
}

/// Computes the delta between `current` and `desired`.
///
/// Columns are identified by name and normalized type, so a type change shows up as one
/// removal and one addition. Columns present on both sides are compared on their normalized
/// default and on nullability. Index groups are compared as sorted column tuples.
///
/// Desired columns flagged as primary key are ignored, like the primary key column of the
/// current table is.
pub fn diff(current: &TableSpec, desired: &TableSpec) -> SchemaDiff {
    let current_columns = steady_state_columns(current);
    let desired_columns = steady_state_columns(desired);

    let mut result = SchemaDiff::default();

    for desired_column in &desired_columns {
        let identity = desired_column.identity();
        let Some(current_column) = current_columns
            .iter()
            .find(|column| column.identity() == identity)
        else {
            result.columns_added.push((*desired_column).clone());
            continue;
        };

        // A sequence-backed column reads back as its integer type with a `nextval` default
        // and `NOT NULL`, neither of which the desired shape spells out.
        let serial = desired_column.is_serial();

        let current_default = current_column.default.as_deref().map(normalize_default);
        let desired_default = desired_column.default.as_deref().map(normalize_default);
        if !serial && current_default != desired_default {
            result.defaults_changed.push(ValueChange {
                column: desired_column.name.clone(),
                before: current_column.default.clone(),
                after: desired_column.default.clone(),
            });
        }

        let desired_not_null = desired_column.not_null || serial;
        if current_column.not_null != desired_not_null {
            result.not_null_changed.push(ValueChange {
                column: desired_column.name.clone(),
                before: current_column.not_null,
                after: desired_not_null,
            });
        }
    }

    for current_column in &current_columns {
        let identity = current_column.identity();
        if !desired_columns
            .iter()
            .any(|column| column.identity() == identity)
        {
            result.columns_removed.push((*current_column).clone());
        }
    }

    result.unique_index_diff = diff_groups(&current.unique_by, &desired.unique_by);
    result.plain_index_diff = diff_groups(&current.index_by, &desired.index_by);

    result
}

fn steady_state_columns(spec: &TableSpec) -> Vec<&ColumnSpec> {
    spec.columns
        .iter()
        .filter(|column| !column.primary_key)
        .collect()
}

/// Returns the sorted, deduplicated column tuples of the non-empty groups.
fn group_keys(groups: &[Vec<String>]) -> BTreeSet<Vec<String>> {
    groups
        .iter()
        .filter(|group| !group.is_empty())
        .map(|group| {
            let mut key = group.clone();
            key.sort();
            key.dedup();
            key
        })
        .collect()
}

fn diff_groups(current: &[Vec<String>], desired: &[Vec<String>]) -> IndexDiff {
    let current = group_keys(current);
    let desired = group_keys(desired);

    IndexDiff {
        added: desired.difference(&current).cloned().collect(),
        removed: current.difference(&desired).cloned().collect(),
    }
}
