use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::HandlerResult;

/// Counters collected over one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// Inputs processed, by input name.
    pub inputs: BTreeMap<String, u64>,
    /// Rows persisted, by domain name.
    pub outputs: BTreeMap<String, u64>,
    /// Rows in each domain table once the run completed, by qualified table name.
    pub table_rows: BTreeMap<String, u64>,
    /// Pages fetched.
    pub pages: u64,
}

impl AggregateStats {
    pub fn record_input(&mut self, name: &str) {
        *self.inputs.entry(name.to_string()).or_default() += 1;
    }

    pub fn record_result(&mut self, result: &HandlerResult) {
        if let Some(output_name) = &result.output_name {
            *self.outputs.entry(output_name.clone()).or_default() += result.output_count as u64;
        }
    }

    pub fn total_inputs(&self) -> u64 {
        self.inputs.values().sum()
    }

    pub fn total_outputs(&self) -> u64 {
        self.outputs.values().sum()
    }
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} inputs, {} rows persisted",
            self.pages,
            self.total_inputs(),
            self.total_outputs()
        )?;

        for (table, rows) in &self.table_rows {
            write!(f, ", {table}: {rows} rows")?;
        }

        Ok(())
    }
}
