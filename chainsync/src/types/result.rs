use chainsync_postgres::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event a handler wants re-published downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl PublishedEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A contract instance discovered while processing, e.g. one deployed by a factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisteredContract {
    pub address: String,
    /// Name of the contract group the instance belongs to.
    pub group: String,
    pub chain_id: u64,
}

/// What a handler returns for one input.
///
/// An empty `rows` list means the input caused no state change and nothing is persisted. Side
/// effects are reported even when no row changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Rows to upsert into the domain table, keyed by its primary uniqueness group.
    pub rows: Vec<Record>,
    pub published_events: Vec<PublishedEvent>,
    pub registered_contracts: Vec<RegisteredContract>,
}

impl HandlerOutcome {
    /// Returns an outcome without state change or side effects.
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, row: Record) -> Self {
        self.rows.push(row);
        self
    }

    pub fn publish(mut self, event: PublishedEvent) -> Self {
        self.published_events.push(event);
        self
    }

    pub fn register(mut self, contract: RegisteredContract) -> Self {
        self.registered_contracts.push(contract);
        self
    }

    pub fn changed_state(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Output of dispatching one input to one handler.
///
/// `output_count == 0` signals that nothing was persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerResult {
    /// Domain whose table received rows, if any.
    pub output_name: Option<String>,
    pub output_count: usize,
    pub published_events: Vec<PublishedEvent>,
    pub registered_contracts: Vec<RegisteredContract>,
}

impl HandlerResult {
    /// Returns the result of a failed or no-op dispatch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.output_count == 0
            && self.published_events.is_empty()
            && self.registered_contracts.is_empty()
    }
}
