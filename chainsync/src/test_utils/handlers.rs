use async_trait::async_trait;
use chainsync_postgres::record::Record;
use chainsync_postgres::types::{ColumnSpec, TableName, TableSpec};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::dispatch::{Handler, HandlerContext};
use crate::error::{ErrorKind, SyncResult};
use crate::store::rows::RowStore;
use crate::store::rows::memory::MemoryRowStore;
use crate::types::{HandlerOutcome, Input, InputEvent, Origin, PublishedEvent, RegisteredContract};
use crate::{bail, sync_error};

pub const BALANCES_DOMAIN: &str = "balances";
pub const PAIRS_DOMAIN: &str = "pairs";

/// Token balances keyed by holder.
pub fn balances_table() -> TableSpec {
    TableSpec::new(
        TableName::new("public", "balances"),
        vec![
            ColumnSpec::new("holder", "varchar"),
            ColumnSpec::new("balance", "numeric").not_null().with_default("0"),
            ColumnSpec::new("updated_at_block", "int8"),
        ],
    )
    .unique_by(["holder"])
    .index_by(["updated_at_block"])
}

/// Pairs deployed by a factory.
pub fn pairs_table() -> TableSpec {
    TableSpec::new(
        TableName::new("public", "pairs"),
        vec![
            ColumnSpec::new("pair", "varchar"),
            ColumnSpec::new("created_at_block", "int8"),
        ],
    )
    .unique_by(["pair"])
}

pub fn origin(block_number: u64) -> Origin {
    Origin {
        chain_id: 1,
        block_number,
        timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + block_number as i64 * 12, 0)
            .unwrap_or_default(),
    }
}

/// An `erc20.Transfer` event crediting `value` to `to`.
pub fn transfer_event(block_number: u64, to: &str, value: i64) -> Input {
    Input::Event(InputEvent {
        name: "erc20.Transfer".to_string(),
        origin: origin(block_number),
        data: json!({ "from": "0x00", "to": to, "value": value }),
    })
}

/// A `factory.PairCreated` event announcing `pair`.
pub fn pair_created(block_number: u64, pair: &str) -> Input {
    Input::Event(InputEvent {
        name: "factory.PairCreated".to_string(),
        origin: origin(block_number),
        data: json!({ "pair": pair }),
    })
}

/// Credits the transferred value to the receiver's balance and publishes the new balance.
pub struct TransferHandler;

#[async_trait]
impl Handler for TransferHandler {
    async fn handle(&self, input: &Input, ctx: &HandlerContext<'_>) -> SyncResult<HandlerOutcome> {
        let Input::Event(event) = input else {
            bail!(ErrorKind::InvalidInput, "Transfer handler only accepts events");
        };

        let Some(holder) = event.data.get("to").and_then(Value::as_str) else {
            bail!(ErrorKind::InvalidInput, "Transfer has no receiver");
        };
        let value = event.data.get("value").and_then(Value::as_i64).unwrap_or(0);

        let mut key = Record::new();
        key.insert("holder".to_string(), json!(holder));

        let previous = ctx
            .load_row(&key)
            .await?
            .and_then(|row| row.get("balance").and_then(balance_value))
            .unwrap_or(0);
        let balance = previous + value;

        let mut row = key;
        row.insert("balance".to_string(), json!(balance));
        row.insert(
            "updated_at_block".to_string(),
            json!(event.origin.block_number),
        );

        Ok(HandlerOutcome::unchanged().with_row(row).publish(PublishedEvent::new(
            "balances.Changed",
            json!({ "holder": holder, "balance": balance }),
        )))
    }
}

fn balance_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(value) => value.parse().ok(),
        _ => None,
    }
}

/// Registers the announced pair as a new contract and publishes an event, without writing rows.
pub struct PairCreatedHandler;

#[async_trait]
impl Handler for PairCreatedHandler {
    async fn handle(&self, input: &Input, _ctx: &HandlerContext<'_>) -> SyncResult<HandlerOutcome> {
        let Input::Event(event) = input else {
            bail!(ErrorKind::InvalidInput, "Pair handler only accepts events");
        };

        let Some(pair) = event.data.get("pair").and_then(Value::as_str) else {
            bail!(ErrorKind::InvalidInput, "PairCreated has no pair address");
        };

        Ok(HandlerOutcome::unchanged()
            .register(RegisteredContract {
                address: pair.to_string(),
                group: "pair".to_string(),
                chain_id: event.origin.chain_id,
            })
            .publish(PublishedEvent::new(
                "pairs.Discovered",
                json!({ "pair": pair }),
            )))
    }
}

/// Always fails.
pub struct FailingHandler;

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, input: &Input, _ctx: &HandlerContext<'_>) -> SyncResult<HandlerOutcome> {
        bail!(
            ErrorKind::HandlerFailed,
            "Handler failed on purpose",
            input.name()
        );
    }
}

/// [`RowStore`] that reads from memory and rejects every write.
#[derive(Debug, Clone, Default)]
pub struct FailingRowStore {
    inner: MemoryRowStore,
}

impl FailingRowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for FailingRowStore {
    async fn load_row(&self, table: &TableSpec, key: &Record) -> SyncResult<Option<Record>> {
        self.inner.load_row(table, key).await
    }

    async fn upsert_rows(&self, table: &TableSpec, _rows: Vec<Record>) -> SyncResult<usize> {
        Err(sync_error!(
            ErrorKind::PersistenceFailed,
            "Rows could not be written",
            table.name.to_string()
        ))
    }

    async fn count_rows(&self, table: &TableName) -> SyncResult<u64> {
        self.inner.count_rows(table).await
    }
}
