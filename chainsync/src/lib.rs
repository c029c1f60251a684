//! Table synchronization and event materialization for on-chain data.
//!
//! The engine keeps Postgres tables in the shape domain code declares ([`schema`]), routes
//! events and calls to the handlers registered for them ([`dispatch`]) and persists what the
//! handlers return. Inputs come from a paged historical source ([`backfill`]) and then from a
//! live subscription ([`live`]); [`indexer`] runs the whole sequence.

pub mod backfill;
pub mod concurrency;
pub mod dispatch;
pub mod error;
pub mod indexer;
pub mod live;
mod macros;
pub mod metrics;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
