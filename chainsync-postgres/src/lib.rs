//! Postgres building blocks shared by the chainsync crates.
//!
//! Holds the table description vocabulary ([`types::TableSpec`] and friends), the type
//! normalizer used as the diffing key, catalog introspection of live tables and the decoding of
//! result rows into generic records.

pub mod catalog;
pub mod pool;
pub mod record;
#[cfg(feature = "test-utils")]
pub mod sqlx;
pub mod types;
