//! Helpers shared by unit and integration tests.
//!
//! - [`database`] spawns isolated Postgres databases.
//! - [`handlers`] holds sample domains, handlers and failing stores.
//! - [`sources`] provides in-memory input sources for backfill and live delivery.

pub mod database;
pub mod handlers;
pub mod sources;
