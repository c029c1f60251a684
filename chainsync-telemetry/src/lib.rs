//! Logging and metrics setup shared by the chainsync binaries and tests.

pub mod metrics;
pub mod tracing;
