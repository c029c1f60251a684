//! Coordination primitives shared by the long-running parts of the indexer.

pub mod shutdown;
