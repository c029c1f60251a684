//! Database access: statement execution, statement building and row persistence.

pub mod builder;
pub mod executor;
pub mod rows;
