//! Reconciliation of live tables with desired table specs.

pub mod diff;
pub mod materializer;
pub mod plan;

pub use diff::{IndexDiff, SchemaDiff, ValueChange, diff};
pub use materializer::Materializer;
pub use plan::{DdlPlan, plan, plan_creation, primary_key_column_name};
