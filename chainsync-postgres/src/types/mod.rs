//! Table description types shared by introspection, diffing and materialization.

mod normalize;
mod spec;

pub use normalize::{normalize_default, normalize_type};
pub use spec::{
    ColumnSpec, ConstraintOrigin, ConstraintRecord, IndexRecord, IntrospectedTable, TableName,
    TableSpec, TableSpecError,
};
