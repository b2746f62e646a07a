//! Query AST definitions.

pub mod predicate;
pub mod query;

pub use predicate::{Against, BinaryOp, BinaryTest, BoolOp, FieldTest, RecordView, Term, Where};
pub use query::{Query, QueryJoin};
