//! Tessera Query - Query description and join resolution for Tessera.
//!
//! This crate provides the table-independent half of query evaluation:
//!
//! - `ast`: The `Where` predicate language and the `Query` / `QueryJoin` descriptions
//! - `join`: Declarative `JoinDefinition`s and the `JoinResolver` that turns a
//!   definition into concrete foreign records for a set of local records
//!
//! Table access goes through the `JoinSource` and `RecordView` traits, which the
//! database crate implements over its tables and records.

pub mod ast;
pub mod join;

pub use ast::{
    Against, BinaryOp, BinaryTest, BoolOp, FieldTest, Query, QueryJoin, RecordView, Term, Where,
};
pub use join::{
    IntoConnection, JoinConnection, JoinDefinition, JoinForm, JoinResolver, JoinSource,
    JoinedRecords,
};
