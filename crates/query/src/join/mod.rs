//! Join definitions and resolution.

pub mod definition;
pub mod resolver;

pub use definition::{IntoConnection, JoinConnection, JoinDefinition};
pub use resolver::{JoinForm, JoinResolver, JoinSource, JoinedRecords};
