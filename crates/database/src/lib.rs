//! Tessera Database - an embeddable in-process relational store.
//!
//! Named tables hold arbitrary keyed values. Declarative joins relate tables,
//! queries filter with the `Where` predicate language and attach joined
//! records, and every mutation runs inside a transaction that is rolled back
//! as a whole when it fails.
//!
//! # Core Components
//!
//! - `Store`: registry of tables and joins; owns the transaction stack
//! - `Table`: handle for reading and writing one table
//! - `Record`: pointer to one stored value, live or snapshot
//! - `TableDefinition` / `StoreOptions`: programmatic configuration
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tessera_database::{create_store, StoreOptions, TableDefinition};
//! use tessera_query::{JoinDefinition, Query};
//!
//! let store = create_store(
//!     vec![
//!         TableDefinition::new("users"),
//!         TableDefinition::new("addr").key_field("id"),
//!     ],
//!     StoreOptions::new().join(JoinDefinition::between("users.addID", "addr")?.named("home")),
//! )?;
//!
//! store.transact(|store, _| {
//!     store.table("addr").add(json!({ "id": 10, "city": "Oakland" }), None)?;
//!     store.table("users").add(json!({ "name": "Bob", "addID": 10 }), None)?;
//!     Ok(())
//! })?;
//!
//! let users = store.query_values(&Query::new("users").join("home"))?;
//! let city = users[0].get("home").and_then(|home| home.get("city"));
//! assert_eq!(city, Some(&"Oakland".into()));
//! # Ok::<(), tessera_core::Error>(())
//! ```

pub mod definition;
mod engine;
pub mod events;
pub mod record;
pub mod store;
pub mod table;

pub use definition::{AddMeta, DataCreator, KeyProvider, StoreOptions, TableDefinition};
pub use events::{ChangeEvent, StoreEvent, TableChange, TableEvent};
pub use record::{Attachment, Record};
pub use store::{Store, TransactionRef, WeakStore};
pub use table::{JoinTarget, SetTargets, Table};

pub use tessera_core::{Error, Key, Result, Value};
pub use tessera_query::{JoinConnection, JoinDefinition, Query, QueryJoin, Where};

/// Creates a store with the given tables and joins.
///
/// Tables are defined in order, each loading its initial rows in its own
/// transaction; joins are registered afterwards.
pub fn create_store(tables: Vec<TableDefinition>, options: StoreOptions) -> Result<Store> {
    let store = Store::new();
    for table in tables {
        store.define_table(table)?;
    }
    for join in options.joins {
        store.add_join(join)?;
    }
    Ok(store)
}
