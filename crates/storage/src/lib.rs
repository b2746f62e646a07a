//! Tessera Storage - Storage layer for the Tessera embedded data store.
//!
//! This crate provides the storage layer including:
//!
//! - `TableStore`: Keyed record storage for a single table, with snapshot/restore
//! - `LockSet`: Per-transaction record and table locks
//! - `Transaction`: Phase state machine, lazy table backups and locks
//!
//! # Example
//!
//! ```rust
//! use tessera_storage::{TableStore, Transaction};
//! use tessera_core::Value;
//!
//! let mut store = TableStore::new("users");
//! let mut tx = Transaction::begin(1);
//!
//! // Capture the table before the first write, then mutate it.
//! tx.save_backup(store.name(), store.snapshot());
//! let key = store.next_key();
//! store.insert(key.clone(), Value::from("Bob"));
//! assert_eq!(store.len(), 1);
//!
//! // Rolling back restores the captured snapshot.
//! for (_, data) in tx.take_backups() {
//!     store.restore(data);
//! }
//! assert!(store.is_empty());
//! ```

pub mod lock;
pub mod table_store;
pub mod transaction;

pub use lock::{LockEntry, LockSet};
pub use table_store::{TableData, TableStore};
pub use transaction::{Transaction, TransactionId, TransactionPhase};
