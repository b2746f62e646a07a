//! Tessera Reactive - Change notification for Tessera stores.
//!
//! This crate holds the pieces a store uses to tell the outside world that
//! something changed:
//!
//! - `Emitter`: synchronous `on` / `off` / `emit` fan-out keyed by event kind
//! - `ChangeSet`: keyed difference between two query results
//! - `ObservableQuery`: the last result of a query plus the subscribers to
//!   notify when a fresh result differs from it
//!
//! # Example
//!
//! ```
//! use tessera_core::Value;
//! use tessera_reactive::ObservableQuery;
//!
//! let query = ObservableQuery::new(vec![(Value::Int(1), Value::from("Bob"))]);
//! query.subscribe(|changes| assert_eq!(changes.added.len(), 1));
//!
//! let changes = query
//!     .update(vec![
//!         (Value::Int(1), Value::from("Bob")),
//!         (Value::Int(2), Value::from("Sal")),
//!     ])
//!     .unwrap();
//! assert_eq!(changes.added[0].0, Value::Int(2));
//! ```

pub mod change_set;
pub mod emitter;
pub mod observable;

pub use change_set::ChangeSet;
pub use emitter::{Emitter, Listener, ListenerId};
pub use observable::{ChangeCallback, ObservableQuery, SubscriptionId};
