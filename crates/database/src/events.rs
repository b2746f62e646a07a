//! Store and table events.

use tessera_core::{Error, Key, Value};
use tessera_storage::TransactionId;

/// Transaction lifecycle events emitted by a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    ChangeStarted,
    ChangeExecuted,
    ChangeValidated,
    ChangeComplete,
    ChangeFailed,
}

/// Payload of a `StoreEvent`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub event: StoreEvent,
    /// Logical time of the transaction.
    pub time: TransactionId,
    /// Position on the transaction stack; 1 is the outermost transaction.
    pub depth: usize,
    /// Set for `ChangeFailed`.
    pub error: Option<Error>,
}

impl ChangeEvent {
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }
}

/// Per-record events emitted by a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableEvent {
    BeforeSet,
    AfterSet,
    Removed,
}

/// Payload of a `TableEvent`.
#[derive(Clone, Debug, PartialEq)]
pub struct TableChange {
    pub table: String,
    pub key: Key,
    /// The value being written; None for removals.
    pub value: Option<Value>,
    /// The value stored before the write.
    pub previous: Option<Value>,
}
