//! Lock bookkeeping for Tessera transactions.
//!
//! Every transaction owns a `LockSet` recording the rows it has written
//! (with the value before and after the write) and the tables it has claimed
//! wholesale. A write is refused when any *other* active transaction's
//! `LockSet` covers the same (table, key).

use hashbrown::HashMap;
use tessera_core::{Key, Value};

/// A recorded write to a single key.
#[derive(Clone, Debug, PartialEq)]
pub struct LockEntry {
    /// Value after the write; None for a delete.
    pub new_value: Option<Value>,
    /// Value before the transaction first touched the key; None if it was absent.
    pub previous_value: Option<Value>,
}

/// Lock state for one table.
#[derive(Clone, Debug, Default, PartialEq)]
struct TableLock {
    /// Set once the whole table is exclusively owned.
    whole: bool,
    /// Individually written keys. Kept after a whole-table claim.
    keys: HashMap<Key, LockEntry>,
}

impl TableLock {
    fn covers(&self, key: &Key) -> bool {
        self.whole || self.keys.contains_key(key)
    }
}

/// Locks held by one transaction.
#[derive(Clone, Debug, Default)]
pub struct LockSet {
    tables: HashMap<String, TableLock>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write to `key`. The first previous value seen is kept.
    pub fn lock_record(
        &mut self,
        table: &str,
        key: Key,
        new_value: Option<Value>,
        previous_value: Option<Value>,
    ) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .keys
            .entry(key)
            .and_modify(|entry| entry.new_value = new_value.clone())
            .or_insert(LockEntry {
                new_value,
                previous_value,
            });
    }

    /// Claims the whole table. Entries recorded so far are kept.
    pub fn lock_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default().whole = true;
    }

    /// True if the table is wholly locked or the key is individually locked.
    pub fn is_locked(&self, table: &str, key: &Key) -> bool {
        self.tables
            .get(table)
            .map(|lock| lock.covers(key))
            .unwrap_or(false)
    }

    /// True if any lock is held on the table.
    pub fn touches_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// The recorded write for a key.
    pub fn entry(&self, table: &str, key: &Key) -> Option<&LockEntry> {
        self.tables.get(table).and_then(|lock| lock.keys.get(key))
    }
}
