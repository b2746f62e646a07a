//! Transaction state for Tessera.
//!
//! A `Transaction` is one unit of work. It tracks its phase, lazily captured
//! full-table backups (at most one per table) and the locks it holds. The
//! store drives the phase machine:
//!
//! ```text
//! started -> executed -> validated -> complete
//!     \__________\___________\______-> failed
//! ```

use crate::lock::LockSet;
use crate::table_store::TableData;
use hashbrown::HashMap;
use tessera_core::{Error, Key, Value};
use tracing::trace;

/// Transaction ID type. Doubles as the logical time the transaction started.
pub type TransactionId = u64;

/// Transaction phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    Started,
    Executed,
    Validated,
    Complete,
    Failed,
}

/// A unit of work over one store.
#[derive(Debug)]
pub struct Transaction {
    time: TransactionId,
    phase: TransactionPhase,
    /// Table name → contents before this transaction first touched it.
    backups: HashMap<String, TableData>,
    locks: LockSet,
    error: Option<Error>,
}

impl Transaction {
    /// Creates a started transaction at logical time `time`.
    pub fn begin(time: TransactionId) -> Self {
        Self {
            time,
            phase: TransactionPhase::Started,
            backups: HashMap::new(),
            locks: LockSet::new(),
            error: None,
        }
    }

    pub fn time(&self) -> TransactionId {
        self.time
    }

    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    /// Started: the callback has not returned yet.
    pub fn is_live(&self) -> bool {
        self.phase == TransactionPhase::Started
    }

    pub fn is_failed(&self) -> bool {
        self.phase == TransactionPhase::Failed
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TransactionPhase::Complete
    }

    /// The error that failed this transaction.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    // --- phase transitions; each returns true when the phase changed

    pub fn mark_executed(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }
        self.enter(TransactionPhase::Executed);
        true
    }

    pub fn mark_validated(&mut self) -> bool {
        if self.phase != TransactionPhase::Executed {
            return false;
        }
        self.enter(TransactionPhase::Validated);
        true
    }

    pub fn mark_complete(&mut self) -> bool {
        if self.is_failed() || self.is_complete() {
            return false;
        }
        self.enter(TransactionPhase::Complete);
        true
    }

    pub fn mark_failed(&mut self, error: Error) -> bool {
        if !matches!(
            self.phase,
            TransactionPhase::Started
                | TransactionPhase::Executed
                | TransactionPhase::Validated
        ) {
            return false;
        }
        self.error = Some(error);
        self.enter(TransactionPhase::Failed);
        true
    }

    fn enter(&mut self, phase: TransactionPhase) {
        trace!(time = self.time, from = ?self.phase, to = ?phase, "transaction phase");
        self.phase = phase;
    }

    // --- backups

    pub fn has_backup(&self, table: &str) -> bool {
        self.backups.contains_key(table)
    }

    /// Stores a table's pre-transaction contents. Ignored if one is already held.
    pub fn save_backup(&mut self, table: &str, data: TableData) -> bool {
        if self.backups.contains_key(table) {
            return false;
        }
        self.backups.insert(table.to_string(), data);
        true
    }

    pub fn backed_up_tables(&self) -> Vec<&str> {
        self.backups.keys().map(|name| name.as_str()).collect()
    }

    /// Hands over every captured backup, leaving none behind.
    pub fn take_backups(&mut self) -> HashMap<String, TableData> {
        std::mem::take(&mut self.backups)
    }

    /// Adopts a committed child's backups for tables this transaction has not captured.
    pub fn absorb_backups(&mut self, child: HashMap<String, TableData>) {
        trace!(time = self.time, tables = child.len(), "absorbing child backups");
        for (table, data) in child {
            self.backups.entry(table).or_insert(data);
        }
    }

    // --- locks

    pub fn lock_record(
        &mut self,
        table: &str,
        key: Key,
        new_value: Option<Value>,
        previous_value: Option<Value>,
    ) {
        self.locks.lock_record(table, key, new_value, previous_value);
    }

    pub fn lock_table(&mut self, table: &str) {
        self.locks.lock_table(table);
    }

    pub fn is_locked(&self, table: &str, key: &Key) -> bool {
        self.locks.is_locked(table, key)
    }

    pub fn locks(&self) -> &LockSet {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_store::TableStore;

    #[test]
    fn test_transaction_begin() {
        let tx = Transaction::begin(7);
        assert_eq!(tx.time(), 7);
        assert_eq!(tx.phase(), TransactionPhase::Started);
        assert!(tx.is_live());
    }

    #[test]
    fn test_successful_phase_sequence() {
        let mut tx = Transaction::begin(1);
        assert!(!tx.mark_validated());
        assert!(tx.mark_executed());
        assert!(!tx.is_live());
        assert!(tx.mark_validated());
        assert!(tx.mark_complete());
        assert!(tx.is_complete());

        // terminal
        assert!(!tx.mark_failed(Error::aborted("late")));
        assert!(!tx.mark_complete());
    }

    #[test]
    fn test_failed_from_each_running_phase() {
        let mut tx = Transaction::begin(1);
        assert!(tx.mark_failed(Error::aborted("boom")));
        assert!(tx.is_failed());
        assert_eq!(tx.error(), Some(&Error::aborted("boom")));
        assert!(!tx.mark_complete());

        let mut tx = Transaction::begin(2);
        tx.mark_executed();
        assert!(tx.mark_failed(Error::aborted("boom")));

        let mut tx = Transaction::begin(3);
        tx.mark_executed();
        tx.mark_validated();
        assert!(tx.mark_failed(Error::aborted("boom")));
    }

    #[test]
    fn test_backup_captured_once() {
        let mut store = TableStore::new("users");
        store.insert(Value::Int(1), Value::from("Bob"));

        let mut tx = Transaction::begin(1);
        assert!(tx.save_backup("users", store.snapshot()));
        store.insert(Value::Int(2), Value::from("Sal"));
        assert!(!tx.save_backup("users", store.snapshot()));

        assert_eq!(tx.take_backups().get("users").map(|b| b.len()), Some(1));
        assert!(!tx.has_backup("users"));
    }

    #[test]
    fn test_absorb_backups_keeps_parent_copy() {
        let mut parent = Transaction::begin(1);
        let mut child = Transaction::begin(2);

        let mut early = TableData::new();
        early.insert(Value::Int(1), Value::from("early"));
        let mut late = TableData::new();
        late.insert(Value::Int(1), Value::from("late"));

        parent.save_backup("a", early.clone());
        child.save_backup("a", late);
        child.save_backup("b", TableData::new());

        parent.absorb_backups(child.take_backups());
        assert!(child.backed_up_tables().is_empty());
        assert!(parent.has_backup("b"));
        assert_eq!(parent.take_backups().get("a"), Some(&early));
    }

    #[test]
    fn test_transaction_locks() {
        let mut tx = Transaction::begin(1);
        tx.lock_record("users", Value::Int(1), Some(Value::from("x")), None);
        assert!(tx.is_locked("users", &Value::Int(1)));
        tx.lock_table("addr");
        assert!(tx.is_locked("addr", &Value::from("anything")));
        assert!(!tx.is_locked("users", &Value::Int(2)));
    }
}
