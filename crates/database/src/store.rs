//! Store - registry of tables and joins, owner of the transaction stack.
//!
//! A `Store` is a cheap handle (`Rc`) over shared state. Every mutation runs
//! inside a transaction: `transact` pushes one onto the stack, runs the
//! callback, and either commits it or restores every table it touched from the
//! backups it captured. Mutation entry points on `Table` reuse the innermost
//! live transaction, or open an implicit one when none is running.
//!
//! No `RefCell` borrow is held while user code runs (callbacks, key providers,
//! data creators, listeners), so any of them may call back into the store.

use crate::definition::{AddMeta, DataCreator, KeyProvider, TableDefinition};
use crate::events::{ChangeEvent, StoreEvent, TableChange, TableEvent};
use crate::record::Record;
use crate::table::Table;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tessera_core::{Error, Key, Result, Value};
use tessera_query::{JoinDefinition, Query};
use tessera_reactive::{ChangeSet, Emitter, ListenerId, ObservableQuery};
use tessera_storage::{LockEntry, TableStore, Transaction, TransactionId, TransactionPhase};
use tracing::{debug, trace, warn};

/// Shared state of one table.
pub(crate) struct TableState {
    pub(crate) data: RefCell<TableStore>,
    pub(crate) key_provider: RefCell<Option<KeyProvider>>,
    pub(crate) data_creator: RefCell<Option<DataCreator>>,
    pub(crate) events: Emitter<TableEvent, TableChange>,
}

impl TableState {
    fn new(name: &str) -> Self {
        Self {
            data: RefCell::new(TableStore::new(name)),
            key_provider: RefCell::new(None),
            data_creator: RefCell::new(None),
            events: Emitter::new(),
        }
    }

    pub(crate) fn name(&self) -> String {
        self.data.borrow().name().to_string()
    }

    pub(crate) fn key_field(&self) -> Option<String> {
        self.data.borrow().key_field().map(str::to_string)
    }

    /// Key for a new value: explicit meta key, then the provider, then the counter.
    pub(crate) fn make_key(&self, value: &Value, meta: Option<&AddMeta>) -> Result<Key> {
        let name = self.name();
        if let Some(key) = meta.and_then(|m| m.key.clone()) {
            return non_null_key(&name, key);
        }
        let provider = self.key_provider.borrow().clone();
        if let Some(provider) = provider {
            return match provider(value, &name, meta) {
                Some(key) => non_null_key(&name, key),
                None => Err(Error::key(name, format!("key provider returned no key for {}", value))),
            };
        }
        let key_field = self.key_field();
        match key_field {
            Some(field) => match value.get(&field) {
                Some(key) => non_null_key(&name, key.clone()),
                None => Err(Error::key(name, format!("value has no {} field", field))),
            },
            None => Ok(self.data.borrow_mut().next_key()),
        }
    }
}

fn non_null_key(table: &str, key: Key) -> Result<Key> {
    if key.is_null() {
        return Err(Error::key(table, "null is not a valid key"));
    }
    Ok(key)
}

/// A transaction on the store's stack.
#[derive(Clone)]
pub struct TransactionRef {
    pub(crate) inner: Rc<RefCell<Transaction>>,
}

impl TransactionRef {
    fn new(tx: Transaction) -> Self {
        Self {
            inner: Rc::new(RefCell::new(tx)),
        }
    }

    pub fn time(&self) -> TransactionId {
        self.inner.borrow().time()
    }

    pub fn phase(&self) -> TransactionPhase {
        self.inner.borrow().phase()
    }

    pub fn is_live(&self) -> bool {
        self.inner.borrow().is_live()
    }

    /// True until the transaction completes or fails.
    pub fn is_open(&self) -> bool {
        let tx = self.inner.borrow();
        !(tx.is_complete() || tx.is_failed())
    }

    pub fn error(&self) -> Option<Error> {
        self.inner.borrow().error().cloned()
    }

    /// True if this transaction holds a lock covering the key.
    pub fn holds_lock(&self, table: &str, key: &Key) -> bool {
        self.inner.borrow().is_locked(table, key)
    }

    /// The recorded write to a key, if this transaction made one.
    pub fn lock_entry(&self, table: &str, key: &Key) -> Option<LockEntry> {
        self.inner.borrow().locks().entry(table, key).cloned()
    }

    /// Tables this transaction has captured backups of.
    pub fn backed_up_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .inner
            .borrow()
            .backed_up_tables()
            .into_iter()
            .map(str::to_string)
            .collect();
        tables.sort();
        tables
    }

    fn same(&self, other: &TransactionRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

pub(crate) struct StoreInner {
    tables: RefCell<BTreeMap<String, Rc<TableState>>>,
    joins: RefCell<BTreeMap<String, JoinDefinition>>,
    transactions: RefCell<Vec<TransactionRef>>,
    clock: Cell<TransactionId>,
    events: Emitter<StoreEvent, ChangeEvent>,
}

/// Handle to an in-process store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Non-owning store handle, for listeners that must not keep the store alive.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Pops a transaction however the callback exits. If the scope is dropped
/// without `commit` or `rollback` (the callback panicked), the backups are
/// restored.
struct TransactionScope<'a> {
    store: &'a Store,
    tx: TransactionRef,
    finished: bool,
}

impl TransactionScope<'_> {
    fn commit(mut self) {
        self.finished = true;
        let backups = self.tx.inner.borrow_mut().take_backups();
        self.store.pop_transaction(&self.tx);
        if let Some(parent) = self.store.current_transaction() {
            parent.inner.borrow_mut().absorb_backups(backups);
        }
    }

    fn rollback(mut self) {
        self.finished = true;
        self.store.restore_backups(&self.tx);
        self.store.pop_transaction(&self.tx);
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(time = self.tx.time(), "transaction unwound without finishing");
        self.store.restore_backups(&self.tx);
        self.store.pop_transaction(&self.tx);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                tables: RefCell::new(BTreeMap::new()),
                joins: RefCell::new(BTreeMap::new()),
                transactions: RefCell::new(Vec::new()),
                clock: Cell::new(0),
                events: Emitter::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// True if both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn tick(&self) -> TransactionId {
        let time = self.inner.clock.get() + 1;
        self.inner.clock.set(time);
        time
    }

    // --- tables

    /// Returns a table, creating it on first reference.
    pub fn table(&self, name: &str) -> Table {
        Table::new(self.clone(), name, self.table_state(name))
    }

    pub(crate) fn table_state(&self, name: &str) -> Rc<TableState> {
        if let Some(state) = self.existing_table(name) {
            return state;
        }
        let state = Rc::new(TableState::new(name));
        self.inner
            .tables
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&state));
        trace!(table = name, "created table");
        state
    }

    pub(crate) fn existing_table(&self, name: &str) -> Option<Rc<TableState>> {
        self.inner.tables.borrow().get(name).cloned()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.inner.tables.borrow().contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner.tables.borrow().keys().cloned().collect()
    }

    /// Registers a table (or reconfigures an existing one) and adds its rows.
    pub fn define_table(&self, def: TableDefinition) -> Result<Table> {
        let TableDefinition {
            name,
            key_field,
            key_provider,
            data_creator,
            rows,
        } = def;

        let state = self.table_state(&name);
        if key_field.is_some() {
            state.data.borrow_mut().set_key_field(key_field);
        }
        if key_provider.is_some() {
            *state.key_provider.borrow_mut() = key_provider;
        }
        if data_creator.is_some() {
            *state.data_creator.borrow_mut() = data_creator;
        }

        let table = Table::new(self.clone(), &name, state);
        if !rows.is_empty() {
            table.add_many(rows)?;
        }
        Ok(table)
    }

    // --- joins

    /// Registers a join and returns the name it was registered under.
    ///
    /// An unnamed join is named after its connections, with a numeric suffix
    /// when that name is taken. A named join replaces any join of that name.
    pub fn add_join(&self, def: JoinDefinition) -> Result<String> {
        let mut joins = self.inner.joins.borrow_mut();
        let name = match def.name() {
            Some(name) if name.is_empty() => return Err(Error::join("join name cannot be empty")),
            Some(name) => name.to_string(),
            None => {
                let base = def.default_name();
                let mut name = base.clone();
                let mut suffix = 2;
                while joins.contains_key(&name) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                name
            }
        };
        debug!(join = %name, from = %def.from(), to = %def.to(), "registered join");
        joins.insert(name.clone(), def.named(name.clone()));
        Ok(name)
    }

    pub fn join(&self, name: &str) -> Option<JoinDefinition> {
        self.inner.joins.borrow().get(name).cloned()
    }

    pub(crate) fn require_join(&self, name: &str) -> Result<JoinDefinition> {
        self.join(name)
            .ok_or_else(|| Error::join(format!("unknown join: {}", name)))
    }

    pub fn join_names(&self) -> Vec<String> {
        self.inner.joins.borrow().keys().cloned().collect()
    }

    // --- transactions

    /// Runs `f` as one transaction.
    ///
    /// On success the transaction emits started, executed, validated and
    /// complete, in that order. If `f` returns an error the transaction emits
    /// only failed, every table it touched is restored, and the error is
    /// returned unchanged. Transactions nest; locks held by any open enclosing
    /// transaction bind code running in an inner one.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store, &TransactionRef) -> Result<T>,
    {
        let tx = TransactionRef::new(Transaction::begin(self.tick()));
        let depth = {
            let mut stack = self.inner.transactions.borrow_mut();
            stack.push(tx.clone());
            stack.len()
        };
        let scope = TransactionScope {
            store: self,
            tx: tx.clone(),
            finished: false,
        };
        debug!(time = tx.time(), depth, "transaction started");

        match f(self, &tx) {
            Ok(out) => {
                self.emit_change(StoreEvent::ChangeStarted, &tx, depth);
                let executed = tx.inner.borrow_mut().mark_executed();
                if executed {
                    self.emit_change(StoreEvent::ChangeExecuted, &tx, depth);
                }
                let validated = tx.inner.borrow_mut().mark_validated();
                if validated {
                    self.emit_change(StoreEvent::ChangeValidated, &tx, depth);
                }
                let complete = tx.inner.borrow_mut().mark_complete();
                scope.commit();
                if complete {
                    debug!(time = tx.time(), depth, "transaction complete");
                    self.emit_change(StoreEvent::ChangeComplete, &tx, depth);
                }
                Ok(out)
            }
            Err(err) => {
                let failed = tx.inner.borrow_mut().mark_failed(err.clone());
                warn!(
                    time = tx.time(),
                    depth,
                    tables = tx.backed_up_tables().len(),
                    error = %err,
                    "transaction failed, rolling back"
                );
                if failed {
                    self.emit_change(StoreEvent::ChangeFailed, &tx, depth);
                }
                scope.rollback();
                Err(err)
            }
        }
    }

    /// The innermost transaction, if any.
    pub fn current_transaction(&self) -> Option<TransactionRef> {
        self.inner.transactions.borrow().last().cloned()
    }

    /// Number of transactions on the stack.
    pub fn transaction_depth(&self) -> usize {
        self.inner.transactions.borrow().len()
    }

    /// True if a key is locked by any open transaction.
    pub fn is_locked(&self, table: &str, key: &Key) -> bool {
        self.inner
            .transactions
            .borrow()
            .iter()
            .any(|tx| tx.is_open() && tx.holds_lock(table, key))
    }

    /// Runs `f` in the innermost live transaction, opening one if needed.
    pub(crate) fn with_write_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TransactionRef) -> Result<T>,
    {
        match self.current_transaction() {
            Some(tx) if tx.is_live() => f(&tx),
            _ => self.transact(|_, tx| f(tx)),
        }
    }

    fn pop_transaction(&self, tx: &TransactionRef) {
        let mut stack = self.inner.transactions.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|t| t.same(tx)) {
            stack.remove(pos);
        }
    }

    fn restore_backups(&self, tx: &TransactionRef) {
        let backups = tx.inner.borrow_mut().take_backups();
        for (name, data) in backups {
            match self.existing_table(&name) {
                Some(state) => {
                    trace!(table = %name, rows = data.len(), "restoring table");
                    state.data.borrow_mut().restore(data);
                }
                None => warn!(table = %name, "backup for a table that no longer exists"),
            }
        }
    }

    fn emit_change(&self, event: StoreEvent, tx: &TransactionRef, depth: usize) {
        let payload = ChangeEvent {
            event,
            time: tx.time(),
            depth,
            error: tx.error(),
        };
        self.inner.events.emit(event, &payload);
    }

    /// Fails with a lock error if any open transaction other than `current`
    /// holds a lock covering the key.
    pub(crate) fn check_lock(&self, current: &TransactionRef, table: &str, key: &Key) -> Result<()> {
        let stack = self.inner.transactions.borrow();
        let conflict = stack
            .iter()
            .filter(|tx| !tx.same(current) && tx.is_open())
            .any(|tx| tx.holds_lock(table, key));
        if conflict {
            debug!(table, key = %key, "write refused, key is locked");
            return Err(Error::lock(table, key.clone()));
        }
        Ok(())
    }

    /// Fails with a lock error if any open transaction other than `current`
    /// holds any lock on the table.
    pub(crate) fn check_table_lock(&self, current: &TransactionRef, table: &str, key: &Key) -> Result<()> {
        let stack = self.inner.transactions.borrow();
        let conflict = stack
            .iter()
            .filter(|tx| !tx.same(current) && tx.is_open())
            .any(|tx| tx.inner.borrow().locks().touches_table(table));
        if conflict {
            debug!(table, "table lock refused, table is in use");
            return Err(Error::lock(table, key.clone()));
        }
        Ok(())
    }

    /// Copies a table into the transaction's backups the first time it is written.
    pub(crate) fn capture_backup(&self, tx: &TransactionRef, state: &TableState) {
        let name = state.name();
        if tx.inner.borrow().has_backup(&name) {
            return;
        }
        let snapshot = state.data.borrow().snapshot();
        trace!(table = %name, rows = snapshot.len(), time = tx.time(), "captured backup");
        tx.inner.borrow_mut().save_backup(&name, snapshot);
    }

    /// Writes (`Some`) or deletes (`None`) one key under the current write
    /// transaction. Returns the previous value.
    pub(crate) fn write(&self, state: &TableState, key: Key, value: Option<Value>) -> Result<Option<Value>> {
        self.with_write_tx(|tx| {
            let name = state.name();
            let previous = state.data.borrow().get(&key).cloned();
            if value.is_none() && previous.is_none() {
                return Ok(None);
            }
            self.check_lock(tx, &name, &key)?;
            self.capture_backup(tx, state);
            tx.inner
                .borrow_mut()
                .lock_record(&name, key.clone(), value.clone(), previous.clone());

            let change = TableChange {
                table: name,
                key: key.clone(),
                value: value.clone(),
                previous: previous.clone(),
            };
            match value {
                Some(value) => {
                    state.events.emit(TableEvent::BeforeSet, &change);
                    state.data.borrow_mut().insert(key, value);
                    state.events.emit(TableEvent::AfterSet, &change);
                }
                None => {
                    state.data.borrow_mut().remove(&key);
                    state.events.emit(TableEvent::Removed, &change);
                }
            }
            Ok(previous)
        })
    }

    // --- events

    /// Listens for a transaction lifecycle event.
    pub fn on<F>(&self, event: StoreEvent, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.inner.events.on(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    // --- queries

    /// Runs a query against the table it names.
    pub fn query(&self, query: &Query) -> Result<Vec<Record>> {
        crate::engine::run(self, query)
    }

    /// Runs a query and returns the plain value of each record.
    pub fn query_values(&self, query: &Query) -> Result<Vec<Value>> {
        Ok(self.query(query)?.iter().map(Record::value).collect())
    }

    /// Runs a query and hands each record to `action`, inside one transaction.
    ///
    /// An error from `action` stops the walk and rolls back every write the
    /// walk made. Returns how many records were visited.
    pub fn query_each<F>(&self, query: &Query, mut action: F) -> Result<usize>
    where
        F: FnMut(Record) -> Result<()>,
    {
        self.with_write_tx(|_| {
            let records = self.query(query)?;
            let visited = records.len();
            for record in records {
                action(record)?;
            }
            Ok(visited)
        })
    }

    fn query_rows(&self, query: &Query) -> Result<Vec<(Key, Value)>> {
        Ok(self
            .query(query)?
            .iter()
            .map(|record| (record.key().clone(), record.value()))
            .collect())
    }

    /// Re-runs `query` after every outermost transaction completes and calls
    /// `callback` when its result changed. Returns an id for `unobserve`.
    pub fn observe<F>(&self, query: Query, callback: F) -> Result<ListenerId>
    where
        F: Fn(&ChangeSet) + 'static,
    {
        let observed = ObservableQuery::new(self.query_rows(&query)?);
        observed.subscribe(callback);

        let store = self.downgrade();
        Ok(self.on(StoreEvent::ChangeComplete, move |event| {
            if !event.is_outermost() {
                return;
            }
            let Some(store) = store.upgrade() else {
                return;
            };
            match store.query_rows(&query) {
                Ok(rows) => {
                    observed.update(rows);
                }
                Err(err) => warn!(table = %query.table_name, error = %err, "observed query failed"),
            }
        }))
    }

    pub fn unobserve(&self, id: ListenerId) -> bool {
        self.off(id)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("tables", &self.table_names())
            .field("joins", &self.join_names())
            .field("depth", &self.transaction_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tables_created_on_first_reference() {
        let store = Store::new();
        assert!(!store.has_table("users"));
        store.table("users");
        assert!(store.has_table("users"));
        assert_eq!(store.table_names(), vec!["users".to_string()]);
    }

    #[test]
    fn test_default_join_names_are_unique() {
        let store = Store::new();
        let first = store
            .add_join(JoinDefinition::between("users.addID", "addr").unwrap())
            .unwrap();
        let second = store
            .add_join(JoinDefinition::between("users.addID", "addr").unwrap())
            .unwrap();
        assert_eq!(first, "users_addID_addr");
        assert_eq!(second, "users_addID_addr_2");
        assert_eq!(store.join(&second).unwrap().name(), Some("users_addID_addr_2"));
    }

    #[test]
    fn test_unknown_join() {
        let store = Store::new();
        assert!(matches!(store.require_join("nope"), Err(Error::Join { .. })));
    }

    #[test]
    fn test_transaction_stack() {
        let store = Store::new();
        assert_eq!(store.transaction_depth(), 0);
        store
            .transact(|store, outer| {
                assert_eq!(store.transaction_depth(), 1);
                store.transact(|store, inner| {
                    assert_eq!(store.transaction_depth(), 2);
                    assert!(inner.time() > outer.time());
                    Ok(())
                })
            })
            .unwrap();
        assert_eq!(store.transaction_depth(), 0);
        assert!(store.current_transaction().is_none());
    }

    #[test]
    fn test_make_key_from_key_field() {
        let store = Store::new();
        store
            .define_table(TableDefinition::new("addr").key_field("id"))
            .unwrap();
        let state = store.table_state("addr");

        let key = state.make_key(&Value::from(json!({ "id": 10 })), None).unwrap();
        assert_eq!(key, Value::Int(10));
        assert!(matches!(
            state.make_key(&Value::from(json!({ "city": "x" })), None),
            Err(Error::Key { .. })
        ));
        let meta = AddMeta::with_key("override");
        let key = state.make_key(&Value::from(json!({ "id": 10 })), Some(&meta)).unwrap();
        assert_eq!(key, Value::from("override"));
    }

    #[test]
    fn test_write_outside_transaction_opens_one() {
        let store = Store::new();
        let state = store.table_state("t");
        let completes = Rc::new(Cell::new(0));
        let count = completes.clone();
        store.on(StoreEvent::ChangeComplete, move |_| count.set(count.get() + 1));

        store.write(&state, Value::Int(1), Some(Value::from("a"))).unwrap();
        assert_eq!(completes.get(), 1);
        assert_eq!(store.transaction_depth(), 0);
    }
}
