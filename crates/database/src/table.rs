//! Table handle.
//!
//! A `Table` is a cheap handle (store + table state). Reads (`get_data`,
//! `has_key`, `records`) go straight to storage. Writes go through the store's
//! write path, so they are locked, backed up and evented inside the current
//! transaction, or inside an implicit one when none is open.

use crate::definition::AddMeta;
use crate::events::{TableChange, TableEvent};
use crate::record::Record;
use crate::store::{Store, TableState};
use std::rc::Rc;
use tessera_core::{Error, Key, Result, Value};
use tessera_query::{JoinForm, JoinResolver, Query, Where};
use tessera_reactive::ListenerId;
use tracing::{debug, warn};

/// One side of a pair passed to `Table::join`.
#[derive(Clone, Debug)]
pub enum JoinTarget {
    Key(Key),
    Record(Record),
    /// Every record whose value equals this one.
    Value(Value),
    Many(Vec<JoinTarget>),
}

impl From<Record> for JoinTarget {
    fn from(record: Record) -> Self {
        JoinTarget::Record(record)
    }
}

impl From<&Record> for JoinTarget {
    fn from(record: &Record) -> Self {
        JoinTarget::Record(record.clone())
    }
}

impl<T: Into<JoinTarget>> From<Vec<T>> for JoinTarget {
    fn from(targets: Vec<T>) -> Self {
        JoinTarget::Many(targets.into_iter().map(Into::into).collect())
    }
}

/// Records picked out by `Table::set_many`.
#[derive(Clone, Debug)]
pub enum SetTargets {
    Keys(Vec<Key>),
    /// Every record the filter matches.
    Matching(Where),
}

impl From<Vec<Key>> for SetTargets {
    fn from(keys: Vec<Key>) -> Self {
        SetTargets::Keys(keys)
    }
}

impl From<Key> for SetTargets {
    fn from(key: Key) -> Self {
        SetTargets::Keys(vec![key])
    }
}

impl From<Where> for SetTargets {
    fn from(filter: Where) -> Self {
        SetTargets::Matching(filter)
    }
}

impl JoinTarget {
    pub fn key(key: impl Into<Key>) -> Self {
        JoinTarget::Key(key.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        JoinTarget::Value(value.into())
    }

    /// Resolves to keys of `table`.
    fn keys(&self, table: &Table) -> Result<Vec<Key>> {
        match self {
            JoinTarget::Key(key) => Ok(vec![key.clone()]),
            JoinTarget::Record(record) => {
                if record.table_name() != table.name() {
                    return Err(Error::join(format!(
                        "record from table {} used as a {} target",
                        record.table_name(),
                        table.name()
                    )));
                }
                Ok(vec![record.key().clone()])
            }
            JoinTarget::Value(value) => {
                let keys = table.state.data.borrow().keys_for_value(value);
                if keys.is_empty() {
                    return Err(Error::join(format!(
                        "no record in table {} has value {}",
                        table.name(),
                        value
                    )));
                }
                Ok(keys)
            }
            JoinTarget::Many(targets) => {
                let mut keys = Vec::new();
                for target in targets {
                    keys.extend(target.keys(table)?);
                }
                Ok(keys)
            }
        }
    }
}

/// Handle to one table of a store.
#[derive(Clone)]
pub struct Table {
    store: Store,
    name: String,
    pub(crate) state: Rc<TableState>,
}

impl Table {
    pub(crate) fn new(store: Store, name: &str, state: Rc<TableState>) -> Self {
        Self {
            store,
            name: name.to_string(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Field records are keyed by, if any.
    pub fn key_field(&self) -> Option<String> {
        self.state.key_field()
    }

    // --- reads

    pub fn len(&self) -> usize {
        self.state.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.data.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.state.data.borrow().keys()
    }

    /// Stored value for a key. Never fails; missing keys give `None`.
    pub fn get_data(&self, key: &Key) -> Option<Value> {
        self.state.data.borrow().get(key).cloned()
    }

    pub fn has_key(&self, key: &Key) -> bool {
        self.state.data.borrow().contains_key(key)
    }

    /// A live record for a key, whether or not the key exists.
    pub fn record(&self, key: impl Into<Key>) -> Record {
        Record::live(self.store.clone(), &self.name, key.into())
    }

    /// Live records for every key, in table order.
    pub fn records(&self) -> Vec<Record> {
        self.keys().into_iter().map(|key| self.record(key)).collect()
    }

    // --- writes

    /// Adds a value. The data creator runs first; the key is `meta.key`, else
    /// the key provider's, else the next sequential key.
    pub fn add(&self, data: impl Into<Value>, meta: Option<AddMeta>) -> Result<Record> {
        let data = data.into();
        let creator = self.state.data_creator.borrow().clone();
        let value = match creator {
            Some(creator) => {
                creator(data, meta.as_ref()).map_err(|message| Error::validation(&self.name, message))?
            }
            None => data,
        };
        let key = self.state.make_key(&value, meta.as_ref())?;
        self.set(key, value)
    }

    /// Adds every value in one transaction.
    pub fn add_many<I, V>(&self, items: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.store
            .with_write_tx(|_| items.into_iter().map(|item| self.add(item, None)).collect())
    }

    /// Stores a value at a key, overwriting any previous value.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Record> {
        let key = key.into();
        if key.is_null() {
            return Err(Error::key(&self.name, "null is not a valid key"));
        }
        self.store
            .write(&self.state, key.clone(), Some(value.into()))?;
        Ok(self.record(key))
    }

    /// Sets one field of a stored object.
    pub fn set_field(&self, key: impl Into<Key>, field: &str, value: impl Into<Value>) -> Result<Record> {
        let value = value.into();
        self.set_field_with(key, field, move |_, _| value)
    }

    /// Sets one field to a value computed from the current record value.
    ///
    /// Fails with `NotFound` if the key is absent. On a scalar-valued record
    /// this logs a warning and leaves the record alone.
    pub fn set_field_with<F>(&self, key: impl Into<Key>, field: &str, compute: F) -> Result<Record>
    where
        F: FnOnce(&Value, &Key) -> Value,
    {
        let key = key.into();
        let Some(current) = self.get_data(&key) else {
            return Err(Error::not_found(&self.name, key));
        };
        if current.is_scalar() {
            warn!(table = %self.name, key = %key, field, "cannot set a field on a scalar record");
            return Ok(self.record(key));
        }
        let new_field = compute(&current, &key);
        let mut updated = current;
        updated.set_field(field, new_field);
        self.set(key, updated)
    }

    /// Sets one field on several records in one transaction.
    ///
    /// Every listed key must exist; a missing one fails with `NotFound` and
    /// undoes the fields already set. Returns how many records were visited.
    pub fn set_many(&self, targets: impl Into<SetTargets>, field: &str, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.store.with_write_tx(|_| {
            let keys = match targets.into() {
                SetTargets::Keys(keys) => keys,
                SetTargets::Matching(filter) => self
                    .query(&Query::new(self.name.as_str()).filter(filter))?
                    .iter()
                    .map(|record| record.key().clone())
                    .collect(),
            };
            for key in &keys {
                self.set_field(key.clone(), field, value.clone())?;
            }
            debug!(table = %self.name, field, count = keys.len(), "set field on many records");
            Ok(keys.len())
        })
    }

    /// Removes a key. Returns false if it was absent.
    pub fn remove_key(&self, key: &Key) -> Result<bool> {
        Ok(self.store.write(&self.state, key.clone(), None)?.is_some())
    }

    /// Removes every record whose value equals `value`. Returns how many went.
    pub fn remove_item(&self, value: &Value) -> Result<usize> {
        let keys = self.state.data.borrow().keys_for_value(value);
        self.store.with_write_tx(|_| {
            for key in &keys {
                self.remove_key(key)?;
            }
            Ok(keys.len())
        })
    }

    /// Removes every record a query matches, as one table-wide swap.
    pub fn remove_query(&self, query: &Query) -> Result<usize> {
        let keys: Vec<Key> = self
            .query(query)?
            .iter()
            .map(|record| record.key().clone())
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        self.store.with_write_tx(|tx| {
            for key in &keys {
                self.store.check_lock(tx, &self.name, key)?;
            }
            self.store.check_table_lock(tx, &self.name, &keys[0])?;
            self.store.capture_backup(tx, &self.state);
            tx.inner.borrow_mut().lock_table(&self.name);

            let removed = self.state.data.borrow_mut().remove_many(&keys);
            debug!(table = %self.name, removed = removed.len(), "removed query matches");
            {
                let mut tx = tx.inner.borrow_mut();
                for (key, previous) in &removed {
                    tx.lock_record(&self.name, key.clone(), None, Some(previous.clone()));
                }
            }
            for (key, previous) in &removed {
                let change = TableChange {
                    table: self.name.clone(),
                    key: key.clone(),
                    value: None,
                    previous: Some(previous.clone()),
                };
                self.state.events.emit(TableEvent::Removed, &change);
            }
            Ok(removed.len())
        })
    }

    /// Records relationships through a registered join.
    ///
    /// Each pair is (local targets, foreign targets). Many-to-many joins add
    /// a row to the join table per key pair unless an identical row exists.
    /// Other joins write the related key into whichever side holds a key field.
    pub fn join<L, F>(&self, pairs: Vec<(L, F)>, join_name: &str) -> Result<()>
    where
        L: Into<JoinTarget>,
        F: Into<JoinTarget>,
    {
        let def = self.store.require_join(join_name)?;
        let resolver = JoinResolver::new(&def, &self.name, &self.store)?;
        let foreign = self.store.table(resolver.foreign_table());

        let pairs: Vec<(JoinTarget, JoinTarget)> = pairs
            .into_iter()
            .map(|(local, foreign)| (local.into(), foreign.into()))
            .collect();

        self.store.with_write_tx(|_| {
            for (local_target, foreign_target) in &pairs {
                let local_keys = local_target.keys(self)?;
                let foreign_keys = foreign_target.keys(&foreign)?;
                self.link(&resolver, &foreign, &local_keys, &foreign_keys)?;
            }
            Ok(())
        })
    }

    fn link(&self, resolver: &JoinResolver, foreign: &Table, local_keys: &[Key], foreign_keys: &[Key]) -> Result<()> {
        match resolver.form() {
            JoinForm::ManyToMany => {
                let join_table = match resolver.join_table() {
                    Some(name) => self.store.table(name),
                    None => return Err(Error::join("many-to-many join without a join table")),
                };
                let local_column = resolver.local().join_table_column();
                let foreign_column = resolver.foreign().join_table_column();
                for local_key in local_keys {
                    for foreign_key in foreign_keys {
                        let mut row = Value::object();
                        row.set_field(local_column, local_key.clone());
                        row.set_field(foreign_column, foreign_key.clone());
                        if join_table.state.data.borrow().keys_for_value(&row).is_empty() {
                            join_table.add(row, None)?;
                        }
                    }
                }
                Ok(())
            }
            JoinForm::FromForeignKey => {
                let field = resolver.local_key().unwrap_or_default();
                let [foreign_key] = foreign_keys else {
                    return Err(Error::join(format!(
                        "{} holds one {} key, got {}",
                        resolver.local(),
                        foreign.name(),
                        foreign_keys.len()
                    )));
                };
                for local_key in local_keys {
                    self.set_field(local_key.clone(), field, foreign_key.clone())?;
                }
                Ok(())
            }
            JoinForm::ToForeignKey => {
                let field = resolver.foreign_key().unwrap_or_default();
                let [local_key] = local_keys else {
                    return Err(Error::join(format!(
                        "{} holds one {} key, got {}",
                        resolver.foreign(),
                        self.name,
                        local_keys.len()
                    )));
                };
                for foreign_key in foreign_keys {
                    foreign.set_field(foreign_key.clone(), field, local_key.clone())?;
                }
                Ok(())
            }
            form => Err(Error::join(format!(
                "cannot record a {:?} join between {} and {}",
                form,
                resolver.local(),
                resolver.foreign()
            ))),
        }
    }

    // --- queries

    /// Runs a query; fails if it targets another table.
    pub fn query(&self, query: &Query) -> Result<Vec<Record>> {
        if query.table_name != self.name {
            return Err(Error::query(format!(
                "query for table {} sent to table {}",
                query.table_name, self.name
            )));
        }
        self.store.query(query)
    }

    /// Like `Store::query_each`, for a query over this table.
    pub fn query_each<F>(&self, query: &Query, action: F) -> Result<usize>
    where
        F: FnMut(Record) -> Result<()>,
    {
        if query.table_name != self.name {
            return Err(Error::query(format!(
                "query for table {} sent to table {}",
                query.table_name, self.name
            )));
        }
        self.store.query_each(query, action)
    }

    // --- events

    pub fn on<F>(&self, event: TableEvent, listener: F) -> ListenerId
    where
        F: Fn(&TableChange) + 'static,
    {
        self.state.events.on(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.state.events.off(id)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
