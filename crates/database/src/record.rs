//! Records - pointers to stored values.
//!
//! A live record re-reads its table on every access. A snapshot record carries
//! the value it was built with; the query engine uses snapshots for joined
//! records so one result stays internally consistent. Either kind can have
//! joined records attached, which `value()` folds into plain data.

use crate::store::Store;
use tessera_core::{Key, Result, Value};
use tessera_query::RecordView;
use tracing::warn;

/// Records attached to another record by a join.
#[derive(Clone, Debug)]
pub enum Attachment {
    /// Result of a singular join: the match, or nothing.
    One(Option<Box<Record>>),
    /// Result of a plural join.
    Many(Vec<Record>),
}

impl Attachment {
    pub fn value(&self) -> Value {
        match self {
            Attachment::One(Some(record)) => record.value(),
            Attachment::One(None) => Value::Null,
            Attachment::Many(records) => Value::Array(records.iter().map(Record::value).collect()),
        }
    }

    pub fn records(&self) -> Vec<&Record> {
        match self {
            Attachment::One(record) => record.iter().map(|r| &**r).collect(),
            Attachment::Many(records) => records.iter().collect(),
        }
    }
}

#[derive(Clone)]
enum Source {
    Live,
    Snapshot(Value),
}

/// A pointer to one keyed value of a table.
#[derive(Clone)]
pub struct Record {
    store: Store,
    table: String,
    key: Key,
    source: Source,
    joins: Vec<(String, Attachment)>,
}

impl Record {
    pub(crate) fn live(store: Store, table: &str, key: Key) -> Self {
        Self {
            store,
            table: table.to_string(),
            key,
            source: Source::Live,
            joins: Vec::new(),
        }
    }

    pub(crate) fn snapshot(store: Store, table: &str, key: Key, frozen: Value) -> Self {
        Self {
            store,
            table: table.to_string(),
            key,
            source: Source::Snapshot(frozen),
            joins: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.source, Source::Snapshot(_))
    }

    /// The record's value: the frozen one for snapshots, otherwise a fresh read.
    pub fn data(&self) -> Option<Value> {
        match &self.source {
            Source::Snapshot(frozen) => Some(frozen.clone()),
            Source::Live => self
                .store
                .existing_table(&self.table)
                .and_then(|state| state.data.borrow().get(&self.key).cloned()),
        }
    }

    /// True if the key is stored, or the record is a snapshot.
    pub fn exists(&self) -> bool {
        match &self.source {
            Source::Snapshot(_) => true,
            Source::Live => self
                .store
                .existing_table(&self.table)
                .map(|state| state.data.borrow().contains_key(&self.key))
                .unwrap_or(false),
        }
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.data().and_then(|data| data.get(field).cloned())
    }

    /// Sets a field through the record's table. Snapshots update their frozen
    /// value as well. Scalar records are left alone with a warning.
    pub fn set_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.data().map(|data| data.is_scalar()).unwrap_or(false) {
            warn!(table = %self.table, key = %self.key, field, "cannot set a field on a scalar record");
            return Ok(());
        }
        self.store
            .table(&self.table)
            .set_field(self.key.clone(), field, value.clone())?;
        if let Source::Snapshot(frozen) = &mut self.source {
            frozen.set_field(field, value);
        }
        Ok(())
    }

    /// Removes the record's key from its table.
    pub fn delete(&self) -> Result<bool> {
        self.store.table(&self.table).remove_key(&self.key)
    }

    /// Attaches joined records under `attach_key`, replacing any previous attachment.
    pub fn add_join(&mut self, attach_key: impl Into<String>, attachment: Attachment) {
        let attach_key = attach_key.into();
        self.joins.retain(|(name, _)| *name != attach_key);
        self.joins.push((attach_key, attachment));
    }

    pub fn joined(&self, attach_key: &str) -> Option<&Attachment> {
        self.joins
            .iter()
            .find(|(name, _)| name == attach_key)
            .map(|(_, attachment)| attachment)
    }

    /// Plain data: the record's value plus every attachment's value under
    /// its attach key. Scalar values are returned as they are.
    pub fn value(&self) -> Value {
        let mut value = self.data().unwrap_or_default();
        if let Some(fields) = value.as_object_mut() {
            for (attach_key, attachment) in &self.joins {
                fields.insert(attach_key.clone(), attachment.value());
            }
        }
        value
    }
}

impl RecordView for Record {
    fn key(&self) -> &Key {
        &self.key
    }

    fn data(&self) -> Option<Value> {
        Record::data(self)
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table)
            .field("key", &self.key)
            .field("snapshot", &self.is_snapshot())
            .field("joins", &self.joins)
            .finish()
    }
}
