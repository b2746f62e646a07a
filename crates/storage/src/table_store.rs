//! Record storage for a single table.
//!
//! `TableStore` owns the `key -> value` map of one table together with the
//! counter used to hand out default keys. It knows nothing about
//! transactions; callers capture `snapshot()` before mutating and hand it
//! back to `restore()` on rollback.

use std::collections::BTreeMap;
use tessera_core::{Key, Value};

/// Table contents in table-native (ascending key) order.
pub type TableData = BTreeMap<Key, Value>;

/// Storage for one table.
#[derive(Clone, Debug)]
pub struct TableStore {
    name: String,
    /// Field the key provider reads keys from, if the table is keyed by a field.
    key_field: Option<String>,
    data: TableData,
    /// Next candidate for the default key provider.
    next_key: i64,
}

impl TableStore {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: None,
            data: TableData::new(),
            next_key: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn set_key_field(&mut self, key_field: Option<String>) {
        self.key_field = key_field;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.data.contains_key(key)
    }

    /// Stores a value, returning the value it replaced.
    pub fn insert(&mut self, key: Key, value: Value) -> Option<Value> {
        self.data.insert(key, value)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        self.data.remove(key)
    }

    /// Removes many keys in one swap of the underlying map.
    ///
    /// Returns the removed entries in table order.
    pub fn remove_many(&mut self, keys: &[Key]) -> Vec<(Key, Value)> {
        if keys.is_empty() {
            return Vec::new();
        }
        let doomed: hashbrown::HashSet<&Key> = keys.iter().collect();
        let (removed, kept): (TableData, TableData) = std::mem::take(&mut self.data)
            .into_iter()
            .partition(|(key, _)| doomed.contains(key));
        self.data = kept;
        removed.into_iter().collect()
    }

    /// Returns every key whose stored value equals `value`.
    pub fn keys_for_value(&self, value: &Value) -> Vec<Key> {
        self.data
            .iter()
            .filter(|(_, stored)| *stored == value)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.data.iter()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.data.keys().cloned().collect()
    }

    /// Hands out the next sequential integer key, skipping keys already in use.
    pub fn next_key(&mut self) -> Key {
        loop {
            let candidate = Value::Int(self.next_key);
            self.next_key += 1;
            if !self.data.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Full copy of the current contents.
    pub fn snapshot(&self) -> TableData {
        self.data.clone()
    }

    /// Replaces the contents with a previously captured snapshot.
    pub fn restore(&mut self, data: TableData) {
        self.data = data;
    }
}
