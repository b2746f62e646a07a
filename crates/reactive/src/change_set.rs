//! Change set for tracking query result changes.
//!
//! A ChangeSet is the keyed difference between two query results: records
//! that appeared, records that disappeared, and records whose value changed.

use hashbrown::{HashMap, HashSet};
use tessera_core::{Key, Value};

/// A set of changes to query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Records that were added to the result
    pub added: Vec<(Key, Value)>,
    /// Records that were removed from the result
    pub removed: Vec<(Key, Value)>,
    /// Records whose value changed: (key, old, new)
    pub modified: Vec<(Key, Value, Value)>,
    /// The complete current result
    pub current_result: Vec<(Key, Value)>,
}

impl ChangeSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A change set treating every row of an initial result as added.
    pub fn initial(rows: Vec<(Key, Value)>) -> Self {
        Self {
            added: rows.clone(),
            current_result: rows,
            ..Self::default()
        }
    }

    /// Diffs two results by key.
    ///
    /// `added` and `modified` follow the order of `current`; `removed`
    /// follows the order of `previous`.
    pub fn diff(previous: &[(Key, Value)], current: Vec<(Key, Value)>) -> Self {
        let before: HashMap<&Key, &Value> = previous.iter().map(|(k, v)| (k, v)).collect();
        let mut changes = Self::new();

        for (key, value) in &current {
            match before.get(key) {
                None => changes.added.push((key.clone(), value.clone())),
                Some(old) if *old != value => {
                    changes
                        .modified
                        .push((key.clone(), (*old).clone(), value.clone()))
                }
                Some(_) => {}
            }
        }

        changes.removed = {
            let after: HashSet<&Key> = current.iter().map(|(k, _)| k).collect();
            let removed: Vec<(Key, Value)> = previous
                .iter()
                .filter(|(key, _)| !after.contains(key))
                .cloned()
                .collect();
            removed
        };

        changes.current_result = current;
        changes
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}
