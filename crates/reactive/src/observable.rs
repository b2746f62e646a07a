//! Observable query results.
//!
//! `ObservableQuery` does not run queries itself. Its owner re-runs the query
//! whenever the data may have changed and hands the fresh rows to `update`,
//! which diffs them against the previous result and notifies subscribers when
//! anything changed.

use crate::change_set::ChangeSet;
use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tessera_core::{Key, Value};
use tracing::trace;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type ChangeCallback = Rc<dyn Fn(&ChangeSet)>;

/// The last result of a query and the callbacks watching it.
pub struct ObservableQuery {
    result: RefCell<Vec<(Key, Value)>>,
    subscriptions: RefCell<HashMap<SubscriptionId, ChangeCallback>>,
    next_id: Cell<SubscriptionId>,
}

impl ObservableQuery {
    /// Creates an observable query starting from `initial`.
    pub fn new(initial: Vec<(Key, Value)>) -> Self {
        Self {
            result: RefCell::new(initial),
            subscriptions: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// The current result.
    pub fn result(&self) -> Vec<(Key, Value)> {
        self.result.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.result.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.borrow().is_empty()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeSet) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscriptions.borrow_mut().insert(id, Rc::new(callback));
        id
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.borrow_mut().remove(&id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Replaces the result. Subscribers are called, in subscription order,
    /// only when the new result differs; the change set is returned then too.
    pub fn update(&self, rows: Vec<(Key, Value)>) -> Option<ChangeSet> {
        let changes = ChangeSet::diff(&self.result.borrow(), rows);
        if changes.is_empty() {
            return None;
        }
        *self.result.borrow_mut() = changes.current_result.clone();

        let mut callbacks: Vec<(SubscriptionId, ChangeCallback)> = self
            .subscriptions
            .borrow()
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);

        trace!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            subscribers = callbacks.len(),
            "query result changed"
        );
        for (_, callback) in &callbacks {
            callback(&changes);
        }
        Some(changes)
    }
}
