//! Synchronous event fan-out.
//!
//! An `Emitter` keeps listeners per event kind and calls them in registration
//! order. Listeners are cloned out before any of them runs, so a listener may
//! register or remove listeners (including itself) while an event is being
//! delivered; such changes take effect from the next `emit`.

use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::rc::Rc;

/// Identifies a registered listener.
pub type ListenerId = u64;

/// Listener callback.
pub type Listener<P> = Rc<dyn Fn(&P)>;

/// Event emitter for events of kind `E` carrying payload `P`.
pub struct Emitter<E, P> {
    listeners: RefCell<Vec<(ListenerId, E, Listener<P>)>>,
    next_id: Cell<ListenerId>,
}

impl<E, P> Default for Emitter<E, P> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<E: Copy + Eq + Hash, P> Emitter<E, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for one event kind.
    pub fn on<F>(&self, event: E, listener: F) -> ListenerId
    where
        F: Fn(&P) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners
            .borrow_mut()
            .push((id, event, Rc::new(listener)));
        id
    }

    /// Removes a listener. Returns true if it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Calls every listener of `event`. Returns how many were called.
    pub fn emit(&self, event: E, payload: &P) -> usize {
        let targets: Vec<Listener<P>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == event)
            .map(|(_, _, listener)| Rc::clone(listener))
            .collect();
        for listener in &targets {
            listener(payload);
        }
        targets.len()
    }

    pub fn listener_count(&self, event: E) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == event)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}
