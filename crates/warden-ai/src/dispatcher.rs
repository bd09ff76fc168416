//! Central tick dispatcher.
//!
//! Registered entries are updated once per tick in registration order. The
//! active list is never mutated while it is iterated: registrations wait in
//! a pending queue until the next tick starts and removals are applied after
//! the tick ends.

use tracing::{debug, info};
use warden_common::AgentId;

/// Something the dispatcher can drive.
pub trait Updatable {
    /// Advances by one frame.
    fn on_update(&mut self, dt: f32);

    /// Inactive entries stay registered but are skipped.
    fn is_active(&self) -> bool {
        true
    }

    /// Checked after each update; `true` queues the entry for removal.
    fn wants_removal(&self) -> bool {
        false
    }
}

impl<U: Updatable + ?Sized> Updatable for Box<U> {
    fn on_update(&mut self, dt: f32) {
        (**self).on_update(dt);
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn wants_removal(&self) -> bool {
        (**self).wants_removal()
    }
}

#[derive(Debug)]
struct Entry<T> {
    id: AgentId,
    item: T,
}

/// Drives registered entries of type `T`.
#[derive(Debug)]
pub struct TickDispatcher<T> {
    entries: Vec<Entry<T>>,
    pending: Vec<Entry<T>>,
    removals: Vec<AgentId>,
    paused: bool,
    ticks: u64,
}

impl<T: Updatable> TickDispatcher<T> {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: Vec::new(),
            removals: Vec::new(),
            paused: false,
            ticks: 0,
        }
    }

    /// Queues an entry. It is first updated on the next tick.
    pub fn register(&mut self, item: T) -> AgentId {
        let id = AgentId::new();
        self.pending.push(Entry { id, item });
        debug!(%id, "Queued registration");
        id
    }

    /// Requests removal. Pending entries are dropped at once; active entries
    /// leave after the current or next tick. Returns whether `id` was known.
    pub fn unregister(&mut self, id: AgentId) -> bool {
        if let Some(index) = self.pending.iter().position(|e| e.id == id) {
            self.pending.remove(index);
            return true;
        }
        if self.entries.iter().any(|e| e.id == id) {
            if !self.removals.contains(&id) {
                self.removals.push(id);
            }
            return true;
        }
        false
    }

    /// Runs one tick and hands back the entries removed at its end.
    pub fn tick(&mut self, dt: f32) -> Vec<(AgentId, T)> {
        if self.paused {
            return Vec::new();
        }
        self.activate_pending();

        for entry in &mut self.entries {
            if !entry.item.is_active() {
                continue;
            }
            entry.item.on_update(dt);
            if entry.item.wants_removal() && !self.removals.contains(&entry.id) {
                self.removals.push(entry.id);
            }
        }

        let removed = self.process_removals();
        self.ticks += 1;
        removed
    }

    fn activate_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        for entry in self.pending.drain(..) {
            info!(id = %entry.id, "Registered");
            self.entries.push(entry);
        }
    }

    fn process_removals(&mut self) -> Vec<(AgentId, T)> {
        if self.removals.is_empty() {
            return Vec::new();
        }
        let removals = std::mem::take(&mut self.removals);
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition::<Vec<_>, _>(|entry| removals.contains(&entry.id));
        self.entries = kept;
        removed
            .into_iter()
            .map(|entry| {
                info!(id = %entry.id, "Removed");
                (entry.id, entry.item)
            })
            .collect()
    }

    /// Stops ticking until [`TickDispatcher::resume`].
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes ticking.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether ticking is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drops every entry, active or pending.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.removals.clear();
    }

    /// Active entry by id.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&T> {
        self.entries
            .iter()
            .chain(&self.pending)
            .find(|e| e.id == id)
            .map(|e| &e.item)
    }

    /// Mutable entry by id.
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .chain(&mut self.pending)
            .find(|e| e.id == id)
            .map(|e| &mut e.item)
    }

    /// Active entries in update order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &T)> {
        self.entries.iter().map(|e| (e.id, &e.item))
    }

    /// Active entries in update order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AgentId, &mut T)> {
        self.entries.iter_mut().map(|e| (e.id, &mut e.item))
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries waiting for the next tick.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Removals waiting for the end of a tick.
    #[must_use]
    pub fn removal_count(&self) -> usize {
        self.removals.len()
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }
}

impl<T: Updatable> Default for TickDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Updatable that records its label into a shared log.
    struct Probe {
        label: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        active: bool,
        remove_after: Option<u32>,
        updates: u32,
    }

    impl Probe {
        fn new(label: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Self {
            Self {
                label,
                log: Rc::clone(log),
                active: true,
                remove_after: None,
                updates: 0,
            }
        }
    }

    impl Updatable for Probe {
        fn on_update(&mut self, _dt: f32) {
            self.updates += 1;
            self.log.borrow_mut().push(self.label);
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn wants_removal(&self) -> bool {
            self.remove_after.is_some_and(|n| self.updates >= n)
        }
    }

    #[test]
    fn test_registration_order_and_deferred_activation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = TickDispatcher::new();
        dispatcher.register(Probe::new("a", &log));
        dispatcher.register(Probe::new("b", &log));
        assert_eq!(dispatcher.len(), 0);
        assert_eq!(dispatcher.pending_count(), 2);

        dispatcher.tick(0.016);
        dispatcher.register(Probe::new("c", &log));
        dispatcher.tick(0.016);
        assert_eq!(*log.borrow(), vec!["a", "b", "a", "b", "c"]);
        assert_eq!(dispatcher.tick_count(), 2);
    }

    #[test]
    fn test_inactive_entries_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = TickDispatcher::new();
        let mut sleeper = Probe::new("sleeper", &log);
        sleeper.active = false;
        let id = dispatcher.register(sleeper);
        dispatcher.tick(0.016);
        assert!(log.borrow().is_empty());

        dispatcher.get_mut(id).expect("registered").active = true;
        dispatcher.tick(0.016);
        assert_eq!(*log.borrow(), vec!["sleeper"]);
    }

    #[test]
    fn test_removal_is_deferred_until_after_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = TickDispatcher::new();
        let mut once = Probe::new("once", &log);
        once.remove_after = Some(1);
        dispatcher.register(once);
        dispatcher.register(Probe::new("stay", &log));

        let removed = dispatcher.tick(0.016);
        assert_eq!(*log.borrow(), vec!["once", "stay"]);
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1.label, "once");

        let stay = dispatcher.iter().map(|(id, _)| id).next().expect("one entry");
        assert!(dispatcher.unregister(stay));
        assert_eq!(dispatcher.len(), 1);
        dispatcher.tick(0.016);
        assert!(dispatcher.is_empty());
        assert!(!dispatcher.unregister(stay));
    }

    #[test]
    fn test_unregister_pending_entry() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = TickDispatcher::new();
        let id = dispatcher.register(Probe::new("never", &log));
        assert!(dispatcher.unregister(id));
        dispatcher.tick(0.016);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_pause_resume_and_clear() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher: TickDispatcher<Box<dyn Updatable>> = TickDispatcher::new();
        dispatcher.register(Box::new(Probe::new("boxed", &log)));
        dispatcher.pause();
        dispatcher.tick(0.016);
        assert!(log.borrow().is_empty());
        assert_eq!(dispatcher.tick_count(), 0);

        dispatcher.resume();
        dispatcher.tick(0.016);
        assert_eq!(log.borrow().len(), 1);

        dispatcher.clear();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.pending_count(), 0);
    }
}
