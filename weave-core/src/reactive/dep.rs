//! Dependency Tracker
//!
//! A `Dep` is the subscriber registry of one reactive slot (a property
//! accessor) or of one Observer's structural changes. Reads register the
//! active computation with the Dep; writes notify every registered
//! subscriber.
//!
//! # Invariants
//!
//! - A subscriber appears at most once. Adding it again is a no-op.
//! - Notification order is insertion order.
//! - `notify` walks a snapshot, so subscribers may add or remove themselves
//!   (or others) while being notified.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId};

/// Counter for generating unique dep IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a Dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        Self(DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct DepInner {
    id: DepId,
    subs: RefCell<IndexMap<SubscriberId, Weak<dyn Subscriber>>>,
}

/// A subscriber registry.
///
/// `Dep` is a cheap handle; clones share the same registry.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subs: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the Dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Register a subscriber. Returns `false` if it was already registered.
    pub fn add_sub(&self, sub: &Rc<dyn Subscriber>) -> bool {
        let mut subs = self.inner.subs.borrow_mut();
        let id = sub.id();
        if let Some(existing) = subs.get(&id) {
            if existing.strong_count() > 0 {
                return false;
            }
        }
        subs.insert(id, Rc::downgrade(sub));
        true
    }

    /// Remove a subscriber, keeping the order of the others.
    pub fn remove_sub(&self, id: SubscriberId) {
        self.inner.subs.borrow_mut().shift_remove(&id);
    }

    /// Register the active computation, if any, as a subscriber.
    pub fn depend(&self) {
        if let Some(sub) = ReactiveContext::current() {
            self.add_sub(&sub);
            ReactiveContext::track_dependency(self);
        }
    }

    /// Notify every live subscriber, in insertion order.
    pub fn notify(&self) {
        let snapshot: SmallVec<[Rc<dyn Subscriber>; 4]> = {
            let mut subs = self.inner.subs.borrow_mut();
            subs.retain(|_, weak| weak.strong_count() > 0);
            subs.values().filter_map(Weak::upgrade).collect()
        };

        tracing::trace!(dep = self.inner.id.0, subscribers = snapshot.len(), "notify");

        for sub in snapshot {
            sub.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Check whether the given subscriber is registered.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner
            .subs
            .borrow()
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
