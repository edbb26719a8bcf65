//! Things that can be told a dependency changed.
//!
//! [`Watcher`](super::Watcher) is the main implementor; [`FnSubscriber`]
//! wraps a bare callback for schedulers and tests.

use std::cell::Cell;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Identity of a subscriber within its thread.
///
/// Deps key their subscriber lists by this, which is what makes repeated
/// reads of one slot register a computation only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate the next id. Ids are increasing, so they also record
    /// creation order.
    pub fn new() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            Self(id)
        })
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation notified when something it read has changed.
///
/// Deps only keep weak references; the creator owns the subscriber.
pub trait Subscriber {
    fn id(&self) -> SubscriberId;

    /// One of the subscriber's dependencies changed.
    fn update(&self);
}

pub struct FnSubscriber {
    id: SubscriberId,
    on_update: Box<dyn Fn()>,
}

impl FnSubscriber {
    pub fn new(on_update: impl Fn() + 'static) -> Self {
        Self {
            id: SubscriberId::new(),
            on_update: Box::new(on_update),
        }
    }
}

impl Subscriber for FnSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        (self.on_update)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn ids_increase_in_creation_order() {
        let ids: Vec<_> = (0..4).map(|_| SubscriberId::new()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn update_runs_callback() {
        let hits = Rc::new(Cell::new(0));
        let sub = FnSubscriber::new({
            let hits = Rc::clone(&hits);
            move || hits.set(hits.get() + 1)
        });

        sub.update();
        sub.update();
        assert_eq!(hits.get(), 2);
    }
}
