//! Dependency collection target
//!
//! At most one computation collects dependencies at a time: the one whose
//! frame is on top of a thread-local stack. Reading an observed slot asks
//! its [`Dep`] to register that computation.
//!
//! Frames are pushed by [`ReactiveContext::enter`] and popped when the
//! returned guard drops, so a panicking render still leaves the stack
//! balanced. A frame without a subscriber is an untracked scope: reads
//! inside it register nothing, even when an outer computation is running.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::dep::Dep;
use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static TARGETS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct Frame {
    target: Option<Rc<dyn Subscriber>>,
    /// Deduplicated, in first-read order.
    seen: SmallVec<[Dep; 8]>,
}

fn with_top<R>(f: impl FnOnce(Option<&mut Frame>) -> R) -> R {
    TARGETS.with(|targets| f(targets.borrow_mut().last_mut()))
}

/// Scope guard for one collection frame.
pub struct ReactiveContext {
    owner: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Make `subscriber` the collection target until the guard drops.
    pub fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let owner = Some(subscriber.id());
        Self::push_frame(Some(subscriber));
        Self { owner }
    }

    /// Open a scope in which reads register nothing.
    pub fn untracked() -> Self {
        Self::push_frame(None);
        Self { owner: None }
    }

    /// Run `f` inside an untracked scope.
    pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
        let _scope = Self::untracked();
        f()
    }

    fn push_frame(target: Option<Rc<dyn Subscriber>>) {
        TARGETS.with(|targets| {
            targets.borrow_mut().push(Frame {
                target,
                seen: SmallVec::new(),
            })
        });
    }

    /// Whether reads right now would register anybody.
    pub fn is_active() -> bool {
        with_top(|frame| frame.is_some_and(|f| f.target.is_some()))
    }

    /// The computation reads are currently attributed to.
    pub fn current() -> Option<Rc<dyn Subscriber>> {
        with_top(|frame| frame.and_then(|f| f.target.clone()))
    }

    pub fn current_subscriber() -> Option<SubscriberId> {
        with_top(|frame| frame.and_then(|f| f.target.as_ref().map(|t| t.id())))
    }

    /// Note that the current target read `dep`. Repeated reads are ignored.
    pub fn track_dependency(dep: &Dep) {
        with_top(|frame| {
            let Some(frame) = frame else { return };
            if frame.target.is_some() && !frame.seen.contains(dep) {
                frame.seen.push(dep.clone());
            }
        });
    }

    /// Deps read so far in the innermost frame.
    pub fn collected() -> Vec<Dep> {
        with_top(|frame| frame.map(|f| f.seen.to_vec()).unwrap_or_default())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The target Rc must drop outside the RefCell borrow.
        let frame = TARGETS.with(|targets| targets.borrow_mut().pop());
        if let Some(frame) = frame {
            debug_assert_eq!(
                frame.target.as_ref().map(|t| t.id()),
                self.owner,
                "collection frames popped out of order"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::FnSubscriber;

    fn noop() -> Rc<dyn Subscriber> {
        Rc::new(FnSubscriber::new(|| {}))
    }

    #[test]
    fn guard_restores_empty_stack() {
        let sub = noop();
        let id = sub.id();
        assert_eq!(ReactiveContext::current_subscriber(), None);

        {
            let _frame = ReactiveContext::enter(sub);
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current().is_none());
    }

    #[test]
    fn repeated_reads_are_collected_once() {
        let _frame = ReactiveContext::enter(noop());
        let first = Dep::new();
        let second = Dep::new();

        for dep in [&first, &second, &first, &second, &first] {
            ReactiveContext::track_dependency(dep);
        }

        assert_eq!(ReactiveContext::collected(), vec![first, second]);
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let outer = noop();
        let inner = noop();
        let (outer_id, inner_id) = (outer.id(), inner.id());

        let _outer = ReactiveContext::enter(outer);
        {
            let _inner = ReactiveContext::enter(inner);
            assert_eq!(ReactiveContext::current_subscriber(), Some(inner_id));
        }
        assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));
    }

    #[test]
    fn untracked_scope_hides_outer_computation() {
        let _frame = ReactiveContext::enter(noop());
        let dep = Dep::new();

        ReactiveContext::untrack(|| {
            assert!(!ReactiveContext::is_active());
            dep.depend();
        });

        assert!(ReactiveContext::is_active());
        assert!(ReactiveContext::collected().is_empty());
        assert_eq!(dep.subscriber_count(), 0);
    }
}
