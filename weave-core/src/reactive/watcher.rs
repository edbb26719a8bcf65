//! Watcher Implementation
//!
//! A Watcher is a computation that re-runs whenever state it read changes.
//! Render computations, derived-state updaters and user callbacks are all
//! watchers.
//!
//! # How Watchers Work
//!
//! 1. Each run executes inside a [`ReactiveContext`], so every reactive slot
//!    read during the run registers the watcher with its Dep.
//!
//! 2. After the run, the watcher compares the Deps it just read with the
//!    previous set and unsubscribes from those it no longer reads.
//!
//! 3. When a Dep notifies, the watcher re-runs synchronously. Batching is
//!    the business of an outer scheduler.
//!
//! # Re-entrancy
//!
//! A watcher notified while it is already running does not recurse. It is
//! marked pending and the outer run loops once more. A watcher that keeps
//! re-triggering itself is stopped after `Config::max_update_count` passes
//! with an [`InfiniteUpdateLoop`](Diagnostic::InfiniteUpdateLoop)
//! diagnostic; a stable fixed point ends the loop on its own because writes
//! of an identical value do not notify.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::config;
use crate::diagnostics::{self, Diagnostic};

use super::context::ReactiveContext;
use super::dep::Dep;
use super::subscriber::{Subscriber, SubscriberId};

/// A computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let state = Value::from(json!({ "count": 0 }));
/// observe(&state);
///
/// let obj = state.as_object().unwrap().clone();
/// let watcher = Watcher::new(move || {
///     println!("count is {:?}", obj.get("count"));
/// });
///
/// state.as_object().unwrap().set("count", Value::from(5)); // prints again
/// ```
pub struct Watcher {
    id: SubscriberId,
    this: Weak<Watcher>,
    run: Box<dyn Fn()>,
    deps: RefCell<Vec<Dep>>,
    disposed: Cell<bool>,
    running: Cell<bool>,
    pending: Cell<bool>,
    run_count: Cell<usize>,
}

/// Clears a flag when dropped, including during unwinding.
struct FlagGuard<'a>(&'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Watcher {
    /// Create a watcher and run it immediately to collect dependencies.
    pub fn new<F>(run: F) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        let watcher = Self::new_lazy(run);
        watcher.execute();
        watcher
    }

    /// Create a watcher without running it.
    pub fn new_lazy<F>(run: F) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        Rc::new_cyclic(|this| Self {
            id: SubscriberId::new(),
            this: this.clone(),
            run: Box::new(run),
            deps: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            running: Cell::new(false),
            pending: Cell::new(false),
            run_count: Cell::new(0),
        })
    }

    /// Run the computation, collecting dependencies afresh.
    pub fn execute(&self) {
        if self.disposed.get() {
            return;
        }
        if self.running.get() {
            self.pending.set(true);
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        self.running.set(true);
        let _running = FlagGuard(&self.running);
        let max_passes = config::with(|c| c.max_update_count).max(1);
        let mut passes = 0;

        loop {
            self.pending.set(false);
            self.run_once(Rc::clone(&this));
            passes += 1;

            if !self.pending.get() || self.disposed.get() {
                break;
            }
            if passes >= max_passes {
                diagnostics::warn(Diagnostic::InfiniteUpdateLoop {
                    watcher: self.id.raw(),
                });
                break;
            }
        }
        self.pending.set(false);
    }

    fn run_once(&self, this: Rc<Watcher>) {
        let new_deps = {
            let _ctx = ReactiveContext::enter(this);
            (self.run)();
            ReactiveContext::collected()
        };

        let old_deps = self.deps.replace(new_deps);
        let current = self.deps.borrow();
        for dep in old_deps {
            if !current.contains(&dep) {
                dep.remove_sub(self.id);
            }
        }
        drop(current);

        self.run_count.set(self.run_count.get() + 1);
    }

    /// Stop the watcher and unsubscribe it from everything it read.
    pub fn teardown(&self) {
        self.disposed.set(true);
        for dep in self.deps.take() {
            dep.remove_sub(self.id);
        }
    }

    /// Check if the watcher has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Get the number of times the computation has run.
    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    /// Get the number of Deps read by the last run.
    pub fn dependency_count(&self) -> usize {
        self.deps.borrow().len()
    }
}

impl Subscriber for Watcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        self.execute();
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().drain(..) {
            dep.remove_sub(self.id);
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
