//! Reactive State
//!
//! This module implements the dependency-tracking half of Weave: plain
//! state values that record who reads them and notify those readers when
//! they change.
//!
//! # Concepts
//!
//! ## Values and aggregates
//!
//! State is a tree of [`Value`]s. Records ([`Object`]) and sequences
//! ([`Array`]) are aggregates: reference handles that may be shared between
//! several places in the tree.
//!
//! ## Observers
//!
//! [`observe`] wraps an aggregate in an [`Observer`]. Wrapping a record
//! replaces each property with a reactive slot; wrapping a sequence makes
//! its mutators report changes. Nested aggregates are wrapped as they are
//! reached.
//!
//! ## Deps and subscribers
//!
//! Every reactive slot owns a [`Dep`], and every Observer owns one more for
//! structural changes. Reading a slot while a computation is active (see
//! [`ReactiveContext`]) subscribes that computation; writing a different
//! value notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] is the stock computation: it runs a closure, tracks what
//! the closure read, and re-runs it on change.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. The active computation is a
//! thread-local stack, aggregates use `Rc` + `RefCell`, and Deps hold their
//! subscribers weakly so that dropping a computation is enough to stop it.

mod context;
mod dep;
mod observer;
mod subscriber;
mod value;
mod watcher;

pub use context::ReactiveContext;
pub use dep::{Dep, DepId};
pub use observer::{
    define_reactive, define_reactive_with, del, observe, observe_root, observer_of, property_dep,
    set, should_observe, toggle_observing, Observer, ReactiveOptions, ReactiveSlot,
};
pub use subscriber::{FnSubscriber, Subscriber, SubscriberId};
pub use value::{
    Accessor, AggregateId, Array, Getter, Key, Object, Setter, Value, WeakArray, WeakObject,
};
pub use watcher::Watcher;
