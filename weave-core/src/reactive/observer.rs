//! Observers and Reactive Properties
//!
//! An [`Observer`] wraps one aggregate and turns its members into tracked
//! state:
//!
//! - on a record, every present property is replaced with a reactive slot
//!   (see [`define_reactive`]);
//! - on a sequence, every element is observed in turn, and the sequence's
//!   mutators start notifying the Observer's Dep.
//!
//! The Observer's own Dep carries structural changes: keys added or removed
//! through [`set`] / [`del`], and any sequence mutation.
//!
//! # Identity
//!
//! The aggregate-to-Observer relation lives in a thread-local side-table
//! keyed by [`AggregateId`]. An aggregate removes its entry when it is
//! dropped, and the Observer only holds a weak handle back, so the table
//! never keeps state alive. Looking up the table is what makes `observe`
//! idempotent.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::config;
use crate::diagnostics::{self, Diagnostic};

use super::context::ReactiveContext;
use super::dep::Dep;
use super::value::{
    AggregateId, Array, Getter, Key, Object, Property, Setter, Slot, Value, WeakArray, WeakObject,
};

thread_local! {
    static OBSERVERS: RefCell<HashMap<AggregateId, Rc<Observer>>> = RefCell::new(HashMap::new());
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable wrapping of new aggregates on this thread.
///
/// Already-observed aggregates keep working either way.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

/// Whether new aggregates are currently wrapped.
pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

fn lookup(id: AggregateId) -> Option<Rc<Observer>> {
    OBSERVERS.with(|table| table.borrow().get(&id).cloned())
}

/// Drop the side-table entry of a dead aggregate.
pub(crate) fn forget(id: AggregateId) {
    let removed = OBSERVERS
        .try_with(|table| table.try_borrow_mut().ok().and_then(|mut t| t.remove(&id)))
        .ok()
        .flatten();
    drop(removed);
}

enum Wrapped {
    Object(WeakObject),
    Array(WeakArray),
}

/// The wrapper attached to an observed aggregate.
pub struct Observer {
    value: Wrapped,
    dep: Dep,
    vm_count: Cell<usize>,
}

impl Observer {
    fn attach(value: &Value) -> Option<Rc<Self>> {
        let (id, wrapped) = match value {
            Value::Object(obj) => (obj.id(), Wrapped::Object(obj.downgrade())),
            Value::Array(arr) => (arr.id(), Wrapped::Array(arr.downgrade())),
            _ => return None,
        };

        let ob = Rc::new(Self {
            value: wrapped,
            dep: Dep::new(),
            vm_count: Cell::new(0),
        });

        // Register before walking so cycles find this Observer.
        OBSERVERS.with(|table| table.borrow_mut().insert(id, Rc::clone(&ob)));

        match value {
            Value::Object(obj) => Self::walk(obj),
            Value::Array(arr) => Self::observe_array(&arr.to_vec()),
            _ => {}
        }

        tracing::trace!(aggregate = id.raw(), "observed");
        Some(ob)
    }

    /// Install a reactive slot on every present property.
    fn walk(obj: &Object) {
        for key in obj.keys() {
            define_reactive(obj, &key, None);
        }
    }

    fn observe_array(items: &[Value]) {
        for item in items {
            observe(item);
        }
    }

    /// The wrapped aggregate, while it is alive.
    pub fn value(&self) -> Option<Value> {
        match &self.value {
            Wrapped::Object(weak) => weak.upgrade().map(Value::Object),
            Wrapped::Array(weak) => weak.upgrade().map(Value::Array),
        }
    }

    /// Dep notified on structural changes.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// How many reactive roots use this aggregate as their top-level state.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("vm_count", &self.vm_count.get())
            .finish()
    }
}

/// The Observer already attached to `value`, without creating one.
pub fn observer_of(value: &Value) -> Option<Rc<Observer>> {
    value.aggregate_id().and_then(lookup)
}

/// Wrap `value` in an Observer, or return the one it already has.
///
/// Returns `None` for non-aggregates, for aggregates that are not
/// extensible or are component instances, and whenever observation is
/// disabled or the runtime is rendering on the server.
pub fn observe(value: &Value) -> Option<Rc<Observer>> {
    observe_with(value, false)
}

/// Like [`observe`], but also counts `value` as a reactive root's state.
pub fn observe_root(value: &Value) -> Option<Rc<Observer>> {
    observe_with(value, true)
}

fn observe_with(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let (id, extensible, instance) = match value {
        Value::Object(obj) => (obj.id(), obj.is_extensible(), obj.is_instance()),
        Value::Array(arr) => (arr.id(), arr.is_extensible(), false),
        _ => return None,
    };

    let ob = match lookup(id) {
        Some(ob) => Some(ob),
        None if should_observe()
            && !config::with(|c| c.server_rendering)
            && extensible
            && !instance =>
        {
            Observer::attach(value)
        }
        None => None,
    };

    if as_root {
        if let Some(ob) = &ob {
            ob.vm_count.set(ob.vm_count.get() + 1);
        }
    }
    ob
}

// ----------------------------------------------------------------------------
// Reactive slots
// ----------------------------------------------------------------------------

/// Options for [`define_reactive_with`].
#[derive(Clone, Default)]
pub struct ReactiveOptions {
    /// Do not observe the slot's value.
    pub shallow: bool,

    /// Called before every effective write in debug builds. Used for
    /// developer warnings such as mutating a prop from a child.
    pub custom_setter: Option<Rc<dyn Fn()>>,
}

/// The state behind one reactive property.
pub struct ReactiveSlot {
    dep: Dep,
    getter: Option<Getter>,
    setter: Option<Setter>,
    value: RefCell<Value>,
    child_ob: RefCell<Option<Rc<Observer>>>,
    shallow: bool,
    custom_setter: Option<Rc<dyn Fn()>>,
}

impl ReactiveSlot {
    fn current(&self) -> Value {
        match &self.getter {
            Some(get) => get(),
            None => self.value.borrow().clone(),
        }
    }

    /// Read the slot, registering the active computation.
    pub(crate) fn get(&self) -> Value {
        let value = self.current();

        if ReactiveContext::is_active() {
            self.dep.depend();
            let child = self.child_ob.borrow().clone();
            if let Some(child) = child {
                child.dep.depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }

        value
    }

    /// Write the slot and notify subscribers if the value changed.
    pub(crate) fn set(&self, new_value: Value) {
        let current = self.current();
        if new_value.same_value(&current) {
            return;
        }

        if cfg!(debug_assertions) {
            if let Some(custom_setter) = &self.custom_setter {
                custom_setter();
            }
        }

        // Accessor without a setter: the write is ignored.
        if self.getter.is_some() && self.setter.is_none() {
            return;
        }

        match &self.setter {
            Some(set) => set(new_value.clone()),
            None => {
                let old = self.value.replace(new_value.clone());
                drop(old);
            }
        }

        let child = if self.shallow { None } else { observe(&new_value) };
        *self.child_ob.borrow_mut() = child;

        self.dep.notify();
    }

    /// The slot's Dep.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }
}

/// Collect dependencies on every observed element of a sequence.
///
/// Element access cannot be intercepted, so reading a property that holds
/// a sequence subscribes to each element's structural Dep as well.
/// Each nested sequence is visited once, so cycles terminate.
fn depend_array(arr: &Array) {
    let mut seen = SmallVec::<[AggregateId; 8]>::new();
    depend_array_inner(arr, &mut seen);
}

fn depend_array_inner(arr: &Array, seen: &mut SmallVec<[AggregateId; 8]>) {
    if seen.contains(&arr.id()) {
        return;
    }
    seen.push(arr.id());
    for item in arr.to_vec() {
        if let Some(ob) = observer_of(&item) {
            ob.dep.depend();
        }
        if let Value::Array(inner) = &item {
            depend_array_inner(inner, seen);
        }
    }
}

/// Make `obj[key]` reactive.
///
/// With `value` absent the current property value is used. See
/// [`define_reactive_with`].
pub fn define_reactive(obj: &Object, key: &str, value: Option<Value>) {
    define_reactive_with(obj, key, value, ReactiveOptions::default());
}

/// Make `obj[key]` reactive.
///
/// A non-configurable property is left untouched. A pre-existing custom
/// accessor (or an already reactive slot) is kept and delegated to.
pub fn define_reactive_with(obj: &Object, key: &str, value: Option<Value>, options: ReactiveOptions) {
    let existing = obj.property(key);
    match &existing {
        Some(prop) if !prop.configurable => return,
        None if !obj.is_extensible() => return,
        _ => {}
    }

    let (getter, setter): (Option<Getter>, Option<Setter>) = match existing.map(|p| p.slot) {
        Some(Slot::Accessor(accessor)) => (accessor.get, accessor.set),
        Some(Slot::Reactive(slot)) => {
            let read = Rc::clone(&slot);
            let write = slot;
            (
                Some(Rc::new(move || read.get())),
                Some(Rc::new(move |v| write.set(v))),
            )
        }
        _ => (None, None),
    };

    let initial = match value {
        Some(value) => value,
        None if getter.is_none() || setter.is_some() => obj.get(key),
        None => Value::Undefined,
    };

    let child_ob = if options.shallow { None } else { observe(&initial) };

    let slot = ReactiveSlot {
        dep: Dep::new(),
        getter,
        setter,
        value: RefCell::new(initial),
        child_ob: RefCell::new(child_ob),
        shallow: options.shallow,
        custom_setter: options.custom_setter,
    };

    obj.put(key, Property {
        slot: Slot::Reactive(Rc::new(slot)),
        configurable: true,
    });
}

/// Dep of the reactive slot behind `obj[key]`, if the property is reactive.
pub fn property_dep(obj: &Object, key: &str) -> Option<Dep> {
    match obj.property(key).map(|p| p.slot) {
        Some(Slot::Reactive(slot)) => Some(slot.dep().clone()),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Out-of-band structural mutation
// ----------------------------------------------------------------------------

/// Set a key on an aggregate, making it reactive if it is new.
///
/// - Sequences with a valid index grow as needed and the element is
///   replaced through `splice`, which notifies.
/// - Existing record keys are assigned through their accessor.
/// - New keys on observed records get a reactive slot and the record's
///   structural Dep is notified; unobserved records get a plain property.
///
/// Returns `value`. Misuse is diagnosed and degrades to a no-op.
pub fn set(target: &Value, key: impl Into<Key>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.as_index() {
            Some(index) => {
                arr.grow_to(index);
                arr.splice(index, 1, vec![value.clone()]);
            }
            None => diagnostics::warn(Diagnostic::InvalidIndex { key: key.to_name() }),
        },
        Value::Object(obj) => {
            let name = key.to_name();
            if obj.has_own(&name) {
                obj.set(&name, value.clone());
                return value;
            }

            let ob = lookup(obj.id());
            if obj.is_instance() || ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                diagnostics::warn(Diagnostic::RootPropertyAdded { key: name });
                return value;
            }

            match ob {
                None => obj.set(&name, value.clone()),
                Some(ob) => {
                    define_reactive(obj, &name, Some(value.clone()));
                    ob.dep.notify();
                }
            }
        }
        other => diagnostics::warn(Diagnostic::SetOnPrimitive {
            target: other.describe(),
        }),
    }
    value
}

/// Delete a key from an aggregate and notify if it was observed.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.as_index() {
            Some(index) => {
                arr.splice(index, 1, Vec::new());
            }
            None => diagnostics::warn(Diagnostic::InvalidIndex { key: key.to_name() }),
        },
        Value::Object(obj) => {
            let name = key.to_name();
            let ob = lookup(obj.id());
            if obj.is_instance() || ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                diagnostics::warn(Diagnostic::RootPropertyDeleted { key: name });
                return;
            }

            if !obj.has_own(&name) || !obj.remove(&name) {
                return;
            }

            if let Some(ob) = ob {
                ob.dep.notify();
            }
        }
        other => diagnostics::warn(Diagnostic::DeleteOnPrimitive {
            target: other.describe(),
        }),
    }
}

/// Hook run by every sequence mutator.
pub(crate) fn array_mutated(arr: &Array, inserted: &[Value]) {
    if let Some(ob) = lookup(arr.id()) {
        for item in inserted {
            observe(item);
        }
        ob.dep.notify();
    }
}
