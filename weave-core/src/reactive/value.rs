//! Dynamic State Values
//!
//! Application state is a tree of [`Value`]s. Scalars are stored inline;
//! aggregates (records and sequences) are reference handles, so two values
//! can name the same aggregate exactly as they would in a managed-memory
//! runtime. That aliasing is what the dependency tracker has to get right.
//!
//! # Records
//!
//! An [`Object`] keeps its properties in insertion order. A property is one
//! of:
//!
//! - plain data,
//! - a custom accessor (optional getter, optional setter),
//! - a reactive slot installed by `define_reactive`.
//!
//! Each property carries a `configurable` flag. A non-configurable property
//! is never intercepted or deleted.
//!
//! # Sequences
//!
//! An [`Array`] is a wrapper whose mutating operations (`push`, `pop`,
//! `shift`, `unshift`, `splice`, `sort_by`, `reverse`, `set_index`) are the
//! interception points. On an observed array each mutation observes the
//! elements it introduced and then notifies the array's Observer. Reads are
//! not intercepted.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::diagnostics::{self, Diagnostic};

use super::observer::{self, ReactiveSlot};

/// Counter for generating unique aggregate IDs.
static AGGREGATE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of an aggregate, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateId(u64);

impl AggregateId {
    fn next() -> Self {
        Self(AGGREGATE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Custom getter of an accessor property.
pub type Getter = Rc<dyn Fn() -> Value>;

/// Custom setter of an accessor property.
pub type Setter = Rc<dyn Fn(Value)>;

/// A dynamically typed state value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    /// A host value the reactivity engine never wraps (vnodes, component
    /// instances, backend handles).
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Strict identity: scalars by value, aggregates by reference.
    ///
    /// Two NaNs are considered the same, so writing NaN over NaN is a no-op.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Records and sequences are aggregates; everything else is not.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Get the record handle, if this is a record.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the sequence handle, if this is a sequence.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get the number, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Identity of the aggregate this value names, if any.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        match self {
            Value::Object(obj) => Some(obj.id()),
            Value::Array(arr) => Some(arr.id()),
            _ => None,
        }
    }

    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Object(_) => "[object]".to_string(),
            Value::Array(_) => "[array]".to_string(),
            Value::Opaque(_) => "[opaque]".to_string(),
        }
    }

    /// Snapshot the value as JSON.
    ///
    /// Every slot is read through its accessor, so calling this inside a
    /// computation subscribes it to the whole tree. Cyclic structures are
    /// not supported. Opaque values and `undefined` become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Opaque(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => {
                let mut map = serde_json::Map::new();
                for key in obj.keys() {
                    map.insert(key.clone(), obj.get(&key).to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Array(arr) => {
                serde_json::Value::Array(arr.to_vec().iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Object(obj) => obj.fmt(f),
            Value::Array(arr) => arr.fmt(f),
            Value::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Array> for Value {
    fn from(arr: Array) -> Self {
        Value::Array(arr)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Object::from_pairs(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

/// Largest valid sequence index. Sequence lengths are bounded by
/// `u32::MAX`.
pub const MAX_INDEX: usize = (u32::MAX - 1) as usize;

/// Key used by the out-of-band `set` / `del` helpers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    /// The key as a valid sequence index, if it is one.
    ///
    /// Names count when they spell a non-negative integer (`"3"`). Anything
    /// above [`MAX_INDEX`] is not an index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => (*i <= MAX_INDEX).then_some(*i),
            Key::Name(name) => {
                let n: f64 = name.trim().parse().ok()?;
                (n >= 0.0 && n.floor() == n && n <= MAX_INDEX as f64).then_some(n as usize)
            }
        }
    }

    /// The key as a record property name.
    pub fn to_name(&self) -> String {
        match self {
            Key::Index(i) => i.to_string(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

/// A custom accessor pair. Either half may be absent.
#[derive(Clone, Default)]
pub struct Accessor {
    pub get: Option<Getter>,
    pub set: Option<Setter>,
}

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor(Accessor),
    Reactive(Rc<ReactiveSlot>),
}

/// One property of a record.
#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) slot: Slot,
    pub(crate) configurable: bool,
}

impl Property {
    pub(crate) fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            configurable: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Object
// ----------------------------------------------------------------------------

pub(crate) struct ObjectInner {
    id: AggregateId,
    props: RefCell<IndexMap<String, Property>>,
    extensible: Cell<bool>,
    instance: bool,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        observer::forget(self.id);
    }
}

/// A record aggregate.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// Get the record back if it is still alive.
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

impl Object {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::with_flag(false)
    }

    /// Create an empty record flagged as a component instance.
    ///
    /// Instances are never wrapped by `observe`, and `set` / `del` refuse to
    /// add or remove their properties.
    pub fn instance() -> Self {
        Self::with_flag(true)
    }

    fn with_flag(instance: bool) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: AggregateId::next(),
                props: RefCell::new(IndexMap::new()),
                extensible: Cell::new(true),
                instance,
            }),
        }
    }

    /// Build a record from key/value pairs, in order.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        {
            let mut props = obj.inner.props.borrow_mut();
            for (key, value) in pairs {
                props.insert(key.into(), Property::data(value));
            }
        }
        obj
    }

    pub fn id(&self) -> AggregateId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether this record is a component instance.
    pub fn is_instance(&self) -> bool {
        self.inner.instance
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Forbid adding new properties.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    /// Forbid adding properties and make every existing one non-configurable.
    pub fn freeze(&self) {
        self.prevent_extensions();
        for prop in self.inner.props.borrow_mut().values_mut() {
            prop.configurable = false;
        }
    }

    /// Read a property. Missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        // Clone the slot out so getters can touch this object again.
        let slot = match self.inner.props.borrow().get(key) {
            Some(prop) => prop.slot.clone(),
            None => return Value::Undefined,
        };

        match slot {
            Slot::Data(value) => value,
            Slot::Accessor(Accessor { get: Some(get), .. }) => get(),
            Slot::Accessor(_) => Value::Undefined,
            Slot::Reactive(reactive) => reactive.get(),
        }
    }

    /// Assign a property.
    ///
    /// Goes through the property's setter when it has one. Assigning a
    /// missing key adds a plain property, unless the record is not
    /// extensible, in which case the write is ignored.
    pub fn set(&self, key: &str, value: Value) {
        let slot = self.inner.props.borrow().get(key).map(|prop| prop.slot.clone());

        match slot {
            Some(Slot::Data(_)) => {
                if let Some(prop) = self.inner.props.borrow_mut().get_mut(key) {
                    prop.slot = Slot::Data(value);
                }
            }
            Some(Slot::Accessor(Accessor { set: Some(set), .. })) => set(value),
            Some(Slot::Accessor(_)) => {}
            Some(Slot::Reactive(reactive)) => reactive.set(value),
            None => {
                if self.is_extensible() {
                    self.inner
                        .props
                        .borrow_mut()
                        .insert(key.to_string(), Property::data(value));
                }
            }
        }
    }

    /// Define a plain data property, replacing whatever was there.
    pub fn define_property(&self, key: &str, value: Value, configurable: bool) {
        self.put(key, Property {
            slot: Slot::Data(value),
            configurable,
        });
    }

    /// Define a custom accessor property, replacing whatever was there.
    pub fn define_accessor(&self, key: &str, accessor: Accessor, configurable: bool) {
        self.put(key, Property {
            slot: Slot::Accessor(accessor),
            configurable,
        });
    }

    /// Remove a property. Non-configurable properties are kept.
    ///
    /// Returns whether a property was removed.
    pub fn remove(&self, key: &str) -> bool {
        let removable = self
            .inner
            .props
            .borrow()
            .get(key)
            .is_some_and(|prop| prop.configurable);
        if removable {
            // Drop the removed property after the borrow ends.
            let removed = self.inner.props.borrow_mut().shift_remove(key);
            drop(removed);
        }
        removable
    }

    /// Whether `key` is an own property.
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether a property is backed by a reactive slot.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(
            self.inner.props.borrow().get(key).map(|p| &p.slot),
            Some(Slot::Reactive(_))
        )
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.inner.props.borrow().get(key).cloned()
    }

    pub(crate) fn put(&self, key: &str, prop: Property) {
        // Keep the replaced property alive until the borrow ends.
        let replaced = self.inner.props.borrow_mut().insert(key.to_string(), prop);
        drop(replaced);
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Array
// ----------------------------------------------------------------------------

pub(crate) struct ArrayInner {
    id: AggregateId,
    items: RefCell<Vec<Value>>,
    extensible: Cell<bool>,
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        observer::forget(self.id);
    }
}

/// A sequence aggregate.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

/// Non-owning handle to an [`Array`].
#[derive(Clone)]
pub struct WeakArray {
    inner: Weak<ArrayInner>,
}

impl WeakArray {
    /// Get the sequence back if it is still alive.
    pub fn upgrade(&self) -> Option<Array> {
        self.inner.upgrade().map(|inner| Array { inner })
    }
}

impl Array {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create a sequence owning `items`.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                id: AggregateId::next(),
                items: RefCell::new(items),
                extensible: Cell::new(true),
            }),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakArray {
        WeakArray {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Exclude the sequence from observation.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `undefined` past the end. Not tracked.
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the elements. Not tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append an element. Returns the new length.
    pub fn push(&self, value: Value) -> usize {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.push(value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove the last element.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.items.borrow_mut().pop();
        self.mutated(&[]);
        popped
    }

    /// Remove the first element.
    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.inner.items.borrow_mut();
            (!items.is_empty()).then(|| items.remove(0))
        };
        self.mutated(&[]);
        shifted
    }

    /// Prepend an element. Returns the new length.
    pub fn unshift(&self, value: Value) -> usize {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.insert(0, value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// `start` is clamped to the length. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let removed: Vec<Value> = {
            let mut current = self.inner.items.borrow_mut();
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            current.splice(start..end, items.iter().cloned()).collect()
        };
        self.mutated(&items);
        removed
    }

    /// Sort in place with a comparator.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        self.inner.items.borrow_mut().sort_by(compare);
        self.mutated(&[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.inner.items.borrow_mut().reverse();
        self.mutated(&[]);
    }

    /// Replace the element at `index`, growing with `undefined` if needed.
    ///
    /// An index above [`MAX_INDEX`] is diagnosed and ignored.
    pub fn set_index(&self, index: usize, value: Value) {
        if index > MAX_INDEX {
            diagnostics::warn(Diagnostic::InvalidIndex {
                key: index.to_string(),
            });
            return;
        }
        {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value.clone();
        }
        self.mutated(&[value]);
    }

    /// Grow to at least `len` elements without notifying.
    ///
    /// Callers pass a length already checked against [`MAX_INDEX`].
    pub(crate) fn grow_to(&self, len: usize) {
        let mut items = self.inner.items.borrow_mut();
        if items.len() < len {
            items.resize(len, Value::Undefined);
        }
    }

    fn mutated(&self, inserted: &[Value]) {
        observer::array_mutated(self, inserted);
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}
