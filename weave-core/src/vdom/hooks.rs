//! Lifecycle Hooks and Modules
//!
//! Two kinds of callbacks observe reconciliation:
//!
//! - **Per-vnode hooks** ([`VNodeHooks`]) live in a vnode's data payload and
//!   only fire for that vnode. Component vnodes use `init` to create their
//!   instance.
//! - **Modules** ([`Module`]) are installed once on the patcher and see
//!   every vnode. Backends use them to sync attributes, classes, styles and
//!   event listeners.
//!
//! Removal is cooperative. Each module and the vnode's own `remove` hook
//! receive a [`RemoveCallback`]; the backend node is detached only after all
//! of them have released it. A module that animates a leave transition
//! simply releases later.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::vnode::VNodeRef;

/// `init(vnode, hydrating)`.
pub type InitHook<N> = Rc<dyn Fn(&VNodeRef<N>, bool)>;
/// `(old, vnode)` hooks.
pub type PairHook<N> = Rc<dyn Fn(&VNodeRef<N>, &VNodeRef<N>)>;
/// Single-vnode hooks.
pub type NodeHook<N> = Rc<dyn Fn(&VNodeRef<N>)>;
/// `remove(vnode, rm)`.
pub type RemoveHook<N> = Rc<dyn Fn(&VNodeRef<N>, &RemoveCallback)>;

/// Hooks attached to a single vnode.
pub struct VNodeHooks<N> {
    pub init: Option<InitHook<N>>,
    pub prepatch: Option<PairHook<N>>,
    pub create: Option<PairHook<N>>,
    pub insert: Option<NodeHook<N>>,
    pub update: Option<PairHook<N>>,
    pub postpatch: Option<PairHook<N>>,
    pub remove: Option<RemoveHook<N>>,
    pub destroy: Option<NodeHook<N>>,
}

impl<N> Default for VNodeHooks<N> {
    fn default() -> Self {
        Self {
            init: None,
            prepatch: None,
            create: None,
            insert: None,
            update: None,
            postpatch: None,
            remove: None,
            destroy: None,
        }
    }
}

impl<N> VNodeHooks<N> {
    pub fn is_empty(&self) -> bool {
        self.init.is_none()
            && self.prepatch.is_none()
            && self.create.is_none()
            && self.insert.is_none()
            && self.update.is_none()
            && self.postpatch.is_none()
            && self.remove.is_none()
            && self.destroy.is_none()
    }
}

/// A backend extension notified for every vnode.
///
/// All methods default to no-ops; `remove` defaults to releasing at once.
pub trait Module<N> {
    /// An element was created for `vnode`. `empty` is the shared empty vnode.
    fn create(&self, _empty: &VNodeRef<N>, _vnode: &VNodeRef<N>) {}

    /// A kept-alive component root inside a transition was re-activated.
    fn activate(&self, _empty: &VNodeRef<N>, _vnode: &VNodeRef<N>) {}

    fn update(&self, _old: &VNodeRef<N>, _vnode: &VNodeRef<N>) {}

    fn remove(&self, _vnode: &VNodeRef<N>, rm: &RemoveCallback) {
        rm.release();
    }

    fn destroy(&self, _vnode: &VNodeRef<N>) {}
}

struct RemoveState {
    listeners: Cell<usize>,
    on_done: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// Counted release for a pending node removal.
///
/// The node is detached when the listener count reaches zero. Releasing
/// after that is a no-op.
#[derive(Clone)]
pub struct RemoveCallback {
    inner: Rc<RemoveState>,
}

impl RemoveCallback {
    pub(crate) fn new<F>(listeners: usize, on_done: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            inner: Rc::new(RemoveState {
                listeners: Cell::new(listeners),
                on_done: RefCell::new(Some(Box::new(on_done))),
            }),
        }
    }

    /// Extend a callback shared with a component's inner root.
    pub(crate) fn add_listeners(&self, count: usize) {
        self.inner.listeners.set(self.inner.listeners.get() + count);
    }

    /// Release one listener.
    pub fn release(&self) {
        let remaining = self.inner.listeners.get();
        if remaining == 0 {
            return;
        }
        self.inner.listeners.set(remaining - 1);
        if remaining == 1 {
            let done = self.inner.on_done.borrow_mut().take();
            if let Some(done) = done {
                done();
            }
        }
    }

    /// Listeners that still have to release.
    pub fn pending(&self) -> usize {
        self.inner.listeners.get()
    }
}

impl fmt::Debug for RemoveCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveCallback")
            .field("pending", &self.pending())
            .finish()
    }
}

/// A mounted component, as seen by the reconciler.
pub trait ComponentInstance<N> {
    /// The backend node of the component's root.
    fn root_element(&self) -> Option<N>;

    /// The vnode the component last rendered as its root.
    fn root_vnode(&self) -> Option<VNodeRef<N>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsyncState {
    Pending,
    Resolved,
    Failed,
}

/// Resolution state of an async component definition.
///
/// Identity is the `Rc` pointer: the placeholder and the resolved component
/// vnode refer to the same factory.
#[derive(Debug)]
pub struct AsyncFactory {
    state: Cell<AsyncState>,
}

impl AsyncFactory {
    /// Create a pending factory.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: Cell::new(AsyncState::Pending),
        })
    }

    /// Mark the component as loaded.
    pub fn resolve(&self) {
        self.state.set(AsyncState::Resolved);
    }

    /// Mark the load as failed.
    pub fn fail(&self) {
        self.state.set(AsyncState::Failed);
    }

    pub fn is_resolved(&self) -> bool {
        self.state.get() == AsyncState::Resolved
    }

    pub fn has_failed(&self) -> bool {
        self.state.get() == AsyncState::Failed
    }
}
