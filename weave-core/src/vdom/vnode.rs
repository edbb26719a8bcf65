//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the presentation tree. A render pass
//! produces a fresh tree of them; the reconciler compares it with the
//! previous tree and records on each new vnode the backend node it ended up
//! with (`elm`), so the next pass can diff against it.
//!
//! VNodes are shared as [`VNodeRef`]s. Everything a render function sets is
//! immutable; only the fields the reconciler fills in (`elm`, `parent`, the
//! component instance, placeholder and root-insert flags) use interior
//! mutability.
//!
//! A vnode that has already been rendered must not be mounted a second time
//! as-is, or two positions would share one `elm`. The reconciler clones such
//! vnodes with [`clone_vnode`] before mounting them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::hooks::{AsyncFactory, ComponentInstance, VNodeHooks};

/// Shared handle to a vnode.
pub type VNodeRef<N> = Rc<VNode<N>>;

/// A list of child vnodes.
///
/// The list is shared so that "same list" is a pointer comparison, and
/// mutable so the reconciler can swap in clones of reused children.
pub type Children<N> = Rc<RefCell<Vec<VNodeRef<N>>>>;

/// Sibling-unique identity supplied by the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Str(Rc<str>),
    Int(i64),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Str(s) => f.write_str(s),
            NodeKey::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for NodeKey {
    fn from(s: &str) -> Self {
        NodeKey::Str(Rc::from(s))
    }
}

impl From<String> for NodeKey {
    fn from(s: String) -> Self {
        NodeKey::Str(Rc::from(s))
    }
}

impl From<i64> for NodeKey {
    fn from(i: i64) -> Self {
        NodeKey::Int(i)
    }
}

impl From<i32> for NodeKey {
    fn from(i: i32) -> Self {
        NodeKey::Int(i64::from(i))
    }
}

impl From<usize> for NodeKey {
    fn from(i: usize) -> Self {
        NodeKey::Int(i as i64)
    }
}

/// Raw-content overrides. When either is set the element's children are
/// owned by the backend, not by the diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomProps {
    pub inner_html: Option<String>,
    pub text_content: Option<String>,
}

impl DomProps {
    /// Whether a non-empty override is present.
    pub fn overrides_children(&self) -> bool {
        self.inner_html.as_deref().is_some_and(|s| !s.is_empty())
            || self.text_content.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn is_set(&self) -> bool {
        self.inner_html.is_some() || self.text_content.is_some()
    }
}

/// The data payload of a vnode.
///
/// Only the fields below are inspected by the reconciler; backend modules
/// can carry anything else in `extra`.
pub struct VNodeData<N> {
    /// Per-vnode lifecycle hooks.
    pub hook: VNodeHooks<N>,
    /// Rendered attributes. `type` decides input compatibility.
    pub attrs: IndexMap<String, String>,
    pub dom_props: DomProps,
    /// Subtree is rendered verbatim; unknown tags inside are not reported.
    pub pre: bool,
    /// Component is cached and re-activated instead of re-created.
    pub keep_alive: bool,
    /// Node is the root of a transition.
    pub transition: bool,
    /// Under parent-first insertion, build this subtree before attaching it.
    pub append_as_tree: bool,
    /// Opaque pass-through for backend modules.
    pub extra: IndexMap<String, serde_json::Value>,
    pending_insert: RefCell<Option<Vec<VNodeRef<N>>>>,
}

impl<N> Default for VNodeData<N> {
    fn default() -> Self {
        Self {
            hook: VNodeHooks::default(),
            attrs: IndexMap::new(),
            dom_props: DomProps::default(),
            pre: false,
            keep_alive: false,
            transition: false,
            append_as_tree: false,
            extra: IndexMap::new(),
            pending_insert: RefCell::new(None),
        }
    }
}

impl<N> VNodeData<N> {
    /// Create an empty data payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, builder style.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Replace the hook set, builder style.
    pub fn hooks(mut self, hook: VNodeHooks<N>) -> Self {
        self.hook = hook;
        self
    }

    /// Whether hydration has to run create hooks for this payload, i.e. it
    /// carries anything beyond attributes the server already rendered.
    pub(crate) fn needs_create_hooks(&self) -> bool {
        !self.hook.is_empty() || !self.extra.is_empty() || self.dom_props.is_set() || self.transition
    }

    /// Park insert hooks of a nested root until its placeholder is attached.
    pub(crate) fn set_pending_insert(&self, queue: Vec<VNodeRef<N>>) {
        *self.pending_insert.borrow_mut() = Some(queue);
    }

    pub(crate) fn take_pending_insert(&self) -> Option<Vec<VNodeRef<N>>> {
        self.pending_insert.borrow_mut().take()
    }
}

/// One node of a virtual tree.
pub struct VNode<N> {
    tag: Option<String>,
    key: Option<NodeKey>,
    data: Option<Rc<VNodeData<N>>>,
    children: Option<Children<N>>,
    text: Option<String>,
    ns: Option<String>,
    scope_id: Option<String>,
    fn_scope_id: Option<String>,
    async_factory: Option<Rc<AsyncFactory>>,
    is_comment: bool,
    is_static: bool,
    is_cloned: bool,
    is_once: bool,

    elm: RefCell<Option<N>>,
    parent: RefCell<Weak<VNode<N>>>,
    component_instance: RefCell<Option<Rc<dyn ComponentInstance<N>>>>,
    is_async_placeholder: Cell<bool>,
    is_root_insert: Cell<bool>,
}

impl<N> VNode<N> {
    fn blank() -> Self {
        Self {
            tag: None,
            key: None,
            data: None,
            children: None,
            text: None,
            ns: None,
            scope_id: None,
            fn_scope_id: None,
            async_factory: None,
            is_comment: false,
            is_static: false,
            is_cloned: false,
            is_once: false,
            elm: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            component_instance: RefCell::new(None),
            is_async_placeholder: Cell::new(false),
            is_root_insert: Cell::new(true),
        }
    }

    /// Start building an element vnode.
    pub fn element(tag: &str) -> VNodeBuilder<N> {
        let mut node = Self::blank();
        node.tag = Some(tag.to_string());
        VNodeBuilder { node }
    }

    /// A text vnode.
    pub fn text(text: impl Into<String>) -> VNodeRef<N> {
        let mut node = Self::blank();
        node.text = Some(text.into());
        Rc::new(node)
    }

    /// An empty (comment) vnode.
    pub fn empty(text: impl Into<String>) -> VNodeRef<N> {
        let mut node = Self::blank();
        node.text = Some(text.into());
        node.is_comment = true;
        Rc::new(node)
    }

    /// The placeholder rendered while an async component is unresolved.
    pub fn async_placeholder(factory: Rc<AsyncFactory>, key: Option<NodeKey>) -> VNodeRef<N> {
        let mut node = Self::blank();
        node.text = Some(String::new());
        node.is_comment = true;
        node.key = key;
        node.async_factory = Some(factory);
        Rc::new(node)
    }

    /// Get the element tag. `None` for text and comments.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Get the reconciliation key.
    pub fn key(&self) -> Option<&NodeKey> {
        self.key.as_ref()
    }

    /// Get the data payload.
    pub fn data(&self) -> Option<&VNodeData<N>> {
        self.data.as_deref()
    }

    /// Get the shared child list.
    pub fn children(&self) -> Option<&Children<N>> {
        self.children.as_ref()
    }

    /// Snapshot of the child list.
    pub fn child_list(&self) -> Vec<VNodeRef<N>> {
        self.children
            .as_ref()
            .map(|list| list.borrow().clone())
            .unwrap_or_default()
    }

    /// Get the text of a text or comment vnode.
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Get the element namespace.
    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn fn_scope_id(&self) -> Option<&str> {
        self.fn_scope_id.as_deref()
    }

    /// Get the async component factory this placeholder waits on.
    pub fn async_factory(&self) -> Option<&Rc<AsyncFactory>> {
        self.async_factory.as_ref()
    }

    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    /// Whether the subtree was marked static and can be skipped.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether this vnode was made by [`clone_vnode`].
    pub fn is_cloned(&self) -> bool {
        self.is_cloned
    }

    pub fn is_once(&self) -> bool {
        self.is_once
    }

    /// Whether this vnode stands in for an unresolved async component.
    pub fn is_async_placeholder(&self) -> bool {
        self.is_async_placeholder.get()
    }

    pub(crate) fn set_async_placeholder(&self, value: bool) {
        self.is_async_placeholder.set(value);
    }

    /// Whether the vnode was mounted as the root of an insertion.
    pub fn is_root_insert(&self) -> bool {
        self.is_root_insert.get()
    }

    pub(crate) fn set_root_insert(&self, value: bool) {
        self.is_root_insert.set(value);
    }

    /// The live backend node, once rendered.
    pub fn elm(&self) -> Option<N>
    where
        N: Clone,
    {
        self.elm.borrow().clone()
    }

    /// Bind (or unbind) the backend node.
    pub fn set_elm(&self, elm: Option<N>) {
        *self.elm.borrow_mut() = elm;
    }

    /// The component placeholder whose root this vnode is.
    pub fn parent(&self) -> Option<VNodeRef<N>> {
        self.parent.borrow().upgrade()
    }

    /// Set the component placeholder this vnode is the root of.
    pub fn set_parent(&self, parent: &VNodeRef<N>) {
        *self.parent.borrow_mut() = Rc::downgrade(parent);
    }

    /// Get the component instance attached by the `init` hook.
    pub fn component_instance(&self) -> Option<Rc<dyn ComponentInstance<N>>> {
        self.component_instance.borrow().clone()
    }

    /// Attach the component instance created by an `init` hook.
    pub fn set_component_instance(&self, instance: Option<Rc<dyn ComponentInstance<N>>>) {
        *self.component_instance.borrow_mut() = instance;
    }
}

impl<N: fmt::Debug> fmt::Debug for VNode<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("text", &self.text)
            .field("children", &self.children.as_ref().map(|c| c.borrow().len()))
            .field("is_comment", &self.is_comment)
            .field("elm", &*self.elm.borrow())
            .finish()
    }
}

/// Shallow copy of a vnode, flagged as cloned.
///
/// The copy shares the data payload and child list and starts with the
/// same `elm`. The component instance and parent link are not copied.
pub fn clone_vnode<N: Clone>(vnode: &VNode<N>) -> VNodeRef<N> {
    Rc::new(VNode {
        tag: vnode.tag.clone(),
        key: vnode.key.clone(),
        data: vnode.data.clone(),
        children: vnode.children.clone(),
        text: vnode.text.clone(),
        ns: vnode.ns.clone(),
        scope_id: vnode.scope_id.clone(),
        fn_scope_id: vnode.fn_scope_id.clone(),
        async_factory: vnode.async_factory.clone(),
        is_comment: vnode.is_comment,
        is_static: vnode.is_static,
        is_cloned: true,
        is_once: false,
        elm: RefCell::new(vnode.elm()),
        parent: RefCell::new(Weak::new()),
        component_instance: RefCell::new(None),
        is_async_placeholder: Cell::new(false),
        is_root_insert: Cell::new(true),
    })
}

/// Builder for element vnodes.
pub struct VNodeBuilder<N> {
    node: VNode<N>,
}

impl<N> VNodeBuilder<N> {
    /// Set the reconciliation key.
    pub fn key(mut self, key: impl Into<NodeKey>) -> Self {
        self.node.key = Some(key.into());
        self
    }

    pub fn data(mut self, data: VNodeData<N>) -> Self {
        self.node.data = Some(Rc::new(data));
        self
    }

    /// Use a fresh child list.
    pub fn children(mut self, children: Vec<VNodeRef<N>>) -> Self {
        self.node.children = Some(Rc::new(RefCell::new(children)));
        self
    }

    /// Reuse an existing child list (the reconciler skips identical lists).
    pub fn shared_children(mut self, children: Children<N>) -> Self {
        self.node.children = Some(children);
        self
    }

    /// Text content of the element itself, used when it has no children.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.node.text = Some(text.into());
        self
    }

    /// Set the element namespace.
    pub fn ns(mut self, ns: &str) -> Self {
        self.node.ns = Some(ns.to_string());
        self
    }

    /// Style scope of the component that rendered this vnode.
    pub fn scope_id(mut self, scope_id: &str) -> Self {
        self.node.scope_id = Some(scope_id.to_string());
        self
    }

    /// Style scope of a functional component; takes precedence.
    pub fn fn_scope_id(mut self, scope_id: &str) -> Self {
        self.node.fn_scope_id = Some(scope_id.to_string());
        self
    }

    pub fn async_factory(mut self, factory: Rc<AsyncFactory>) -> Self {
        self.node.async_factory = Some(factory);
        self
    }

    /// Mark as a hoisted static subtree.
    pub fn static_node(mut self) -> Self {
        self.node.is_static = true;
        self
    }

    /// Mark as render-once.
    pub fn once(mut self) -> Self {
        self.node.is_once = true;
        self
    }

    /// Start out bound to an existing backend node.
    pub fn elm(self, elm: N) -> Self {
        *self.node.elm.borrow_mut() = Some(elm);
        self
    }

    /// Finish the vnode.
    pub fn build(self) -> VNodeRef<N> {
        Rc::new(self.node)
    }
}
