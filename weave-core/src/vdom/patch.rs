//! Patch Algorithm
//!
//! The [`Patcher`] turns a new vnode tree into backend mutations, reusing
//! whatever it can from the previous tree.
//!
//! # Algorithm
//!
//! 1. Two vnodes are *the same* when key, tag, comment-ness and presence of
//!    data agree (plus input-type compatibility for `<input>`). Same nodes
//!    are patched in place; anything else is replaced wholesale.
//!
//! 2. Patching a node updates its attributes through the installed modules
//!    and then reconciles its content: text replaces text, and two child
//!    lists go through `update_children`.
//!
//! 3. Child lists are diffed with four cursors, one at each end of the old
//!    and new list. Every iteration tries the four end-pair comparisons
//!    (start/start, end/end, start/end, end/start) and only falls back to a
//!    key lookup when none of them match. Common edits (append, prepend,
//!    removal, reversal, rotation) therefore cost a handful of moves at most.
//!
//! 4. Insert hooks are queued during the pass and fired once the whole tree
//!    is attached, so a hook always sees its node in the final document.
//!
//! Hydration (adopting server-rendered nodes) lives in `hydrate.rs`.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::config::{self, InsertionMode};
use crate::diagnostics::{self, Diagnostic};

use super::hooks::{Module, RemoveCallback};
use super::node_ops::{NodeKind, NodeOps};
use super::vnode::{clone_vnode, Children, NodeKey, VNode, VNodeData, VNodeRef};

/// Attribute marking a server-rendered root.
pub const SSR_ATTR: &str = "data-server-rendered";

pub(super) type Node<B> = <B as NodeOps>::Node;
pub(super) type Ref<B> = VNodeRef<Node<B>>;
pub(super) type InsertQueue<B> = Vec<Ref<B>>;

/// The previous state handed to [`Patcher::patch`].
#[derive(Debug)]
pub enum PatchTarget<N> {
    /// The vnode tree rendered last time.
    VNode(VNodeRef<N>),
    /// A raw backend node to mount onto (or hydrate).
    Element(N),
}

/// Reconciles vnode trees against one backend.
pub struct Patcher<B: NodeOps> {
    pub(super) ops: Rc<B>,
    modules: Vec<Box<dyn Module<B::Node>>>,
    empty: VNodeRef<B::Node>,
    creating_in_pre: Cell<usize>,
    hydration_bailed: Cell<bool>,
}

impl<B: NodeOps + 'static> Patcher<B> {
    /// Build a patcher from backend operations and modules.
    pub fn new(ops: Rc<B>, modules: Vec<Box<dyn Module<B::Node>>>) -> Self {
        let empty = VNode::element("")
            .data(VNodeData::new())
            .children(Vec::new())
            .build();
        Self {
            ops,
            modules,
            empty,
            creating_in_pre: Cell::new(0),
            hydration_bailed: Cell::new(false),
        }
    }

    /// Get the backend this patcher mutates.
    pub fn ops(&self) -> &Rc<B> {
        &self.ops
    }

    /// Patch `old` into `vnode` and return the new root element.
    ///
    /// - no `vnode`: destroy `old` and return `None`
    /// - no `old`: create a detached tree
    /// - `old` the same as `vnode`: patch in place
    /// - `old` a backend node: hydrate it when hydrating (or marked as
    ///   server-rendered), otherwise replace it
    /// - anything else: create the new tree next to the old one, then
    ///   remove the old one
    ///
    /// `remove_only` suppresses moves in child lists.
    pub fn patch(
        &self,
        old: Option<PatchTarget<Node<B>>>,
        vnode: Option<Ref<B>>,
        hydrating: bool,
        remove_only: bool,
    ) -> Option<Node<B>> {
        let Some(vnode) = vnode else {
            if let Some(PatchTarget::VNode(old)) = old {
                self.invoke_destroy_hook(&old);
            }
            return None;
        };

        let mut queue = Vec::new();
        let mut initial = false;

        match old {
            None => {
                tracing::debug!("patch: initial mount");
                initial = true;
                self.create_elm(&vnode, &mut queue, None, None, false, None);
            }
            Some(PatchTarget::VNode(old)) if same_vnode(&old, &vnode) => {
                self.patch_vnode(&old, &vnode, &mut queue, remove_only);
            }
            Some(target) => {
                let old_vnode = match target {
                    PatchTarget::VNode(old) => old,
                    PatchTarget::Element(elm) => {
                        let server_rendered = self.ops.node_kind(&elm) == NodeKind::Element
                            && self.ops.has_attribute(&elm, SSR_ATTR);
                        if hydrating || server_rendered {
                            match self.hydrate_root(&elm, &vnode, &mut queue) {
                                Ok(()) => {
                                    if server_rendered {
                                        self.ops.remove_attribute(&elm, SSR_ATTR);
                                    }
                                    self.invoke_insert_hook(&vnode, queue, true);
                                    return Some(elm);
                                }
                                Err(detail) => {
                                    self.report_hydration_bail(detail);
                                    queue.clear();
                                }
                            }
                        }
                        self.empty_node_at(elm)
                    }
                };
                self.replace(&old_vnode, &vnode, &mut queue);
            }
        }

        self.invoke_insert_hook(&vnode, queue, initial);
        vnode.elm()
    }

    /// Only the first bail of a patcher is reported as a diagnostic.
    pub(super) fn report_hydration_bail(&self, detail: String) {
        if self.hydration_bailed.replace(true) {
            tracing::debug!(%detail, "hydration bailed");
        } else {
            diagnostics::warn(Diagnostic::HydrationMismatch { detail });
        }
    }

    fn empty_node_at(&self, elm: Node<B>) -> Ref<B> {
        let tag = self.ops.tag_name(&elm).to_lowercase();
        VNode::element(&tag)
            .data(VNodeData::new())
            .children(Vec::new())
            .elm(elm)
            .build()
    }

    /// Mount `vnode` where `old` is, then tear `old` down.
    fn replace(&self, old: &Ref<B>, vnode: &Ref<B>, queue: &mut InsertQueue<B>) {
        let old_elm = old.elm();
        let parent_elm = old_elm.as_ref().and_then(|e| self.ops.parent_node(e));
        let reference = old_elm.as_ref().and_then(|e| self.ops.next_sibling(e));

        self.create_elm(vnode, queue, parent_elm.as_ref(), reference.as_ref(), false, None);

        // Component placeholders whose root this was now point at the new
        // element.
        let patchable = self.is_patchable(vnode);
        let mut ancestor = vnode.parent();
        while let Some(current) = ancestor {
            for module in &self.modules {
                module.destroy(&current);
            }
            current.set_elm(vnode.elm());
            if patchable {
                for module in &self.modules {
                    module.create(&self.empty, &current);
                }
            }
            ancestor = current.parent();
        }

        if parent_elm.is_some() {
            self.remove_vnodes(std::slice::from_ref(old));
        } else if old.tag().is_some() {
            self.invoke_destroy_hook(old);
        }
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Create the backend subtree for `vnode` and insert it.
    ///
    /// When `owner` names the list slot the vnode came from and the vnode
    /// was already rendered, a clone is mounted and written back into the
    /// slot instead. Returns the vnode actually mounted.
    pub(super) fn create_elm(
        &self,
        vnode: &Ref<B>,
        queue: &mut InsertQueue<B>,
        parent: Option<&Node<B>>,
        reference: Option<&Node<B>>,
        nested: bool,
        owner: Option<(&Children<Node<B>>, usize)>,
    ) -> Ref<B> {
        let vnode = match owner {
            Some((list, index)) if vnode.elm().is_some() => {
                let cloned = clone_vnode(vnode);
                list.borrow_mut()[index] = Rc::clone(&cloned);
                cloned
            }
            _ => Rc::clone(vnode),
        };

        vnode.set_root_insert(!nested);
        if self.create_component(&vnode, queue, parent, reference) {
            return vnode;
        }

        if let Some(tag) = vnode.tag() {
            let pre = vnode.data().is_some_and(|d| d.pre);
            if pre {
                self.creating_in_pre.set(self.creating_in_pre.get() + 1);
            }
            if self.is_unknown_element(&vnode, self.creating_in_pre.get() > 0) {
                diagnostics::warn(Diagnostic::UnknownElement {
                    tag: tag.to_string(),
                });
            }

            let elm = match vnode.ns() {
                Some(ns) => self.ops.create_element_ns(ns, tag),
                None => self.ops.create_element(tag),
            };
            vnode.set_elm(Some(elm.clone()));
            self.set_scope(&vnode);

            let parent_first = config::with(|c| c.insertion_mode) == InsertionMode::ParentFirst
                && !vnode.data().is_some_and(|d| d.append_as_tree);
            if parent_first {
                if vnode.data().is_some() {
                    self.invoke_create_hooks(&vnode, queue);
                }
                self.insert(parent, &elm, reference);
                self.create_children(&vnode, queue);
            } else {
                self.create_children(&vnode, queue);
                if vnode.data().is_some() {
                    self.invoke_create_hooks(&vnode, queue);
                }
                self.insert(parent, &elm, reference);
            }

            if pre {
                self.creating_in_pre.set(self.creating_in_pre.get() - 1);
            }
        } else {
            let text = vnode.text_content().unwrap_or_default();
            let elm = if vnode.is_comment() {
                self.ops.create_comment(text)
            } else {
                self.ops.create_text_node(text)
            };
            vnode.set_elm(Some(elm.clone()));
            self.insert(parent, &elm, reference);
        }

        vnode
    }

    fn create_component(
        &self,
        vnode: &Ref<B>,
        queue: &mut InsertQueue<B>,
        parent: Option<&Node<B>>,
        reference: Option<&Node<B>>,
    ) -> bool {
        let Some(data) = vnode.data() else {
            return false;
        };
        let reactivated = vnode.component_instance().is_some() && data.keep_alive;
        if let Some(init) = &data.hook.init {
            init(vnode, false);
        }

        // A component vnode now carries its instance and a mounted root.
        if vnode.component_instance().is_none() {
            return false;
        }
        self.init_component(vnode, queue);
        if let Some(elm) = vnode.elm() {
            self.insert(parent, &elm, reference);
        }
        if reactivated {
            self.reactivate_component(vnode, queue, parent, reference);
        }
        true
    }

    pub(super) fn init_component(&self, vnode: &Ref<B>, queue: &mut InsertQueue<B>) {
        if let Some(pending) = vnode.data().and_then(|d| d.take_pending_insert()) {
            queue.extend(pending);
        }
        vnode.set_elm(vnode.component_instance().and_then(|c| c.root_element()));
        if self.is_patchable(vnode) {
            self.invoke_create_hooks(vnode, queue);
            self.set_scope(vnode);
        } else {
            // Empty component root: only the insert hook is left to run.
            queue.push(Rc::clone(vnode));
        }
    }

    fn reactivate_component(
        &self,
        vnode: &Ref<B>,
        queue: &mut InsertQueue<B>,
        parent: Option<&Node<B>>,
        reference: Option<&Node<B>>,
    ) {
        // A re-activated inner root with a transition never sees its create
        // hooks, so give the modules an activate call instead.
        let mut inner = Rc::clone(vnode);
        while let Some(root) = inner.component_instance().and_then(|c| c.root_vnode()) {
            inner = root;
            if inner.data().is_some_and(|d| d.transition) {
                for module in &self.modules {
                    module.activate(&self.empty, &inner);
                }
                queue.push(Rc::clone(&inner));
                break;
            }
        }
        if let Some(elm) = vnode.elm() {
            self.insert(parent, &elm, reference);
        }
    }

    /// Insert before `reference`, or append when it is not a child of `parent`.
    fn insert(&self, parent: Option<&Node<B>>, elm: &Node<B>, reference: Option<&Node<B>>) {
        let Some(parent) = parent else {
            return;
        };
        match reference {
            Some(reference) if self.ops.parent_node(reference).as_ref() == Some(parent) => {
                self.ops.insert_before(parent, elm, Some(reference));
            }
            _ => self.ops.append_child(parent, elm),
        }
    }

    /// Create the child list, or the text child, of a freshly created element.
    pub(super) fn create_children(&self, vnode: &Ref<B>, queue: &mut InsertQueue<B>) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        if let Some(list) = vnode.children() {
            let snapshot = list.borrow().clone();
            self.check_duplicate_keys(&snapshot);
            for (index, child) in snapshot.iter().enumerate() {
                self.create_elm(child, queue, Some(&elm), None, true, Some((list, index)));
            }
        } else if let Some(text) = vnode.text_content() {
            let text_node = self.ops.create_text_node(text);
            self.ops.append_child(&elm, &text_node);
        }
    }

    /// Whether `vnode`, after unwrapping component roots, renders an element.
    pub(super) fn is_patchable(&self, vnode: &Ref<B>) -> bool {
        let mut current = Rc::clone(vnode);
        while let Some(instance) = current.component_instance() {
            match instance.root_vnode() {
                Some(root) => current = root,
                None => return false,
            }
        }
        current.tag().is_some()
    }

    pub(super) fn invoke_create_hooks(&self, vnode: &Ref<B>, queue: &mut InsertQueue<B>) {
        for module in &self.modules {
            module.create(&self.empty, vnode);
        }
        if let Some(data) = vnode.data() {
            if let Some(create) = &data.hook.create {
                create(&self.empty, vnode);
            }
            if data.hook.insert.is_some() {
                queue.push(Rc::clone(vnode));
            }
        }
    }

    /// Apply style scope ids: the functional scope if set, otherwise the
    /// scope of the vnode and of every component placeholder above it.
    fn set_scope(&self, vnode: &Ref<B>) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        if let Some(scope_id) = vnode.fn_scope_id() {
            self.ops.set_style_scope(&elm, scope_id);
            return;
        }
        let mut ancestor = Some(Rc::clone(vnode));
        while let Some(current) = ancestor {
            if let Some(scope_id) = current.scope_id() {
                self.ops.set_style_scope(&elm, scope_id);
            }
            ancestor = current.parent();
        }
    }

    pub(super) fn is_unknown_element(&self, vnode: &VNode<Node<B>>, in_pre: bool) -> bool {
        let Some(tag) = vnode.tag() else {
            return false;
        };
        !in_pre
            && vnode.ns().is_none()
            && !config::with(|c| c.is_ignored_element(tag))
            && self.ops.is_unknown_element(tag)
    }

    fn add_vnodes(
        &self,
        parent: &Node<B>,
        reference: Option<&Node<B>>,
        list: &Children<Node<B>>,
        range: std::ops::Range<usize>,
        queue: &mut InsertQueue<B>,
    ) {
        for index in range {
            let child = Rc::clone(&list.borrow()[index]);
            self.create_elm(&child, queue, Some(parent), reference, false, Some((list, index)));
        }
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    pub(super) fn invoke_destroy_hook(&self, vnode: &Ref<B>) {
        if let Some(data) = vnode.data() {
            if let Some(destroy) = &data.hook.destroy {
                destroy(vnode);
            }
            for module in &self.modules {
                module.destroy(vnode);
            }
        }
        for child in vnode.child_list() {
            self.invoke_destroy_hook(&child);
        }
    }

    fn remove_vnodes(&self, vnodes: &[Ref<B>]) {
        for vnode in vnodes {
            if vnode.tag().is_some() {
                self.remove_and_invoke_remove_hook(vnode, None);
                self.invoke_destroy_hook(vnode);
            } else if let Some(elm) = vnode.elm() {
                remove_node(&*self.ops, &elm);
            }
        }
    }

    fn remove_and_invoke_remove_hook(&self, vnode: &Ref<B>, rm: Option<&RemoveCallback>) {
        if rm.is_none() && vnode.data().is_none() {
            if let Some(elm) = vnode.elm() {
                remove_node(&*self.ops, &elm);
            }
            return;
        }

        let listeners = self.modules.len() + 1;
        let rm = match rm {
            Some(rm) => {
                rm.add_listeners(listeners);
                rm.clone()
            }
            None => {
                let ops = Rc::clone(&self.ops);
                let elm = vnode.elm();
                RemoveCallback::new(listeners, move || {
                    if let Some(elm) = elm {
                        remove_node(&*ops, &elm);
                    }
                })
            }
        };

        // The component's inner root shares the callback.
        if let Some(root) = vnode.component_instance().and_then(|c| c.root_vnode()) {
            if root.data().is_some() {
                self.remove_and_invoke_remove_hook(&root, Some(&rm));
            }
        }
        for module in &self.modules {
            module.remove(vnode, &rm);
        }
        match vnode.data().and_then(|d| d.hook.remove.clone()) {
            Some(hook) => hook(vnode, &rm),
            None => rm.release(),
        }
    }

    // ------------------------------------------------------------------------
    // Patching
    // ------------------------------------------------------------------------

    /// Reconcile two child lists under `parent`.
    pub(super) fn update_children(
        &self,
        parent: &Node<B>,
        old_list: &Children<Node<B>>,
        new_list: &Children<Node<B>>,
        queue: &mut InsertQueue<B>,
        remove_only: bool,
    ) {
        let mut old: Vec<Option<Ref<B>>> = old_list.borrow().iter().cloned().map(Some).collect();
        let mut new: Vec<Ref<B>> = new_list.borrow().clone();
        let can_move = !remove_only;

        tracing::trace!(old = old.len(), new = new.len(), "update children");
        self.check_duplicate_keys(&new);

        // Half-open cursors: [old_start, old_end) and [new_start, new_end).
        let (mut old_start, mut old_end) = (0, old.len());
        let (mut new_start, mut new_end) = (0, new.len());
        let mut old_key_to_idx: Option<HashMap<NodeKey, usize>> = None;

        while old_start < old_end && new_start < new_end {
            let Some(old_start_vnode) = old[old_start].clone() else {
                old_start += 1;
                continue;
            };
            let Some(old_end_vnode) = old[old_end - 1].clone() else {
                old_end -= 1;
                continue;
            };
            let new_start_vnode = Rc::clone(&new[new_start]);
            let new_end_vnode = Rc::clone(&new[new_end - 1]);

            if same_vnode(&old_start_vnode, &new_start_vnode) {
                self.patch_vnode(&old_start_vnode, &new_start_vnode, queue, remove_only);
                old_start += 1;
                new_start += 1;
            } else if same_vnode(&old_end_vnode, &new_end_vnode) {
                self.patch_vnode(&old_end_vnode, &new_end_vnode, queue, remove_only);
                old_end -= 1;
                new_end -= 1;
            } else if same_vnode(&old_start_vnode, &new_end_vnode) {
                // Moved right.
                self.patch_vnode(&old_start_vnode, &new_end_vnode, queue, remove_only);
                if can_move {
                    if let Some(elm) = old_start_vnode.elm() {
                        let after = old_end_vnode.elm().and_then(|e| self.ops.next_sibling(&e));
                        self.ops.insert_before(parent, &elm, after.as_ref());
                    }
                }
                old_start += 1;
                new_end -= 1;
            } else if same_vnode(&old_end_vnode, &new_start_vnode) {
                // Moved left.
                self.patch_vnode(&old_end_vnode, &new_start_vnode, queue, remove_only);
                if can_move {
                    if let Some(elm) = old_end_vnode.elm() {
                        self.ops.insert_before(parent, &elm, old_start_vnode.elm().as_ref());
                    }
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let key_map = old_key_to_idx
                    .get_or_insert_with(|| create_key_to_old_idx(&old, old_start..old_end));
                let idx_in_old = match new_start_vnode.key() {
                    Some(key) => key_map.get(key).copied(),
                    None => find_idx_in_old(&new_start_vnode, &old, old_start..old_end),
                };

                let reusable = idx_in_old.and_then(|idx| {
                    old[idx]
                        .clone()
                        .filter(|candidate| same_vnode(candidate, &new_start_vnode))
                        .map(|candidate| (idx, candidate))
                });
                match reusable {
                    Some((idx, to_move)) => {
                        self.patch_vnode(&to_move, &new_start_vnode, queue, remove_only);
                        old[idx] = None;
                        if can_move {
                            if let Some(elm) = to_move.elm() {
                                self.ops.insert_before(parent, &elm, old_start_vnode.elm().as_ref());
                            }
                        }
                    }
                    None => {
                        // New element, or same key on a different element.
                        new[new_start] = self.create_elm(
                            &new_start_vnode,
                            queue,
                            Some(parent),
                            old_start_vnode.elm().as_ref(),
                            false,
                            Some((new_list, new_start)),
                        );
                    }
                }
                new_start += 1;
            }
        }

        if old_start >= old_end {
            let reference = new.get(new_end).and_then(|v| v.elm());
            self.add_vnodes(parent, reference.as_ref(), new_list, new_start..new_end, queue);
        } else if new_start >= new_end {
            let leftover: Vec<Ref<B>> = old[old_start..old_end].iter().flatten().cloned().collect();
            self.remove_vnodes(&leftover);
        }
    }

    fn check_duplicate_keys(&self, children: &[Ref<B>]) {
        if config::with(|c| c.silent) {
            return;
        }
        let mut seen = HashSet::new();
        for child in children {
            if let Some(key) = child.key() {
                if !seen.insert(key) {
                    diagnostics::warn(Diagnostic::DuplicateKey {
                        key: key.to_string(),
                    });
                }
            }
        }
    }

    /// Patch `vnode` in place of the same-kind `old`.
    pub(super) fn patch_vnode(
        &self,
        old: &Ref<B>,
        vnode: &Ref<B>,
        queue: &mut InsertQueue<B>,
        remove_only: bool,
    ) {
        if Rc::ptr_eq(old, vnode) {
            return;
        }

        let elm = old.elm();
        vnode.set_elm(elm.clone());

        if old.is_async_placeholder() {
            let resolved = vnode.async_factory().is_some_and(|f| f.is_resolved());
            match (&elm, resolved) {
                (Some(elm), true) => {
                    self.hydrate(elm, vnode, queue);
                }
                _ => vnode.set_async_placeholder(true),
            }
            return;
        }

        // Hoisted static trees are reused as-is.
        if vnode.is_static()
            && old.is_static()
            && vnode.key() == old.key()
            && (vnode.is_cloned() || vnode.is_once())
        {
            vnode.set_component_instance(old.component_instance());
            return;
        }

        let data = vnode.data();
        if let Some(prepatch) = data.and_then(|d| d.hook.prepatch.as_ref()) {
            prepatch(old, vnode);
        }
        if let Some(data) = data {
            if self.is_patchable(vnode) {
                for module in &self.modules {
                    module.update(old, vnode);
                }
                if let Some(update) = &data.hook.update {
                    update(old, vnode);
                }
            }
        }

        if let Some(elm) = &elm {
            match vnode.text_content() {
                None => match (old.children(), vnode.children()) {
                    (Some(old_list), Some(new_list)) => {
                        if !Rc::ptr_eq(old_list, new_list) {
                            self.update_children(elm, old_list, new_list, queue, remove_only);
                        }
                    }
                    (None, Some(new_list)) => {
                        self.check_duplicate_keys(&new_list.borrow());
                        if old.text_content().is_some() {
                            self.ops.set_text_content(elm, "");
                        }
                        let len = new_list.borrow().len();
                        self.add_vnodes(elm, None, new_list, 0..len, queue);
                    }
                    (Some(old_list), None) => {
                        let old_children = old_list.borrow().clone();
                        self.remove_vnodes(&old_children);
                    }
                    (None, None) => {
                        if old.text_content().is_some() {
                            self.ops.set_text_content(elm, "");
                        }
                    }
                },
                Some(text) => {
                    if old.text_content() != Some(text) {
                        self.ops.set_text_content(elm, text);
                    }
                }
            }
        }

        if let Some(postpatch) = data.and_then(|d| d.hook.postpatch.as_ref()) {
            postpatch(old, vnode);
        }
    }

    /// Fire queued insert hooks, or park them on the component placeholder
    /// when this was the initial render of a nested root.
    pub(super) fn invoke_insert_hook(&self, vnode: &Ref<B>, queue: InsertQueue<B>, initial: bool) {
        if initial {
            if let Some(parent) = vnode.parent() {
                if let Some(data) = parent.data() {
                    data.set_pending_insert(queue);
                    return;
                }
            }
        }
        for queued in queue {
            if let Some(insert) = queued.data().and_then(|d| d.hook.insert.clone()) {
                insert(&queued);
            }
        }
    }
}

fn remove_node<B: NodeOps>(ops: &B, elm: &B::Node) {
    // The node may already be detached, e.g. by v-html on its parent.
    if let Some(parent) = ops.parent_node(elm) {
        ops.remove_child(&parent, elm);
    }
}

/// Whether `b` can be patched in place of `a`.
pub fn same_vnode<N>(a: &VNode<N>, b: &VNode<N>) -> bool {
    if a.key() != b.key() {
        return false;
    }
    let same_shape = a.tag() == b.tag()
        && a.is_comment() == b.is_comment()
        && a.data().is_some() == b.data().is_some()
        && !overrides_children(a)
        && !overrides_children(b)
        && same_input_type(a, b);
    if same_shape {
        return true;
    }
    // A resolved async component may replace its own placeholder.
    a.is_async_placeholder()
        && match (a.async_factory(), b.async_factory()) {
            (Some(fa), Some(fb)) => Rc::ptr_eq(fa, fb) && !fb.has_failed(),
            _ => false,
        }
}

fn overrides_children<N>(vnode: &VNode<N>) -> bool {
    vnode.data().is_some_and(|d| d.dom_props.overrides_children())
}

const TEXT_INPUT_TYPES: [&str; 7] = ["text", "number", "password", "search", "email", "tel", "url"];

fn is_text_input_type(ty: Option<&str>) -> bool {
    ty.is_some_and(|t| TEXT_INPUT_TYPES.contains(&t))
}

/// `<input>` elements only patch into each other when their `type`s are
/// equal or both text-like.
pub fn same_input_type<N>(a: &VNode<N>, b: &VNode<N>) -> bool {
    if a.tag() != Some("input") {
        return true;
    }
    fn ty<N>(v: &VNode<N>) -> Option<&str> {
        v.data().and_then(|d| d.attrs.get("type").map(String::as_str))
    }
    let (type_a, type_b) = (ty(a), ty(b));
    type_a == type_b || (is_text_input_type(type_a) && is_text_input_type(type_b))
}

fn create_key_to_old_idx<N>(
    old: &[Option<VNodeRef<N>>],
    range: std::ops::Range<usize>,
) -> HashMap<NodeKey, usize> {
    let mut map = HashMap::new();
    for index in range {
        if let Some(key) = old[index].as_ref().and_then(|v| v.key()) {
            map.insert(key.clone(), index);
        }
    }
    map
}

/// Linear scan for an unkeyed node that matches `node`.
fn find_idx_in_old<N>(
    node: &VNode<N>,
    old: &[Option<VNodeRef<N>>],
    range: std::ops::Range<usize>,
) -> Option<usize> {
    range
        .into_iter()
        .find(|&index| old[index].as_ref().is_some_and(|c| same_vnode(node, c)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::memory::{DomOp, MemoryDom};

    type V = VNode<u32>;

    fn input(ty: &str) -> VNodeRef<u32> {
        V::element("input")
            .data(VNodeData::new().attr("type", ty))
            .build()
    }

    #[test]
    fn same_vnode_compares_key_tag_and_data_presence() {
        let a = V::element("div").key("a").build();
        let b = V::element("div").key("a").build();
        let other_key = V::element("div").key("b").build();
        let other_tag = V::element("p").key("a").build();
        let with_data = V::element("div").key("a").data(VNodeData::new()).build();

        assert!(same_vnode(&a, &b));
        assert!(same_vnode(&b, &a));
        assert!(!same_vnode(&a, &other_key));
        assert!(!same_vnode(&a, &other_tag));
        assert!(!same_vnode(&a, &with_data));
        assert!(!same_vnode(&V::text("x"), &V::empty("x")));
    }

    #[test]
    fn raw_content_override_is_never_same() {
        let mut data = VNodeData::new();
        data.dom_props.inner_html = Some("<b>x</b>".into());
        let a = V::element("div").data(data).build();
        let b = V::element("div").data(VNodeData::new()).build();
        assert!(!same_vnode(&a, &b));
        assert!(!same_vnode(&b, &a));
    }

    #[test]
    fn text_like_inputs_are_interchangeable() {
        assert!(same_input_type(&input("text"), &input("email")));
        assert!(same_input_type(&input("checkbox"), &input("checkbox")));
        assert!(!same_input_type(&input("text"), &input("checkbox")));
        assert!(!same_vnode(&input("radio"), &input("text")));
    }

    #[test]
    fn untyped_inputs_compare_by_missing_type() {
        let bare = || V::element("input").data(VNodeData::new()).build();
        assert!(same_input_type(&bare(), &bare()));
        assert!(!same_input_type(&bare(), &input("checkbox")));
        assert!(same_input_type(&V::element("div").build(), &input("checkbox")));
    }

    #[test]
    fn async_placeholder_matches_its_resolved_component() {
        use crate::vdom::hooks::AsyncFactory;

        let factory = AsyncFactory::new();
        let placeholder = V::async_placeholder(Rc::clone(&factory), None);
        placeholder.set_async_placeholder(true);
        let resolved = V::element("async-comp")
            .data(VNodeData::new())
            .async_factory(Rc::clone(&factory))
            .build();
        assert!(same_vnode(&placeholder, &resolved));

        factory.fail();
        assert!(!same_vnode(&placeholder, &resolved));
    }

    #[test]
    fn key_table_keeps_last_index_per_key() {
        let old = vec![
            Some(V::element("li").key("a").build()),
            None,
            Some(V::element("li").key("b").build()),
            Some(V::element("li").build()),
        ];
        let map = create_key_to_old_idx(&old, 0..4);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&NodeKey::from("b")), Some(&2));
    }

    #[test]
    fn unkeyed_lookup_scans_range() {
        let old = vec![
            Some(V::element("li").build()),
            Some(V::element("p").build()),
        ];
        let needle = V::element("p").build();
        assert_eq!(find_idx_in_old(&needle, &old, 0..2), Some(1));
        assert_eq!(find_idx_in_old(&needle, &old, 0..1), None);
    }

    #[test]
    fn text_patch_sets_content_once() {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());

        let old = VNode::element("p").text("a").build();
        patcher.patch(None, Some(Rc::clone(&old)), false, false);
        dom.clear_ops();

        let new = VNode::element("p").text("b").build();
        patcher.patch(Some(PatchTarget::VNode(old)), Some(Rc::clone(&new)), false, false);

        let elm = new.elm().unwrap();
        assert_eq!(
            dom.ops(),
            vec![DomOp::SetText {
                node: elm,
                text: "b".into()
            }]
        );
    }

    #[test]
    fn text_to_children_clears_text_first() {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());

        let old = VNode::element("p").text("a").build();
        patcher.patch(None, Some(Rc::clone(&old)), false, false);

        let new = VNode::element("p")
            .children(vec![VNode::element("b").build()])
            .build();
        let root = patcher.patch(Some(PatchTarget::VNode(old)), Some(new), false, false);
        assert_eq!(dom.render(root.unwrap()), "<p><b></b></p>");
    }

    #[test]
    fn parent_first_insertion_attaches_before_children() {
        config::update(|c| c.insertion_mode = InsertionMode::ParentFirst);
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
        let container = dom.create_element("div");
        let mount = dom.create_element("span");
        dom.append_child(&container, &mount);
        dom.clear_ops();

        let tree = VNode::element("ul")
            .children(vec![VNode::element("li").build()])
            .build();
        patcher.patch(Some(PatchTarget::Element(mount)), Some(Rc::clone(&tree)), false, false);
        config::update(|c| c.insertion_mode = InsertionMode::ChildrenFirst);

        let ul = tree.elm().unwrap();
        let ops = dom.ops();
        let ul_inserted = ops
            .iter()
            .position(|op| matches!(op, DomOp::Insert { node, .. } if *node == ul))
            .unwrap();
        let li_inserted = ops
            .iter()
            .position(|op| matches!(op, DomOp::Insert { parent, .. } if *parent == ul))
            .unwrap();
        assert!(ul_inserted < li_inserted);
    }
}
