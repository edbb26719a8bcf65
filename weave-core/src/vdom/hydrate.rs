//! Hydration
//!
//! Hydration adopts an existing server-rendered node tree instead of
//! creating one. It runs in two passes:
//!
//! 1. **Verify** walks the backend tree and the vnode tree in lockstep
//!    without touching either. Any shape mismatch aborts with a
//!    description of the first difference.
//! 2. **Adopt** walks both again, binding every vnode to its node, fixing
//!    up text, creating children for empty elements and running component
//!    `init` hooks.
//!
//! Because nothing is mutated until verification succeeded, a failed
//! hydration leaves the server tree untouched and the caller falls back to
//! a full client-side render.
//!
//! Component vnodes (those with an `init` hook) and unresolved async
//! placeholders are accepted as-is by the verify pass; the component
//! hydrates its own subtree.

use super::node_ops::{NodeKind, NodeOps};
use super::patch::{InsertQueue, Node, Patcher, Ref};

impl<B: NodeOps + 'static> Patcher<B> {
    /// Hydrate `vnode` onto `elm`, reporting a mismatch as a diagnostic.
    pub(super) fn hydrate(&self, elm: &Node<B>, vnode: &Ref<B>, queue: &mut InsertQueue<B>) -> bool {
        match self.hydrate_root(elm, vnode, queue) {
            Ok(()) => true,
            Err(detail) => {
                self.report_hydration_bail(detail);
                false
            }
        }
    }

    /// Verify, then adopt. On `Err` nothing has been mutated.
    pub(super) fn hydrate_root(
        &self,
        elm: &Node<B>,
        vnode: &Ref<B>,
        queue: &mut InsertQueue<B>,
    ) -> Result<(), String> {
        self.verify(elm, vnode, false)?;
        tracing::debug!("hydrating server-rendered tree");
        self.adopt(elm, vnode, queue);
        Ok(())
    }

    /// Check that `elm` has the shape of `vnode` without mutating either.
    ///
    /// Returns a description of the first difference.
    fn verify(&self, elm: &Node<B>, vnode: &Ref<B>, in_pre: bool) -> Result<(), String> {
        let in_pre = in_pre || vnode.data().is_some_and(|d| d.pre);

        if vnode.is_comment() && vnode.async_factory().is_some() {
            return Ok(());
        }
        if vnode.data().is_some_and(|d| d.hook.init.is_some()) {
            return Ok(());
        }
        if !self.assert_node_match(elm, vnode, in_pre) {
            return Err(format!(
                "expected {}, found {}",
                describe_vnode(vnode),
                self.describe_node(elm)
            ));
        }

        let (Some(tag), Some(list)) = (vnode.tag(), vnode.children()) else {
            return Ok(());
        };
        // An empty element gets its children created during adoption.
        if self.ops.first_child(elm).is_none() {
            return Ok(());
        }
        if let Some(html) = vnode.data().and_then(|d| d.dom_props.inner_html.as_deref()) {
            if html != self.ops.inner_html(elm) {
                return Err(format!("server innerHTML of <{tag}> differs"));
            }
            return Ok(());
        }

        let mut node = self.ops.first_child(elm);
        for child in list.borrow().iter() {
            let Some(current) = node else {
                return Err(format!("<{tag}> has fewer child nodes than the virtual tree"));
            };
            self.verify(&current, child, in_pre)?;
            node = self.ops.next_sibling(&current);
        }
        if node.is_some() {
            return Err(format!("<{tag}> has more child nodes than the virtual tree"));
        }
        Ok(())
    }

    /// Bind `vnode` and its descendants to the verified server nodes.
    fn adopt(&self, elm: &Node<B>, vnode: &Ref<B>, queue: &mut InsertQueue<B>) {
        vnode.set_elm(Some(elm.clone()));

        if vnode.is_comment() && vnode.async_factory().is_some() {
            vnode.set_async_placeholder(true);
            return;
        }

        if let Some(data) = vnode.data() {
            if let Some(init) = &data.hook.init {
                init(vnode, true);
            }
            if vnode.component_instance().is_some() {
                self.init_component(vnode, queue);
                return;
            }
        }

        if vnode.tag().is_none() {
            let text = vnode.text_content().unwrap_or_default();
            if self.ops.text(elm) != text {
                self.ops.set_text_content(elm, text);
            }
            return;
        }

        if let Some(list) = vnode.children() {
            let raw_html = vnode
                .data()
                .is_some_and(|d| d.dom_props.inner_html.is_some());
            if self.ops.first_child(elm).is_none() {
                self.create_children(vnode, queue);
            } else if !raw_html {
                let children = list.borrow().clone();
                let mut node = self.ops.first_child(elm);
                for child in &children {
                    let Some(current) = node else {
                        break;
                    };
                    self.adopt(&current, child, queue);
                    node = self.ops.next_sibling(&current);
                }
            }
        }

        if vnode.data().is_some_and(|d| d.needs_create_hooks()) {
            self.invoke_create_hooks(vnode, queue);
        }
    }

    /// Whether `node` has the kind (and tag) `vnode` would create.
    fn assert_node_match(&self, node: &Node<B>, vnode: &Ref<B>, in_pre: bool) -> bool {
        let kind = self.ops.node_kind(node);
        match vnode.tag() {
            Some(tag) => {
                !self.is_unknown_element(vnode, in_pre)
                    && kind == NodeKind::Element
                    && tag.eq_ignore_ascii_case(&self.ops.tag_name(node))
            }
            None if vnode.is_comment() => kind == NodeKind::Comment,
            None => kind == NodeKind::Text,
        }
    }

    fn describe_node(&self, node: &Node<B>) -> String {
        match self.ops.node_kind(node) {
            NodeKind::Element => format!("<{}>", self.ops.tag_name(node).to_lowercase()),
            NodeKind::Text => format!("text {:?}", self.ops.text(node)),
            NodeKind::Comment => "comment".to_string(),
        }
    }
}

fn describe_vnode<N>(vnode: &super::vnode::VNode<N>) -> String {
    match vnode.tag() {
        Some(tag) => format!("<{tag}>"),
        None if vnode.is_comment() => "comment".to_string(),
        None => format!("text {:?}", vnode.text_content().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::vdom::memory::MemoryDom;
    use crate::vdom::vnode::VNode;

    use super::*;

    fn server_tree(dom: &MemoryDom) -> <MemoryDom as NodeOps>::Node {
        let div = dom.create_element("div");
        let span = dom.create_element("span");
        let text = dom.create_text_node("hello");
        dom.append_child(&span, &text);
        dom.append_child(&div, &span);
        div
    }

    #[test]
    fn verify_accepts_matching_tree() {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
        let root = server_tree(&dom);

        let vnode = VNode::element("DIV")
            .children(vec![VNode::element("span")
                .children(vec![VNode::text("hello")])
                .build()])
            .build();
        assert!(patcher.verify(&root, &vnode, false).is_ok());
    }

    #[test]
    fn verify_reports_first_difference() {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
        let root = server_tree(&dom);

        let vnode = VNode::element("div")
            .children(vec![VNode::element("p").build()])
            .build();
        let err = patcher.verify(&root, &vnode, false).unwrap_err();
        assert_eq!(err, "expected <p>, found <span>");

        let extra = VNode::element("div")
            .children(vec![
                VNode::element("span").children(vec![VNode::text("hello")]).build(),
                VNode::text("tail"),
            ])
            .build();
        let err = patcher.verify(&root, &extra, false).unwrap_err();
        assert!(err.contains("fewer child nodes"));
    }

    #[test]
    fn adopt_fixes_text_and_fills_empty_elements() {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
        let root = dom.create_element("div");
        let text = dom.create_text_node("stale");
        let list = dom.create_element("ul");
        dom.append_child(&root, &text);
        dom.append_child(&root, &list);

        let vnode = VNode::element("div")
            .children(vec![
                VNode::text("fresh"),
                VNode::element("ul")
                    .children(vec![VNode::element("li").build()])
                    .build(),
            ])
            .build();

        let mut queue = Vec::new();
        assert!(patcher.hydrate_root(&root, &vnode, &mut queue).is_ok());
        assert_eq!(dom.render(root), "<div>fresh<ul><li></li></ul></div>");
        assert_eq!(vnode.elm(), Some(root));
    }
}
