//! In-memory backend.
//!
//! [`MemoryDom`] is an arena-backed node tree implementing [`NodeOps`]. It
//! records every mutating call in an operation log, which makes it the
//! backend of choice for tests and benchmarks: assertions can count moves,
//! creations and removals exactly.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::node_ops::{NodeKind, NodeOps};

/// Handle to a node in a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemNode(usize);

/// A logged backend mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomOp {
    CreateElement { node: MemNode, tag: String },
    CreateText { node: MemNode, text: String },
    CreateComment { node: MemNode, text: String },
    /// `moved` is set when the node was attached somewhere before the call.
    Insert {
        parent: MemNode,
        node: MemNode,
        reference: Option<MemNode>,
        moved: bool,
    },
    Remove { parent: MemNode, node: MemNode },
    SetText { node: MemNode, text: String },
    SetStyleScope { node: MemNode, scope_id: String },
    RemoveAttribute { node: MemNode, name: String },
}

#[derive(Debug)]
struct NodeRecord {
    kind: NodeKind,
    tag: String,
    ns: Option<String>,
    text: String,
    attrs: IndexMap<String, String>,
    children: Vec<MemNode>,
    parent: Option<MemNode>,
}

impl NodeRecord {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            tag: String::new(),
            ns: None,
            text: String::new(),
            attrs: IndexMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// Arena-backed node tree with an operation log.
#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: RefCell<Vec<NodeRecord>>,
    log: RefCell<Vec<DomOp>>,
    known_tags: Option<HashSet<String>>,
}

impl MemoryDom {
    /// Create an empty document where every tag is known.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree that reports every tag outside `tags` as unknown.
    pub fn with_known_tags(tags: &[&str]) -> Self {
        Self {
            known_tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Self::default()
        }
    }

    fn alloc(&self, record: NodeRecord) -> MemNode {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(record);
        MemNode(nodes.len() - 1)
    }

    fn record(&self, op: DomOp) {
        self.log.borrow_mut().push(op);
    }

    fn detach(nodes: &mut [NodeRecord], node: MemNode) {
        if let Some(parent) = nodes[node.0].parent.take() {
            nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Everything logged so far.
    pub fn ops(&self) -> Vec<DomOp> {
        self.log.borrow().clone()
    }

    /// Forget the recorded operations.
    pub fn clear_ops(&self) {
        self.log.borrow_mut().clear();
    }

    /// Number of logged operations matching `pred`.
    pub fn count_ops(&self, pred: impl Fn(&DomOp) -> bool) -> usize {
        self.log.borrow().iter().filter(|op| pred(op)).count()
    }

    /// Inserts of nodes that were already attached.
    pub fn move_count(&self) -> usize {
        self.count_ops(|op| matches!(op, DomOp::Insert { moved: true, .. }))
    }

    /// Nodes created of any kind.
    pub fn create_count(&self) -> usize {
        self.count_ops(|op| {
            matches!(
                op,
                DomOp::CreateElement { .. } | DomOp::CreateText { .. } | DomOp::CreateComment { .. }
            )
        })
    }

    pub fn remove_count(&self) -> usize {
        self.count_ops(|op| matches!(op, DomOp::Remove { .. }))
    }

    /// Get the children of `node`, in order.
    pub fn children(&self, node: MemNode) -> Vec<MemNode> {
        self.nodes.borrow()[node.0].children.clone()
    }

    /// Get the namespace an element was created in.
    pub fn namespace(&self, node: MemNode) -> Option<String> {
        self.nodes.borrow()[node.0].ns.clone()
    }

    /// Get an attribute value.
    pub fn attribute(&self, node: MemNode, name: &str) -> Option<String> {
        self.nodes.borrow()[node.0].attrs.get(name).cloned()
    }

    /// Set an attribute without logging, e.g. to stage server markup.
    pub fn set_attribute(&self, node: MemNode, name: &str, value: &str) {
        self.nodes.borrow_mut()[node.0]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    /// Serialize a node and its subtree.
    pub fn render(&self, node: MemNode) -> String {
        let mut out = String::new();
        self.render_into(node, &mut out);
        out
    }

    fn render_into(&self, node: MemNode, out: &mut String) {
        let (kind, tag, text, attrs, children) = {
            let nodes = self.nodes.borrow();
            let record = &nodes[node.0];
            (
                record.kind,
                record.tag.clone(),
                record.text.clone(),
                record.attrs.clone(),
                record.children.clone(),
            )
        };
        match kind {
            NodeKind::Text => out.push_str(&text),
            NodeKind::Comment => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeKind::Element => {
                let _ = write!(out, "<{tag}");
                for (name, value) in &attrs {
                    if value.is_empty() {
                        let _ = write!(out, " {name}");
                    } else {
                        let _ = write!(out, " {name}=\"{value}\"");
                    }
                }
                out.push('>');
                for child in children {
                    self.render_into(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

impl NodeOps for MemoryDom {
    type Node = MemNode;

    fn create_element(&self, tag: &str) -> MemNode {
        let mut record = NodeRecord::new(NodeKind::Element);
        record.tag = tag.to_string();
        let node = self.alloc(record);
        self.record(DomOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_element_ns(&self, namespace: &str, tag: &str) -> MemNode {
        let node = self.create_element(tag);
        self.nodes.borrow_mut()[node.0].ns = Some(namespace.to_string());
        node
    }

    fn create_text_node(&self, text: &str) -> MemNode {
        let mut record = NodeRecord::new(NodeKind::Text);
        record.text = text.to_string();
        let node = self.alloc(record);
        self.record(DomOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> MemNode {
        let mut record = NodeRecord::new(NodeKind::Comment);
        record.text = text.to_string();
        let node = self.alloc(record);
        self.record(DomOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn insert_before(&self, parent: &MemNode, node: &MemNode, reference: Option<&MemNode>) {
        let moved = {
            let mut nodes = self.nodes.borrow_mut();
            let moved = nodes[node.0].parent.is_some();
            Self::detach(&mut nodes, *node);
            let siblings = &mut nodes[parent.0].children;
            let at = reference
                .and_then(|r| siblings.iter().position(|c| c == r))
                .unwrap_or(siblings.len());
            siblings.insert(at, *node);
            nodes[node.0].parent = Some(*parent);
            moved
        };
        self.record(DomOp::Insert {
            parent: *parent,
            node: *node,
            reference: reference.copied(),
            moved,
        });
    }

    fn append_child(&self, parent: &MemNode, node: &MemNode) {
        self.insert_before(parent, node, None);
    }

    fn remove_child(&self, parent: &MemNode, node: &MemNode) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes[node.0].parent != Some(*parent) {
                return;
            }
            Self::detach(&mut nodes, *node);
        }
        self.record(DomOp::Remove {
            parent: *parent,
            node: *node,
        });
    }

    fn parent_node(&self, node: &MemNode) -> Option<MemNode> {
        self.nodes.borrow()[node.0].parent
    }

    fn next_sibling(&self, node: &MemNode) -> Option<MemNode> {
        let nodes = self.nodes.borrow();
        let parent = nodes[node.0].parent?;
        let siblings = &nodes[parent.0].children;
        let at = siblings.iter().position(|c| c == node)?;
        siblings.get(at + 1).copied()
    }

    fn first_child(&self, node: &MemNode) -> Option<MemNode> {
        self.nodes.borrow()[node.0].children.first().copied()
    }

    fn tag_name(&self, node: &MemNode) -> String {
        self.nodes.borrow()[node.0].tag.clone()
    }

    fn node_kind(&self, node: &MemNode) -> NodeKind {
        self.nodes.borrow()[node.0].kind
    }

    fn text(&self, node: &MemNode) -> String {
        self.nodes.borrow()[node.0].text.clone()
    }

    fn set_text_content(&self, node: &MemNode, text: &str) {
        let kind = self.node_kind(node);
        match kind {
            NodeKind::Element => {
                let old_children = {
                    let mut nodes = self.nodes.borrow_mut();
                    std::mem::take(&mut nodes[node.0].children)
                };
                {
                    let mut nodes = self.nodes.borrow_mut();
                    for child in old_children {
                        nodes[child.0].parent = None;
                    }
                }
                if !text.is_empty() {
                    let mut record = NodeRecord::new(NodeKind::Text);
                    record.text = text.to_string();
                    record.parent = Some(*node);
                    let child = self.alloc(record);
                    self.nodes.borrow_mut()[node.0].children.push(child);
                }
            }
            NodeKind::Text | NodeKind::Comment => {
                self.nodes.borrow_mut()[node.0].text = text.to_string();
            }
        }
        self.record(DomOp::SetText {
            node: *node,
            text: text.to_string(),
        });
    }

    fn set_style_scope(&self, node: &MemNode, scope_id: &str) {
        self.nodes.borrow_mut()[node.0]
            .attrs
            .insert(scope_id.to_string(), String::new());
        self.record(DomOp::SetStyleScope {
            node: *node,
            scope_id: scope_id.to_string(),
        });
    }

    fn has_attribute(&self, node: &MemNode, name: &str) -> bool {
        self.nodes.borrow()[node.0].attrs.contains_key(name)
    }

    fn remove_attribute(&self, node: &MemNode, name: &str) {
        self.nodes.borrow_mut()[node.0].attrs.shift_remove(name);
        self.record(DomOp::RemoveAttribute {
            node: *node,
            name: name.to_string(),
        });
    }

    fn inner_html(&self, node: &MemNode) -> String {
        let mut out = String::new();
        for child in self.children(*node) {
            self.render_into(child, &mut out);
        }
        out
    }

    fn is_unknown_element(&self, tag: &str) -> bool {
        self.known_tags
            .as_ref()
            .is_some_and(|known| !known.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_moves_attached_nodes() {
        let dom = MemoryDom::new();
        let root = dom.create_element("ul");
        let a = dom.create_element("li");
        let b = dom.create_element("li");
        dom.append_child(&root, &a);
        dom.append_child(&root, &b);
        assert_eq!(dom.move_count(), 0);

        dom.insert_before(&root, &b, Some(&a));
        assert_eq!(dom.children(root), vec![b, a]);
        assert_eq!(dom.move_count(), 1);
        assert_eq!(dom.next_sibling(&b), Some(a));
        assert_eq!(dom.next_sibling(&a), None);
    }

    #[test]
    fn set_text_content_replaces_children() {
        let dom = MemoryDom::new();
        let p = dom.create_element("p");
        let span = dom.create_element("span");
        dom.append_child(&p, &span);

        dom.set_text_content(&p, "hello");
        assert_eq!(dom.render(p), "<p>hello</p>");
        assert_eq!(dom.parent_node(&span), None);

        dom.set_text_content(&p, "");
        assert_eq!(dom.render(p), "<p></p>");
    }

    #[test]
    fn render_serializes_attributes_and_comments() {
        let dom = MemoryDom::new();
        let div = dom.create_element("div");
        dom.set_attribute(div, "id", "app");
        dom.set_style_scope(&div, "data-v-1");
        let note = dom.create_comment("x");
        dom.append_child(&div, &note);

        assert_eq!(dom.render(div), "<div id=\"app\" data-v-1><!--x--></div>");
        assert_eq!(dom.inner_html(&div), "<!--x-->");
    }

    #[test]
    fn remove_child_ignores_foreign_nodes() {
        let dom = MemoryDom::new();
        let a = dom.create_element("div");
        let b = dom.create_element("div");
        let c = dom.create_text_node("c");
        dom.append_child(&a, &c);

        dom.remove_child(&b, &c);
        assert_eq!(dom.remove_count(), 0);
        dom.remove_child(&a, &c);
        assert_eq!(dom.remove_count(), 1);
        assert!(dom.children(a).is_empty());
    }

    #[test]
    fn namespaced_elements_and_attributes() {
        let dom = MemoryDom::new();
        let svg = dom.create_element_ns("http://www.w3.org/2000/svg", "svg");
        assert_eq!(dom.namespace(svg).as_deref(), Some("http://www.w3.org/2000/svg"));
        assert_eq!(dom.tag_name(&svg), "svg");

        dom.set_attribute(svg, "data-server-rendered", "true");
        assert!(dom.has_attribute(&svg, "data-server-rendered"));
        dom.remove_attribute(&svg, "data-server-rendered");
        assert_eq!(dom.attribute(svg, "data-server-rendered"), None);
        assert_eq!(dom.create_count(), 1);
    }

    #[test]
    fn known_tags_drive_unknown_element_check() {
        let dom = MemoryDom::with_known_tags(&["div"]);
        assert!(!dom.is_unknown_element("div"));
        assert!(dom.is_unknown_element("blink"));
        assert!(!MemoryDom::new().is_unknown_element("blink"));
    }
}
