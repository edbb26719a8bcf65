//! Backend node operations.
//!
//! The reconciler never touches a concrete node tree. Everything it needs
//! goes through [`NodeOps`], so the same diff drives a browser DOM, a native
//! view hierarchy, or the in-memory tree in [`memory`](super::memory).

use std::fmt;

/// What a backend node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

/// Primitive operations on a backend node tree.
///
/// Insertion follows DOM semantics: inserting a node that is already
/// attached moves it.
pub trait NodeOps {
    /// Handle to a backend node. Equality is node identity.
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    fn create_element(&self, tag: &str) -> Self::Node;
    fn create_element_ns(&self, namespace: &str, tag: &str) -> Self::Node;
    fn create_text_node(&self, text: &str) -> Self::Node;
    fn create_comment(&self, text: &str) -> Self::Node;

    /// Insert `node` into `parent` before `reference`, or at the end when
    /// `reference` is `None`.
    fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);
    fn append_child(&self, parent: &Self::Node, node: &Self::Node);
    fn remove_child(&self, parent: &Self::Node, node: &Self::Node);

    fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
    fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;

    fn tag_name(&self, node: &Self::Node) -> String;
    fn node_kind(&self, node: &Self::Node) -> NodeKind;

    /// Character data of a text or comment node.
    fn text(&self, node: &Self::Node) -> String;

    /// Replace the content of a node with plain text.
    fn set_text_content(&self, node: &Self::Node, text: &str);

    /// Mark a node with a style-scope attribute.
    fn set_style_scope(&self, node: &Self::Node, scope_id: &str);

    fn has_attribute(&self, node: &Self::Node, name: &str) -> bool;
    fn remove_attribute(&self, node: &Self::Node, name: &str);

    /// Serialized markup of a node's children.
    fn inner_html(&self, node: &Self::Node) -> String;

    /// Whether `tag` names neither a platform element nor a known component.
    fn is_unknown_element(&self, _tag: &str) -> bool {
        false
    }
}
