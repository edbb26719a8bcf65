//! Integration Tests for the Patcher
//!
//! These tests drive the patcher against the in-memory backend and check the
//! exact backend operations it performs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;

use weave_core::config;
use weave_core::diagnostics::DiagnosticCapture;
use weave_core::vdom::memory::{DomOp, MemNode, MemoryDom};
use weave_core::vdom::{
    clone_vnode, ComponentInstance, Module, NodeOps, PatchTarget, Patcher, RemoveCallback, VNode,
    VNodeData, VNodeHooks, VNodeRef,
};

type VRef = VNodeRef<MemNode>;

fn setup() -> (Rc<MemoryDom>, Patcher<MemoryDom>) {
    let dom = Rc::new(MemoryDom::new());
    let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
    (dom, patcher)
}

fn mount(patcher: &Patcher<MemoryDom>, tree: &VRef) -> MemNode {
    patcher.patch(None, Some(Rc::clone(tree)), false, false).unwrap()
}

fn update(patcher: &Patcher<MemoryDom>, old: &VRef, new: &VRef) -> Option<MemNode> {
    patcher.patch(
        Some(PatchTarget::VNode(Rc::clone(old))),
        Some(Rc::clone(new)),
        false,
        false,
    )
}

fn keyed(key: &str) -> VRef {
    VNode::element("li").key(key).children(vec![VNode::text(key)]).build()
}

fn list(children: Vec<VRef>) -> VRef {
    VNode::element("ul").children(children).build()
}

fn keyed_list(keys: &[&str]) -> VRef {
    list(keys.iter().map(|k| keyed(k)).collect())
}

#[derive(Default)]
struct Counts {
    create: Cell<usize>,
    update: Cell<usize>,
    remove: Cell<usize>,
    destroy: Cell<usize>,
}

struct CountingModule(Rc<Counts>);

impl Module<MemNode> for CountingModule {
    fn create(&self, _empty: &VRef, _vnode: &VRef) {
        self.0.create.set(self.0.create.get() + 1);
    }

    fn update(&self, _old: &VRef, _vnode: &VRef) {
        self.0.update.set(self.0.update.get() + 1);
    }

    fn remove(&self, _vnode: &VRef, rm: &RemoveCallback) {
        self.0.remove.set(self.0.remove.get() + 1);
        rm.release();
    }

    fn destroy(&self, _vnode: &VRef) {
        self.0.destroy.set(self.0.destroy.get() + 1);
    }
}

/// Holds removals until the test releases them, like a leave transition.
struct DeferringModule(Rc<RefCell<Vec<RemoveCallback>>>);

impl Module<MemNode> for DeferringModule {
    fn remove(&self, _vnode: &VRef, rm: &RemoveCallback) {
        self.0.borrow_mut().push(rm.clone());
    }
}

struct Mounted {
    root: MemNode,
    vnode: VRef,
}

impl ComponentInstance<MemNode> for Mounted {
    fn root_element(&self) -> Option<MemNode> {
        Some(self.root)
    }

    fn root_vnode(&self) -> Option<VRef> {
        Some(Rc::clone(&self.vnode))
    }
}

/// Test that rotating a keyed list performs exactly one move.
#[test]
fn keyed_rotation_moves_one_node() {
    let (dom, patcher) = setup();
    let old = keyed_list(&["a", "b", "c"]);
    let ul = mount(&patcher, &old);
    let old_elms: Vec<MemNode> = old.child_list().iter().map(|v| v.elm().unwrap()).collect();
    dom.clear_ops();

    let new = keyed_list(&["c", "a", "b"]);
    update(&patcher, &old, &new);

    assert_eq!(
        dom.ops(),
        vec![DomOp::Insert {
            parent: ul,
            node: old_elms[2],
            reference: Some(old_elms[0]),
            moved: true,
        }]
    );
    assert_eq!(dom.create_count(), 0);
    assert_eq!(dom.remove_count(), 0);
    assert_eq!(dom.render(ul), "<ul><li>c</li><li>a</li><li>b</li></ul>");

    let new_elms: Vec<MemNode> = new.child_list().iter().map(|v| v.elm().unwrap()).collect();
    assert_eq!(new_elms, vec![old_elms[2], old_elms[0], old_elms[1]]);
}

/// Test that reversing a keyed list reuses every node.
#[test]
fn keyed_reversal_reuses_nodes() {
    let (dom, patcher) = setup();
    let old = keyed_list(&["a", "b", "c", "d"]);
    let ul = mount(&patcher, &old);
    dom.clear_ops();

    let new = keyed_list(&["d", "c", "b", "a"]);
    update(&patcher, &old, &new);

    assert_eq!(dom.create_count(), 0);
    assert_eq!(dom.remove_count(), 0);
    assert_eq!(dom.move_count(), 3);
    assert_eq!(
        dom.render(ul),
        "<ul><li>d</li><li>c</li><li>b</li><li>a</li></ul>"
    );
}

/// Test that insertions and removals in the middle of a keyed list are local.
#[test]
fn keyed_insert_and_remove_in_middle() {
    let (dom, patcher) = setup();
    let old = keyed_list(&["a", "b", "c", "d"]);
    let ul = mount(&patcher, &old);
    dom.clear_ops();

    let new = keyed_list(&["a", "x", "c", "d"]);
    update(&patcher, &old, &new);

    assert_eq!(dom.move_count(), 0);
    assert_eq!(dom.remove_count(), 1);
    // The new <li> and its text node.
    assert_eq!(dom.create_count(), 2);
    assert_eq!(
        dom.render(ul),
        "<ul><li>a</li><li>x</li><li>c</li><li>d</li></ul>"
    );
}

/// Test that an unkeyed mismatch at the front is removed positionally.
#[test]
fn unkeyed_removal_patches_in_place() {
    let (dom, patcher) = setup();
    let old = list(vec![
        VNode::element("p").text("a").build(),
        VNode::element("span").text("b").build(),
    ]);
    let ul = mount(&patcher, &old);
    let span = old.child_list()[1].elm().unwrap();
    dom.clear_ops();

    let new = list(vec![VNode::element("span").text("b").build()]);
    update(&patcher, &old, &new);

    assert_eq!(dom.create_count(), 0);
    assert_eq!(dom.remove_count(), 1);
    assert_eq!(new.child_list()[0].elm(), Some(span));
    assert_eq!(dom.render(ul), "<ul><span>b</span></ul>");
}

/// Test that static cloned nodes are skipped entirely.
#[test]
fn static_clone_is_skipped() {
    let (dom, patcher) = setup();
    let old = VNode::element("div")
        .key("hoisted")
        .static_node()
        .children(vec![VNode::element("b").text("fixed").build()])
        .build();
    let root = mount(&patcher, &old);
    dom.clear_ops();

    let new = clone_vnode(&old);
    let result = update(&patcher, &old, &new);

    assert!(dom.ops().is_empty());
    assert_eq!(result, Some(root));
    assert_eq!(new.elm(), Some(root));
}

/// Test that patching a tree against itself does nothing.
#[test]
fn patching_identical_tree_is_a_no_op() {
    let (dom, patcher) = setup();
    let tree = keyed_list(&["a", "b"]);
    mount(&patcher, &tree);
    dom.clear_ops();

    update(&patcher, &tree, &tree);
    assert!(dom.ops().is_empty());
}

/// Test that an unchanged re-render performs no backend operations.
#[test]
fn equal_rerender_is_a_no_op() {
    let (dom, patcher) = setup();
    let old = keyed_list(&["a", "b", "c"]);
    mount(&patcher, &old);
    dom.clear_ops();

    update(&patcher, &old, &keyed_list(&["a", "b", "c"]));
    assert!(dom.ops().is_empty());
}

/// Test that remove-only mode never moves nodes.
#[test]
fn remove_only_suppresses_moves() {
    let (dom, patcher) = setup();
    let old = keyed_list(&["a", "b", "c"]);
    mount(&patcher, &old);
    dom.clear_ops();

    let new = keyed_list(&["c", "a", "b"]);
    patcher.patch(
        Some(PatchTarget::VNode(Rc::clone(&old))),
        Some(new),
        false,
        true,
    );
    assert_eq!(dom.move_count(), 0);
}

/// Test that duplicate sibling keys are diagnosed.
#[test]
fn duplicate_keys_are_diagnosed() {
    let capture = DiagnosticCapture::start();
    let (_dom, patcher) = setup();
    mount(&patcher, &keyed_list(&["a", "b", "a"]));

    let diagnostics = capture.diagnostics();
    assert_eq!(capture.count("duplicate_key"), 1);
    assert_eq!(
        diagnostics[0].to_string(),
        "duplicate keys detected: 'a'. This may cause an update error."
    );
}

/// Test that mounting onto an existing element replaces it in its parent.
#[test]
fn mounting_onto_element_replaces_it() {
    let (dom, patcher) = setup();
    let container = dom.create_element("body");
    let placeholder = dom.create_element("div");
    let footer = dom.create_element("footer");
    dom.append_child(&container, &placeholder);
    dom.append_child(&container, &footer);

    let tree = keyed_list(&["a"]);
    let root = patcher
        .patch(Some(PatchTarget::Element(placeholder)), Some(tree), false, false)
        .unwrap();

    assert_eq!(dom.children(container), vec![root, footer]);
    assert_eq!(dom.parent_node(&placeholder), None);
}

/// Test that a root with a different tag is replaced in place.
#[test]
fn root_tag_change_replaces_tree() {
    let (dom, patcher) = setup();
    let container = dom.create_element("body");
    let old = VNode::element("div").text("old").build();
    let old_root = mount(&patcher, &old);
    dom.append_child(&container, &old_root);

    let new = VNode::element("section").text("new").build();
    let new_root = update(&patcher, &old, &new).unwrap();

    assert_ne!(new_root, old_root);
    assert_eq!(dom.children(container), vec![new_root]);
    assert_eq!(dom.render(container), "<body><section>new</section></body>");
}

/// Test module and per-vnode hook invocation counts over a lifecycle.
#[test]
fn modules_see_create_update_remove_destroy() {
    let counts = Rc::new(Counts::default());
    let dom = Rc::new(MemoryDom::new());
    let patcher = Patcher::new(
        Rc::clone(&dom),
        vec![Box::new(CountingModule(Rc::clone(&counts))) as Box<dyn Module<MemNode>>],
    );

    let item = |key: &str| {
        VNode::element("li")
            .key(key)
            .data(VNodeData::new().attr("class", "row"))
            .build()
    };
    let old = VNode::element("ul")
        .data(VNodeData::new())
        .children(vec![item("a"), item("b")])
        .build();
    mount(&patcher, &old);
    assert_eq!(counts.create.get(), 3);

    let new = VNode::element("ul")
        .data(VNodeData::new())
        .children(vec![item("a")])
        .build();
    update(&patcher, &old, &new);
    assert_eq!(counts.update.get(), 2);
    assert_eq!(counts.remove.get(), 1);
    assert_eq!(counts.destroy.get(), 1);

    patcher.patch(Some(PatchTarget::VNode(new)), None, false, false);
    assert_eq!(counts.destroy.get(), 3);
}

/// Test that removal waits until every module released the node.
#[test]
fn removal_waits_for_all_listeners() {
    let held = Rc::new(RefCell::new(Vec::new()));
    let dom = Rc::new(MemoryDom::new());
    let patcher = Patcher::new(
        Rc::clone(&dom),
        vec![Box::new(DeferringModule(Rc::clone(&held))) as Box<dyn Module<MemNode>>],
    );

    let item = |key: &str| VNode::element("li").key(key).data(VNodeData::new()).build();
    let old = list(vec![item("a"), item("b")]);
    let ul = mount(&patcher, &old);
    let leaving = old.child_list()[1].elm().unwrap();

    update(&patcher, &old, &list(vec![item("a")]));
    assert_eq!(dom.parent_node(&leaving), Some(ul));
    assert_eq!(held.borrow().len(), 1);

    let rm = held.borrow_mut().pop().unwrap();
    rm.release();
    assert_eq!(dom.parent_node(&leaving), None);
}

/// Test that insert hooks fire after the whole tree is attached.
#[test]
fn insert_hooks_fire_once_attached() {
    let (dom, patcher) = setup();
    let container = dom.create_element("body");
    let placeholder = dom.create_element("div");
    dom.append_child(&container, &placeholder);

    let attached = Rc::new(RefCell::new(Vec::new()));
    let (log, dom_view) = (Rc::clone(&attached), Rc::clone(&dom));
    let hooks = VNodeHooks {
        insert: Some(Rc::new(move |vnode: &VRef| {
            let elm = vnode.elm().unwrap();
            let ul = dom_view.parent_node(&elm).unwrap();
            log.borrow_mut().push(dom_view.parent_node(&ul));
        })),
        ..VNodeHooks::default()
    };
    let tree = list(vec![VNode::element("li")
        .data(VNodeData::new().hooks(hooks))
        .build()]);

    patcher.patch(Some(PatchTarget::Element(placeholder)), Some(tree), false, false);
    assert_eq!(*attached.borrow(), vec![Some(container)]);
}

/// Test that component vnodes mount their instance root.
#[test]
fn component_placeholder_mounts_instance_root() {
    let (dom, patcher) = setup();
    let dom_view = Rc::clone(&dom);
    let hooks = VNodeHooks {
        init: Some(Rc::new(move |vnode: &VRef, _hydrating: bool| {
            let root = VNode::element("section").text("inner").build();
            let elm = dom_view.create_element("section");
            dom_view.set_text_content(&elm, "inner");
            root.set_elm(Some(elm));
            root.set_parent(vnode);
            vnode.set_component_instance(Some(Rc::new(Mounted { root: elm, vnode: root })));
        })),
        ..VNodeHooks::default()
    };
    let tree = VNode::element("div")
        .children(vec![VNode::element("my-widget")
            .data(VNodeData::new().hooks(hooks))
            .build()])
        .build();

    let root = mount(&patcher, &tree);
    assert_eq!(dom.render(root), "<div><section>inner</section></div>");
    assert_eq!(dom.count_ops(|op| matches!(op, DomOp::CreateElement { tag, .. } if tag == "my-widget")), 0);
}

/// Test that scope ids are applied to created elements.
#[test]
fn style_scope_is_applied() {
    let (dom, patcher) = setup();
    let tree = VNode::element("div")
        .scope_id("data-v-1")
        .children(vec![VNode::element("span").fn_scope_id("data-v-fn").build()])
        .build();
    let root = mount(&patcher, &tree);
    assert_eq!(dom.render(root), "<div data-v-1><span data-v-fn></span></div>");
}

/// Test that unknown tags are diagnosed unless ignored or inside a pre block.
#[test]
fn unknown_elements_are_diagnosed() {
    let capture = DiagnosticCapture::start();
    config::update(|c| c.ignored_elements = vec!["x-ignored".to_string()]);
    let dom = Rc::new(MemoryDom::with_known_tags(&["div", "pre"]));
    let patcher = Patcher::new(Rc::clone(&dom), Vec::new());

    let mut pre_data = VNodeData::new();
    pre_data.pre = true;
    let tree = VNode::element("div")
        .children(vec![
            VNode::element("blink").build(),
            VNode::element("x-ignored").build(),
            VNode::element("pre")
                .data(pre_data)
                .children(vec![VNode::element("marquee").build()])
                .build(),
            VNode::element("circle").ns("svg").build(),
        ])
        .build();
    mount(&patcher, &tree);
    config::update(|c| c.ignored_elements.clear());

    assert_eq!(capture.count("unknown_element"), 1);
    assert_eq!(
        capture.diagnostics()[0].to_string(),
        "unknown custom element: <blink>; did you register the component correctly?"
    );
}

/// Test that an already-rendered vnode is cloned before being mounted again.
#[test]
fn reused_vnode_is_cloned() {
    let (dom, patcher) = setup();
    let shared = VNode::element("li").key("s").build();
    let first = list(vec![Rc::clone(&shared)]);
    mount(&patcher, &first);
    let first_elm = shared.elm().unwrap();

    let second = list(vec![Rc::clone(&shared)]);
    let root = mount(&patcher, &second);

    let mounted = second.child_list()[0].clone();
    assert!(!Rc::ptr_eq(&mounted, &shared));
    assert!(mounted.is_cloned());
    assert_ne!(mounted.elm(), Some(first_elm));
    assert_eq!(shared.elm(), Some(first_elm));
    assert_eq!(dom.children(root), vec![mounted.elm().unwrap()]);
}

/// Test that switching between text and children content works both ways.
#[test]
fn text_and_children_swap() {
    let (dom, patcher) = setup();
    let old = VNode::element("div").children(vec![VNode::element("b").build()]).build();
    let root = mount(&patcher, &old);

    let text = VNode::element("div").text("plain").build();
    update(&patcher, &old, &text);
    assert_eq!(dom.render(root), "<div>plain</div>");

    let empty = VNode::element("div").build();
    update(&patcher, &text, &empty);
    assert_eq!(dom.render(root), "<div></div>");
}

fn unique(keys: Vec<u8>) -> Vec<u8> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter().filter(|k| seen.insert(*k)).collect()
}

fn numbered_list(keys: &[u8]) -> VRef {
    list(
        keys.iter()
            .map(|k| {
                VNode::element("li")
                    .key(i64::from(*k))
                    .children(vec![VNode::text(k.to_string())])
                    .build()
            })
            .collect(),
    )
}

proptest! {
    #[test]
    fn keyed_lists_reconcile_to_new_order(
        old_keys in proptest::collection::vec(0u8..16, 0..12),
        new_keys in proptest::collection::vec(0u8..16, 0..12),
    ) {
        let old_keys = unique(old_keys);
        let new_keys = unique(new_keys);
        let (dom, patcher) = setup();

        let old = numbered_list(&old_keys);
        let ul = mount(&patcher, &old);
        let before: Vec<(u8, MemNode)> = old_keys
            .iter()
            .copied()
            .zip(old.child_list().iter().map(|v| v.elm().unwrap()))
            .collect();
        dom.clear_ops();

        let new = numbered_list(&new_keys);
        update(&patcher, &old, &new);

        let expected: String = new_keys.iter().map(|k| format!("<li>{k}</li>")).collect();
        prop_assert_eq!(dom.render(ul), format!("<ul>{expected}</ul>"));

        let after: Vec<MemNode> = new.child_list().iter().map(|v| v.elm().unwrap()).collect();
        prop_assert_eq!(dom.children(ul), after.clone());
        for (key, elm) in &before {
            if let Some(pos) = new_keys.iter().position(|k| k == key) {
                prop_assert_eq!(after[pos], *elm);
            }
        }

        let removed = old_keys.iter().filter(|k| !new_keys.contains(k)).count();
        prop_assert_eq!(dom.remove_count(), removed);
    }
}
