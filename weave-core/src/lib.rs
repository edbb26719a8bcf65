//! Weave Core
//!
//! This crate provides the core runtime for the Weave UI framework.
//! It implements:
//!
//! - Reactive state (observed records and sequences, deps, watchers)
//! - Virtual tree reconciliation (vnodes, the patch algorithm, hydration)
//! - Runtime configuration and developer diagnostics
//!
//! The crate is single-threaded: reactive state and vnode trees live on the
//! thread that created them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Observed state and dependency tracking
//! - `vdom`: VNodes, backend node operations and the patcher
//! - `config`: Runtime configuration
//! - `diagnostics`: Advisory warnings routed through `tracing`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use serde_json::json;
//! use weave_core::reactive::{observe, Value, Watcher};
//! use weave_core::vdom::{memory::MemoryDom, PatchTarget, Patcher, VNode};
//!
//! let state = Value::from(json!({ "items": ["a", "b"] }));
//! observe(&state);
//! let obj = state.as_object().unwrap().clone();
//!
//! let dom = Rc::new(MemoryDom::new());
//! let patcher = Patcher::new(Rc::clone(&dom), Vec::new());
//! let last = Rc::new(RefCell::new(None));
//!
//! // Re-render whenever `items` changes.
//! let _render = Watcher::new(move || {
//!     let items = obj.get("items");
//!     let children = items
//!         .as_array()
//!         .map(|a| a.to_vec())
//!         .unwrap_or_default()
//!         .iter()
//!         .map(|item| VNode::element("li").text(item.describe()).build())
//!         .collect();
//!     let tree = VNode::element("ul").children(children).build();
//!     let old = last.borrow_mut().replace(Rc::clone(&tree));
//!     patcher.patch(old.map(PatchTarget::VNode), Some(tree), false, false);
//! });
//! ```

pub mod config;
pub mod diagnostics;
pub mod reactive;
pub mod vdom;

pub use config::{Config, ConfigError, InsertionMode};
pub use diagnostics::Diagnostic;
