//! Virtual Tree Reconciliation
//!
//! This module turns trees of [`VNode`]s into mutations of a concrete node
//! tree.
//!
//! # Concepts
//!
//! ## VNodes
//!
//! A render pass produces a fresh vnode tree. Vnodes are cheap descriptions:
//! a tag, a key, a data payload, children or text. After reconciliation each
//! vnode also knows the backend node it is bound to.
//!
//! ## Backends
//!
//! The reconciler is generic over [`NodeOps`], the small set of primitive
//! node operations a platform has to provide. [`memory::MemoryDom`] is an
//! in-memory implementation that logs every mutation.
//!
//! ## Modules and hooks
//!
//! Backend [`Module`]s observe every created, updated, removed and
//! destroyed vnode; per-vnode [`VNodeHooks`] observe a single one. Removal
//! waits until every module has released the node, so leave transitions can
//! delay it.
//!
//! ## Patching
//!
//! [`Patcher::patch`] is the entry point for mounting, updating, hydrating
//! and tearing down a tree. Child lists are reconciled with a two-ended
//! diff that keeps backend moves to a minimum.

pub mod hooks;
mod hydrate;
pub mod memory;
mod node_ops;
mod patch;
mod vnode;

pub use hooks::{AsyncFactory, ComponentInstance, Module, RemoveCallback, VNodeHooks};
pub use node_ops::{NodeKind, NodeOps};
pub use patch::{same_input_type, same_vnode, PatchTarget, Patcher, SSR_ATTR};
pub use vnode::{clone_vnode, Children, DomProps, NodeKey, VNode, VNodeBuilder, VNodeData, VNodeRef};
