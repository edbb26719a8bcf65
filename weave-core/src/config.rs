//! Runtime Configuration
//!
//! Knobs shared by the reactivity engine and the reconciler. The active
//! configuration lives in thread-local storage, mirroring the single-threaded
//! model of the rest of the crate: each thread that drives a UI owns its own
//! settings.
//!
//! # Example
//!
//! ```rust,ignore
//! use weave_core::config::{self, Config};
//!
//! let cfg = Config::from_json(r#"{ "ignored_elements": ["my-widget"] }"#)?;
//! config::set(cfg);
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration text was not valid JSON for [`Config`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Order in which a freshly created element is attached to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionMode {
    /// Build the whole subtree, run create hooks, then attach the root.
    #[default]
    ChildrenFirst,

    /// Attach the element before its children are created. Used by backends
    /// that need incremental tree attachment. A vnode can still opt back into
    /// children-first insertion with `append_as_tree`.
    ParentFirst,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suppress all diagnostics.
    pub silent: bool,

    /// Tags that are never reported as unknown elements.
    pub ignored_elements: Vec<String>,

    /// Maximum number of consecutive re-runs a watcher may trigger on itself
    /// before it is considered an infinite update loop.
    pub max_update_count: usize,

    /// How created elements are attached to their parents.
    pub insertion_mode: InsertionMode,

    /// When set, `observe` never wraps new aggregates.
    pub server_rendering: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: !cfg!(debug_assertions),
            ignored_elements: Vec::new(),
            max_update_count: 100,
            insertion_mode: InsertionMode::default(),
            server_rendering: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check whether `tag` is listed in `ignored_elements`.
    pub fn is_ignored_element(&self, tag: &str) -> bool {
        self.ignored_elements.iter().any(|ignored| ignored == tag)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Replace the configuration for the current thread.
pub fn set(config: Config) {
    CONFIG.with(|cell| *cell.borrow_mut() = config);
}

/// Read the configuration for the current thread.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|cell| f(&cell.borrow()))
}

/// Modify the configuration for the current thread in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|cell| f(&mut cell.borrow_mut()));
}
