//! Diagnostics
//!
//! Advisory warnings raised by the reactivity engine and the reconciler.
//! A diagnostic never changes control flow: the operation that raised it
//! continues with a defined fallback.
//!
//! Every diagnostic is emitted as a `tracing` warning event. Callers that
//! want to inspect diagnostics directly (developer tooling, tests) can also
//! install a per-thread sink with [`set_diagnostic_sink`].

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config;

/// An advisory warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("cannot set reactive property on undefined, null, or primitive value: {target}")]
    SetOnPrimitive { target: String },

    #[error("cannot delete reactive property on undefined, null, or primitive value: {target}")]
    DeleteOnPrimitive { target: String },

    #[error("`{key}` is not a valid sequence index")]
    InvalidIndex { key: String },

    #[error(
        "avoid adding reactive properties to a component instance or its root state \
         at runtime; declare `{key}` upfront instead"
    )]
    RootPropertyAdded { key: String },

    #[error(
        "avoid deleting properties on a component instance or its root state; \
         set `{key}` to null instead"
    )]
    RootPropertyDeleted { key: String },

    #[error("duplicate keys detected: '{key}'. This may cause an update error.")]
    DuplicateKey { key: String },

    #[error("unknown custom element: <{tag}>; did you register the component correctly?")]
    UnknownElement { tag: String },

    #[error(
        "the client-side rendered virtual tree does not match server-rendered content \
         ({detail}); bailing hydration and performing a full client-side render"
    )]
    HydrationMismatch { detail: String },

    #[error("possible infinite update loop in watcher {watcher}")]
    InfiniteUpdateLoop { watcher: u64 },
}

impl Diagnostic {
    /// Short machine-readable name, used as the `kind` field on log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::SetOnPrimitive { .. } => "set_on_primitive",
            Diagnostic::DeleteOnPrimitive { .. } => "delete_on_primitive",
            Diagnostic::InvalidIndex { .. } => "invalid_index",
            Diagnostic::RootPropertyAdded { .. } => "root_property_added",
            Diagnostic::RootPropertyDeleted { .. } => "root_property_deleted",
            Diagnostic::DuplicateKey { .. } => "duplicate_key",
            Diagnostic::UnknownElement { .. } => "unknown_element",
            Diagnostic::HydrationMismatch { .. } => "hydration_mismatch",
            Diagnostic::InfiniteUpdateLoop { .. } => "infinite_update_loop",
        }
    }
}

type Sink = Rc<dyn Fn(&Diagnostic)>;

thread_local! {
    static SINK: RefCell<Option<Sink>> = const { RefCell::new(None) };
}

/// Install a sink that receives every diagnostic raised on this thread.
///
/// Returns the previously installed sink, if any.
pub fn set_diagnostic_sink<F>(sink: F) -> Option<Rc<dyn Fn(&Diagnostic)>>
where
    F: Fn(&Diagnostic) + 'static,
{
    SINK.with(|slot| slot.borrow_mut().replace(Rc::new(sink)))
}

/// Remove the sink installed on this thread.
pub fn clear_diagnostic_sink() {
    SINK.with(|slot| slot.borrow_mut().take());
}

/// Raise a diagnostic.
pub fn warn(diagnostic: Diagnostic) {
    if config::with(|c| c.silent) {
        return;
    }

    tracing::warn!(kind = diagnostic.kind(), "{}", diagnostic);

    // Clone the sink out so it may install or clear sinks itself.
    let sink = SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = sink {
        sink(&diagnostic);
    }
}

/// Collects diagnostics raised on the current thread until dropped.
///
/// Intended for tests and developer tooling.
pub struct DiagnosticCapture {
    seen: Rc<RefCell<Vec<Diagnostic>>>,
    previous: Option<Sink>,
}

impl DiagnosticCapture {
    /// Start capturing.
    pub fn start() -> Self {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink_seen = Rc::clone(&seen);
        let previous = set_diagnostic_sink(move |d| sink_seen.borrow_mut().push(d.clone()));
        Self { seen, previous }
    }

    /// Diagnostics captured so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.seen.borrow().clone()
    }

    /// Number of captured diagnostics with the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.seen.borrow().iter().filter(|d| d.kind() == kind).count()
    }
}

impl Drop for DiagnosticCapture {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SINK.with(|slot| *slot.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn capture_collects_and_restores() {
        {
            let capture = DiagnosticCapture::start();
            warn(Diagnostic::DuplicateKey { key: "a".into() });
            warn(Diagnostic::UnknownElement { tag: "blink".into() });
            assert_eq!(capture.diagnostics().len(), 2);
            assert_eq!(capture.count("duplicate_key"), 1);
        }
        SINK.with(|slot| assert!(slot.borrow().is_none()));
    }

    #[test]
    fn silent_config_suppresses_everything() {
        let capture = DiagnosticCapture::start();
        config::update(|c| c.silent = true);
        warn(Diagnostic::DuplicateKey { key: "a".into() });
        config::update(|c| c.silent = false);
        assert!(capture.diagnostics().is_empty());
    }

    #[test]
    fn warnings_are_logged() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .finish();

        config::update(|c| c.silent = false);
        tracing::subscriber::with_default(subscriber, || {
            warn(Diagnostic::DuplicateKey { key: "row-7".into() });
        });

        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("WARN"));
        assert!(logged.contains("duplicate keys detected: 'row-7'"));
        assert!(logged.contains("duplicate_key"));
    }
}
