//! Isolated delivery of bridge callbacks to the event handler.
//!
//! Every callback runs under `catch_unwind` while holding the bridge state
//! read lock. A handler panic becomes an `exception_raised` call and never
//! reaches the connection task. Holding the read lock means
//! [`NotificationBridge::stop_receiving`](super::NotificationBridge::stop_receiving)
//! waits for an in-flight callback, and nothing is delivered once the state
//! is `Closed`.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::{BridgeState, SharedState};
use crate::handler::EventHandler;

#[derive(Clone)]
pub(crate) struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    shared: Arc<SharedState>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(handler: Arc<dyn EventHandler>, shared: Arc<SharedState>) -> Self {
        Self { handler, shared }
    }

    pub(crate) fn established(&self) {
        self.deliver("connection_established", |h| h.connection_established());
    }

    pub(crate) fn lost(&self) {
        self.deliver("connection_lost", |h| h.connection_lost());
    }

    pub(crate) fn management(&self, message: &str) {
        self.deliver("management_event", |h| h.management_event(message));
    }

    /// Forwards a business event payload; it must be a JSON object.
    pub(crate) fn business_event(&self, payload: serde_json::Value) {
        match payload {
            serde_json::Value::Object(fields) => {
                self.deliver("received", |h| h.received(&fields));
            }
            other => self.error(anyhow::anyhow!(
                "business event payload is not an object: {}",
                other
            )),
        }
    }

    pub(crate) fn error(&self, cause: anyhow::Error) {
        log::debug!("[Bridge] Reporting error: {:#}", cause);
        let state = self.shared.read();
        if *state == BridgeState::Closed {
            return;
        }
        self.report(&cause);
    }

    fn deliver<F>(&self, callback: &'static str, f: F)
    where
        F: FnOnce(&dyn EventHandler),
    {
        let state = self.shared.read();
        if *state == BridgeState::Closed {
            log::trace!("[Bridge] Dropping {} after close", callback);
            return;
        }

        let handler = self.handler.as_ref();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(handler))) {
            let cause = anyhow::anyhow!(
                "event handler panicked in {}: {}",
                callback,
                panic_message(panic.as_ref())
            );
            log::error!("[Bridge] {}", cause);
            self.report(&cause);
        }
    }

    /// Caller holds the state read lock.
    fn report(&self, cause: &anyhow::Error) {
        let handler = self.handler.as_ref();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler.exception_raised(cause))) {
            log::error!(
                "[Bridge] Event handler panicked in exception_raised: {} (while reporting: {:#})",
                panic_message(panic.as_ref()),
                cause
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
