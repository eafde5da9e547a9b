//! Event handlers invoked by the notification bridge.
//!
//! The bridge reports three kinds of things to an [`EventHandler`]:
//! connection lifecycle changes, business events, and delivery errors.
//! Anything the bridge does not recognise arrives as a management event.
//!
//! Two implementations ship with the crate:
//!
//! - [`ConsoleHandler`] prints everything to the terminal
//! - [`LogHandler`] routes everything through the `log` facade
//!
//! Callbacks run on the bridge task, never on the caller's task, and may
//! run while the main flow waits for its stop signal. They must return
//! promptly and must not call
//! [`NotificationBridge::stop_receiving`](crate::bridge::NotificationBridge::stop_receiving).

use serde::Deserialize;

use crate::server::Subscription;

/// Field name → value mapping of one business event.
pub type EventFields = serde_json::Map<String, serde_json::Value>;

/// Receiver for everything the bridge delivers.
pub trait EventHandler: Send + Sync {
    /// A business event arrived.
    fn received(&self, fields: &EventFields);

    /// An established connection was lost. The bridge may reconnect.
    fn connection_lost(&self);

    /// The bridge is connected and subscribed.
    fn connection_established(&self);

    /// A delivery or transport error occurred. The bridge keeps listening.
    fn exception_raised(&self, cause: &anyhow::Error);

    /// A frame that is not a business event.
    fn management_event(&self, message: &str);

    /// The service returned the subscription for this run. `listening` is
    /// false when no bridge will be opened for it.
    ///
    /// Called on the runner's task before the bridge starts.
    fn subscription_ready(&self, subscription: &Subscription, listening: bool) {
        log::info!(
            "Subscription {} ready (listening: {})",
            subscription.id,
            listening
        );
    }
}

/// Fault body some bridge errors carry as their inner message.
#[derive(Debug, Deserialize)]
struct RemoteFault {
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "ErrorCode")]
    error_code: Option<String>,
}

/// Picks the most useful text out of a bridge error.
///
/// When `cause` wraps an inner cause, the innermost message is tried as a
/// JSON fault: its `Message` wins, then its `ErrorCode`, then the raw inner
/// text. Without an inner cause the error's own message is returned. This
/// is a heuristic; parse failures are never reported.
pub fn resolve_fault_message(cause: &anyhow::Error) -> String {
    if cause.chain().nth(1).is_none() {
        return cause.to_string();
    }

    let inner = cause.root_cause().to_string();
    match serde_json::from_str::<RemoteFault>(&inner) {
        Ok(RemoteFault {
            message: Some(message),
            ..
        }) if !message.is_empty() => message,
        Ok(RemoteFault {
            error_code: Some(code),
            ..
        }) if !code.is_empty() => code,
        _ => inner,
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Subscription summary folded onto a single log line.
fn one_line(subscription: &Subscription) -> String {
    subscription
        .to_string()
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Prints every callback to the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHandler;

impl ConsoleHandler {
    /// Creates a console handler.
    pub fn new() -> Self {
        Self
    }
}

impl EventHandler for ConsoleHandler {
    fn received(&self, fields: &EventFields) {
        println!(
            "--- event received {} ---",
            chrono::Local::now().format("%H:%M:%S")
        );
        for (name, value) in fields {
            println!("  {}: {}", name, render_value(value));
        }
    }

    fn connection_lost(&self) {
        println!("Connection lost");
    }

    fn connection_established(&self) {
        println!("Connection established");
    }

    fn exception_raised(&self, cause: &anyhow::Error) {
        eprintln!("Error: {}", resolve_fault_message(cause));
    }

    fn management_event(&self, message: &str) {
        println!("Management event: {}", message);
    }

    fn subscription_ready(&self, subscription: &Subscription, listening: bool) {
        println!("{subscription}");
        if listening {
            println!(
                "Listening for events on subscription {}. Press Ctrl+C to stop.",
                subscription.id
            );
        }
    }
}

/// Routes every callback through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl LogHandler {
    /// Creates a log handler.
    pub fn new() -> Self {
        Self
    }
}

impl EventHandler for LogHandler {
    fn received(&self, fields: &EventFields) {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, render_value(value)))
            .collect();
        log::info!("[Event] {}", rendered.join(" "));
    }

    fn connection_lost(&self) {
        log::warn!("[Event] Connection lost");
    }

    fn connection_established(&self) {
        log::info!("[Event] Connection established");
    }

    fn exception_raised(&self, cause: &anyhow::Error) {
        log::error!("[Event] {} ({:#})", resolve_fault_message(cause), cause);
    }

    fn management_event(&self, message: &str) {
        log::debug!("[Event] Management: {}", message);
    }

    fn subscription_ready(&self, subscription: &Subscription, listening: bool) {
        log::info!("[Event] {}", one_line(subscription));
        if listening {
            log::info!("[Event] Listening on subscription {}", subscription.id);
        }
    }
}
