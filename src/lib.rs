//! accessfeed - access-control event subscription client.
//!
//! This crate registers an event subscription with a remote access-control
//! service and prints the business events (door, alarm, etc.) pushed to it.
//!
//! # Architecture
//!
//! One run is one session, driven by the runner:
//!
//! - **Server** - Session-owning REST proxy with fault translation
//! - **Bridge** - Push-notification receiver bound to one subscription
//! - **Handler** - Callback trait the bridge delivers to
//! - **Runner** - authenticate → provision → listen → log out
//!
//! # Modules
//!
//! - [`server`] - Service API client and wire types
//! - [`bridge`] - Notification bridge
//! - [`handler`] - Event handler trait and built-in handlers
//! - [`cli`] - Command-line parsing
//! - [`config`] - Configuration loading

// Library modules
pub mod bridge;
pub mod cli;
pub mod handler;
pub mod runner;
pub mod server;
pub mod ws;

pub mod config;
pub mod constants;

// Re-export commonly used types
pub use bridge::{BridgeConfig, BridgeState, NotificationBridge};
pub use config::Config;
pub use handler::{ConsoleHandler, EventFields, EventHandler, LogHandler};
pub use server::{ProxyError, ServiceFault, ServiceProxy, Subscription, SubscriptionSpec};
