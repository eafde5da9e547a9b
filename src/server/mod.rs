//! Service communication module for accessfeed.
//!
//! This module provides the typed client for the access-control service:
//!
//! - Request/response data types (`Subscription`, `SubscriptionSpec`)
//! - Session-owning HTTP proxy (`ServiceProxy`)
//! - Fault translation (`ProxyError`, `ServiceFault`)
//!
//! # Modules
//!
//! - [`client`] - HTTP proxy for the service API
//! - [`types`] - Request/response data types
//! - [`error`] - Proxy error types

// Rust guideline compliant 2025-01

pub mod client;
pub mod error;
pub mod types;

pub use client::ServiceProxy;
pub use error::{ProxyError, ProxyResult, ServiceFault};
pub use types::{DeliveryCoordinates, Subscription, SubscriptionSpec};
