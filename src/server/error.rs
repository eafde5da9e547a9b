//! Error types for the service proxy.
//!
//! Callers only ever see a [`ServiceFault`] (the server's own `code` and
//! `message`) or an unclassified transport/decode failure. Raw status codes
//! never leave this module.

use std::fmt;

use thiserror::Error;

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Structured failure reported by the service with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    /// Machine-readable fault code.
    pub code: String,
    /// Human-readable fault message.
    pub message: String,
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceFault {}

/// Errors returned by [`ServiceProxy`](super::client::ServiceProxy) operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The service rejected the call.
    #[error(transparent)]
    Fault(#[from] ServiceFault),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body could not be parsed, including unparsable fault bodies.
    #[error("failed to decode {context} (HTTP {status})")]
    Decode {
        /// What was being decoded.
        context: &'static str,
        /// HTTP status of the response.
        status: u16,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The operation needs a session and none exists.
    #[error("no authenticated session; call authenticate first")]
    NotAuthenticated,

    /// Modify and disable need the id of an existing subscription.
    #[error("{operation} requires a subscription id")]
    MissingSubscriptionId {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The configured base URI cannot be joined with an endpoint path.
    #[error("invalid endpoint {path}: {source}")]
    InvalidEndpoint {
        /// Relative path that failed to join.
        path: String,
        /// The URL parse failure.
        #[source]
        source: url::ParseError,
    },
}

impl ProxyError {
    /// The service fault, if this error is one.
    pub fn fault(&self) -> Option<&ServiceFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
