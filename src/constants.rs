//! Application-wide constants for accessfeed.
//!
//! This module centralizes timeouts, retry tuning and protocol names so
//! the proxy, the bridge and the runner agree on them.
//!
//! # Categories
//!
//! - **Timeouts**: HTTP and bridge shutdown limits
//! - **Reconnection**: bridge backoff tuning
//! - **Protocol**: API version and bridge event names

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Default HTTP request timeout for service API calls.
///
/// Applies when the configuration does not set `request_timeout_secs`.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for the bridge task to finish after a stop.
pub const BRIDGE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the bridge `welcome` frame after the socket opens.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Reconnection
// ============================================================================

/// Initial delay before retrying a failed bridge connection.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum delay between bridge reconnection attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to each backoff delay, in milliseconds.
pub const BACKOFF_JITTER_MS: u64 = 250;

// ============================================================================
// Protocol
// ============================================================================

/// Default API version sent in every request body.
pub const API_VERSION: &str = "1.0";

/// Bridge event name carrying access-control business events.
pub const BUSINESS_EVENT: &str = "business_event";

/// Channel name placed in the bridge subscription identifier.
pub const BRIDGE_CHANNEL: &str = "EventSubscriptionChannel";

/// Header carrying the configured application id.
pub const APPLICATION_ID_HEADER: &str = "application_id";

/// Header carrying the session token once authenticated.
pub const SESSION_TOKEN_HEADER: &str = "session_token";
