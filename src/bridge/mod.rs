//! Notification bridge.
//!
//! Pushes business events from the service's delivery queue to an
//! [`EventHandler`] over a persistent WebSocket session. The bridge
//! authenticates the session with the application id and session token,
//! subscribes to the queue named by [`DeliveryCoordinates`], then forwards
//! frames until [`NotificationBridge::stop_receiving`] is called.
//!
//! # State
//!
//! ```text
//! Idle -> Connecting -> Connected <-> Reconnecting
//!                 \          \            \
//!                  +----------+------------+--> Disconnected | Closed
//! ```
//!
//! `Closed` is terminal and only reached through `stop_receiving`.
//! `Disconnected` is terminal and reached when the bridge refuses the
//! subscription, asks not to reconnect, or the retry limit is exhausted.

// Rust guideline compliant 2026-02

mod connection;
mod dispatch;
mod protocol;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::constants;
use crate::handler::EventHandler;
use crate::server::DeliveryCoordinates;

use dispatch::Dispatcher;

/// Lifecycle state of a [`NotificationBridge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BridgeState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Waiting to retry after a failure or a lost connection.
    Reconnecting {
        /// Reconnect attempt number since the last established connection.
        attempt: u32,
    },
    /// Gave up. No further callbacks follow.
    Disconnected,
    /// Stopped by the caller. No further callbacks follow.
    Closed,
}

/// Connection settings for a [`NotificationBridge`].
#[derive(Clone)]
pub struct BridgeConfig {
    /// Bridge endpoint; `http(s)://` is rewritten to `ws(s)://`.
    pub endpoint: String,
    /// Application id sent in the handshake.
    pub application_id: String,
    /// Session token from authentication, sent in the handshake.
    pub session_token: String,
    /// Queue to subscribe to.
    pub coordinates: DeliveryCoordinates,
    /// Consecutive failed connections tolerated. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Handshake timeout per attempt.
    pub connect_timeout: Duration,
    /// First retry delay.
    pub initial_backoff: Duration,
    /// Retry delay cap.
    pub max_backoff: Duration,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("endpoint", &self.endpoint)
            .field("application_id", &self.application_id)
            .field("session_token", &"<redacted>")
            .field("coordinates", &self.coordinates)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl BridgeConfig {
    /// Creates settings with default timeouts and unlimited retries.
    pub fn new(
        endpoint: impl Into<String>,
        application_id: impl Into<String>,
        session_token: impl Into<String>,
        coordinates: DeliveryCoordinates,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            application_id: application_id.into(),
            session_token: session_token.into(),
            coordinates,
            max_reconnect_attempts: None,
            connect_timeout: constants::HTTP_REQUEST_TIMEOUT,
            initial_backoff: constants::INITIAL_BACKOFF,
            max_backoff: constants::MAX_BACKOFF,
        }
    }

    /// Builds settings from the loaded configuration and a live session.
    pub fn from_parts(
        config: &Config,
        session_token: impl Into<String>,
        coordinates: DeliveryCoordinates,
    ) -> Self {
        Self {
            max_reconnect_attempts: config.max_reconnect_attempts,
            connect_timeout: config.request_timeout(),
            ..Self::new(
                config.bridge_uri.clone(),
                config.application_id.clone(),
                session_token,
                coordinates,
            )
        }
    }

    /// Sets the retry limit.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the retry delays.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }
}

/// State shared between the bridge handle, the connection task and the
/// dispatcher. The lock doubles as the delivery gate.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    state: RwLock<BridgeState>,
}

impl SharedState {
    fn get(&self) -> BridgeState {
        *self.read()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BridgeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `Idle` to `Connecting`. Returns false in any other state.
    fn begin(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == BridgeState::Idle {
            *state = BridgeState::Connecting;
            true
        } else {
            false
        }
    }

    /// Applies `next` unless the bridge is already closed.
    pub(crate) fn transition(&self, next: BridgeState) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == BridgeState::Closed {
            return false;
        }
        if *state != next {
            log::debug!("[Bridge] {:?} -> {:?}", *state, next);
            *state = next;
        }
        true
    }

    /// Moves to `Closed`, returning the previous state.
    ///
    /// Blocks until any in-flight callback returns.
    pub(crate) fn close(&self) -> BridgeState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, BridgeState::Closed)
    }
}

/// Push-notification receiver bound to one subscription.
///
/// Requires a Tokio runtime. Dropping the bridge cancels its connection
/// task without waiting for it.
pub struct NotificationBridge {
    config: BridgeConfig,
    handler: Arc<dyn EventHandler>,
    shared: Arc<SharedState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl NotificationBridge {
    /// Creates an idle bridge. Nothing connects until
    /// [`start_receiving`](Self::start_receiving).
    pub fn new(config: BridgeConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            config,
            handler,
            shared: Arc::new(SharedState::default()),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.shared.get()
    }

    /// Spawns the connection task and returns immediately.
    ///
    /// Only an idle bridge starts. Calling this after a previous start or
    /// after [`stop_receiving`](Self::stop_receiving) does nothing.
    /// Connection failures are reported through the handler, never here.
    pub fn start_receiving(&mut self) {
        if !self.shared.begin() {
            log::warn!(
                "[Bridge] start_receiving ignored in state {:?}",
                self.state()
            );
            return;
        }

        log::info!(
            "[Bridge] Starting receiver for queue {}",
            self.config.coordinates.queue_name
        );
        let dispatcher = Dispatcher::new(Arc::clone(&self.handler), Arc::clone(&self.shared));
        self.task = Some(tokio::spawn(connection::run(
            self.config.clone(),
            Arc::clone(&self.shared),
            dispatcher,
            self.cancel.clone(),
        )));
    }

    /// Stops delivery and cancels the connection task.
    ///
    /// Waits for an in-flight callback to return, then guarantees no
    /// further callbacks. Safe to call repeatedly or before starting.
    /// Must not be called from inside an [`EventHandler`] callback.
    pub fn stop_receiving(&self) {
        let previous = self.shared.close();
        self.cancel.cancel();
        if previous != BridgeState::Closed {
            log::info!("[Bridge] Stopped receiving (was {:?})", previous);
        }
    }

    /// Waits for the connection task to finish.
    ///
    /// Bounded by [`constants::BRIDGE_SHUTDOWN_TIMEOUT`]; a task still
    /// running after that is aborted.
    pub async fn wait_closed(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(constants::BRIDGE_SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => log::debug!("[Bridge] Connection task finished"),
            Ok(Err(e)) => log::warn!("[Bridge] Connection task failed: {}", e),
            Err(_) => {
                log::warn!(
                    "[Bridge] Connection task still running after {:?}, aborting",
                    constants::BRIDGE_SHUTDOWN_TIMEOUT
                );
                task.abort();
            }
        }
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
