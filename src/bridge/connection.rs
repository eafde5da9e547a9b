//! Bridge connection loop.
//!
//! One task per bridge: connect, wait for `welcome`, send `subscribe`, then
//! forward frames until the connection ends. Failed or lost connections
//! are retried with exponential backoff plus jitter until the retry limit
//! is hit, the bridge refuses us, or the token is cancelled.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::dispatch::Dispatcher;
use super::protocol::{self, InboundFrame};
use super::{BridgeConfig, BridgeState, SharedState};
use crate::constants;
use crate::ws::{self, Inbound, SessionHeaders, WsReader, WsWriter};

/// How a single connection ended.
#[derive(Debug)]
enum SessionExit {
    /// Cancellation requested.
    Shutdown,
    /// An established connection was lost.
    Lost { reconnect: bool },
    /// The connection never reached `Connected`. Retry.
    Failed(anyhow::Error),
    /// The bridge refused us. Do not retry.
    Refused(anyhow::Error),
}

enum FrameOutcome {
    Continue,
    Exit(SessionExit),
}

/// Exponential retry delay with random jitter.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    fn next_delay(&mut self) -> Duration {
        let jitter_cap = constants::BACKOFF_JITTER_MS.min(millis(self.current));
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_cap));
        let delay = self.current + jitter;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs the connection loop until cancelled or given up.
pub(crate) async fn run(
    config: BridgeConfig,
    shared: Arc<SharedState>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
) {
    let subscribe = match protocol::subscribe_command(&config.coordinates) {
        Ok(command) => command,
        Err(e) => {
            dispatcher.error(e);
            shared.transition(BridgeState::Disconnected);
            return;
        }
    };

    let mut backoff = Backoff::new(config.initial_backoff, config.max_backoff);
    let mut failures: u32 = 0;
    let mut reconnect_attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        log::info!("[Bridge] Connecting to {}", config.endpoint);
        let session = SessionHeaders {
            application_id: &config.application_id,
            session_token: &config.session_token,
        };
        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = ws::connect(&config.endpoint, session, config.connect_timeout) => result,
        };

        let exit = match connected {
            Ok((mut writer, mut reader)) => {
                log::info!("[Bridge] WebSocket connected");
                let exit =
                    run_session(&subscribe, &mut writer, &mut reader, &shared, &dispatcher, &cancel)
                        .await;
                if let Err(e) = writer.close().await {
                    log::trace!("[Bridge] Close after session: {}", e);
                }
                exit
            }
            Err(e) => SessionExit::Failed(e),
        };

        match exit {
            SessionExit::Shutdown => break,
            SessionExit::Refused(e) => {
                log::warn!("[Bridge] {:#}", e);
                dispatcher.error(e);
                shared.transition(BridgeState::Disconnected);
                break;
            }
            SessionExit::Lost { reconnect } => {
                log::warn!("[Bridge] Connection lost");
                dispatcher.lost();
                backoff.reset();
                failures = 0;
                reconnect_attempt = 0;
                if !reconnect {
                    log::info!("[Bridge] Bridge asked not to reconnect");
                    shared.transition(BridgeState::Disconnected);
                    break;
                }
            }
            SessionExit::Failed(e) => {
                failures = failures.saturating_add(1);
                log::warn!("[Bridge] Connection attempt failed: {:#}", e);
                dispatcher.error(e);
            }
        }

        if let Some(max) = config.max_reconnect_attempts {
            if failures > max {
                dispatcher.error(anyhow::anyhow!(
                    "giving up after {} failed bridge connection attempts",
                    failures
                ));
                shared.transition(BridgeState::Disconnected);
                break;
            }
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        if !shared.transition(BridgeState::Reconnecting {
            attempt: reconnect_attempt,
        }) {
            break;
        }

        let delay = backoff.next_delay();
        log::info!("[Bridge] Reconnecting in {:?} (attempt {})", delay, reconnect_attempt);
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    log::info!("[Bridge] Connection loop exited");
}

/// Drives one WebSocket connection from handshake to close.
async fn run_session(
    subscribe: &str,
    writer: &mut WsWriter,
    reader: &mut WsReader,
    shared: &SharedState,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
) -> SessionExit {
    let welcomed = tokio::select! {
        () = cancel.cancelled() => return SessionExit::Shutdown,
        result = tokio::time::timeout(constants::WELCOME_TIMEOUT, wait_for_welcome(writer, reader)) => result,
    };
    match welcomed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return SessionExit::Failed(e),
        Err(_) => {
            return SessionExit::Failed(anyhow::anyhow!(
                "no welcome from bridge within {:?}",
                constants::WELCOME_TIMEOUT
            ))
        }
    }

    if let Err(e) = writer.send_text(subscribe).await {
        return SessionExit::Failed(e.context("failed to send subscribe"));
    }
    log::debug!("[Bridge] Sent subscribe");

    let mut confirmed = false;
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => {
                log::info!("[Bridge] Shutdown requested, closing connection");
                return SessionExit::Shutdown;
            }
            message = reader.next_inbound() => message,
        };

        match message {
            Some(Ok(Inbound::Text(text))) => {
                if let FrameOutcome::Exit(exit) =
                    handle_text(&text, &mut confirmed, shared, dispatcher)
                {
                    return exit;
                }
            }
            Some(Ok(Inbound::Binary(data))) => {
                dispatcher.management(&String::from_utf8_lossy(&data));
            }
            Some(Ok(Inbound::Ping(data))) => {
                if let Err(e) = writer.pong(data).await {
                    log::warn!("[Bridge] Failed to answer ping: {}", e);
                }
            }
            Some(Ok(Inbound::Closed { code, reason })) => {
                log::info!("[Bridge] Connection closed by bridge ({} {})", code, reason);
                return ended(confirmed, format!("closed by bridge with code {code}"));
            }
            Some(Err(e)) => {
                log::warn!("[Bridge] WebSocket error: {}", e);
                return ended(confirmed, format!("{e:#}"));
            }
            None => {
                log::info!("[Bridge] WebSocket stream ended");
                return ended(confirmed, "stream ended".to_string());
            }
        }
    }
}

fn ended(confirmed: bool, reason: String) -> SessionExit {
    if confirmed {
        SessionExit::Lost { reconnect: true }
    } else {
        SessionExit::Failed(anyhow::anyhow!(
            "bridge connection ended before the subscription was confirmed: {}",
            reason
        ))
    }
}

/// Waits for `welcome`, answering pings. Other frames are dropped.
async fn wait_for_welcome(writer: &mut WsWriter, reader: &mut WsReader) -> Result<()> {
    loop {
        match reader.next_inbound().await {
            Some(Ok(Inbound::Text(text))) => match protocol::parse_frame(&text) {
                Ok(InboundFrame::Welcome) => {
                    log::debug!("[Bridge] Received welcome");
                    return Ok(());
                }
                Ok(InboundFrame::Rejected { reason }) => {
                    return Err(rejection(reason));
                }
                Ok(_) | Err(_) => log::trace!("[Bridge] Ignoring frame before welcome"),
            },
            Some(Ok(Inbound::Ping(data))) => {
                writer.pong(data).await?;
            }
            Some(Ok(Inbound::Binary(_))) => {}
            Some(Ok(Inbound::Closed { code, .. })) => {
                anyhow::bail!("bridge closed the connection before welcome (code {code})");
            }
            Some(Err(e)) => return Err(e.context("error waiting for welcome")),
            None => anyhow::bail!("bridge stream ended before welcome"),
        }
    }
}

fn handle_text(
    text: &str,
    confirmed: &mut bool,
    shared: &SharedState,
    dispatcher: &Dispatcher,
) -> FrameOutcome {
    let frame = match protocol::parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            dispatcher.error(e);
            return FrameOutcome::Continue;
        }
    };

    match frame {
        InboundFrame::Welcome | InboundFrame::Ping => {}
        InboundFrame::Confirmed => {
            if !*confirmed {
                *confirmed = true;
                if shared.transition(BridgeState::Connected) {
                    log::info!("[Bridge] Subscription confirmed");
                }
                dispatcher.established();
            }
        }
        InboundFrame::Rejected { reason } => {
            return FrameOutcome::Exit(SessionExit::Refused(rejection(reason)));
        }
        InboundFrame::Disconnect { reason, reconnect } => {
            let reason = reason.unwrap_or_else(|| "unspecified".to_string());
            log::warn!(
                "[Bridge] Bridge requested disconnect: {} (reconnect: {})",
                reason,
                reconnect
            );
            let exit = if *confirmed {
                SessionExit::Lost { reconnect }
            } else if reconnect {
                SessionExit::Failed(anyhow::anyhow!("bridge disconnected: {reason}"))
            } else {
                SessionExit::Refused(anyhow::anyhow!("bridge disconnected: {reason}"))
            };
            return FrameOutcome::Exit(exit);
        }
        InboundFrame::Error { message } => {
            dispatcher.error(anyhow::Error::msg(message).context("bridge reported an error"));
        }
        InboundFrame::BusinessEvent(payload) => {
            if !*confirmed {
                log::debug!("[Bridge] Event arrived before subscription confirmation");
            }
            dispatcher.business_event(payload);
        }
        InboundFrame::Management(text) => dispatcher.management(&text),
    }
    FrameOutcome::Continue
}

fn rejection(reason: Option<String>) -> anyhow::Error {
    match reason {
        Some(reason) => anyhow::Error::msg(reason).context("bridge rejected the subscription"),
        None => anyhow::anyhow!("bridge rejected the subscription"),
    }
}
