//! Subscription lifecycle orchestration.
//!
//! One run is one session: authenticate, provision the subscription, listen
//! on the bridge until the stop token is cancelled, log out. Log out is
//! attempted whenever a session was established, even after a failure or an
//! early stop. In-flight service calls are allowed to finish; the token is
//! checked between steps.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::bridge::{BridgeConfig, NotificationBridge};
use crate::cli::Mode;
use crate::config::Config;
use crate::handler::EventHandler;
use crate::server::{
    DeliveryCoordinates, ProxyError, ServiceProxy, Subscription, SubscriptionSpec,
};

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Subscription as last returned by the service.
    pub subscription: Subscription,
    /// Whether the notification bridge was opened.
    pub listened: bool,
}

/// Runs the full lifecycle against the configured service.
///
/// Cancelling `stop` before provisioning ends the run after log out.
/// Cancelling it later closes the bridge.
///
/// # Errors
///
/// Returns the first failure of authentication or provisioning, or a stop
/// that arrived before provisioning. A failed log out is returned only when
/// everything before it succeeded.
pub async fn run(
    config: &Config,
    mode: Mode,
    handler: Arc<dyn EventHandler>,
    stop: CancellationToken,
) -> Result<RunOutcome> {
    let mut proxy = ServiceProxy::from_config(config).context("failed to create service proxy")?;
    run_with_proxy(&mut proxy, config, mode, handler, stop).await
}

/// Same as [`run`] with a caller-supplied proxy.
///
/// # Errors
///
/// See [`run`].
pub async fn run_with_proxy(
    proxy: &mut ServiceProxy,
    config: &Config,
    mode: Mode,
    handler: Arc<dyn EventHandler>,
    stop: CancellationToken,
) -> Result<RunOutcome> {
    proxy
        .authenticate(&config.username, &config.password, &config.directory_id)
        .await
        .context("authentication failed")?;

    let result = if stop.is_cancelled() {
        log::info!("Stop requested before provisioning");
        Err(anyhow::anyhow!("stopped before the subscription was provisioned"))
    } else {
        provision_and_listen(proxy, config, mode, handler, &stop).await
    };
    let logged_out = proxy.log_out().await;

    match (result, logged_out) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => Err(anyhow::Error::new(e).context("log out failed")),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(logout_err)) => {
            log::warn!("Log out after failed run also failed: {}", logout_err);
            Err(e)
        }
    }
}

async fn provision_and_listen(
    proxy: &ServiceProxy,
    config: &Config,
    mode: Mode,
    handler: Arc<dyn EventHandler>,
    stop: &CancellationToken,
) -> Result<RunOutcome> {
    let defaults = &config.subscription;
    let subscription = match mode {
        Mode::Add => {
            let spec = SubscriptionSpec::new(
                defaults.description.clone(),
                defaults.filter.clone(),
                defaults.is_durable,
            );
            proxy
                .add_subscription(&spec)
                .await
                .context("failed to add subscription")?
        }
        Mode::Modify { id } => {
            let spec = SubscriptionSpec {
                id,
                ..SubscriptionSpec::new(
                    defaults.description.clone(),
                    defaults.filter.clone(),
                    defaults.is_durable,
                )
            };
            proxy
                .modify_subscription(&spec)
                .await
                .with_context(|| format!("failed to modify subscription {id}"))?
        }
        Mode::Disable { id } => proxy
            .disable_subscription(&SubscriptionSpec::existing(id))
            .await
            .with_context(|| format!("failed to disable subscription {id}"))?,
    };

    let coordinates = listen_target(mode, &subscription, stop);
    handler.subscription_ready(&subscription, coordinates.is_some());

    let Some(coordinates) = coordinates else {
        return Ok(RunOutcome {
            subscription,
            listened: false,
        });
    };

    let token = proxy.session_token().ok_or(ProxyError::NotAuthenticated)?;
    let mut bridge = NotificationBridge::new(
        BridgeConfig::from_parts(config, token, coordinates),
        handler,
    );

    bridge.start_receiving();
    stop.cancelled().await;

    bridge.stop_receiving();
    bridge.wait_closed().await;

    Ok(RunOutcome {
        subscription,
        listened: true,
    })
}

/// Where to listen for `subscription`, or `None` when this run should not.
fn listen_target(
    mode: Mode,
    subscription: &Subscription,
    stop: &CancellationToken,
) -> Option<DeliveryCoordinates> {
    if !mode.listens() {
        log::info!("Subscription {} disabled, not listening", subscription.id);
        return None;
    }
    let Some(coordinates) = subscription.delivery_coordinates() else {
        log::warn!(
            "Subscription {} has no delivery coordinates, not listening",
            subscription.id
        );
        return None;
    };
    if stop.is_cancelled() {
        log::info!("Stop requested, not listening on subscription {}", subscription.id);
        return None;
    }
    Some(coordinates)
}
