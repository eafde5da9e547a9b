//! Session-scoped proxy for the access-control service API.
//!
//! This module provides the [`ServiceProxy`] struct which handles all HTTP
//! communication with the service: authentication, the subscription
//! operations, and translation of error responses into [`ServiceFault`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::{ProxyError, ProxyResult, ServiceFault};
use super::types::{
    AddSubscriptionRequest, AuthenticationRequest, AuthenticationResponse, ErrorEnvelope,
    ModifySubscriptionRequest, SessionRequest, Subscription, SubscriptionSpec,
};
use crate::config::Config;
use crate::constants;

const AUTHENTICATION_PATH: &str = "authentication";
const SUBSCRIPTIONS_PATH: &str = "event_subscriptions";

/// Authenticated session state. Only `authenticate` creates one and only
/// `log_out` clears it.
#[derive(Debug, Clone)]
struct Session {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Proxy owning one HTTP session against the service.
///
/// Every request carries the `application_id` header. Once
/// [`authenticate`](Self::authenticate) succeeds, every request also carries
/// the `session_token` header.
#[derive(Debug)]
pub struct ServiceProxy {
    client: Client,
    base_url: Url,
    application_id: String,
    version: String,
    session: Option<Session>,
}

impl ServiceProxy {
    /// Creates a proxy for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be created.
    pub fn new(
        base_url: &str,
        application_id: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
        validate_tls: bool,
    ) -> ProxyResult<Self> {
        if !validate_tls {
            log::warn!("TLS certificate validation is disabled for {}", base_url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!validate_tls)
            .build()?;

        Ok(Self::with_client(
            client,
            parse_base_url(base_url)?,
            application_id,
            version,
        ))
    }

    /// Creates a proxy from the loaded configuration.
    pub fn from_config(config: &Config) -> ProxyResult<Self> {
        Self::new(
            &config.service_uri,
            config.application_id.clone(),
            config.api_version.clone(),
            config.request_timeout(),
            config.validate_tls,
        )
    }

    /// Creates a proxy with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(
        client: Client,
        base_url: Url,
        application_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: with_trailing_slash(base_url),
            application_id: application_id.into(),
            version: version.into(),
            session: None,
        }
    }

    /// Returns the base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the configured application id.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Returns the current session token, if authenticated.
    pub fn session_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    /// Returns when the current session token expires, if known.
    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().and_then(|s| s.expires_at)
    }

    /// Whether a session exists.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Authenticates and stores the returned session token.
    ///
    /// Replaces any previous session held by this proxy.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Fault`] when the service rejects the
    /// credentials, or a transport/decode error otherwise.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        directory_id: &str,
    ) -> ProxyResult<()> {
        let body = AuthenticationRequest {
            application_id: &self.application_id,
            version: &self.version,
            user_name: username,
            password,
            directory_id,
        };

        log::debug!("Authenticating {} against {}", username, self.base_url);

        let request = self.request(Method::POST, AUTHENTICATION_PATH)?.json(&body);
        let response: AuthenticationResponse =
            execute(request, "authentication response").await?;

        if let Some(expires_at) = response.token_expiration_time {
            log::info!("Authenticated as {} (token expires {})", username, expires_at);
        } else {
            log::info!("Authenticated as {}", username);
        }

        self.session = Some(Session {
            token: response.session_token,
            expires_at: response.token_expiration_time,
        });
        Ok(())
    }

    /// Ends the current session.
    ///
    /// The session is cleared only when the service accepts the request.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NotAuthenticated`] without sending anything if
    /// there is no session.
    pub async fn log_out(&mut self) -> ProxyResult<()> {
        let token = self.require_token()?;
        let body = SessionRequest {
            application_id: &self.application_id,
            version: &self.version,
            session_token: token,
        };

        let request = self.request(Method::DELETE, AUTHENTICATION_PATH)?.json(&body);
        execute_unit(request).await?;

        self.session = None;
        log::info!("Logged out");
        Ok(())
    }

    /// Creates a subscription from the client-settable fields of `spec`.
    ///
    /// Absent description and filter are sent as empty strings.
    pub async fn add_subscription(&self, spec: &SubscriptionSpec) -> ProxyResult<Subscription> {
        let token = self.require_token()?;
        let body = AddSubscriptionRequest {
            application_id: &self.application_id,
            version: &self.version,
            session_token: token,
            description: spec.description_or_empty(),
            filter: spec.filter_or_empty(),
            is_durable: spec.is_durable,
        };

        let request = self.request(Method::POST, SUBSCRIPTIONS_PATH)?.json(&body);
        let subscription: Subscription = execute(request, "subscription").await?;

        log::info!("Added subscription {}", subscription.id);
        Ok(subscription)
    }

    /// Updates description and filter of an existing subscription.
    ///
    /// Durability cannot change after creation; `spec.is_durable` is ignored.
    pub async fn modify_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> ProxyResult<Subscription> {
        let token = self.require_token()?;
        let id = require_id(spec, "modify_subscription")?;
        let body = ModifySubscriptionRequest {
            application_id: &self.application_id,
            version: &self.version,
            session_token: token,
            description: spec.description_or_empty(),
            filter: spec.filter_or_empty(),
        };

        let request = self
            .request(Method::PUT, &format!("{SUBSCRIPTIONS_PATH}/{id}"))?
            .json(&body);
        let subscription: Subscription = execute(request, "subscription").await?;

        log::info!("Modified subscription {}", subscription.id);
        Ok(subscription)
    }

    /// Disables an existing subscription.
    ///
    /// The returned subscription reflects the disabled state; its delivery
    /// coordinates must not be used afterwards.
    pub async fn disable_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> ProxyResult<Subscription> {
        let token = self.require_token()?;
        let id = require_id(spec, "disable_subscription")?;
        let body = SessionRequest {
            application_id: &self.application_id,
            version: &self.version,
            session_token: token,
        };

        let request = self
            .request(Method::DELETE, &format!("{SUBSCRIPTIONS_PATH}/{id}"))?
            .json(&body);
        let subscription: Subscription = execute(request, "subscription").await?;

        log::info!("Disabled subscription {}", subscription.id);
        Ok(subscription)
    }

    fn require_token(&self) -> ProxyResult<&str> {
        self.session_token().ok_or(ProxyError::NotAuthenticated)
    }

    /// Builds a request for `path` with the session headers attached.
    fn request(&self, method: Method, path: &str) -> ProxyResult<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|source| ProxyError::InvalidEndpoint {
                path: path.to_string(),
                source,
            })?;

        let mut request = self
            .client
            .request(method, url)
            .header(constants::APPLICATION_ID_HEADER, &self.application_id);
        if let Some(token) = self.session_token() {
            request = request.header(constants::SESSION_TOKEN_HEADER, token);
        }
        Ok(request)
    }
}

fn require_id(spec: &SubscriptionSpec, operation: &'static str) -> ProxyResult<i64> {
    if spec.id == 0 {
        return Err(ProxyError::MissingSubscriptionId { operation });
    }
    Ok(spec.id)
}

fn parse_base_url(base_url: &str) -> ProxyResult<Url> {
    Url::parse(base_url).map_err(|source| ProxyError::InvalidEndpoint {
        path: base_url.to_string(),
        source,
    })
}

/// Endpoint paths are joined relative to the base, which needs a trailing
/// slash to keep its last segment.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Sends `request` and returns the status and body of a 2xx response.
///
/// Non-2xx responses are translated into a [`ServiceFault`].
async fn send_checked(request: RequestBuilder) -> ProxyResult<(u16, String)> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok((status.as_u16(), body));
    }

    let envelope: ErrorEnvelope =
        serde_json::from_str(&body).map_err(|source| ProxyError::Decode {
            context: "error envelope",
            status: status.as_u16(),
            source,
        })?;

    log::debug!(
        "Service returned {}: {} - {}",
        status,
        envelope.error.code,
        envelope.error.message
    );

    Err(ServiceFault {
        code: envelope.error.code,
        message: envelope.error.message,
    }
    .into())
}

async fn execute<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &'static str,
) -> ProxyResult<T> {
    let (status, body) = send_checked(request).await?;
    serde_json::from_str(&body).map_err(|source| ProxyError::Decode {
        context,
        status,
        source,
    })
}

async fn execute_unit(request: RequestBuilder) -> ProxyResult<()> {
    send_checked(request).await.map(|_| ())
}
