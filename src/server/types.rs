//! Wire message types for the access-control service API.
//!
//! Request bodies always carry `application_id` and `version`; once a
//! session exists they also carry `session_token`. Responses are parsed
//! into [`Subscription`] or [`AuthenticationResponse`], and failures into
//! [`ErrorEnvelope`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST authentication`.
#[derive(Serialize)]
pub struct AuthenticationRequest<'a> {
    /// Configured application id.
    pub application_id: &'a str,
    /// API version.
    pub version: &'a str,
    /// Login name.
    pub user_name: &'a str,
    /// Login password. Never printed.
    pub password: &'a str,
    /// Directory the user belongs to.
    pub directory_id: &'a str,
}

impl fmt::Debug for AuthenticationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRequest")
            .field("application_id", &self.application_id)
            .field("version", &self.version)
            .field("user_name", &self.user_name)
            .field("directory_id", &self.directory_id)
            .finish_non_exhaustive()
    }
}

/// Response of `POST authentication`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticationResponse {
    /// Opaque credential required on every later call.
    pub session_token: String,
    /// When the token stops being accepted, if the server says.
    #[serde(default)]
    pub token_expiration_time: Option<DateTime<Utc>>,
}

/// Body of `DELETE authentication` and `DELETE event_subscriptions/{id}`.
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    /// Configured application id.
    pub application_id: &'a str,
    /// API version.
    pub version: &'a str,
    /// Current session token.
    pub session_token: &'a str,
}

/// Body of `POST event_subscriptions`.
#[derive(Debug, Serialize)]
pub struct AddSubscriptionRequest<'a> {
    /// Configured application id.
    pub application_id: &'a str,
    /// API version.
    pub version: &'a str,
    /// Current session token.
    pub session_token: &'a str,
    /// Description, `""` when unset.
    pub description: &'a str,
    /// Filter expression, `""` when unset.
    pub filter: &'a str,
    /// Durability, fixed from here on.
    pub is_durable: bool,
}

/// Body of `PUT event_subscriptions/{id}`.
///
/// Durability is fixed at creation, so there is no field for it here.
#[derive(Debug, Serialize)]
pub struct ModifySubscriptionRequest<'a> {
    /// Configured application id.
    pub application_id: &'a str,
    /// API version.
    pub version: &'a str,
    /// Current session token.
    pub session_token: &'a str,
    /// New description, `""` when unset.
    pub description: &'a str,
    /// New filter expression, `""` when unset.
    pub filter: &'a str,
}

/// Client-settable subscription fields.
///
/// `id == 0` means the subscription has not been created yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Server id, 0 when not yet created.
    pub id: i64,
    /// Human description; sent as `""` when absent.
    pub description: Option<String>,
    /// Filter expression in the server's grammar; sent as `""` when absent.
    pub filter: Option<String>,
    /// Whether the server keeps the queue across disconnects.
    pub is_durable: bool,
}

impl SubscriptionSpec {
    /// Fields for a subscription that does not exist yet.
    pub fn new(
        description: Option<String>,
        filter: Option<String>,
        is_durable: bool,
    ) -> Self {
        Self {
            id: 0,
            description,
            filter,
            is_durable,
        }
    }

    /// Refers to an existing subscription by id.
    pub fn existing(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub(crate) fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub(crate) fn filter_or_empty(&self) -> &str {
        self.filter.as_deref().unwrap_or_default()
    }
}

/// A subscription as last reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    /// Server-assigned id.
    pub id: i64,
    /// Owning user, assigned by the server.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Filter expression.
    #[serde(default)]
    pub filter: String,
    /// Whether the queue survives disconnects.
    #[serde(default)]
    pub is_durable: bool,
    /// Set once the subscription has been disabled.
    #[serde(default)]
    pub is_disabled: bool,
    /// Broker queue name.
    #[serde(default)]
    pub queue_name: Option<String>,
    /// Broker exchange name.
    #[serde(default)]
    pub exchange_name: Option<String>,
    /// Binding (routing) key on the exchange.
    #[serde(default, alias = "routing_key")]
    pub binding_key: Option<String>,
    /// Broker hostname.
    #[serde(default)]
    pub host_name: Option<String>,
    /// Broker port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Whether the broker requires TLS.
    #[serde(default)]
    pub use_ssl: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Where the broker publishes notifications for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
#[expect(missing_docs, reason = "mirrors the Subscription fields of the same name")]
pub struct DeliveryCoordinates {
    pub queue_name: String,
    pub exchange_name: String,
    pub binding_key: String,
    pub host_name: String,
    pub port: Option<u16>,
    pub use_ssl: bool,
}

impl Subscription {
    /// Delivery coordinates, or `None` if disabled or not fully provisioned.
    ///
    /// A missing binding key is treated as the empty key.
    pub fn delivery_coordinates(&self) -> Option<DeliveryCoordinates> {
        if self.is_disabled {
            return None;
        }

        Some(DeliveryCoordinates {
            queue_name: non_empty(self.queue_name.as_deref())?,
            exchange_name: non_empty(self.exchange_name.as_deref())?,
            binding_key: self.binding_key.clone().unwrap_or_default(),
            host_name: non_empty(self.host_name.as_deref())?,
            port: self.port,
            use_ssl: self.use_ssl,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subscription {}", self.id)?;
        writeln!(f, "  description: {}", self.description)?;
        writeln!(f, "  filter:      {}", self.filter)?;
        writeln!(f, "  durable:     {}", self.is_durable)?;
        if self.is_disabled {
            return write!(f, "  state:       disabled");
        }
        writeln!(
            f,
            "  queue:       {}",
            self.queue_name.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "  exchange:    {}",
            self.exchange_name.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "  binding key: {}",
            self.binding_key.as_deref().unwrap_or("-")
        )?;
        let host = self.host_name.as_deref().unwrap_or("-");
        match self.port {
            Some(port) => write!(f, "  broker:      {host}:{port} (ssl: {})", self.use_ssl),
            None => write!(f, "  broker:      {host} (ssl: {})", self.use_ssl),
        }
    }
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    /// The fault details.
    pub error: ErrorBody,
}

/// Inner `error` object of an [`ErrorEnvelope`].
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}
