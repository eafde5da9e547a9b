//! Configuration loading.
//!
//! Settings come from a JSON file, then environment variable overrides.
//! The password is never serialized and is wiped from memory on drop.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::constants;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`Config`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A setting has an unusable value.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why it is rejected.
        reason: String,
    },
}

/// How received events are reported.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Print to stdout/stderr.
    #[default]
    Console,
    /// Send through the `log` facade.
    Log,
}

/// Defaults used when creating a subscription.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriptionDefaults {
    /// Description sent on add/modify.
    pub description: Option<String>,
    /// Filter expression sent on add/modify.
    pub filter: Option<String>,
    /// Durability requested on add.
    pub is_durable: bool,
}

/// Configuration for the accessfeed client.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Base URI of the service REST API.
    pub service_uri: String,
    /// URI of the push-notification bridge endpoint.
    pub bridge_uri: String,
    /// Application id sent with every call.
    pub application_id: String,
    /// API version sent with every call.
    pub api_version: String,
    /// Login name.
    pub username: String,
    /// Login password - NOT serialized to disk output.
    #[serde(skip_serializing)]
    pub password: Zeroizing<String>,
    /// Directory the user authenticates against.
    pub directory_id: String,
    /// Subscription fields used for add/modify.
    pub subscription: SubscriptionDefaults,
    /// Whether TLS certificates are validated.
    pub validate_tls: bool,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Consecutive failed bridge connections tolerated before giving up.
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Default log filter (overridden by `RUST_LOG`).
    pub log_level: String,
    /// Where received events go.
    pub output: OutputMode,
    /// Wait for Enter before exiting when attached to a terminal.
    pub pause_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_uri: "https://localhost/api/".to_string(),
            bridge_uri: "wss://localhost/bridge".to_string(),
            application_id: String::new(),
            api_version: constants::API_VERSION.to_string(),
            username: String::new(),
            password: Zeroizing::new(String::new()),
            directory_id: String::new(),
            subscription: SubscriptionDefaults::default(),
            validate_tls: true,
            request_timeout_secs: constants::HTTP_REQUEST_TIMEOUT.as_secs(),
            max_reconnect_attempts: None,
            log_level: "info".to_string(),
            output: OutputMode::Console,
            pause_on_exit: true,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("service_uri", &self.service_uri)
            .field("bridge_uri", &self.bridge_uri)
            .field("application_id", &self.application_id)
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("directory_id", &self.directory_id)
            .field("subscription", &self.subscription)
            .field("validate_tls", &self.validate_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("log_level", &self.log_level)
            .field("output", &self.output)
            .field("pause_on_exit", &self.pause_on_exit)
            .finish()
    }
}

impl Config {
    /// Returns the default config file path.
    ///
    /// Priority:
    /// 1. `ACCESSFEED_CONFIG` env var: explicit file path
    /// 2. Platform config dir: `<config_dir>/accessfeed/config.json`
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ACCESSFEED_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("accessfeed").join("config.json"))
    }

    /// Loads configuration from the default path, with environment variable
    /// overrides, and validates it.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            Some(path) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file without applying overrides.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var("ACCESSFEED_SERVICE_URI") {
            self.service_uri = uri;
        }

        if let Ok(uri) = std::env::var("ACCESSFEED_BRIDGE_URI") {
            self.bridge_uri = uri;
        }

        if let Ok(application_id) = std::env::var("ACCESSFEED_APPLICATION_ID") {
            self.application_id = application_id;
        }

        if let Ok(username) = std::env::var("ACCESSFEED_USERNAME") {
            self.username = username;
        }

        // Password from env var (for CI/CD)
        if let Ok(password) = std::env::var("ACCESSFEED_PASSWORD") {
            self.password = Zeroizing::new(password);
        }

        if let Ok(directory_id) = std::env::var("ACCESSFEED_DIRECTORY_ID") {
            self.directory_id = directory_id;
        }

        if let Ok(level) = std::env::var("ACCESSFEED_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Checks the settings needed before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.service_uri).map_err(|e| ConfigError::Invalid {
            field: "service_uri",
            reason: e.to_string(),
        })?;

        if self.application_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "application_id",
                reason: "must not be empty".to_string(),
            });
        }

        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "username",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// HTTP request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
