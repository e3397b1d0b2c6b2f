//! Signaling service configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! embed credentials and is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default signaling (WebSocket) bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default number of pending appointments pushed to a staff member on connect.
pub const DEFAULT_PENDING_APPOINTMENTS_LIMIT: usize = 5;

/// Default idle period after which a call actor is released.
pub const DEFAULT_CALL_IDLE_TIMEOUT_SECONDS: u64 = 300;

/// Default outbound mailbox size per connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sig";

/// Signaling service configuration.
#[derive(Clone)]
pub struct Config {
    /// Signaling server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Redis connection URL for the call record store.
    /// `None` selects the in-process store.
    pub redis_url: Option<SecretString>,

    /// Unique identifier for this instance.
    pub instance_id: String,

    /// Maximum pending appointments replayed to a staff socket on connect.
    pub pending_appointments_limit: usize,

    /// Idle period before a call actor is released (seconds).
    pub call_idle_timeout_seconds: u64,

    /// Outbound mailbox capacity per connection.
    pub connection_buffer: usize,

    /// Emit JSON-formatted logs.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("instance_id", &self.instance_id)
            .field(
                "pending_appointments_limit",
                &self.pending_appointments_limit,
            )
            .field("call_idle_timeout_seconds", &self.call_idle_timeout_seconds)
            .field("connection_buffer", &self.connection_buffer)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIGNALING_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SIGNALING_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.clone()));

        let pending_appointments_limit = parse_positive(
            vars,
            "SIGNALING_PENDING_APPOINTMENTS_LIMIT",
            DEFAULT_PENDING_APPOINTMENTS_LIMIT,
        )?;

        let call_idle_timeout_seconds = parse_positive(
            vars,
            "SIGNALING_CALL_IDLE_TIMEOUT_SECONDS",
            DEFAULT_CALL_IDLE_TIMEOUT_SECONDS,
        )?;

        let connection_buffer =
            parse_positive(vars, "SIGNALING_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;

        let log_json = vars
            .get("SIGNALING_LOG_JSON")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"));

        // Generate instance ID
        let instance_id = vars.get("SIGNALING_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            redis_url,
            instance_id,
            pending_appointments_limit,
            call_idle_timeout_seconds,
            connection_buffer,
            log_json,
        })
    }

    /// Idle period before a call actor is released.
    #[must_use]
    pub fn call_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.call_idle_timeout_seconds)
    }
}

/// Parse an optional numeric variable that must be greater than zero.
///
/// Absent values fall back to the default; present but unparsable or zero
/// values are rejected.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => {
            let value: T = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{key} must be a number")))?;
            if value <= T::default() {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be greater than zero"
                )));
            }
            Ok(value)
        }
    }
}
