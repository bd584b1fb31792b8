//! Configuration for the AMI layer
//!
//! ## Examples
//!
//! ```rust
//! use std::time::Duration;
//! use ami_core::config::AmiConfig;
//!
//! let config = AmiConfig::default()
//!     .with_response_timeout(Some(Duration::from_secs(10)))
//!     .with_transfer_context("from-internal-xfer");
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AmiError, AmiResult};

/// Default time a command may stay pending before it is failed
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default period between sweeps for overdue registrations
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// Default capacity of the inbound connection event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// Dialplan context used by transfer commands
pub const DEFAULT_TRANSFER_CONTEXT: &str = "from-internal";

/// Settings shared by the command executor, the registry and the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiConfig {
    /// Deadline applied to each pending command, `None` waits forever
    #[serde(with = "duration_secs_opt")]
    pub response_timeout: Option<Duration>,

    /// How often the reaper sweeps for overdue registrations
    #[serde(with = "duration_secs")]
    pub reaper_interval: Duration,

    /// Capacity of the channel feeding frames into the dispatcher
    pub event_channel_capacity: usize,

    /// Prefix for generated action IDs, random when unset
    pub action_id_prefix: Option<String>,

    /// Dialplan context for transfers
    pub transfer_context: String,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            action_id_prefix: None,
            transfer_context: DEFAULT_TRANSFER_CONTEXT.to_string(),
        }
    }
}

impl AmiConfig {
    /// Load a configuration from a JSON document, missing fields take defaults
    pub fn from_json(json: &str) -> AmiResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AmiError::Config(format!("Invalid AMI configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the per-command response deadline
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the reaper sweep period
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Set the inbound channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set a fixed action ID prefix
    pub fn with_action_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.action_id_prefix = Some(prefix.into());
        self
    }

    /// Set the dialplan context used by transfers
    pub fn with_transfer_context(mut self, context: impl Into<String>) -> Self {
        self.transfer_context = context.into();
        self
    }

    /// Check the configuration for unusable values
    pub fn validate(&self) -> AmiResult<()> {
        if self.response_timeout == Some(Duration::ZERO) {
            return Err(AmiError::Config("response_timeout must be greater than zero".into()));
        }
        if self.reaper_interval.is_zero() {
            return Err(AmiError::Config("reaper_interval must be greater than zero".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(AmiError::Config("event_channel_capacity must be greater than zero".into()));
        }
        if self.transfer_context.trim().is_empty() {
            return Err(AmiError::Config("transfer_context must not be empty".into()));
        }
        if let Some(prefix) = &self.action_id_prefix {
            if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
                return Err(AmiError::Config(format!("Invalid action_id_prefix: {:?}", prefix)));
            }
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_secs_opt {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
