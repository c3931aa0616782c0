//! Configuration types for the DataSource layer
//!
//! This module defines all configuration structures used throughout the crate.
//! Configuration is supplied once at process start and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::MessageType;

/// Option key adapters read their HTTP timeout from
pub const TIMEOUT_OPTION: &str = "timeout_secs";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Configured provider instances
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Outbound dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl DataSourceConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.id.as_str()) {
                return Err(Error::config(format!(
                    "Provider configured twice: {}",
                    provider.id
                )));
            }
        }

        self.dispatch.validate()?;

        for (message_type, id) in &self.dispatch.active {
            let enabled = self
                .providers
                .iter()
                .any(|provider| provider.id == *id && provider.enabled);
            if !enabled {
                return Err(Error::config(format!(
                    "Active {} provider '{}' is not configured or disabled",
                    message_type, id
                )));
            }
        }

        Ok(())
    }
}

/// Credential/option bundle for one provider instance
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider id (matches the registered factory name, e.g. "nexmo")
    pub id: String,

    /// Whether this provider is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Provider options (API keys, secrets, sender numbers)
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

// Option values are credentials; only keys are shown
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new enabled provider configuration
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            options: BTreeMap::new(),
        }
    }

    /// Set an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Enable or disable the provider
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Get a non-blank option value
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|value| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// Get a non-blank option value or fail with a configuration error
    pub fn require(&self, key: &str) -> Result<&str> {
        self.option(key)
            .ok_or_else(|| Error::config(format!("{}: option '{}' is required", self.id, key)))
    }

    /// HTTP timeout for this provider
    ///
    /// Read from the `timeout_secs` option, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Result<Duration> {
        match self.option(TIMEOUT_OPTION) {
            None => Ok(default),
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    Error::config(format!(
                        "{}: {} must be a positive integer, got '{}'",
                        self.id, TIMEOUT_OPTION, raw
                    ))
                })?;
                if secs == 0 {
                    return Err(Error::config(format!(
                        "{}: {} must be > 0",
                        self.id, TIMEOUT_OPTION
                    )));
                }
                Ok(Duration::from_secs(secs))
            }
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("Provider id cannot be empty"));
        }
        if self.id != self.id.to_lowercase() {
            return Err(Error::config(format!(
                "Provider id must be lowercase: {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Outbound dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Authoritative provider id per channel
    #[serde(default)]
    pub active: BTreeMap<MessageType, String>,

    /// Upper bound for a single send, in seconds
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Maximum number of pending messages handled per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between outbound batches (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Capacity of the dispatcher event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl DispatchConfig {
    /// Set the active provider for a channel
    pub fn with_active(mut self, message_type: MessageType, id: impl Into<String>) -> Self {
        self.active.insert(message_type, id.into());
        self
    }

    /// Send timeout as a `Duration`
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Validate the dispatch configuration
    pub fn validate(&self) -> Result<()> {
        if self.send_timeout_secs == 0 {
            return Err(Error::config("send_timeout_secs must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            active: BTreeMap::new(),
            send_timeout_secs: default_send_timeout_secs(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}
