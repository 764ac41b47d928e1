// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Manager-wide defaults.
//!
//! [`ManagerConfig`] holds the values the connection manager falls back on
//! when a caller does not supply them: sampling interval, queue size, session
//! timeout, subscription publishing parameters and the reconnection backoff
//! bounds.
//!
//! # Environment
//!
//! | Variable | Field | Unit |
//! |----------|-------|------|
//! | `OPCUA_MAX_RETRY` | `reconnect.max_retry_attempts` | count, 0 = unlimited |
//! | `OPCUA_PUBLISHING_INTERVAL` | `subscription.publishing_interval` | ms |
//! | `OPCUA_SAMPLING_INTERVAL` | `default_sampling_interval` | ms |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::types::{humantime_serde, MonitoredItemSettings, SubscriptionSettings};

/// Maximum retry count environment variable.
pub const ENV_MAX_RETRY: &str = "OPCUA_MAX_RETRY";

/// Publishing interval environment variable, in milliseconds.
pub const ENV_PUBLISHING_INTERVAL: &str = "OPCUA_PUBLISHING_INTERVAL";

/// Sampling interval environment variable, in milliseconds.
pub const ENV_SAMPLING_INTERVAL: &str = "OPCUA_SAMPLING_INTERVAL";

// =============================================================================
// ManagerConfig
// =============================================================================

/// Defaults and limits for the connection manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Application name announced to servers.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Sampling interval for items added without one.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub default_sampling_interval: Duration,

    /// Queue size for items added without one.
    #[serde(default = "default_queue_size")]
    pub default_queue_size: u32,

    /// Session timeout for connections created without one.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Default `maxResults` for browse.
    #[serde(default = "default_browse_max_results")]
    pub browse_max_results: usize,

    /// Default `maxResults` for search.
    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,

    /// Reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Subscription publishing parameters.
    #[serde(default)]
    pub subscription: SubscriptionSettings,
}

fn default_application_name() -> String {
    "loopmon".to_string()
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_queue_size() -> u32 {
    100
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_browse_max_results() -> usize {
    1000
}

fn default_search_max_results() -> usize {
    100
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            default_sampling_interval: default_sampling_interval(),
            default_queue_size: default_queue_size(),
            session_timeout: default_session_timeout(),
            browse_max_results: default_browse_max_results(),
            search_max_results: default_search_max_results(),
            reconnect: ReconnectSettings::default(),
            subscription: SubscriptionSettings::default(),
        }
    }
}

impl ManagerConfig {
    /// Defaults with the `OPCUA_*` environment overrides applied.
    pub fn from_env() -> OpcUaResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies the `OPCUA_*` environment overrides to this configuration.
    pub fn apply_env_overrides(&mut self) -> OpcUaResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> OpcUaResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = read(ENV_MAX_RETRY) {
            self.reconnect.max_retry_attempts = parse_number(ENV_MAX_RETRY, &raw)?;
        }
        if let Some(raw) = read(ENV_PUBLISHING_INTERVAL) {
            self.subscription.publishing_interval =
                Duration::from_millis(parse_number(ENV_PUBLISHING_INTERVAL, &raw)?);
        }
        if let Some(raw) = read(ENV_SAMPLING_INTERVAL) {
            self.default_sampling_interval =
                Duration::from_millis(parse_number(ENV_SAMPLING_INTERVAL, &raw)?);
        }

        self.validate()
    }

    /// Checks intervals and backoff bounds.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.application_name.trim().is_empty() {
            return Err(invalid("application_name", "must not be empty"));
        }
        if self.default_sampling_interval.is_zero() {
            return Err(invalid("default_sampling_interval", "must be greater than zero"));
        }
        if self.default_queue_size == 0 {
            return Err(invalid("default_queue_size", "must be greater than zero"));
        }
        if self.session_timeout.is_zero() {
            return Err(invalid("session_timeout", "must be greater than zero"));
        }
        if self.subscription.publishing_interval.is_zero() {
            return Err(invalid(
                "subscription.publishing_interval",
                "must be greater than zero",
            ));
        }
        self.reconnect.validate()
    }

    /// Resolved item settings for the configured defaults.
    pub fn default_item_settings(&self) -> MonitoredItemSettings {
        MonitoredItemSettings {
            sampling_interval: self.default_sampling_interval,
            queue_size: self.default_queue_size,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// ReconnectSettings
// =============================================================================

/// Exponential backoff bounds for the reconnection loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectSettings {
    /// Delay before the first attempt.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound on any delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Attempts before the loop gives up. 0 retries forever.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

fn default_base_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_max_retry_attempts() -> u32 {
    10
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

impl ReconnectSettings {
    /// Checks the backoff bounds.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.base_delay.is_zero() {
            return Err(invalid("reconnect.base_delay", "must be greater than zero"));
        }
        if self.base_delay > self.max_delay {
            return Err(invalid(
                "reconnect.base_delay",
                format!(
                    "({:?}) must not exceed reconnect.max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }
        Ok(())
    }
}

fn parse_number<T>(name: &str, raw: &str) -> OpcUaResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        OpcUaError::configuration(ConfigurationError::invalid_env_var(name, e.to_string()))
    })
}

fn invalid(field: &str, reason: impl Into<String>) -> OpcUaError {
    OpcUaError::configuration(ConfigurationError::invalid_value(field, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.default_sampling_interval, Duration::from_millis(200));
        assert_eq!(config.default_queue_size, 100);
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(300));
        assert_eq!(config.reconnect.max_retry_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ManagerConfig::default();
        config
            .apply_overrides_from(lookup(&[
                (ENV_MAX_RETRY, "3"),
                (ENV_PUBLISHING_INTERVAL, "500"),
                (ENV_SAMPLING_INTERVAL, " 50 "),
            ]))
            .unwrap();

        assert_eq!(config.reconnect.max_retry_attempts, 3);
        assert_eq!(config.subscription.publishing_interval, Duration::from_millis(500));
        assert_eq!(config.default_sampling_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_env_zero_retry_means_unlimited() {
        let mut config = ManagerConfig::default();
        config
            .apply_overrides_from(lookup(&[(ENV_MAX_RETRY, "0")]))
            .unwrap();
        assert_eq!(config.reconnect.max_retry_attempts, 0);
    }

    #[test]
    fn test_env_empty_is_ignored() {
        let mut config = ManagerConfig::default();
        config
            .apply_overrides_from(lookup(&[(ENV_MAX_RETRY, "")]))
            .unwrap();
        assert_eq!(config.reconnect.max_retry_attempts, 10);
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = ManagerConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[(ENV_SAMPLING_INTERVAL, "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_SAMPLING_INTERVAL));

        let err = config
            .apply_overrides_from(lookup(&[(ENV_SAMPLING_INTERVAL, "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("default_sampling_interval"));
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = ManagerConfig::default();
        config.reconnect.base_delay = Duration::from_secs(600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"default_sampling_interval":"1s","reconnect":{"base_delay":"2s","max_retry_attempts":0}}"#,
        )
        .unwrap();
        assert_eq!(config.default_sampling_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(300));
        assert_eq!(config.reconnect.max_retry_attempts, 0);
    }
}
