// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for loopmon.
//!
//! # Schema Structure
//!
//! ```text
//! LoopmonConfig
//! ├── opcua: ManagerConfig        (core defaults, backoff, subscription)
//! ├── servers: Vec<ServerConfig>
//! │   └── tags: Vec<TagConfig>
//! ├── transport: TransportConfig
//! ├── sink: SinkConfig
//! └── logging: LoggingConfig
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use loopmon_opcua::types::humantime_serde;
use loopmon_opcua::{
    ConnectionOptions, ManagerConfig, MonitoringOptions, NodeId, SecurityMode, SecurityPolicy,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// The only endpoint scheme the client speaks.
pub const OPC_TCP_SCHEME: &str = "opc.tcp://";

/// Default capacity of the stdout sink channel.
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for loopmon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopmonConfig {
    /// Core manager settings.
    #[serde(default)]
    pub opcua: ManagerConfig,

    /// Servers to connect to on `run`.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Client-side transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Where data change samples go.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoopmonConfig {
    /// Validates the entire configuration.
    ///
    /// Checks the core section, every server, and that no two servers share
    /// an endpoint (they would map onto the same connection id).
    pub fn validate(&self) -> ConfigResult<()> {
        self.opcua.validate()?;

        let mut endpoints = HashSet::new();
        for (index, server) in self.servers.iter().enumerate() {
            server.validate(index)?;
            if !endpoints.insert(server.endpoint_url.trim()) {
                return Err(ConfigError::duplicate_endpoint(server.endpoint_url.trim()));
            }
        }

        self.transport.validate()?;
        self.sink.validate()?;
        Ok(())
    }

    /// Returns a server configuration by name.
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Total number of configured tags across all servers.
    pub fn tag_count(&self) -> usize {
        self.servers.iter().map(|s| s.tags.len()).sum()
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// One OPC UA server and the tags to monitor on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Human-readable name used in logs.
    pub name: String,

    /// Endpoint URL (`opc.tcp://host:port[/path]`).
    pub endpoint_url: String,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Username; anonymous when unset.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `username`.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Per-server session timeout override.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub session_timeout: Option<Duration>,

    /// Tags to monitor once connected.
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

impl ServerConfig {
    /// Validates the server at position `index` in the server list.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        let field = |name: &str| format!("servers[{}].{}", index, name);

        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(field("name"), "cannot be empty"));
        }

        let endpoint = self.endpoint_url.trim();
        if !endpoint.starts_with(OPC_TCP_SCHEME) {
            return Err(ConfigError::validation(
                field("endpoint_url"),
                format!("'{}' must start with {}", endpoint, OPC_TCP_SCHEME),
            ));
        }
        if endpoint.len() == OPC_TCP_SCHEME.len() {
            return Err(ConfigError::validation(field("endpoint_url"), "missing host"));
        }

        match (&self.username, &self.password) {
            (Some(_), None) => {
                return Err(ConfigError::validation(
                    field("password"),
                    "required when username is set",
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::validation(
                    field("username"),
                    "required when password is set",
                ))
            }
            _ => {}
        }

        if matches!(self.session_timeout, Some(d) if d.is_zero()) {
            return Err(ConfigError::validation(
                field("session_timeout"),
                "must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for (tag_index, tag) in self.tags.iter().enumerate() {
            let tag_field = |name: &str| format!("{}[{}].{}", field("tags"), tag_index, name);
            let node_id = tag
                .parse_node_id()
                .map_err(|e| ConfigError::validation(tag_field("node_id"), e.to_string()))?;
            if !seen.insert(node_id) {
                return Err(ConfigError::duplicate_tag(&self.name, tag.node_id.trim()));
            }
            if tag.queue_size == Some(0) {
                return Err(ConfigError::validation(
                    tag_field("queue_size"),
                    "must be greater than zero",
                ));
            }
        }

        Ok(())
    }

    /// Connection options for the core registry.
    pub fn connection_options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::new(self.security_mode, self.security_policy);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options = options.with_credentials(username, password);
        }
        if let Some(timeout) = self.session_timeout {
            options = options.with_session_timeout(timeout);
        }
        options
    }
}

// =============================================================================
// Tag Configuration
// =============================================================================

/// A node to monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagConfig {
    /// Node id in `ns=<n>;{i,s,g,b}=<v>` form or a well-known alias.
    pub node_id: String,

    /// Sampling interval; the manager default when unset.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub sampling_interval: Option<Duration>,

    /// Server-side queue size; the manager default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
}

impl TagConfig {
    /// Parses the node id.
    pub fn parse_node_id(&self) -> Result<NodeId, loopmon_opcua::OpcUaError> {
        self.node_id.parse()
    }

    /// Monitoring options for the core registry.
    pub fn monitoring_options(&self) -> MonitoringOptions {
        MonitoringOptions {
            sampling_interval: self.sampling_interval,
            queue_size: self.queue_size,
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Settings for the client stack itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Client certificate store. The client stack's default when unset.
    #[serde(default)]
    pub pki_dir: Option<PathBuf>,

    /// Accept server certificates without a trust decision.
    #[serde(default)]
    pub trust_server_certs: bool,
}

impl TransportConfig {
    /// Validates the transport configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(dir) = &self.pki_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::validation("transport.pki_dir", "must not be empty"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Sink Configuration
// =============================================================================

/// Data sink selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Sink kind.
    #[serde(default)]
    pub kind: SinkKind,

    /// Channel capacity for buffered sinks.
    #[serde(default = "default_sink_capacity")]
    pub capacity: usize,
}

fn default_sink_capacity() -> usize {
    DEFAULT_SINK_CAPACITY
}

impl SinkConfig {
    /// Validates the sink configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.kind == SinkKind::Stdout && self.capacity == 0 {
            return Err(ConfigError::validation(
                "sink.capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

/// Where samples are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One structured log event per sample.
    #[default]
    Tracing,
    /// One JSON line per sample on stdout.
    Stdout,
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON lines for log aggregation.
    Json,
    /// Compact single-line output.
    Compact,
}
