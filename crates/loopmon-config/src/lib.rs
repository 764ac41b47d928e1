// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # loopmon-config
//!
//! Configuration files for the loopmon OPC UA connection manager.
//!
//! ## Quick Start
//!
//! ```no_run
//! use loopmon_config::loader::load_config;
//!
//! let config = load_config("loopmon.yaml").unwrap();
//!
//! println!("Servers: {}", config.servers.len());
//! println!("Tags: {}", config.tag_count());
//! ```
//!
//! ## Configuration Schema
//!
//! - `opcua` - core manager defaults (sampling, queue size, backoff, subscription)
//! - `servers` - endpoints, security and the tags to monitor on each
//! - `transport` - client certificate store and server trust
//! - `sink` - where data change samples go
//! - `logging` - log level and format
//!
//! ```yaml
//! opcua:
//!   reconnect:
//!     base_delay: 5s
//!     max_retry_attempts: 10
//! servers:
//!   - name: plc-1
//!     endpoint_url: "opc.tcp://${PLC1_HOST:localhost}:4840"
//!     security_mode: None
//!     security_policy: None
//!     tags:
//!       - node_id: "ns=2;s=Line1.Temperature"
//!         sampling_interval: 100ms
//! ```
//!
//! ## Environment Variables
//!
//! ```text
//! LOOPMON_LOG_LEVEL=debug
//! LOOPMON_LOG_FORMAT=json
//! LOOPMON_SINK=stdout
//! OPCUA_MAX_RETRY=0              # 0 retries forever
//! OPCUA_PUBLISHING_INTERVAL=1000 # milliseconds
//! OPCUA_SAMPLING_INTERVAL=200    # milliseconds
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{
    LogFormat, LogLevel, LoggingConfig, LoopmonConfig, ServerConfig, SinkConfig, SinkKind,
    TagConfig, TransportConfig,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::{LoopmonConfig, ServerConfig, TagConfig};
}
