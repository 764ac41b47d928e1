// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for loopmon-config.
//!
//! Errors raised while reading, parsing, resolving and validating a
//! configuration file. Core-level validation failures (`ManagerConfig`) are
//! wrapped so that a caller only ever deals with [`ConfigError`].

use std::path::PathBuf;

use loopmon_opcua::OpcUaError;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be parsed in its declared format.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A field holds a value that is syntactically fine but not acceptable.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Two servers share an endpoint URL.
    #[error("Duplicate server endpoint: {endpoint_url}")]
    DuplicateEndpoint {
        /// The repeated endpoint.
        endpoint_url: String,
    },

    /// A tag node id appears twice on one server.
    #[error("Duplicate tag '{node_id}' on server '{server}'")]
    DuplicateTag {
        /// Server name.
        server: String,
        /// The repeated node id.
        node_id: String,
    },

    /// A `${VAR}` placeholder references an unset variable with no default.
    #[error("Environment variable not found: {name}")]
    EnvVarNotFound {
        /// Variable name.
        name: String,
    },

    /// An environment override could not be parsed.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Parse message.
        message: String,
    },

    /// The configuration file does not exist.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file extension names no supported format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The rejected extension or format name.
        format: String,
    },

    /// The configuration could not be serialized.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Serializer message.
        message: String,
    },

    /// The `opcua` section was rejected by the core.
    #[error("Invalid opcua section: {0}")]
    Manager(#[source] OpcUaError),
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a duplicate endpoint error.
    pub fn duplicate_endpoint(endpoint_url: impl Into<String>) -> Self {
        Self::DuplicateEndpoint {
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Creates a duplicate tag error.
    pub fn duplicate_tag(server: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::DuplicateTag {
            server: server.into(),
            node_id: node_id.into(),
        }
    }

    /// Creates an env var not found error.
    pub fn env_var_not_found(name: impl Into<String>) -> Self {
        Self::EnvVarNotFound { name: name.into() }
    }

    /// Creates an invalid env var error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if the error came from validation rather than I/O or parsing.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Validation { .. }
                | ConfigError::DuplicateEndpoint { .. }
                | ConfigError::DuplicateTag { .. }
                | ConfigError::Manager(_)
        )
    }

    /// Returns `true` if the file was missing or unreadable.
    pub fn is_io_error(&self) -> bool {
        matches!(self, ConfigError::Io { .. } | ConfigError::FileNotFound { .. })
    }
}

impl From<OpcUaError> for ConfigError {
    fn from(err: OpcUaError) -> Self {
        ConfigError::Manager(err)
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::validation("servers[0].endpoint_url", "must use opc.tcp://");
        assert_eq!(
            err.to_string(),
            "Validation failed for 'servers[0].endpoint_url': must use opc.tcp://"
        );

        let err = ConfigError::duplicate_tag("plc-1", "ns=2;s=Temp");
        assert!(err.to_string().contains("plc-1"));
        assert!(err.to_string().contains("ns=2;s=Temp"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ConfigError::duplicate_endpoint("opc.tcp://a:4840").is_validation_error());
        assert!(ConfigError::file_not_found("/missing.yaml").is_io_error());
        assert!(!ConfigError::parse("x.yaml", "bad").is_validation_error());
    }

    #[test]
    fn test_from_core_error() {
        let core = "ns=x;i=1".parse::<loopmon_opcua::NodeId>().unwrap_err();
        let err: ConfigError = core.into();
        assert!(err.is_validation_error());
        assert!(err.to_string().starts_with("Invalid opcua section"));
    }
}
