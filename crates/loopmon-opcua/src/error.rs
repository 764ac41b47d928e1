// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA connection manager.
//!
//! Every failure carries enough context to be logged on its own: a stable
//! error code, a severity that maps onto a tracing level, and a short list of
//! recovery hints for operators.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Endpoint, registry and reconnection failures
//! ├── Session       - Session creation and lifecycle errors
//! ├── Browse        - Address-space traversal failures
//! ├── Operation     - Attribute and value reads
//! ├── Subscription  - Subscription and monitored item errors
//! └── Configuration - Invalid settings and identifiers
//! ```
//!
//! # Examples
//!
//! ```
//! use loopmon_opcua::error::{ConnectionError, ErrorSeverity, OpcUaError};
//!
//! let error = OpcUaError::connection(ConnectionError::unavailable(
//!     "conn-0123",
//!     "no active session",
//! ));
//!
//! assert!(!error.is_retryable());
//! assert_eq!(error.category(), "connection");
//! assert_eq!(error.severity(), ErrorSeverity::Warning);
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for connection manager operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Address-space browsing errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Read operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitoring errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a browse error.
    #[inline]
    pub fn browse(error: BrowseError) -> Self {
        Self::Browse(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// The connection is unknown, or it lacks the session/subscription the
    /// operation needs.
    pub fn unavailable(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::unavailable(connection_id, reason))
    }

    /// No connection is registered under the id.
    pub fn not_found(connection_id: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::NotFound {
            connection_id: connection_id.into(),
        })
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a session creation failed error.
    pub fn session_failed(message: impl Into<String>) -> Self {
        Self::Session(SessionError::creation_failed(message))
    }

    /// Creates a read failed error.
    pub fn read_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation(OperationError::read_failed(node_id, message))
    }

    /// Creates a monitored item failure.
    pub fn monitored_item_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription(SubscriptionError::monitored_item_failed(node_id, message))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if the failed operation may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Browse(e) => e.is_retryable(),
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Configuration(_) => false,
        }
    }

    /// Returns `true` for the `ConnectionUnavailable` class of failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connection(ConnectionError::Unavailable { .. })
                | Self::Connection(ConnectionError::NotFound { .. })
        )
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Browse(e) => e.severity(),
            Self::Operation(e) => e.severity(),
            Self::Subscription(e) => e.severity(),
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Session(_) => "session",
            Self::Browse(_) => "browse",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Browse(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
            Self::Browse(e) => e.recovery_hints(),
            Self::Operation(e) => e.recovery_hints(),
            Self::Subscription(e) => e.recovery_hints(),
            Self::Configuration(e) => e.recovery_hints(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with its code, category and the given context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection and registry errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused by the endpoint.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: Option<io::Error>,
    },

    /// Connection timed out.
    #[error("Connection timed out to '{endpoint}' after {duration:?}")]
    TimedOut {
        /// Target endpoint.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// Endpoint discovery failed.
    #[error("Endpoint not found: '{endpoint}'")]
    EndpointNotFound {
        /// The endpoint URL.
        endpoint: String,
    },

    /// Malformed endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// The server offers no endpoint with the requested security.
    #[error("No suitable endpoint found for {security_policy}/{security_mode}")]
    NoSuitableEndpoint {
        /// Requested security mode.
        security_mode: String,
        /// Requested security policy.
        security_policy: String,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed: {}", reason.as_deref().unwrap_or("no reason given"))]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// The transport is not connected.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// The connection is unknown or lacks the session/subscription required.
    #[error("Connection '{connection_id}' not available: {reason}")]
    Unavailable {
        /// Connection id.
        connection_id: String,
        /// What is missing.
        reason: String,
    },

    /// No connection is registered under the id.
    #[error("Connection '{connection_id}' not found")]
    NotFound {
        /// Connection id.
        connection_id: String,
    },

    /// The reconnection loop hit its attempt cap.
    #[error("Reconnection to '{connection_id}' abandoned after {attempts} attempts")]
    ReconnectExhausted {
        /// Connection id.
        connection_id: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl ConnectionError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: None,
        }
    }

    /// Creates an endpoint not found error.
    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no suitable endpoint error.
    pub fn no_suitable_endpoint(
        security_mode: impl Into<String>,
        security_policy: impl Into<String>,
    ) -> Self {
        Self::NoSuitableEndpoint {
            security_mode: security_mode.into(),
            security_policy: security_policy.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Creates an unavailable error.
    pub fn unavailable(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            connection_id: connection_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a reconnect exhausted error.
    pub fn reconnect_exhausted(connection_id: impl Into<String>, attempts: u32) -> Self {
        Self::ReconnectExhausted {
            connection_id: connection_id.into(),
            attempts,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refused { .. } | Self::TimedOut { .. } | Self::Closed { .. } => true,
            Self::NotConnected => true,
            Self::EndpointNotFound { .. }
            | Self::InvalidEndpoint { .. }
            | Self::NoSuitableEndpoint { .. }
            | Self::Unavailable { .. }
            | Self::NotFound { .. }
            | Self::ReconnectExhausted { .. } => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected
            | Self::TimedOut { .. }
            | Self::Closed { .. }
            | Self::Unavailable { .. }
            | Self::NotFound { .. } => ErrorSeverity::Warning,
            Self::ReconnectExhausted { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::TimedOut { .. } => ErrorCode::new(1, 2),
            Self::EndpointNotFound { .. } => ErrorCode::new(1, 3),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 4),
            Self::NoSuitableEndpoint { .. } => ErrorCode::new(1, 5),
            Self::Closed { .. } => ErrorCode::new(1, 6),
            Self::NotConnected => ErrorCode::new(1, 7),
            Self::Unavailable { .. } => ErrorCode::new(1, 8),
            Self::NotFound { .. } => ErrorCode::new(1, 9),
            Self::ReconnectExhausted { .. } => ErrorCode::new(1, 10),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Refused { .. } => vec![
                "Check if the OPC UA server is running",
                "Verify the endpoint URL is correct",
                "Check firewall rules allow the connection",
            ],
            Self::TimedOut { .. } => vec![
                "Check network connectivity to the server",
                "Verify the server is not overloaded",
            ],
            Self::EndpointNotFound { .. } => vec![
                "Verify the server URL is correct",
                "Check if the server is running",
            ],
            Self::InvalidEndpoint { .. } => vec!["Use format: opc.tcp://hostname:port/path"],
            Self::NoSuitableEndpoint { .. } => vec![
                "Check the security modes offered by the server",
                "Match securityMode and securityPolicy to a server endpoint",
            ],
            Self::Closed { .. } => vec![
                "Check server logs for the disconnect reason",
                "The reconnection controller retries automatically",
            ],
            Self::NotConnected => vec!["Create the connection before issuing requests"],
            Self::Unavailable { .. } => vec![
                "Check the connection status before issuing requests",
                "Wait for the reconnection loop to restore the session",
            ],
            Self::NotFound { .. } => vec!["List connections to find a valid id"],
            Self::ReconnectExhausted { .. } => vec![
                "Disconnect and recreate the connection once the server is reachable",
                "Raise max_retry_attempts or set it to 0 for unlimited retries",
            ],
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::TimedOut {
                endpoint: "unknown".to_string(),
                duration: Duration::ZERO,
            },
            _ => Self::Refused {
                endpoint: "unknown".to_string(),
                source: Some(error),
            },
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed.
    #[error("Failed to create session: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Session activation (identity check) failed.
    #[error("Failed to activate session: {message}")]
    ActivationFailed {
        /// Error message.
        message: String,
    },

    /// Session expired on the server.
    #[error("Session expired{}", session_id.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    Expired {
        /// Session id, if known.
        session_id: Option<String>,
    },

    /// Closing the session failed.
    #[error("Failed to close session: {message}")]
    CloseFailed {
        /// Error message.
        message: String,
    },
}

impl SessionError {
    /// Creates a session creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an activation failed error.
    pub fn activation_failed(message: impl Into<String>) -> Self {
        Self::ActivationFailed {
            message: message.into(),
        }
    }

    /// Creates a close failed error.
    pub fn close_failed(message: impl Into<String>) -> Self {
        Self::CloseFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. } | Self::Expired { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Expired { .. } | Self::CloseFailed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(2, 1),
            Self::ActivationFailed { .. } => ErrorCode::new(2, 2),
            Self::Expired { .. } => ErrorCode::new(2, 3),
            Self::CloseFailed { .. } => ErrorCode::new(2, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::CreationFailed { .. } => vec![
                "Check the server session limit",
                "Verify the security policy is supported",
            ],
            Self::ActivationFailed { .. } => vec![
                "Verify username and password",
                "Check that the server accepts the identity token type",
            ],
            Self::Expired { .. } => vec!["Increase session_timeout", "Reconnect to the server"],
            Self::CloseFailed { .. } => vec!["The server may already have dropped the session"],
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Address-space browsing errors.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The browse service call failed.
    #[error("Browse failed for '{node_id}': {message}")]
    BrowseFailed {
        /// Node being browsed.
        node_id: String,
        /// Error message.
        message: String,
    },
}

impl BrowseError {
    /// Creates a browse failed error.
    pub fn browse_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrowseFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BrowseFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::BrowseFailed { .. } => ErrorCode::new(3, 1),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::BrowseFailed { .. } => vec!["Check the session is active", "Retry the browse"],
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The read service call failed.
    #[error("Read failed for '{node_id}': {message}")]
    ReadFailed {
        /// Node being read.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// The server answered with a bad status.
    #[error("Bad status {} (0x{status_code:08X}) for '{node_id}'", OperationError::status_code_name(*status_code))]
    BadStatus {
        /// Node being read.
        node_id: String,
        /// The status code.
        status_code: u32,
    },
}

impl OperationError {
    /// Creates a read failed error.
    pub fn read_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates a bad status error.
    pub fn bad_status(node_id: impl Into<String>, status_code: u32) -> Self {
        Self::BadStatus {
            node_id: node_id.into(),
            status_code,
        }
    }

    /// Returns the symbolic name of common status codes.
    pub fn status_code_name(code: u32) -> &'static str {
        match code {
            0x0000_0000 => "Good",
            0x8001_0000 => "BadUnexpectedError",
            0x800A_0000 => "BadTimeout",
            0x800D_0000 => "BadServerNotConnected",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x80AE_0000 => "BadConnectionClosed",
            c if c & 0xC000_0000 == 0x4000_0000 => "Uncertain",
            c if c & 0x8000_0000 != 0 => "Bad",
            _ => "Good",
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ReadFailed { .. } => ErrorSeverity::Error,
            Self::BadStatus { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(4, 1),
            Self::BadStatus { .. } => ErrorCode::new(4, 2),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ReadFailed { .. } => vec!["Check the session is active", "Retry the read"],
            Self::BadStatus { .. } => vec![
                "Verify the node id exists on the server",
                "Check the user has read access to the node",
            ],
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Subscription creation failed.
    #[error("Failed to create subscription: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// Subscription unknown to the transport.
    #[error("Subscription not found: {subscription_id}")]
    NotFound {
        /// Subscription id.
        subscription_id: u32,
    },

    /// Subscription deletion failed.
    #[error("Failed to delete subscription {subscription_id}: {message}")]
    DeleteFailed {
        /// Subscription id.
        subscription_id: u32,
        /// Error message.
        message: String,
    },

    /// Adding or removing a single monitored item failed.
    #[error("Monitored item failed for '{node_id}': {message}")]
    MonitoredItemFailed {
        /// Target node.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// The server terminated the subscription.
    #[error("Subscription {subscription_id} terminated by server")]
    Terminated {
        /// Subscription id.
        subscription_id: u32,
    },
}

impl SubscriptionError {
    /// Creates a subscription creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a subscription not found error.
    pub fn not_found(subscription_id: u32) -> Self {
        Self::NotFound { subscription_id }
    }

    /// Creates a delete failed error.
    pub fn delete_failed(subscription_id: u32, message: impl Into<String>) -> Self {
        Self::DeleteFailed {
            subscription_id,
            message: message.into(),
        }
    }

    /// Creates a monitored item failed error.
    pub fn monitored_item_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MonitoredItemFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CreationFailed { .. } | Self::MonitoredItemFailed { .. } | Self::Terminated { .. }
        )
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Terminated { .. } | Self::NotFound { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(5, 1),
            Self::NotFound { .. } => ErrorCode::new(5, 2),
            Self::DeleteFailed { .. } => ErrorCode::new(5, 3),
            Self::MonitoredItemFailed { .. } => ErrorCode::new(5, 4),
            Self::Terminated { .. } => ErrorCode::new(5, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::CreationFailed { .. } => vec![
                "Check the server subscription limit",
                "Lower the publishing rate",
            ],
            Self::NotFound { .. } | Self::Terminated { .. } => {
                vec!["The subscription is rebuilt after the next reconnection"]
            }
            Self::DeleteFailed { .. } => vec!["The server may already have dropped it"],
            Self::MonitoredItemFailed { .. } => vec![
                "Verify the node id exists and is a Variable",
                "Check the sampling interval is supported by the server",
            ],
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration and identifier errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A node id string could not be parsed.
    #[error("Invalid node ID '{node_id}': {reason}")]
    InvalidNodeId {
        /// The node id text.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// A setting has an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Setting name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("Invalid environment variable '{name}': {reason}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Reason.
        reason: String,
    },

    /// Unknown security mode name.
    #[error("Invalid security mode: {0}")]
    InvalidSecurityMode(String),

    /// Unknown security policy name.
    #[error("Invalid security policy: {0}")]
    InvalidSecurityPolicy(String),
}

impl ConfigurationError {
    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidNodeId { .. } => ErrorCode::new(6, 1),
            Self::InvalidValue { .. } => ErrorCode::new(6, 2),
            Self::InvalidEnvVar { .. } => ErrorCode::new(6, 3),
            Self::InvalidSecurityMode(_) => ErrorCode::new(6, 4),
            Self::InvalidSecurityPolicy(_) => ErrorCode::new(6, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidNodeId { .. } => vec![
                "Use format: ns=<index>;i=<number> or ns=<index>;s=<string>",
                "Aliases RootFolder and ObjectsFolder are accepted",
            ],
            Self::InvalidValue { .. } => vec!["Check the configuration reference for valid ranges"],
            Self::InvalidEnvVar { .. } => vec!["Unset the variable or give it a numeric value"],
            Self::InvalidSecurityMode(_) => vec!["Valid modes: None, Sign, SignAndEncrypt"],
            Self::InvalidSecurityPolicy(_) => vec![
                "Valid policies: None, Basic128Rsa15, Basic256, Basic256Sha256, Aes128Sha256RsaOaep, Aes256Sha256RsaPss",
            ],
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code, rendered as `UA-XXYY`.
///
/// Categories: 1 connection, 2 session, 3 browse, 4 operation,
/// 5 subscription, 6 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;
