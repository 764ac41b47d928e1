// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! [`OpcUaTransport`] covers exactly the client SDK calls the connection
//! manager issues. Asynchronous SDK notifications (connection state, keep
//! alives, data changes) are not delivered through callbacks: every
//! transport is built by a [`TransportFactory`] together with the sending
//! half of its connection's [`TransportEvent`] channel.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::config::ManagerConfig;
use crate::error::OpcUaResult;
use crate::types::{
    AttributeId, ConnectionOptions, MonitoredItemSettings, NodeClass, NodeId, OpcUaDataType,
    SubscriptionSettings,
};

// =============================================================================
// ReadResult
// =============================================================================

/// Result of a node read operation.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// The node ID that was read.
    pub node_id: NodeId,

    /// The value read (if successful).
    pub value: Option<OpcUaValue>,

    /// Status code of the read operation.
    pub status_code: u32,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl ReadResult {
    /// Creates a successful read result.
    pub fn success(node_id: NodeId, value: OpcUaValue) -> Self {
        Self {
            node_id,
            value: Some(value),
            status_code: 0,
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Creates a failed read result.
    pub fn failure(node_id: NodeId, status_code: u32) -> Self {
        Self {
            node_id,
            value: None,
            status_code,
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Returns `true` if the read was successful.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code & 0xC000_0000 == 0
    }

    /// Returns `true` if the status is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status_code & 0x8000_0000 != 0
    }

    /// Data type of the returned value, if any.
    pub fn data_type(&self) -> Option<OpcUaDataType> {
        self.value
            .as_ref()
            .filter(|v| !v.is_null())
            .map(OpcUaValue::data_type)
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// OPC UA value as seen by the connection manager.
///
/// Serializes to the plain JSON value (numbers, strings, booleans, arrays),
/// with timestamps in RFC 3339 and byte strings in base64.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value (also carries localized text and qualified names).
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// GUID value.
    Guid(uuid::Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<OpcUaValue>),
    /// Null value.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns the data type of this value.
    pub fn data_type(&self) -> OpcUaDataType {
        match self {
            Self::Boolean(_) => OpcUaDataType::Boolean,
            Self::SByte(_) => OpcUaDataType::SByte,
            Self::Byte(_) => OpcUaDataType::Byte,
            Self::Int16(_) => OpcUaDataType::Int16,
            Self::UInt16(_) => OpcUaDataType::UInt16,
            Self::Int32(_) => OpcUaDataType::Int32,
            Self::UInt32(_) => OpcUaDataType::UInt32,
            Self::Int64(_) => OpcUaDataType::Int64,
            Self::UInt64(_) => OpcUaDataType::UInt64,
            Self::Float(_) => OpcUaDataType::Float,
            Self::Double(_) => OpcUaDataType::Double,
            Self::String(_) => OpcUaDataType::String,
            Self::DateTime(_) => OpcUaDataType::DateTime,
            Self::Guid(_) => OpcUaDataType::Guid,
            Self::ByteString(_) => OpcUaDataType::ByteString,
            Self::Array(_) | Self::Null => OpcUaDataType::Variant,
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

impl Serialize for OpcUaValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

        match self {
            Self::Boolean(v) => serializer.serialize_bool(*v),
            Self::SByte(v) => serializer.serialize_i8(*v),
            Self::Byte(v) => serializer.serialize_u8(*v),
            Self::Int16(v) => serializer.serialize_i16(*v),
            Self::UInt16(v) => serializer.serialize_u16(*v),
            Self::Int32(v) => serializer.serialize_i32(*v),
            Self::UInt32(v) => serializer.serialize_u32(*v),
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::UInt64(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f32(*v),
            Self::Double(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::DateTime(v) => serializer.serialize_str(&v.to_rfc3339()),
            Self::Guid(v) => serializer.serialize_str(&v.to_string()),
            Self::ByteString(v) => serializer.serialize_str(&BASE64.encode(v)),
            Self::Array(v) => serializer.collect_seq(v),
            Self::Null => serializer.serialize_unit(),
        }
    }
}

// =============================================================================
// BrowseResult
// =============================================================================

/// One forward reference returned by a browse call.
#[derive(Debug, Clone)]
pub struct BrowseResult {
    /// Target node.
    pub node_id: NodeId,

    /// Browse name.
    pub browse_name: String,

    /// Display name as carried on the reference.
    pub display_name: String,

    /// Node class.
    pub node_class: NodeClass,

    /// Whether the target had forward references at browse time.
    pub has_children: bool,
}

// =============================================================================
// Sessions
// =============================================================================

/// User identity presented when activating a session.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// Anonymous identity.
    Anonymous,
    /// Username and password.
    UserName {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl IdentityToken {
    /// Builds the identity for the given connection options.
    pub fn from_options(options: &ConnectionOptions) -> Self {
        match &options.username {
            Some(username) => Self::UserName {
                username: username.clone(),
                password: options.password.clone().unwrap_or_default(),
            },
            None => Self::Anonymous,
        }
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Parameters for creating and activating a session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Session name shown in server diagnostics.
    pub session_name: String,
    /// Requested session timeout.
    pub timeout: Duration,
    /// User identity.
    pub identity: IdentityToken,
}

/// An active session as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Server-assigned session id.
    pub session_id: String,
    /// Timeout granted by the server.
    pub revised_timeout: Duration,
}

// =============================================================================
// Transport events
// =============================================================================

/// A value change reported for one monitored node.
#[derive(Debug, Clone)]
pub struct DataChangeEvent {
    /// Node whose value changed.
    pub node_id: NodeId,
    /// New value.
    pub value: Option<OpcUaValue>,
    /// Data type, when the SDK reports one.
    pub data_type: Option<OpcUaDataType>,
    /// Status code of the value.
    pub status_code: u32,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// Asynchronous notifications from a transport to its connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport lost its connection to the server.
    ConnectionLost,
    /// The SDK restored the connection on its own.
    ConnectionReestablished,
    /// Publish keep-alive on a subscription.
    KeepAlive {
        /// Subscription id.
        subscription_id: u32,
    },
    /// The server terminated a subscription.
    SubscriptionTerminated {
        /// Subscription id.
        subscription_id: u32,
    },
    /// A monitored value changed.
    DataChange(DataChangeEvent),
}

impl TransportEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionLost => "connection_lost",
            Self::ConnectionReestablished => "connection_reestablished",
            Self::KeepAlive { .. } => "keep_alive",
            Self::SubscriptionTerminated { .. } => "subscription_terminated",
            Self::DataChange(_) => "data_change",
        }
    }
}

/// Sending half of a connection's event channel.
///
/// Sends never block, so the sender can be called from synchronous SDK
/// callbacks.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    inner: mpsc::UnboundedSender<TransportEvent>,
}

/// Receiving half of a connection's event channel.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

impl TransportEventSender {
    /// Creates a new event channel.
    pub fn channel() -> (Self, TransportEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { inner: tx }, rx)
    }

    /// Sends an event. Returns `false` once the connection is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        match self.inner.send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::trace!(event = err.0.kind(), "Event channel closed, dropping event");
                false
            }
        }
    }

    /// Returns `true` if the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// One transport instance serves one connection for its whole lifetime and
/// must support `connect` after `disconnect`, which is how reconnection is
/// performed. All methods take `&self`; implementations keep their state
/// behind interior mutability so the transport can be shared as
/// `Arc<dyn OpcUaTransport>`.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens the secure channel using the configured security mode/policy.
    async fn connect(&self) -> OpcUaResult<()>;

    /// Closes the secure channel.
    async fn disconnect(&self) -> OpcUaResult<()>;

    /// Returns `true` if the secure channel is open.
    fn is_connected(&self) -> bool;

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Creates and activates a session on the open channel.
    async fn create_session(&self, request: SessionRequest) -> OpcUaResult<SessionInfo>;

    /// Closes the active session.
    async fn close_session(&self) -> OpcUaResult<()>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription and returns its id.
    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Creates one monitored item on the `Value` attribute and returns its
    /// server-side id.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<u32>;

    /// Deletes the given monitored items, leaving the subscription intact.
    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> OpcUaResult<()>;

    // =========================================================================
    // Address Space
    // =========================================================================

    /// Browses forward hierarchical references of `node_id` restricted to
    /// `node_class_mask`.
    async fn browse(&self, node_id: &NodeId, node_class_mask: u32)
        -> OpcUaResult<Vec<BrowseResult>>;

    /// Reads a single attribute.
    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId)
        -> OpcUaResult<ReadResult>;

    /// Reads the `Value` attribute.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        self.read_attribute(node_id, AttributeId::Value).await
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the server endpoint URL.
    fn endpoint(&self) -> &str;
}

// =============================================================================
// TransportFactory
// =============================================================================

/// Builds one transport per connection.
pub trait TransportFactory: Send + Sync {
    /// Creates a transport for `endpoint_url`.
    ///
    /// The transport reports asynchronous notifications through `events`.
    fn create(
        &self,
        endpoint_url: &str,
        options: &ConnectionOptions,
        config: &ManagerConfig,
        events: TransportEventSender,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>>;
}
