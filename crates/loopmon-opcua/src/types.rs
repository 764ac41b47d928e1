// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA value types shared by the connection manager.
//!
//! - **NodeId**: the four OPC UA identifier kinds, parsed from and rendered to
//!   the `ns=<n>;{i|s|g|b}=<v>` text form, plus well-known folder aliases
//! - **OpcUaDataType**: built-in data types reported alongside values
//! - **SecurityMode/SecurityPolicy**: channel security selection
//! - **NodeClass/AttributeId**: browse and read vocabulary
//! - **ConnectionOptions**: per-connection parameters
//! - **SubscriptionSettings/MonitoredItemSettings**: publishing and sampling
//!
//! # Examples
//!
//! ```
//! use loopmon_opcua::types::NodeId;
//!
//! let node: NodeId = "ns=2;s=Line1.FIC101.PV".parse().unwrap();
//! assert_eq!(node.to_string(), "ns=2;s=Line1.FIC101.PV");
//!
//! let root: NodeId = "RootFolder".parse().unwrap();
//! assert_eq!(root, NodeId::ROOT_FOLDER);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// Serialized as its text form so that it reads naturally in configuration
/// files and JSON views.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    ///
    /// # Examples
    ///
    /// ```
    /// use loopmon_opcua::types::NodeId;
    ///
    /// let node = NodeId::string(2, "Temperature.Value");
    /// assert!(node.is_string());
    /// ```
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    // =========================================================================
    // Well-known Nodes
    // =========================================================================

    /// Root folder (i=84).
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(84),
    };

    /// Objects folder (i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(85),
    };

    /// Types folder (i=86).
    pub const TYPES_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(86),
    };

    /// Views folder (i=87).
    pub const VIEWS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(87),
    };

    /// Server object (i=2253).
    pub const SERVER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(2253),
    };

    /// Resolves a symbolic alias such as `RootFolder`.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "RootFolder" => Some(Self::ROOT_FOLDER),
            "ObjectsFolder" => Some(Self::OBJECTS_FOLDER),
            "TypesFolder" => Some(Self::TYPES_FOLDER),
            "ViewsFolder" => Some(Self::VIEWS_FOLDER),
            "Server" => Some(Self::SERVER),
            _ => None,
        }
    }

    // =========================================================================
    // Type Checks
    // =========================================================================

    /// Returns `true` if this is a string identifier.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Returns the numeric value if this is a numeric identifier.
    pub fn as_numeric(&self) -> Option<u32> {
        match &self.identifier {
            NodeIdentifier::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value if this is a string identifier.
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`, with the namespace
    /// part omitted for namespace 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use loopmon_opcua::types::NodeId;
    ///
    /// assert_eq!(NodeId::numeric(2, 1001).to_opc_string(), "ns=2;i=1001");
    /// assert_eq!(NodeId::numeric(0, 84).to_opc_string(), "i=84");
    /// ```
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl From<NodeId> for String {
    fn from(node: NodeId) -> Self {
        node.to_opc_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = OpcUaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=85` (namespace 0)
    /// - `RootFolder`, `ObjectsFolder`, `TypesFolder`, `ViewsFolder`, `Server`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        if s.is_empty() {
            return Err(invalid("empty node id".to_string()));
        }
        if let Some(node) = Self::from_alias(s) {
            return Ok(node);
        }

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".to_string()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".to_string()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            let value: u32 = id
                .parse()
                .map_err(|_| invalid("Invalid numeric identifier".to_string()))?;
            NodeIdentifier::Numeric(value)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("Empty string identifier".to_string()));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            let uuid = Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {e}")))?;
            NodeIdentifier::Guid(uuid)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            let bytes = BASE64
                .decode(id)
                .map_err(|e| invalid(format!("Invalid base64: {e}")))?;
            NodeIdentifier::Opaque(bytes)
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".to_string(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// OpcUaDataType
// =============================================================================

/// OPC UA built-in data types reported with read results and samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpcUaDataType {
    /// Boolean value.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 double.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// GUID.
    Guid,
    /// Raw byte string.
    ByteString,
    /// Localized text.
    LocalizedText,
    /// Anything else.
    Variant,
}

impl OpcUaDataType {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
            Self::LocalizedText => "LocalizedText",
            Self::Variant => "Variant",
        }
    }
}

impl fmt::Display for OpcUaDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    #[default]
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the OPC UA security mode value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::InvalidSecurityMode(s.to_string()),
            )),
        }
    }
}

impl From<SecurityMode> for String {
    fn from(mode: SecurityMode) -> Self {
        mode.name().to_string()
    }
}

impl TryFrom<String> for SecurityMode {
    type Error = OpcUaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SecurityPolicy {
    /// No security policy (use with SecurityMode::None).
    None,

    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,

    /// Basic256 (deprecated).
    Basic256,

    /// Basic256Sha256.
    #[default]
    Basic256Sha256,

    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,

    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Creates from URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            s if s.ends_with("#None") => Some(Self::None),
            s if s.ends_with("#Basic128Rsa15") => Some(Self::Basic128Rsa15),
            s if s.ends_with("#Basic256") => Some(Self::Basic256),
            s if s.ends_with("#Basic256Sha256") => Some(Self::Basic256Sha256),
            s if s.contains("Aes128_Sha256_RsaOaep") => Some(Self::Aes128Sha256RsaOaep),
            s if s.contains("Aes256_Sha256_RsaPss") => Some(Self::Aes256Sha256RsaPss),
            _ => Option::None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(policy) = Self::from_uri(s) {
            return Ok(policy);
        }

        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" | "basic128" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" | "aes128" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" | "aes256" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::InvalidSecurityPolicy(s.to_string()),
            )),
        }
    }
}

impl From<SecurityPolicy> for String {
    fn from(policy: SecurityPolicy) -> Self {
        policy.name().to_string()
    }
}

impl TryFrom<String> for SecurityPolicy {
    type Error = OpcUaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
    /// Not reported by the server.
    Unspecified,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
            Self::Unspecified => 0,
        }
    }

    /// Creates from OPC UA value.
    pub fn from_value(value: u32) -> Self {
        match value {
            1 => Self::Object,
            2 => Self::Variable,
            4 => Self::Method,
            8 => Self::ObjectType,
            16 => Self::VariableType,
            32 => Self::ReferenceType,
            64 => Self::DataType,
            128 => Self::View,
            _ => Self::Unspecified,
        }
    }
}

/// Node class mask used by browse and search: Object | Variable | Method.
pub const BROWSE_NODE_CLASS_MASK: u32 =
    NodeClass::Object.value() | NodeClass::Variable.value() | NodeClass::Method.value();

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attribute IDs read by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    Value,
    /// Data type attribute.
    DataType,
}

impl AttributeId {
    /// Returns the OPC UA attribute ID value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
        }
    }

    /// Returns the attribute name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NodeId => "NodeId",
            Self::NodeClass => "NodeClass",
            Self::BrowseName => "BrowseName",
            Self::DisplayName => "DisplayName",
            Self::Description => "Description",
            Self::Value => "Value",
            Self::DataType => "DataType",
        }
    }
}

// =============================================================================
// ConnectionOptions
// =============================================================================

/// Parameters a caller supplies when creating a connection.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    /// Username for username/password identity. Anonymous when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for username/password identity.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Message security mode.
    pub security_mode: SecurityMode,

    /// Security policy.
    pub security_policy: SecurityPolicy,

    /// Session timeout. The manager default applies when absent.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub session_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// Options with the given security mode and policy and anonymous identity.
    pub fn new(security_mode: SecurityMode, security_policy: SecurityPolicy) -> Self {
        Self {
            security_mode,
            security_policy,
            ..Default::default()
        }
    }

    /// Sets username/password credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Returns `true` if the anonymous identity will be used.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("security_mode", &self.security_mode)
            .field("security_policy", &self.security_policy)
            .field("session_timeout", &self.session_timeout)
            .finish()
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Publishing parameters of the per-connection subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Lifetime count (publishing intervals before the subscription expires).
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub max_keep_alive_count: u32,

    /// Maximum notifications per publish.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Priority (0-255, higher is more important).
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    1000
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_max_notifications() -> u32 {
    1000
}

fn default_priority() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            max_keep_alive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: default_priority(),
            publishing_enabled: true,
        }
    }
}

// =============================================================================
// MonitoredItemSettings
// =============================================================================

/// Fully resolved sampling parameters of one monitored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredItemSettings {
    /// Sampling interval.
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size.
    pub queue_size: u32,

    /// Drop the oldest queued value when the queue is full.
    pub discard_oldest: bool,
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(200),
            queue_size: 100,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

/// Serde adapter that reads and writes durations as `humantime` strings
/// (`"200ms"`, `"5s"`, `"1m 30s"`).
///
/// Use with `#[serde(with = "loopmon_opcua::types::humantime_serde")]`, or the
/// [`option`] submodule for `Option<Duration>` fields.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a humantime string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    /// Parses a humantime string into a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// The same adapter for optional durations.
    pub mod option {
        use super::*;

        #[allow(missing_docs)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| humantime::format_duration(d).to_string())
                .serialize(serializer)
        }

        #[allow(missing_docs)]
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        let node: NodeId = "ns=2;i=1001".parse().unwrap();
        assert_eq!(node.namespace_index, 2);
        assert_eq!(node.as_numeric(), Some(1001));

        let node: NodeId = "ns=2;s=Line1.Tag:1".parse().unwrap();
        assert_eq!(node.as_string(), Some("Line1.Tag:1"));

        let node: NodeId = "i=85".parse().unwrap();
        assert_eq!(node, NodeId::OBJECTS_FOLDER);
    }

    #[test]
    fn test_node_id_aliases() {
        assert_eq!("RootFolder".parse::<NodeId>().unwrap(), NodeId::ROOT_FOLDER);
        assert_eq!("ObjectsFolder".parse::<NodeId>().unwrap().to_string(), "i=85");
        assert_eq!("Server".parse::<NodeId>().unwrap().as_numeric(), Some(2253));
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("".parse::<NodeId>().is_err());
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;i=abc".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;s=".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_text_forms() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            NodeId::guid(2, uuid).to_string(),
            "ns=2;g=550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(NodeId::opaque(1, vec![1, 2, 3, 4]).to_string(), "ns=1;b=AQIDBA==");

        let parsed: NodeId = "ns=1;b=AQIDBA==".parse().unwrap();
        assert_eq!(parsed, NodeId::opaque(1, vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let json = serde_json::to_string(&NodeId::string(3, "Pump.Speed")).unwrap();
        assert_eq!(json, "\"ns=3;s=Pump.Speed\"");

        let node: NodeId = serde_json::from_str("\"ns=3;i=7\"").unwrap();
        assert_eq!(node, NodeId::numeric(3, 7));
        assert!(serde_json::from_str::<NodeId>("\"bogus\"").is_err());
    }

    #[test]
    fn test_security_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.security_mode, SecurityMode::SignAndEncrypt);
        assert_eq!(options.security_policy, SecurityPolicy::Basic256Sha256);
        assert!(options.is_anonymous());
        assert!(options.session_timeout.is_none());
    }

    #[test]
    fn test_security_parse() {
        assert_eq!("None".parse::<SecurityMode>().unwrap(), SecurityMode::None);
        assert_eq!("sign_and_encrypt".parse::<SecurityMode>().unwrap(), SecurityMode::SignAndEncrypt);
        assert!("bogus".parse::<SecurityMode>().is_err());

        assert_eq!(
            SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"),
            Some(SecurityPolicy::Basic256Sha256)
        );
        assert_eq!("aes128".parse::<SecurityPolicy>().unwrap(), SecurityPolicy::Aes128Sha256RsaOaep);
    }

    #[test]
    fn test_connection_options_deserialize() {
        let options: ConnectionOptions = serde_json::from_str(
            r#"{"username":"op","password":"pw","securityMode":"None","securityPolicy":"None","sessionTimeout":"30s"}"#,
        )
        .unwrap();
        assert_eq!(options.username.as_deref(), Some("op"));
        assert_eq!(options.security_mode, SecurityMode::None);
        assert_eq!(options.session_timeout, Some(Duration::from_secs(30)));

        let debug = format!("{:?}", options);
        assert!(!debug.contains("pw"));
        assert!(!serde_json::to_string(&options).unwrap().contains("pw"));
    }

    #[test]
    fn test_browse_mask() {
        assert_eq!(BROWSE_NODE_CLASS_MASK, 7);
        assert_eq!(NodeClass::from_value(2), NodeClass::Variable);
        assert_eq!(NodeClass::from_value(3), NodeClass::Unspecified);
    }

    #[test]
    fn test_subscription_defaults() {
        let settings = SubscriptionSettings::default();
        assert_eq!(settings.publishing_interval, Duration::from_millis(1000));
        assert_eq!(settings.lifetime_count, 1000);
        assert_eq!(settings.max_keep_alive_count, 10);
        assert_eq!(settings.max_notifications_per_publish, 1000);
        assert_eq!(settings.priority, 10);

        let item = MonitoredItemSettings::default();
        assert_eq!(item.sampling_interval, Duration::from_millis(200));
        assert_eq!(item.queue_size, 100);
        assert!(item.discard_oldest);
    }
}
