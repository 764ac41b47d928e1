// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connection and subscription manager for loopmon.
//!
//! This crate keeps a set of OPC UA server connections alive, each with one
//! session and one subscription, and forwards value changes of the
//! monitored nodes to a [`DataSink`]. Connections that drop are re-opened
//! with exponential backoff and their monitored items are restored.
//!
//! # Layout
//!
//! ```text
//! ConnectionRegistry
//! ├── Connection (per endpoint)
//! │   ├── OpcUaTransport      - session and channel
//! │   └── MonitoredItemRegistry
//! ├── ReconnectionController  - backoff and retry loops
//! ├── SubscriptionManager     - subscription and item lifecycle
//! ├── AddressSpaceBrowser     - browse and search
//! └── DataChangeDispatcher    - value changes to the sink
//! ```
//!
//! # Error Handling
//!
//! Every operation returns [`OpcUaResult`]:
//!
//! ```text
//! OpcUaError
//! ├── Connection    - endpoints, channels, reconnection, unknown ids
//! ├── Session       - session lifecycle errors
//! ├── Browse        - address space browsing
//! ├── Operation     - attribute reads
//! ├── Subscription  - subscriptions and monitored items
//! └── Configuration - invalid settings
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use loopmon_opcua::{ConnectionOptions, ConnectionRegistry, MonitoringOptions, NodeId};
//! use loopmon_opcua::client::RealTransportFactory;
//!
//! #[tokio::main]
//! async fn main() -> loopmon_opcua::OpcUaResult<()> {
//!     let registry = ConnectionRegistry::with_defaults(Arc::new(RealTransportFactory::new()));
//!     let status = registry
//!         .create_connection("opc.tcp://localhost:4840", ConnectionOptions::default())
//!         .await?;
//!
//!     let node: NodeId = "ns=2;s=Line1.Temperature".parse()?;
//!     registry
//!         .add_monitored_item(&status.id, &node, MonitoringOptions::default())
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod browse;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
mod events;
pub mod monitored;
pub mod reconnect;
pub mod registry;
pub mod subscription;
pub mod types;

pub use error::{
    BrowseError, ConfigurationError, ConnectionError, ErrorCode, ErrorSeverity, OpcUaError,
    OpcUaResult, OperationError, SessionError, SubscriptionError,
};

pub use types::{
    AttributeId, ConnectionOptions, MonitoredItemSettings, NodeClass, NodeId, NodeIdentifier,
    OpcUaDataType, SecurityMode, SecurityPolicy, SubscriptionSettings,
};

pub use client::{OpcUaTransport, OpcUaValue, TransportEvent, TransportFactory};

#[cfg(feature = "real-transport")]
pub use client::{RealOpcUaTransport, RealTransportFactory};

pub use browse::{AddressSpaceBrowser, BrowseNode};
pub use config::{ManagerConfig, ReconnectSettings};
pub use connection::{Connection, ConnectionId, ConnectionStatus, ConnectionStatusView};
pub use dispatch::{
    BroadcastSink, ChannelSink, DataChangeDispatcher, DataSample, DataSink,
    DispatcherStatsSnapshot, Quality, TracingSink,
};
pub use monitored::{MonitoredItem, MonitoredItemId, MonitoredItemRegistry, MonitoringOptions};
pub use reconnect::{BackoffPolicy, ReconnectionController};
pub use registry::{ConnectionRegistry, ReadValueResult};
pub use subscription::{RebuildReport, SubscriptionHandle, SubscriptionManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
