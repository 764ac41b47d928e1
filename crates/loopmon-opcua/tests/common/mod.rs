// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA server used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use loopmon_opcua::client::{
    BrowseResult, DataChangeEvent, OpcUaTransport, OpcUaValue, ReadResult, SessionInfo,
    SessionRequest, TransportEvent, TransportEventSender, TransportFactory,
};
use loopmon_opcua::{
    AttributeId, ConnectionError, ConnectionOptions, ConnectionRegistry, ManagerConfig,
    MonitoredItemSettings, NodeClass, NodeId, OpcUaError, OpcUaResult, ReconnectSettings,
    SubscriptionError, SubscriptionSettings,
};

pub const ENDPOINT: &str = "opc.tcp://plc-1:4840";

const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;

// =============================================================================
// Address space
// =============================================================================

/// A browsable tree keyed by parent node.
#[derive(Debug, Default)]
pub struct AddressSpace {
    children: HashMap<NodeId, Vec<BrowseResult>>,
    display_names: HashMap<NodeId, String>,
    values: HashMap<NodeId, OpcUaValue>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child under `parent`. Objects are containers.
    pub fn add(&mut self, parent: &NodeId, child: NodeId, name: &str, node_class: NodeClass) -> &mut Self {
        self.children.entry(parent.clone()).or_default().push(BrowseResult {
            node_id: child.clone(),
            browse_name: name.to_string(),
            display_name: name.to_string(),
            node_class,
            has_children: node_class == NodeClass::Object,
        });
        self.display_names.insert(child, name.to_string());
        self
    }

    pub fn set_value(&mut self, node: NodeId, value: OpcUaValue) -> &mut Self {
        self.values.insert(node, value);
        self
    }

    /// `Objects/Line1/{Temperature, Pressure}`, `Objects/Line2/{Temperature}`.
    pub fn plant() -> Self {
        let mut space = Self::new();
        let objects = NodeId::OBJECTS_FOLDER;
        let line1 = NodeId::string(2, "Line1");
        let line2 = NodeId::string(2, "Line2");

        space
            .add(&NodeId::ROOT_FOLDER, objects.clone(), "Objects", NodeClass::Object)
            .add(&objects, line1.clone(), "Line1", NodeClass::Object)
            .add(&objects, line2.clone(), "Line2", NodeClass::Object)
            .add(&line1, NodeId::string(2, "Line1.Temperature"), "Temperature", NodeClass::Variable)
            .add(&line1, NodeId::string(2, "Line1.Pressure"), "Pressure", NodeClass::Variable)
            .add(&line2, NodeId::string(2, "Line2.Temperature"), "Temperature", NodeClass::Variable)
            .set_value(NodeId::string(2, "Line1.Temperature"), OpcUaValue::Double(21.5));
        space
    }
}

// =============================================================================
// MockServer
// =============================================================================

/// Server-side state of one mock endpoint.
#[derive(Debug, Default)]
pub struct MockServer {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_create_subscription: AtomicBool,
    fail_delete_subscription: AtomicBool,
    fail_close_session: AtomicBool,
    close_session_delay: Mutex<Option<Duration>>,
    fail_items: Mutex<HashSet<NodeId>>,
    fail_display_names: Mutex<HashSet<NodeId>>,
    connect_calls: AtomicU32,
    browse_calls: AtomicU32,
    next_subscription_id: AtomicU32,
    next_item_id: AtomicU32,
    subscriptions: Mutex<HashMap<u32, Vec<(u32, NodeId)>>>,
    calls: Mutex<Vec<String>>,
    events: Mutex<Option<TransportEventSender>>,
    space: Mutex<AddressSpace>,
}

impl MockServer {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn browse_calls(&self) -> u32 {
        self.browse_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create_subscription(&self, fail: bool) {
        self.fail_create_subscription.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete_subscription(&self, fail: bool) {
        self.fail_delete_subscription.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close_session(&self, fail: bool) {
        self.fail_close_session.store(fail, Ordering::SeqCst);
    }

    /// Makes `close_session` take `delay` of (paused) time.
    pub fn set_close_session_delay(&self, delay: Duration) {
        *self.close_session_delay.lock() = Some(delay);
    }

    pub fn fail_item(&self, node: NodeId) {
        self.fail_items.lock().insert(node);
    }

    pub fn clear_failed_items(&self) {
        self.fail_items.lock().clear();
    }

    pub fn fail_display_name(&self, node: NodeId) {
        self.fail_display_names.lock().insert(node);
    }

    pub fn set_address_space(&self, space: AddressSpace) {
        *self.space.lock() = space;
    }

    /// Live subscription ids.
    pub fn subscription_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.subscriptions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Nodes monitored on `subscription_id`, in creation order.
    pub fn monitored_nodes(&self, subscription_id: u32) -> Vec<NodeId> {
        self.subscriptions
            .lock()
            .get(&subscription_id)
            .map(|items| items.iter().map(|(_, node)| node.clone()).collect())
            .unwrap_or_default()
    }

    /// Drops the channel and reports it, like a server going away.
    pub fn simulate_connection_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.subscriptions.lock().clear();
        self.send(TransportEvent::ConnectionLost);
    }

    /// Restores the channel behind the manager's back, like SDK-side
    /// recovery.
    pub fn simulate_recovery(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.send(TransportEvent::ConnectionReestablished);
    }

    /// Delivers an event on the connection's channel.
    pub fn send(&self, event: TransportEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(events) => events.send(event),
            None => false,
        }
    }

    pub fn send_value(&self, node: NodeId, value: OpcUaValue) -> bool {
        self.send(TransportEvent::DataChange(DataChangeEvent {
            node_id: node,
            data_type: None,
            value: Some(value),
            status_code: 0,
            source_timestamp: None,
            server_timestamp: None,
        }))
    }
}

// =============================================================================
// MockTransport
// =============================================================================

/// Transport backed by a [`MockServer`].
pub struct MockTransport {
    endpoint: String,
    server: Arc<MockServer>,
}

impl MockTransport {
    fn require_connected(&self) -> OpcUaResult<()> {
        if self.server.is_connected() {
            Ok(())
        } else {
            Err(OpcUaError::not_connected())
        }
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        self.server.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.server.record("connect");
        if self.server.fail_connect.load(Ordering::SeqCst) {
            return Err(OpcUaError::connection(ConnectionError::refused(&self.endpoint)));
        }
        self.server.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.server.record("disconnect");
        self.server.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.server.is_connected()
    }

    async fn create_session(&self, request: SessionRequest) -> OpcUaResult<SessionInfo> {
        self.require_connected()?;
        self.server.record("create_session");
        Ok(SessionInfo {
            session_id: format!("ns=1;i={}", self.server.connect_calls()),
            revised_timeout: request.timeout,
        })
    }

    async fn close_session(&self) -> OpcUaResult<()> {
        self.server.record("close_session");
        let delay = *self.server.close_session_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.server.fail_close_session.load(Ordering::SeqCst) {
            return Err(OpcUaError::session_failed("close rejected"));
        }
        Ok(())
    }

    async fn create_subscription(&self, _settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        self.require_connected()?;
        self.server.record("create_subscription");
        if self.server.fail_create_subscription.load(Ordering::SeqCst) {
            return Err(OpcUaError::subscription(SubscriptionError::creation_failed(
                "BadTooManySubscriptions",
            )));
        }
        let id = self.server.next_subscription_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.server.subscriptions.lock().insert(id, Vec::new());
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.server.record(format!("delete_subscription {}", subscription_id));
        if self.server.fail_delete_subscription.load(Ordering::SeqCst) {
            return Err(OpcUaError::subscription(SubscriptionError::delete_failed(
                subscription_id,
                "rejected",
            )));
        }
        self.server.subscriptions.lock().remove(&subscription_id);
        Ok(())
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        _settings: &MonitoredItemSettings,
    ) -> OpcUaResult<u32> {
        self.require_connected()?;
        self.server.record(format!("create_monitored_item {}", node_id));
        if self.server.fail_items.lock().contains(node_id) {
            return Err(OpcUaError::monitored_item_failed(node_id.to_string(), "BadNodeIdUnknown"));
        }
        let mut subscriptions = self.server.subscriptions.lock();
        let items = subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| OpcUaError::subscription(SubscriptionError::not_found(subscription_id)))?;
        let item_id = self.server.next_item_id.fetch_add(1, Ordering::SeqCst) + 1;
        items.push((item_id, node_id.clone()));
        Ok(item_id)
    }

    async fn delete_monitored_items(&self, subscription_id: u32, monitored_item_ids: &[u32]) -> OpcUaResult<()> {
        self.server.record(format!("delete_monitored_items {:?}", monitored_item_ids));
        if let Some(items) = self.server.subscriptions.lock().get_mut(&subscription_id) {
            items.retain(|(id, _)| !monitored_item_ids.contains(id));
        }
        Ok(())
    }

    async fn browse(&self, node_id: &NodeId, _node_class_mask: u32) -> OpcUaResult<Vec<BrowseResult>> {
        self.require_connected()?;
        self.server.browse_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .server
            .space
            .lock()
            .children
            .get(node_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<ReadResult> {
        self.require_connected()?;
        let space = self.server.space.lock();
        let result = match attribute {
            AttributeId::DisplayName => {
                if self.server.fail_display_names.lock().contains(node_id) {
                    return Err(OpcUaError::read_failed(node_id.to_string(), "BadTimeout"));
                }
                space
                    .display_names
                    .get(node_id)
                    .map(|name| ReadResult::success(node_id.clone(), OpcUaValue::String(name.clone())))
            }
            AttributeId::Value => space
                .values
                .get(node_id)
                .map(|value| ReadResult::success(node_id.clone(), value.clone())),
            _ => None,
        };
        Ok(result.unwrap_or_else(|| ReadResult::failure(node_id.clone(), BAD_NODE_ID_UNKNOWN)))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// MockTransportFactory
// =============================================================================

/// Hands out transports bound to one [`MockServer`] per endpoint.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
    created: AtomicU32,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Server for `endpoint`, created on first use so tests can arm
    /// failures before connecting.
    pub fn server(&self, endpoint: &str) -> Arc<MockServer> {
        let mut servers = self.servers.lock();
        let server = servers.entry(endpoint.to_string()).or_insert_with(|| {
            let server = MockServer::default();
            *server.space.lock() = AddressSpace::plant();
            Arc::new(server)
        });
        Arc::clone(server)
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        endpoint_url: &str,
        _options: &ConnectionOptions,
        _config: &ManagerConfig,
        events: TransportEventSender,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let server = self.server(endpoint_url);
        *server.events.lock() = Some(events);
        Ok(Box::new(MockTransport {
            endpoint: endpoint_url.to_string(),
            server,
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Manager settings with a 5s base delay, 300s cap and `max_attempts`.
pub fn config(max_attempts: u32) -> ManagerConfig {
    ManagerConfig {
        reconnect: ReconnectSettings {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_retry_attempts: max_attempts,
        },
        ..ManagerConfig::default()
    }
}

pub fn registry(factory: &Arc<MockTransportFactory>, config: ManagerConfig) -> ConnectionRegistry {
    ConnectionRegistry::new(
        Arc::clone(factory) as Arc<dyn TransportFactory>,
        config,
        Arc::new(loopmon_opcua::TracingSink),
    )
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advances paused time by `duration` and lets tasks react.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}
