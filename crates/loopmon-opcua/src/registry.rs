// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The connection registry.
//!
//! [`ConnectionRegistry`] is the entry point of the crate. It owns every
//! [`Connection`], keyed by its [`ConnectionId`], together with the
//! reconnection controller, the subscription manager, the browser and the
//! data change dispatcher that act on them.
//!
//! The registry is a cheap handle: clones share the same state. Background
//! tasks only hold a weak reference, so dropping the last handle stops them.
//!
//! # Examples
//!
//! ```rust,ignore
//! use loopmon_opcua::{ConnectionOptions, ConnectionRegistry, ManagerConfig, MonitoringOptions};
//!
//! let registry = ConnectionRegistry::new(factory, ManagerConfig::from_env()?, sink);
//!
//! let view = registry
//!     .create_connection("opc.tcp://plc-1:4840", ConnectionOptions::default())
//!     .await?;
//! registry
//!     .add_monitored_item(&view.id, &"ns=2;s=Temperature".parse()?, MonitoringOptions::default())
//!     .await?;
//!
//! registry.disconnect_all().await;
//! ```

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::browse::{AddressSpaceBrowser, BrowseNode};
use crate::client::{OpcUaValue, ReadResult, TransportEvent, TransportEventSender, TransportFactory};
use crate::config::ManagerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionStatus, ConnectionStatusView};
use crate::dispatch::{DataChangeDispatcher, DataSink, DispatcherStatsSnapshot, Quality, TracingSink};
use crate::error::{OpcUaError, OpcUaResult};
use crate::events::spawn_event_pump;
use crate::monitored::{MonitoredItem, MonitoredItemId, MonitoringOptions};
use crate::reconnect::{BackoffPolicy, ReconnectionController};
use crate::subscription::SubscriptionManager;
use crate::types::{ConnectionOptions, NodeId, OpcUaDataType};

// =============================================================================
// ReadValueResult
// =============================================================================

/// Result of [`ConnectionRegistry::read_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadValueResult {
    /// Value read.
    pub value: Option<OpcUaValue>,
    /// Data type of the value.
    pub data_type: Option<OpcUaDataType>,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Raw status code.
    pub status_code: u32,
    /// Quality label of the status code.
    pub quality: Quality,
}

impl From<ReadResult> for ReadValueResult {
    fn from(result: ReadResult) -> Self {
        Self {
            data_type: result.data_type(),
            quality: Quality::from_status_code(result.status_code),
            value: result.value,
            source_timestamp: result.source_timestamp,
            server_timestamp: result.server_timestamp,
            status_code: result.status_code,
        }
    }
}

// =============================================================================
// ConnectionRegistry
// =============================================================================

struct RegistryInner {
    config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    reconnect: ReconnectionController,
    subscriptions: SubscriptionManager,
    browser: AddressSpaceBrowser,
    dispatcher: DataChangeDispatcher,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for entry in self.connections.iter() {
            entry.value().cancellation_token().cancel();
        }
    }
}

/// Registry of managed OPC UA connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

/// Weak handle held by background tasks.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<ConnectionRegistry> {
        self.0.upgrade().map(|inner| ConnectionRegistry { inner })
    }
}

impl ConnectionRegistry {
    /// Creates a registry.
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        config: ManagerConfig,
        sink: Arc<dyn DataSink>,
    ) -> Self {
        let policy = BackoffPolicy::from_settings(&config.reconnect);
        let subscriptions = SubscriptionManager::new(config.subscription.clone());
        Self {
            inner: Arc::new(RegistryInner {
                config,
                factory,
                connections: DashMap::new(),
                reconnect: ReconnectionController::new(policy),
                subscriptions,
                browser: AddressSpaceBrowser::new(),
                dispatcher: DataChangeDispatcher::new(sink),
            }),
        }
    }

    /// Creates a registry with default settings that logs every sample.
    pub fn with_defaults(factory: Arc<dyn TransportFactory>) -> Self {
        Self::new(factory, ManagerConfig::default(), Arc::new(TracingSink))
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub(crate) fn reconnection(&self) -> &ReconnectionController {
        &self.inner.reconnect
    }

    /// Dispatcher counters.
    pub fn dispatcher_stats(&self) -> DispatcherStatsSnapshot {
        self.inner.dispatcher.stats()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    /// Returns the connection registered under `id`.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner
            .connections
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Registers a connection for `endpoint_url` and connects it.
    ///
    /// If a connection for the endpoint already exists it is returned as is
    /// and `options` are ignored. While that connection is being
    /// disconnected the call fails with `ConnectionUnavailable`; it can be
    /// repeated once the disconnect returns. A failed connect leaves the
    /// connection registered in status `error` and returns the failure.
    pub async fn create_connection(
        &self,
        endpoint_url: &str,
        options: ConnectionOptions,
    ) -> OpcUaResult<ConnectionStatusView> {
        let id = ConnectionId::from_endpoint(endpoint_url);

        let (connection, events) = match self.inner.connections.entry(id.clone()) {
            Entry::Occupied(existing) => {
                let connection = Arc::clone(existing.get());
                drop(existing);
                if connection.is_closing() {
                    tracing::debug!(connection_id = %id, "Create requested while disconnecting");
                    return Err(OpcUaError::unavailable(
                        id.as_str(),
                        "connection is being disconnected",
                    ));
                }
                tracing::debug!(
                    connection_id = %id,
                    endpoint = %endpoint_url.trim(),
                    "Connection already exists; options ignored"
                );
                return Ok(self.view(&connection));
            }
            Entry::Vacant(slot) => {
                let (sender, events) = TransportEventSender::channel();
                let transport =
                    self.inner
                        .factory
                        .create(endpoint_url.trim(), &options, &self.inner.config, sender)?;
                let connection = Arc::new(Connection::new(endpoint_url, options, Arc::from(transport)));
                slot.insert(Arc::clone(&connection));
                (connection, events)
            }
        };

        self.inner.reconnect.reset(&id);
        spawn_event_pump(self.downgrade(), &connection, events);
        tracing::info!(connection_id = %id, endpoint = %connection.endpoint_url(), "Connection registered");

        self.connect(&connection).await?;
        Ok(self.view(&connection))
    }

    async fn connect(&self, connection: &Arc<Connection>) -> OpcUaResult<()> {
        let _lifecycle = connection.lock_lifecycle().await;

        let request = connection.session_request(
            &self.inner.config.application_name,
            self.inner.config.session_timeout,
        );
        let result = match connection.establish(request).await {
            Ok(session) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    session_id = %session.session_id,
                    "Session created"
                );
                self.inner
                    .subscriptions
                    .ensure_subscription(connection)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => tracing::info!(
                connection_id = %connection.id(),
                endpoint = %connection.endpoint_url(),
                "Connected"
            ),
            Err(e) => {
                connection.set_status(ConnectionStatus::Error);
                if connection.take_session().is_some() {
                    if let Err(close) = connection.transport().close_session().await {
                        tracing::trace!(connection_id = %connection.id(), error = %close, "Session close after failed connect failed");
                    }
                }
                tracing::error!(
                    connection_id = %connection.id(),
                    endpoint = %connection.endpoint_url(),
                    error_code = %e.error_code(),
                    error = %e,
                    "Connect failed"
                );
            }
        }
        result
    }

    /// Status of one connection.
    pub fn get_status(&self, id: &ConnectionId) -> OpcUaResult<ConnectionStatusView> {
        self.connection(id)
            .map(|connection| self.view(&connection))
            .ok_or_else(|| OpcUaError::not_found(id.as_str()))
    }

    /// Status of every connection, ordered by id.
    pub fn list_statuses(&self) -> Vec<ConnectionStatusView> {
        let connections: Vec<Arc<Connection>> = self
            .inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut views: Vec<_> = connections.iter().map(|c| self.view(c)).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    fn view(&self, connection: &Connection) -> ConnectionStatusView {
        connection.view(self.inner.reconnect.attempts(connection.id()))
    }

    /// Tears the connection down and forgets it.
    ///
    /// Teardown is best effort: subscription, session and transport are each
    /// closed even if an earlier step failed, and failures are only logged.
    /// An unknown id is a no-op.
    pub async fn disconnect(&self, id: &ConnectionId) -> OpcUaResult<()> {
        let Some(connection) = self.connection(id) else {
            tracing::debug!(connection_id = %id, "Disconnect requested for unknown connection");
            return Ok(());
        };

        connection.cancellation_token().cancel();
        connection.cancel_reconnect();
        connection.bump_generation();

        let _lifecycle = connection.lock_lifecycle().await;
        for failure in connection.teardown().await {
            tracing::warn!(
                connection_id = %id,
                error_code = %failure.error_code(),
                error = %failure,
                "Teardown step failed"
            );
        }

        self.inner
            .connections
            .remove_if(id, |_, registered| Arc::ptr_eq(registered, &connection));
        self.inner.reconnect.remove(id);

        tracing::info!(connection_id = %id, endpoint = %connection.endpoint_url(), "Disconnected");
        Ok(())
    }

    /// Disconnects every registered connection.
    pub async fn disconnect_all(&self) {
        let ids: Vec<ConnectionId> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        tracing::info!(count = ids.len(), "Disconnecting all connections");
        for id in ids {
            if let Err(e) = self.disconnect(&id).await {
                e.log("disconnect_all");
            }
        }
    }

    // =========================================================================
    // Address space
    // =========================================================================

    /// Lists children of `node_id` (default `RootFolder`).
    pub async fn browse(
        &self,
        id: &ConnectionId,
        node_id: Option<&NodeId>,
        max_results: Option<usize>,
    ) -> OpcUaResult<Vec<BrowseNode>> {
        let connection = self.session_connection(id)?;
        let root = NodeId::ROOT_FOLDER;
        let node_id = node_id.unwrap_or(&root);
        let max_results = max_results.unwrap_or(self.inner.config.browse_max_results);

        self.inner
            .browser
            .browse(connection.transport().as_ref(), node_id, max_results)
            .await
    }

    /// Searches the address space from `RootFolder` for `term`.
    pub async fn search(
        &self,
        id: &ConnectionId,
        term: &str,
        max_results: Option<usize>,
    ) -> OpcUaResult<Vec<BrowseNode>> {
        let connection = self.session_connection(id)?;
        let max_results = max_results.unwrap_or(self.inner.config.search_max_results);
        let root = NodeId::ROOT_FOLDER;

        self.inner
            .browser
            .search(connection.transport().as_ref(), &root, term, max_results)
            .await
    }

    /// Reads the current value of `node_id`.
    pub async fn read_value(&self, id: &ConnectionId, node_id: &NodeId) -> OpcUaResult<ReadValueResult> {
        let connection = self.session_connection(id)?;
        let result = connection.transport().read_value(node_id).await?;
        tracing::trace!(connection_id = %id, node_id = %node_id, status_code = result.status_code, "Value read");
        Ok(result.into())
    }

    fn session_connection(&self, id: &ConnectionId) -> OpcUaResult<Arc<Connection>> {
        let connection = self
            .connection(id)
            .ok_or_else(|| OpcUaError::unavailable(id.as_str(), "connection not found"))?;
        if !connection.has_session() {
            return Err(OpcUaError::unavailable(id.as_str(), "no active session"));
        }
        Ok(connection)
    }

    // =========================================================================
    // Monitored items
    // =========================================================================

    /// Starts monitoring `node_id`, replacing any existing item for it.
    pub async fn add_monitored_item(
        &self,
        id: &ConnectionId,
        node_id: &NodeId,
        options: MonitoringOptions,
    ) -> OpcUaResult<MonitoredItemId> {
        let connection = self
            .connection(id)
            .ok_or_else(|| OpcUaError::unavailable(id.as_str(), "connection not found"))?;
        let settings = options.resolve(&self.inner.config);

        let _lifecycle = connection.lock_lifecycle().await;
        self.inner
            .subscriptions
            .add_item(&connection, node_id.clone(), settings)
            .await
    }

    /// Stops monitoring `node_id`. Other items are left untouched.
    pub async fn remove_monitored_item(&self, id: &ConnectionId, node_id: &NodeId) -> OpcUaResult<()> {
        let connection = self
            .connection(id)
            .ok_or_else(|| OpcUaError::unavailable(id.as_str(), "connection not found"))?;

        let _lifecycle = connection.lock_lifecycle().await;
        if !self.inner.subscriptions.remove_item(&connection, node_id).await? {
            tracing::debug!(connection_id = %id, node_id = %node_id, "Item was not monitored");
        }
        Ok(())
    }

    /// Monitored items of a connection, in insertion order.
    pub fn monitored_items(&self, id: &ConnectionId) -> OpcUaResult<Vec<MonitoredItem>> {
        self.connection(id)
            .map(|connection| connection.monitored_items().snapshot())
            .ok_or_else(|| OpcUaError::unavailable(id.as_str(), "connection not found"))
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    pub(crate) async fn handle_event(&self, connection: &Arc<Connection>, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionLost => {
                self.inner.reconnect.handle_connection_lost(self, connection);
            }
            TransportEvent::ConnectionReestablished => {
                self.handle_reestablished(connection).await;
            }
            TransportEvent::KeepAlive { subscription_id } => {
                connection.record_keep_alive();
                tracing::debug!(connection_id = %connection.id(), subscription_id, "Keep-alive");
            }
            TransportEvent::SubscriptionTerminated { subscription_id } => {
                if connection.drop_subscription_if(subscription_id) {
                    connection.monitored_items().detach_all();
                }
                tracing::warn!(connection_id = %connection.id(), subscription_id, "Subscription terminated by server");
            }
            TransportEvent::DataChange(change) => {
                self.inner.dispatcher.dispatch(connection, change);
            }
        }
    }

    /// The transport restored the connection without our loop.
    async fn handle_reestablished(&self, connection: &Arc<Connection>) {
        if connection.is_closing() {
            return;
        }
        let cancelled = connection.cancel_reconnect();
        let generation = connection.bump_generation();

        let _lifecycle = connection.lock_lifecycle().await;
        if !self.is_live(connection, generation) {
            return;
        }

        if !connection.resume_session() {
            let request = connection.session_request(
                &self.inner.config.application_name,
                self.inner.config.session_timeout,
            );
            if let Err(e) = connection.open_session(request).await {
                connection.set_status(ConnectionStatus::Error);
                e.log("session after transport recovery");
                return;
            }
        }

        self.inner.reconnect.reset(connection.id());
        connection.clear_exhausted();
        connection.set_status(ConnectionStatus::Connected);
        connection.record_reconnect();
        tracing::info!(
            connection_id = %connection.id(),
            cancelled_loop = cancelled,
            "Connection re-established by transport"
        );

        if let Err(e) = self.inner.subscriptions.rebuild_after_reconnect(connection).await {
            e.log("subscription rebuild");
        }
    }

    // =========================================================================
    // Reconnection support
    // =========================================================================

    /// Returns `true` if `connection` is still the registered connection for
    /// its id and no newer work has superseded `generation`.
    pub(crate) fn is_live(&self, connection: &Arc<Connection>, generation: u64) -> bool {
        !connection.is_closing()
            && connection.generation() == generation
            && self
                .inner
                .connections
                .get(connection.id())
                .is_some_and(|registered| Arc::ptr_eq(registered.value(), connection))
    }

    /// One reconnection attempt. `Ok(false)` means the attempt was
    /// superseded and the loop should stop.
    pub(crate) async fn reconnect_once(
        &self,
        connection: &Arc<Connection>,
        token: &CancellationToken,
        generation: u64,
    ) -> OpcUaResult<bool> {
        let _lifecycle = connection.lock_lifecycle().await;
        if token.is_cancelled() || !self.is_live(connection, generation) {
            return Ok(false);
        }

        connection.set_status(ConnectionStatus::Connecting);
        if let Err(e) = connection.transport().disconnect().await {
            tracing::trace!(connection_id = %connection.id(), error = %e, "Pre-reconnect disconnect failed");
        }

        let request = connection.session_request(
            &self.inner.config.application_name,
            self.inner.config.session_timeout,
        );
        if let Err(e) = connection.establish(request).await {
            connection.take_session();
            connection.set_status(ConnectionStatus::Disconnected);
            return Err(e);
        }

        self.inner.reconnect.reset(connection.id());
        connection.set_status(ConnectionStatus::Connected);
        connection.clear_exhausted();
        connection.record_reconnect();

        if let Err(e) = self.inner.subscriptions.rebuild_after_reconnect(connection).await {
            e.log("subscription rebuild");
        }
        Ok(true)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.inner.connections.len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
