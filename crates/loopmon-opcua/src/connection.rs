// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! A single managed connection to one OPC UA endpoint.
//!
//! [`Connection`] owns the transport, the session and subscription handles,
//! and the monitored item registry for its endpoint. Privileged lifecycle
//! work (connect, reconnect, teardown, item changes) runs under the
//! connection's lifecycle lock; readers only touch the short-lived state
//! lock.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::{IdentityToken, OpcUaTransport, SessionInfo, SessionRequest};
use crate::error::{OpcUaError, OpcUaResult};
use crate::monitored::MonitoredItemRegistry;
use crate::subscription::SubscriptionHandle;
use crate::types::ConnectionOptions;

// =============================================================================
// ConnectionId
// =============================================================================

/// Deterministic connection identifier derived from the endpoint URL.
///
/// `conn-` followed by the 32 hex digits of the UUID v5 (URL namespace) of
/// the trimmed endpoint URL. Only `[a-z0-9-]` appear in it.
///
/// # Examples
///
/// ```
/// use loopmon_opcua::connection::ConnectionId;
///
/// let a = ConnectionId::from_endpoint("opc.tcp://plc-1:4840");
/// let b = ConnectionId::from_endpoint(" opc.tcp://plc-1:4840 ");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 37);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Derives the id for an endpoint URL.
    pub fn from_endpoint(endpoint_url: &str) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, endpoint_url.trim().as_bytes());
        Self(format!("conn-{}", uuid.simple()))
    }

    /// Wraps an id received from a caller without validating it.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// ConnectionStatus
// =============================================================================

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected.
    #[default]
    Disconnected,
    /// Transport or session setup in progress.
    Connecting,
    /// Transport open.
    Connected,
    /// Initial connect failed.
    Error,
}

impl ConnectionStatus {
    /// Returns the status name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ConnectionStatusView
// =============================================================================

/// Read-only snapshot of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusView {
    /// Connection id.
    pub id: ConnectionId,
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Current status.
    pub status: ConnectionStatus,
    /// Number of registered monitored items.
    pub monitored_items_count: usize,
    /// Consecutive failed reconnection attempts.
    pub reconnect_attempts: u32,
    /// A reconnection loop is active.
    pub reconnecting: bool,
    /// The reconnection loop gave up.
    pub reconnect_exhausted: bool,
    /// Id of the live subscription.
    pub subscription_id: Option<u32>,
    /// Time of the last publish keep-alive.
    pub last_keep_alive: Option<DateTime<Utc>>,
    /// Samples published for this connection since it was created.
    pub samples_received: u64,
    /// Receipt time of the most recent sample.
    pub last_sample_at: Option<DateTime<Utc>>,
    /// Times the connection came back after being lost.
    pub total_reconnects: u64,
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug)]
struct ReconnectLoop {
    id: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct ConnectionState {
    status: ConnectionStatus,
    session: Option<SessionInfo>,
    /// Session parked while the transport is down; the client stack may
    /// reactivate it on its own.
    suspended_session: Option<SessionInfo>,
    subscription: Option<SubscriptionHandle>,
    last_keep_alive: Option<DateTime<Utc>>,
    samples_received: u64,
    last_sample_at: Option<DateTime<Utc>>,
    total_reconnects: u64,
    reconnect_exhausted: bool,
    reconnect_loop: Option<ReconnectLoop>,
}

/// One managed connection.
pub struct Connection {
    id: ConnectionId,
    endpoint_url: String,
    options: ConnectionOptions,
    transport: Arc<dyn OpcUaTransport>,
    state: RwLock<ConnectionState>,
    items: MonitoredItemRegistry,
    lifecycle: Mutex<()>,
    generation: AtomicU64,
    next_loop_id: AtomicU64,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Connection {
    /// Creates a connection in status `disconnected`.
    pub fn new(
        endpoint_url: impl Into<String>,
        options: ConnectionOptions,
        transport: Arc<dyn OpcUaTransport>,
    ) -> Self {
        let endpoint_url = endpoint_url.into();
        Self {
            id: ConnectionId::from_endpoint(&endpoint_url),
            endpoint_url: endpoint_url.trim().to_string(),
            options,
            transport,
            state: RwLock::new(ConnectionState::default()),
            items: MonitoredItemRegistry::new(),
            lifecycle: Mutex::new(()),
            generation: AtomicU64::new(0),
            next_loop_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            created_at: Utc::now(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Options the connection was created with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// The connection's transport.
    pub fn transport(&self) -> &Arc<dyn OpcUaTransport> {
        &self.transport
    }

    /// Monitored items of this connection.
    pub fn monitored_items(&self) -> &MonitoredItemRegistry {
        &self.items
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    /// Sets the status.
    pub fn set_status(&self, status: ConnectionStatus) {
        let previous = std::mem::replace(&mut self.state.write().status, status);
        if previous != status {
            tracing::debug!(
                connection_id = %self.id,
                from = %previous,
                to = %status,
                "Connection status changed"
            );
        }
    }

    /// Active session, if any.
    pub fn session(&self) -> Option<SessionInfo> {
        self.state.read().session.clone()
    }

    /// Returns `true` if a session is active.
    pub fn has_session(&self) -> bool {
        self.state.read().session.is_some()
    }

    pub(crate) fn take_session(&self) -> Option<SessionInfo> {
        let mut state = self.state.write();
        state.suspended_session = None;
        state.session.take()
    }

    /// Parks the session after the transport was lost. No session is
    /// reported until [`resume_session`](Self::resume_session) or a new
    /// [`establish`](Self::establish).
    pub(crate) fn suspend_session(&self) {
        let mut state = self.state.write();
        if let Some(session) = state.session.take() {
            state.suspended_session = Some(session);
        }
    }

    /// Restores a parked session after transport-side recovery.
    pub(crate) fn resume_session(&self) -> bool {
        let mut state = self.state.write();
        match state.suspended_session.take() {
            Some(session) => {
                state.session = Some(session);
                true
            }
            None => state.session.is_some(),
        }
    }

    /// Live subscription, if any.
    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.state.read().subscription.clone()
    }

    pub(crate) fn set_subscription(&self, handle: SubscriptionHandle) {
        self.state.write().subscription = Some(handle);
    }

    pub(crate) fn take_subscription(&self) -> Option<SubscriptionHandle> {
        self.state.write().subscription.take()
    }

    /// Drops the subscription handle if it still refers to `subscription_id`.
    pub(crate) fn drop_subscription_if(&self, subscription_id: u32) -> bool {
        let mut state = self.state.write();
        match &state.subscription {
            Some(handle) if handle.subscription_id == subscription_id => {
                state.subscription = None;
                true
            }
            _ => false,
        }
    }

    /// Records a publish keep-alive.
    pub(crate) fn record_keep_alive(&self) {
        self.state.write().last_keep_alive = Some(Utc::now());
    }

    pub(crate) fn record_sample(&self, received_at: DateTime<Utc>) {
        let mut state = self.state.write();
        state.samples_received += 1;
        state.last_sample_at = Some(received_at);
    }

    pub(crate) fn record_reconnect(&self) {
        self.state.write().total_reconnects += 1;
    }

    pub(crate) fn mark_exhausted(&self) {
        let mut state = self.state.write();
        state.reconnect_exhausted = true;
        state.status = ConnectionStatus::Disconnected;
    }

    pub(crate) fn clear_exhausted(&self) {
        self.state.write().reconnect_exhausted = false;
    }

    // =========================================================================
    // Lifecycle coordination
    // =========================================================================

    /// Serializes connect, reconnect, teardown and item changes.
    pub(crate) async fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Current generation. Bumped whenever pending reconnection work is
    /// superseded.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Parent token of every task working on this connection.
    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `true` once `Disconnect` started.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Claims the reconnection slot. Returns the loop id and its token, or
    /// `None` when a loop is already active.
    pub(crate) fn begin_reconnect(&self) -> Option<(u64, CancellationToken)> {
        let mut state = self.state.write();
        if state.reconnect_loop.is_some() {
            return None;
        }
        let id = self.next_loop_id.fetch_add(1, Ordering::Relaxed);
        let token = self.cancel.child_token();
        state.reconnect_loop = Some(ReconnectLoop {
            id,
            token: token.clone(),
        });
        Some((id, token))
    }

    /// Releases the reconnection slot if loop `loop_id` still holds it.
    pub(crate) fn end_reconnect(&self, loop_id: u64) {
        let mut state = self.state.write();
        if state.reconnect_loop.as_ref().map(|l| l.id) == Some(loop_id) {
            state.reconnect_loop = None;
        }
    }

    /// Cancels the active reconnection loop, if any.
    pub(crate) fn cancel_reconnect(&self) -> bool {
        match self.state.write().reconnect_loop.take() {
            Some(active) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Transport steps
    // =========================================================================

    /// Opens the transport and creates the session.
    ///
    /// Status moves to `connecting`, then to `connected` once the transport
    /// is open. The caller holds the lifecycle lock and decides the status on
    /// failure.
    pub(crate) async fn establish(&self, request: SessionRequest) -> OpcUaResult<SessionInfo> {
        self.take_session();
        self.set_status(ConnectionStatus::Connecting);

        tracing::trace!(connection_id = %self.id, endpoint = %self.endpoint_url, "Opening transport");
        self.transport.connect().await?;
        self.set_status(ConnectionStatus::Connected);

        self.open_session(request).await
    }

    /// Creates a session on an already open transport.
    pub(crate) async fn open_session(&self, request: SessionRequest) -> OpcUaResult<SessionInfo> {
        tracing::trace!(connection_id = %self.id, "Creating session");
        let session = self.transport.create_session(request).await?;
        self.state.write().session = Some(session.clone());

        Ok(session)
    }

    /// Session parameters for this connection.
    pub(crate) fn session_request(
        &self,
        application_name: &str,
        default_timeout: Duration,
    ) -> SessionRequest {
        SessionRequest {
            session_name: format!("{} {}", application_name, self.id),
            timeout: self.options.session_timeout.unwrap_or(default_timeout),
            identity: IdentityToken::from_options(&self.options),
        }
    }

    /// Ordered, best-effort teardown: subscription, session, transport.
    ///
    /// Every step runs even if an earlier one failed. Returns the failures.
    pub(crate) async fn teardown(&self) -> Vec<OpcUaError> {
        let mut failures = Vec::new();

        if let Some(subscription) = self.take_subscription() {
            if let Err(e) = self
                .transport
                .delete_subscription(subscription.subscription_id)
                .await
            {
                failures.push(e);
            }
        }
        self.items.detach_all();

        if self.take_session().is_some() {
            if let Err(e) = self.transport.close_session().await {
                failures.push(e);
            }
        }

        if let Err(e) = self.transport.disconnect().await {
            failures.push(e);
        }

        self.set_status(ConnectionStatus::Disconnected);
        failures
    }

    /// Builds the status view.
    pub fn view(&self, reconnect_attempts: u32) -> ConnectionStatusView {
        let state = self.state.read();
        ConnectionStatusView {
            id: self.id.clone(),
            endpoint_url: self.endpoint_url.clone(),
            status: state.status,
            monitored_items_count: self.items.len(),
            reconnect_attempts,
            reconnecting: state.reconnect_loop.is_some(),
            reconnect_exhausted: state.reconnect_exhausted,
            subscription_id: state.subscription.as_ref().map(|s| s.subscription_id),
            last_keep_alive: state.last_keep_alive,
            samples_received: state.samples_received,
            last_sample_at: state.last_sample_at,
            total_reconnects: state.total_reconnects,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint_url", &self.endpoint_url)
            .field("status", &self.status())
            .field("monitored_items", &self.items.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_id_deterministic_and_url_safe() {
        let id = ConnectionId::from_endpoint("opc.tcp://192.168.0.10:4840/UA/Server");
        assert_eq!(id, ConnectionId::from_endpoint("opc.tcp://192.168.0.10:4840/UA/Server"));
        assert!(id.as_str().starts_with("conn-"));
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!id.as_str().contains(':'));
    }

    #[test]
    fn test_connection_id_distinct_for_similar_urls() {
        // URLs that differ only in characters a strip-non-alphanumeric
        // encoding would erase.
        let urls = [
            "opc.tcp://plc-1:4840",
            "opc.tcp://plc1:4840",
            "opc.tcp://plc-1:484/0",
            "opc.tcp://plc_1:4840",
            "opc.tcp://PLC-1:4840",
            "opc.tcp://plc-1:4840/",
        ];
        let ids: HashSet<_> = urls.iter().map(|u| ConnectionId::from_endpoint(u)).collect();
        assert_eq!(ids.len(), urls.len());
    }

    #[test]
    fn test_connection_id_many_endpoints() {
        let ids: HashSet<_> = (0..2000)
            .map(|i| ConnectionId::from_endpoint(&format!("opc.tcp://10.0.{}.{}:4840", i / 256, i % 256)))
            .collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connecting).unwrap(),
            "\"connecting\""
        );
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let view = ConnectionStatusView {
            id: ConnectionId::from_endpoint("opc.tcp://a:1"),
            endpoint_url: "opc.tcp://a:1".to_string(),
            status: ConnectionStatus::Connected,
            monitored_items_count: 2,
            reconnect_attempts: 0,
            reconnecting: false,
            reconnect_exhausted: false,
            subscription_id: Some(1),
            last_keep_alive: None,
            samples_received: 12,
            last_sample_at: None,
            total_reconnects: 1,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["endpointUrl"], "opc.tcp://a:1");
        assert_eq!(json["monitoredItemsCount"], 2);
        assert_eq!(json["reconnectAttempts"], 0);
        assert_eq!(json["status"], "connected");
        assert_eq!(json["samplesReceived"], 12);
        assert_eq!(json["totalReconnects"], 1);
        assert!(json["lastSampleAt"].is_null());
    }
}
