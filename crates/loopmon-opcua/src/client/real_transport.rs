// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport on the `opcua` crate.
//!
//! [`RealOpcUaTransport`] drives one `opcua` client session per connection.
//! The SDK's own session retry is disabled: reconnection belongs to the
//! manager, which learns about a dropped channel through the
//! `ConnectionLost` event this transport emits from the SDK's connection
//! status callback.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use loopmon_opcua::client::RealTransportFactory;
//! use loopmon_opcua::ConnectionRegistry;
//!
//! let registry = ConnectionRegistry::with_defaults(Arc::new(RealTransportFactory::new()));
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::{
    AttributeService, BrowseDescription, BrowseDescriptionResultMask, BrowseDirection, Client,
    ClientBuilder, ConnectionStatusCallback, DataChangeCallback, DataValue, EndpointDescription,
    ExtensionObject, IdentityToken as UaIdentityToken, MessageSecurityMode, MonitoredItem,
    MonitoredItemCreateRequest, MonitoredItemService, MonitoringMode, MonitoringParameters,
    ReadValueId,
    ReferenceTypeId, Session, SessionCommand, SessionService, SubscriptionService,
    TimestampsToReturn, ViewService,
};
use opcua::sync::RwLock as UaRwLock;
use opcua::types::BrowseResult as UaBrowseResult;

use crate::client::transport::{
    BrowseResult, DataChangeEvent, IdentityToken, OpcUaTransport, OpcUaValue, ReadResult,
    SessionInfo, SessionRequest, TransportEvent, TransportEventSender, TransportFactory,
};
use crate::config::ManagerConfig;
use crate::error::{
    BrowseError, ConnectionError, OpcUaError, OpcUaResult, OperationError, SessionError,
    SubscriptionError,
};
use crate::types::{
    AttributeId, ConnectionOptions, MonitoredItemSettings, NodeClass, NodeId, NodeIdentifier,
    SecurityMode, SecurityPolicy, SubscriptionSettings,
};

// =============================================================================
// RealTransportFactory
// =============================================================================

/// Creates [`RealOpcUaTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct RealTransportFactory {
    pki_dir: Option<PathBuf>,
    trust_server_certs: bool,
}

impl RealTransportFactory {
    /// Creates a factory using the SDK's default PKI directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `dir` for the client certificate store.
    pub fn with_pki_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pki_dir = Some(dir.into());
        self
    }

    /// Accepts server certificates without a trust decision.
    pub fn trust_server_certs(mut self, trust: bool) -> Self {
        self.trust_server_certs = trust;
        self
    }
}

impl TransportFactory for RealTransportFactory {
    fn create(
        &self,
        endpoint_url: &str,
        options: &ConnectionOptions,
        config: &ManagerConfig,
        events: TransportEventSender,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
        if !endpoint_url.starts_with("opc.tcp://") {
            return Err(OpcUaError::connection(ConnectionError::invalid_endpoint(
                endpoint_url,
                "scheme must be opc.tcp://",
            )));
        }
        Ok(Box::new(RealOpcUaTransport {
            endpoint: endpoint_url.to_string(),
            application_name: config.application_name.clone(),
            security_mode: options.security_mode,
            security_policy: options.security_policy,
            identity: IdentityToken::from_options(options),
            session_timeout: options.session_timeout.unwrap_or(config.session_timeout),
            pki_dir: self.pki_dir.clone(),
            trust_server_certs: self.trust_server_certs,
            events,
            link: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
        }))
    }
}

// =============================================================================
// RealOpcUaTransport
// =============================================================================

struct Link {
    session: Arc<UaRwLock<Session>>,
    runner: Option<tokio::sync::oneshot::Sender<SessionCommand>>,
}

/// OPC UA transport backed by the `opcua` client.
pub struct RealOpcUaTransport {
    endpoint: String,
    application_name: String,
    security_mode: SecurityMode,
    security_policy: SecurityPolicy,
    identity: IdentityToken,
    session_timeout: Duration,
    pki_dir: Option<PathBuf>,
    trust_server_certs: bool,
    events: TransportEventSender,
    link: Mutex<Option<Link>>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

impl RealOpcUaTransport {
    fn client_builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::new()
            .application_name(self.application_name.as_str())
            .application_uri(format!("urn:{}", self.application_name))
            .product_uri(format!("urn:{}", self.application_name))
            .create_sample_keypair(true)
            .trust_server_certs(self.trust_server_certs)
            .session_retry_limit(0)
            .session_timeout(self.session_timeout.as_millis().min(u32::MAX as u128) as u32);

        if let Some(dir) = &self.pki_dir {
            builder = builder.pki_dir(dir.clone());
        }
        builder
    }

    fn session(&self) -> OpcUaResult<Arc<UaRwLock<Session>>> {
        self.link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.session))
            .ok_or_else(OpcUaError::not_connected)
    }

    /// Runs a blocking SDK call against the current session.
    async fn with_session<T, F>(&self, call: F) -> OpcUaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> OpcUaResult<T> + Send + 'static,
    {
        let session = self.session()?;
        blocking(move || {
            let session = session.read();
            call(&session)
        })
        .await
    }

    fn status_callback(&self) -> ConnectionStatusCallback {
        let events = self.events.clone();
        let connected = Arc::clone(&self.connected);
        let closing = Arc::clone(&self.closing);
        let endpoint = self.endpoint.clone();

        ConnectionStatusCallback::new(move |is_connected| {
            let was_connected = connected.swap(is_connected, Ordering::AcqRel);
            if closing.load(Ordering::Acquire) || was_connected == is_connected {
                return;
            }
            if is_connected {
                debug!(endpoint = %endpoint, "SDK reports connection restored");
                events.send(TransportEvent::ConnectionReestablished);
            } else {
                warn!(endpoint = %endpoint, "SDK reports connection lost");
                events.send(TransportEvent::ConnectionLost);
            }
        })
    }
}

async fn blocking<T, F>(call: F) -> OpcUaResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> OpcUaResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| OpcUaError::session_failed(format!("SDK task failed: {}", e)))?
}

fn select_endpoint(
    client: &Client,
    url: &str,
    mode: SecurityMode,
    policy: SecurityPolicy,
) -> OpcUaResult<EndpointDescription> {
    let endpoints = client.get_server_endpoints_from_url(url).map_err(|status| {
        debug!(endpoint = %url, status = %status, "Endpoint discovery failed");
        OpcUaError::connection(ConnectionError::endpoint_not_found(url))
    })?;

    let wanted = to_message_security_mode(mode);
    endpoints
        .into_iter()
        .find(|e| e.security_policy_uri.as_ref() == policy.uri() && e.security_mode == wanted)
        .ok_or_else(|| {
            OpcUaError::connection(ConnectionError::no_suitable_endpoint(mode.name(), policy.name()))
        })
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        self.closing.store(false, Ordering::Release);
        info!(endpoint = %self.endpoint, "Opening OPC UA channel");

        let builder = self.client_builder();
        let url = self.endpoint.clone();
        let (mode, policy) = (self.security_mode, self.security_policy);
        let identity = to_identity_token(&self.identity);
        let callback = self.status_callback();

        let session = blocking(move || {
            let mut client = builder.client().ok_or_else(|| {
                OpcUaError::connection(ConnectionError::invalid_endpoint(
                    &url,
                    "client configuration rejected",
                ))
            })?;
            let endpoint = select_endpoint(&client, &url, mode, policy)?;
            debug!(
                security_policy = %endpoint.security_policy_uri,
                security_mode = ?endpoint.security_mode,
                "Matched endpoint"
            );

            let session = client
                .new_session_from_endpoint(endpoint, identity)
                .map_err(|status| {
                    OpcUaError::connection(ConnectionError::refused(format!("{} ({})", url, status)))
                })?;
            {
                let mut guard = session.write();
                guard.set_connection_status_callback(callback);
                guard.connect().map_err(|status| {
                    OpcUaError::connection(ConnectionError::refused(format!("{} ({})", url, status)))
                })?;
            }
            Ok(session)
        })
        .await?;

        self.connected.store(true, Ordering::Release);
        *self.link.lock() = Some(Link {
            session,
            runner: None,
        });
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.closing.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);

        let Some(mut link) = self.link.lock().take() else {
            return Ok(());
        };
        if let Some(runner) = link.runner.take() {
            let _ = runner.send(SessionCommand::Stop);
        }
        let session = link.session;
        blocking(move || {
            session.read().disconnect();
            Ok(())
        })
        .await?;
        info!(endpoint = %self.endpoint, "OPC UA channel closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn create_session(&self, request: SessionRequest) -> OpcUaResult<SessionInfo> {
        trace!(endpoint = %self.endpoint, name = %request.session_name, "Creating session");
        let session = self.session()?;

        let (session_id, runner) = blocking(move || {
            let id = {
                let guard = session.read();
                let id = guard.create_session().map_err(|status| {
                    OpcUaError::session(SessionError::creation_failed(status.to_string()))
                })?;
                guard.activate_session().map_err(|status| {
                    OpcUaError::session(SessionError::activation_failed(status.to_string()))
                })?;
                id
            };
            Ok((id, Session::run_async(session)))
        })
        .await?;

        if let Some(link) = self.link.lock().as_mut() {
            link.runner = Some(runner);
        }

        Ok(SessionInfo {
            session_id: session_id.to_string(),
            revised_timeout: request.timeout,
        })
    }

    async fn close_session(&self) -> OpcUaResult<()> {
        self.with_session(|session| {
            session
                .close_session()
                .map_err(|status| OpcUaError::session(SessionError::close_failed(status.to_string())))
        })
        .await
    }

    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        let events = self.events.clone();
        let settings = settings.clone();

        let callback = DataChangeCallback::new(move |items| {
            for item in items.iter() {
                events.send(TransportEvent::DataChange(to_data_change(item)));
            }
        });

        let subscription_id = self
            .with_session(move |session| {
                session
                    .create_subscription(
                        settings.publishing_interval.as_millis() as f64,
                        settings.lifetime_count,
                        settings.max_keep_alive_count,
                        settings.max_notifications_per_publish,
                        settings.priority,
                        settings.publishing_enabled,
                        callback,
                    )
                    .map_err(|status| {
                        OpcUaError::subscription(SubscriptionError::creation_failed(status.to_string()))
                    })
            })
            .await?;

        trace!(subscription_id, "Subscription created");
        Ok(subscription_id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.with_session(move |session| {
            session.delete_subscription(subscription_id).map(|_| ()).map_err(|status| {
                OpcUaError::subscription(SubscriptionError::delete_failed(
                    subscription_id,
                    status.to_string(),
                ))
            })
        })
        .await
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<u32> {
        let node = node_id.to_string();
        let request = MonitoredItemCreateRequest {
            item_to_monitor: read_value_id(node_id, AttributeId::Value),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: 0,
                sampling_interval: settings.sampling_interval.as_millis() as f64,
                filter: ExtensionObject::null(),
                queue_size: settings.queue_size,
                discard_oldest: settings.discard_oldest,
            },
        };

        self.with_session(move |session| {
            let results = session
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[request])
                .map_err(|status| OpcUaError::monitored_item_failed(&node, status.to_string()))?;

            let result = results
                .first()
                .ok_or_else(|| OpcUaError::monitored_item_failed(&node, "no result returned"))?;
            if !result.status_code.is_good() {
                return Err(OpcUaError::monitored_item_failed(&node, result.status_code.to_string()));
            }
            Ok(result.monitored_item_id)
        })
        .await
    }

    async fn delete_monitored_items(&self, subscription_id: u32, item_ids: &[u32]) -> OpcUaResult<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let item_ids = item_ids.to_vec();
        self.with_session(move |session| {
            session
                .delete_monitored_items(subscription_id, &item_ids)
                .map(|_| ())
                .map_err(|status| {
                    OpcUaError::subscription(SubscriptionError::monitored_item_failed(
                        format!("subscription {}", subscription_id),
                        status.to_string(),
                    ))
                })
        })
        .await
    }

    async fn browse(&self, node_id: &NodeId, node_class_mask: u32) -> OpcUaResult<Vec<BrowseResult>> {
        let node = node_id.to_string();
        let description = browse_description(to_ua_node_id(node_id), node_class_mask);

        let (result, child_results) = self
            .with_session(move |session| {
                let result = session
                    .browse(&[description])
                    .map_err(|status| {
                        OpcUaError::browse(BrowseError::browse_failed(&node, status.to_string()))
                    })?
                    .unwrap_or_default()
                    .into_iter()
                    .next();
                let Some(result) = result else {
                    return Ok((None, Vec::new()));
                };

                let children: Vec<BrowseDescription> = result
                    .references
                    .iter()
                    .flatten()
                    .map(|reference| {
                        browse_description(reference.node_id.node_id.clone(), node_class_mask)
                    })
                    .collect();
                if children.is_empty() || !result.status_code.is_good() {
                    return Ok((Some(result), Vec::new()));
                }

                // One batched call tells which children have references of their own.
                let child_results = match session.browse(&children) {
                    Ok(results) => results.unwrap_or_default(),
                    Err(status) => {
                        debug!(node_id = %node, status = %status, "Child reference browse failed");
                        Vec::new()
                    }
                };
                release_continuation_points(session, &child_results);
                Ok((Some(result), child_results))
            })
            .await?;

        let Some(result) = result else {
            return Ok(Vec::new());
        };
        if !result.status_code.is_good() {
            return Err(OpcUaError::browse(BrowseError::browse_failed(
                node_id.to_string(),
                result.status_code.to_string(),
            )));
        }

        Ok(result
            .references
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, reference)| {
                let node_class = NodeClass::from_value(reference.node_class as u32);
                let has_children = child_results
                    .get(index)
                    .and_then(has_forward_references)
                    .unwrap_or_else(|| matches!(node_class, NodeClass::Object | NodeClass::View));
                BrowseResult {
                    node_id: from_ua_node_id(&reference.node_id.node_id),
                    browse_name: reference.browse_name.name.as_ref().to_string(),
                    display_name: reference.display_name.text.as_ref().to_string(),
                    has_children,
                    node_class,
                }
            })
            .collect())
    }

    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<ReadResult> {
        let node = node_id.to_string();
        let request = read_value_id(node_id, attribute);

        let value = self
            .with_session(move |session| {
                let values = session
                    .read(&[request], TimestampsToReturn::Both, 0.0)
                    .map_err(|status| {
                        OpcUaError::operation(OperationError::read_failed(&node, status.to_string()))
                    })?;
                Ok(values.into_iter().next())
            })
            .await?;

        Ok(match value {
            Some(data_value) => to_read_result(node_id, &data_value),
            None => ReadResult::failure(node_id.clone(), BAD_NO_DATA),
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// Conversions
// =============================================================================

const BAD_NO_DATA: u32 = 0x809B_0000;

fn to_message_security_mode(mode: SecurityMode) -> MessageSecurityMode {
    match mode {
        SecurityMode::None => MessageSecurityMode::None,
        SecurityMode::Sign => MessageSecurityMode::Sign,
        SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
    }
}

fn to_identity_token(identity: &IdentityToken) -> UaIdentityToken {
    match identity {
        IdentityToken::Anonymous => UaIdentityToken::Anonymous,
        IdentityToken::UserName { username, password } => {
            UaIdentityToken::UserName(username.clone(), password.clone())
        }
    }
}

fn browse_description(node_id: opcua::types::NodeId, node_class_mask: u32) -> BrowseDescription {
    BrowseDescription {
        node_id,
        browse_direction: BrowseDirection::Forward,
        reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
        include_subtypes: true,
        node_class_mask,
        result_mask: BrowseDescriptionResultMask::all().bits(),
    }
}

/// Whether a browse result reports at least one reference. `None` when the
/// server could not browse the node.
fn has_forward_references(result: &UaBrowseResult) -> Option<bool> {
    if !result.status_code.is_good() {
        return None;
    }
    let listed = result.references.as_ref().is_some_and(|refs| !refs.is_empty());
    Some(listed || !result.continuation_point.is_null())
}

/// Frees server-side continuation points left by a browse whose remaining
/// references are not needed.
fn release_continuation_points(session: &Session, results: &[UaBrowseResult]) {
    let points: Vec<opcua::types::ByteString> = results
        .iter()
        .filter(|r| !r.continuation_point.is_null())
        .map(|r| r.continuation_point.clone())
        .collect();
    if points.is_empty() {
        return;
    }
    if let Err(status) = session.browse_next(true, &points) {
        trace!(status = %status, "Continuation point release failed");
    }
}

fn read_value_id(node_id: &NodeId, attribute: AttributeId) -> ReadValueId {
    ReadValueId {
        node_id: to_ua_node_id(node_id),
        attribute_id: attribute.value(),
        index_range: opcua::types::UAString::null(),
        data_encoding: opcua::types::QualifiedName::null(),
    }
}

fn to_ua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => {
            opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v))
        }
        NodeIdentifier::Opaque(v) => {
            opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice()))
        }
    }
}

fn from_ua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        opcua::types::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        opcua::types::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        opcua::types::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
        opcua::types::Identifier::ByteString(v) => {
            NodeId::opaque(ns, v.value.clone().unwrap_or_default())
        }
    }
}

fn to_utc(value: &opcua::types::DateTime) -> chrono::DateTime<chrono::Utc> {
    value.as_chrono()
}

fn from_variant(variant: &opcua::types::Variant) -> OpcUaValue {
    use opcua::types::Variant;

    match variant {
        Variant::Empty => OpcUaValue::Null,
        Variant::Boolean(v) => OpcUaValue::Boolean(*v),
        Variant::SByte(v) => OpcUaValue::SByte(*v),
        Variant::Byte(v) => OpcUaValue::Byte(*v),
        Variant::Int16(v) => OpcUaValue::Int16(*v),
        Variant::UInt16(v) => OpcUaValue::UInt16(*v),
        Variant::Int32(v) => OpcUaValue::Int32(*v),
        Variant::UInt32(v) => OpcUaValue::UInt32(*v),
        Variant::Int64(v) => OpcUaValue::Int64(*v),
        Variant::UInt64(v) => OpcUaValue::UInt64(*v),
        Variant::Float(v) => OpcUaValue::Float(*v),
        Variant::Double(v) => OpcUaValue::Double(*v),
        Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
        Variant::LocalizedText(v) => OpcUaValue::String(v.text.as_ref().to_string()),
        Variant::QualifiedName(v) => OpcUaValue::String(v.name.as_ref().to_string()),
        Variant::DateTime(v) => OpcUaValue::DateTime(to_utc(v)),
        Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
        Variant::Array(array) => OpcUaValue::Array(array.values.iter().map(from_variant).collect()),
        other => OpcUaValue::String(format!("{:?}", other)),
    }
}

fn to_read_result(node_id: &NodeId, data_value: &DataValue) -> ReadResult {
    let status_code = data_value.status.map(|s| s.bits()).unwrap_or(0);
    ReadResult {
        node_id: node_id.clone(),
        value: data_value.value.as_ref().map(from_variant),
        status_code,
        server_timestamp: data_value.server_timestamp.as_ref().map(to_utc),
        source_timestamp: data_value.source_timestamp.as_ref().map(to_utc),
    }
}

fn to_data_change(item: &MonitoredItem) -> DataChangeEvent {
    let node_id = from_ua_node_id(&item.item_to_monitor().node_id);
    let data_value = item.last_value();
    let value = data_value.value.as_ref().map(from_variant);
    DataChangeEvent {
        data_type: value.as_ref().filter(|v| !v.is_null()).map(OpcUaValue::data_type),
        node_id,
        value,
        status_code: data_value.status.map(|s| s.bits()).unwrap_or(0),
        source_timestamp: data_value.source_timestamp.as_ref().map(to_utc),
        server_timestamp: data_value.server_timestamp.as_ref().map(to_utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        for node in [
            NodeId::numeric(0, 85),
            NodeId::string(2, "Line1.Temperature"),
            NodeId::opaque(3, vec![1, 2, 3]),
        ] {
            assert_eq!(from_ua_node_id(&to_ua_node_id(&node)), node);
        }
    }

    #[test]
    fn test_variant_conversion() {
        use opcua::types::Variant;

        assert_eq!(from_variant(&Variant::Double(1.5)), OpcUaValue::Double(1.5));
        assert_eq!(from_variant(&Variant::Empty), OpcUaValue::Null);
        assert_eq!(
            from_variant(&Variant::from("pump")),
            OpcUaValue::String("pump".to_string())
        );
    }

    #[test]
    fn test_has_forward_references() {
        use opcua::types::{
            ByteString, ExpandedNodeId, LocalizedText, NodeClass as UaNodeClass, QualifiedName,
            ReferenceDescription, StatusCode,
        };

        let result = |status_code, references, continuation_point| UaBrowseResult {
            status_code,
            continuation_point,
            references,
        };
        let reference = ReferenceDescription {
            reference_type_id: ReferenceTypeId::Organizes.into(),
            is_forward: true,
            node_id: ExpandedNodeId::from(opcua::types::NodeId::new(2, "Line1.Temperature")),
            browse_name: QualifiedName::new(2, "Temperature"),
            display_name: LocalizedText::new("", "Temperature"),
            node_class: UaNodeClass::Variable,
            type_definition: ExpandedNodeId::null(),
        };

        let listed = result(StatusCode::Good, Some(vec![reference]), ByteString::null());
        assert_eq!(has_forward_references(&listed), Some(true));

        let empty = result(StatusCode::Good, Some(Vec::new()), ByteString::null());
        assert_eq!(has_forward_references(&empty), Some(false));
        let missing = result(StatusCode::Good, None, ByteString::null());
        assert_eq!(has_forward_references(&missing), Some(false));

        // References held back behind a continuation point still count.
        let deferred = result(StatusCode::Good, None, ByteString::from(vec![1u8, 2].as_slice()));
        assert_eq!(has_forward_references(&deferred), Some(true));

        let unknown = result(StatusCode::BadNodeIdUnknown, None, ByteString::null());
        assert_eq!(has_forward_references(&unknown), None);
    }

    #[test]
    fn test_factory_rejects_non_opc_scheme() {
        let (events, _rx) = TransportEventSender::channel();
        let result = RealTransportFactory::new().create(
            "http://plc:4840",
            &ConnectionOptions::default(),
            &ManagerConfig::default(),
            events,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_new_transport_is_disconnected() {
        let (events, _rx) = TransportEventSender::channel();
        let transport = RealTransportFactory::new()
            .create(
                "opc.tcp://plc:4840",
                &ConnectionOptions::default(),
                &ManagerConfig::default(),
                events,
            )
            .unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.endpoint(), "opc.tcp://plc:4840");
    }
}
