// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-connection monitored item bookkeeping.
//!
//! A [`MonitoredItemRegistry`] keeps at most one [`MonitoredItem`] per node,
//! in insertion order, together with the sampling parameters needed to
//! replay it after a reconnection and the most recent observed value.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::client::OpcUaValue;
use crate::config::ManagerConfig;
use crate::connection::ConnectionId;
use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::types::{humantime_serde, MonitoredItemSettings, NodeId};

// =============================================================================
// MonitoringOptions
// =============================================================================

/// Caller-supplied sampling parameters; unset fields fall back to the
/// manager defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringOptions {
    /// Sampling interval.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub sampling_interval: Option<Duration>,

    /// Server-side queue size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
}

impl MonitoringOptions {
    /// Options with an explicit sampling interval.
    pub fn with_sampling_interval(interval: Duration) -> Self {
        Self {
            sampling_interval: Some(interval),
            ..Default::default()
        }
    }

    /// Resolves the options against the manager defaults.
    pub fn resolve(&self, config: &ManagerConfig) -> MonitoredItemSettings {
        let defaults = config.default_item_settings();
        MonitoredItemSettings {
            sampling_interval: self
                .sampling_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.sampling_interval),
            queue_size: self
                .queue_size
                .filter(|q| *q > 0)
                .unwrap_or(defaults.queue_size),
            discard_oldest: true,
        }
    }
}

// =============================================================================
// MonitoredItemId
// =============================================================================

/// Item identifier of the form `{connectionId}:{nodeId}`.
///
/// Connection ids never contain `:`, so the first colon always separates the
/// two halves even when the node id contains colons itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MonitoredItemId(String);

impl MonitoredItemId {
    /// Builds the id for a connection and node.
    pub fn new(connection_id: &ConnectionId, node_id: &NodeId) -> Self {
        Self(format!("{}:{}", connection_id, node_id))
    }

    /// Returns the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id back into its connection id and node id.
    pub fn parts(&self) -> OpcUaResult<(ConnectionId, NodeId)> {
        let (connection, node) = self.0.split_once(':').ok_or_else(|| {
            OpcUaError::configuration(ConfigurationError::invalid_value(
                "item_id",
                format!("'{}' has no connection prefix", self.0),
            ))
        })?;
        Ok((ConnectionId::from_raw(connection), node.parse()?))
    }
}

impl fmt::Display for MonitoredItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MonitoredItemId {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_string());
        id.parts()?;
        Ok(id)
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// A registered monitored item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredItem {
    /// Item id.
    pub item_id: MonitoredItemId,

    /// Monitored node.
    pub node_id: NodeId,

    /// Resolved sampling parameters.
    #[serde(flatten)]
    pub settings: MonitoredItemSettings,

    /// Server-side monitored item id while attached to a subscription.
    #[serde(skip)]
    pub server_handle: Option<u32>,

    /// Most recent value.
    pub last_value: Option<OpcUaValue>,

    /// Status code of the most recent value.
    pub last_status_code: Option<u32>,

    /// Local receipt time of the most recent value.
    pub last_update: Option<DateTime<Utc>>,

    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl MonitoredItem {
    /// Returns `true` if the item is attached to the live subscription.
    pub fn is_attached(&self) -> bool {
        self.server_handle.is_some()
    }
}

// =============================================================================
// MonitoredItemRegistry
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    items: HashMap<NodeId, MonitoredItem>,
    order: Vec<NodeId>,
}

/// Insertion-ordered map from node to monitored item for one connection.
#[derive(Debug, Default)]
pub struct MonitoredItemRegistry {
    state: RwLock<RegistryState>,
}

impl MonitoredItemRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attached item, replacing any entry for the same node.
    ///
    /// A replaced entry keeps its position in the replay order.
    pub fn upsert(
        &self,
        connection_id: &ConnectionId,
        node_id: NodeId,
        settings: MonitoredItemSettings,
        server_handle: u32,
    ) -> MonitoredItemId {
        let item_id = MonitoredItemId::new(connection_id, &node_id);
        let item = MonitoredItem {
            item_id: item_id.clone(),
            node_id: node_id.clone(),
            settings,
            server_handle: Some(server_handle),
            last_value: None,
            last_status_code: None,
            last_update: None,
            created_at: Utc::now(),
        };

        let mut state = self.state.write();
        if state.items.insert(node_id.clone(), item).is_none() {
            state.order.push(node_id);
        }
        item_id
    }

    /// Removes the entry for `node_id`, returning it.
    pub fn remove(&self, node_id: &NodeId) -> Option<MonitoredItem> {
        let mut state = self.state.write();
        let removed = state.items.remove(node_id)?;
        state.order.retain(|n| n != node_id);
        Some(removed)
    }

    /// Returns a copy of the entry for `node_id`.
    pub fn get(&self, node_id: &NodeId) -> Option<MonitoredItem> {
        self.state.read().items.get(node_id).cloned()
    }

    /// Returns `true` if `node_id` is registered.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.state.read().items.contains_key(node_id)
    }

    /// Server handle of the entry for `node_id`, if attached.
    pub fn server_handle(&self, node_id: &NodeId) -> Option<u32> {
        self.state
            .read()
            .items
            .get(node_id)
            .and_then(|item| item.server_handle)
    }

    /// Marks the entry as attached under a new server handle.
    pub fn attach(&self, node_id: &NodeId, server_handle: u32) -> bool {
        match self.state.write().items.get_mut(node_id) {
            Some(item) => {
                item.server_handle = Some(server_handle);
                true
            }
            None => false,
        }
    }

    /// Marks the entry as detached from any subscription.
    pub fn detach(&self, node_id: &NodeId) {
        if let Some(item) = self.state.write().items.get_mut(node_id) {
            item.server_handle = None;
        }
    }

    /// Marks every entry as detached.
    pub fn detach_all(&self) {
        for item in self.state.write().items.values_mut() {
            item.server_handle = None;
        }
    }

    /// Records an observed value. Returns the item id, or `None` if the node
    /// is not registered.
    pub fn record_value(
        &self,
        node_id: &NodeId,
        value: Option<OpcUaValue>,
        status_code: u32,
        received_at: DateTime<Utc>,
    ) -> Option<MonitoredItemId> {
        let mut state = self.state.write();
        let item = state.items.get_mut(node_id)?;
        item.last_value = value;
        item.last_status_code = Some(status_code);
        item.last_update = Some(received_at);
        Some(item.item_id.clone())
    }

    /// Node and settings of every entry, in insertion order.
    pub fn replay_list(&self) -> Vec<(NodeId, MonitoredItemSettings)> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|node| state.items.get(node))
            .map(|item| (item.node_id.clone(), item.settings.clone()))
            .collect()
    }

    /// Copies of every entry, in insertion order.
    pub fn snapshot(&self) -> Vec<MonitoredItem> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|node| state.items.get(node).cloned())
            .collect()
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Returns `true` if no items are registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.items.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::from_endpoint("opc.tcp://plc-1:4840")
    }

    fn settings() -> MonitoredItemSettings {
        MonitoredItemSettings::default()
    }

    #[test]
    fn test_item_id_round_trip_with_colons() {
        let node = NodeId::string(2, "Area:1.Tag");
        let id = MonitoredItemId::new(&conn(), &node);
        assert!(id.as_str().starts_with("conn-"));

        let (connection, parsed) = id.parts().unwrap();
        assert_eq!(connection, conn());
        assert_eq!(parsed, node);
        assert!("no-colon".parse::<MonitoredItemId>().is_err());
    }

    #[test]
    fn test_upsert_replaces_without_duplicating() {
        let registry = MonitoredItemRegistry::new();
        let tag1 = NodeId::string(2, "tag1");
        let tag2 = NodeId::string(2, "tag2");

        registry.upsert(&conn(), tag1.clone(), settings(), 1);
        registry.upsert(&conn(), tag2.clone(), settings(), 2);
        let slow = MonitoredItemSettings {
            sampling_interval: Duration::from_secs(1),
            ..settings()
        };
        registry.upsert(&conn(), tag1.clone(), slow.clone(), 3);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.server_handle(&tag1), Some(3));

        let replay = registry.replay_list();
        assert_eq!(replay[0], (tag1, slow));
        assert_eq!(replay[1].0, tag2);
    }

    #[test]
    fn test_remove_keeps_siblings() {
        let registry = MonitoredItemRegistry::new();
        let tag1 = NodeId::string(2, "tag1");
        let tag2 = NodeId::string(2, "tag2");
        registry.upsert(&conn(), tag1.clone(), settings(), 1);
        registry.upsert(&conn(), tag2.clone(), settings(), 2);

        assert!(registry.remove(&tag1).is_some());
        assert!(registry.remove(&tag1).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&tag2));
    }

    #[test]
    fn test_record_value_only_for_registered() {
        let registry = MonitoredItemRegistry::new();
        let tag = NodeId::string(2, "tag1");
        let now = Utc::now();

        assert!(registry
            .record_value(&tag, Some(OpcUaValue::Double(1.0)), 0, now)
            .is_none());

        registry.upsert(&conn(), tag.clone(), settings(), 1);
        let id = registry
            .record_value(&tag, Some(OpcUaValue::Double(2.0)), 0, now)
            .unwrap();
        assert_eq!(id, MonitoredItemId::new(&conn(), &tag));

        let item = registry.get(&tag).unwrap();
        assert_eq!(item.last_value, Some(OpcUaValue::Double(2.0)));
        assert_eq!(item.last_update, Some(now));
    }

    #[test]
    fn test_detach_and_attach() {
        let registry = MonitoredItemRegistry::new();
        let tag = NodeId::string(2, "tag1");
        registry.upsert(&conn(), tag.clone(), settings(), 7);

        registry.detach_all();
        assert!(!registry.get(&tag).unwrap().is_attached());
        assert!(registry.attach(&tag, 9));
        assert_eq!(registry.server_handle(&tag), Some(9));
        assert!(!registry.attach(&NodeId::string(2, "other"), 1));
    }

    #[test]
    fn test_options_resolve_defaults() {
        let config = ManagerConfig::default();
        let resolved = MonitoringOptions::default().resolve(&config);
        assert_eq!(resolved.sampling_interval, Duration::from_millis(200));
        assert_eq!(resolved.queue_size, 100);
        assert!(resolved.discard_oldest);

        let options = MonitoringOptions {
            sampling_interval: Some(Duration::from_millis(50)),
            queue_size: Some(5),
        };
        let resolved = options.resolve(&config);
        assert_eq!(resolved.sampling_interval, Duration::from_millis(50));
        assert_eq!(resolved.queue_size, 5);
    }
}
