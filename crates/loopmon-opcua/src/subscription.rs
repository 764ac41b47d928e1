// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The single subscription per connection and the items attached to it.
//!
//! Every method here expects the caller to hold the connection's lifecycle
//! lock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::Connection;
use crate::error::{OpcUaError, OpcUaResult};
use crate::monitored::MonitoredItemId;
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

/// A live subscription on a connection's session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionHandle {
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Parameters it was created with.
    #[serde(skip)]
    pub settings: SubscriptionSettings,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`SubscriptionManager::rebuild_after_reconnect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Id of the fresh subscription.
    pub subscription_id: u32,
    /// Items re-added.
    pub restored: usize,
    /// Items that could not be re-added; they stay registered.
    pub failed: Vec<NodeId>,
}

/// Creates, rebuilds and populates per-connection subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    settings: SubscriptionSettings,
}

impl SubscriptionManager {
    /// Creates a manager that uses `settings` for every subscription.
    pub fn new(settings: SubscriptionSettings) -> Self {
        Self { settings }
    }

    /// Publishing parameters in use.
    pub fn settings(&self) -> &SubscriptionSettings {
        &self.settings
    }

    /// Returns the connection's subscription, creating it if none exists.
    pub async fn ensure_subscription(&self, connection: &Connection) -> OpcUaResult<SubscriptionHandle> {
        if let Some(existing) = connection.subscription() {
            return Ok(existing);
        }
        self.create(connection).await
    }

    /// Replaces the subscription with a fresh one and replays every
    /// registered item in insertion order.
    ///
    /// Individual item failures are logged and skipped; the failed items stay
    /// registered so a later rebuild can retry them.
    pub async fn rebuild_after_reconnect(&self, connection: &Connection) -> OpcUaResult<RebuildReport> {
        let transport = connection.transport();

        if let Some(stale) = connection.take_subscription() {
            if let Err(e) = transport.delete_subscription(stale.subscription_id).await {
                tracing::debug!(
                    connection_id = %connection.id(),
                    subscription_id = stale.subscription_id,
                    error = %e,
                    "Stale subscription could not be deleted"
                );
            }
        }
        connection.monitored_items().detach_all();

        let handle = self.create(connection).await?;
        let mut report = RebuildReport {
            subscription_id: handle.subscription_id,
            ..Default::default()
        };

        for (node_id, settings) in connection.monitored_items().replay_list() {
            match transport
                .create_monitored_item(handle.subscription_id, &node_id, &settings)
                .await
            {
                Ok(server_handle) => {
                    connection.monitored_items().attach(&node_id, server_handle);
                    report.restored += 1;
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %connection.id(),
                        node_id = %node_id,
                        error = %e,
                        "Failed to restore monitored item"
                    );
                    report.failed.push(node_id);
                }
            }
        }

        tracing::info!(
            connection_id = %connection.id(),
            subscription_id = report.subscription_id,
            restored = report.restored,
            failed = report.failed.len(),
            "Subscription rebuilt"
        );
        Ok(report)
    }

    /// Attaches a monitored item for `node_id`, replacing any existing one.
    ///
    /// On failure an existing item for the node stays registered and
    /// attached with its previous settings.
    pub async fn add_item(
        &self,
        connection: &Connection,
        node_id: NodeId,
        settings: MonitoredItemSettings,
    ) -> OpcUaResult<MonitoredItemId> {
        let subscription = connection.subscription().ok_or_else(|| {
            OpcUaError::unavailable(connection.id().as_str(), "no active subscription")
        })?;
        let transport = connection.transport();
        let items = connection.monitored_items();

        // The previous item keeps reporting until its replacement exists.
        let server_handle = transport
            .create_monitored_item(subscription.subscription_id, &node_id, &settings)
            .await
            .map_err(|e| OpcUaError::monitored_item_failed(node_id.to_string(), e.to_string()))?;

        if let Some(previous) = items.server_handle(&node_id) {
            if let Err(e) = transport
                .delete_monitored_items(subscription.subscription_id, &[previous])
                .await
            {
                tracing::debug!(
                    connection_id = %connection.id(),
                    node_id = %node_id,
                    error = %e,
                    "Previous monitored item could not be deleted"
                );
            }
        }

        let sampling_ms = settings.sampling_interval.as_millis() as u64;
        let item_id = items.upsert(connection.id(), node_id.clone(), settings, server_handle);

        tracing::info!(
            connection_id = %connection.id(),
            node_id = %node_id,
            item_id = %item_id,
            sampling_ms,
            "Monitored item added"
        );
        Ok(item_id)
    }

    /// Deletes only the monitored item for `node_id` and forgets it.
    ///
    /// Returns `false` when the node was not registered.
    pub async fn remove_item(&self, connection: &Connection, node_id: &NodeId) -> OpcUaResult<bool> {
        let items = connection.monitored_items();
        if !items.contains(node_id) {
            return Ok(false);
        }

        if let (Some(server_handle), Some(subscription)) =
            (items.server_handle(node_id), connection.subscription())
        {
            connection
                .transport()
                .delete_monitored_items(subscription.subscription_id, &[server_handle])
                .await
                .map_err(|e| OpcUaError::monitored_item_failed(node_id.to_string(), e.to_string()))?;
        }

        items.remove(node_id);
        tracing::info!(connection_id = %connection.id(), node_id = %node_id, "Monitored item removed");
        Ok(true)
    }

    async fn create(&self, connection: &Connection) -> OpcUaResult<SubscriptionHandle> {
        let subscription_id = connection
            .transport()
            .create_subscription(&self.settings)
            .await?;

        let handle = SubscriptionHandle {
            subscription_id,
            settings: self.settings.clone(),
            created_at: Utc::now(),
        };
        connection.set_subscription(handle.clone());

        tracing::info!(
            connection_id = %connection.id(),
            subscription_id,
            publishing_ms = self.settings.publishing_interval.as_millis() as u64,
            "Subscription created"
        );
        Ok(handle)
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new(SubscriptionSettings::default())
    }
}
