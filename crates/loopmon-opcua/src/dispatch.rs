// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Data change dispatch.
//!
//! The [`DataChangeDispatcher`] turns SDK value changes into [`DataSample`]s,
//! records the latest value on the monitored item and hands the sample to a
//! [`DataSink`]. Delivery is fire-and-forget: sinks must not block and the
//! dispatcher never retries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::client::{DataChangeEvent, OpcUaValue};
use crate::connection::{Connection, ConnectionId};
use crate::monitored::MonitoredItemId;
use crate::types::{NodeId, OpcUaDataType};

// =============================================================================
// Quality
// =============================================================================

/// Quality label derived from the top two bits of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quality {
    /// `00`: value is usable.
    Good,
    /// `01`: value may be usable.
    Uncertain,
    /// `10`: value should not be used.
    Bad,
    /// `11`: reserved severity.
    Unknown,
}

impl Quality {
    /// Derives the quality from an OPC UA status code.
    pub const fn from_status_code(status_code: u32) -> Self {
        match status_code >> 30 {
            0 => Self::Good,
            1 => Self::Uncertain,
            2 => Self::Bad,
            _ => Self::Unknown,
        }
    }

    /// Returns the label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Uncertain => "Uncertain",
            Self::Bad => "Bad",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DataSample
// =============================================================================

/// An enriched value change handed to the downstream sink.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSample {
    /// Connection the value came from.
    pub connection_id: ConnectionId,
    /// Node whose value changed.
    pub node_id: NodeId,
    /// Monitored item id.
    pub item_id: MonitoredItemId,
    /// New value.
    pub value: Option<OpcUaValue>,
    /// Data type, when known.
    pub data_type: Option<OpcUaDataType>,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Raw status code.
    pub status_code: u32,
    /// Quality label.
    pub quality: Quality,
    /// Local receipt time.
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// Sinks
// =============================================================================

/// Downstream consumer of data samples.
///
/// `publish` is called from the connection's event task and must return
/// promptly.
pub trait DataSink: Send + Sync {
    /// Accepts one sample.
    fn publish(&self, sample: DataSample);

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Logs every sample at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DataSink for TracingSink {
    fn publish(&self, sample: DataSample) {
        tracing::info!(
            connection_id = %sample.connection_id,
            node_id = %sample.node_id,
            value = %sample.value.as_ref().map(ToString::to_string).unwrap_or_else(|| "null".to_string()),
            quality = %sample.quality,
            status_code = sample.status_code,
            "Data change"
        );
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Forwards samples into a bounded channel, dropping them when it is full.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<DataSample>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink around an existing sender.
    pub fn new(sender: mpsc::Sender<DataSample>) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Creates a sink and the receiver it feeds.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<DataSample>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Samples dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DataSink for ChannelSink {
    fn publish(&self, sample: DataSample) {
        if let Err(err) = self.sender.try_send(sample) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            tracing::debug!(reason, dropped, "Sample channel rejected sample");
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Fans samples out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<DataSample>,
}

impl BroadcastSink {
    /// Creates a broadcast sink with the given per-subscriber capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to samples.
    pub fn subscribe(&self) -> broadcast::Receiver<DataSample> {
        self.sender.subscribe()
    }
}

impl DataSink for BroadcastSink {
    fn publish(&self, sample: DataSample) {
        // No receivers is fine.
        let _ = self.sender.send(sample);
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}

// =============================================================================
// DispatcherStats
// =============================================================================

/// Counters kept by the dispatcher.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    received: AtomicU64,
    published: AtomicU64,
    ignored: AtomicU64,
    last_sample_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`DispatcherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStatsSnapshot {
    /// Value changes received.
    pub received: u64,
    /// Samples handed to the sink.
    pub published: u64,
    /// Changes for nodes with no registered item.
    pub ignored: u64,
    /// Receipt time of the most recently published sample, on any connection.
    pub last_sample_at: Option<DateTime<Utc>>,
}

impl DispatcherStats {
    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            last_sample_at: *self.last_sample_at.lock(),
        }
    }
}

// =============================================================================
// DataChangeDispatcher
// =============================================================================

/// Routes value changes to the monitored item registry and the sink.
pub struct DataChangeDispatcher {
    sink: Arc<dyn DataSink>,
    stats: DispatcherStats,
}

impl DataChangeDispatcher {
    /// Creates a dispatcher publishing into `sink`.
    pub fn new(sink: Arc<dyn DataSink>) -> Self {
        Self {
            sink,
            stats: DispatcherStats::default(),
        }
    }

    /// Dispatcher counters.
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Handles one value change for `connection`.
    ///
    /// Returns `false` when the node has no registered item.
    pub fn dispatch(&self, connection: &Connection, event: DataChangeEvent) -> bool {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let received_at = Utc::now();

        let Some(item_id) = connection.monitored_items().record_value(
            &event.node_id,
            event.value.clone(),
            event.status_code,
            received_at,
        ) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                connection_id = %connection.id(),
                node_id = %event.node_id,
                "Data change for unregistered node ignored"
            );
            return false;
        };

        let data_type = event
            .data_type
            .or_else(|| event.value.as_ref().filter(|v| !v.is_null()).map(OpcUaValue::data_type));

        let sample = DataSample {
            connection_id: connection.id().clone(),
            node_id: event.node_id,
            item_id,
            value: event.value,
            data_type,
            source_timestamp: event.source_timestamp,
            server_timestamp: event.server_timestamp,
            status_code: event.status_code,
            quality: Quality::from_status_code(event.status_code),
            received_at,
        };

        tracing::trace!(
            connection_id = %sample.connection_id,
            node_id = %sample.node_id,
            sink = self.sink.name(),
            "Publishing sample"
        );
        self.sink.publish(sample);
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        *self.stats.last_sample_at.lock() = Some(received_at);
        connection.record_sample(received_at);
        true
    }
}

impl Default for DataChangeDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl fmt::Debug for DataChangeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChangeDispatcher")
            .field("sink", &self.sink.name())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_from_status_code() {
        assert_eq!(Quality::from_status_code(0), Quality::Good);
        assert_eq!(Quality::from_status_code(0x0000_0001), Quality::Good);
        assert_eq!(Quality::from_status_code(0x4000_0000), Quality::Uncertain);
        assert_eq!(Quality::from_status_code(0x40A5_0000), Quality::Uncertain);
        assert_eq!(Quality::from_status_code(0x8034_0000), Quality::Bad);
        assert_eq!(Quality::from_status_code(0xC000_0000), Quality::Unknown);
    }

    fn sample() -> DataSample {
        let connection_id = ConnectionId::from_endpoint("opc.tcp://a:4840");
        let node_id = NodeId::string(2, "tag1");
        DataSample {
            item_id: MonitoredItemId::new(&connection_id, &node_id),
            connection_id,
            node_id,
            value: Some(OpcUaValue::Double(1.0)),
            data_type: Some(OpcUaDataType::Double),
            source_timestamp: None,
            server_timestamp: None,
            status_code: 0,
            quality: Quality::Good,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::with_channel(1);
        sink.publish(sample());
        sink.publish(sample());
        assert_eq!(sink.dropped(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_sink_fan_out() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        sink.publish(sample());
        assert_eq!(a.try_recv().unwrap().node_id, NodeId::string(2, "tag1"));
        assert_eq!(b.try_recv().unwrap().quality, Quality::Good);
    }

    #[test]
    fn test_sample_serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["nodeId"], "ns=2;s=tag1");
        assert_eq!(json["quality"], "Good");
        assert_eq!(json["value"], 1.0);
        assert!(json["itemId"].as_str().unwrap().ends_with(":ns=2;s=tag1"));
    }
}
