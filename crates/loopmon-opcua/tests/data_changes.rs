// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value changes flowing from the transport to the sink.

mod common;

use std::sync::Arc;

use common::{config, settle, MockTransportFactory, ENDPOINT};
use loopmon_opcua::client::DataChangeEvent;
use loopmon_opcua::{
    BroadcastSink, ChannelSink, ConnectionOptions, ConnectionRegistry, MonitoredItemId,
    MonitoringOptions, NodeId, OpcUaValue, Quality, TransportEvent, TransportFactory,
};

fn tag(name: &str) -> NodeId {
    NodeId::string(2, name)
}

#[tokio::test]
async fn test_sample_reaches_sink_and_updates_item() {
    let factory = MockTransportFactory::new();
    let (sink, mut samples) = ChannelSink::with_channel(8);
    let registry = ConnectionRegistry::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        config(10),
        Arc::new(sink),
    );
    let view = registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();
    registry
        .add_monitored_item(&view.id, &tag("tag1"), MonitoringOptions::default())
        .await
        .unwrap();

    let server = factory.server(ENDPOINT);
    server.send(TransportEvent::DataChange(DataChangeEvent {
        node_id: tag("tag1"),
        value: Some(OpcUaValue::Float(3.5)),
        data_type: None,
        status_code: 0x4000_0000,
        source_timestamp: None,
        server_timestamp: None,
    }));
    settle().await;

    let sample = samples.try_recv().unwrap();
    assert_eq!(sample.connection_id, view.id);
    assert_eq!(sample.item_id, MonitoredItemId::new(&view.id, &tag("tag1")));
    assert_eq!(sample.value, Some(OpcUaValue::Float(3.5)));
    assert_eq!(sample.quality, Quality::Uncertain);
    assert!(sample.data_type.is_some());

    let item = &registry.monitored_items(&view.id).unwrap()[0];
    assert_eq!(item.last_value, Some(OpcUaValue::Float(3.5)));
    assert_eq!(item.last_status_code, Some(0x4000_0000));
    assert!(item.last_update.is_some());

    let stats = registry.dispatcher_stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.ignored, 0);
}

#[tokio::test]
async fn test_unregistered_node_is_ignored() {
    let factory = MockTransportFactory::new();
    let (sink, mut samples) = ChannelSink::with_channel(8);
    let registry = ConnectionRegistry::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        config(10),
        Arc::new(sink),
    );
    registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();

    factory
        .server(ENDPOINT)
        .send_value(tag("stranger"), OpcUaValue::Boolean(true));
    settle().await;

    assert!(samples.try_recv().is_err());
    let stats = registry.dispatcher_stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.published, 0);
}

#[tokio::test]
async fn test_samples_keep_transport_order() {
    let factory = MockTransportFactory::new();
    let sink = Arc::new(BroadcastSink::new(64));
    let mut samples = sink.subscribe();
    let registry = ConnectionRegistry::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        config(10),
        sink,
    );
    let view = registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();
    registry
        .add_monitored_item(&view.id, &tag("counter"), MonitoringOptions::default())
        .await
        .unwrap();

    let server = factory.server(ENDPOINT);
    for n in 0..10 {
        server.send_value(tag("counter"), OpcUaValue::UInt32(n));
    }
    settle().await;

    for n in 0..10 {
        let sample = samples.try_recv().unwrap();
        assert_eq!(sample.value, Some(OpcUaValue::UInt32(n)));
    }
    assert_eq!(
        registry.monitored_items(&view.id).unwrap()[0].last_value,
        Some(OpcUaValue::UInt32(9))
    );
}

#[tokio::test]
async fn test_sample_counters_per_connection() {
    let factory = MockTransportFactory::new();
    let registry = common::registry(&factory, config(10));
    let view = registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();
    assert_eq!(view.samples_received, 0);
    assert!(view.last_sample_at.is_none());
    assert!(registry.dispatcher_stats().last_sample_at.is_none());

    registry
        .add_monitored_item(&view.id, &tag("tag1"), MonitoringOptions::default())
        .await
        .unwrap();
    let server = factory.server(ENDPOINT);
    server.send_value(tag("tag1"), OpcUaValue::Int32(1));
    server.send_value(tag("tag1"), OpcUaValue::Int32(2));
    server.send_value(tag("stranger"), OpcUaValue::Int32(3));
    settle().await;

    // Ignored changes do not count as samples.
    let status = registry.get_status(&view.id).unwrap();
    assert_eq!(status.samples_received, 2);
    let last = status.last_sample_at.unwrap();
    assert_eq!(registry.monitored_items(&view.id).unwrap()[0].last_update, Some(last));
    assert_eq!(registry.dispatcher_stats().last_sample_at, Some(last));
}

#[tokio::test]
async fn test_keep_alive_is_recorded() {
    let factory = MockTransportFactory::new();
    let registry = common::registry(&factory, config(10));
    let view = registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();
    assert!(view.last_keep_alive.is_none());

    factory
        .server(ENDPOINT)
        .send(TransportEvent::KeepAlive { subscription_id: 1 });
    settle().await;

    assert!(registry.get_status(&view.id).unwrap().last_keep_alive.is_some());
}

#[tokio::test]
async fn test_events_stop_after_disconnect() {
    let factory = MockTransportFactory::new();
    let registry = common::registry(&factory, config(10));
    let view = registry
        .create_connection(ENDPOINT, ConnectionOptions::default())
        .await
        .unwrap();
    registry.disconnect(&view.id).await.unwrap();
    settle().await;

    factory
        .server(ENDPOINT)
        .send_value(tag("tag1"), OpcUaValue::Int16(1));
    settle().await;
    assert_eq!(registry.dispatcher_stats().received, 0);
}
