// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-connection transport event pump.
//!
//! Every connection gets one task that drains its transport event channel
//! in order and routes each event to the registry. The task stops when the
//! connection's token is cancelled, when the channel closes, or when the
//! registry or connection has been dropped.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::TransportEventReceiver;
use crate::connection::Connection;
use crate::registry::WeakRegistry;

pub(crate) fn spawn_event_pump(
    registry: WeakRegistry,
    connection: &Arc<Connection>,
    mut events: TransportEventReceiver,
) -> JoinHandle<()> {
    let token: CancellationToken = connection.cancellation_token().clone();
    let weak: Weak<Connection> = Arc::downgrade(connection);
    let connection_id = connection.id().clone();

    tokio::spawn(async move {
        tracing::trace!(connection_id = %connection_id, "Event pump started");
        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let (Some(registry), Some(connection)) = (registry.upgrade(), weak.upgrade()) else {
                break;
            };
            tracing::trace!(connection_id = %connection_id, event = event.kind(), "Transport event");
            registry.handle_event(&connection, event).await;
        }
        tracing::trace!(connection_id = %connection_id, "Event pump stopped");
    })
}

