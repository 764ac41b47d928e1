// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnection with capped exponential backoff.
//!
//! When a connection reports that it lost its transport, the
//! [`ReconnectionController`] starts one loop task for it. The loop sleeps
//! for the backoff delay of the current attempt count, then asks the
//! registry to re-open the transport and session and rebuild the
//! subscription.
//!
//! ```text
//! connected --lost--> disconnected --delay--> connecting --ok--> connected
//!                          ^                      |
//!                          +-------fail, +1-------+
//! ```
//!
//! A loop ends when it succeeds, when its cancellation token fires
//! (`Disconnect` or an SDK-side recovery), when the connection is no longer
//! the one registered under its id, or when the attempt cap is reached.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectSettings;
use crate::connection::{Connection, ConnectionId, ConnectionStatus};
use crate::error::{ConnectionError, OpcUaError};
use crate::registry::{ConnectionRegistry, WeakRegistry};

// =============================================================================
// BackoffPolicy
// =============================================================================

/// `delay(n) = min(base * 2^n, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Creates a policy. `max_attempts == 0` never gives up.
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Creates a policy from the configured settings.
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            settings.base_delay,
            settings.max_delay,
            settings.max_retry_attempts,
        )
    }

    /// Delay before the attempt that follows `attempts` failures.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Returns `true` once `attempts` failures mean no further attempt.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }

    /// Attempt cap; 0 means unlimited.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

// =============================================================================
// ReconnectionController
// =============================================================================

/// Attempt counters and reconnection loops for every connection of one
/// registry.
#[derive(Debug)]
pub struct ReconnectionController {
    policy: BackoffPolicy,
    attempts: DashMap<ConnectionId, u32>,
}

impl ReconnectionController {
    /// Creates a controller.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: DashMap::new(),
        }
    }

    /// Backoff policy in use.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Consecutive failed attempts for `id`.
    pub fn attempts(&self, id: &ConnectionId) -> u32 {
        self.attempts.get(id).map(|entry| *entry).unwrap_or(0)
    }

    /// Resets the attempt counter of `id`.
    pub(crate) fn reset(&self, id: &ConnectionId) {
        self.attempts.insert(id.clone(), 0);
    }

    /// Forgets `id`.
    pub(crate) fn remove(&self, id: &ConnectionId) {
        self.attempts.remove(id);
    }

    /// Counts one failed attempt and returns the new total.
    pub(crate) fn record_failure(&self, id: &ConnectionId) -> u32 {
        let mut entry = self.attempts.entry(id.clone()).or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }

    /// Reacts to a lost transport on `connection`.
    ///
    /// Returns `true` if a reconnection loop was started. Signals that arrive
    /// while the connection is closing, while the transport still reports
    /// itself connected, or while a loop is already running are ignored.
    pub(crate) fn handle_connection_lost(
        &self,
        registry: &ConnectionRegistry,
        connection: &Arc<Connection>,
    ) -> bool {
        if connection.is_closing() {
            tracing::debug!(connection_id = %connection.id(), "Connection lost during disconnect; ignored");
            return false;
        }
        if connection.transport().is_connected() {
            tracing::debug!(connection_id = %connection.id(), "Stale connection-lost signal; ignored");
            return false;
        }
        let Some((loop_id, token)) = connection.begin_reconnect() else {
            tracing::debug!(connection_id = %connection.id(), "Reconnection already in progress");
            return false;
        };

        connection.set_status(ConnectionStatus::Disconnected);
        connection.suspend_session();
        connection.take_subscription();
        connection.monitored_items().detach_all();

        tracing::warn!(
            connection_id = %connection.id(),
            endpoint = %connection.endpoint_url(),
            attempts = self.attempts(connection.id()),
            "Connection lost"
        );

        let generation = connection.generation();
        tokio::spawn(reconnect_loop(
            registry.downgrade(),
            Arc::clone(connection),
            loop_id,
            token,
            generation,
        ));
        true
    }
}

impl Default for ReconnectionController {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

/// Releases the connection's reconnection slot when the loop ends.
struct LoopGuard {
    connection: Arc<Connection>,
    loop_id: u64,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.connection.end_reconnect(self.loop_id);
    }
}

async fn reconnect_loop(
    registry: WeakRegistry,
    connection: Arc<Connection>,
    loop_id: u64,
    token: CancellationToken,
    generation: u64,
) {
    let guard = LoopGuard {
        connection: Arc::clone(&connection),
        loop_id,
    };
    let id = connection.id().clone();

    loop {
        let Some(current) = registry.upgrade() else {
            return;
        };
        let controller = current.reconnection();
        let attempts = controller.attempts(&id);

        if controller.policy().is_exhausted(attempts) {
            connection.mark_exhausted();
            OpcUaError::connection(ConnectionError::reconnect_exhausted(id.as_str(), attempts))
                .log("reconnect");
            return;
        }

        let delay = controller.policy().delay_for_attempt(attempts);
        tracing::info!(
            connection_id = %id,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection attempt"
        );
        drop(current);

        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(connection_id = %id, "Reconnection cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(current) = registry.upgrade() else {
            return;
        };
        if !current.is_live(&connection, generation) {
            tracing::debug!(connection_id = %id, "Connection superseded; reconnection abandoned");
            return;
        }

        match current.reconnect_once(&connection, &token, generation).await {
            Ok(true) => {
                tracing::info!(connection_id = %id, endpoint = %connection.endpoint_url(), "Reconnected");
                drop(guard);
                // A loss reported while this loop still held the slot was
                // dropped; pick it up now.
                if !connection.transport().is_connected() {
                    current.reconnection().handle_connection_lost(&current, &connection);
                }
                return;
            }
            Ok(false) => return,
            Err(e) => {
                let attempts = current.reconnection().record_failure(&id);
                tracing::warn!(
                    connection_id = %id,
                    attempts,
                    error = %e,
                    "Reconnection attempt failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(300), max_attempts)
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy(10);
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(5_000));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(10_000));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(20_000));
        assert_eq!(p.delay_for_attempt(5), Duration::from_millis(160_000));
        assert_eq!(p.delay_for_attempt(6), Duration::from_millis(300_000));
        assert_eq!(p.delay_for_attempt(40), Duration::from_millis(300_000));
        assert_eq!(p.delay_for_attempt(u32::MAX), Duration::from_millis(300_000));
    }

    #[test]
    fn test_backoff_monotonic_and_bounded() {
        let p = policy(0);
        let mut previous = Duration::ZERO;
        for attempts in 0..100 {
            let delay = p.delay_for_attempt(attempts);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(300));
            previous = delay;
        }
    }

    #[test]
    fn test_exhaustion() {
        assert!(!policy(3).is_exhausted(2));
        assert!(policy(3).is_exhausted(3));
        assert!(policy(3).is_exhausted(4));
        assert!(!policy(0).is_exhausted(u32::MAX));
    }

    #[test]
    fn test_attempt_counters() {
        let controller = ReconnectionController::new(policy(3));
        let id = ConnectionId::from_endpoint("opc.tcp://plc:4840");

        assert_eq!(controller.attempts(&id), 0);
        assert_eq!(controller.record_failure(&id), 1);
        assert_eq!(controller.record_failure(&id), 2);
        controller.reset(&id);
        assert_eq!(controller.attempts(&id), 0);
        controller.record_failure(&id);
        controller.remove(&id);
        assert_eq!(controller.attempts(&id), 0);
    }
}
