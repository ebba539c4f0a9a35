//! Subscription registry.
//!
//! Creates, tracks and destroys [`StreamConnection`]s keyed by
//! `(symbol, stream type)`. Creation is idempotent; closing waits for the
//! connection task to finish so no timer or event outlives the call.

use crate::connection::{ConnectionConfig, ConnectionState, StreamConnection};
use crate::error::{WsError, WsResult};
use crate::event::ConnectionEvent;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickgate_core::ConnectionId;
use tickgate_feed::MarketDataBus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info, warn};

/// Observability snapshot of one registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub url: String,
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
}

struct ConnectionHandle {
    connection: Arc<StreamConnection>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Cancel the connection and wait for its task, aborting after `grace`.
    async fn shutdown(self, grace: Duration) {
        let id = self.connection.id().clone();
        self.connection.shutdown();

        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => debug!(connection = %id, "Connection task finished"),
            Ok(Err(e)) => warn!(connection = %id, error = %e, "Connection task ended abnormally"),
            Err(_) => {
                warn!(connection = %id, grace_ms = grace.as_millis() as u64, "Connection task did not stop in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }
    }
}

/// Owner of all stream connections.
pub struct SubscriptionRegistry {
    config: ConnectionConfig,
    close_grace: Duration,
    bus: Arc<MarketDataBus>,
    events: mpsc::Sender<ConnectionEvent>,
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
}

impl SubscriptionRegistry {
    pub fn new(
        config: ConnectionConfig,
        close_grace: Duration,
        bus: Arc<MarketDataBus>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            config,
            close_grace,
            bus,
            events,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Create and start a connection unless one already exists for `id`.
    ///
    /// Returns `Ok(false)` when an active connection was already registered.
    /// A connection in `Failed` is replaced. Must be called from within a
    /// tokio runtime.
    pub fn create_connection(&self, id: ConnectionId, url: &str) -> WsResult<bool> {
        validate_url(url)?;

        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(&id) {
            if existing.connection.state() != ConnectionState::Failed {
                debug!(connection = %id, "Connection already registered");
                return Ok(false);
            }
            info!(connection = %id, "Recreating failed connection");
        }

        let connection = Arc::new(StreamConnection::new(
            id.clone(),
            url,
            self.config.clone(),
            self.bus.clone(),
            self.events.clone(),
        ));
        let task = connection.spawn();
        connections.insert(id.clone(), ConnectionHandle { connection, task });

        info!(connection = %id, %url, "Connection created");
        Ok(true)
    }

    /// Close one connection. Returns `false` if it was not registered.
    pub async fn close_connection(&self, id: &ConnectionId) -> bool {
        let handle = self.connections.lock().remove(id);
        match handle {
            Some(handle) => {
                handle.shutdown(self.close_grace).await;
                info!(connection = %id, "Connection closed");
                true
            }
            None => {
                debug!(connection = %id, "Close requested for unknown connection");
                false
            }
        }
    }

    /// Close every connection and wait for all of them.
    ///
    /// Safe with zero connections; returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let handles: Vec<ConnectionHandle> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, handle)| handle).collect()
        };

        let count = handles.len();
        join_all(handles.into_iter().map(|h| h.shutdown(self.close_grace))).await;

        if count > 0 {
            info!(count, "All connections closed");
        }
        count
    }

    /// Connections that are neither failed nor closing.
    pub fn list_active(&self) -> Vec<ConnectionSnapshot> {
        let connections = self.connections.lock();
        let mut active: Vec<ConnectionSnapshot> = connections
            .values()
            .filter(|h| h.connection.state().is_active())
            .map(|h| snapshot(&h.connection))
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionSnapshot> {
        self.connections
            .lock()
            .get(id)
            .map(|h| snapshot(&h.connection))
    }

    pub fn state_of(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections
            .lock()
            .get(id)
            .map(|h| h.connection.state())
    }

    /// Registered connections, including failed ones.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn snapshot(connection: &StreamConnection) -> ConnectionSnapshot {
    ConnectionSnapshot {
        id: connection.id().clone(),
        url: connection.url().to_string(),
        state: connection.state(),
        reconnect_attempt: connection.reconnect_attempt(),
    }
}

/// Reject URLs that can never produce a websocket handshake.
fn validate_url(url: &str) -> WsResult<()> {
    let invalid = |reason: String| WsError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(invalid("scheme must be ws or wss".to_string()));
    }
    url.into_client_request()
        .map(|_| ())
        .map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickgate_core::StreamType;

    fn registry() -> (SubscriptionRegistry, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let config = ConnectionConfig {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 20,
            reconnect_max_delay_ms: 100,
        };
        let registry = SubscriptionRegistry::new(
            config,
            Duration::from_millis(500),
            Arc::new(MarketDataBus::new(8)),
            tx,
        );
        (registry, rx)
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("wss://stream.binance.com:9443/ws/btcusdt@trade").is_ok());
        assert!(validate_url("ws://127.0.0.1:9000").is_ok());
        assert!(matches!(
            validate_url("http://example.com"),
            Err(WsError::InvalidUrl { .. })
        ));
        assert!(validate_url("ws://bad host").is_err());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (registry, _rx) = registry();
        let id = ConnectionId::new("BTCUSDT", StreamType::Trade);

        assert!(registry.create_connection(id.clone(), "ws://127.0.0.1:1").unwrap());
        assert!(!registry.create_connection(id.clone(), "ws://127.0.0.1:1").unwrap());
        assert_eq!(registry.len(), 1);

        let other = ConnectionId::new("BTCUSDT", StreamType::Ticker);
        assert!(registry.create_connection(other, "ws://127.0.0.1:1").unwrap());
        assert_eq!(registry.list_active().len(), 2);

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_invalid_url_not_registered() {
        let (registry, _rx) = registry();
        let id = ConnectionId::new("BTCUSDT", StreamType::Trade);
        assert!(registry.create_connection(id, "not a url").is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_with_zero_connections() {
        let (registry, _rx) = registry();
        assert_eq!(registry.close_all().await, 0);
        assert_eq!(registry.close_all().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_stops_events() {
        let (registry, mut rx) = registry();
        for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
            registry
                .create_connection(ConnectionId::new(symbol, StreamType::Trade), "ws://127.0.0.1:1")
                .unwrap();
        }
        // Let the connections cycle through a few backoffs.
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(registry.close_all().await, 3);
        assert!(registry.list_active().is_empty());
        assert!(registry.is_empty());

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err(), "no events after close_all");
    }

    #[tokio::test]
    async fn test_close_connection() {
        let (registry, _rx) = registry();
        let id = ConnectionId::new("BTCUSDT", StreamType::Trade);
        registry.create_connection(id.clone(), "ws://127.0.0.1:1").unwrap();

        assert!(registry.close_connection(&id).await);
        assert!(!registry.close_connection(&id).await);
        assert!(registry.state_of(&id).is_none());
    }

    #[tokio::test]
    async fn test_failed_connection_is_inactive_and_recreatable() {
        let (tx, mut rx) = mpsc::channel(256);
        let config = ConnectionConfig {
            max_reconnect_attempts: 1,
            reconnect_base_delay_ms: 5,
            reconnect_max_delay_ms: 5,
        };
        let registry = SubscriptionRegistry::new(
            config,
            Duration::from_millis(500),
            Arc::new(MarketDataBus::new(8)),
            tx,
        );
        let id = ConnectionId::new("BTCUSDT", StreamType::Trade);
        registry.create_connection(id.clone(), "ws://127.0.0.1:1").unwrap();

        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                if event.is_failure() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(failed);

        assert_eq!(registry.state_of(&id), Some(ConnectionState::Failed));
        assert!(registry.list_active().is_empty());

        assert!(registry.create_connection(id.clone(), "ws://127.0.0.1:1").unwrap());
        assert_eq!(registry.len(), 1);

        registry.close_all().await;
    }
}
