//! Single market stream connection.
//!
//! One [`StreamConnection`] per `(symbol, stream type)`. It owns the socket
//! lifecycle, parses inbound frames into ticks for the [`MarketDataBus`] and
//! reconnects with linear backoff until its attempts run out.
//!
//! ```text
//! Idle -> Connecting -> Open -> Closing          (explicit stop)
//!         Connecting/Open -> Backoff -> Connecting (error or remote close)
//!                            Backoff -> Failed     (attempts exhausted)
//! ```

use crate::error::{WsError, WsResult};
use crate::event::{ConnectionEvent, ConnectionEventKind};
use crate::message::parse_tick;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickgate_core::{ConnectionId, MarketTick};
use tickgate_feed::MarketDataBus;
use tickgate_telemetry::Metrics;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Reconnect policy shared by all connections of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Maximum reconnection attempts (0 = unlimited).
    ///
    /// The attempt counter never exceeds this value. Each entry into
    /// Backoff increments it, except the final one before Failed, which
    /// reports the last attempt again: with a limit of 2 the Backoff
    /// entries carry attempts `1, 2, 2`.
    pub max_reconnect_attempts: u32,
    /// Delay per attempt: attempt `n` waits `n * base`.
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for the backoff delay.
    pub reconnect_max_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30000,
        }
    }
}

impl ConnectionConfig {
    /// Linear backoff: `base * attempt`, capped at `reconnect_max_delay_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(u64::from(attempt))
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Longest delay this policy can ever schedule.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_reconnect_attempts > 0 && attempt > self.max_reconnect_attempts
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Backoff,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Backoff => "backoff",
            Self::Failed => "failed",
        }
    }

    /// Whether the connection still counts as live for the registry.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Closing | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-healing stream connection.
pub struct StreamConnection {
    id: ConnectionId,
    /// `SYMBOL@stream`, used as the metrics label.
    label: String,
    url: String,
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    reconnect_attempt: AtomicU32,
    bus: Arc<MarketDataBus>,
    events: mpsc::Sender<ConnectionEvent>,
    shutdown_token: CancellationToken,
}

impl StreamConnection {
    pub fn new(
        id: ConnectionId,
        url: impl Into<String>,
        config: ConnectionConfig,
        bus: Arc<MarketDataBus>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let label = id.to_string();
        Metrics::stream_state_set(&label, ConnectionState::Idle.as_str());
        Self {
            id,
            label,
            url: url.into(),
            config,
            state: RwLock::new(ConnectionState::Idle),
            reconnect_attempt: AtomicU32::new(0),
            bus,
            events,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt.load(Ordering::Acquire)
    }

    /// Request shutdown. Cancels a pending backoff sleep or an open socket.
    pub fn shutdown(&self) {
        debug!(connection = %self.id, "Stream connection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Spawn the connection loop onto the runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run().await })
    }

    /// Run the connect/reconnect loop until shutdown or failure.
    pub async fn run(&self) {
        info!(connection = %self.id, url = %self.url, "Stream connection starting");

        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Closing);
                return;
            }

            self.set_state(ConnectionState::Connecting);

            match self.try_connect().await {
                Ok(()) => {
                    debug!(connection = %self.id, "Stream connection ended");
                }
                Err(e) => {
                    warn!(connection = %self.id, error = %e, "Stream connection error");
                    self.emit(ConnectionEventKind::Error(e.to_string()));
                }
            }

            if self.is_shutdown() {
                self.set_state(ConnectionState::Closing);
                return;
            }

            let attempt = self.reconnect_attempt() + 1;
            if self.config.exhausted(attempt) {
                self.set_state(ConnectionState::Backoff);
                self.set_state(ConnectionState::Failed);
                let attempts = self.reconnect_attempt();
                error!(connection = %self.id, attempts, "Max reconnection attempts reached");
                Metrics::stream_failed(&self.label);
                self.emit(ConnectionEventKind::Failed { attempts });
                return;
            }

            self.reconnect_attempt.store(attempt, Ordering::Release);
            self.set_state(ConnectionState::Backoff);
            Metrics::stream_reconnect(&self.label);

            let delay = self.config.backoff_delay(attempt);
            warn!(
                connection = %self.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    debug!(connection = %self.id, "Shutdown during backoff");
                    self.set_state(ConnectionState::Closing);
                    return;
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        debug!(connection = %self.id, url = %self.url, "Connecting");

        let connect = connect_async_tls_with_config(self.url.as_str(), None, true, None);
        let (ws_stream, _response) = tokio::select! {
            result = connect => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        self.reconnect_attempt.store(0, Ordering::Release);
        self.set_state(ConnectionState::Open);
        info!(connection = %self.id, "Stream connected");

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(connection = %self.id, error = %e, "Failed to send Close frame");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.handle_text(text),
                            Err(_) => self.drop_malformed("binary frame is not UTF-8"),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            trace!(connection = %self.id, "Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(connection = %self.id, code, %reason, "Stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Parse one inbound text frame for this connection's symbol.
    pub fn parse(&self, text: &str) -> WsResult<MarketTick> {
        parse_tick(text, &self.id.symbol)
    }

    fn handle_text(&self, text: &str) {
        match self.parse(text) {
            Ok(tick) => self.bus.publish(tick),
            Err(e) => self.drop_malformed(&e.to_string()),
        }
    }

    fn drop_malformed(&self, reason: &str) {
        Metrics::stream_malformed(&self.label);
        debug!(connection = %self.id, %reason, "Dropped malformed stream message");
    }

    fn set_state(&self, to: ConnectionState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from == to {
            return;
        }
        Metrics::stream_state_set(&self.label, to.as_str());
        let attempt = self.reconnect_attempt();
        debug!(connection = %self.id, %from, %to, attempt, "Stream state changed");
        self.emit(ConnectionEventKind::StateChanged { from, to, attempt });
    }

    /// Publish an event without waiting; a full channel drops the event.
    fn emit(&self, kind: ConnectionEventKind) {
        match self.events.try_send(ConnectionEvent::new(self.id.clone(), kind)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(connection = %self.id, ?event, "Connection event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                trace!(connection = %self.id, "Connection event receiver dropped");
            }
        }
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state())
            .field("reconnect_attempt", &self.reconnect_attempt())
            .finish()
    }
}
