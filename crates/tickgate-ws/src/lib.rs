//! Self-healing market stream connections for tickgate.
//!
//! - One [`StreamConnection`] per `(symbol, stream type)` with linear,
//!   capped reconnect backoff and an explicit state machine
//! - [`SubscriptionRegistry`] for idempotent create and cancellable close
//! - Lifecycle [`ConnectionEvent`]s published without blocking

pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod registry;

pub use connection::{ConnectionConfig, ConnectionState, StreamConnection};
pub use error::{WsError, WsResult};
pub use event::{ConnectionEvent, ConnectionEventKind};
pub use message::{parse_tick, StreamMessage, StreamPayload, TickerPayload, TradePayload};
pub use registry::{ConnectionSnapshot, SubscriptionRegistry};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
