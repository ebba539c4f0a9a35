//! Market identification and tick types.
//!
//! A stream is identified by `(Symbol, StreamType)`; every inbound stream
//! message that parses successfully becomes one immutable [`MarketTick`].

use crate::{Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading pair symbol (e.g., "BTCUSDT").
///
/// Always stored upper-case so that `btcusdt` and `BTCUSDT` name the same market.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in stream paths (`btcusdt@trade`).
    pub fn to_stream_path(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// Kind of market stream subscribed for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Individual trades.
    #[default]
    Trade,
    /// Rolling 24h ticker.
    Ticker,
    /// Rolling 24h mini ticker.
    MiniTicker,
}

impl StreamType {
    /// Stream name as used by the exchange in stream paths.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::MiniTicker => "miniTicker",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// Identity of one stream connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    pub symbol: Symbol,
    pub stream: StreamType,
}

impl ConnectionId {
    pub fn new(symbol: impl Into<Symbol>, stream: StreamType) -> Self {
        Self {
            symbol: symbol.into(),
            stream,
        }
    }

    /// Default stream URL under `base_url`: `{base}/{symbol}@{stream}`.
    pub fn default_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}@{}",
            base_url.trim_end_matches('/'),
            self.symbol.to_stream_path(),
            self.stream.channel()
        )
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.stream)
    }
}

/// A single price/volume observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: Symbol,
    pub price: Price,
    pub volume: Size,
    /// Exchange event time (Unix ms).
    pub timestamp_ms: i64,
}

impl MarketTick {
    pub fn new(symbol: Symbol, price: Price, volume: Size, timestamp_ms: i64) -> Self {
        Self {
            symbol,
            price,
            volume,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalized() {
        assert_eq!(Symbol::new(" btcusdt"), Symbol::new("BTCUSDT"));
        assert_eq!(Symbol::new("BTCUSDT").to_stream_path(), "btcusdt");
    }

    #[test]
    fn test_connection_id_default_url() {
        let id = ConnectionId::new("BTCUSDT", StreamType::Trade);
        assert_eq!(
            id.default_url("wss://stream.binance.com:9443/ws/"),
            "wss://stream.binance.com:9443/ws/btcusdt@trade"
        );
        assert_eq!(id.to_string(), "BTCUSDT@trade");

        let mini = ConnectionId::new("ethusdt", StreamType::MiniTicker);
        assert_eq!(mini.default_url("ws://localhost"), "ws://localhost/ethusdt@miniTicker");
    }

    #[test]
    fn test_stream_type_serde() {
        let t: StreamType = serde_json::from_str("\"mini_ticker\"").unwrap();
        assert_eq!(t, StreamType::MiniTicker);
    }
}
