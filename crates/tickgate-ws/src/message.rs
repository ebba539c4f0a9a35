//! Market stream message types.
//!
//! Supported payloads (Binance public streams):
//! - `trade`: `{"e":"trade","E":..,"s":"BTCUSDT","p":"50000.1","q":"0.01","T":..}`
//! - `24hrTicker`: last price `c`, base volume `v`, event time `E`
//! - `24hrMiniTicker`: same fields as the ticker
//!
//! Combined-stream envelopes (`{"stream":"btcusdt@trade","data":{..}}`) are unwrapped.

use crate::error::{WsError, WsResult};
use serde::Deserialize;
use std::str::FromStr;
use tickgate_core::{MarketTick, Price, Size, Symbol};

/// Individual trade event.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    /// Trade time (Unix ms).
    #[serde(rename = "T")]
    pub trade_time: i64,
}

/// Rolling 24h ticker (full or mini).
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPayload {
    #[serde(rename = "s")]
    pub symbol: String,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: String,
    /// Total traded base asset volume.
    #[serde(rename = "v")]
    pub volume: String,
    /// Event time (Unix ms).
    #[serde(rename = "E")]
    pub event_time: i64,
}

/// Stream event, tagged by the `e` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum StreamPayload {
    #[serde(rename = "trade")]
    Trade(TradePayload),
    #[serde(rename = "24hrTicker")]
    Ticker(TickerPayload),
    #[serde(rename = "24hrMiniTicker")]
    MiniTicker(TickerPayload),
}

/// Raw inbound message, either bare or wrapped in a combined-stream envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Combined { stream: String, data: StreamPayload },
    Direct(StreamPayload),
}

impl StreamMessage {
    pub fn into_payload(self) -> StreamPayload {
        match self {
            Self::Combined { data, .. } => data,
            Self::Direct(payload) => payload,
        }
    }
}

impl StreamPayload {
    fn fields(&self) -> (&str, &str, &str, i64) {
        match self {
            Self::Trade(t) => (&t.symbol, &t.price, &t.quantity, t.trade_time),
            Self::Ticker(t) | Self::MiniTicker(t) => {
                (&t.symbol, &t.last_price, &t.volume, t.event_time)
            }
        }
    }

    /// Convert into a tick for `expected` symbol.
    ///
    /// Fails on a symbol mismatch, unparseable numbers or a non-positive price.
    pub fn into_tick(self, expected: &Symbol) -> WsResult<MarketTick> {
        let (symbol, price, volume, timestamp_ms) = self.fields();

        let symbol = Symbol::new(symbol);
        if &symbol != expected {
            return Err(WsError::ParseError(format!(
                "symbol mismatch: expected {expected}, got {symbol}"
            )));
        }

        let price = Price::from_str(price)
            .map_err(|e| WsError::ParseError(format!("invalid price {price:?}: {e}")))?;
        if !price.is_positive() {
            return Err(WsError::ParseError(format!("non-positive price {price}")));
        }

        let volume = Size::from_str(volume)
            .map_err(|e| WsError::ParseError(format!("invalid volume {volume:?}: {e}")))?;
        if volume.inner().is_sign_negative() {
            return Err(WsError::ParseError(format!("negative volume {volume}")));
        }

        Ok(MarketTick::new(symbol, price, volume, timestamp_ms))
    }
}

/// Parse one text frame into a tick for `expected` symbol.
pub fn parse_tick(text: &str, expected: &Symbol) -> WsResult<MarketTick> {
    let msg: StreamMessage = serde_json::from_str(text)?;
    msg.into_payload().into_tick(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    #[test]
    fn test_parse_trade() {
        let raw = r#"{"e":"trade","E":1700000000001,"s":"BTCUSDT","t":12345,
            "p":"50000.10","q":"0.015","T":1700000000000,"m":true,"M":true}"#;
        let tick = parse_tick(raw, &btc()).unwrap();
        assert_eq!(tick.price.inner(), dec!(50000.10));
        assert_eq!(tick.volume.inner(), dec!(0.015));
        assert_eq!(tick.timestamp_ms, 1700000000000);
    }

    #[test]
    fn test_parse_ticker_and_mini_ticker() {
        let ticker = r#"{"e":"24hrTicker","E":1700000000500,"s":"BTCUSDT",
            "c":"50100.00","v":"1234.5","C":1700000000400,"p":"100.0"}"#;
        let tick = parse_tick(ticker, &btc()).unwrap();
        assert_eq!(tick.price.inner(), dec!(50100.00));
        assert_eq!(tick.timestamp_ms, 1700000000500);

        let mini = r#"{"e":"24hrMiniTicker","E":1700000000600,"s":"BTCUSDT",
            "c":"50200","o":"49000","h":"51000","l":"48000","v":"10","q":"500000"}"#;
        let tick = parse_tick(mini, &btc()).unwrap();
        assert_eq!(tick.price.inner(), dec!(50200));
        assert_eq!(tick.volume.inner(), dec!(10));
    }

    #[test]
    fn test_parse_combined_envelope() {
        let raw = r#"{"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT",
            "p":"1.5","q":"2","T":5}}"#;
        let tick = parse_tick(raw, &btc()).unwrap();
        assert_eq!(tick.price.inner(), dec!(1.5));
    }

    #[test]
    fn test_malformed_messages_rejected() {
        // Not JSON
        assert!(matches!(parse_tick("not json", &btc()), Err(WsError::Json(_))));
        // Unknown event type
        assert!(parse_tick(r#"{"e":"depthUpdate","s":"BTCUSDT"}"#, &btc()).is_err());
        // Subscription ack
        assert!(parse_tick(r#"{"result":null,"id":1}"#, &btc()).is_err());
        // Bad price
        let bad = r#"{"e":"trade","s":"BTCUSDT","p":"abc","q":"1","T":1}"#;
        assert!(matches!(parse_tick(bad, &btc()), Err(WsError::ParseError(_))));
        // Zero price
        let zero = r#"{"e":"trade","s":"BTCUSDT","p":"0","q":"1","T":1}"#;
        assert!(matches!(parse_tick(zero, &btc()), Err(WsError::ParseError(_))));
    }

    #[test]
    fn test_symbol_mismatch_rejected() {
        let raw = r#"{"e":"trade","s":"ETHUSDT","p":"3000","q":"1","T":1}"#;
        let err = parse_tick(raw, &btc()).unwrap_err();
        assert!(err.to_string().contains("symbol mismatch"));
    }
}
