//! Core domain types for the tickgate trading engine.
//!
//! This crate provides fundamental types used throughout the engine:
//! - `Symbol`, `StreamType`, `ConnectionId`: stream identity
//! - `MarketTick`: one parsed price/volume observation
//! - `Price`, `Size`: precision-safe numeric types
//! - `Signal`, `MarketRegime`: strategy output and regime classification
//! - `PositionSide`, `OrderRequest`, `OrderResult`: trading enums and order boundary

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod signal;

pub use decimal::{pct, Price, Size, HUNDRED};
pub use error::{CoreError, Result};
pub use market::{ConnectionId, MarketTick, StreamType, Symbol};
pub use order::{OrderRequest, OrderResult, OrderSide, OrderStatus, PositionSide};
pub use signal::{MarketRegime, Regime, Signal, SignalType};

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
