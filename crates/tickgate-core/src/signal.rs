//! Strategy signals and market regime classification.

use crate::{Price, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Output of strategy evaluation, consumed once by the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub symbol: Symbol,
    pub price: Price,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Name of the strategy that produced this signal.
    pub source: String,
    /// Unix ms.
    pub timestamp_ms: i64,
}

impl Signal {
    /// Create a signal; confidence is clamped into `[0, 1]`.
    pub fn new(
        signal_type: SignalType,
        symbol: Symbol,
        price: Price,
        confidence: f64,
        source: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            signal_type,
            symbol,
            price,
            confidence,
            source: source.into(),
            timestamp_ms,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.signal_type != SignalType::Hold
    }
}

/// Coarse market condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
    Quiet,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Volatile => write!(f, "VOLATILE"),
            Self::Quiet => write!(f, "QUIET"),
        }
    }
}

/// Regime with its classification confidence (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRegime {
    pub regime: Regime,
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl MarketRegime {
    pub fn new(regime: Regime, confidence: f64) -> Self {
        Self {
            regime,
            confidence,
            recommendations: Vec::new(),
        }
    }
}

impl Default for MarketRegime {
    /// Ranging at neutral confidence, used before any classification exists.
    fn default() -> Self {
        Self::new(Regime::Ranging, 50.0)
    }
}
