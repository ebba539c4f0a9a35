//! Risk parameter engine for tickgate.
//!
//! - [`RiskGate`]: position sizing, stop-loss/take-profit levels, trade
//!   validation and regime-based parameter scaling over one live
//!   [`RiskParameters`] set
//! - [`RegimeAnalyzer`]: classifies a tick window into a [`MarketRegime`]
//!
//! [`MarketRegime`]: tickgate_core::MarketRegime

pub mod error;
pub mod gate;
pub mod regime;

pub use error::{RiskError, RiskResult};
pub use gate::{RiskGate, RiskGateConfig, RiskParameters, RiskParametersUpdate, TradePlan};
pub use regime::RegimeAnalyzer;
