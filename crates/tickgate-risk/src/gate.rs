//! Risk gate.
//!
//! Owns the single live [`RiskParameters`] set. Every calculation reads one
//! consistent snapshot of the parameters; only [`RiskGate::update_parameters`],
//! [`RiskGate::adjust_for_regime`] and [`RiskGate::reset_parameters`] write.
//!
//! # Gate Evaluation Order
//! 1. signal - HOLD is never traded
//! 2. confidence - signal confidence below `min_confidence`
//! 3. regime - VOLATILE regime with low classification confidence
//! 4. size - computed size non-positive or above `max_position_size`
//! 5. drawdown - loss at stop exceeds `balance * max_drawdown_percent`

use crate::error::{RiskError, RiskResult};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tickgate_core::{pct, MarketRegime, PositionSide, Price, Regime, Signal, SignalType, Size, Symbol};
use tickgate_telemetry::Metrics;
use tracing::{debug, info, warn};

// Regime scaling factors. Applied multiplicatively to the live parameters.
const VOLATILE_STOP_LOSS: Decimal = Decimal::from_parts(15, 0, 0, false, 1); // 1.5
const VOLATILE_SIZE: Decimal = Decimal::from_parts(5, 0, 0, false, 1); // 0.5
const VOLATILE_RISK: Decimal = Decimal::from_parts(5, 0, 0, false, 1); // 0.5
const VOLATILE_MULTIPLIER: Decimal = Decimal::from_parts(15, 0, 0, false, 1); // 1.5
const TRENDING_TAKE_PROFIT: Decimal = Decimal::from_parts(15, 0, 0, false, 1); // 1.5
const TRENDING_SIZE: Decimal = Decimal::from_parts(12, 0, 0, false, 1); // 1.2
const RANGING_SCALE: Decimal = Decimal::from_parts(8, 0, 0, false, 1); // 0.8

/// Live risk parameters. Percent fields are whole percents (`2` = 2%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Upper bound on position quantity.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_max_drawdown_percent")]
    pub max_drawdown_percent: Decimal,
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: Decimal,
    #[serde(default = "default_take_profit_percent")]
    pub take_profit_percent: Decimal,
    /// Share of balance put at risk per trade.
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: Decimal,
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: Decimal,
}

fn default_max_position_size() -> Decimal {
    Decimal::from(1000)
}

fn default_max_drawdown_percent() -> Decimal {
    Decimal::from(2)
}

fn default_stop_loss_percent() -> Decimal {
    Decimal::ONE
}

fn default_take_profit_percent() -> Decimal {
    Decimal::from(2)
}

fn default_max_risk_per_trade() -> Decimal {
    Decimal::ONE
}

fn default_volatility_multiplier() -> Decimal {
    Decimal::ONE
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            max_drawdown_percent: default_max_drawdown_percent(),
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_percent: default_take_profit_percent(),
            max_risk_per_trade: default_max_risk_per_trade(),
            volatility_multiplier: default_volatility_multiplier(),
        }
    }
}

impl RiskParameters {
    /// Every field must be strictly positive.
    pub fn validate(&self) -> RiskResult<()> {
        let fields = [
            ("max_position_size", self.max_position_size),
            ("max_drawdown_percent", self.max_drawdown_percent),
            ("stop_loss_percent", self.stop_loss_percent),
            ("take_profit_percent", self.take_profit_percent),
            ("max_risk_per_trade", self.max_risk_per_trade),
            ("volatility_multiplier", self.volatility_multiplier),
        ];
        for (name, value) in fields {
            if value <= Decimal::ZERO {
                return Err(RiskError::ConfigError(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Partial parameter update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RiskParametersUpdate {
    pub max_position_size: Option<Decimal>,
    pub max_drawdown_percent: Option<Decimal>,
    pub stop_loss_percent: Option<Decimal>,
    pub take_profit_percent: Option<Decimal>,
    pub max_risk_per_trade: Option<Decimal>,
    pub volatility_multiplier: Option<Decimal>,
}

impl From<RiskParameters> for RiskParametersUpdate {
    /// Full replacement.
    fn from(p: RiskParameters) -> Self {
        Self {
            max_position_size: Some(p.max_position_size),
            max_drawdown_percent: Some(p.max_drawdown_percent),
            stop_loss_percent: Some(p.stop_loss_percent),
            take_profit_percent: Some(p.take_profit_percent),
            max_risk_per_trade: Some(p.max_risk_per_trade),
            volatility_multiplier: Some(p.volatility_multiplier),
        }
    }
}

impl RiskParametersUpdate {
    fn apply(&self, params: &mut RiskParameters) {
        if let Some(v) = self.max_position_size {
            params.max_position_size = v;
        }
        if let Some(v) = self.max_drawdown_percent {
            params.max_drawdown_percent = v;
        }
        if let Some(v) = self.stop_loss_percent {
            params.stop_loss_percent = v;
        }
        if let Some(v) = self.take_profit_percent {
            params.take_profit_percent = v;
        }
        if let Some(v) = self.max_risk_per_trade {
            params.max_risk_per_trade = v;
        }
        if let Some(v) = self.volatility_multiplier {
            params.volatility_multiplier = v;
        }
    }
}

/// Risk gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGateConfig {
    /// Initial (and reset) parameters.
    #[serde(flatten)]
    pub parameters: RiskParameters,
    /// Signals below this confidence are rejected.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// VOLATILE regimes classified below this confidence (0-100) are rejected.
    #[serde(default = "default_volatile_min_regime_confidence")]
    pub volatile_min_regime_confidence: f64,
    /// Scale parameters when the classified regime changes.
    #[serde(default)]
    pub regime_adjustment: bool,
    /// Symbol whose tick window drives regime classification.
    #[serde(default)]
    pub regime_symbol: Option<Symbol>,
}

fn default_min_confidence() -> f64 {
    0.8
}

fn default_volatile_min_regime_confidence() -> f64 {
    70.0
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            parameters: RiskParameters::default(),
            min_confidence: default_min_confidence(),
            volatile_min_regime_confidence: default_volatile_min_regime_confidence(),
            regime_adjustment: false,
            regime_symbol: None,
        }
    }
}

impl RiskGateConfig {
    pub fn validate(&self) -> RiskResult<()> {
        self.parameters.validate()?;
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(RiskError::ConfigError(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if !(0.0..=100.0).contains(&self.volatile_min_regime_confidence) {
            return Err(RiskError::ConfigError(format!(
                "volatile_min_regime_confidence must be within [0, 100], got {}",
                self.volatile_min_regime_confidence
            )));
        }
        Ok(())
    }
}

/// Approved, fully sized trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub entry: Price,
    pub quantity: Size,
    pub stop_loss: Price,
    pub take_profit: Price,
}

/// Risk parameter engine.
#[derive(Debug)]
pub struct RiskGate {
    config: RiskGateConfig,
    params: RwLock<RiskParameters>,
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        let params = RwLock::new(config.parameters.clone());
        Self { config, params }
    }

    pub fn config(&self) -> &RiskGateConfig {
        &self.config
    }

    /// Snapshot of the live parameters.
    pub fn parameters(&self) -> RiskParameters {
        self.params.read().clone()
    }

    /// Merge `update` into the live parameters.
    pub fn update_parameters(&self, update: impl Into<RiskParametersUpdate>) {
        let update = update.into();
        let mut params = self.params.write();
        update.apply(&mut params);
        info!(?params, "Risk parameters updated");
    }

    /// Restore the configured parameters.
    pub fn reset_parameters(&self) {
        *self.params.write() = self.config.parameters.clone();
        info!("Risk parameters reset to defaults");
    }

    /// `min(balance * risk% / (price * stop%), max_position_size)`.
    ///
    /// Zero when price or stop distance is not positive, or when the
    /// division overflows.
    pub fn calculate_position_size(&self, price: Price, balance: Decimal) -> Size {
        position_size(&self.params.read(), price, balance).unwrap_or(Size::ZERO)
    }

    /// `entry * (1 - stop%)` for LONG, `entry * (1 + stop%)` for SHORT.
    pub fn calculate_stop_loss(&self, entry: Price, side: PositionSide) -> Option<Price> {
        stop_loss(&self.params.read(), entry, side)
    }

    /// `entry * (1 + tp%)` for LONG, `entry * (1 - tp%)` for SHORT.
    pub fn calculate_take_profit(&self, entry: Price, side: PositionSide) -> Option<Price> {
        take_profit(&self.params.read(), entry, side)
    }

    /// Loss if a position of `size` opened at `price` hits its stop.
    pub fn potential_loss(&self, size: Size, price: Price) -> Option<Decimal> {
        potential_loss(&self.params.read(), size, price)
    }

    /// Run every gate and size the trade.
    pub fn evaluate(
        &self,
        signal: &Signal,
        regime: &MarketRegime,
        balance: Decimal,
    ) -> RiskResult<TradePlan> {
        let result = self.check(signal, regime, balance);
        if let Err(RiskError::Rejected { gate, reason }) = &result {
            Metrics::trade_rejected(gate);
            warn!(symbol = %signal.symbol, gate, %reason, "Trade rejected");
        }
        result
    }

    /// Boolean form of [`RiskGate::evaluate`].
    pub fn validate_trade(&self, signal: &Signal, regime: &MarketRegime, balance: Decimal) -> bool {
        self.evaluate(signal, regime, balance).is_ok()
    }

    fn check(
        &self,
        signal: &Signal,
        regime: &MarketRegime,
        balance: Decimal,
    ) -> RiskResult<TradePlan> {
        let side = match signal.signal_type {
            SignalType::Buy => PositionSide::Long,
            SignalType::Sell => PositionSide::Short,
            SignalType::Hold => {
                return Err(RiskError::rejected("signal", "HOLD signals are not traded"))
            }
        };

        if signal.confidence < self.config.min_confidence {
            return Err(RiskError::rejected(
                "confidence",
                format!(
                    "confidence {:.2} < {:.2}",
                    signal.confidence, self.config.min_confidence
                ),
            ));
        }

        if regime.regime == Regime::Volatile
            && regime.confidence < self.config.volatile_min_regime_confidence
        {
            return Err(RiskError::rejected(
                "regime",
                format!(
                    "VOLATILE regime confidence {:.0} < {:.0}",
                    regime.confidence, self.config.volatile_min_regime_confidence
                ),
            ));
        }

        // One snapshot for the whole sizing so a concurrent adjustment
        // cannot mix old and new parameters.
        let params = self.parameters();
        let entry = signal.price;

        let quantity = position_size(&params, entry, balance).ok_or_else(|| {
            RiskError::rejected("size", format!("position size overflows at price {entry}"))
        })?;
        if !quantity.is_positive() {
            return Err(RiskError::rejected(
                "size",
                format!("position size {quantity} is not positive"),
            ));
        }
        if quantity.inner() > params.max_position_size {
            return Err(RiskError::rejected(
                "size",
                format!(
                    "position size {quantity} exceeds max {}",
                    params.max_position_size
                ),
            ));
        }

        let loss = potential_loss(&params, quantity, entry).ok_or_else(|| {
            RiskError::rejected("drawdown", format!("potential loss overflows at price {entry}"))
        })?;
        let max_loss = balance
            .checked_mul(pct(params.max_drawdown_percent))
            .ok_or_else(|| RiskError::rejected("drawdown", "max drawdown overflows"))?;
        if loss > max_loss {
            return Err(RiskError::rejected(
                "drawdown",
                format!("potential loss {loss} exceeds max drawdown {max_loss}"),
            ));
        }

        let (Some(stop), Some(target)) = (
            stop_loss(&params, entry, side),
            take_profit(&params, entry, side),
        ) else {
            return Err(RiskError::rejected(
                "size",
                format!("exit prices overflow at price {entry}"),
            ));
        };
        let plan = TradePlan {
            symbol: signal.symbol.clone(),
            side,
            entry,
            quantity,
            stop_loss: stop,
            take_profit: target,
        };
        debug!(?plan, "Trade approved");
        Ok(plan)
    }

    /// Scale the live parameters for `regime`.
    ///
    /// Scaling compounds across calls; only QUIET restores the defaults.
    /// A step that would overflow leaves the parameters untouched.
    pub fn adjust_for_regime(&self, regime: Regime) {
        let mut params = self.params.write();
        let scaled = match regime {
            Regime::Quiet => Some(self.config.parameters.clone()),
            _ => scale_for_regime(&params, regime),
        };
        match scaled {
            Some(next) => {
                *params = next;
                info!(%regime, ?params, "Risk parameters adjusted for regime");
            }
            None => {
                warn!(%regime, ?params, "Regime scaling overflows, keeping parameters");
            }
        }
    }
}

fn scale_for_regime(params: &RiskParameters, regime: Regime) -> Option<RiskParameters> {
    let mut next = params.clone();
    match regime {
        Regime::Volatile => {
            next.stop_loss_percent = next.stop_loss_percent.checked_mul(VOLATILE_STOP_LOSS)?;
            next.max_position_size = next.max_position_size.checked_mul(VOLATILE_SIZE)?;
            next.max_risk_per_trade = next.max_risk_per_trade.checked_mul(VOLATILE_RISK)?;
            next.volatility_multiplier =
                next.volatility_multiplier.checked_mul(VOLATILE_MULTIPLIER)?;
        }
        Regime::Trending => {
            next.take_profit_percent = next.take_profit_percent.checked_mul(TRENDING_TAKE_PROFIT)?;
            next.max_position_size = next.max_position_size.checked_mul(TRENDING_SIZE)?;
        }
        Regime::Ranging => {
            next.stop_loss_percent = next.stop_loss_percent.checked_mul(RANGING_SCALE)?;
            next.take_profit_percent = next.take_profit_percent.checked_mul(RANGING_SCALE)?;
            next.max_position_size = next.max_position_size.checked_mul(RANGING_SCALE)?;
        }
        Regime::Quiet => {}
    }
    Some(next)
}

fn position_size(params: &RiskParameters, price: Price, balance: Decimal) -> Option<Size> {
    let stop_distance = price.inner().checked_mul(pct(params.stop_loss_percent))?;
    if !price.is_positive() || stop_distance <= Decimal::ZERO || balance <= Decimal::ZERO {
        return Some(Size::ZERO);
    }
    let risk_amount = balance.checked_mul(pct(params.max_risk_per_trade))?;
    let size = risk_amount.checked_div(stop_distance)?;
    Some(Size::new(size.min(params.max_position_size)))
}

fn stop_loss(params: &RiskParameters, entry: Price, side: PositionSide) -> Option<Price> {
    match side {
        PositionSide::Long => entry.checked_offset_pct(-params.stop_loss_percent),
        PositionSide::Short => entry.checked_offset_pct(params.stop_loss_percent),
    }
}

fn take_profit(params: &RiskParameters, entry: Price, side: PositionSide) -> Option<Price> {
    match side {
        PositionSide::Long => entry.checked_offset_pct(params.take_profit_percent),
        PositionSide::Short => entry.checked_offset_pct(-params.take_profit_percent),
    }
}

fn potential_loss(params: &RiskParameters, size: Size, price: Price) -> Option<Decimal> {
    size.checked_notional(price)?
        .checked_mul(pct(params.stop_loss_percent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gate_with(stop_loss_percent: Decimal, max_risk_per_trade: Decimal) -> RiskGate {
        RiskGate::new(RiskGateConfig {
            parameters: RiskParameters {
                stop_loss_percent,
                max_risk_per_trade,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn signal(signal_type: SignalType, price: Decimal, confidence: f64) -> Signal {
        Signal::new(
            signal_type,
            Symbol::new("BTCUSDT"),
            Price::new(price),
            confidence,
            "test",
            0,
        )
    }

    #[test]
    fn test_position_size_stop_normalized() {
        let gate = gate_with(dec!(2), dec!(1));
        let size = gate.calculate_position_size(Price::new(dec!(50000)), dec!(100000));
        assert_eq!(size.inner(), dec!(1));
    }

    #[test]
    fn test_position_size_capped() {
        let gate = RiskGate::new(RiskGateConfig {
            parameters: RiskParameters {
                max_position_size: dec!(0.5),
                stop_loss_percent: dec!(2),
                ..Default::default()
            },
            ..Default::default()
        });
        let size = gate.calculate_position_size(Price::new(dec!(50000)), dec!(100000));
        assert_eq!(size.inner(), dec!(0.5));
    }

    #[test]
    fn test_position_size_zero_price() {
        let gate = RiskGate::new(RiskGateConfig::default());
        assert!(gate
            .calculate_position_size(Price::ZERO, dec!(10000))
            .is_zero());
    }

    #[test]
    fn test_stop_loss_and_take_profit() {
        let gate = gate_with(dec!(2), dec!(1));
        let entry = Price::new(dec!(50000));

        assert_eq!(
            gate.calculate_stop_loss(entry, PositionSide::Long).unwrap().inner(),
            dec!(49000)
        );
        assert_eq!(
            gate.calculate_stop_loss(entry, PositionSide::Short).unwrap().inner(),
            dec!(51000)
        );
        assert_eq!(
            gate.calculate_take_profit(entry, PositionSide::Long).unwrap().inner(),
            dec!(51000)
        );
        assert_eq!(
            gate.calculate_take_profit(entry, PositionSide::Short).unwrap().inner(),
            dec!(49000)
        );
    }

    #[test]
    fn test_evaluate_approves_and_sizes() {
        let gate = gate_with(dec!(2), dec!(1));
        let plan = gate
            .evaluate(
                &signal(SignalType::Buy, dec!(50000), 0.9),
                &MarketRegime::default(),
                dec!(100000),
            )
            .unwrap();

        assert_eq!(plan.side, PositionSide::Long);
        assert_eq!(plan.quantity.inner(), dec!(1));
        assert_eq!(plan.stop_loss.inner(), dec!(49000));
        assert_eq!(plan.take_profit.inner(), dec!(51000));

        let short = gate
            .evaluate(
                &signal(SignalType::Sell, dec!(50000), 0.9),
                &MarketRegime::default(),
                dec!(100000),
            )
            .unwrap();
        assert_eq!(short.side, PositionSide::Short);
        assert_eq!(short.stop_loss.inner(), dec!(51000));
    }

    #[test]
    fn test_rejects_low_confidence() {
        let gate = RiskGate::new(RiskGateConfig::default());
        let err = gate
            .evaluate(
                &signal(SignalType::Buy, dec!(100), 0.79),
                &MarketRegime::default(),
                dec!(10000),
            )
            .unwrap_err();
        assert_eq!(err.gate(), Some("confidence"));

        assert!(gate.validate_trade(
            &signal(SignalType::Buy, dec!(100), 0.8),
            &MarketRegime::default(),
            dec!(10000),
        ));
    }

    #[test]
    fn test_rejects_uncertain_volatile_regime() {
        let gate = RiskGate::new(RiskGateConfig::default());
        let sig = signal(SignalType::Buy, dec!(100), 0.95);

        let low = MarketRegime::new(Regime::Volatile, 65.0);
        assert_eq!(
            gate.evaluate(&sig, &low, dec!(10000)).unwrap_err().gate(),
            Some("regime")
        );

        let high = MarketRegime::new(Regime::Volatile, 85.0);
        assert!(gate.validate_trade(&sig, &high, dec!(10000)));

        // Low confidence only matters for VOLATILE.
        let trending = MarketRegime::new(Regime::Trending, 50.0);
        assert!(gate.validate_trade(&sig, &trending, dec!(10000)));
    }

    #[test]
    fn test_rejects_hold_and_empty_balance() {
        let gate = RiskGate::new(RiskGateConfig::default());
        let hold = signal(SignalType::Hold, dec!(100), 1.0);
        assert_eq!(
            gate.evaluate(&hold, &MarketRegime::default(), dec!(10000))
                .unwrap_err()
                .gate(),
            Some("signal")
        );

        let buy = signal(SignalType::Buy, dec!(100), 1.0);
        assert_eq!(
            gate.evaluate(&buy, &MarketRegime::default(), Decimal::ZERO)
                .unwrap_err()
                .gate(),
            Some("size")
        );
    }

    #[test]
    fn test_rejects_drawdown() {
        // Risking 5% per trade with a 2% drawdown limit: loss at stop is 5% of balance.
        let gate = gate_with(dec!(1), dec!(5));
        let sig = signal(SignalType::Buy, dec!(100), 0.9);
        let err = gate
            .evaluate(&sig, &MarketRegime::default(), dec!(10000))
            .unwrap_err();
        assert_eq!(err.gate(), Some("drawdown"));
        assert_eq!(
            gate.potential_loss(Size::new(dec!(50)), Price::new(dec!(100))),
            Some(dec!(50))
        );
    }

    #[test]
    fn test_update_parameters_partial_merge() {
        let gate = RiskGate::new(RiskGateConfig::default());
        gate.update_parameters(RiskParametersUpdate {
            stop_loss_percent: Some(dec!(3)),
            ..Default::default()
        });

        let params = gate.parameters();
        assert_eq!(params.stop_loss_percent, dec!(3));
        assert_eq!(params.take_profit_percent, dec!(2));

        gate.update_parameters(RiskParameters::default());
        assert_eq!(gate.parameters(), RiskParameters::default());
    }

    #[test]
    fn test_regime_adjustment_compounds_until_quiet() {
        let gate = RiskGate::new(RiskGateConfig::default());

        gate.adjust_for_regime(Regime::Volatile);
        let once = gate.parameters();
        assert_eq!(once.stop_loss_percent, dec!(1.5));
        assert_eq!(once.max_position_size, dec!(500));
        assert_eq!(once.max_risk_per_trade, dec!(0.5));

        gate.adjust_for_regime(Regime::Volatile);
        let twice = gate.parameters();
        assert_eq!(twice.stop_loss_percent, dec!(2.25));
        assert_eq!(twice.max_position_size, dec!(250));

        gate.adjust_for_regime(Regime::Quiet);
        assert_eq!(gate.parameters(), RiskParameters::default());
    }

    #[test]
    fn test_trending_and_ranging_scaling() {
        let gate = RiskGate::new(RiskGateConfig::default());
        gate.adjust_for_regime(Regime::Trending);
        let p = gate.parameters();
        assert_eq!(p.take_profit_percent, dec!(3));
        assert_eq!(p.max_position_size, dec!(1200));
        assert_eq!(p.stop_loss_percent, dec!(1));

        gate.reset_parameters();
        gate.adjust_for_regime(Regime::Ranging);
        let p = gate.parameters();
        assert_eq!(p.stop_loss_percent, dec!(0.8));
        assert_eq!(p.take_profit_percent, dec!(1.6));
        assert_eq!(p.max_position_size, dec!(800));
    }

    #[test]
    fn test_dust_price_size_overflow_rejected() {
        let gate = RiskGate::new(RiskGateConfig::default());
        let dust = Price::new(dec!(0.00000000000000000000000001));
        assert!(gate.calculate_position_size(dust, dec!(10000)).is_zero());

        let err = gate
            .evaluate(
                &Signal::new(SignalType::Buy, Symbol::new("DUSTUSDT"), dust, 1.0, "test", 0),
                &MarketRegime::default(),
                dec!(10000),
            )
            .unwrap_err();
        assert_eq!(err.gate(), Some("size"));
    }

    #[test]
    fn test_huge_price_exit_overflow_rejected() {
        let gate = RiskGate::new(RiskGateConfig::default());
        let huge = Price::new(Decimal::MAX);
        assert_eq!(gate.calculate_take_profit(huge, PositionSide::Long), None);
        assert!(!gate.validate_trade(
            &signal(SignalType::Buy, Decimal::MAX, 1.0),
            &MarketRegime::default(),
            dec!(10000),
        ));
    }

    #[test]
    fn test_regime_scaling_overflow_keeps_parameters() {
        let gate = RiskGate::new(RiskGateConfig::default());
        for i in 0..2000 {
            let regime = if i % 2 == 0 { Regime::Volatile } else { Regime::Ranging };
            gate.adjust_for_regime(regime);
        }
        let stuck = gate.parameters();
        assert!(stuck.stop_loss_percent > dec!(1));

        // Saturated: the next widening step is refused, not applied.
        gate.adjust_for_regime(Regime::Volatile);
        gate.adjust_for_regime(Regime::Volatile);
        let after = gate.parameters();
        assert!(after.stop_loss_percent >= stuck.stop_loss_percent);

        gate.adjust_for_regime(Regime::Quiet);
        assert_eq!(gate.parameters(), RiskParameters::default());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: RiskGateConfig = toml::from_str(
            r#"
            stop_loss_percent = 2
            min_confidence = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.parameters.stop_loss_percent, dec!(2));
        assert_eq!(config.parameters.max_position_size, dec!(1000));
        assert_eq!(config.min_confidence, 0.6);
        assert!(config.validate().is_ok());

        let mut bad = RiskGateConfig::default();
        bad.parameters.stop_loss_percent = Decimal::ZERO;
        assert!(matches!(bad.validate(), Err(RiskError::ConfigError(_))));
    }
}
