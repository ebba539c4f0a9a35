//! Strategy evaluation.
//!
//! A [`Strategy`] sees the tick window of one symbol, in arrival order, after
//! every tick and returns at most one signal.

use crate::config::StrategyConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cmp::Ordering;
use std::collections::HashMap;
use tickgate_core::{Signal, SignalType, Symbol};
use tickgate_feed::TickWindow;
use tracing::{debug, trace};

/// Relative gap between the two averages that maps to full confidence.
const FULL_CONFIDENCE_GAP: Decimal = dec!(0.002);

pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Evaluate the latest state of `window` (oldest tick first).
    fn evaluate(&mut self, window: &TickWindow) -> Option<Signal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    Long,
    Short,
}

/// Short/long moving-average crossover.
///
/// Emits BUY when the short average moves above the long one and SELL when
/// it moves below. Each symbol signals once per side change; a crossover
/// too narrow to reach `min_confidence` is ignored and may signal later.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    short_window: usize,
    long_window: usize,
    min_confidence: f64,
    bias: HashMap<Symbol, Bias>,
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize, min_confidence: f64) -> Self {
        let short_window = short_window.max(1);
        Self {
            short_window,
            long_window: long_window.max(short_window),
            min_confidence,
            bias: HashMap::new(),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.short_window,
            config.long_window,
            config.min_confidence,
        )
    }

    /// Ticks needed before the first signal.
    pub fn required_ticks(&self) -> usize {
        self.long_window
    }
}

impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn evaluate(&mut self, window: &TickWindow) -> Option<Signal> {
        let latest = window.latest()?;
        if window.len() < self.long_window {
            return None;
        }

        // Newest first.
        let prices: Vec<Decimal> = window
            .ticks()
            .iter()
            .rev()
            .take(self.long_window)
            .map(|t| t.price.inner())
            .collect();
        let long = mean(&prices)?;
        let short = mean(&prices[..self.short_window])?;
        if long.is_zero() {
            return None;
        }

        let (bias, signal_type) = match short.cmp(&long) {
            Ordering::Greater => (Bias::Long, SignalType::Buy),
            Ordering::Less => (Bias::Short, SignalType::Sell),
            Ordering::Equal => return None,
        };
        if self.bias.get(&latest.symbol) == Some(&bias) {
            return None;
        }

        // Both averages are positive, so only the divisions can overflow.
        let confidence = (short - long)
            .checked_div(long)
            .and_then(|gap| gap.abs().checked_div(FULL_CONFIDENCE_GAP))
            .and_then(|c| c.to_f64())
            .map_or(1.0, |c| c.min(1.0));
        if confidence < self.min_confidence {
            trace!(
                symbol = %latest.symbol, %short, %long, confidence,
                "Crossover below min confidence"
            );
            return None;
        }

        self.bias.insert(latest.symbol.clone(), bias);
        debug!(
            symbol = %latest.symbol, signal = %signal_type, %short, %long, confidence,
            "Crossover signal"
        );
        Some(Signal::new(
            signal_type,
            latest.symbol.clone(),
            latest.price,
            confidence,
            self.name(),
            latest.timestamp_ms,
        ))
    }
}

/// `None` when empty or when the sum overflows.
fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
}
