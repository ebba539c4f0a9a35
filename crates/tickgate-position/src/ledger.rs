//! Position ledger.
//!
//! One mutex guards the whole ledger state (positions, balance, realized
//! PnL and history), so open and close are atomic with respect to the
//! one-position-per-symbol invariant. The stream consumer path and the
//! periodic monitor both go through this lock.

use crate::error::{PositionError, PositionResult};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tickgate_core::{now_ms, PositionSide, Price, Size, Symbol};
use tickgate_telemetry::Metrics;
use tracing::{debug, info, warn};

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Starting account balance.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Maximum concurrently open positions across all symbols.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Closed positions kept for inspection.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_initial_balance() -> Decimal {
    Decimal::from(10000)
}

fn default_max_open_positions() -> usize {
    3
}

fn default_history_limit() -> usize {
    1000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            max_open_positions: default_max_open_positions(),
            history_limit: default_history_limit(),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Opposite strategy signal.
    Signal,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Signal => "signal",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position.
///
/// Entry terms (`entry_price`, `quantity`, `stop_loss`, `take_profit`) are
/// fixed at open; only the mark fields move while the position is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub entry_price: Price,
    /// Always positive.
    pub quantity: Size,
    pub stop_loss: Price,
    pub take_profit: Price,
    /// Unix ms.
    pub opened_at_ms: i64,
    /// Last marked price.
    pub mark_price: Price,
    /// Unix ms of the last mark.
    pub last_update_ms: i64,
    /// Zero while open; set on close.
    pub realized_pnl: Decimal,
}

impl Position {
    /// PnL if closed at `exit`: `(exit - entry) * quantity * sign`.
    ///
    /// Saturates at the `Decimal` bounds.
    pub fn pnl_at(&self, exit: Price) -> Decimal {
        self.checked_pnl_at(exit).unwrap_or_else(|| {
            let delta = exit.inner().saturating_sub(self.entry_price.inner());
            delta.saturating_mul(self.quantity.inner()) * self.side.sign()
        })
    }

    /// [`Position::pnl_at`] returning `None` on overflow.
    pub fn checked_pnl_at(&self, exit: Price) -> Option<Decimal> {
        exit.inner()
            .checked_sub(self.entry_price.inner())?
            .checked_mul(self.quantity.inner())?
            .checked_mul(self.side.sign())
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.pnl_at(self.mark_price)
    }

    pub fn notional(&self) -> Decimal {
        self.quantity
            .checked_notional(self.mark_price)
            .unwrap_or(Decimal::MAX)
    }

    /// Protective exit triggered at `price`, if any.
    ///
    /// LONG: `price <= stop_loss` or `price >= take_profit`; SHORT mirrors.
    pub fn exit_trigger(&self, price: Price) -> Option<ExitReason> {
        match self.side {
            PositionSide::Long if price <= self.stop_loss => Some(ExitReason::StopLoss),
            PositionSide::Long if price >= self.take_profit => Some(ExitReason::TakeProfit),
            PositionSide::Short if price >= self.stop_loss => Some(ExitReason::StopLoss),
            PositionSide::Short if price <= self.take_profit => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }
}

/// A position after exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Price,
    pub pnl: Decimal,
    pub reason: ExitReason,
    /// Unix ms.
    pub closed_at_ms: i64,
}

#[derive(Debug)]
struct LedgerState {
    positions: HashMap<Symbol, Position>,
    balance: Decimal,
    realized_total: Decimal,
    history: VecDeque<ClosedPosition>,
}

/// Authoritative store of open positions.
#[derive(Debug)]
pub struct PositionLedger {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
}

impl PositionLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Metrics::balance_set(decimal_to_f64(config.initial_balance));
        Metrics::open_positions_set(0);
        Self {
            state: Mutex::new(LedgerState {
                positions: HashMap::new(),
                balance: config.initial_balance,
                realized_total: Decimal::ZERO,
                history: VecDeque::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a position, reporting why it could not be opened.
    ///
    /// Nothing is mutated on error.
    pub fn try_open_position(
        &self,
        symbol: Symbol,
        side: PositionSide,
        price: Price,
        quantity: Size,
        stop_loss: Price,
        take_profit: Price,
    ) -> PositionResult<()> {
        if !quantity.is_positive() {
            return Err(PositionError::Invalid(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        if !price.is_positive() {
            return Err(PositionError::Invalid(format!(
                "entry price must be positive, got {price}"
            )));
        }

        let mut state = self.state.lock();
        if state.positions.contains_key(&symbol) {
            return Err(PositionError::AlreadyOpen(symbol.to_string()));
        }
        let open = state.positions.len();
        if open >= self.config.max_open_positions {
            return Err(PositionError::LimitExceeded {
                open,
                max: self.config.max_open_positions,
            });
        }

        let now = now_ms();
        let position = Position {
            symbol: symbol.clone(),
            side,
            entry_price: price,
            quantity,
            stop_loss,
            take_profit,
            opened_at_ms: now,
            mark_price: price,
            last_update_ms: now,
            realized_pnl: Decimal::ZERO,
        };
        state.positions.insert(symbol.clone(), position);
        let count = state.positions.len();
        drop(state);

        Metrics::position_opened(symbol.as_str(), &side.to_string());
        Metrics::open_positions_set(count);
        info!(
            %symbol, %side, %price, %quantity, %stop_loss, %take_profit,
            "Position opened"
        );
        Ok(())
    }

    /// Open a position. Returns `false` (no mutation) when the symbol
    /// already has a position, the cap is reached or the terms are invalid.
    pub fn open_position(
        &self,
        symbol: Symbol,
        side: PositionSide,
        price: Price,
        quantity: Size,
        stop_loss: Price,
        take_profit: Price,
    ) -> bool {
        match self.try_open_position(symbol.clone(), side, price, quantity, stop_loss, take_profit)
        {
            Ok(()) => true,
            Err(e) => {
                debug!(%symbol, error = %e, "Position not opened");
                false
            }
        }
    }

    /// Mark every position with a known price and close those whose stop-loss
    /// or take-profit was crossed.
    pub fn update_positions(&self, prices: &HashMap<Symbol, Price>) -> Vec<ClosedPosition> {
        let now = now_ms();
        let mut state = self.state.lock();

        let mut triggered = Vec::new();
        for (symbol, position) in state.positions.iter_mut() {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            position.mark_price = price;
            position.last_update_ms = now;
            if let Some(reason) = position.exit_trigger(price) {
                triggered.push((symbol.clone(), price, reason));
            }
        }

        let closed: Vec<ClosedPosition> = triggered
            .into_iter()
            .filter_map(|(symbol, price, reason)| {
                self.close_locked(&mut state, &symbol, price, reason, now)
            })
            .collect();
        let count = state.positions.len();
        drop(state);

        if !closed.is_empty() {
            Metrics::open_positions_set(count);
            for c in &closed {
                record_close(c);
            }
        }
        closed
    }

    /// Close a position at `exit_price` and return its PnL.
    ///
    /// A missing symbol is a no-op that logs a warning and returns zero.
    pub fn close_position(&self, symbol: &Symbol, exit_price: Price) -> Decimal {
        self.close_position_with_reason(symbol, exit_price, ExitReason::Manual)
            .map(|c| c.pnl)
            .unwrap_or(Decimal::ZERO)
    }

    /// Close a position with an explicit exit reason.
    pub fn close_position_with_reason(
        &self,
        symbol: &Symbol,
        exit_price: Price,
        reason: ExitReason,
    ) -> Option<ClosedPosition> {
        let mut state = self.state.lock();
        let closed = self.close_locked(&mut state, symbol, exit_price, reason, now_ms());
        let count = state.positions.len();
        drop(state);

        match &closed {
            Some(c) => {
                Metrics::open_positions_set(count);
                record_close(c);
            }
            None => warn!(%symbol, "Close requested for symbol without an open position"),
        }
        closed
    }

    fn close_locked(
        &self,
        state: &mut LedgerState,
        symbol: &Symbol,
        exit_price: Price,
        reason: ExitReason,
        now: i64,
    ) -> Option<ClosedPosition> {
        let mut position = state.positions.remove(symbol)?;
        let pnl = match position.checked_pnl_at(exit_price) {
            Some(pnl) => pnl,
            None => {
                warn!(%symbol, %exit_price, "PnL overflows, saturating");
                position.pnl_at(exit_price)
            }
        };

        position.mark_price = exit_price;
        position.last_update_ms = now;
        position.realized_pnl = pnl;

        match (
            state.balance.checked_add(pnl),
            state.realized_total.checked_add(pnl),
        ) {
            (Some(balance), Some(realized)) => {
                state.balance = balance;
                state.realized_total = realized;
            }
            _ => {
                warn!(%symbol, %pnl, "Balance overflows, saturating");
                state.balance = state.balance.saturating_add(pnl);
                state.realized_total = state.realized_total.saturating_add(pnl);
            }
        }

        let closed = ClosedPosition {
            position,
            exit_price,
            pnl,
            reason,
            closed_at_ms: now,
        };
        if self.config.history_limit > 0 {
            if state.history.len() >= self.config.history_limit {
                state.history.pop_front();
            }
            state.history.push_back(closed.clone());
        }
        Metrics::balance_set(decimal_to_f64(state.balance));
        Some(closed)
    }

    pub fn get_position(&self, symbol: &Symbol) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.state.lock().positions.contains_key(symbol)
    }

    /// All open positions, sorted by symbol.
    pub fn positions_snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.state.lock().positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub fn position_count(&self) -> usize {
        self.state.lock().positions.len()
    }

    /// Balance including realized PnL only.
    pub fn balance(&self) -> Decimal {
        self.state.lock().balance
    }

    pub fn realized_pnl_total(&self) -> Decimal {
        self.state.lock().realized_total
    }

    /// Unrealized PnL over open positions at their last mark.
    pub fn unrealized_pnl(&self) -> Decimal {
        self.state
            .lock()
            .positions
            .values()
            .map(Position::unrealized_pnl)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Most recent closed positions, oldest first.
    pub fn closed_history(&self) -> Vec<ClosedPosition> {
        self.state.lock().history.iter().cloned().collect()
    }
}

fn record_close(closed: &ClosedPosition) {
    let symbol = &closed.position.symbol;
    Metrics::position_closed(
        symbol.as_str(),
        closed.reason.as_str(),
        decimal_to_f64(closed.pnl),
    );
    info!(
        %symbol,
        side = %closed.position.side,
        entry = %closed.position.entry_price,
        exit = %closed.exit_price,
        pnl = %closed.pnl,
        reason = %closed.reason,
        "Position closed"
    );
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
