//! Position ledger for tickgate.
//!
//! Tracks open positions (at most one per symbol), applies stop-loss and
//! take-profit exits on price updates and books realized PnL into the balance.
//!
//! # Key Components
//!
//! - [`PositionLedger`]: authoritative store of open positions and balance
//! - [`Position`]: an open position with fixed protective levels
//! - [`ClosedPosition`]: a position after exit, with its realized PnL
//! - [`ExitReason`]: why a position was closed

pub mod error;
pub mod ledger;

pub use error::{PositionError, PositionResult};
pub use ledger::{ClosedPosition, ExitReason, LedgerConfig, Position, PositionLedger};
