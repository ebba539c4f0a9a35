//! tickgate control loop.
//!
//! Wires the market streams into strategy evaluation, the risk gate and the
//! position ledger:
//! - stream connections publish ticks on the market data bus
//! - the bundled strategy turns tick windows into signals
//! - approved trades open ledger positions and go to the order executor
//! - a monitor tick closes positions whose stop or target was crossed

pub mod app;
pub mod config;
pub mod error;
pub mod executor;
pub mod strategy;

pub use app::{ControlLoop, EngineEvent};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use executor::{OrderExecutor, PaperExecutor};
pub use strategy::{MovingAverageCrossover, Strategy};
