//! Prometheus metrics and structured logging for tickgate.
//!
//! - Prometheus metrics for stream health, ticks, signals, risk rejections and positions
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
