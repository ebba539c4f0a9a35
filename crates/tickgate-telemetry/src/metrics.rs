//! Prometheus metrics for the tickgate engine.
//!
//! Covers:
//! - Stream connection state and reconnects
//! - Tick throughput and bus back-pressure
//! - Signals and risk gate rejections
//! - Position lifecycle, balance and order outcomes
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught at first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter_vec, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec,
    HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

/// Every state label a stream connection can report.
const STREAM_STATES: [&str; 6] = ["idle", "connecting", "open", "closing", "backoff", "failed"];

/// Stream connection state (1 = active state, 0 = inactive).
/// Labels: connection (SYMBOL@stream), state
pub static STREAM_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tickgate_stream_state",
        "Stream connection state (1=active, 0=inactive)",
        &["connection", "state"]
    )
    .unwrap()
});

/// Total reconnect attempts per connection.
pub static STREAM_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_stream_reconnect_total",
        "Total stream reconnect attempts",
        &["connection"]
    )
    .unwrap()
});

/// Connections that exhausted their reconnect attempts.
pub static STREAM_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_stream_failed_total",
        "Total stream connections that reached the failed state",
        &["connection"]
    )
    .unwrap()
});

/// Inbound messages dropped because they did not parse into a tick.
pub static STREAM_MALFORMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_stream_malformed_total",
        "Total malformed stream messages dropped",
        &["connection"]
    )
    .unwrap()
});

/// Ticks published onto the market data bus.
pub static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_ticks_total",
        "Total market ticks published",
        &["symbol"]
    )
    .unwrap()
});

/// Ticks evicted from a slow consumer's queue.
pub static BUS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_bus_dropped_total",
        "Total ticks dropped for slow bus consumers",
        &["consumer"]
    )
    .unwrap()
});

/// Strategy signals produced.
pub static SIGNALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_signals_total",
        "Total strategy signals",
        &["symbol", "signal"]
    )
    .unwrap()
});

/// Trades rejected by the risk gate.
pub static TRADES_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_trades_rejected_total",
        "Total trades rejected by the risk gate",
        &["gate"]
    )
    .unwrap()
});

/// Positions opened.
pub static POSITIONS_OPENED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_positions_opened_total",
        "Total positions opened",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Positions closed, by exit reason.
pub static POSITIONS_CLOSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickgate_positions_closed_total",
        "Total positions closed",
        &["symbol", "reason"]
    )
    .unwrap()
});

/// Currently open positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tickgate_open_positions", "Number of open positions").unwrap()
});

/// Account balance after realized PnL.
pub static BALANCE: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("tickgate_balance", "Account balance").unwrap());

/// Realized PnL per closed position.
pub static REALIZED_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tickgate_realized_pnl",
        "Realized PnL per closed position",
        &["symbol"],
        vec![-1000.0, -100.0, -10.0, -1.0, 0.0, 1.0, 10.0, 100.0, 1000.0]
    )
    .unwrap()
});

/// Order outcomes reported by the executor.
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickgate_orders_total",
        "Total orders submitted, by outcome",
        &["status"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the active state of a stream connection.
    /// Only the active state is 1, all others are reset to 0.
    pub fn stream_state_set(connection: &str, state: &str) {
        for s in STREAM_STATES {
            STREAM_STATE.with_label_values(&[connection, s]).set(0.0);
        }
        STREAM_STATE.with_label_values(&[connection, state]).set(1.0);
    }

    pub fn stream_reconnect(connection: &str) {
        STREAM_RECONNECT_TOTAL.with_label_values(&[connection]).inc();
    }

    pub fn stream_failed(connection: &str) {
        STREAM_FAILED_TOTAL.with_label_values(&[connection]).inc();
    }

    pub fn stream_malformed(connection: &str) {
        STREAM_MALFORMED_TOTAL.with_label_values(&[connection]).inc();
    }

    pub fn tick_published(symbol: &str) {
        TICKS_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn bus_dropped(consumer: &str) {
        BUS_DROPPED_TOTAL.with_label_values(&[consumer]).inc();
    }

    pub fn signal(symbol: &str, signal: &str) {
        SIGNALS_TOTAL.with_label_values(&[symbol, signal]).inc();
    }

    /// Record a risk gate rejection.
    pub fn trade_rejected(gate: &str) {
        TRADES_REJECTED_TOTAL.with_label_values(&[gate]).inc();
    }

    pub fn position_opened(symbol: &str, side: &str) {
        POSITIONS_OPENED_TOTAL
            .with_label_values(&[symbol, side])
            .inc();
    }

    /// Record a closed position and its realized PnL.
    pub fn position_closed(symbol: &str, reason: &str, pnl: f64) {
        POSITIONS_CLOSED_TOTAL
            .with_label_values(&[symbol, reason])
            .inc();
        REALIZED_PNL.with_label_values(&[symbol]).observe(pnl);
    }

    pub fn open_positions_set(count: usize) {
        OPEN_POSITIONS.set(count as i64);
    }

    pub fn balance_set(balance: f64) {
        BALANCE.set(balance);
    }

    pub fn order(status: &str) {
        ORDERS_TOTAL.with_label_values(&[status]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
