//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so a partial file (or no
//! file at all) yields a runnable configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tickgate_core::{ConnectionId, StreamType, Symbol};
use tickgate_position::LedgerConfig;
use tickgate_risk::RiskGateConfig;
use tickgate_ws::ConnectionConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TICKGATE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Stream connection settings shared by all subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Base URL that default stream paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Maximum reconnection attempts (0 = unlimited).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// How long a closing connection may take before its task is aborted.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

fn default_base_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30000
}

fn default_close_grace_ms() -> u64 {
    1000
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl StreamSettings {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
        }
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// One market stream to subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub symbol: Symbol,
    #[serde(default)]
    pub stream: StreamType,
    /// Explicit stream URL. Defaults to `{base_url}/{symbol}@{stream}`.
    #[serde(default)]
    pub url: Option<String>,
}

impl SubscriptionConfig {
    pub fn new(symbol: impl Into<Symbol>, stream: StreamType) -> Self {
        Self {
            symbol: symbol.into(),
            stream,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn id(&self) -> ConnectionId {
        ConnectionId::new(self.symbol.clone(), self.stream)
    }

    pub fn resolve_url(&self, base_url: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => self.id().default_url(base_url),
        }
    }
}

/// Control loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the position monitor tick.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Per-consumer queue capacity on the market data bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Ticks kept per symbol for strategy and regime evaluation.
    #[serde(default = "default_tick_window")]
    pub tick_window: usize,
    /// Buffer of the connection event channel and the engine event broadcast.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_tick_window() -> usize {
    50
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            bus_capacity: default_bus_capacity(),
            tick_window: default_tick_window(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// Moving-average crossover settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    /// Crossovers below this confidence are not signalled.
    #[serde(default = "default_strategy_min_confidence")]
    pub min_confidence: f64,
}

fn default_short_window() -> usize {
    3
}

fn default_long_window() -> usize {
    10
}

fn default_strategy_min_confidence() -> f64 {
    0.8
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            min_confidence: default_strategy_min_confidence(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub risk: RiskGateConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl AppConfig {
    /// Load from `TICKGATE_CONFIG` or the default path, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.risk
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let stream = &self.stream;
        if stream.reconnect_base_delay_ms == 0 {
            return Err(AppError::Config(
                "stream.reconnect_base_delay_ms must be positive".to_string(),
            ));
        }
        if stream.reconnect_max_delay_ms < stream.reconnect_base_delay_ms {
            return Err(AppError::Config(format!(
                "stream.reconnect_max_delay_ms ({}) is below reconnect_base_delay_ms ({})",
                stream.reconnect_max_delay_ms, stream.reconnect_base_delay_ms
            )));
        }

        if self.ledger.max_open_positions == 0 {
            return Err(AppError::Config(
                "ledger.max_open_positions must be at least 1".to_string(),
            ));
        }

        let engine = &self.engine;
        if engine.monitor_interval_ms == 0 || engine.bus_capacity == 0 || engine.event_capacity == 0
        {
            return Err(AppError::Config(
                "engine intervals and capacities must be positive".to_string(),
            ));
        }

        let strategy = &self.strategy;
        if strategy.short_window == 0 || strategy.short_window >= strategy.long_window {
            return Err(AppError::Config(format!(
                "strategy windows must satisfy 0 < short ({}) < long ({})",
                strategy.short_window, strategy.long_window
            )));
        }
        if engine.tick_window < strategy.long_window {
            return Err(AppError::Config(format!(
                "engine.tick_window ({}) must hold strategy.long_window ({})",
                engine.tick_window, strategy.long_window
            )));
        }
        if !(0.0..=1.0).contains(&strategy.min_confidence) {
            return Err(AppError::Config(format!(
                "strategy.min_confidence must be within [0, 1], got {}",
                strategy.min_confidence
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for sub in &self.subscriptions {
            if !seen.insert(sub.id()) {
                return Err(AppError::Config(format!(
                    "duplicate subscription {}",
                    sub.id()
                )));
            }
        }
        Ok(())
    }

    /// Symbol whose window drives regime classification.
    pub fn regime_symbol(&self) -> Option<Symbol> {
        self.risk
            .regime_symbol
            .clone()
            .or_else(|| self.subscriptions.first().map(|s| s.symbol.clone()))
    }
}
