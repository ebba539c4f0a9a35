//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tickgate_ws::WsError>),

    #[error("Feed error: {0}")]
    Feed(#[from] tickgate_feed::FeedError),

    #[error("Risk error: {0}")]
    Risk(#[from] tickgate_risk::RiskError),

    #[error("Position error: {0}")]
    Position(#[from] tickgate_position::PositionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tickgate_telemetry::TelemetryError),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tickgate_ws::WsError> for AppError {
    fn from(e: tickgate_ws::WsError) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
