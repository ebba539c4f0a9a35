//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    /// Expected control-flow outcome: the trade does not pass a gate.
    #[error("Trade rejected by {gate} gate: {reason}")]
    Rejected { gate: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RiskError {
    pub(crate) fn rejected(gate: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            gate,
            reason: reason.into(),
        }
    }

    /// Gate name for rejections.
    pub fn gate(&self) -> Option<&'static str> {
        match self {
            Self::Rejected { gate, .. } => Some(gate),
            Self::ConfigError(_) => None,
        }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
