//! Position error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("Position not found: {0}")]
    NotFound(String),

    #[error("Position already open: {0}")]
    AlreadyOpen(String),

    #[error("Position limit exceeded: {open}/{max} open")]
    LimitExceeded { open: usize, max: usize },

    #[error("Invalid position: {0}")]
    Invalid(String),
}

pub type PositionResult<T> = Result<T, PositionError>;
