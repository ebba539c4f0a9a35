//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Market data bus is closed")]
    Closed,

    #[error("Consumer already subscribed: {0}")]
    DuplicateConsumer(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
