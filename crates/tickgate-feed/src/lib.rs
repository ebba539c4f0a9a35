//! In-process market data fan-out for tickgate.
//!
//! Stream connections publish parsed ticks into a [`MarketDataBus`]; every
//! subscribed consumer gets its own bounded queue so a slow consumer only
//! loses its own oldest ticks and never stalls the producer.

pub mod bus;
pub mod error;
pub mod window;

pub use bus::{BusReceiver, MarketDataBus};
pub use error::{FeedError, FeedResult};
pub use window::TickWindow;
