//! Order and position side types, plus the order execution boundary types.

use crate::{Price, Size, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short (PnL direction).
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Order side that opens a position in this direction.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn exit_order_side(&self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Order handed to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client order id.
    pub id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: Size,
    pub price: Price,
}

impl OrderRequest {
    pub fn new(symbol: Symbol, side: OrderSide, quantity: Size, price: Price) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol,
            side,
            quantity,
            price,
        }
    }
}

/// Execution status reported back by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Rejected,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filled => write!(f, "filled"),
            Self::PartiallyFilled => write!(f, "partially_filled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Asynchronous order outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub executed_qty: Size,
    pub executed_price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_side_order_sides() {
        assert_eq!(PositionSide::Long.entry_order_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Long.exit_order_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.entry_order_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.sign(), Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn test_order_request_ids_unique() {
        let a = OrderRequest::new("BTCUSDT".into(), OrderSide::Buy, Size::ZERO, Price::ZERO);
        let b = OrderRequest::new("BTCUSDT".into(), OrderSide::Buy, Size::ZERO, Price::ZERO);
        assert_ne!(a.id, b.id);
    }
}
