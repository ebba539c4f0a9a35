//! Order execution collaborator.
//!
//! The control loop hands approved orders to an [`OrderExecutor`] and never
//! awaits the result on the tick path.

use crate::error::AppResult;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use tickgate_core::{OrderRequest, OrderResult, OrderStatus};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Submits orders to a venue.
pub trait OrderExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Submit an order. Resolves once the venue reports an outcome.
    fn submit_order(&self, order: OrderRequest) -> BoxFuture<'_, AppResult<OrderResult>>;
}

pub type DynOrderExecutor = Arc<dyn OrderExecutor>;

/// Paper executor: fills every order immediately at its requested price.
#[derive(Debug, Default)]
pub struct PaperExecutor {
    submitted: Mutex<Vec<OrderRequest>>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders submitted so far, oldest first.
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().clone()
    }
}

impl OrderExecutor for PaperExecutor {
    fn name(&self) -> &str {
        "paper"
    }

    fn submit_order(&self, order: OrderRequest) -> BoxFuture<'_, AppResult<OrderResult>> {
        Box::pin(async move {
            let result = OrderResult {
                order_id: order.id.clone(),
                status: OrderStatus::Filled,
                executed_qty: order.quantity,
                executed_price: order.price,
            };
            self.submitted.lock().push(order);
            Ok(result)
        })
    }
}
