//! Order commands and their outcomes.

use serde::Serialize;
use store::{
    CancelledLine, CartId, LineItem, LineItemId, LineStatus, Money, Order, OrderId, Restock,
};

/// Command to place an order over an existing cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The cart whose lines become the order.
    pub cart_id: CartId,

    /// The total the client agreed to pay.
    pub total: Money,
}

impl PlaceOrder {
    pub fn new(cart_id: CartId, total: Money) -> Self {
        Self { cart_id, total }
    }
}

/// Command to cancel a whole order.
#[derive(Debug, Clone, Copy)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

impl CancelOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}

/// Command to cancel one line of an order.
#[derive(Debug, Clone, Copy)]
pub struct CancelItem {
    pub order_id: OrderId,
    pub item_id: LineItemId,
}

impl CancelItem {
    pub fn new(order_id: OrderId, item_id: LineItemId) -> Self {
        Self { order_id, item_id }
    }
}

/// Command to move one line of an order to a new status.
#[derive(Debug, Clone, Copy)]
pub struct SetItemStatus {
    pub order_id: OrderId,
    pub item_id: LineItemId,
    pub status: LineStatus,
}

impl SetItemStatus {
    pub fn new(order_id: OrderId, item_id: LineItemId, status: LineStatus) -> Self {
        Self {
            order_id,
            item_id,
            status,
        }
    }
}

/// A stored order together with the cart lines it was placed over.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<LineItem>,
}

/// Result of a whole-order cancellation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderOutcome {
    pub order_id: OrderId,
    /// Lines cancelled by this call and the stock each one credited.
    pub restocked: Vec<CancelledLine>,
    /// False if a concurrent caller deleted the order first.
    pub deleted: bool,
}

impl CancelOrderOutcome {
    pub fn units_restocked(&self) -> u64 {
        self.restocked
            .iter()
            .map(|c| u64::from(c.restock.quantity))
            .sum()
    }
}

/// Result of a single-line cancellation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelItemOutcome {
    pub order_id: OrderId,
    pub item_id: LineItemId,
    /// Status of the line after the call.
    pub status: LineStatus,
    /// Stock credited by this call, if it did the cancelling.
    pub restocked: Option<Restock>,
    /// True if the line was already cancelled before this call.
    pub already_resolved: bool,
    /// True if the order and its cart no longer exist.
    pub order_cancelled: bool,
}

/// Result of a line status change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemStatusOutcome {
    /// The line was moved to a fulfillment status.
    Updated { line: LineItem },
    /// The request asked for cancellation and went through the cancel path.
    Cancelled(CancelItemOutcome),
}

impl ItemStatusOutcome {
    pub fn status(&self) -> LineStatus {
        match self {
            ItemStatusOutcome::Updated { line } => line.status,
            ItemStatusOutcome::Cancelled(outcome) => outcome.status,
        }
    }
}
