//! Consistency rules for orders, carts and inventory.
//!
//! This crate provides:
//! - [`InventoryLedger`] for crediting stock back to products
//! - [`CartLineStore`] for line lookups and fulfillment status changes
//! - [`TaxCalculator`] for order tax figures
//! - [`OrderAggregate`] for placing and cancelling orders
//! - [`notification`] for best-effort order confirmations

pub mod cart;
pub mod error;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod tax;

pub use cart::CartLineStore;
pub use error::{DomainError, ErrorKind};
pub use inventory::InventoryLedger;
pub use notification::{
    LogNotifier, NotificationQueue, Notifier, OrderSummary, RecordingNotifier, RetryPolicy,
};
pub use order::{
    CancelItem, CancelItemOutcome, CancelOrder, CancelOrderOutcome, ItemStatusOutcome,
    OrderAggregate, OrderStatus, PlaceOrder, PlacedOrder, SetItemStatus,
};
pub use tax::{TaxCalculator, TaxRate, TaxSummary, TaxableLine};
