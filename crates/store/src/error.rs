use thiserror::Error;

use crate::{CartId, LineItemId, OrderId, ProductId};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A product referenced by a write does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A cart referenced by a write does not exist.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// A line item referenced by a write does not exist.
    #[error("Line item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// The cart already backs another order.
    #[error("Cart {cart_id} is already bound to order {order_id}")]
    CartAlreadyBound { cart_id: CartId, order_id: OrderId },

    /// A record with the same identifier already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A record is malformed or could not be decoded.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The backing storage is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
