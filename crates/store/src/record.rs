//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, LineItemId, LineStatus, Money, OrderId, ProductId, UserId};

/// A catalog product with its available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    pub unit_price: Money,
    pub taxable: bool,
    /// Available quantity. Never negative at rest.
    pub quantity: i64,
    pub active: bool,
}

impl Product {
    /// Creates an active product.
    pub fn new(name: impl Into<String>, unit_price: Money, taxable: bool, quantity: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            brand: None,
            unit_price,
            taxable,
            quantity,
            active: true,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }
}

/// A shopping cart. Its lines are stored separately as [`LineItem`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new() -> Self {
        Self {
            id: CartId::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

/// One product entry within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    /// Position of the line within its cart.
    pub position: u32,
    pub quantity: u32,
    /// Unit price captured when the line was added to the cart.
    pub unit_price: Money,
    pub status: LineStatus,
}

impl LineItem {
    /// Creates an active line for `product` in `cart_id`, snapshotting its price.
    pub fn for_product(cart_id: CartId, product: &Product, position: u32, quantity: u32) -> Self {
        Self {
            id: LineItemId::new(),
            cart_id,
            product_id: product.id,
            position,
            quantity,
            unit_price: product.unit_price,
            status: LineStatus::Active,
        }
    }

    /// Returns quantity * unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A placed order, bound to exactly one cart for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: UserId,
    pub cart_id: CartId,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(owner: UserId, cart_id: CartId, total: Money) -> Self {
        Self {
            id: OrderId::new(),
            owner,
            cart_id,
            total,
            created_at: Utc::now(),
        }
    }
}

/// A credit of stock back to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Restock {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Request to cancel one line, applied only if it is still in `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCancellation {
    pub line_item_id: LineItemId,
    pub expected: LineStatus,
}

impl LineCancellation {
    pub fn new(line_item_id: LineItemId, expected: LineStatus) -> Self {
        Self {
            line_item_id,
            expected,
        }
    }
}

/// A line that was cancelled together with the stock credit it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledLine {
    pub line_item_id: LineItemId,
    pub restock: Restock,
}

/// One page of orders plus the total number of matching orders.
#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_count: u64,
}
