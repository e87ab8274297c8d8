//! Persistence collaborator for the order engine.
//!
//! The [`Store`] trait covers CRUD on products, carts, line items and orders,
//! plus the two primitives the consistency engine relies on: a conditionless
//! atomic stock increment and a single-unit "cancel lines and credit stock"
//! operation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{CartId, LineItemId, LineStatus, Money, OrderId, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use record::{
    Cart, CancelledLine, LineCancellation, LineItem, Order, OrderPage, Product, Restock,
};
pub use store::{Store, StoreExt};
