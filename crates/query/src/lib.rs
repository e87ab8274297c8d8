//! Read side of the order engine.
//!
//! This crate provides:
//! - [`OrderQueryService`] for fetching, listing and searching orders
//! - [`OrderView`], the order as rendered to callers, with derived status
//!   and tax figures

pub mod service;
pub mod view;

pub use service::{ListOrders, OrderQueryService, PageSettings};
pub use view::{OrderLineView, OrderListPage, OrderView};
