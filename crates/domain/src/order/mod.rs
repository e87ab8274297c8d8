//! Order aggregate and related types.

mod aggregate;
mod commands;
mod state;

pub use aggregate::OrderAggregate;
pub use commands::*;
pub use state::OrderStatus;
