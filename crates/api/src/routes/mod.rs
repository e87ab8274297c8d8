//! HTTP route handlers.

pub mod health;
pub mod identity;
pub mod metrics;
pub mod orders;
