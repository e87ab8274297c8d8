//! Shared types for the storefront order engine.
//!
//! Identifiers, money, line status and the resolved requester identity are
//! used by every layer, from persistence records up to the HTTP surface.

mod identity;
mod ids;
mod money;
mod status;

pub use identity::{ParseRoleError, Requester, Role};
pub use ids::{CartId, LineItemId, OrderId, ProductId, UserId};
pub use money::Money;
pub use status::{LineStatus, ParseStatusError};
