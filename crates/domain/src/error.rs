//! Domain error types.

use store::StoreError;
use thiserror::Error;

/// Classification of a [`DomainError`], used by outer layers to choose a
/// response without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested entity does not exist, or the requester may not see it.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request itself is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request is well formed but clashes with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store failed in a way the caller cannot fix.
    #[error("Unexpected store failure: {0}")]
    Unexpected(#[source] StoreError),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DomainError::InvalidInput(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        DomainError::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::InvalidInput(_) => ErrorKind::InvalidInput,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProductNotFound(id) => DomainError::not_found("Product", id),
            StoreError::CartNotFound(id) => DomainError::not_found("Cart", id),
            StoreError::LineItemNotFound(id) => DomainError::not_found("Line item", id),
            StoreError::CartAlreadyBound { cart_id, order_id } => DomainError::Conflict(format!(
                "cart {cart_id} is already bound to order {order_id}"
            )),
            StoreError::Duplicate(what) => DomainError::Conflict(what),
            other => DomainError::Unexpected(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{CartId, OrderId, ProductId};

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: DomainError = StoreError::ProductNotFound(ProductId::new()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("Product not found"));
    }

    #[test]
    fn cart_binding_maps_to_conflict() {
        let err: DomainError = StoreError::CartAlreadyBound {
            cart_id: CartId::new(),
            order_id: OrderId::new(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn infrastructure_failures_are_unexpected() {
        let err: DomainError = StoreError::Unavailable("connection reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(ErrorKind::Unexpected.as_str(), "unexpected");
    }
}
