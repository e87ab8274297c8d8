//! Cart line store: lookups and fulfillment status changes on line items.

use store::{CartId, LineItem, LineItemId, LineStatus, Store};

use crate::error::DomainError;

/// Reads line items and advances their non-cancelling status.
///
/// Cancellation is not handled here: it must credit stock in the same unit
/// of work, which only [`crate::InventoryLedger::restock_cancelled`] does.
#[derive(Clone)]
pub struct CartLineStore<S: Store> {
    store: S,
}

impl<S: Store> CartLineStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Finds a line item by ID.
    pub async fn find_line_item(&self, id: LineItemId) -> Result<LineItem, DomainError> {
        self.store
            .get_line_item(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Line item", id))
    }

    /// Moves exactly one line item to `status`.
    ///
    /// Fails with `Conflict` if the transition is not allowed from the line's
    /// current status or if another writer changed it first.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: LineItemId,
        status: LineStatus,
    ) -> Result<LineItem, DomainError> {
        if status == LineStatus::Cancelled {
            return Err(DomainError::invalid(
                "cancellation must go through the order so stock is restored",
            ));
        }

        let mut line = self.find_line_item(id).await?;
        if !line.status.can_transition_to(status) {
            return Err(DomainError::conflict(format!(
                "line item {id} cannot move from {} to {status}",
                line.status
            )));
        }

        if !self.store.set_line_status(id, line.status, status).await? {
            return Err(DomainError::conflict(format!(
                "line item {id} was modified concurrently"
            )));
        }

        tracing::info!(line_item_id = %id, from = %line.status, to = %status, "line status changed");
        line.status = status;
        Ok(line)
    }

    /// Returns the lines of a cart currently in `status`.
    pub async fn list_by_status(
        &self,
        cart_id: CartId,
        status: LineStatus,
    ) -> Result<Vec<LineItem>, DomainError> {
        Ok(self.store.get_line_items_by_status(cart_id, status).await?)
    }

    /// Returns every line of a cart, in position order.
    pub async fn lines(&self, cart_id: CartId) -> Result<Vec<LineItem>, DomainError> {
        Ok(self.store.get_line_items(cart_id).await?)
    }
}
