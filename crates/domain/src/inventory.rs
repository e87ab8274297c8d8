//! Inventory ledger: credits stock back to products.
//!
//! Every credit is a conditionless add at the storage layer, so concurrent
//! restocks of the same product never lose an update.

use store::{CancelledLine, LineCancellation, ProductId, Restock, Store};

use crate::error::DomainError;

/// Restores product stock when order lines are cancelled.
#[derive(Clone)]
pub struct InventoryLedger<S: Store> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `quantity` units back to a product's stock.
    ///
    /// Entry point for callers outside the order flow, such as returns
    /// handling. Order cancellations credit stock through
    /// [`Self::restock_cancelled`] instead.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Restock, DomainError> {
        if quantity == 0 {
            return Err(DomainError::invalid("restock quantity must be positive"));
        }

        self.store.increment_stock(product_id, quantity).await?;
        metrics::counter!("units_restocked_total").increment(u64::from(quantity));
        Ok(Restock::new(product_id, quantity))
    }

    /// Applies several credits as one unit. An empty batch is a no-op.
    ///
    /// Like [`Self::restock`], this is for callers outside the order flow.
    #[tracing::instrument(skip(self, restocks), fields(count = restocks.len()))]
    pub async fn restock_many(&self, restocks: &[Restock]) -> Result<(), DomainError> {
        if restocks.is_empty() {
            return Ok(());
        }
        if restocks.iter().any(|r| r.quantity == 0) {
            return Err(DomainError::invalid("restock quantity must be positive"));
        }

        self.store.increment_stock_many(restocks).await?;
        metrics::counter!("units_restocked_total").increment(units(restocks.iter()));
        Ok(())
    }

    /// Cancels lines and credits their stock in the same unit of work.
    ///
    /// Lines no longer in their expected status are skipped and not credited,
    /// which makes a retried cancellation safe.
    #[tracing::instrument(skip(self, cancellations), fields(count = cancellations.len()))]
    pub async fn restock_cancelled(
        &self,
        cancellations: &[LineCancellation],
    ) -> Result<Vec<CancelledLine>, DomainError> {
        if cancellations.is_empty() {
            return Ok(Vec::new());
        }

        let cancelled = self.store.cancel_lines(cancellations).await?;
        if cancelled.len() < cancellations.len() {
            tracing::debug!(
                requested = cancellations.len(),
                cancelled = cancelled.len(),
                "some lines were already resolved"
            );
        }
        metrics::counter!("units_restocked_total")
            .increment(units(cancelled.iter().map(|c| &c.restock)));
        Ok(cancelled)
    }
}

fn units<'a>(restocks: impl Iterator<Item = &'a Restock>) -> u64 {
    restocks.map(|r| u64::from(r.quantity)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use store::{Cart, InMemoryStore, LineItem, LineStatus, Money, Product};

    async fn stocked(store: &InMemoryStore, quantity: i64) -> Product {
        let product = Product::new("Widget", Money::from_cents(100), true, quantity);
        store.insert_product(product.clone()).await.unwrap();
        product
    }

    async fn quantity(store: &InMemoryStore, id: ProductId) -> i64 {
        store.get_product(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn restock_adds_to_stock() {
        let store = InMemoryStore::new();
        let product = stocked(&store, 5).await;
        let ledger = InventoryLedger::new(store.clone());

        let credit = ledger.restock(product.id, 3).await.unwrap();

        assert_eq!(credit, Restock::new(product.id, 3));
        assert_eq!(quantity(&store, product.id).await, 8);
    }

    #[tokio::test]
    async fn restock_rejects_zero_and_unknown_products() {
        let store = InMemoryStore::new();
        let ledger = InventoryLedger::new(store);

        let zero = ledger.restock(ProductId::new(), 0).await.unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::InvalidInput);

        let missing = ledger.restock(ProductId::new(), 1).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn restock_many_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let product = stocked(&store, 1).await;
        let ledger = InventoryLedger::new(store.clone());

        let result = ledger
            .restock_many(&[
                Restock::new(product.id, 4),
                Restock::new(ProductId::new(), 2),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(quantity(&store, product.id).await, 1);

        ledger
            .restock_many(&[Restock::new(product.id, 4), Restock::new(product.id, 2)])
            .await
            .unwrap();
        assert_eq!(quantity(&store, product.id).await, 7);
    }

    #[tokio::test]
    async fn restock_many_accepts_empty_batch() {
        let ledger = InventoryLedger::new(InMemoryStore::new());
        ledger.restock_many(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn restock_cancelled_credits_each_line_once() {
        let store = InMemoryStore::new();
        let product = stocked(&store, 0).await;
        let cart = Cart::new();
        let line = LineItem::for_product(cart.id, &product, 0, 2);
        store.insert_cart(cart, vec![line.clone()]).await.unwrap();
        let ledger = InventoryLedger::new(store.clone());

        let request = [LineCancellation::new(line.id, LineStatus::Active)];
        let first = ledger.restock_cancelled(&request).await.unwrap();
        let second = ledger.restock_cancelled(&request).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(quantity(&store, product.id).await, 2);
    }
}
