use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    CancelledLine, Cart, CartId, LineCancellation, LineItem, LineItemId, LineStatus, Order,
    OrderId, OrderPage, OrderQuery, Product, ProductId, Restock, Result, StoreError,
};

/// Core trait for store implementations.
///
/// Cart, line item and order rows are written only through the order engine;
/// products are written by the catalog and by stock credits.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a new product.
    async fn insert_product(&self, product: Product) -> Result<()>;

    /// Retrieves a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves every product whose ID is in `ids`. Missing IDs are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Adds `quantity` to a product's available stock.
    ///
    /// This is a single conditionless add at the storage layer, never a
    /// read-modify-write. Fails with `ProductNotFound` if the product is absent.
    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<()>;

    /// Applies several stock credits as one unit: either every credit is
    /// applied or none is.
    async fn increment_stock_many(&self, restocks: &[Restock]) -> Result<()>;

    /// Inserts a cart together with its line items.
    ///
    /// Every line must belong to `cart` and carry a positive quantity.
    async fn insert_cart(&self, cart: Cart, lines: Vec<LineItem>) -> Result<()>;

    /// Retrieves a cart by ID.
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Retrieves a line item by ID.
    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>>;

    /// Retrieves all line items of a cart, in position order.
    async fn get_line_items(&self, cart_id: CartId) -> Result<Vec<LineItem>>;

    /// Retrieves the line items of a cart that are in `status`, in position order.
    async fn get_line_items_by_status(
        &self,
        cart_id: CartId,
        status: LineStatus,
    ) -> Result<Vec<LineItem>>;

    /// Sets a line item's status to `new` if it is currently `expected`.
    ///
    /// Returns false when the line exists but is no longer in `expected`.
    /// Fails with `LineItemNotFound` if the line is absent.
    async fn set_line_status(
        &self,
        id: LineItemId,
        expected: LineStatus,
        new: LineStatus,
    ) -> Result<bool>;

    /// Cancels lines and credits their quantities back to stock, as one unit.
    ///
    /// Each line is transitioned to `Cancelled` only if it is still in its
    /// expected status; only the lines actually transitioned are credited and
    /// returned. A line already cancelled is never credited a second time.
    async fn cancel_lines(&self, cancellations: &[LineCancellation])
    -> Result<Vec<CancelledLine>>;

    /// Inserts a new order.
    ///
    /// Fails with `CartNotFound` if the cart is absent, or `CartAlreadyBound`
    /// if another order already owns the cart.
    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Retrieves an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the order bound to a cart, if any.
    async fn find_order_by_cart(&self, cart_id: CartId) -> Result<Option<Order>>;

    /// Retrieves a page of orders, newest first, with the total match count.
    async fn query_orders(&self, query: OrderQuery) -> Result<OrderPage>;

    /// Deletes an order together with its bound cart and line items.
    ///
    /// Returns false if the order was already gone.
    async fn delete_order_and_cart(&self, id: OrderId) -> Result<bool>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Checks if an order exists.
    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(self.get_order(id).await?.is_some())
    }

    /// Loads an order's line items.
    ///
    /// Returns None if the order's cart is missing.
    async fn load_order_lines(&self, order: &Order) -> Result<Option<Vec<LineItem>>> {
        if self.get_cart(order.cart_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.get_line_items(order.cart_id).await?))
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}

/// Checks the lines written with a new cart.
pub fn validate_cart_lines(cart: &Cart, lines: &[LineItem]) -> Result<()> {
    for line in lines {
        if line.cart_id != cart.id {
            return Err(StoreError::InvalidRecord(format!(
                "line item {} does not belong to cart {}",
                line.id, cart.id
            )));
        }
        if line.quantity == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "line item {} has zero quantity",
                line.id
            )));
        }
    }
    Ok(())
}

/// Merges credits for the same product into one, dropping zero quantities.
///
/// The result is ordered by product ID so that batch writers always lock
/// product rows in the same order.
pub fn coalesce_restocks(restocks: &[Restock]) -> Vec<Restock> {
    let mut merged: BTreeMap<ProductId, u64> = BTreeMap::new();
    for restock in restocks.iter().filter(|r| r.quantity > 0) {
        *merged.entry(restock.product_id).or_default() += u64::from(restock.quantity);
    }
    merged
        .into_iter()
        .flat_map(|(product_id, total)| split_quantity(product_id, total))
        .collect()
}

fn split_quantity(product_id: ProductId, mut total: u64) -> Vec<Restock> {
    let mut parts = Vec::new();
    while total > 0 {
        let chunk = total.min(u64::from(u32::MAX));
        parts.push(Restock::new(product_id, chunk as u32));
        total -= chunk;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_merges_same_product() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = coalesce_restocks(&[
            Restock::new(a, 2),
            Restock::new(b, 1),
            Restock::new(a, 3),
        ]);

        assert_eq!(merged.len(), 2);
        let a_total: u32 = merged
            .iter()
            .filter(|r| r.product_id == a)
            .map(|r| r.quantity)
            .sum();
        assert_eq!(a_total, 5);
    }

    #[test]
    fn coalesce_drops_zero_quantities() {
        let merged = coalesce_restocks(&[Restock::new(ProductId::new(), 0)]);
        assert!(merged.is_empty());
    }

    #[test]
    fn coalesce_is_sorted_by_product() {
        let ids: Vec<ProductId> = (0..5).map(|_| ProductId::new()).collect();
        let restocks: Vec<Restock> = ids.iter().map(|id| Restock::new(*id, 1)).collect();
        let merged = coalesce_restocks(&restocks);

        let mut sorted = ids.clone();
        sorted.sort();
        let merged_ids: Vec<ProductId> = merged.iter().map(|r| r.product_id).collect();
        assert_eq!(merged_ids, sorted);
    }
}
