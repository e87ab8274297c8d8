use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    CancelledLine, Cart, CartId, LineCancellation, LineItem, LineItemId, LineStatus, Order,
    OrderId, OrderPage, OrderQuery, Product, ProductId, Restock, Result, StoreError,
    store::{Store, coalesce_restocks, validate_cart_lines},
};

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    lines: HashMap<LineItemId, LineItem>,
    orders: HashMap<OrderId, Order>,
    fail_on_stock_credit: bool,
}

impl MemoryState {
    fn check_stock_credit(&self) -> Result<()> {
        if self.fail_on_stock_credit {
            return Err(StoreError::Unavailable(
                "stock credit rejected".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_restocks(&mut self, restocks: &[Restock]) -> Result<()> {
        let merged = coalesce_restocks(restocks);

        if let Some(missing) = merged
            .iter()
            .find(|r| !self.products.contains_key(&r.product_id))
        {
            return Err(StoreError::ProductNotFound(missing.product_id));
        }

        for restock in merged {
            if let Some(product) = self.products.get_mut(&restock.product_id) {
                product.quantity += i64::from(restock.quantity);
            }
        }
        Ok(())
    }

    fn lines_of(&self, cart_id: CartId) -> Vec<LineItem> {
        let mut lines: Vec<_> = self
            .lines
            .values()
            .filter(|l| l.cart_id == cart_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.position);
        lines
    }
}

/// In-memory store implementation for testing and single-process use.
///
/// Every operation runs under one lock, so each trait method is atomic with
/// respect to every other.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every stock-crediting write fail until reset.
    pub async fn set_fail_on_stock_credit(&self, fail: bool) {
        self.state.write().await.fail_on_stock_credit = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        *self.state.write().await = MemoryState::default();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        if product.quantity < 0 {
            return Err(StoreError::InvalidRecord(format!(
                "product {} has negative quantity",
                product.id
            )));
        }

        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(StoreError::Duplicate(format!("product {}", product.id)));
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_stock_credit()?;
        state.apply_restocks(&[Restock::new(id, quantity)])
    }

    async fn increment_stock_many(&self, restocks: &[Restock]) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_stock_credit()?;
        state.apply_restocks(restocks)
    }

    async fn insert_cart(&self, cart: Cart, lines: Vec<LineItem>) -> Result<()> {
        validate_cart_lines(&cart, &lines)?;

        let mut state = self.state.write().await;
        if state.carts.contains_key(&cart.id) {
            return Err(StoreError::Duplicate(format!("cart {}", cart.id)));
        }
        if let Some(dup) = lines.iter().find(|l| state.lines.contains_key(&l.id)) {
            return Err(StoreError::Duplicate(format!("line item {}", dup.id)));
        }

        for line in lines {
            state.lines.insert(line.id, line);
        }
        state.carts.insert(cart.id, cart);
        Ok(())
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        Ok(self.state.read().await.lines.get(&id).cloned())
    }

    async fn get_line_items(&self, cart_id: CartId) -> Result<Vec<LineItem>> {
        Ok(self.state.read().await.lines_of(cart_id))
    }

    async fn get_line_items_by_status(
        &self,
        cart_id: CartId,
        status: LineStatus,
    ) -> Result<Vec<LineItem>> {
        let state = self.state.read().await;
        Ok(state
            .lines_of(cart_id)
            .into_iter()
            .filter(|l| l.status == status)
            .collect())
    }

    async fn set_line_status(
        &self,
        id: LineItemId,
        expected: LineStatus,
        new: LineStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let line = state
            .lines
            .get_mut(&id)
            .ok_or(StoreError::LineItemNotFound(id))?;

        if line.status != expected {
            return Ok(false);
        }
        line.status = new;
        Ok(true)
    }

    async fn cancel_lines(
        &self,
        cancellations: &[LineCancellation],
    ) -> Result<Vec<CancelledLine>> {
        let mut state = self.state.write().await;
        state.check_stock_credit()?;

        let mut cancelled = Vec::new();
        for c in cancellations {
            let Some(line) = state.lines.get(&c.line_item_id) else {
                continue;
            };
            if line.status != c.expected || !c.expected.can_cancel() {
                continue;
            }
            if cancelled
                .iter()
                .any(|done: &CancelledLine| done.line_item_id == line.id)
            {
                continue;
            }
            cancelled.push(CancelledLine {
                line_item_id: line.id,
                restock: Restock::new(line.product_id, line.quantity),
            });
        }

        let restocks: Vec<Restock> = cancelled.iter().map(|c| c.restock).collect();
        // Validates every product before any line is touched.
        state.apply_restocks(&restocks)?;

        for c in &cancelled {
            if let Some(line) = state.lines.get_mut(&c.line_item_id) {
                line.status = LineStatus::Cancelled;
            }
        }
        tracing::debug!(
            requested = cancellations.len(),
            cancelled = cancelled.len(),
            "lines cancelled and restocked"
        );
        Ok(cancelled)
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&order.cart_id) {
            return Err(StoreError::CartNotFound(order.cart_id));
        }
        if let Some(existing) = state.orders.values().find(|o| o.cart_id == order.cart_id) {
            return Err(StoreError::CartAlreadyBound {
                cart_id: order.cart_id,
                order_id: existing.id,
            });
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(format!("order {}", order.id)));
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_cart(&self, cart_id: CartId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.cart_id == cart_id)
            .cloned())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.owner.is_none_or(|owner| o.owner == owner))
            .cloned()
            .collect();

        // Newest first, ID as a stable tie-breaker
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total_count = orders.len() as u64;
        let offset = query.offset.unwrap_or(0);
        let orders: Vec<_> = orders.into_iter().skip(offset).collect();
        let orders = if let Some(limit) = query.limit {
            orders.into_iter().take(limit).collect()
        } else {
            orders
        };

        Ok(OrderPage {
            orders,
            total_count,
        })
    }

    async fn delete_order_and_cart(&self, id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.remove(&id) else {
            return Ok(false);
        };
        state.carts.remove(&order.cart_id);
        state.lines.retain(|_, l| l.cart_id != order.cart_id);
        tracing::debug!(order_id = %id, cart_id = %order.cart_id, "order and cart deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Money, UserId};

    async fn seed_cart(store: &InMemoryStore, quantities: &[u32]) -> (Cart, Vec<LineItem>) {
        let cart = Cart::new();
        let mut lines = Vec::new();
        for (position, qty) in quantities.iter().enumerate() {
            let product = Product::new(
                format!("Product {position}"),
                Money::from_cents(1000),
                true,
                5,
            );
            store.insert_product(product.clone()).await.unwrap();
            lines.push(LineItem::for_product(
                cart.id,
                &product,
                position as u32,
                *qty,
            ));
        }
        store.insert_cart(cart.clone(), lines.clone()).await.unwrap();
        (cart, lines)
    }

    #[tokio::test]
    async fn increment_stock_adds_quantity() {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(500), true, 3);
        store.insert_product(product.clone()).await.unwrap();

        store.increment_stock(product.id, 4).await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 7);
    }

    #[tokio::test]
    async fn increment_stock_unknown_product_fails() {
        let store = InMemoryStore::new();
        let result = store.increment_stock(ProductId::new(), 1).await;
        assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn increment_stock_many_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(500), true, 3);
        store.insert_product(product.clone()).await.unwrap();

        let result = store
            .increment_stock_many(&[
                Restock::new(product.id, 2),
                Restock::new(ProductId::new(), 1),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 3);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(500), true, 0);
        store.insert_product(product.clone()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let id = product.id;
            handles.push(tokio::spawn(
                async move { store.increment_stock(id, 2).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 100);
    }

    #[tokio::test]
    async fn line_items_are_returned_in_position_order() {
        let store = InMemoryStore::new();
        let (cart, lines) = seed_cart(&store, &[1, 2, 3]).await;

        let stored = store.get_line_items(cart.id).await.unwrap();
        let ids: Vec<_> = stored.iter().map(|l| l.id).collect();
        let expected: Vec<_> = lines.iter().map(|l| l.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn set_line_status_is_compare_and_set() {
        let store = InMemoryStore::new();
        let (_, lines) = seed_cart(&store, &[1]).await;
        let id = lines[0].id;

        assert!(
            store
                .set_line_status(id, LineStatus::Active, LineStatus::Processing)
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_line_status(id, LineStatus::Active, LineStatus::Shipped)
                .await
                .unwrap()
        );

        let line = store.get_line_item(id).await.unwrap().unwrap();
        assert_eq!(line.status, LineStatus::Processing);
    }

    #[tokio::test]
    async fn insert_cart_rejects_zero_quantity_lines() {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(500), true, 3);
        store.insert_product(product.clone()).await.unwrap();
        let cart = Cart::new();
        let line = LineItem::for_product(cart.id, &product, 0, 0);

        let result = store.insert_cart(cart.clone(), vec![line]).await;

        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert!(store.get_cart(cart.id).await.unwrap().is_none());
        assert_eq!(store.cart_count().await, 0);
    }

    #[tokio::test]
    async fn set_line_status_unknown_line_fails() {
        let store = InMemoryStore::new();
        let result = store
            .set_line_status(LineItemId::new(), LineStatus::Active, LineStatus::Shipped)
            .await;
        assert!(matches!(result, Err(StoreError::LineItemNotFound(_))));
    }

    #[tokio::test]
    async fn cancel_lines_credits_each_line_once() {
        let store = InMemoryStore::new();
        let (cart, lines) = seed_cart(&store, &[2, 3]).await;
        let request: Vec<_> = lines
            .iter()
            .map(|l| LineCancellation::new(l.id, LineStatus::Active))
            .collect();

        let first = store.cancel_lines(&request).await.unwrap();
        let second = store.cancel_lines(&request).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());

        for line in &lines {
            let product = store.get_product(line.product_id).await.unwrap().unwrap();
            assert_eq!(product.quantity, 5 + i64::from(line.quantity));
        }
        let cancelled = store
            .get_line_items_by_status(cart.id, LineStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 2);
    }

    #[tokio::test]
    async fn cancel_lines_skips_stale_expectations() {
        let store = InMemoryStore::new();
        let (_, lines) = seed_cart(&store, &[2]).await;
        store
            .set_line_status(lines[0].id, LineStatus::Active, LineStatus::Processing)
            .await
            .unwrap();

        let applied = store
            .cancel_lines(&[LineCancellation::new(lines[0].id, LineStatus::Active)])
            .await
            .unwrap();

        assert!(applied.is_empty());
        let product = store.get_product(lines[0].product_id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[tokio::test]
    async fn cancel_lines_failure_leaves_lines_untouched() {
        let store = InMemoryStore::new();
        let (_, lines) = seed_cart(&store, &[2]).await;
        store.set_fail_on_stock_credit(true).await;

        let result = store
            .cancel_lines(&[LineCancellation::new(lines[0].id, LineStatus::Active)])
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        let line = store.get_line_item(lines[0].id).await.unwrap().unwrap();
        assert_eq!(line.status, LineStatus::Active);
    }

    #[tokio::test]
    async fn cart_can_back_only_one_order() {
        let store = InMemoryStore::new();
        let (cart, _) = seed_cart(&store, &[1]).await;

        let first = Order::new(UserId::new(), cart.id, Money::from_cents(1000));
        store.insert_order(first.clone()).await.unwrap();

        let second = Order::new(UserId::new(), cart.id, Money::from_cents(1000));
        let result = store.insert_order(second).await;
        assert!(matches!(
            result,
            Err(StoreError::CartAlreadyBound { order_id, .. }) if order_id == first.id
        ));
    }

    #[tokio::test]
    async fn insert_order_requires_cart() {
        let store = InMemoryStore::new();
        let order = Order::new(UserId::new(), CartId::new(), Money::zero());
        let result = store.insert_order(order).await;
        assert!(matches!(result, Err(StoreError::CartNotFound(_))));
    }

    #[tokio::test]
    async fn query_orders_filters_sorts_and_pages() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let other = UserId::new();

        let mut created = Vec::new();
        for i in 0..5 {
            let (cart, _) = seed_cart(&store, &[1]).await;
            let user = if i % 2 == 0 { owner } else { other };
            let mut order = Order::new(user, cart.id, Money::from_cents(100));
            order.created_at += chrono::Duration::seconds(i);
            store.insert_order(order.clone()).await.unwrap();
            created.push(order);
        }

        let page = store
            .query_orders(OrderQuery::for_owner(owner).limit(2))
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[0].id, created[4].id);
        assert_eq!(page.orders[1].id, created[2].id);

        let rest = store
            .query_orders(OrderQuery::for_owner(owner).limit(2).offset(2))
            .await
            .unwrap();
        assert_eq!(rest.orders.len(), 1);
        assert_eq!(rest.orders[0].id, created[0].id);
    }

    #[tokio::test]
    async fn delete_order_removes_cart_and_lines() {
        let store = InMemoryStore::new();
        let (cart, lines) = seed_cart(&store, &[1, 1]).await;
        let order = Order::new(UserId::new(), cart.id, Money::zero());
        store.insert_order(order.clone()).await.unwrap();

        assert!(store.delete_order_and_cart(order.id).await.unwrap());
        assert!(!store.delete_order_and_cart(order.id).await.unwrap());

        assert!(store.get_cart(cart.id).await.unwrap().is_none());
        assert!(store.get_line_item(lines[0].id).await.unwrap().is_none());
        assert_eq!(store.order_count().await, 0);
    }
}
