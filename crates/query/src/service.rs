//! Order query service.

use std::collections::HashSet;
use std::time::Instant;

use common::Requester;
use domain::{DomainError, TaxCalculator};
use store::{
    CartId, LineItem, Order, OrderId, OrderQuery, Product, ProductId, Store, StoreExt, UserId,
};

use crate::view::{OrderListPage, OrderView};

/// Page size limits for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl PageSettings {
    /// Resolves a requested page size to one within `[1, max_page_size]`.
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        let max = self.max_page_size.max(1);
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, max)
    }
}

/// Listing request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOrders {
    /// Restrict to one owner. Only honored for privileged requesters.
    pub owner: Option<UserId>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: Option<u32>,
}

impl ListOrders {
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Read-side service rendering orders with derived status and tax figures.
#[derive(Clone)]
pub struct OrderQueryService<S: Store> {
    store: S,
    calculator: TaxCalculator,
    pages: PageSettings,
}

impl<S: Store> OrderQueryService<S> {
    pub fn new(store: S, calculator: TaxCalculator) -> Self {
        Self {
            store,
            calculator,
            pages: PageSettings::default(),
        }
    }

    pub fn with_page_settings(mut self, pages: PageSettings) -> Self {
        self.pages = pages;
        self
    }

    pub fn calculator(&self) -> &TaxCalculator {
        &self.calculator
    }

    /// Fetches one order.
    ///
    /// Non-admin requesters only see orders they own; anything else is
    /// reported as not found, as is an order whose cart has gone missing.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn get(
        &self,
        requester: Requester,
        order_id: OrderId,
    ) -> Result<OrderView, DomainError> {
        let started = Instant::now();
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|order| requester.can_access(order.owner))
            .ok_or_else(|| DomainError::not_found("Order", order_id))?;

        let view = self
            .render(&order)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", order.cart_id))?;
        record_duration("get", started);
        Ok(view)
    }

    /// Lists orders newest first, one page at a time.
    ///
    /// Non-admin requesters are always scoped to their own orders. Orders
    /// whose cart has gone missing are left out of the page.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn list(
        &self,
        requester: Requester,
        request: ListOrders,
    ) -> Result<OrderListPage, DomainError> {
        if request.page == 0 {
            return Err(DomainError::invalid("page numbers start at 1"));
        }

        let started = Instant::now();
        let page_size = self.pages.resolve(request.page_size);
        let owner = if requester.role.is_privileged() {
            request.owner
        } else {
            Some(requester.user_id)
        };

        let offset = (request.page as usize - 1).saturating_mul(page_size as usize);
        let mut query = OrderQuery::new().limit(page_size as usize).offset(offset);
        if let Some(owner) = owner {
            query = query.owner(owner);
        }
        let page = self.store.query_orders(query).await?;

        let mut orders = Vec::with_capacity(page.orders.len());
        for order in &page.orders {
            match self.render(order).await? {
                Some(view) => orders.push(view),
                None => {
                    tracing::warn!(order_id = %order.id, cart_id = %order.cart_id, "order without cart skipped")
                }
            }
        }

        record_duration("list", started);
        Ok(OrderListPage {
            orders,
            total_count: page.total_count,
            page: request.page,
            page_size,
            page_count: OrderListPage::page_count(page.total_count, page_size),
        })
    }

    /// Looks an order up by a raw identifier, matching order or cart IDs.
    ///
    /// A malformed identifier, or one that resolves to nothing the requester
    /// may see, yields an empty list rather than an error.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn search(
        &self,
        requester: Requester,
        raw_id: &str,
    ) -> Result<Vec<OrderView>, DomainError> {
        let Ok(order_id) = raw_id.parse::<OrderId>() else {
            tracing::debug!(raw_id, "malformed search id");
            return Ok(Vec::new());
        };

        let order = match self.store.get_order(order_id).await? {
            Some(order) => Some(order),
            None => {
                self.store
                    .find_order_by_cart(CartId::from_uuid(order_id.as_uuid()))
                    .await?
            }
        };

        let Some(order) = order.filter(|o| requester.can_access(o.owner)) else {
            return Ok(Vec::new());
        };
        Ok(self.render(&order).await?.into_iter().collect())
    }

    /// Renders an order that was just placed from the lines it was placed over.
    ///
    /// The order is already committed, so a failed product lookup is logged
    /// and the lines are rendered without catalog details.
    pub async fn view_placed(&self, order: &Order, lines: &[LineItem]) -> OrderView {
        let products = match self.products_for(lines.iter().map(|l| l.product_id)).await {
            Ok(products) => products,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "products unavailable for placed order");
                Vec::new()
            }
        };
        OrderView::build(order, lines, &products, &self.calculator)
    }

    /// Renders an order, or None if its cart is gone.
    async fn render(&self, order: &Order) -> Result<Option<OrderView>, DomainError> {
        let Some(lines) = self.store.load_order_lines(order).await? else {
            return Ok(None);
        };
        let products = self.products_for(lines.iter().map(|l| l.product_id)).await?;
        Ok(Some(OrderView::build(
            order,
            &lines,
            &products,
            &self.calculator,
        )))
    }

    async fn products_for(
        &self,
        ids: impl Iterator<Item = ProductId>,
    ) -> Result<Vec<Product>, DomainError> {
        let unique: Vec<ProductId> = ids.collect::<HashSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.get_products(&unique).await?)
    }
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!("order_query_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let pages = PageSettings {
            default_page_size: 10,
            max_page_size: 50,
        };
        assert_eq!(pages.resolve(None), 10);
        assert_eq!(pages.resolve(Some(0)), 1);
        assert_eq!(pages.resolve(Some(25)), 25);
        assert_eq!(pages.resolve(Some(500)), 50);
    }
}
