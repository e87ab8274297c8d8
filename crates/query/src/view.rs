//! Rendered order views.

use chrono::{DateTime, Utc};
use domain::{OrderStatus, TaxCalculator, TaxSummary};
use serde::Serialize;
use store::{
    CartId, LineItem, LineItemId, LineStatus, Money, Order, OrderId, Product, ProductId, UserId,
};

/// One line of an order as rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub taxable: bool,
    pub status: LineStatus,
}

/// An order with its lines, derived status and tax figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub owner: UserId,
    pub cart_id: CartId,
    /// Total supplied at placement.
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub lines: Vec<OrderLineView>,
    /// Computed over lines that are not cancelled.
    pub tax: TaxSummary,
}

impl OrderView {
    /// Renders an order from its lines and the products they reference.
    ///
    /// A line whose product is gone is shown as non-taxable.
    pub fn build(
        order: &Order,
        lines: &[LineItem],
        products: &[Product],
        calculator: &TaxCalculator,
    ) -> Self {
        let product = |id: ProductId| products.iter().find(|p| p.id == id);

        let line_views = lines
            .iter()
            .map(|line| {
                let p = product(line.product_id);
                OrderLineView {
                    id: line.id,
                    product_id: line.product_id,
                    product_name: p.map(|p| p.name.clone()).unwrap_or_default(),
                    brand: p.and_then(|p| p.brand.clone()),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total: line.line_total(),
                    taxable: p.is_some_and(|p| p.taxable),
                    status: line.status,
                }
            })
            .collect();

        let tax = calculator.calculate_for_lines(lines, |line| {
            product(line.product_id).is_some_and(|p| p.taxable)
        });

        Self {
            id: order.id,
            owner: order.owner,
            cart_id: order.cart_id,
            total: order.total,
            created_at: order.created_at,
            status: OrderStatus::from_lines(lines),
            lines: line_views,
            tax,
        }
    }
}

/// One page of rendered orders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListPage {
    pub orders: Vec<OrderView>,
    /// Number of orders matching the filter, across all pages.
    pub total_count: u64,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
}

impl OrderListPage {
    pub fn page_count(total_count: u64, page_size: u32) -> u32 {
        if page_size == 0 {
            return 0;
        }
        let pages = total_count.div_ceil(u64::from(page_size));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::TaxRate;

    #[test]
    fn build_annotates_tax_and_names() {
        let cart = CartId::new();
        let taxable = Product::new("Chair", Money::from_cents(1000), true, 1).with_brand("Oak");
        let exempt = Product::new("Bread", Money::from_cents(500), false, 1);
        let lines = vec![
            LineItem::for_product(cart, &taxable, 0, 2),
            LineItem::for_product(cart, &exempt, 1, 1),
        ];
        let order = Order::new(UserId::new(), cart, Money::from_cents(2700));

        let view = OrderView::build(
            &order,
            &lines,
            &[taxable, exempt],
            &TaxCalculator::new(TaxRate::from_percent(10)),
        );

        assert_eq!(view.status, OrderStatus::Open);
        assert_eq!(view.lines[0].product_name, "Chair");
        assert!(view.lines[0].taxable);
        assert!(!view.lines[1].taxable);
        assert_eq!(view.tax.tax_base, Money::from_cents(2000));
        assert_eq!(view.tax.tax_amount, Money::from_cents(200));
        assert_eq!(view.tax.grand_total, Money::from_cents(2700));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["tax"]["grandTotal"], 2700);
        assert_eq!(json["lines"][0]["productName"], "Chair");
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(OrderListPage::page_count(0, 10), 0);
        assert_eq!(OrderListPage::page_count(10, 10), 1);
        assert_eq!(OrderListPage::page_count(11, 10), 2);
    }
}
