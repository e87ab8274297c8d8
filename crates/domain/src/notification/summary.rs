use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{LineItem, Money, Order, OrderId, Product, ProductId};

/// One line of an order confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

/// What the customer is told about a freshly placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub placed_at: DateTime<Utc>,
    pub total: Money,
    pub lines: Vec<SummaryLine>,
}

impl OrderSummary {
    /// Builds the summary from an order, its lines and their products.
    ///
    /// Lines whose product is missing keep a placeholder name.
    pub fn build(order: &Order, lines: &[LineItem], products: &[Product]) -> Self {
        let lines = lines
            .iter()
            .map(|line| {
                let product = products.iter().find(|p| p.id == line.product_id);
                SummaryLine {
                    product_id: line.product_id,
                    product_name: product
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "Unknown product".to_string()),
                    brand: product.and_then(|p| p.brand.clone()),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                }
            })
            .collect();

        Self {
            order_id: order.id,
            placed_at: order.created_at,
            total: order.total,
            lines,
        }
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
