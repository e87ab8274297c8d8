//! The order aggregate: placement, cancellation and line status changes.
//!
//! Every mutation that cancels lines credits stock in the same unit of work
//! as the status change, and deletion of an order and its cart only happens
//! after that unit has committed. A failed credit leaves the order, cart and
//! line statuses untouched, so the caller can retry.

use std::time::Instant;

use common::Requester;
use store::{
    CartId, LineCancellation, LineItem, LineItemId, LineStatus, Order, OrderId, Store,
};

use super::{
    CancelItem, CancelItemOutcome, CancelOrder, CancelOrderOutcome, ItemStatusOutcome,
    PlaceOrder, PlacedOrder, SetItemStatus,
};
use crate::cart::CartLineStore;
use crate::error::DomainError;
use crate::inventory::InventoryLedger;
use crate::notification::{NotificationQueue, OrderSummary};

/// Passes made over an order's lines before giving up on lines that keep
/// changing status under a cancellation.
const MAX_CANCEL_PASSES: usize = 3;

/// Coordinates orders, their cart lines and inventory.
#[derive(Clone)]
pub struct OrderAggregate<S: Store + Clone> {
    store: S,
    ledger: InventoryLedger<S>,
    lines: CartLineStore<S>,
    notifications: Option<NotificationQueue>,
}

impl<S: Store + Clone> OrderAggregate<S> {
    /// Creates an aggregate that sends no confirmations.
    pub fn new(store: S) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            lines: CartLineStore::new(store.clone()),
            store,
            notifications: None,
        }
    }

    /// Sends a confirmation through `queue` after every placement.
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &InventoryLedger<S> {
        &self.ledger
    }

    pub fn lines(&self) -> &CartLineStore<S> {
        &self.lines
    }

    /// Places an order over a cart for the requester.
    ///
    /// The confirmation is queued only after the order is stored; a failure
    /// to queue it is logged and does not fail the placement. The lines are
    /// returned as read before the order was written.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn place(
        &self,
        requester: Requester,
        cmd: PlaceOrder,
    ) -> Result<PlacedOrder, DomainError> {
        let started = Instant::now();

        if cmd.total.is_negative() {
            return Err(DomainError::invalid("order total cannot be negative"));
        }
        self.store
            .get_cart(cmd.cart_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", cmd.cart_id))?;

        let lines = self.lines.lines(cmd.cart_id).await?;
        if lines.is_empty() {
            return Err(DomainError::invalid("cart has no line items"));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(DomainError::invalid(format!(
                "line item {} has zero quantity",
                line.id
            )));
        }
        if let Some(line) = lines.iter().find(|l| l.status != LineStatus::Active) {
            return Err(DomainError::conflict(format!(
                "line item {} is already {}",
                line.id, line.status
            )));
        }

        let order = Order::new(requester.user_id, cmd.cart_id, cmd.total);
        self.store.insert_order(order.clone()).await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.id, cart_id = %order.cart_id, total = %order.total, "order placed");

        self.queue_confirmation(&order, &lines).await;
        record_duration("place", started);
        Ok(PlacedOrder { order, lines })
    }

    /// Cancels a whole order: restores stock for every line still in flight,
    /// then deletes the order and its cart.
    ///
    /// Shipped and completed lines are not restocked. If the stock credit
    /// fails nothing is deleted.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn cancel_order(
        &self,
        requester: Requester,
        cmd: CancelOrder,
    ) -> Result<CancelOrderOutcome, DomainError> {
        let started = Instant::now();
        let order = self.load_order_for(&requester, cmd.order_id).await?;

        let mut restocked = Vec::new();
        let mut passes = 0;
        loop {
            let pending = self.cancellable_lines(order.cart_id).await?;
            if pending.is_empty() {
                break;
            }
            if passes == MAX_CANCEL_PASSES {
                return Err(DomainError::conflict(format!(
                    "lines of order {} kept changing during cancellation",
                    order.id
                )));
            }
            passes += 1;

            let cancelled = self
                .ledger
                .restock_cancelled(&pending)
                .await
                .inspect_err(|e| {
                    tracing::error!(order_id = %order.id, error = %e, "restock failed, order kept");
                })?;
            restocked.extend(cancelled);
        }

        let deleted = self.store.delete_order_and_cart(order.id).await?;

        metrics::counter!("line_items_cancelled_total").increment(restocked.len() as u64);
        if deleted {
            metrics::counter!("orders_cancelled_total").increment(1);
        }
        tracing::info!(
            order_id = %order.id,
            lines = restocked.len(),
            deleted,
            "order cancelled"
        );
        record_duration("cancel_order", started);

        Ok(CancelOrderOutcome {
            order_id: order.id,
            restocked,
            deleted,
        })
    }

    /// Cancels one line and restores its stock.
    ///
    /// Once the line is cancelled the remaining lines are re-read; if every
    /// line is cancelled the order and its cart are deleted. Cancelling a line
    /// that is already cancelled credits nothing and still completes a
    /// deletion an earlier attempt did not reach.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn cancel_item(
        &self,
        requester: Requester,
        cmd: CancelItem,
    ) -> Result<CancelItemOutcome, DomainError> {
        let started = Instant::now();
        let order = self.load_order_for(&requester, cmd.order_id).await?;
        let mut line = self.line_of(&order, cmd.item_id).await?;

        let already_resolved = line.status == LineStatus::Cancelled;
        if !already_resolved && !line.status.can_cancel() {
            return Err(DomainError::conflict(format!(
                "line item {} is already {}",
                line.id, line.status
            )));
        }

        let mut restocked = None;
        let mut passes = 0;
        while line.status.can_cancel() {
            if passes == MAX_CANCEL_PASSES {
                return Err(DomainError::conflict(format!(
                    "line item {} kept changing during cancellation",
                    line.id
                )));
            }
            passes += 1;

            let cancelled = self
                .ledger
                .restock_cancelled(&[LineCancellation::new(line.id, line.status)])
                .await
                .inspect_err(|e| {
                    tracing::error!(line_item_id = %line.id, error = %e, "restock failed, line kept");
                })?;
            match cancelled.first() {
                Some(c) => {
                    restocked = Some(c.restock);
                    line.status = LineStatus::Cancelled;
                }
                None => line = self.lines.find_line_item(line.id).await?,
            }
        }

        if line.status != LineStatus::Cancelled {
            return Err(DomainError::conflict(format!(
                "line item {} moved to {} before it could be cancelled",
                line.id, line.status
            )));
        }
        if restocked.is_some() {
            metrics::counter!("line_items_cancelled_total").increment(1);
        }

        let order_cancelled = self.delete_if_fully_cancelled(&order).await?;

        tracing::info!(
            order_id = %order.id,
            line_item_id = %line.id,
            already_resolved,
            order_cancelled,
            "line item cancelled"
        );
        record_duration("cancel_item", started);

        Ok(CancelItemOutcome {
            order_id: order.id,
            item_id: line.id,
            status: line.status,
            restocked,
            already_resolved,
            order_cancelled,
        })
    }

    /// Moves one line to `status`.
    ///
    /// A request for `Cancelled` goes through [`Self::cancel_item`] so stock
    /// is restored. Any other status is a fulfillment step and needs a staff
    /// role. Requesting the status the line already has is a no-op.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn set_item_status(
        &self,
        requester: Requester,
        cmd: SetItemStatus,
    ) -> Result<ItemStatusOutcome, DomainError> {
        if cmd.status == LineStatus::Cancelled {
            let outcome = self
                .cancel_item(requester, CancelItem::new(cmd.order_id, cmd.item_id))
                .await?;
            return Ok(ItemStatusOutcome::Cancelled(outcome));
        }

        if !requester.role.is_staff() {
            return Err(DomainError::invalid(format!(
                "role {} may not change fulfillment status",
                requester.role
            )));
        }

        let started = Instant::now();
        let order = self
            .store
            .get_order(cmd.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", cmd.order_id))?;
        let line = self.line_of(&order, cmd.item_id).await?;
        if line.status == cmd.status {
            return Ok(ItemStatusOutcome::Updated { line });
        }

        let line = self.lines.set_status(line.id, cmd.status).await?;
        record_duration("set_item_status", started);
        Ok(ItemStatusOutcome::Updated { line })
    }

    /// Loads an order the requester may act on.
    ///
    /// An order owned by someone else is reported as missing.
    async fn load_order_for(
        &self,
        requester: &Requester,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        match self.store.get_order(order_id).await? {
            Some(order) if requester.can_access(order.owner) => Ok(order),
            _ => Err(DomainError::not_found("Order", order_id)),
        }
    }

    /// Loads a line and checks that it belongs to `order`.
    async fn line_of(&self, order: &Order, item_id: LineItemId) -> Result<LineItem, DomainError> {
        let line = self.lines.find_line_item(item_id).await?;
        if line.cart_id != order.cart_id {
            return Err(DomainError::not_found("Line item", item_id));
        }
        Ok(line)
    }

    async fn cancellable_lines(
        &self,
        cart_id: CartId,
    ) -> Result<Vec<LineCancellation>, DomainError> {
        Ok(self
            .lines
            .lines(cart_id)
            .await?
            .iter()
            .filter(|l| l.status.can_cancel())
            .map(|l| LineCancellation::new(l.id, l.status))
            .collect())
    }

    /// Deletes the order and its cart if every line is cancelled.
    ///
    /// Returns true if the order no longer exists afterwards.
    async fn delete_if_fully_cancelled(&self, order: &Order) -> Result<bool, DomainError> {
        let remaining = self.lines.lines(order.cart_id).await?;
        if remaining.is_empty() {
            // Lines only disappear together with their cart.
            return Ok(true);
        }
        // Cancelled is terminal, so this count can only have grown since the
        // read above.
        let cancelled = self
            .lines
            .list_by_status(order.cart_id, LineStatus::Cancelled)
            .await?;
        if cancelled.len() < remaining.len() {
            return Ok(false);
        }

        if self.store.delete_order_and_cart(order.id).await? {
            metrics::counter!("orders_cancelled_total").increment(1);
            tracing::info!(order_id = %order.id, "last line cancelled, order removed");
        }
        Ok(true)
    }

    async fn queue_confirmation(&self, order: &Order, lines: &[LineItem]) {
        let Some(queue) = &self.notifications else {
            return;
        };

        let product_ids: Vec<_> = lines.iter().map(|l| l.product_id).collect();
        let products = match self.store.get_products(&product_ids).await {
            Ok(products) => products,
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(order_id = %order.id, error = %e, "could not build order confirmation");
                return;
            }
        };

        let summary = OrderSummary::build(order, lines, &products);
        if let Err(e) = queue.enqueue(order.owner, summary) {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(order_id = %order.id, error = %e, "could not queue order confirmation");
        }
    }
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!("order_operation_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
