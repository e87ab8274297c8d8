//! Order placement, lookup, listing and cancellation endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use domain::{
    CancelItemOutcome, CancelOrder, ItemStatusOutcome, OrderAggregate, PlaceOrder, SetItemStatus,
};
use query::{ListOrders, OrderListPage, OrderQueryService, OrderView};
use serde::{Deserialize, Serialize};
use store::{CartId, LineItemId, LineStatus, Money, OrderId, ProductId, Store, UserId};

use crate::error::ApiError;
use crate::routes::identity::Identity;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store + Clone> {
    pub orders: OrderAggregate<S>,
    pub queries: OrderQueryService<S>,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub cart_id: CartId,
    /// Agreed total, in cents.
    pub total: i64,
}

#[derive(Deserialize, Default)]
pub struct PageParams {
    pub page: Option<u32>,
    #[serde(alias = "pageSize")]
    pub page_size: Option<u32>,
    pub owner: Option<UserId>,
}

#[derive(Deserialize, Default)]
pub struct SearchParams {
    pub id: Option<String>,
}

#[derive(Deserialize)]
pub struct ItemStatusRequest {
    pub status: String,
}

// -- Response types --

/// Every successful body carries `success` and `message` next to its data.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.into(),
        data,
    })
}

#[derive(Serialize)]
pub struct OrderBody {
    pub order: OrderView,
}

#[derive(Serialize)]
pub struct OrdersBody {
    pub orders: Vec<OrderView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockBody {
    pub line_item_id: LineItemId,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderBody {
    pub order_id: OrderId,
    pub restocked: Vec<RestockBody>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatusBody {
    pub order_id: OrderId,
    pub item_id: LineItemId,
    pub status: LineStatus,
    pub restocked_quantity: Option<u32>,
    pub already_resolved: bool,
    pub order_cancelled: bool,
}

impl From<CancelItemOutcome> for ItemStatusBody {
    fn from(outcome: CancelItemOutcome) -> Self {
        Self {
            order_id: outcome.order_id,
            item_id: outcome.item_id,
            status: outcome.status,
            restocked_quantity: outcome.restocked.map(|r| r.quantity),
            already_resolved: outcome.already_resolved,
            order_cancelled: outcome.order_cancelled,
        }
    }
}

// -- Handlers --

/// POST /orders — place an order over an existing cart.
#[tracing::instrument(skip(state, requester, payload))]
pub async fn place<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<OrderBody>>), ApiError> {
    let Json(req) = payload?;

    let placed = state
        .orders
        .place(
            requester,
            PlaceOrder::new(req.cart_id, Money::from_cents(req.total)),
        )
        .await?;
    let view = state
        .queries
        .view_placed(&placed.order, &placed.lines)
        .await;

    Ok((
        StatusCode::CREATED,
        ok("Order placed", OrderBody { order: view }),
    ))
}

/// GET /orders/{id} — fetch one order with tax figures.
#[tracing::instrument(skip(state, requester))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<Envelope<OrderBody>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let view = state.queries.get(requester, order_id).await?;
    Ok(ok("Order found", OrderBody { order: view }))
}

/// GET /orders — list every order, newest first. Admin only.
#[tracing::instrument(skip(state, requester, params))]
pub async fn list_all<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Envelope<OrderListPage>>, ApiError> {
    let Query(params) = params?;
    if !requester.role.is_privileged() {
        return Err(ApiError::BadRequest(
            "Listing all orders requires the admin role".to_string(),
        ));
    }

    let request = ListOrders {
        owner: params.owner,
        page: params.page.unwrap_or(1),
        page_size: params.page_size,
    };
    let page = state.queries.list(requester, request).await?;
    Ok(ok(format!("{} orders", page.total_count), page))
}

/// GET /orders/mine — list the requester's own orders, newest first.
#[tracing::instrument(skip(state, requester, params))]
pub async fn list_mine<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Envelope<OrderListPage>>, ApiError> {
    let Query(params) = params?;
    let request = ListOrders {
        owner: Some(requester.user_id),
        page: params.page.unwrap_or(1),
        page_size: params.page_size,
    };
    let page = state.queries.list(requester, request).await?;
    Ok(ok(format!("{} orders", page.total_count), page))
}

/// GET /orders/search?id= — look an order up by order or cart ID.
#[tracing::instrument(skip(state, requester, params))]
pub async fn search<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Envelope<OrdersBody>>, ApiError> {
    let Query(params) = params?;
    let orders = state
        .queries
        .search(requester, params.id.as_deref().unwrap_or_default())
        .await?;
    Ok(ok(format!("{} orders", orders.len()), OrdersBody { orders }))
}

/// DELETE /orders/{id} — cancel a whole order, restoring stock.
#[tracing::instrument(skip(state, requester))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CancelOrderBody>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let outcome = state
        .orders
        .cancel_order(requester, CancelOrder::new(order_id))
        .await?;

    let restocked = outcome
        .restocked
        .iter()
        .map(|c| RestockBody {
            line_item_id: c.line_item_id,
            product_id: c.restock.product_id,
            quantity: c.restock.quantity,
        })
        .collect();

    Ok(ok(
        "Order cancelled",
        CancelOrderBody {
            order_id: outcome.order_id,
            restocked,
        },
    ))
}

/// PUT /orders/{id}/items/{item_id}/status — cancel a line or advance it.
#[tracing::instrument(skip(state, requester, payload))]
pub async fn set_item_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path((id, item_id)): Path<(String, String)>,
    payload: Result<Json<ItemStatusRequest>, JsonRejection>,
) -> Result<Json<Envelope<ItemStatusBody>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let item_id: LineItemId = parse_id(&item_id, "item")?;
    let Json(req) = payload?;
    let status: LineStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let outcome = state
        .orders
        .set_item_status(requester, SetItemStatus::new(order_id, item_id, status))
        .await?;

    let (message, body) = match outcome {
        ItemStatusOutcome::Updated { line } => (
            "Item status updated",
            ItemStatusBody {
                order_id,
                item_id: line.id,
                status: line.status,
                restocked_quantity: None,
                already_resolved: false,
                order_cancelled: false,
            },
        ),
        ItemStatusOutcome::Cancelled(outcome) => {
            let message = if outcome.order_cancelled {
                "Item cancelled; every item is cancelled so the order was cancelled"
            } else if outcome.already_resolved {
                "Item was already cancelled"
            } else {
                "Item cancelled"
            };
            (message, ItemStatusBody::from(outcome))
        }
    };
    Ok(ok(message, body))
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what} ID format: {raw}")))
}
