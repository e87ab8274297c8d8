//! HTTP API server with observability for the order consistency engine.
//!
//! Provides REST endpoints for placing, reading and cancelling orders, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use domain::{NotificationQueue, Notifier, OrderAggregate, TaxCalculator};
use metrics_exporter_prometheus::PrometheusHandle;
use query::OrderQueryService;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list_all::<S>).post(routes::orders::place::<S>),
        )
        .route("/orders/mine", get(routes::orders::list_mine::<S>))
        .route("/orders/search", get(routes::orders::search::<S>))
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).delete(routes::orders::cancel::<S>),
        )
        .route(
            "/orders/{id}/items/{item_id}/status",
            put(routes::orders::set_item_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store`.
///
/// Starts the confirmation worker, so it must be called inside a Tokio runtime.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
    notifier: Arc<dyn Notifier>,
) -> Arc<AppState<S>> {
    let notifications = NotificationQueue::spawn(notifier, config.retry_policy());
    let orders = OrderAggregate::new(store.clone()).with_notifications(notifications);
    let queries = OrderQueryService::new(store, TaxCalculator::new(config.tax_rate()))
        .with_page_settings(config.page_settings());

    Arc::new(AppState { orders, queries })
}
