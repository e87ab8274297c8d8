//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers descriptions for the metrics the engine records.
pub fn describe() {
    describe_counter!("orders_placed_total", "Orders placed");
    describe_counter!(
        "orders_cancelled_total",
        "Orders removed together with their cart"
    );
    describe_counter!("line_items_cancelled_total", "Order lines cancelled");
    describe_counter!(
        "units_restocked_total",
        Unit::Count,
        "Units credited back to product stock"
    );
    describe_counter!(
        "notifications_sent_total",
        "Order confirmations delivered"
    );
    describe_counter!(
        "notifications_failed_total",
        "Order confirmations that could not be queued or delivered"
    );
    describe_histogram!(
        "order_operation_duration_seconds",
        Unit::Seconds,
        "Duration of order write operations"
    );
    describe_histogram!(
        "order_query_duration_seconds",
        Unit::Seconds,
        "Duration of order read operations"
    );
}

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
