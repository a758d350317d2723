use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "image_enhancement_status_total",
        "Enhancement status transitions, labelled by target status"
    );
    metrics::describe_histogram!(
        "image_enhancement_duration_seconds",
        "Remote processing time reported by enhancement callbacks"
    );
    metrics::describe_gauge!(
        "image_enhancement_queue_length",
        "Images currently awaiting an enhancement callback"
    );
    metrics::describe_gauge!(
        "image_enhancement_images",
        "Images per enhancement status"
    );
    metrics::describe_gauge!(
        "active_properties_total",
        "Active property listings per property type"
    );
    metrics::describe_counter!(
        "rate_limited_requests_total",
        "Requests rejected by the rate limiter"
    );
}
