//! Per-request Prometheus metrics

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use fareinn_common::metrics::RequestMetrics;

/// Count and time every request, labelled by its route template
pub async fn track_requests(request: Request, next: Next) -> Response {
    // Templates keep label cardinality bounded; unmatched paths share one label
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());
    response
}
