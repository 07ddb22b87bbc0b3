//! HTTP metrics and the Prometheus exporter.
//!
//! The exporter also carries the catalog, cache and resolution metrics
//! recorded by the library crates.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ============================================================================
// Metric Names
// ============================================================================

/// HTTP request duration histogram.
pub const API_REQUEST_DURATION: &str = "moniker_api_request_duration_seconds";

/// HTTP request counter.
pub const API_REQUEST_TOTAL: &str = "moniker_api_request_total";

const UNMATCHED_ENDPOINT: &str = "unmatched";
const SLOW_REQUEST_SECS: f64 = 1.0;

// ============================================================================
// Prometheus Recorder
// ============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global Prometheus recorder and describes every metric.
///
/// Safe to call multiple times; subsequent calls return the same handle. If
/// another recorder is already installed, a detached handle is returned and
/// a warning is logged.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "prometheus recorder not installed");
                    PrometheusBuilder::new().build_recorder().handle()
                });

            describe_histogram!(API_REQUEST_DURATION, "Duration of HTTP requests in seconds");
            describe_counter!(API_REQUEST_TOTAL, "Total number of HTTP requests");
            moniker_catalog::metrics::register_metrics();
            moniker_cache::metrics::register_metrics();
            moniker_service::metrics::register_metrics();

            tracing::info!("Prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// ============================================================================
// Metrics Middleware
// ============================================================================

fn endpoint_label<B>(request: &axum::http::Request<B>) -> String {
    request.extensions().get::<MatchedPath>().map_or_else(
        || UNMATCHED_ENDPOINT.to_string(),
        |path| path.as_str().to_string(),
    )
}

/// Middleware that records request metrics.
///
/// Labels are the matched route template, never the raw URI, so monikers do
/// not explode label cardinality.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let endpoint = endpoint_label(&request);
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status_class = status_class(response.status());
    let labels = [
        ("endpoint", endpoint.clone()),
        ("method", method.clone()),
        ("status_class", status_class.to_string()),
    ];
    histogram!(API_REQUEST_DURATION, &labels).record(duration);
    counter!(API_REQUEST_TOTAL, &labels).increment(1);

    if duration > SLOW_REQUEST_SECS {
        tracing::warn!(
            endpoint = %endpoint,
            method = %method,
            status = response.status().as_u16(),
            duration_secs = duration,
            "Slow request detected"
        );
    }

    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

// ============================================================================
// Metrics Endpoint
// ============================================================================

/// Handler for `GET /metrics`.
pub async fn serve_metrics() -> impl IntoResponse {
    prometheus_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain; charset=utf-8")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn status_classes() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::CREATED), "2xx");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::SERVICE_UNAVAILABLE), "5xx");
    }

    #[test]
    fn unmatched_endpoint_label() {
        let request = axum::http::Request::builder()
            .uri("/missing")
            .body(Body::empty())
            .unwrap();
        assert_eq!(endpoint_label(&request), UNMATCHED_ENDPOINT);
    }

    #[tokio::test]
    async fn requests_are_labelled_by_route_template() {
        let handle = init_metrics();
        let app = Router::new()
            .route("/resolve/{*moniker}", get(|| async { StatusCode::OK }))
            .route_layer(axum::middleware::from_fn(metrics_middleware));
        let request = axum::http::Request::builder()
            .uri("/resolve/risk.cvar/DESK_A")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rendered = handle.render();
        let lines: Vec<_> = rendered
            .lines()
            .filter(|line| line.starts_with(API_REQUEST_TOTAL))
            .collect();
        assert!(
            lines
                .iter()
                .any(|line| line.contains("endpoint=\"/resolve/{*moniker}\""))
        );
        assert!(!rendered.contains("DESK_A"));
    }
}
