use crate::collectors::Collector;
use crate::history::HistoryRecorder;
use crate::metrics::Metrics;
use crate::state::{MetricsData, Snapshot, SnapshotCache};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub cache: SnapshotCache,
    pub history: HistoryRecorder,
    pub collector: Arc<dyn Collector>,
    pub mode: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentResponse {
    pub timestamp: String,
    pub data: Option<MetricsData>,
    pub error: Option<String>,
}

impl From<Snapshot> for CurrentResponse {
    fn from(value: Snapshot) -> Self {
        Self {
            timestamp: value.timestamp.unwrap_or_default(),
            data: value.data,
            error: value.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub last_metrics_timestamp: Option<String>,
    pub has_data: bool,
    pub has_error: bool,
    pub collector: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub mode: &'static str,
}

pub fn build_router(
    metrics: Arc<Metrics>,
    cache: SnapshotCache,
    history: HistoryRecorder,
    collector: Arc<dyn Collector>,
    mode: &'static str,
) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/metrics/current", get(current_handler))
        .route("/api/metrics/history", get(history_handler))
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(HttpAppState {
            metrics,
            cache,
            history,
            collector,
            mode,
        })
}

async fn root(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(ServiceInfo {
        name: "hostmetricsd",
        version: env!("CARGO_PKG_VERSION"),
        description: "Serves cached host metrics produced by a trusted collector script",
        mode: state.mode,
    })
}

async fn current_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(CurrentResponse::from(state.cache.read().await))
}

async fn history_handler(State(state): State<HttpAppState>) -> Response {
    match state.history.load().await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read history: {err}"),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let snapshot = state.cache.read().await;
    let status = if state.collector.available() {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        has_data: snapshot.has_data(),
        has_error: snapshot.has_error(),
        last_metrics_timestamp: snapshot.timestamp,
        collector: state.collector.describe(),
    })
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}
