//! Liveness and readiness probes for the HTTP transport.

use crate::service::SparqlService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub endpoint: String,
    pub cache_entries: usize,
}

/// Liveness: the process is up and serving.
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "healthy"})))
}

/// Readiness: the query service is constructed and its endpoint URL is one
/// the HTTP client can actually talk to. Degrades to 503 otherwise.
pub async fn readiness_handler(State(service): State<Arc<SparqlService>>) -> impl IntoResponse {
    let config = service.config();
    let endpoint_ok = reqwest::Url::parse(&config.endpoint_url).is_ok();

    let (status, code) = if endpoint_ok {
        (HealthStatus::Healthy, StatusCode::OK)
    } else {
        (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status,
        endpoint: config.endpoint_url.clone(),
        cache_entries: service.cache_stats().current_size,
    };
    (code, Json(response))
}
