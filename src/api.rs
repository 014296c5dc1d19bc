// src/api.rs
//! HTTP surface: the CMS webhook endpoint, health, and the operator job
//! triggers. Routes stay thin — everything of substance lives in the sync
//! and webhook modules.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::events::Resource;
use crate::sync::SyncTarget;
use crate::webhook::WebhookIngestor;

pub const TOPIC_HEADER: &str = "X-Contentful-Topic";
pub const CONTENT_TYPE_HEADER: &str = "X-CTFL-Content-Type";
pub const ENTITY_ID_HEADER: &str = "X-CTFL-Entity-ID";

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<WebhookIngestor>,
    pub targets: Arc<HashMap<Resource, Arc<SyncTarget>>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/webhooks/cms", post(cms_webhook))
        .route("/admin/reindex/{kind}", post(admin_reindex))
        .route("/admin/relink/{kind}", post(admin_relink))
        .route("/admin/diff/{kind}", get(admin_diff))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Webhook deliveries always get a 200 once the headers are read: the sender
/// retries on non-2xx and we never want a retry storm over shapes we ignore.
/// Sync outcome is decoupled from the acknowledgement.
async fn cms_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    let Some(topic) = header(&headers, TOPIC_HEADER) else {
        return (StatusCode::OK, "ignored");
    };
    state
        .ingestor
        .ingest(
            topic,
            header(&headers, CONTENT_TYPE_HEADER),
            header(&headers, ENTITY_ID_HEADER),
        )
        .await;
    (StatusCode::OK, "ok")
}

fn lookup(state: &AppState, kind: &str) -> Option<Arc<SyncTarget>> {
    let resource = Resource::from_api_name(kind)?;
    state.targets.get(&resource).cloned()
}

async fn admin_reindex(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let Some(target) = lookup(&state, &kind) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown kind" })));
    };
    match target.run_reindex().await {
        Ok(records) => (StatusCode::OK, Json(json!({ "kind": kind, "records": records }))),
        Err(e) => {
            error!(kind, error = ?e, "re-index failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn admin_relink(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let Some(target) = lookup(&state, &kind) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown kind" })));
    };
    match target.run_relink().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "kind": kind,
                "succeeded": report.succeeded,
                "total": report.total,
            })),
        ),
        Err(e) => {
            error!(kind, error = ?e, "re-link failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn admin_diff(State(state): State<AppState>, Path(kind): Path<String>) -> impl IntoResponse {
    let Some(target) = lookup(&state, &kind) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown kind" })));
    };
    match target.run_diff().await {
        Ok(report) => (StatusCode::OK, Json(json!({ "kind": kind, "diff": report }))),
        Err(e) => {
            error!(kind, error = ?e, "diff failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
