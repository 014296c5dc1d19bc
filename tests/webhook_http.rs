// tests/webhook_http.rs
//
// HTTP-level tests for the router without opening sockets, via
// tower::ServiceExt::oneshot: webhook acknowledgement/no-op paths and the
// admin job endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http::{Request, StatusCode};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use cms_index_sync::api::{self, AppState, CONTENT_TYPE_HEADER, ENTITY_ID_HEADER, TOPIC_HEADER};
use cms_index_sync::content::{Content, ContentRecord, RelationWriter};
use cms_index_sync::events::{EventHandler, EventHub, EventPattern, EventType, Resource};
use cms_index_sync::index::{IndexClient, RelatedHit};
use cms_index_sync::sync::forward::ForwardSync;
use cms_index_sync::sync::reconcile::Reconciler;
use cms_index_sync::sync::reverse::{Pacer, ReverseSync};
use cms_index_sync::sync::SyncTarget;
use cms_index_sync::webhook::WebhookIngestor;

const BODY_LIMIT: usize = 1024 * 1024;

/// Counts every event the hub delivers.
#[derive(Default)]
struct CountingHandler {
    seen: Mutex<Vec<(EventType, String)>>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, event: EventType, entity_id: &str) -> Result<()> {
        self.seen.lock().unwrap().push((event, entity_id.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

struct EmptyContent;

#[async_trait]
impl Content for EmptyContent {
    async fn fetch(&self, _entity_id: &str) -> Result<Option<ContentRecord>> {
        Ok(None)
    }

    async fn fetch_all(&self) -> Result<Vec<ContentRecord>> {
        Ok(Vec::new())
    }

    async fn fetch_ids(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(HashMap::from([(
            "a1".to_string(),
            Utc.timestamp_opt(10, 0).unwrap(),
        )]))
    }
}

struct EmptyIndex;

#[async_trait]
impl IndexClient for EmptyIndex {
    async fn upsert(&self, _object_id: &str, _record: &ContentRecord) -> Result<()> {
        Ok(())
    }

    async fn batch_replace_all(&self, _records: &[ContentRecord]) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _object_id: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(HashMap::new())
    }

    async fn fetch_related(&self, _object_id: &str) -> Result<Vec<RelatedHit>> {
        Ok(Vec::new())
    }
}

/// Content source whose bulk read is down, for the job-failure path.
struct BrokenContent;

#[async_trait]
impl Content for BrokenContent {
    async fn fetch(&self, _entity_id: &str) -> Result<Option<ContentRecord>> {
        Ok(None)
    }

    async fn fetch_all(&self) -> Result<Vec<ContentRecord>> {
        Err(anyhow::anyhow!("content source unavailable"))
    }

    async fn fetch_ids(&self) -> Result<Vec<String>> {
        Err(anyhow::anyhow!("content source unavailable"))
    }

    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        Err(anyhow::anyhow!("content source unavailable"))
    }
}

struct NoopWriter;

#[async_trait]
impl RelationWriter for NoopWriter {
    async fn set_related(&self, _entity_id: &str, _related_ids: &[String]) -> Result<()> {
        Ok(())
    }
}

struct NoopPacer;

#[async_trait]
impl Pacer for NoopPacer {
    async fn pace(&self) {}
}

fn article_target() -> Arc<SyncTarget> {
    let content: Arc<dyn Content> = Arc::new(EmptyContent);
    let index: Arc<dyn IndexClient> = Arc::new(EmptyIndex);
    Arc::new(SyncTarget::new(
        Resource::Article,
        Arc::new(ForwardSync::new(Resource::Article, content.clone(), index.clone())),
        Arc::new(ReverseSync::new(
            Resource::Article,
            content.clone(),
            index.clone(),
            Arc::new(NoopWriter),
            Arc::new(NoopPacer),
        )),
        Arc::new(Reconciler::new(Resource::Article, content, index)),
    ))
}

/// Page target wired over a broken content source: every job fails.
fn broken_page_target() -> Arc<SyncTarget> {
    let content: Arc<dyn Content> = Arc::new(BrokenContent);
    let index: Arc<dyn IndexClient> = Arc::new(EmptyIndex);
    Arc::new(SyncTarget::new(
        Resource::Page,
        Arc::new(ForwardSync::new(Resource::Page, content.clone(), index.clone())),
        Arc::new(ReverseSync::new(
            Resource::Page,
            content.clone(),
            index.clone(),
            Arc::new(NoopWriter),
            Arc::new(NoopPacer),
        )),
        Arc::new(Reconciler::new(Resource::Page, content, index)),
    ))
}

/// Router plus the counting handler subscribed to everything.
fn test_router() -> (Router, Arc<CountingHandler>) {
    let counter = Arc::new(CountingHandler::default());
    let mut hub = EventHub::new();
    hub.subscribe(EventPattern::any(), counter.clone());

    let state = AppState {
        ingestor: Arc::new(WebhookIngestor::new(Arc::new(hub))),
        targets: Arc::new(HashMap::from([
            (Resource::Article, article_target()),
            (Resource::Page, broken_page_target()),
        ])),
    };
    (api::router(state), counter)
}

fn webhook_request(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/webhooks/cms");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Body::empty()).expect("build webhook request")
}

#[tokio::test]
async fn health_returns_200() {
    let (app, _) = test_router();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn entry_publish_webhook_notifies_and_acks() {
    let (app, counter) = test_router();
    let resp = app
        .oneshot(webhook_request(&[
            (TOPIC_HEADER, "ContentManagement.Entry.publish"),
            (CONTENT_TYPE_HEADER, "article"),
            (ENTITY_ID_HEADER, "a1"),
        ]))
        .await
        .expect("oneshot webhook");

    assert_eq!(resp.status(), StatusCode::OK);
    let seen = counter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "a1");
}

#[tokio::test]
async fn content_type_webhook_produces_zero_notifications() {
    let (app, counter) = test_router();
    let resp = app
        .oneshot(webhook_request(&[(
            TOPIC_HEADER,
            "ContentManagement.ContentType.create",
        )]))
        .await
        .expect("oneshot webhook");

    assert_eq!(resp.status(), StatusCode::OK, "schema changes still ack");
    assert!(counter.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_entity_id_is_acked_without_notification() {
    let (app, counter) = test_router();
    let resp = app
        .oneshot(webhook_request(&[
            (TOPIC_HEADER, "ContentManagement.Entry.publish"),
            (CONTENT_TYPE_HEADER, "article"),
        ]))
        .await
        .expect("oneshot webhook");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(counter.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_topic_header_is_acked() {
    let (app, counter) = test_router();
    let resp = app.oneshot(webhook_request(&[])).await.expect("oneshot webhook");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(counter.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn admin_diff_reports_drift_as_json() {
    let (app, _) = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/diff/article")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("oneshot diff");

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("parse diff json");
    assert_eq!(v["kind"], "article");
    assert_eq!(
        v["diff"]["new_in_source"],
        serde_json::json!(["a1"]),
        "source-only id must be reported"
    );
}

#[tokio::test]
async fn admin_jobs_reject_unknown_kind() {
    let (app, _) = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/reindex/asset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("oneshot reindex");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_reindex_failure_returns_500_with_error_body() {
    let (app, _) = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/reindex/page")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("oneshot reindex");

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("parse error json");
    assert!(
        v["error"].as_str().unwrap_or_default().contains("fetching all"),
        "error body must carry the job failure, got {v}"
    );
}

#[tokio::test]
async fn admin_relink_reports_counts() {
    let (app, _) = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/relink/article")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("oneshot relink");

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("parse relink json");
    assert_eq!(v["succeeded"], 0);
    assert_eq!(v["total"], 0);
}
