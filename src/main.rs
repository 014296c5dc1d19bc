//! CMS → Search-Index Sync Service — Binary Entrypoint
//! Loads configuration, wires the event hub and per-kind sync pipelines, and
//! boots the Axum HTTP server (webhook + operator endpoints).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cms_index_sync::api::{self, AppState};
use cms_index_sync::config::AppConfig;
use cms_index_sync::content::cms::{CmsClient, CmsContent, CmsRelationWriter};
use cms_index_sync::content::{Content, RelationWriter};
use cms_index_sync::events::EventHub;
use cms_index_sync::index::algolia::AlgoliaIndex;
use cms_index_sync::index::IndexClient;
use cms_index_sync::sync::forward::{self, ForwardSync};
use cms_index_sync::sync::reconcile::Reconciler;
use cms_index_sync::sync::reverse::{FixedDelay, ReverseSync};
use cms_index_sync::sync::SyncTarget;
use cms_index_sync::webhook::WebhookIngestor;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cms_index_sync=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Build the hub, the per-kind pipelines, and the webhook ingestor from
/// configuration. This is the single wiring point: subscriptions happen here
/// and never change afterwards.
fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let cms_client = CmsClient::new(&cfg.cms)?;
    let writer: Arc<dyn RelationWriter> = Arc::new(CmsRelationWriter::new(
        cms_client.clone(),
        cfg.reverse.related_field.clone(),
        cfg.reverse.locale.clone(),
    ));
    let pacer = Arc::new(FixedDelay::new(Duration::from_millis(cfg.reverse.rate_delay_ms)));

    let mut hub = EventHub::new();
    let mut targets = HashMap::new();

    for target_cfg in &cfg.targets {
        let resource = target_cfg.resource()?;
        let content: Arc<dyn Content> = Arc::new(CmsContent::new(
            cms_client.clone(),
            resource,
            target_cfg.projection.clone(),
        ));
        let index: Arc<dyn IndexClient> =
            Arc::new(AlgoliaIndex::new(&cfg.index, target_cfg.index_name.clone())?);

        let forward_sync = Arc::new(ForwardSync::new(resource, content.clone(), index.clone()));
        forward::wire(&mut hub, forward_sync.clone());

        let reverse_sync = Arc::new(ReverseSync::new(
            resource,
            content.clone(),
            index.clone(),
            writer.clone(),
            pacer.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(resource, content, index));

        targets.insert(
            resource,
            Arc::new(SyncTarget::new(resource, forward_sync, reverse_sync, reconciler)),
        );
    }

    let hub = Arc::new(hub);
    info!(subscriptions = hub.len(), targets = targets.len(), "sync wiring complete");

    Ok(AppState {
        ingestor: Arc::new(WebhookIngestor::new(hub)),
        targets: Arc::new(targets),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load().context("loading configuration")?;
    let state = build_state(&cfg)?;
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, router).await.context("serving http")?;
    Ok(())
}
