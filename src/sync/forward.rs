// src/sync/forward.rs
//! # Forward sync
//! Keeps the index converged with publish/unpublish events from the content
//! source. One instance per syncable kind; subscribed to the hub at startup.
//!
//! Handler failures are logged by the hub and not retried here — convergence
//! after a failure comes from the reconciler or a later event for the same id.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::content::Content;
use crate::events::{Action, EventHandler, EventHub, EventPattern, EventType, Resource};
use crate::index::IndexClient;

pub struct ForwardSync {
    resource: Resource,
    content: Arc<dyn Content>,
    index: Arc<dyn IndexClient>,
}

impl ForwardSync {
    pub fn new(resource: Resource, content: Arc<dyn Content>, index: Arc<dyn IndexClient>) -> Self {
        Self {
            resource,
            content,
            index,
        }
    }

    /// Fetch and index one entity. An entity that no longer exists (or fails
    /// required-field projection) is a benign no-op: it may have been
    /// unpublished between event delivery and processing. Safe to call twice.
    pub async fn upsert_one(&self, entity_id: &str) -> Result<()> {
        let Some(record) = self
            .content
            .fetch(entity_id)
            .await
            .with_context(|| format!("fetching {} {entity_id}", self.resource))?
        else {
            debug!(kind = %self.resource, entity_id, "entity absent, skipping upsert");
            return Ok(());
        };

        self.index
            .upsert(record.object_id(), &record)
            .await
            .with_context(|| format!("upserting {} {entity_id}", self.resource))?;
        super::count("sync_upserts_total");
        debug!(kind = %self.resource, entity_id, "record upserted");
        Ok(())
    }

    /// Remove one record from the index. Idempotent; absent id is success.
    pub async fn delete_one(&self, object_id: &str) -> Result<()> {
        self.index
            .delete(object_id)
            .await
            .with_context(|| format!("deleting {} {object_id}", self.resource))?;
        super::count("sync_deletes_total");
        debug!(kind = %self.resource, object_id, "record deleted");
        Ok(())
    }

    /// Full re-index: materialize every published record and replace the
    /// whole index in one batch. All-or-nothing — a failure propagates and
    /// leaves the index as it was. Callers must serialize invocations for
    /// the same logical index.
    pub async fn upsert_all(&self) -> Result<usize> {
        let records = self
            .content
            .fetch_all()
            .await
            .with_context(|| format!("fetching all {}", self.resource))?;
        self.index
            .batch_replace_all(&records)
            .await
            .with_context(|| format!("replacing index for {}", self.resource))?;
        super::count("sync_reindex_runs_total");
        info!(kind = %self.resource, records = records.len(), "full re-index complete");
        Ok(records.len())
    }
}

#[async_trait]
impl EventHandler for ForwardSync {
    async fn handle(&self, event: EventType, entity_id: &str) -> Result<()> {
        match event.action {
            Action::Publish => self.upsert_one(entity_id).await,
            Action::Unpublish => self.delete_one(entity_id).await,
        }
    }

    fn name(&self) -> &'static str {
        "forward-sync"
    }
}

/// Subscribe a forward sync for its resource with an action-wildcard pattern.
pub fn wire(hub: &mut EventHub, sync: Arc<ForwardSync>) {
    let pattern = EventPattern::for_resource(sync.resource);
    hub.subscribe(pattern, sync);
}
