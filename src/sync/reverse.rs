// src/sync/reverse.rs
//! # Reverse sync
//! Derives the related-items relation from the index and writes it back into
//! the content source, strictly sequentially, paced to stay under the
//! management API's rate limit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::BatchReport;
use crate::content::{Content, RelationWriter};
use crate::events::Resource;
use crate::index::IndexClient;

/// Management-API documented ceiling is 7 calls/sec; the inter-item delay
/// must never drop below one ceiling interval.
pub const MIN_DELAY_MS: u64 = 1000 / 7;

/// Inter-item wait, injected so the throttling policy is testable without
/// real wall-clock delays.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pace(&self);
}

/// Production pacer: a fixed sleep between items.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn pace(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

pub struct ReverseSync {
    resource: Resource,
    content: Arc<dyn Content>,
    index: Arc<dyn IndexClient>,
    writer: Arc<dyn RelationWriter>,
    pacer: Arc<dyn Pacer>,
}

impl ReverseSync {
    pub fn new(
        resource: Resource,
        content: Arc<dyn Content>,
        index: Arc<dyn IndexClient>,
        writer: Arc<dyn RelationWriter>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            resource,
            content,
            index,
            writer,
            pacer,
        }
    }

    /// Query the relation for one entity and persist it. One management
    /// write + publish per call.
    pub async fn upsert_one(&self, entity_id: &str) -> Result<()> {
        let related = self
            .index
            .fetch_related(entity_id)
            .await
            .with_context(|| format!("querying related for {} {entity_id}", self.resource))?;
        let ids: Vec<String> = related.into_iter().map(|h| h.object_id).collect();
        self.writer
            .set_related(entity_id, &ids)
            .await
            .with_context(|| format!("writing relation for {} {entity_id}", self.resource))
    }

    /// Re-link every entity of the kind. Strictly sequential with the pacer
    /// waiting between items; a per-item failure is logged and counted, never
    /// aborts the batch.
    pub async fn upsert_all(&self) -> Result<BatchReport> {
        let ids = self
            .content
            .fetch_ids()
            .await
            .with_context(|| format!("listing {} ids", self.resource))?;
        let total = ids.len();
        let mut succeeded = 0usize;

        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.pacer.pace().await;
            }
            match self.upsert_one(id).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    super::count("sync_relink_failures_total");
                    warn!(kind = %self.resource, entity_id = %id, error = ?e, "re-link failed");
                }
            }
        }

        let report = BatchReport { succeeded, total };
        info!(
            kind = %self.resource,
            succeeded = report.succeeded,
            total = report.total,
            "re-link complete"
        );
        Ok(report)
    }

    /// Clear the relation for an entity removed from the index.
    pub async fn delete(&self, entity_id: &str) -> Result<()> {
        self.writer
            .set_related(entity_id, &[])
            .await
            .with_context(|| format!("clearing relation for {} {entity_id}", self.resource))
    }
}
