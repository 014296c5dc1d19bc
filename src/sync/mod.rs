// src/sync/mod.rs
//! Sync pipelines and the per-kind bundle the operator jobs run against.

pub mod forward;
pub mod reconcile;
pub mod reverse;

use std::sync::Arc;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;

use crate::events::Resource;
use forward::ForwardSync;
use reconcile::{DiffReport, Reconciler};
use reverse::ReverseSync;

/// Outcome of a batch operation that tolerates per-item failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub total: usize,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// One-time metrics registration (so series show up once a recorder exists).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_upserts_total", "Records upserted into the index.");
        describe_counter!("sync_deletes_total", "Records deleted from the index.");
        describe_counter!(
            "sync_reindex_runs_total",
            "Full forward re-index operations."
        );
        describe_counter!(
            "sync_relink_failures_total",
            "Per-item failures during reverse re-link batches."
        );
        describe_counter!("webhook_events_total", "Webhook deliveries dispatched to the hub.");
        describe_counter!(
            "webhook_ignored_total",
            "Webhook deliveries ignored (unknown shape or missing headers)."
        );
    });
}

pub(crate) fn count(name: &'static str) {
    ensure_metrics_described();
    counter!(name).increment(1);
}

/// Everything that operates on one syncable kind, plus the job lock that
/// keeps full re-index/re-link runs from overlapping for the same index.
pub struct SyncTarget {
    pub resource: Resource,
    pub forward: Arc<ForwardSync>,
    pub reverse: Arc<ReverseSync>,
    pub reconciler: Arc<Reconciler>,
    job_lock: Mutex<()>,
}

impl SyncTarget {
    pub fn new(
        resource: Resource,
        forward: Arc<ForwardSync>,
        reverse: Arc<ReverseSync>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            resource,
            forward,
            reverse,
            reconciler,
            job_lock: Mutex::new(()),
        }
    }

    /// Full re-index for this kind. Serialized: the whole-index replace must
    /// never run concurrently with itself.
    pub async fn run_reindex(&self) -> Result<usize> {
        let _guard = self.job_lock.lock().await;
        self.forward.upsert_all().await
    }

    /// Full re-link for this kind. Shares the job lock so a re-link does not
    /// interleave with a re-index trigger for the same kind.
    pub async fn run_relink(&self) -> Result<BatchReport> {
        let _guard = self.job_lock.lock().await;
        self.reverse.upsert_all().await
    }

    /// Drift report. Read-only, safe to run at any time.
    pub async fn run_diff(&self) -> Result<DiffReport> {
        self.reconciler.diff().await
    }
}
