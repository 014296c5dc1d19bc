// src/sync/reconcile.rs
//! # Reconciliation
//! Read-only drift detection between the content source and the index.
//! Reports divergent id sets; remediation is a separate, explicit operator
//! step, so running a diff is always safe.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::content::Content;
use crate::events::Resource;
use crate::index::IndexClient;

/// Divergence between source and index for one kind. `BTreeSet` keeps the
/// id lists deterministic for logs and operator output.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DiffReport {
    /// In the source but not the index: needs upsert.
    pub new_in_source: BTreeSet<String>,
    /// In the index but not the source: orphaned, needs delete.
    pub only_in_index: BTreeSet<String>,
    /// In both, but the source copy is newer: needs re-upsert.
    pub stale_in_index: BTreeSet<String>,
}

impl DiffReport {
    pub fn is_converged(&self) -> bool {
        self.new_in_source.is_empty()
            && self.only_in_index.is_empty()
            && self.stale_in_index.is_empty()
    }
}

/// Pure set arithmetic over the two id→modified maps.
pub fn diff_maps(
    source: &HashMap<String, DateTime<Utc>>,
    index: &HashMap<String, DateTime<Utc>>,
) -> DiffReport {
    let mut report = DiffReport::default();

    for (id, source_modified) in source {
        match index.get(id) {
            None => {
                report.new_in_source.insert(id.clone());
            }
            Some(index_modified) if source_modified > index_modified => {
                report.stale_in_index.insert(id.clone());
            }
            Some(_) => {}
        }
    }
    for id in index.keys() {
        if !source.contains_key(id) {
            report.only_in_index.insert(id.clone());
        }
    }

    report
}

pub struct Reconciler {
    resource: Resource,
    content: Arc<dyn Content>,
    index: Arc<dyn IndexClient>,
}

impl Reconciler {
    pub fn new(resource: Resource, content: Arc<dyn Content>, index: Arc<dyn IndexClient>) -> Self {
        Self {
            resource,
            content,
            index,
        }
    }

    /// Load both id→modified maps and report the divergence. Never mutates
    /// either side.
    pub async fn diff(&self) -> Result<DiffReport> {
        let source = self
            .content
            .fetch_id_to_modified()
            .await
            .with_context(|| format!("loading source modified map for {}", self.resource))?;
        let index = self
            .index
            .fetch_id_to_modified()
            .await
            .with_context(|| format!("loading index modified map for {}", self.resource))?;

        let report = diff_maps(&source, &index);
        info!(
            kind = %self.resource,
            new_in_source = report.new_in_source.len(),
            only_in_index = report.only_in_index.len(),
            stale_in_index = report.stale_in_index.len(),
            "diff complete"
        );
        debug!(
            kind = %self.resource,
            new_in_source = ?report.new_in_source,
            only_in_index = ?report.only_in_index,
            stale_in_index = ?report.stale_in_index,
            "diff id lists"
        );
        Ok(report)
    }
}
