// src/index/mod.rs
//! Search-index side of the sync: the narrow client trait the pipelines are
//! written against, implemented for the real service in [`algolia`].

pub mod algolia;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::content::ContentRecord;

/// One related-items hit returned by the index's relation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedHit {
    pub object_id: String,
    pub score: f64,
}

/// Capability over one logical search index.
///
/// `upsert`/`delete` are idempotent per object id and commutative across ids;
/// `batch_replace_all` is the only destructive whole-index operation and must
/// never be mixed with incremental updates for the same run.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Create-or-replace one record.
    async fn upsert(&self, object_id: &str, record: &ContentRecord) -> Result<()>;

    /// Replace the entire index contents in one shot. Full re-index only.
    async fn batch_replace_all(&self, records: &[ContentRecord]) -> Result<()>;

    /// Remove one record; succeeds even if the id is already absent.
    async fn delete(&self, object_id: &str) -> Result<()>;

    /// id → last-indexed timestamp for every stored record.
    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>>;

    /// Related-items relation for one record, ordered by descending score.
    async fn fetch_related(&self, object_id: &str) -> Result<Vec<RelatedHit>>;
}
