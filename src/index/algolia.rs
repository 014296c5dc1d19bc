// src/index/algolia.rs
//! Algolia-style REST implementation of [`IndexClient`].
//!
//! Incremental writes go through the per-object endpoints; the full replace
//! is a single batch request (`clear` + `updateObject`s) so the index never
//! exposes a half-replaced state; enumeration uses the cursor-paginated
//! browse endpoint; the relation comes from the recommendations endpoint.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use super::{IndexClient, RelatedHit};
use crate::config::IndexConfig;
use crate::content::ContentRecord;

const APP_ID_HEADER: &str = "X-Algolia-Application-Id";
const API_KEY_HEADER: &str = "X-Algolia-API-Key";

pub struct AlgoliaIndex {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    api_key: String,
    /// Logical index this client is bound to.
    index_name: String,
    related_limit: usize,
    related_min_score: f64,
}

impl AlgoliaIndex {
    pub fn new(cfg: &IndexConfig, index_name: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building index http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            app_id: cfg.app_id.clone(),
            api_key: cfg.api_key.clone(),
            index_name,
            related_limit: cfg.related_limit,
            related_min_score: cfg.related_min_score,
        })
    }

    fn object_url(&self, object_id: &str) -> String {
        format!("{}/1/indexes/{}/{}", self.base_url, self.index_name, object_id)
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/1/indexes/{}/{}", self.base_url, self.index_name, suffix)
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(APP_ID_HEADER, &self.app_id)
            .header(API_KEY_HEADER, &self.api_key)
    }
}

/// Extracts `(objectID, publishedAt)` from a browse hit. A record with a
/// missing or unparseable timestamp is pinned to the unix epoch rather than
/// dropped, so it still shows up in drift reports as stale or orphaned.
fn hit_modified(hit: &Value) -> Option<(String, DateTime<Utc>)> {
    let id = hit.get("objectID").and_then(Value::as_str)?;
    let modified = match hit.get("publishedAt").and_then(Value::as_str) {
        Some(ts) => match DateTime::parse_from_rfc3339(ts) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!(id, ts, error = %e, "unparseable publishedAt, treating as epoch");
                DateTime::UNIX_EPOCH
            }
        },
        None => {
            warn!(id, "indexed record missing publishedAt, treating as epoch");
            DateTime::UNIX_EPOCH
        }
    };
    Some((id.to_string(), modified))
}

#[async_trait]
impl IndexClient for AlgoliaIndex {
    async fn upsert(&self, object_id: &str, record: &ContentRecord) -> Result<()> {
        self.request(self.http.put(self.object_url(object_id)))
            .json(&record.fields)
            .send()
            .await
            .context("index upsert")?
            .error_for_status()
            .context("index upsert non-2xx")?;
        Ok(())
    }

    async fn batch_replace_all(&self, records: &[ContentRecord]) -> Result<()> {
        // One batch call: clear first, then every record. The index applies
        // the batch as a unit, so readers never observe a partial replace.
        let mut requests = Vec::with_capacity(records.len() + 1);
        requests.push(json!({ "action": "clear" }));
        for rec in records {
            requests.push(json!({ "action": "updateObject", "body": rec.fields }));
        }

        self.request(self.http.post(self.index_url("batch")))
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .context("index batch replace")?
            .error_for_status()
            .context("index batch replace non-2xx")?;
        Ok(())
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        let resp = self
            .request(self.http.delete(self.object_url(object_id)))
            .send()
            .await
            .context("index delete")?;
        // Absent id is a success: delete is idempotent.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status().context("index delete non-2xx")?;
        Ok(())
    }

    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut map = HashMap::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "attributesToRetrieve": ["objectID", "publishedAt"] });
            if let Some(c) = &cursor {
                body["cursor"] = json!(c);
            }
            let page: Value = self
                .request(self.http.post(self.index_url("browse")))
                .json(&body)
                .send()
                .await
                .context("index browse")?
                .error_for_status()
                .context("index browse non-2xx")?
                .json()
                .await
                .context("index browse body")?;

            let hits = page
                .get("hits")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("browse response missing hits"))?;
            for hit in hits {
                if let Some((id, modified)) = hit_modified(hit) {
                    map.insert(id, modified);
                }
            }

            cursor = page
                .get("cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(map);
            }
        }
    }

    async fn fetch_related(&self, object_id: &str) -> Result<Vec<RelatedHit>> {
        let body = json!({
            "requests": [{
                "indexName": self.index_name,
                "objectID": object_id,
                "model": "related-products",
                "maxRecommendations": self.related_limit,
                "threshold": self.related_min_score,
            }]
        });
        let resp: Value = self
            .request(self.http.post(format!("{}/1/indexes/*/recommendations", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("index related query")?
            .error_for_status()
            .context("index related query non-2xx")?
            .json()
            .await
            .context("index related body")?;

        let hits = resp
            .pointer("/results/0/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("related response missing results[0].hits"))?;

        let mut related = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(id) = hit.get("objectID").and_then(Value::as_str) else {
                continue;
            };
            let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
            if score >= self.related_min_score {
                related.push(RelatedHit {
                    object_id: id.to_string(),
                    score,
                });
            }
        }
        related.truncate(self.related_limit);
        Ok(related)
    }
}
