// src/content/cms.rs
//! CMS-backed implementations of the content traits.
//!
//! [`CmsContent`] reads through the delivery (query) API, one instance per
//! content kind; [`CmsRelationWriter`] writes the index-derived relation back
//! through the management API (write + publish, optimistic versioning).
//! Both share a [`CmsClient`] with bounded timeouts.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Content, ContentRecord, FieldProjection, RelationWriter};
use crate::config::CmsConfig;
use crate::events::Resource;

/// Shared HTTP plumbing for both CMS APIs.
#[derive(Clone)]
pub struct CmsClient {
    http: reqwest::Client,
    delivery_base: String,
    management_base: String,
    space: String,
    environment: String,
    delivery_token: String,
    management_token: String,
    page_size: usize,
}

impl CmsClient {
    pub fn new(cfg: &CmsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building CMS http client")?;
        Ok(Self {
            http,
            delivery_base: cfg.delivery_base_url.trim_end_matches('/').to_string(),
            management_base: cfg.management_base_url.trim_end_matches('/').to_string(),
            space: cfg.space.clone(),
            environment: cfg.environment.clone(),
            delivery_token: cfg.delivery_token.clone(),
            management_token: cfg.management_token.clone(),
            page_size: cfg.page_size,
        })
    }

    fn entries_url(&self) -> String {
        format!(
            "{}/spaces/{}/environments/{}/entries",
            self.delivery_base, self.space, self.environment
        )
    }

    fn management_entry_url(&self, entity_id: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}/entries/{}",
            self.management_base, self.space, self.environment, entity_id
        )
    }

    /// One delivery-API entries query. `extra` is appended to the standard
    /// content-type filter.
    async fn query_entries(&self, content_type: &str, extra: &[(&str, String)]) -> Result<Value> {
        let mut params: Vec<(&str, String)> = vec![("content_type", content_type.to_string())];
        params.extend(extra.iter().cloned());

        let resp = self
            .http
            .get(self.entries_url())
            .bearer_auth(&self.delivery_token)
            .query(&params)
            .send()
            .await
            .context("cms entries query")?
            .error_for_status()
            .context("cms entries non-2xx")?;

        resp.json::<Value>().await.context("cms entries body")
    }
}

/// Read-only view of one content kind.
pub struct CmsContent {
    client: CmsClient,
    resource: Resource,
    projection: FieldProjection,
}

impl CmsContent {
    pub fn new(client: CmsClient, resource: Resource, projection: FieldProjection) -> Self {
        Self {
            client,
            resource,
            projection,
        }
    }

    fn content_type(&self) -> &'static str {
        self.resource.api_name()
    }

    /// Page through the entries endpoint, handing each page's items to `f`.
    async fn for_each_page<F>(&self, select: Option<&str>, mut f: F) -> Result<()>
    where
        F: FnMut(&[Value]),
    {
        let limit = self.client.page_size;
        let mut skip = 0usize;
        loop {
            let mut extra = vec![
                ("limit", limit.to_string()),
                ("skip", skip.to_string()),
                ("order", "sys.id".to_string()),
            ];
            if let Some(sel) = select {
                extra.push(("select", sel.to_string()));
            }
            let body = self.client.query_entries(self.content_type(), &extra).await?;
            let items = body
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("cms response missing items array"))?;
            f(items);

            skip += items.len();
            let total = body.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
            if items.len() < limit || skip >= total {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Content for CmsContent {
    async fn fetch(&self, entity_id: &str) -> Result<Option<ContentRecord>> {
        let body = self
            .client
            .query_entries(self.content_type(), &[("sys.id", entity_id.to_string())])
            .await?;
        let Some(entry) = body
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };

        match self.projection.project(entry) {
            Some(rec) => Ok(Some(rec)),
            None => {
                debug!(
                    kind = %self.resource,
                    entity_id,
                    "entry failed required-field projection, treating as not found"
                );
                Ok(None)
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<ContentRecord>> {
        let mut records = Vec::new();
        self.for_each_page(None, |items| {
            for entry in items {
                match self.projection.project(entry) {
                    Some(rec) => records.push(rec),
                    None => debug!(kind = %self.resource, "skipping entry failing projection"),
                }
            }
        })
        .await?;
        Ok(records)
    }

    async fn fetch_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        self.for_each_page(Some("sys.id"), |items| {
            ids.extend(
                items
                    .iter()
                    .filter_map(|e| e.pointer("/sys/id").and_then(Value::as_str))
                    .map(str::to_string),
            );
        })
        .await?;
        Ok(ids)
    }

    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut map = HashMap::new();
        self.for_each_page(Some("sys.id,sys.updatedAt"), |items| {
            for entry in items {
                let Some(id) = entry.pointer("/sys/id").and_then(Value::as_str) else {
                    continue;
                };
                let Some(ts) = entry.pointer("/sys/updatedAt").and_then(Value::as_str) else {
                    continue;
                };
                match DateTime::parse_from_rfc3339(ts) {
                    Ok(dt) => {
                        map.insert(id.to_string(), dt.with_timezone(&Utc));
                    }
                    Err(e) => warn!(id, ts, error = %e, "unparseable sys.updatedAt, skipping"),
                }
            }
        })
        .await?;
        Ok(map)
    }
}

/// Management-API writer for the related-items relation.
pub struct CmsRelationWriter {
    client: CmsClient,
    /// Field id the relation is written into, e.g. `relatedArticles`.
    related_field: String,
    /// CMS locale the field is written under.
    locale: String,
}

impl CmsRelationWriter {
    pub fn new(client: CmsClient, related_field: String, locale: String) -> Self {
        Self {
            client,
            related_field,
            locale,
        }
    }

    fn entry_link(id: &str) -> Value {
        json!({ "sys": { "type": "Link", "linkType": "Entry", "id": id } })
    }
}

#[async_trait]
impl RelationWriter for CmsRelationWriter {
    async fn set_related(&self, entity_id: &str, related_ids: &[String]) -> Result<()> {
        let url = self.client.management_entry_url(entity_id);

        // Read the current entry: we need its version for the optimistic
        // write and its full field set so the update does not wipe fields.
        let mut entry: Value = self
            .client
            .http
            .get(&url)
            .bearer_auth(&self.client.management_token)
            .send()
            .await
            .context("management entry read")?
            .error_for_status()
            .context("management entry read non-2xx")?
            .json()
            .await
            .context("management entry body")?;

        let version = entry
            .pointer("/sys/version")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("management entry missing sys.version"))?;

        let links: Vec<Value> = related_ids.iter().map(|id| Self::entry_link(id)).collect();
        let mut localized = serde_json::Map::new();
        localized.insert(self.locale.clone(), Value::Array(links));
        let fields = entry
            .get_mut("fields")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("management entry missing fields object"))?;
        fields.insert(self.related_field.clone(), Value::Object(localized));

        let updated: Value = self
            .client
            .http
            .put(&url)
            .bearer_auth(&self.client.management_token)
            .header("X-Contentful-Version", version)
            .json(&json!({ "fields": entry["fields"] }))
            .send()
            .await
            .context("management entry write")?
            .error_for_status()
            .context("management entry write non-2xx")?
            .json()
            .await
            .context("management entry write body")?;

        let Some(new_version) = updated.pointer("/sys/version").and_then(Value::as_u64) else {
            bail!("management write response missing sys.version");
        };

        self.client
            .http
            .put(format!("{url}/published"))
            .bearer_auth(&self.client.management_token)
            .header("X-Contentful-Version", new_version)
            .send()
            .await
            .context("management entry publish")?
            .error_for_status()
            .context("management entry publish non-2xx")?;

        debug!(entity_id, related = related_ids.len(), "relation written and published");
        Ok(())
    }
}
