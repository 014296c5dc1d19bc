// src/content/mod.rs
//! Content-source side of the sync: the normalized record shape, the field
//! projection that produces it, and the read/write trait seams implemented
//! against the real CMS in [`cms`].

pub mod cms;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Field name every record must carry; the sole idempotency key for
/// upsert/delete against the index.
pub const OBJECT_ID_FIELD: &str = "objectID";

/// Last-publication timestamp carried by syncable kinds.
pub const PUBLISHED_AT_FIELD: &str = "publishedAt";

/// One projected entity, ready for indexing. Ephemeral: recomputed on every
/// fetch, never cached beyond a single sync operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContentRecord {
    pub fields: Map<String, Value>,
}

impl ContentRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn object_id(&self) -> &str {
        self.fields
            .get(OBJECT_ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn published_at(&self) -> Option<&str> {
        self.fields.get(PUBLISHED_AT_FIELD).and_then(Value::as_str)
    }
}

/// One `(output field, extraction path)` rule of a projection.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProjectionRule {
    pub name: String,
    /// Dot-separated path into the CMS query result, e.g. `sys.id`,
    /// `fields.title`.
    pub path: String,
    /// Optional fields may be absent without invalidating the record.
    #[serde(default)]
    pub optional: bool,
}

/// A named set of projection rules evaluated against the CMS query result
/// for one entity.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FieldProjection {
    pub rules: Vec<ProjectionRule>,
}

impl FieldProjection {
    pub fn new(rules: Vec<ProjectionRule>) -> Self {
        Self { rules }
    }

    /// Projections are only valid with a required `objectID` rule.
    pub fn has_object_id_rule(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.name == OBJECT_ID_FIELD && !r.optional)
    }

    /// Evaluate against one entity's query result. Returns `None` when a
    /// required field fails to resolve (entity treated as not found).
    pub fn project(&self, source: &Value) -> Option<ContentRecord> {
        let mut fields = Map::with_capacity(self.rules.len());
        for rule in &self.rules {
            match resolve_path(source, &rule.path) {
                Some(v) if !v.is_null() => {
                    fields.insert(rule.name.clone(), v.clone());
                }
                _ if rule.optional => {}
                _ => return None,
            }
        }
        Some(ContentRecord::new(fields))
    }
}

/// Walk a dot-separated path through objects (and array indices).
fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for seg in path.split('.') {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Read-only capability over one content kind in the CMS.
///
/// Not-found is `Ok(None)` / absence, never an error; `Err` is reserved for
/// transport failures so callers can decide to retry, skip, or abort.
#[async_trait]
pub trait Content: Send + Sync {
    /// Projected record for one entity, or `None` if it does not exist or
    /// fails required-field projection.
    async fn fetch(&self, entity_id: &str) -> Result<Option<ContentRecord>>;

    /// Every currently published entity of this kind.
    async fn fetch_all(&self) -> Result<Vec<ContentRecord>>;

    /// Ids only, no projection cost.
    async fn fetch_ids(&self) -> Result<Vec<String>>;

    /// id → last-modified, for reconciliation.
    async fn fetch_id_to_modified(&self) -> Result<HashMap<String, DateTime<Utc>>>;
}

/// Write capability used by the reverse sync: persist an index-derived
/// relation back into the content source.
#[async_trait]
pub trait RelationWriter: Send + Sync {
    /// Write `related_ids` into the designated relation field of `entity_id`
    /// and publish the change. An empty slice clears the relation.
    async fn set_related(&self, entity_id: &str, related_ids: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn projection() -> FieldProjection {
        FieldProjection::new(vec![
            ProjectionRule {
                name: "objectID".into(),
                path: "sys.id".into(),
                optional: false,
            },
            ProjectionRule {
                name: "title".into(),
                path: "fields.title".into(),
                optional: false,
            },
            ProjectionRule {
                name: "teaser".into(),
                path: "fields.teaser".into(),
                optional: true,
            },
        ])
    }

    #[test]
    fn project_maps_declared_fields() {
        let src = json!({
            "sys": { "id": "a1" },
            "fields": { "title": "Hello", "teaser": "Short" }
        });
        let rec = projection().project(&src).expect("record");
        assert_eq!(rec.object_id(), "a1");
        assert_eq!(rec.fields["title"], json!("Hello"));
        assert_eq!(rec.fields["teaser"], json!("Short"));
    }

    #[test]
    fn missing_optional_field_is_skipped() {
        let src = json!({ "sys": { "id": "a1" }, "fields": { "title": "Hello" } });
        let rec = projection().project(&src).expect("record");
        assert!(!rec.fields.contains_key("teaser"));
    }

    #[test]
    fn missing_required_field_invalidates_record() {
        let src = json!({ "sys": { "id": "a1" }, "fields": { "teaser": "no title" } });
        assert!(projection().project(&src).is_none());
    }

    #[test]
    fn null_required_field_invalidates_record() {
        let src = json!({ "sys": { "id": "a1" }, "fields": { "title": null } });
        assert!(projection().project(&src).is_none());
    }

    #[test]
    fn resolve_path_descends_arrays() {
        let src = json!({ "items": [ { "id": "x" }, { "id": "y" } ] });
        assert_eq!(resolve_path(&src, "items.1.id"), Some(&json!("y")));
        assert_eq!(resolve_path(&src, "items.2.id"), None);
    }

    #[test]
    fn object_id_rule_must_be_required() {
        let p = FieldProjection::new(vec![ProjectionRule {
            name: "objectID".into(),
            path: "sys.id".into(),
            optional: true,
        }]);
        assert!(!p.has_object_id_rule());
        assert!(projection().has_object_id_rule());
    }
}
