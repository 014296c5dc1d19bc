// src/config.rs
//! Configuration: a TOML file (path from `CMS_SYNC_CONFIG`, falling back to
//! `config/sync.toml`) with env-var overrides for secrets. Everything is
//! loaded once at startup and validated before any client is built.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::content::FieldProjection;
use crate::events::Resource;
use crate::sync::reverse::MIN_DELAY_MS;

const ENV_CONFIG_PATH: &str = "CMS_SYNC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/sync.toml";

const ENV_DELIVERY_TOKEN: &str = "CMS_DELIVERY_TOKEN";
const ENV_MANAGEMENT_TOKEN: &str = "CMS_MANAGEMENT_TOKEN";
const ENV_INDEX_API_KEY: &str = "INDEX_API_KEY";

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmsConfig {
    pub delivery_base_url: String,
    pub management_base_url: String,
    pub space: String,
    pub environment: String,
    /// Usually injected via `CMS_DELIVERY_TOKEN` rather than the file.
    #[serde(default)]
    pub delivery_token: String,
    #[serde(default)]
    pub management_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_related_limit() -> usize {
    3
}

fn default_related_min_score() -> f64 {
    0.6
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub base_url: String,
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bounded count for the related-items relation.
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
    #[serde(default = "default_related_min_score")]
    pub related_min_score: f64,
}

fn default_rate_delay_ms() -> u64 {
    500
}

fn default_locale() -> String {
    "en-US".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseConfig {
    /// Inter-item delay for re-link batches. Clamped to the management-API
    /// rate floor at load time.
    #[serde(default = "default_rate_delay_ms")]
    pub rate_delay_ms: u64,
    /// CMS field id the relation is written into.
    pub related_field: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

/// One syncable content kind: its index and its field projection.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub kind: String,
    pub index_name: String,
    #[serde(flatten)]
    pub projection: FieldProjection,
}

impl TargetConfig {
    pub fn resource(&self) -> Result<Resource> {
        Resource::from_api_name(&self.kind)
            .with_context(|| format!("unknown content kind '{}' in targets", self.kind))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub cms: CmsConfig,
    pub index: IndexConfig,
    pub reverse: ReverseConfig,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppConfig {
    /// Load from `$CMS_SYNC_CONFIG`, falling back to `config/sync.toml`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_DELIVERY_TOKEN) {
            self.cms.delivery_token = v;
        }
        if let Ok(v) = std::env::var(ENV_MANAGEMENT_TOKEN) {
            self.cms.management_token = v;
        }
        if let Ok(v) = std::env::var(ENV_INDEX_API_KEY) {
            self.index.api_key = v;
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("config declares no sync targets");
        }
        for target in &self.targets {
            let resource = target.resource()?;
            if !target.projection.has_object_id_rule() {
                bail!("target '{resource}' projection lacks a required objectID rule");
            }
        }
        if self.reverse.rate_delay_ms < MIN_DELAY_MS {
            warn!(
                configured = self.reverse.rate_delay_ms,
                floor = MIN_DELAY_MS,
                "reverse rate delay below the management-API floor, clamping"
            );
            self.reverse.rate_delay_ms = MIN_DELAY_MS;
        }
        Ok(())
    }
}
