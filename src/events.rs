// src/events.rs
//! # Event hub
//! In-process publish/subscribe for content lifecycle events.
//!
//! Subscriptions are registered once at startup (builder-style, `&mut self`)
//! and the hub is then shared as `Arc` — append-only before sharing, read-many
//! after, so dispatch needs no locking. Handlers for a single `notify` run
//! sequentially in registration order; a failing handler is logged and never
//! blocks the handlers after it.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Content kinds the platform knows about. Maps 1:1 to the CMS content-type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Article,
    Page,
    ArticleWeb,
}

impl Resource {
    /// The content-type id used by the CMS (webhook headers and queries).
    pub fn api_name(&self) -> &'static str {
        match self {
            Resource::Article => "article",
            Resource::Page => "page",
            Resource::ArticleWeb => "articleWeb",
        }
    }

    pub fn from_api_name(s: &str) -> Option<Self> {
        match s {
            "article" => Some(Resource::Article),
            "page" => Some(Resource::Page),
            "articleWeb" => Some(Resource::ArticleWeb),
            _ => None,
        }
    }

    pub const ALL: [Resource; 3] = [Resource::Article, Resource::Page, Resource::ArticleWeb];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Lifecycle actions the sync reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Publish,
    Unpublish,
}

impl Action {
    pub fn from_api_name(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(Action::Publish),
            "unpublish" => Some(Action::Unpublish),
            _ => None,
        }
    }
}

/// "A resource underwent an action." Value type, cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
    pub resource: Resource,
    pub action: Action,
}

impl EventType {
    pub fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:?}", self.resource, self.action)
    }
}

/// Filter over [`EventType`]s. Absent fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventPattern {
    pub resource: Option<Resource>,
    pub action: Option<Action>,
}

impl EventPattern {
    /// Wildcard pattern: matches every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// All actions for one resource.
    pub fn for_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            action: None,
        }
    }

    pub fn matches(&self, event: EventType) -> bool {
        self.resource.is_none_or(|r| r == event.resource)
            && self.action.is_none_or(|a| a == event.action)
    }
}

/// A subscriber invoked for every matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventType, entity_id: &str) -> Result<()>;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

struct Subscription {
    pattern: EventPattern,
    handler: Arc<dyn EventHandler>,
}

/// Process-wide dispatcher. Build (subscribe) at startup, then share as `Arc`.
#[derive(Default)]
pub struct EventHub {
    subscriptions: Vec<Subscription>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registration order is dispatch order.
    pub fn subscribe(&mut self, pattern: EventPattern, handler: Arc<dyn EventHandler>) {
        debug!(?pattern, handler = handler.name(), "subscribing handler");
        self.subscriptions.push(Subscription { pattern, handler });
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispatch one event to every matching handler, sequentially, in
    /// registration order. Handler errors are logged and swallowed so one
    /// failing subscriber cannot starve the rest.
    pub async fn notify(&self, event: EventType, entity_id: &str) {
        for sub in self.subscriptions.iter().filter(|s| s.pattern.matches(event)) {
            if let Err(e) = sub.handler.handle(event, entity_id).await {
                warn!(
                    %event,
                    entity_id,
                    handler = sub.handler.name(),
                    error = ?e,
                    "event handler failed"
                );
            }
        }
    }
}
