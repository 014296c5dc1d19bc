// src/webhook.rs
//! # Webhook ingestor
//! Translates one inbound CMS webhook delivery into a hub notification.
//!
//! Delivery is at-least-once and the sender retries on non-2xx, so anything
//! this system does not care about — unknown topic shapes, unknown kinds,
//! missing headers — is a deliberate no-op that still acknowledges the call.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::events::{Action, EventHub, EventType, Resource};

/// Topic shape: `ContentManagement.<Type>.<Action>`.
fn topic_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^ContentManagement\.(\w+)\.(\w+)$").unwrap())
}

/// What one delivery amounted to. The HTTP layer answers 200 regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Parsed to an event and handed to the hub.
    Dispatched(EventType),
    /// A content-type (schema) change: logged for human follow-up, no sync.
    SchemaChange,
    /// Not a shape this system reacts to.
    Ignored,
}

pub struct WebhookIngestor {
    hub: Arc<EventHub>,
}

impl WebhookIngestor {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    /// Handle one delivery. Dispatch is awaited inline; handler failures are
    /// contained by the hub and never surface here.
    pub async fn ingest(
        &self,
        topic: &str,
        content_type: Option<&str>,
        entity_id: Option<&str>,
    ) -> IngestOutcome {
        let Some(caps) = topic_re().captures(topic) else {
            debug!(topic, "unrecognized webhook topic, ignoring");
            crate::sync::count("webhook_ignored_total");
            return IngestOutcome::Ignored;
        };
        let (entity_type, action) = (&caps[1], &caps[2]);

        if entity_type == "ContentType" {
            warn!(topic, "content-type schema changed, manual follow-up required");
            return IngestOutcome::SchemaChange;
        }
        if entity_type != "Entry" {
            debug!(topic, "non-entry webhook, ignoring");
            crate::sync::count("webhook_ignored_total");
            return IngestOutcome::Ignored;
        }

        let (Some(kind), Some(entity_id)) = (content_type, entity_id) else {
            debug!(topic, "entry webhook missing kind or entity id headers, ignoring");
            crate::sync::count("webhook_ignored_total");
            return IngestOutcome::Ignored;
        };
        let Some(resource) = Resource::from_api_name(kind) else {
            debug!(topic, kind, "unknown content kind, ignoring");
            crate::sync::count("webhook_ignored_total");
            return IngestOutcome::Ignored;
        };
        let Some(action) = Action::from_api_name(action) else {
            debug!(topic, action, "action not synced, ignoring");
            crate::sync::count("webhook_ignored_total");
            return IngestOutcome::Ignored;
        };

        let event = EventType::new(resource, action);
        info!(%event, entity_id, "dispatching webhook event");
        crate::sync::count("webhook_events_total");
        self.hub.notify(event, entity_id).await;
        IngestOutcome::Dispatched(event)
    }
}
