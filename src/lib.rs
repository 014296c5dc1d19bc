// src/lib.rs
// Public library surface for integration tests (and the binary).

pub mod api;
pub mod config;
pub mod content;
pub mod events;
pub mod index;
pub mod sync;
pub mod webhook;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::events::{Action, EventHub, EventPattern, EventType, Resource};
pub use crate::sync::{BatchReport, SyncTarget};
pub use crate::webhook::{IngestOutcome, WebhookIngestor};
