// tests/hub_dispatch.rs
//
// Dispatch contract of the event hub: registration-order execution for a
// single notify, isolation of failing handlers, and pattern filtering.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use cms_index_sync::events::{
    Action, EventHandler, EventHub, EventPattern, EventType, Resource,
};

/// Appends a label to a shared trace on every call; optionally fails.
struct Recorder {
    label: &'static str,
    trace: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: EventType, entity_id: &str) -> Result<()> {
        self.trace
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.label, event, entity_id));
        if self.fail {
            return Err(anyhow!("{} failing on purpose", self.label));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

fn recorder(label: &'static str, trace: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Recorder> {
    Arc::new(Recorder {
        label,
        trace: trace.clone(),
        fail,
    })
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut hub = EventHub::new();
    hub.subscribe(EventPattern::any(), recorder("h1", &trace, false));
    hub.subscribe(
        EventPattern::for_resource(Resource::Article),
        recorder("h2", &trace, false),
    );

    hub.notify(EventType::new(Resource::Article, Action::Publish), "e1")
        .await;

    let got = trace.lock().unwrap().clone();
    assert_eq!(
        got,
        vec![
            "h1:article.Publish:e1".to_string(),
            "h2:article.Publish:e1".to_string()
        ],
        "h1 must complete before h2 starts"
    );
}

#[tokio::test]
async fn failing_handler_does_not_block_later_handlers() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut hub = EventHub::new();
    hub.subscribe(EventPattern::any(), recorder("boom", &trace, true));
    hub.subscribe(EventPattern::any(), recorder("after", &trace, false));

    hub.notify(EventType::new(Resource::Page, Action::Unpublish), "p9")
        .await;

    let got = trace.lock().unwrap().clone();
    assert_eq!(got.len(), 2, "both handlers must run");
    assert!(got[1].starts_with("after:"), "second handler runs after the failure");
}

#[tokio::test]
async fn non_matching_handlers_are_skipped() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut hub = EventHub::new();
    hub.subscribe(
        EventPattern::for_resource(Resource::Page),
        recorder("pages", &trace, false),
    );
    hub.subscribe(
        EventPattern {
            resource: Some(Resource::Article),
            action: Some(Action::Unpublish),
        },
        recorder("article-unpub", &trace, false),
    );

    hub.notify(EventType::new(Resource::Article, Action::Publish), "a1")
        .await;

    assert!(
        trace.lock().unwrap().is_empty(),
        "no subscribed pattern matches article.publish"
    );
}

#[tokio::test]
async fn duplicate_notify_reaches_handlers_twice() {
    // Delivery is at-least-once upstream; the hub itself never dedups.
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut hub = EventHub::new();
    hub.subscribe(EventPattern::any(), recorder("h", &trace, false));

    let evt = EventType::new(Resource::ArticleWeb, Action::Publish);
    hub.notify(evt, "w1").await;
    hub.notify(evt, "w1").await;

    assert_eq!(trace.lock().unwrap().len(), 2);
}
