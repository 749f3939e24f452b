//! The capture gateway — the core's only inbound entry point.
//!
//! Drives the per-item pipeline in strict order: persist, content
//! analysis, session assignment, automation. Content analysis failure is
//! not fatal to the item; it is persisted with empty analysis and the
//! heuristic tags.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;

use fc_domain::analysis::ContentAnalysis;
use fc_domain::bus::Bus;
use fc_domain::event::BusEvent;
use fc_domain::item::ClipboardItem;
use fc_domain::session::Session;
use fc_domain::{Error, Result};
use fc_store::Store;
use fc_workflow::catalog::CONTENT_ANALYSIS;
use fc_workflow::{ExecOptions, WorkflowRuntime, WorkflowState};

use crate::automation::AutomationDispatcher;
use crate::engine::SessionEngine;

pub struct CaptureGateway {
    store: Arc<Store>,
    runtime: Arc<WorkflowRuntime>,
    engine: Arc<SessionEngine>,
    automation: Arc<AutomationDispatcher>,
    bus: Bus,
    /// Last accepted timestamp per source app, for the monotonicity
    /// precondition.
    last_seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CaptureGateway {
    pub fn new(
        store: Arc<Store>,
        runtime: Arc<WorkflowRuntime>,
        engine: Arc<SessionEngine>,
        automation: Arc<AutomationDispatcher>,
        bus: Bus,
    ) -> Self {
        Self {
            store,
            runtime,
            engine,
            automation,
            bus,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Ingest one clipboard item and drive it through the pipeline.
    /// Returns the session the item ended up in.
    pub async fn submit_item(&self, item: ClipboardItem) -> Result<Session> {
        if item.content.trim().is_empty() {
            return Err(Error::bad_transition("empty-content", "item"));
        }
        self.check_monotone(&item)?;

        self.store.insert_item(&item)?;
        self.bus.emit(BusEvent::ItemAdded {
            at: Utc::now(),
            item_id: item.id,
        });

        // Content analysis. A failed workflow still leaves a usable item:
        // empty analysis, minimal tags.
        let item = match self.analyze(&item).await {
            Ok(()) => self.store.get_item(item.id)?,
            Err(err) => {
                tracing::warn!(item_id = %item.id, error = %err, "content analysis failed");
                let minimal = ContentAnalysis::minimal(
                    item.content_type.as_str(),
                    vec![item.content_type.as_str().to_owned()],
                );
                self.store.update_item_analysis(
                    item.id,
                    &serde_json::to_value(&minimal)?,
                    &minimal.tags,
                )?;
                self.store.get_item(item.id)?
            }
        };
        self.bus.emit(BusEvent::ItemUpdated {
            at: Utc::now(),
            item_id: item.id,
        });

        // Session assignment, then automation on the updated session.
        let session = self.engine.on_new_item(&item).await?;
        self.automation.on_session_update(&session).await;
        Ok(session)
    }

    // ── internals ───────────────────────────────────────────────────

    /// Per-source timestamps may repeat but never regress.
    fn check_monotone(&self, item: &ClipboardItem) -> Result<()> {
        let source = item.source_app.clone().unwrap_or_default();
        let mut last_seen = self.last_seen.lock();
        if let Some(last) = last_seen.get(&source) {
            if item.timestamp < *last {
                return Err(Error::bad_transition(
                    format!("timestamp {}", last.to_rfc3339()),
                    format!("timestamp {}", item.timestamp.to_rfc3339()),
                ));
            }
        }
        last_seen.insert(source, item.timestamp);
        Ok(())
    }

    async fn analyze(&self, item: &ClipboardItem) -> Result<()> {
        let mut initial = WorkflowState::from_pairs([
            ("content", json!(item.content)),
            (
                "context",
                json!({
                    "source_app": item.source_app,
                    "window_title": item.window_title,
                    "surrounding_text": item.surrounding_text,
                }),
            ),
        ]);
        if let Some(shot) = &item.screenshot_path {
            initial.set("screenshotPath", json!(shot));
        }

        let state = self
            .runtime
            .execute(
                CONTENT_ANALYSIS,
                initial,
                ExecOptions {
                    item_id: Some(item.id),
                    ..Default::default()
                },
            )
            .await?;

        let analysis = state
            .get("analysis")
            .cloned()
            .ok_or_else(|| Error::Other("content_analysis produced no analysis".into()))?;
        let tags = state.list_channel("tags");
        self.store.update_item_analysis(item.id, &analysis, &tags)
    }
}
