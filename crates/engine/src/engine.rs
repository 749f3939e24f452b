//! The session lifecycle engine.
//!
//! `on_new_item` runs type detection, searches for a joinable session,
//! evaluates membership candidate-by-candidate, and either appends the
//! item (activating the session on its second member) or creates a fresh
//! inactive session. Active sessions get research scheduled behind the
//! configured debounce.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use fc_domain::bus::Bus;
use fc_domain::config::SessionConfig;
use fc_domain::event::BusEvent;
use fc_domain::item::ClipboardItem;
use fc_domain::research::SessionDecision;
use fc_domain::session::{Session, SessionStatus};
use fc_domain::Result;
use fc_store::Store;
use fc_workflow::catalog::{session_management, SESSION_MANAGEMENT};
use fc_workflow::{ExecOptions, WorkflowRuntime, WorkflowState};

use crate::label;
use crate::membership;
use crate::research::SessionResearcher;
use crate::session_lock::SessionLockMap;

pub struct SessionEngine {
    store: Arc<Store>,
    runtime: Arc<WorkflowRuntime>,
    bus: Bus,
    config: SessionConfig,
    locks: SessionLockMap,
    researcher: Arc<SessionResearcher>,
}

impl SessionEngine {
    pub fn new(
        store: Arc<Store>,
        runtime: Arc<WorkflowRuntime>,
        bus: Bus,
        config: SessionConfig,
        researcher: Arc<SessionResearcher>,
    ) -> Self {
        Self {
            store,
            runtime,
            bus,
            config,
            locks: SessionLockMap::new(),
            researcher,
        }
    }

    pub fn researcher(&self) -> &Arc<SessionResearcher> {
        &self.researcher
    }

    /// Assign a freshly analyzed item to a session.
    pub async fn on_new_item(&self, item: &ClipboardItem) -> Result<Session> {
        // Step 1 — type detection on the item alone.
        let detected = self.run_session_management(item, None).await?;
        tracing::debug!(
            item_id = %item.id,
            session_type = %detected.session_type,
            confidence = detected.relationships.confidence,
            "session type detected"
        );

        // Step 2 — candidate search, hard-filtered by type compatibility.
        // Incompatible candidates are rejected without consulting the
        // model (their membership confidence is zero by rule).
        let candidates: Vec<Session> = self
            .store
            .find_session_candidates(item.timestamp, self.config.join_window())?
            .into_iter()
            .filter(|s| membership::compatible(&self.config, detected.session_type, s.session_type))
            .collect();

        // Step 3 — membership evaluation, most recent candidate first.
        for candidate in candidates {
            let _lock = self.locks.acquire(candidate.id).await;
            // Re-read under the lock: the sweeper may have expired it.
            let candidate = self.store.get_session(candidate.id)?;
            if !matches!(
                candidate.status,
                SessionStatus::Active | SessionStatus::Inactive
            ) {
                continue;
            }

            let decision = self
                .run_session_management(item, Some(self.candidate_context(&candidate)?))
                .await?;
            if decision.belongs_to_session && decision.confidence >= self.config.join_min_confidence
            {
                return self.join(item, &candidate, &decision).await;
            }
        }

        // Step 4 — no match: a new inactive session with this item alone.
        self.create(item, &detected)
    }

    /// Cancel any in-flight or pending research for a session.
    pub fn cancel_research(&self, session_id: uuid::Uuid) {
        self.researcher.cancel(session_id);
    }

    // ── internals ───────────────────────────────────────────────────

    async fn run_session_management(
        &self,
        item: &ClipboardItem,
        candidate_context: Option<String>,
    ) -> Result<SessionDecision> {
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
        if let Some(candidate) = candidate_context {
            initial.set("candidateContext", json!(candidate));
        }

        let state = self
            .runtime
            .execute(
                SESSION_MANAGEMENT,
                initial,
                ExecOptions {
                    item_id: Some(item.id),
                    ..Default::default()
                },
            )
            .await?;
        session_management::decision_from_state(&state)
    }

    fn candidate_context(&self, session: &Session) -> Result<String> {
        let members = self.store.get_session_members_ordered(session.id)?;
        let mut lines = vec![
            format!("Type: {}", session.session_type.as_str()),
            format!("Label: {}", session.session_label),
            "Members:".to_owned(),
        ];
        for member in &members {
            let item = self.store.get_item(member.clipboard_item_id)?;
            lines.push(format!("- {}", item.content));
        }
        Ok(lines.join("\n"))
    }

    async fn join(
        &self,
        item: &ClipboardItem,
        candidate: &Session,
        decision: &SessionDecision,
    ) -> Result<Session> {
        let count = self.store.add_session_member(candidate.id, item.id)?;
        self.store.update_session_analysis(
            candidate.id,
            None,
            Some(&intent_payload(decision)),
        )?;
        self.maybe_relabel(candidate)?;

        if count >= 2 && candidate.status == SessionStatus::Inactive {
            self.store
                .update_session_status(candidate.id, SessionStatus::Active)?;
            tracing::info!(session_id = %candidate.id, "session activated");
        }

        let session = self.store.get_session(candidate.id)?;
        self.bus.emit(BusEvent::SessionUpdated {
            at: Utc::now(),
            session_id: session.id,
            status: session.status,
            item_count: count,
        });

        // Step 5 — active sessions research after every member addition,
        // debounced.
        if session.status == SessionStatus::Active {
            self.researcher.schedule(session.id);
        }
        Ok(session)
    }

    fn create(&self, item: &ClipboardItem, decision: &SessionDecision) -> Result<Session> {
        let label = label::derive(decision.session_type, &[item.content.clone()]);
        let session = Session::new(decision.session_type, label, item.timestamp);
        self.store.create_session(&session)?;
        self.store.add_session_member(session.id, item.id)?;
        self.store
            .update_session_analysis(session.id, None, Some(&intent_payload(decision)))?;

        tracing::info!(
            session_id = %session.id,
            session_type = %session.session_type,
            "session created"
        );
        self.bus.emit(BusEvent::SessionCreated {
            at: Utc::now(),
            session_id: session.id,
            session_type: session.session_type,
        });
        self.store.get_session(session.id)
    }

    /// Upgrade an unqualified label once members yield a better one.
    fn maybe_relabel(&self, session: &Session) -> Result<()> {
        let members = self.store.get_session_members_ordered(session.id)?;
        let mut contents = Vec::with_capacity(members.len());
        for member in &members {
            contents.push(self.store.get_item(member.clipboard_item_id)?.content);
        }
        let derived = label::derive(session.session_type, &contents);
        if label::should_relabel(&session.session_label, &derived) {
            self.store.update_session_label(session.id, &derived)?;
        }
        Ok(())
    }
}

/// The intent analysis persisted on a session: the model's intent record
/// plus the latest entity relationships (the consolidator reads these).
fn intent_payload(decision: &SessionDecision) -> serde_json::Value {
    json!({
        "intent": decision.intent_analysis,
        "relationships": decision.relationships,
    })
}
