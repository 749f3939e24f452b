//! The session research pipeline.
//!
//! Per active session: generate queries per member, research every
//! (member, query) pair under the per-session in-flight cap, then
//! consolidate per entity and persist the summary. Progress flows through
//! one bounded channel per run, so phase ordering is strict; producers
//! block on backpressure rather than drop.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use fc_domain::bus::Bus;
use fc_domain::config::SessionConfig;
use fc_domain::event::{BusEvent, ResearchPhase, ResearchProgress};
use fc_domain::item::ClipboardItem;
use fc_domain::research::{ConsolidatedResearch, EntityRelationships, Source};
use fc_domain::session::{Session, SessionStatus};
use fc_domain::{Error, Result};
use fc_store::Store;
use fc_workflow::catalog::{RESEARCH, RESEARCH_QUERY_GENERATION};
use fc_workflow::progress::PROGRESS_CAPACITY;
use fc_workflow::{CancelToken, ExecOptions, ProgressSink, WorkflowRuntime, WorkflowState};

use crate::cancel::ResearchCancelMap;
use crate::consolidate::{quality_label, EntityResearch, ResearchConsolidator};

pub struct SessionResearcher {
    store: Arc<Store>,
    runtime: Arc<WorkflowRuntime>,
    bus: Bus,
    config: SessionConfig,
    consolidator: ResearchConsolidator,
    cancels: ResearchCancelMap,
    pending: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl SessionResearcher {
    pub fn new(
        store: Arc<Store>,
        runtime: Arc<WorkflowRuntime>,
        bus: Bus,
        config: SessionConfig,
    ) -> Self {
        let consolidator = ResearchConsolidator::new(runtime.clone());
        Self {
            store,
            runtime,
            bus,
            config,
            consolidator,
            cancels: ResearchCancelMap::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule research behind the debounce window. A re-schedule while
    /// pending resets the timer (trailing edge wins).
    pub fn schedule(self: &Arc<Self>, session_id: Uuid) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.remove(&session_id) {
            handle.abort();
        }
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.config.research_debounce()).await;
            this.pending.lock().remove(&session_id);
            if let Err(err) = this.run_now(session_id).await {
                tracing::warn!(session_id = %session_id, error = %err, "session research failed");
            }
        });
        pending.insert(session_id, handle);
    }

    /// Cancel pending and in-flight research for a session.
    pub fn cancel(&self, session_id: Uuid) {
        if let Some(handle) = self.pending.lock().remove(&session_id) {
            handle.abort();
        }
        self.cancels.cancel(session_id);
    }

    /// Run the research pipeline to completion (bypassing the debounce).
    pub async fn run_now(self: &Arc<Self>, session_id: Uuid) -> Result<()> {
        let session = self.store.get_session(session_id)?;
        if session.status != SessionStatus::Active {
            tracing::debug!(session_id = %session_id, status = %session.status,
                "skipping research for non-active session");
            return Ok(());
        }

        let token = self.cancels.register(session_id);
        let (sink, rx) = ProgressSink::channel(PROGRESS_CAPACITY);
        let forwarder = tokio::spawn(forward_to_bus(rx, self.bus.clone(), session_id));

        self.bus.emit(BusEvent::ResearchStarted {
            at: Utc::now(),
            session_id,
        });

        let outcome = self.pipeline(&session, &token, &sink).await;
        match &outcome {
            Ok(_) => sink.send_phase(ResearchPhase::Completed).await,
            Err(_) => sink.send_phase(ResearchPhase::Failed).await,
        }
        drop(sink);
        let _ = forwarder.await;
        self.cancels.remove(session_id, &token);

        match outcome {
            Ok(consolidated) => {
                let core = consolidated.core();
                self.bus.emit(BusEvent::ResearchCompleted {
                    at: Utc::now(),
                    session_id,
                    findings_count: core.key_findings.len(),
                    total_sources: core.sources.len(),
                    research_quality: quality_label(core.confidence).to_owned(),
                });
                Ok(())
            }
            Err(err) => {
                let reason = if err.is_cancelled() {
                    "cancelled".to_owned()
                } else {
                    err.to_string()
                };
                self.bus.emit(BusEvent::ResearchFailed {
                    at: Utc::now(),
                    session_id,
                    reason,
                });
                if err.is_cancelled() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    // ── pipeline ────────────────────────────────────────────────────

    async fn pipeline(
        self: &Arc<Self>,
        session: &Session,
        token: &CancelToken,
        sink: &ProgressSink,
    ) -> Result<ConsolidatedResearch> {
        sink.send_phase(ResearchPhase::Initializing).await;

        let members = self.store.get_session_members_ordered(session.id)?;
        let mut items = Vec::with_capacity(members.len());
        for member in &members {
            items.push(self.store.get_item(member.clipboard_item_id)?);
        }

        // Queries per member, sequential.
        let mut pairs: Vec<(usize, String)> = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            token.check()?;
            let state = self
                .runtime
                .execute(
                    RESEARCH_QUERY_GENERATION,
                    WorkflowState::from_pairs([
                        ("content", json!(item.content)),
                        ("tags", json!(item.tags)),
                        ("sessionType", json!(session.session_type.as_str())),
                    ]),
                    ExecOptions {
                        cancel: Some(token.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            for query in state.list_channel("entryQueries") {
                pairs.push((idx, query));
            }
        }

        sink.send(ResearchProgress {
            phase: Some(ResearchPhase::QueriesGenerated),
            total_queries: Some(pairs.len()),
            ..Default::default()
        })
        .await;

        // Research every (member, query) pair under the in-flight cap.
        let total_queries = pairs.len();
        let mut per_member: HashMap<usize, Vec<(String, WorkflowState)>> = HashMap::new();
        {
            let futures = pairs.into_iter().map(|(idx, query)| {
                let runtime = self.runtime.clone();
                let sink = sink.clone();
                let token = token.clone();
                let aspect = items[idx].content.clone();
                async move {
                    let result =
                        research_one_query(&runtime, &sink, &token, &aspect, &query, total_queries)
                            .await;
                    (idx, query, result)
                }
            });
            let mut buffered =
                stream::iter(futures).buffer_unordered(self.config.research_max_inflight.max(1));
            while let Some((idx, query, result)) = buffered.next().await {
                match result {
                    Ok(state) => per_member.entry(idx).or_default().push((query, state)),
                    Err(err) if err.is_cancelled() => return Err(Error::Cancelled),
                    Err(err) => {
                        // Partial results: the member simply contributes
                        // fewer findings.
                        tracing::debug!(query = %query, error = %err, "member query failed");
                    }
                }
            }
        }
        token.check()?;

        sink.send_phase(ResearchPhase::Consolidating).await;

        // Aggregate per entity (one entity per member).
        let research: Vec<EntityResearch> = items
            .iter()
            .enumerate()
            .map(|(idx, item)| aggregate_member(item, per_member.remove(&idx).unwrap_or_default()))
            .collect();

        let relationships = session
            .intent_analysis
            .as_ref()
            .and_then(|v| v.get("relationships"))
            .cloned()
            .and_then(|v| serde_json::from_value::<EntityRelationships>(v).ok())
            .unwrap_or_default();

        let consolidated = self
            .consolidator
            .consolidate(session.session_type, &research, &relationships)
            .await;

        // A cancellation observed before persistence means no partial
        // summary reaches the store.
        token.check()?;
        self.store.update_session_analysis(
            session.id,
            Some(&serde_json::to_value(&consolidated)?),
            None,
        )?;

        Ok(consolidated)
    }
}

/// Run the research workflow for one pre-chosen query, enriching its
/// progress events with session-level fields before they reach the
/// shared sink.
async fn research_one_query(
    runtime: &WorkflowRuntime,
    sink: &ProgressSink,
    token: &CancelToken,
    aspect: &str,
    query: &str,
    total_queries: usize,
) -> Result<WorkflowState> {
    let (sub_sink, mut sub_rx) = ProgressSink::channel(8);
    let session_sink = sink.clone();
    let current_query = query.to_owned();
    let current_aspect = aspect.to_owned();
    let enrich = tokio::spawn(async move {
        while let Some(mut progress) = sub_rx.recv().await {
            progress.phase = Some(ResearchPhase::Searching);
            progress.current_query = Some(current_query.clone());
            progress.current_aspect = Some(current_aspect.clone());
            progress.total_queries = Some(total_queries);
            session_sink.send(progress).await;
        }
    });

    let result = runtime
        .execute(
            RESEARCH,
            WorkflowState::from_pairs([
                ("content", json!(query)),
                ("researchQueries", json!([query])),
            ]),
            ExecOptions {
                progress: Some(sub_sink),
                cancel: Some(token.clone()),
                ..Default::default()
            },
        )
        .await;

    let _ = enrich.await;
    result
}

fn aggregate_member(item: &ClipboardItem, runs: Vec<(String, WorkflowState)>) -> EntityResearch {
    let mut findings = Vec::new();
    let mut sources: Vec<Source> = Vec::new();
    let mut summaries = Vec::new();
    for (query, state) in runs {
        let key_findings = state.list_channel("keyFindings");
        summaries.push(format!("{query}: {} findings", key_findings.len()));
        findings.extend(key_findings);
        if let Some(raw) = state.get("sources") {
            if let Ok(mut parsed) = serde_json::from_value::<Vec<Source>>(raw.clone()) {
                sources.append(&mut parsed);
            }
        }
    }
    EntityResearch {
        entity: item.content.clone(),
        findings,
        sources: fc_domain::research::dedup_sources(sources),
        summaries,
    }
}

async fn forward_to_bus(
    mut rx: mpsc::Receiver<ResearchProgress>,
    bus: Bus,
    session_id: Uuid,
) {
    while let Some(progress) = rx.recv().await {
        bus.emit(BusEvent::ResearchProgressed {
            at: Utc::now(),
            session_id,
            progress,
        });
    }
}
