//! Workflow execution: the sequential node loop, task recording, and
//! lifecycle events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use fc_domain::bus::Bus;
use fc_domain::event::BusEvent;
use fc_domain::task::{AiTask, TaskStatus, WorkflowResult};
use fc_domain::{Error, Result};
use fc_model::ThrottledClient;
use fc_store::Store;

use crate::cache::NodeCache;
use crate::cancel::CancelToken;
use crate::graph::{NodeCtx, Workflow};
use crate::progress::ProgressSink;
use crate::state::WorkflowState;
use crate::END;

struct Registered {
    workflow: Arc<Workflow>,
    /// Scoped cache shared by all executions of this workflow.
    cache: Arc<NodeCache>,
}

/// Options for one execution.
#[derive(Default)]
pub struct ExecOptions {
    /// When set, an `AiTask` row is recorded for this item and a
    /// `WorkflowResult` row is written on success.
    pub item_id: Option<Uuid>,
    pub progress: Option<ProgressSink>,
    pub cancel: Option<CancelToken>,
}

/// Executes registered workflows. Any number of executions may run in
/// parallel; within one execution nodes run sequentially on one logical
/// task.
pub struct WorkflowRuntime {
    model: Arc<ThrottledClient>,
    store: Arc<Store>,
    bus: Bus,
    workflows: RwLock<HashMap<&'static str, Registered>>,
}

impl WorkflowRuntime {
    pub fn new(model: Arc<ThrottledClient>, store: Arc<Store>, bus: Bus) -> Self {
        Self {
            model,
            store,
            bus,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> Arc<ThrottledClient> {
        self.model.clone()
    }

    /// Register a workflow, validating its graph.
    pub fn register(&self, workflow: Workflow) -> Result<()> {
        workflow.validate()?;
        let name = workflow.name();
        self.workflows.write().insert(
            name,
            Registered {
                workflow: Arc::new(workflow),
                cache: Arc::new(NodeCache::new()),
            },
        );
        tracing::debug!(workflow = name, "workflow registered");
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.workflows.read().contains_key(name)
    }

    /// Execute a workflow to its sink and return the final state.
    pub async fn execute(
        &self,
        name: &str,
        initial: WorkflowState,
        opts: ExecOptions,
    ) -> Result<WorkflowState> {
        let (workflow, cache) = {
            let registry = self.workflows.read();
            let entry = registry
                .get(name)
                .ok_or_else(|| Error::NotFound(format!("workflow {name}")))?;
            (entry.workflow.clone(), entry.cache.clone())
        };

        let cancel = opts.cancel.unwrap_or_default();
        let ctx = NodeCtx::new(self.model.clone(), cache, opts.progress, cancel.clone());

        let mut task = opts.item_id.map(|item_id| AiTask::new(item_id, name));
        if let Some(task) = &mut task {
            self.store.upsert_task(task)?;
            task.status = TaskStatus::Running;
            self.store.upsert_task(task)?;
        }

        self.bus.emit(BusEvent::WorkflowStarted {
            at: Utc::now(),
            workflow: name.to_owned(),
            item_id: opts.item_id,
        });

        match self.run_nodes(&workflow, &ctx, initial).await {
            Ok(state) => {
                if let Some(task) = &mut task {
                    task.status = TaskStatus::Completed;
                    task.attempts = ctx.total_attempts();
                    task.result = Some(state.to_value());
                    task.completed_at = Some(Utc::now());
                    self.store.upsert_task(task)?;

                    self.store.insert_workflow_result(&WorkflowResult {
                        id: Uuid::new_v4(),
                        clipboard_item_id: task.clipboard_item_id,
                        workflow_type: name.to_owned(),
                        executed_at: Utc::now(),
                        payload: state.to_value(),
                        confidence: state.f64_channel("confidence"),
                    })?;
                }
                self.bus.emit(BusEvent::WorkflowCompleted {
                    at: Utc::now(),
                    workflow: name.to_owned(),
                    ok: true,
                });
                Ok(state)
            }
            Err(err) => {
                let reason = if err.is_cancelled() {
                    "cancelled".to_owned()
                } else {
                    err.to_string()
                };
                if let Some(task) = &mut task {
                    task.status = TaskStatus::Failed;
                    task.attempts = ctx.total_attempts();
                    task.error = Some(reason.clone());
                    task.completed_at = Some(Utc::now());
                    // A store failure here must not mask the node error.
                    if let Err(store_err) = self.store.upsert_task(task) {
                        tracing::error!(error = %store_err, "failed to record failed task");
                    }
                }
                self.bus.emit(BusEvent::WorkflowFailed {
                    at: Utc::now(),
                    workflow: name.to_owned(),
                    error: reason,
                });
                Err(err)
            }
        }
    }

    async fn run_nodes(
        &self,
        workflow: &Workflow,
        ctx: &NodeCtx,
        mut state: WorkflowState,
    ) -> Result<WorkflowState> {
        let mut current = workflow.start().to_owned();
        loop {
            ctx.cancel.check()?;
            let node = workflow
                .node(&current)
                .ok_or_else(|| Error::Other(format!("node {current:?} missing at runtime")))?;

            let started = Instant::now();
            let outcome = node
                .run(ctx, &state)
                .await
                .map_err(|err| match err {
                    // Preserve cancellation; wrap everything else with the
                    // failing node for diagnostics.
                    Error::Cancelled => Error::Cancelled,
                    other => Error::WorkflowNodeFailed {
                        node: current.clone(),
                        cause: other.to_string(),
                    },
                })?;

            self.bus.emit(BusEvent::WorkflowNodeCompleted {
                at: Utc::now(),
                workflow: workflow.name().to_owned(),
                node: current.clone(),
                ms: started.elapsed().as_millis() as u64,
            });

            let route = outcome.route.clone();
            state.merge(outcome.patch);

            let next = workflow.next(&current, route.as_deref());
            if next == END {
                return Ok(state);
            }
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeOutcome};
    use crate::state::Patch;
    use fc_domain::config::ModelConfig;
    use fc_domain::item::{CaptureContext, ClipboardItem};
    use fc_model::testing::ScriptedClient;
    use serde_json::json;

    struct SetChannel {
        name: &'static str,
        channel: &'static str,
        value: serde_json::Value,
        route: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl Node for SetChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _ctx: &NodeCtx, _state: &WorkflowState) -> Result<NodeOutcome> {
            let patch = Patch::new().set(self.channel, self.value.clone());
            Ok(match self.route {
                Some(route) => NodeOutcome::routed(patch, route),
                None => NodeOutcome::patch(patch),
            })
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Node for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _ctx: &NodeCtx, _state: &WorkflowState) -> Result<NodeOutcome> {
            Err(Error::ModelSchema("broken".into()))
        }
    }

    fn runtime() -> (WorkflowRuntime, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let model = Arc::new(ThrottledClient::new(
            Arc::new(ScriptedClient::new()),
            ModelConfig::default(),
        ));
        (
            WorkflowRuntime::new(model, store.clone(), Bus::new()),
            store,
        )
    }

    fn two_step() -> Workflow {
        Workflow::new("two_step", "first")
            .add_node(Arc::new(SetChannel {
                name: "first",
                channel: "a",
                value: json!(1),
                route: None,
            }))
            .add_node(Arc::new(SetChannel {
                name: "second",
                channel: "b",
                value: json!(2),
                route: None,
            }))
            .edge_to("first", "second")
            .edge_to("second", END)
    }

    #[tokio::test]
    async fn executes_to_sink_and_merges_patches() {
        let (rt, _) = runtime();
        rt.register(two_step()).unwrap();

        let state = rt
            .execute("two_step", WorkflowState::new(), ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(state.f64_channel("a"), Some(1.0));
        assert_eq!(state.f64_channel("b"), Some(2.0));
    }

    #[tokio::test]
    async fn conditional_route_taken() {
        let (rt, _) = runtime();
        let wf = Workflow::new("routed", "gate")
            .add_node(Arc::new(SetChannel {
                name: "gate",
                channel: "q",
                value: json!(0.5),
                route: Some("refine"),
            }))
            .add_node(Arc::new(SetChannel {
                name: "refiner",
                channel: "refined",
                value: json!(true),
                route: None,
            }))
            .conditional("gate", [("refine", "refiner")], END)
            .edge_to("refiner", END);
        rt.register(wf).unwrap();

        let state = rt
            .execute("routed", WorkflowState::new(), ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(state.bool_channel("refined"), Some(true));
    }

    #[tokio::test]
    async fn records_task_and_result_rows() {
        let (rt, store) = runtime();
        rt.register(two_step()).unwrap();

        let item = ClipboardItem::new("x".into(), CaptureContext::default());
        store.insert_item(&item).unwrap();

        rt.execute(
            "two_step",
            WorkflowState::new(),
            ExecOptions {
                item_id: Some(item.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let tasks = store.list_tasks(item.id).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Completed);

        let results = store.list_workflow_results(item.id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].workflow_type, "two_step");
    }

    #[tokio::test]
    async fn node_failure_marks_task_failed_and_emits() {
        let (rt, store) = runtime();
        let bus = rt.bus.clone();
        let mut rx = bus.subscribe();

        rt.register(
            Workflow::new("doomed", "failing")
                .add_node(Arc::new(Failing))
                .edge_to("failing", END),
        )
        .unwrap();

        let item = ClipboardItem::new("x".into(), CaptureContext::default());
        store.insert_item(&item).unwrap();

        let err = rt
            .execute(
                "doomed",
                WorkflowState::new(),
                ExecOptions {
                    item_id: Some(item.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkflowNodeFailed { .. }));

        let tasks = store.list_tasks(item.id).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);

        let mut saw_failed = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, BusEvent::WorkflowFailed { .. }) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn cancelled_execution_fails_task_with_reason() {
        let (rt, store) = runtime();
        rt.register(two_step()).unwrap();

        let item = ClipboardItem::new("x".into(), CaptureContext::default());
        store.insert_item(&item).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = rt
            .execute(
                "two_step",
                WorkflowState::new(),
                ExecOptions {
                    item_id: Some(item.id),
                    cancel: Some(cancel),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let tasks = store.list_tasks(item.id).unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(tasks[0].error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let (rt, _) = runtime();
        let err = rt
            .execute("ghost", WorkflowState::new(), ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
