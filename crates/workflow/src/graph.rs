//! Workflow graph definition: nodes, edges, and the per-execution context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use fc_model::{AnalyzeRequest, BoxStream, ModelOutput, SearchProgress, ThrottledClient};

use fc_domain::{Error, Result};

use crate::cache::NodeCache;
use crate::cancel::CancelToken;
use crate::progress::ProgressSink;
use crate::state::{Patch, WorkflowState};
use crate::END;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a node may touch while running.
pub struct NodeCtx {
    model: Arc<ThrottledClient>,
    pub cache: Arc<NodeCache>,
    pub progress: Option<ProgressSink>,
    pub cancel: CancelToken,
    attempts: AtomicU32,
}

impl NodeCtx {
    pub fn new(
        model: Arc<ThrottledClient>,
        cache: Arc<NodeCache>,
        progress: Option<ProgressSink>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            model,
            cache,
            progress,
            cancel,
            attempts: AtomicU32::new(0),
        }
    }

    /// Run a model call under the global throttle, accumulating the
    /// attempt count for the task record. Cancellation is observed on
    /// both sides of the await.
    pub async fn analyze(&self, req: AnalyzeRequest) -> Result<ModelOutput> {
        self.cancel.check()?;
        let resp = self.model.analyze(req).await;
        match resp {
            Ok(resp) => {
                self.attempts.fetch_add(resp.attempts, Ordering::Relaxed);
                self.cancel.check()?;
                Ok(resp.output)
            }
            Err(err) => {
                // Failed calls still consumed the full retry budget.
                self.attempts.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Open a web-search stream under the global throttle.
    pub async fn search(&self, query: String) -> Result<BoxStream<'static, SearchProgress>> {
        self.cancel.check()?;
        Ok(self.model.web_search_stream(query).await)
    }

    /// Forward a progress update when a sink was supplied.
    pub async fn emit_progress(&self, progress: fc_domain::event::ResearchProgress) {
        if let Some(sink) = &self.progress {
            sink.send(progress).await;
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nodes & edges
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one node produced: channel writes plus an optional route key for
/// a conditional edge.
pub struct NodeOutcome {
    pub patch: Patch,
    pub route: Option<String>,
}

impl NodeOutcome {
    pub fn patch(patch: Patch) -> Self {
        Self { patch, route: None }
    }

    pub fn routed(patch: Patch, route: impl Into<String>) -> Self {
        Self {
            patch,
            route: Some(route.into()),
        }
    }
}

/// One async step of a workflow.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &NodeCtx, state: &WorkflowState) -> Result<NodeOutcome>;
}

/// Outgoing edge of a node.
pub enum Edge {
    /// Always continue to the named node (or [`END`]).
    Direct(String),
    /// Route by the key the node emitted; `default` applies when the key
    /// is absent or unknown.
    Conditional {
        routes: HashMap<String, String>,
        default: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow definition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named DAG of nodes with a unique terminal sink ([`END`]).
pub struct Workflow {
    name: &'static str,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    start: String,
}

impl Workflow {
    pub fn new(name: &'static str, start: impl Into<String>) -> Self {
        Self {
            name,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            start: start.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.name().to_owned(), node);
        self
    }

    /// `from` always continues to `to`.
    pub fn edge_to(mut self, from: &str, to: &str) -> Self {
        self.edges.insert(from.to_owned(), Edge::Direct(to.to_owned()));
        self
    }

    /// `from` routes by the node's emitted key.
    pub fn conditional(
        mut self,
        from: &str,
        routes: impl IntoIterator<Item = (&'static str, &'static str)>,
        default: &str,
    ) -> Self {
        self.edges.insert(
            from.to_owned(),
            Edge::Conditional {
                routes: routes
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect(),
                default: default.to_owned(),
            },
        );
        self
    }

    /// Check structural invariants: the start node exists, every edge
    /// leaves a known node, and every target is a known node or the sink.
    pub fn validate(&self) -> Result<()> {
        if !self.nodes.contains_key(&self.start) {
            return Err(Error::Other(format!(
                "workflow {}: unknown start node {:?}",
                self.name, self.start
            )));
        }
        let mut check = |target: &str| -> Result<()> {
            if target != END && !self.nodes.contains_key(target) {
                return Err(Error::Other(format!(
                    "workflow {}: edge to unknown node {:?}",
                    self.name, target
                )));
            }
            Ok(())
        };
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::Other(format!(
                    "workflow {}: edge from unknown node {:?}",
                    self.name, from
                )));
            }
            match edge {
                Edge::Direct(to) => check(to)?,
                Edge::Conditional { routes, default } => {
                    for to in routes.values() {
                        check(to)?;
                    }
                    check(default)?;
                }
            }
        }
        // A node without an outgoing edge implicitly reaches the sink, so
        // a single terminal always exists.
        Ok(())
    }

    /// Resolve the next node after `from` given the route the node emitted.
    pub fn next(&self, from: &str, route: Option<&str>) -> String {
        match self.edges.get(from) {
            None => END.to_owned(),
            Some(Edge::Direct(to)) => to.clone(),
            Some(Edge::Conditional { routes, default }) => route
                .and_then(|key| routes.get(key))
                .unwrap_or(default)
                .clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait::async_trait]
    impl Node for Noop {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, _ctx: &NodeCtx, _state: &WorkflowState) -> Result<NodeOutcome> {
            Ok(NodeOutcome::patch(Patch::new()))
        }
    }

    #[test]
    fn validate_catches_dangling_edges() {
        let wf = Workflow::new("bad", "a")
            .add_node(Arc::new(Noop("a")))
            .edge_to("a", "ghost");
        assert!(wf.validate().is_err());

        let wf = Workflow::new("good", "a")
            .add_node(Arc::new(Noop("a")))
            .edge_to("a", END);
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn conditional_routing_falls_back_to_default() {
        let wf = Workflow::new("w", "a")
            .add_node(Arc::new(Noop("a")))
            .add_node(Arc::new(Noop("b")))
            .conditional("a", [("refine", "b")], END);

        assert_eq!(wf.next("a", Some("refine")), "b");
        assert_eq!(wf.next("a", Some("unknown")), END);
        assert_eq!(wf.next("a", None), END);
        // No edge at all also reaches the sink.
        assert_eq!(wf.next("b", None), END);
    }
}
