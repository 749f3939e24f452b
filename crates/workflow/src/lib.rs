//! Workflow graph runtime and the workflow catalog.
//!
//! A workflow is a typed state graph: nodes are async steps over a record
//! of named channels, edges are unconditional or routed by a key the node
//! emits, and execution runs node-by-node on one logical task until the
//! sink is reached. The runtime throttles model calls globally, retries
//! retryable failures, records `AiTask` rows, and broadcasts lifecycle
//! events.

pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod graph;
pub mod progress;
pub mod runtime;
pub mod state;

pub use cache::NodeCache;
pub use cancel::CancelToken;
pub use graph::{Edge, Node, NodeCtx, NodeOutcome, Workflow};
pub use progress::ProgressSink;
pub use runtime::{ExecOptions, WorkflowRuntime};
pub use state::{Patch, WorkflowState};

/// Label every edge may route to in order to finish the workflow.
pub const END: &str = "end";
