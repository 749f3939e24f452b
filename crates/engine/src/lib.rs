//! FlowClip's orchestration core: the session lifecycle engine, the
//! research consolidator, the automation dispatcher, and the capture
//! gateway that drives them — owned together by one [`Core`] record
//! constructed at startup.

use std::sync::Arc;

use fc_domain::bus::Bus;
use fc_domain::config::Config;
use fc_domain::Result;
use fc_model::{ModelClient, ThrottledClient};
use fc_store::Store;
use fc_workflow::{catalog, WorkflowRuntime};

pub mod automation;
pub mod cancel;
pub mod consolidate;
pub mod engine;
pub mod gateway;
pub mod label;
pub mod membership;
pub mod research;
pub mod session_lock;
pub mod sweep;

pub use automation::{AutomationDispatcher, HttpWebhookClient, WebhookClient};
pub use consolidate::{EntityResearch, ResearchConsolidator};
pub use engine::SessionEngine;
pub use gateway::CaptureGateway;
pub use research::SessionResearcher;

/// Owned handles to every core component. No global singletons; embedders
/// construct one `Core` and hand out clones of the `Arc`s they need.
pub struct Core {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub bus: Bus,
    pub model: Arc<ThrottledClient>,
    pub runtime: Arc<WorkflowRuntime>,
    pub engine: Arc<SessionEngine>,
    pub automation: Arc<AutomationDispatcher>,
    pub gateway: Arc<CaptureGateway>,
}

impl Core {
    /// Wire the core together from its external collaborators: an opened
    /// store, a model client, and a webhook client.
    pub fn new(
        config: Config,
        store: Arc<Store>,
        model_client: Arc<dyn ModelClient>,
        webhook_client: Arc<dyn WebhookClient>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let bus = Bus::new();

        let model = Arc::new(ThrottledClient::new(model_client, config.model.clone()));
        let runtime = Arc::new(WorkflowRuntime::new(
            model.clone(),
            store.clone(),
            bus.clone(),
        ));
        catalog::register_all(&runtime)?;

        let researcher = Arc::new(SessionResearcher::new(
            store.clone(),
            runtime.clone(),
            bus.clone(),
            config.session.clone(),
        ));
        let engine = Arc::new(SessionEngine::new(
            store.clone(),
            runtime.clone(),
            bus.clone(),
            config.session.clone(),
            researcher,
        ));
        let automation = Arc::new(AutomationDispatcher::new(
            store.clone(),
            bus.clone(),
            config.automation.clone(),
            webhook_client,
        ));
        let gateway = Arc::new(CaptureGateway::new(
            store.clone(),
            runtime.clone(),
            engine.clone(),
            automation.clone(),
            bus.clone(),
        ));

        Ok(Self {
            config,
            store,
            bus,
            model,
            runtime,
            engine,
            automation,
            gateway,
        })
    }

    /// Start the periodic expiration sweep on the current tokio runtime.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        sweep::spawn_sweeper(
            self.store.clone(),
            self.bus.clone(),
            self.config.session.clone(),
        )
    }
}
