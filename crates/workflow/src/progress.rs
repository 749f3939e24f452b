//! Bounded progress channel handed into workflow executions.
//!
//! Producers block when the consumer falls behind; progress is never
//! silently dropped, which keeps phase sequences gap-free for consumers.

use tokio::sync::mpsc;

use fc_domain::event::{ResearchPhase, ResearchProgress};

/// Default capacity of a per-session progress channel.
pub const PROGRESS_CAPACITY: usize = 64;

/// Sending half of a progress channel.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ResearchProgress>,
}

impl ProgressSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ResearchProgress>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Send one progress update, waiting on backpressure. A closed
    /// receiver means the consumer is gone; the update is discarded.
    pub async fn send(&self, progress: ResearchProgress) {
        if self.tx.send(progress).await.is_err() {
            tracing::trace!("progress receiver dropped");
        }
    }

    pub async fn send_phase(&self, phase: ResearchPhase) {
        self.send(ResearchProgress::phase(phase)).await;
    }
}
