//! Cancellation token checked at every workflow suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token shared between a workflow execution and whoever
/// may abort it.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether two handles share the same underlying token.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }

    /// Convenience guard for use with `?`.
    pub fn check(&self) -> fc_domain::Result<()> {
        if self.is_cancelled() {
            Err(fc_domain::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
