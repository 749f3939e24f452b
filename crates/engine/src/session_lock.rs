//! Per-session concurrency control.
//!
//! Mutating operations on one session are serialized; operations on
//! different sessions run in parallel. Each session id maps to a
//! `Semaphore(1)` whose permit is held for the duration of the operation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

pub struct SessionLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a session, waiting until the current holder
    /// releases it. The permit auto-releases on drop.
    pub async fn acquire(&self, session_id: Uuid) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.expect("session lock closed")
    }

    /// Drop locks nobody currently holds.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| sem.available_permits() == 0);
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_session_serializes() {
        let map = Arc::new(SessionLockMap::new());
        let id = Uuid::new_v4();

        let permit = map.acquire(id).await;
        let map2 = map.clone();
        let waiter = tokio::spawn(async move {
            let _p = map2.acquire(id).await;
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn different_sessions_run_in_parallel() {
        let map = SessionLockMap::new();
        let p1 = map.acquire(Uuid::new_v4()).await;
        let p2 = map.acquire(Uuid::new_v4()).await;
        assert_eq!(map.tracked(), 2);
        drop(p1);
        drop(p2);
        map.prune_idle();
        assert_eq!(map.tracked(), 0);
    }
}
