//! Registry of research cancellation tokens, one per session.
//!
//! Starting a research run registers a fresh token; cancelling a session
//! cancels the registered token, which every in-flight member-query
//! shares.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use fc_workflow::CancelToken;

#[derive(Default)]
pub struct ResearchCancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl ResearchCancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for a session's research run, cancelling
    /// any run still registered (latest research wins).
    pub fn register(&self, session_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self
            .tokens
            .lock()
            .insert(session_id, token.clone())
        {
            previous.cancel();
        }
        token
    }

    /// Cancel the in-flight research for a session, if any.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.tokens.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Deregister after a run settles. Only removes the token that is
    /// still current (a newer run may have replaced it).
    pub fn remove(&self, session_id: Uuid, token: &CancelToken) {
        let mut tokens = self.tokens.lock();
        if let Some(current) = tokens.get(&session_id) {
            if current.same_as(token) {
                tokens.remove(&session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_cancels_previous_run() {
        let map = ResearchCancelMap::new();
        let id = Uuid::new_v4();
        let first = map.register(id);
        let second = map.register(id);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn cancel_reaches_registered_token() {
        let map = ResearchCancelMap::new();
        let id = Uuid::new_v4();
        let token = map.register(id);
        assert!(map.cancel(id));
        assert!(token.is_cancelled());
        assert!(!map.cancel(Uuid::new_v4()));
    }
}
