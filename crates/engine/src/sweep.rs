//! Periodic session expiration sweep.

use std::sync::Arc;

use chrono::Utc;

use fc_domain::bus::Bus;
use fc_domain::config::SessionConfig;
use fc_domain::event::BusEvent;
use fc_domain::session::SessionStatus;
use fc_domain::Result;
use fc_store::Store;

/// Expire every active or inactive session idle past the timeout.
/// Returns the number of sessions transitioned.
pub fn run_sweep(store: &Store, bus: &Bus, config: &SessionConfig) -> Result<usize> {
    let now = Utc::now();
    let idle = store.idle_sessions(now, config.idle_timeout())?;
    let mut expired = 0;
    for session in idle {
        match store.update_session_status(session.id, SessionStatus::Expired) {
            Ok(()) => {
                expired += 1;
                tracing::info!(session_id = %session.id, "session expired");
                let item_count = store.session_item_count(session.id).unwrap_or(0);
                bus.emit(BusEvent::SessionUpdated {
                    at: Utc::now(),
                    session_id: session.id,
                    status: SessionStatus::Expired,
                    item_count,
                });
            }
            // Lost a race with a concurrent transition; the next sweep
            // settles it.
            Err(err) => {
                tracing::debug!(session_id = %session.id, error = %err, "sweep skipped session")
            }
        }
    }
    Ok(expired)
}

/// Spawn the sweep loop on the current runtime.
pub fn spawn_sweeper(
    store: Arc<Store>,
    bus: Bus,
    config: SessionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = run_sweep(&store, &bus, &config) {
                tracing::warn!(error = %err, "expiration sweep failed");
            }
        }
    })
}
