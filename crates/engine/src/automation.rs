//! External-automation dispatch: threshold- and rate-limited webhook
//! fan-out with retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use fc_domain::bus::Bus;
use fc_domain::config::AutomationConfig;
use fc_domain::event::BusEvent;
use fc_domain::session::{Session, SessionType};
use fc_domain::{Error, Result};
use fc_store::Store;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Narrow interface to the external workflow-executor host.
///
/// Implementations classify failures: 4xx responses are permanent
/// (`WebhookFailed { permanent: true }`), transport errors and 5xx are
/// transient.
#[async_trait::async_trait]
pub trait WebhookClient: Send + Sync {
    async fn post(&self, url: &str, payload: &Value, timeout: Duration) -> Result<()>;
}

/// Production client over HTTP POST of JSON.
pub struct HttpWebhookClient {
    client: reqwest::Client,
}

impl HttpWebhookClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Other(format!("building webhook client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn post(&self, url: &str, payload: &Value, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::WebhookFailed {
                message: e.to_string(),
                permanent: false,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::WebhookFailed {
                message: format!("{url} returned {status}"),
                permanent: status.is_client_error(),
            })
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DISPATCH_MAX_ATTEMPTS: u32 = 3;
const DISPATCH_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Watches session updates and POSTs to the configured webhook once a
/// session type's trigger threshold is reached.
pub struct AutomationDispatcher {
    store: Arc<Store>,
    bus: Bus,
    config: AutomationConfig,
    client: Arc<dyn WebhookClient>,
    last_dispatch: Mutex<HashMap<Uuid, Instant>>,
}

impl AutomationDispatcher {
    pub fn new(
        store: Arc<Store>,
        bus: Bus,
        config: AutomationConfig,
        client: Arc<dyn WebhookClient>,
    ) -> Self {
        Self {
            store,
            bus,
            config,
            client,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate a session update. Dispatch failures are never surfaced to
    /// the caller; the session is unaffected either way.
    pub async fn on_session_update(&self, session: &Session) {
        let Some(rule) = self.config.rules.get(&session.session_type) else {
            return;
        };
        if !rule.enabled {
            return;
        }
        let Some(url) = rule.webhook_url.clone() else {
            return;
        };

        let item_count = match self.store.session_item_count(session.id) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "item count unavailable, skipping dispatch");
                return;
            }
        };
        if item_count < rule.trigger_threshold.max(1) as usize {
            return;
        }

        // Per-session rate limit: claim the slot before the POST so a
        // concurrent update cannot double-send inside the window.
        {
            let mut last = self.last_dispatch.lock();
            if let Some(at) = last.get(&session.id) {
                if at.elapsed() < self.config.rate_limit() {
                    tracing::debug!(session_id = %session.id, "webhook rate limited");
                    return;
                }
            }
            last.insert(session.id, Instant::now());
        }

        let payload = self.payload(session, item_count);
        match self.post_with_retry(&url, &payload).await {
            Ok(()) => {
                tracing::info!(session_id = %session.id, url = %url, "automation dispatched");
                self.bus.emit(BusEvent::AutomationDispatched {
                    at: Utc::now(),
                    session_id: session.id,
                    webhook_url: url,
                });
            }
            Err(err) => {
                tracing::warn!(session_id = %session.id, error = %err, "automation failed");
                self.bus.emit(BusEvent::AutomationFailed {
                    at: Utc::now(),
                    session_id: session.id,
                    error: err.to_string(),
                });
            }
        }
    }

    /// Bit-exact payload keys per the webhook contract.
    fn payload(&self, session: &Session, item_count: usize) -> Value {
        json!({
            "sessionId": session.id.to_string(),
            "sessionType": session.session_type.as_str(),
            "itemCount": item_count,
            "extractedEntities": self.extracted_entities(session),
            "automationTasks": automation_tasks(session.session_type),
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    fn extracted_entities(&self, session: &Session) -> Value {
        let entities = session
            .intent_analysis
            .as_ref()
            .and_then(|v| v.get("relationships"))
            .and_then(|v| v.get("entities"))
            .cloned()
            .unwrap_or(json!([]));
        json!({ session.session_type.as_str(): entities })
    }

    async fn post_with_retry(&self, url: &str, payload: &Value) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .client
                .post(url, payload, self.config.request_timeout())
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < DISPATCH_MAX_ATTEMPTS => {
                    let delay = DISPATCH_BACKOFF_BASE * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(attempt, error = %err, "webhook retry");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn automation_tasks(session_type: SessionType) -> Vec<&'static str> {
    match session_type {
        SessionType::HotelResearch => vec!["create_comparison_document", "check_availability"],
        SessionType::RestaurantResearch => vec!["create_comparison_document", "check_reservations"],
        SessionType::ProductResearch => vec!["create_comparison_document", "track_prices"],
        SessionType::TravelResearch => vec!["build_itinerary"],
        SessionType::AcademicResearch => vec!["collect_citations"],
        SessionType::ServiceResearch => vec!["request_quotes"],
        SessionType::GeneralResearch => vec!["summarize_findings"],
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recording webhook client for tests: captures payloads and can be
/// scripted to fail.
#[derive(Default)]
pub struct RecordingWebhookClient {
    pub posts: Mutex<Vec<(String, Value)>>,
    failures: Mutex<Vec<Error>>,
}

impl RecordingWebhookClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_failure(&self, error: Error) {
        self.failures.lock().push(error);
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }
}

#[async_trait::async_trait]
impl WebhookClient for RecordingWebhookClient {
    async fn post(&self, url: &str, payload: &Value, _timeout: Duration) -> Result<()> {
        if let Some(err) = self.failures.lock().pop() {
            return Err(err);
        }
        self.posts.lock().push((url.to_owned(), payload.clone()));
        Ok(())
    }
}
