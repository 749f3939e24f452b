//! Scripted in-memory model client for tests.
//!
//! Resolution order per `analyze` call: queued steps (FIFO, including
//! injected failures), then the responder function, then a schema error.
//! Web searches return canned per-query results, or two synthetic sources
//! when a query was not configured.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use fc_domain::research::Source;
use fc_domain::{Error, Result};

use crate::traits::{
    AnalyzeRequest, BoxStream, ModelClient, ModelOutput, SearchProgress, SearchStatus,
};

type Responder = Box<dyn Fn(&AnalyzeRequest) -> Result<ModelOutput> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Result<ModelOutput>>>,
    responder: Mutex<Option<Responder>>,
    search_results: Mutex<HashMap<String, Vec<Source>>>,
    failing_searches: Mutex<Vec<String>>,
    requests: Mutex<Vec<AnalyzeRequest>>,
    latency: Mutex<Option<std::time::Duration>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.steps.lock().push_back(Ok(ModelOutput::Json(value)));
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.steps
            .lock()
            .push_back(Ok(ModelOutput::Text(text.into())));
    }

    pub fn push_failure(&self, error: Error) {
        self.steps.lock().push_back(Err(error));
    }

    /// Fallback used once the queued steps run dry.
    pub fn set_responder(
        &self,
        f: impl Fn(&AnalyzeRequest) -> Result<ModelOutput> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Box::new(f));
    }

    pub fn set_search_results(&self, query: impl Into<String>, results: Vec<Source>) {
        self.search_results.lock().insert(query.into(), results);
    }

    /// Make a specific query emit a `failed` terminal event.
    pub fn fail_search(&self, query: impl Into<String>) {
        self.failing_searches.lock().push(query.into());
    }

    /// Delay every analyze call, so tests can observe in-flight state.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Every analyze request observed, in arrival order.
    pub fn requests(&self) -> Vec<AnalyzeRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn synthetic_results(query: &str) -> Vec<Source> {
        let slug: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        (1..=2)
            .map(|i| Source {
                title: format!("{query} — result {i}"),
                url: format!("https://example.com/{slug}/{i}"),
                snippet: Some(format!("Synthetic finding {i} for {query}")),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedClient {
    async fn analyze(&self, req: AnalyzeRequest) -> Result<ModelOutput> {
        self.requests.lock().push(req.clone());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(step) = self.steps.lock().pop_front() {
            return step;
        }
        if let Some(responder) = self.responder.lock().as_ref() {
            return responder(&req);
        }
        Err(Error::ModelSchema("scripted client exhausted".into()))
    }

    async fn web_search_stream(&self, query: String) -> BoxStream<'static, SearchProgress> {
        let should_fail = self.failing_searches.lock().contains(&query);
        let results = self
            .search_results
            .lock()
            .get(&query)
            .cloned()
            .unwrap_or_else(|| Self::synthetic_results(&query));

        Box::pin(async_stream::stream! {
            yield SearchProgress {
                query: query.clone(),
                status: SearchStatus::Searching,
                results_count: 0,
                results: Vec::new(),
            };
            if should_fail {
                yield SearchProgress {
                    query,
                    status: SearchStatus::Failed,
                    results_count: 0,
                    results: Vec::new(),
                };
            } else {
                yield SearchProgress {
                    query,
                    status: SearchStatus::Completed,
                    results_count: results.len(),
                    results,
                };
            }
        })
    }
}
