use std::pin::Pin;

use serde::{Deserialize, Serialize};

use fc_domain::research::Source;
use fc_domain::Result;

/// A boxed async stream, used for web-search progress.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / output types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One part of the user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserPart {
    Text(String),
    /// Opaque reference to an on-disk screenshot (never raw bytes).
    ImageRef(String),
}

/// A provider-agnostic analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub system_prompt: String,
    pub user_parts: Vec<UserPart>,
    /// When `true`, ask the model for a single JSON object.
    pub want_json: bool,
    /// When `true`, the provider may ground the answer with web search.
    pub web_search: bool,
}

impl AnalyzeRequest {
    pub fn json(system_prompt: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_parts: vec![UserPart::Text(user.into())],
            want_json: true,
            web_search: false,
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.user_parts.push(UserPart::ImageRef(image_ref.into()));
        self
    }

    /// True when any part references an image.
    pub fn has_vision(&self) -> bool {
        self.user_parts
            .iter()
            .any(|p| matches!(p, UserPart::ImageRef(_)))
    }

    /// Concatenated text parts, used for cache fingerprints.
    pub fn text(&self) -> String {
        self.user_parts
            .iter()
            .filter_map(|p| match p {
                UserPart::Text(t) => Some(t.as_str()),
                UserPart::ImageRef(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What the model returned: a validated JSON object or free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelOutput {
    Json(serde_json::Value),
    Text(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web search progress
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Searching,
    Completed,
    Failed,
}

/// One step of a web-search stream. The sequence for a query is finite
/// (`searching` then a terminal event) and not restartable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    pub query: String,
    pub status: SearchStatus,
    pub results_count: usize,
    /// Populated on the terminal `completed` event.
    #[serde(default)]
    pub results: Vec<Source>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter must implement.
///
/// Failures must be classified into the domain error kinds (`ModelRate`,
/// `ModelTransient`, `ModelAuth`, `ModelSchema`) so the throttle layer can
/// decide what to retry.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one analysis request and wait for the full response.
    async fn analyze(&self, req: AnalyzeRequest) -> Result<ModelOutput>;

    /// Stream the progress of a single web search.
    async fn web_search_stream(&self, query: String) -> BoxStream<'static, SearchProgress>;
}
