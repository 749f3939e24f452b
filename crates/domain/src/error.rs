/// Shared error type used across all FlowClip crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store: {0}")]
    StoreIo(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("model rate limited: {0}")]
    ModelRate(String),

    #[error("model transient: {0}")]
    ModelTransient(String),

    #[error("model auth: {0}")]
    ModelAuth(String),

    #[error("model schema: {0}")]
    ModelSchema(String),

    #[error("web search: {0}")]
    WebSearchFailed(String),

    #[error("workflow node {node}: {cause}")]
    WorkflowNodeFailed { node: String, cause: String },

    #[error("session conflict: {0}")]
    SessionConflict(String),

    #[error("webhook: {message}")]
    WebhookFailed { message: String, permanent: bool },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an `InvalidStateTransition` from displayable endpoints.
    pub fn bad_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Errors that a retry loop may recover from.
    ///
    /// Auth and schema failures are permanent: retrying sends the same bad
    /// request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelRate(_) | Self::ModelTransient(_) | Self::WebSearchFailed(_) => true,
            Self::WebhookFailed { permanent, .. } => !permanent,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
