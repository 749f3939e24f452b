//! Narrow capability surface over an LLM with text + vision + web-search
//! tools, plus the policy layers the core hangs on it: a global in-flight
//! throttle with retry, a short-TTL vision cache, and the single
//! parse-or-fallback boundary that turns raw model JSON into validated
//! records.

pub mod parse;
pub mod testing;
pub mod throttle;
pub mod traits;
pub mod vision_cache;

pub use throttle::{ModelResponse, ThrottledClient};
pub use traits::{
    AnalyzeRequest, BoxStream, ModelClient, ModelOutput, SearchProgress, SearchStatus, UserPart,
};
pub use vision_cache::VisionCache;
