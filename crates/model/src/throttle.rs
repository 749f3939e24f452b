//! Global in-flight throttle and retry policy for model calls.
//!
//! A single semaphore caps concurrent requests across every workflow;
//! callers over the cap wait rather than fail. Rate-limited and transient
//! failures are retried with exponential backoff and jitter; auth and
//! schema failures propagate immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use fc_domain::config::ModelConfig;
use fc_domain::{Error, Result};

use crate::traits::{AnalyzeRequest, BoxStream, ModelClient, ModelOutput, SearchProgress, UserPart};
use crate::vision_cache::{fingerprint, VisionCache};

/// An analysis result plus the number of attempts it consumed.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub output: ModelOutput,
    pub attempts: u32,
}

/// Policy wrapper around any [`ModelClient`].
pub struct ThrottledClient {
    inner: Arc<dyn ModelClient>,
    semaphore: Arc<Semaphore>,
    config: ModelConfig,
    /// Collapses duplicate screenshot analyses within a research burst.
    vision_cache: VisionCache,
    /// Monotonic nonce folded into the jitter hash so concurrent retries
    /// do not thunder in lockstep.
    nonce: AtomicU64,
}

impl ThrottledClient {
    pub fn new(inner: Arc<dyn ModelClient>, config: ModelConfig) -> Self {
        let permits = config.max_inflight.max(1);
        let vision_cache = VisionCache::new(
            Duration::from_secs(config.vision_cache_ttl_secs),
            config.vision_cache_cap,
        );
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
            vision_cache,
            nonce: AtomicU64::new(0),
        }
    }

    /// Cache key for a vision-bearing request: (image refs, prompt).
    fn vision_key(req: &AnalyzeRequest) -> (String, String) {
        let images: Vec<&str> = req
            .user_parts
            .iter()
            .filter_map(|p| match p {
                UserPart::ImageRef(r) => Some(r.as_str()),
                UserPart::Text(_) => None,
            })
            .collect();
        let image_hash = fingerprint(images.join("\n").as_bytes());
        let prompt_fp = fingerprint(format!("{}\n{}", req.system_prompt, req.text()).as_bytes());
        (image_hash, prompt_fp)
    }

    /// Run an analysis under the global throttle, retrying retryable
    /// failures up to the configured budget. Vision-bearing requests are
    /// served from the vision cache when a fresh duplicate exists.
    pub async fn analyze(&self, req: AnalyzeRequest) -> Result<ModelResponse> {
        if req.has_vision() {
            let (image_hash, prompt_fp) = Self::vision_key(&req);
            if let Some(output) = self.vision_cache.get(&image_hash, &prompt_fp) {
                return Ok(ModelResponse {
                    output,
                    attempts: 0,
                });
            }
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Cancelled)?;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.inner.analyze(req.clone()).await {
                Ok(output) => {
                    if req.has_vision() {
                        let (image_hash, prompt_fp) = Self::vision_key(&req);
                        self.vision_cache.put(image_hash, prompt_fp, output.clone());
                    }
                    return Ok(ModelResponse { output, attempts });
                }
                Err(err) if err.is_retryable() && attempts <= self.config.max_retries => {
                    let delay = self.backoff_delay(attempts);
                    tracing::debug!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(attempts, error = %err, "model call failed");
                    return Err(err);
                }
            }
        }
    }

    /// Open a web-search stream under the global throttle. The permit is
    /// held until the stream is dropped or runs dry.
    pub async fn web_search_stream(&self, query: String) -> BoxStream<'static, SearchProgress> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("model semaphore closed");
        let inner = self.inner.clone();
        Box::pin(async_stream::stream! {
            let _permit = permit;
            let mut stream = inner.web_search_stream(query).await;
            while let Some(step) = futures_util::StreamExt::next(&mut stream).await {
                yield step;
            }
        })
    }

    /// Exponential backoff with symmetric jitter.
    ///
    /// The jitter fraction comes from a hash of (attempt, nonce) rather
    /// than an RNG; the spread only has to break synchronization between
    /// concurrent retry loops.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms.max(1);
        let exp = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(attempt.to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let raw = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
        // Map the hash onto [-jitter, +jitter].
        let unit = (raw as f64 / u64::MAX as f64) * 2.0 - 1.0;
        let factor = 1.0 + unit * self.config.backoff_jitter;

        Duration::from_millis((exp as f64 * factor).max(1.0) as u64)
    }
}
