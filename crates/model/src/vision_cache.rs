//! Short-TTL cache for screenshot analysis.
//!
//! A session research burst re-analyzes the same screenshot several times
//! within seconds; this cache collapses those calls. Entries are keyed on
//! (image hash, prompt fingerprint) and expire after the configured TTL,
//! with LRU eviction at the capacity bound.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::traits::ModelOutput;

type Key = (String, String);

struct Entry {
    output: ModelOutput,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct VisionCache {
    entries: Mutex<HashMap<Key, Entry>>,
    ttl: Duration,
    cap: usize,
}

/// Hex SHA-256 of arbitrary bytes — the image and prompt fingerprints.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

impl VisionCache {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            cap: cap.max(1),
        }
    }

    pub fn get(&self, image_hash: &str, prompt_fingerprint: &str) -> Option<ModelOutput> {
        let mut entries = self.entries.lock();
        let key = (image_hash.to_owned(), prompt_fingerprint.to_owned());
        match entries.get_mut(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                entry.last_used = Instant::now();
                Some(entry.output.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, image_hash: String, prompt_fingerprint: String, output: ModelOutput) {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        // Drop expired rows first; they are free evictions.
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);

        if entries.len() >= self.cap {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            (image_hash, prompt_fingerprint),
            Entry {
                output,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(tag: &str) -> ModelOutput {
        ModelOutput::Text(tag.to_string())
    }

    #[test]
    fn hit_within_ttl() {
        let cache = VisionCache::new(Duration::from_secs(120), 128);
        cache.put("img".into(), "prompt".into(), out("cached"));
        assert!(cache.get("img", "prompt").is_some());
        assert!(cache.get("img", "other-prompt").is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = VisionCache::new(Duration::from_millis(0), 128);
        cache.put("img".into(), "prompt".into(), out("cached"));
        assert!(cache.get("img", "prompt").is_none());
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let cache = VisionCache::new(Duration::from_secs(120), 2);
        cache.put("a".into(), "p".into(), out("a"));
        cache.put("b".into(), "p".into(), out("b"));
        // Touch "a" so "b" is the least recently used.
        cache.get("a", "p");
        cache.put("c".into(), "p".into(), out("c"));

        assert!(cache.get("a", "p").is_some());
        assert!(cache.get("b", "p").is_none());
        assert!(cache.get("c", "p").is_some());
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
