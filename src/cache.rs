//! TTL answer cache keyed by hashed input text.
//!
//! Keys are SHA-256 hashed before storage so no raw user text is retained
//! in the cache's key space. Expiry is checked lazily on read;
//! [`AnswerCache::cleanup_expired`] is an explicit maintenance call, never
//! an automatic sweep.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Thread-safe in-memory key-value cache with time-to-live.
pub struct AnswerCache {
    store: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl AnswerCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn hash_key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..32].to_string()
    }

    /// Retrieve a cached value. Returns `None` if missing or expired;
    /// an expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        let hashed = Self::hash_key(key);
        let mut store = self.store.lock().unwrap();
        match store.get(&hashed) {
            None => None,
            Some(entry) if Instant::now() > entry.expires_at => {
                store.remove(&hashed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
        }
    }

    /// Store a value, overwriting any previous entry for the same key.
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let hashed = Self::hash_key(key);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut store = self.store.lock().unwrap();
        store.insert(
            hashed,
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a specific key. Returns true if it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let hashed = Self::hash_key(key);
        self.store.lock().unwrap().remove(&hashed).is_some()
    }

    /// Clear all entries. Returns the count of removed items.
    pub fn clear(&self) -> usize {
        let mut store = self.store.lock().unwrap();
        let count = store.len();
        store.clear();
        count
    }

    /// Current number of (possibly expired) entries.
    pub fn size(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Remove all expired entries. Returns the count of removed items.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock().unwrap();
        let before = store.len();
        store.retain(|_, entry| now <= entry.expires_at);
        before - store.len()
    }
}
