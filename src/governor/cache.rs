use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::clock::Clock;
use crate::error::AppResult;
use crate::models::RecommendationProfile;

/// Semantic identity of a logical call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendation {
        age: u8,
        interests: String,
        mood: String,
        style: String,
        content_type: String,
    },
    /// SHA-256 hex digest of the image bytes
    Vision(String),
    /// Catalog identifier of the subject
    Profile(u64),
}

impl CacheKey {
    pub fn recommendation(profile: &RecommendationProfile) -> Self {
        CacheKey::Recommendation {
            age: profile.age,
            interests: normalize(&profile.interests),
            mood: normalize(&profile.mood),
            style: normalize(&profile.style),
            content_type: profile.content_type.to_string(),
        }
    }

    pub fn vision(image_bytes: &[u8]) -> Self {
        CacheKey::Vision(fingerprint(image_bytes))
    }

    pub fn profile(subject_id: u64) -> Self {
        CacheKey::Profile(subject_id)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendation {
                age,
                interests,
                mood,
                style,
                content_type,
            } => {
                let mut hasher = Sha256::new();
                hasher.update([*age]);
                for field in [content_type, mood, style, interests] {
                    // Length prefix keeps "a:b"+"c" apart from "a"+"b:c"
                    hasher.update((field.len() as u64).to_le_bytes());
                    hasher.update(field.as_bytes());
                }
                write!(f, "rec:{}:{}", content_type, hex::encode(hasher.finalize()))
            }
            CacheKey::Vision(digest) => write!(f, "vision:{}", digest),
            CacheKey::Profile(id) => write!(f, "profile:{}", id),
        }
    }
}

/// Trims, lower-cases and collapses inner whitespace
fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable content fingerprint for cache keys
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Memoized results of logical calls.
///
/// Implementations treat expired entries as misses. Errors are reported so
/// callers can log them, but a failing cache must never fail a logical call.
#[async_trait::async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<JsonValue>>;

    async fn put(&self, key: &CacheKey, value: JsonValue, ttl: Duration) -> AppResult<()>;

    async fn evict(&self, key: &CacheKey) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: JsonValue,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }
}

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Process-local cache.
///
/// Expiry is checked lazily on read. Once the map reaches `max_entries`, a
/// `put` of a new key first sweeps expired entries and then drops the oldest
/// ones, so one-off keys cannot grow the map without bound.
pub struct InMemoryResultCache {
    clock: Arc<dyn Clock>,
    max_entries: usize,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryResultCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_max_entries(clock, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            clock,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<JsonValue>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_valid_at(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check: another writer may have refreshed the entry in between
        if entries.get(key).is_some_and(|e| !e.is_valid_at(now)) {
            entries.remove(key);
            tracing::debug!(key = %key, "Evicted expired cache entry");
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: JsonValue, ttl: Duration) -> AppResult<()> {
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            created_at: now,
            ttl,
        };

        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let before = entries.len();
            entries.retain(|_, e| e.is_valid_at(now));

            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                    }
                    None => break,
                }
            }

            tracing::debug!(
                removed = before - entries.len(),
                max_entries = self.max_entries,
                "Swept result cache"
            );
        }
        entries.insert(key.clone(), entry);
        drop(entries);

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached result");
        Ok(())
    }

    async fn evict(&self, key: &CacheKey) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
