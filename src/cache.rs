use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::provider::{CompletionError, CompletionProvider};

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    provider: String,
    response: String,
    cached_at: DateTime<Utc>,
}

/// On-disk store of completion responses keyed by prompt text
pub struct CompletionCache {
    db: sled::Db,
    ttl: ChronoDuration,
}

impl CompletionCache {
    /// Open (or create) the cache in `dir`; entries older than `ttl` are ignored
    pub fn open(dir: &Path, ttl: Duration) -> Result<Self> {
        // Create cache directory if it doesn't exist
        std::fs::create_dir_all(dir)?;

        let db = sled::open(dir)?;
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| AssistantError::Cache(format!("Invalid cache TTL: {e}")))?;

        let cache = Self { db, ttl };
        let purged = cache.purge_expired()?;
        if purged > 0 {
            debug!(purged, "Removed expired cache entries");
        }
        Ok(cache)
    }

    /// Remove expired or unreadable entries, returning how many were dropped
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut purged = 0;
        for item in self.db.iter() {
            let (key, data) = item?;
            let expired = bincode::deserialize::<CacheEntry>(&data)
                .map_or(true, |entry| now - entry.cached_at > self.ttl);
            if expired {
                self.db.remove(key)?;
                purged += 1;
            }
        }
        if purged > 0 {
            self.db.flush()?;
        }
        Ok(purged)
    }

    fn make_key(provider: &str, prompt: &str) -> Vec<u8> {
        format!("{provider}:{prompt}").into_bytes()
    }

    /// Cached response for `prompt`, if present and fresh
    pub fn get(&self, provider: &str, prompt: &str) -> Result<Option<String>> {
        let key = Self::make_key(provider, prompt);

        let Some(data) = self.db.get(&key)? else {
            return Ok(None);
        };
        let entry: CacheEntry = bincode::deserialize(&data)?;
        if Utc::now() - entry.cached_at > self.ttl {
            debug!(provider, "Cache entry expired");
            self.db.remove(&key)?;
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    /// Store a response
    pub fn put(&self, provider: &str, prompt: &str, response: &str) -> Result<()> {
        let key = Self::make_key(provider, prompt);

        let entry = CacheEntry {
            provider: provider.to_string(),
            response: response.to_string(),
            cached_at: Utc::now(),
        };

        let data = bincode::serialize(&entry)?;
        self.db.insert(key, data)?;
        self.db.flush()?;

        Ok(())
    }

    /// Number of stored entries, fresh or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// True when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) -> Result<()> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }
}

/// A completion provider that answers repeated prompts from the cache
pub struct CachedCompletion {
    inner: Arc<dyn CompletionProvider>,
    cache: Arc<CompletionCache>,
}

impl CachedCompletion {
    /// Wrap `inner` with `cache`
    pub fn new(inner: Arc<dyn CompletionProvider>, cache: Arc<CompletionCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl CompletionProvider for CachedCompletion {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let provider = self.inner.name();
        match self.cache.get(provider, prompt) {
            Ok(Some(response)) => {
                debug!(provider, "Completion cache hit");
                return Ok(response);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Completion cache read failed"),
        }

        let response = self.inner.complete(prompt).await?;
        if let Err(e) = self.cache.put(provider, prompt, &response) {
            warn!(error = %e, "Completion cache write failed");
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
