//! Caching layer for generative responses.
//!
//! Identical requests (same task, model, messages and schema) are answered
//! from memory. Only responses that passed validation are stored.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use covenant_core::ResponseSchema;

use crate::generation::GenerationTask;
use crate::providers::ChatMessage;

/// Cache key for a generative request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    task: GenerationTask,
    request_hash: u64,
}

impl CacheKey {
    pub fn new(
        task: GenerationTask,
        model: &str,
        messages: &[ChatMessage],
        schema: Option<&ResponseSchema>,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        model.hash(&mut hasher);
        messages.hash(&mut hasher);
        if let Some(schema) = schema {
            schema.name.hash(&mut hasher);
            schema.schema.to_string().hash(&mut hasher);
        }
        Self {
            task,
            request_hash: hasher.finish(),
        }
    }
}

/// Response cache using moka.
pub struct ResponseCache {
    cache: Cache<CacheKey, String>,
}

impl ResponseCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, content: String) {
        self.cache.insert(key, content).await;
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}
