//! Cache adapters.
//!
//! Read paths memoize responses under region-prefixed keys (`orders:<id>`,
//! `paginated:<query>`, `products:<id>`); mutations call the core's
//! `CacheInvalidator` port with the region prefix. The cache is read
//! acceleration only — correctness never depends on its contents.

use std::collections::HashMap;
use std::sync::RwLock;

use storefront_orders::CacheInvalidator;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisCacheInvalidator;

/// In-memory cache for tests/dev: JSON values under string keys, invalidated
/// by key prefix.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInvalidator for InMemoryCache {
    fn invalidate(&self, pattern: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|key, _| !key.starts_with(pattern));
        }
    }
}
