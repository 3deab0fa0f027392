//! Redis-backed cache invalidation.
//!
//! Best-effort by contract: connection or command failures are logged and
//! swallowed, never surfaced to the mutation that triggered the eviction.

use redis::Commands;

use storefront_orders::CacheInvalidator;

/// Evicts Redis keys by prefix (`SCAN MATCH <prefix>*` + `DEL`).
pub struct RedisCacheInvalidator {
    client: redis::Client,
}

impl RedisCacheInvalidator {
    pub fn new(url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

impl CacheInvalidator for RedisCacheInvalidator {
    fn invalidate(&self, pattern: &str) {
        let mut conn = match self.client.get_connection() {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(pattern, error = %err, "cache invalidation skipped: no redis connection");
                return;
            }
        };

        let keys: Vec<String> = {
            match conn.scan_match::<_, String>(format!("{pattern}*")) {
                Ok(iter) => iter.collect(),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "cache invalidation scan failed");
                    return;
                }
            }
        };

        if keys.is_empty() {
            return;
        }

        if let Err(err) = conn.del::<_, ()>(&keys) {
            tracing::warn!(pattern, error = %err, "cache invalidation delete failed");
        }
    }
}
