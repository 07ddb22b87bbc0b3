//! Shared cache tier.
//!
//! The cached query manager writes every successful refresh through to a
//! [`SharedCache`] so that other processes (and this one, after a restart)
//! can serve a value before their own first refresh completes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{CacheError, Result};

/// Key prefix for cached query values in the shared tier.
pub const QUERY_KEY_PREFIX: &str = "moniker:query:";

/// Returns the shared-tier key for a cached query path.
#[must_use]
pub fn query_key(path: &str) -> String {
    format!("{QUERY_KEY_PREFIX}{path}")
}

/// An external key/value cache shared between processes.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Deletes a value.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`SharedCache`] for single-instance deployments and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySharedCache {
    values: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemorySharedCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err() -> CacheError {
    CacheError::shared_tier("lock poisoned")
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let values = self.values.read().map_err(|_| lock_err())?;
        Ok(values
            .get(key)
            .filter(|stored| Instant::now() < stored.expires_at)
            .map(|stored| stored.data.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut values = self.values.write().map_err(|_| lock_err())?;
        values.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| lock_err())?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire() {
        let cache = MemorySharedCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(5))
            .await
            .expect("set should succeed");
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let cache = MemorySharedCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio_test::assert_ok!(cache.delete("k").await);
        assert_eq!(cache.get("k").await.unwrap(), None);
        // Deleting a missing key is not an error.
        tokio_test::assert_ok!(cache.delete("k").await);
    }

    #[test]
    fn key_format() {
        assert_eq!(query_key("risk.cvar"), "moniker:query:risk.cvar");
    }
}
