//! Cache layer
//!
//! Services cache hot lookups through [`CacheLayer`]. The only driver is the
//! in-process moka cache in [`memory`].
//!
//! ```rust,ignore
//! use scriptorium::cache::{create_cache, CacheLayer};
//! use scriptorium::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("key", &"value", cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations.
///
/// The methods are generic, so the trait is not object safe; services hold a
/// concrete [`Cache`].
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration)
        -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every entry whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// The cache type shared by services
pub type Cache = MemoryCache;

/// Build the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_uses_configured_ttl() {
        let config = CacheConfig {
            ttl_seconds: 42,
            max_capacity: 100,
        };
        let cache = create_cache(&config);

        assert_eq!(cache.default_ttl(), Duration::from_secs(42));
        cache.set("k", &1u32, cache.default_ttl()).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(1));
    }
}
