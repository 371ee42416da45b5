//! Persistence and cache layer for agent-hub

pub mod audit;
pub mod cached;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use audit::export_csv;
pub use cached::CachedTaskStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use self::redis::RedisCache;
pub use store::TaskStore;

use agent_hub_common::{Result, StorageConfig};
use std::sync::Arc;

/// Build the configured store.
///
/// A configured database that cannot be reached is an error; an unreachable
/// Redis only disables caching.
pub async fn initialize_storage(config: &StorageConfig) -> Result<Arc<dyn TaskStore>> {
    let store: Arc<dyn TaskStore> = match &config.database_url {
        Some(url) => {
            let postgres = PostgresStore::connect(url, config.max_connections).await?;
            postgres.run_migrations().await?;
            Arc::new(postgres)
        }
        None => {
            tracing::warn!("No database_url configured, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let store = match &config.redis_url {
        Some(url) => match RedisCache::new(url, "agent_hub:").await {
            Ok(cache) => Arc::new(CachedTaskStore::new(store, cache, config.cache_ttl_secs))
                as Arc<dyn TaskStore>,
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, continuing without cache");
                store
            }
        },
        None => store,
    };

    tracing::info!("Storage backends initialized successfully");
    Ok(store)
}
