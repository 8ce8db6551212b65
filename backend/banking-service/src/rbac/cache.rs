use super::role::Role;
use super::store::RoleStore;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis_utils::{JsonCache, SharedConnectionManager};
use std::time::Duration;
use tracing::{debug, warn};

const ROLE_CACHE_PREFIX: &str = "rbac:role";

/// Cache-aside Redis layer in front of another role store.
///
/// Redis errors never fail a lookup; the inner store answers instead.
/// Unknown roles are not cached.
pub struct CachedRoleStore<S> {
    inner: S,
    cache: JsonCache,
}

impl<S: RoleStore> CachedRoleStore<S> {
    pub fn new(inner: S, manager: SharedConnectionManager, ttl: Duration) -> Self {
        Self {
            inner,
            cache: JsonCache::new(manager, ROLE_CACHE_PREFIX, ttl),
        }
    }

    /// Drop the cached copy of a role after its permissions changed.
    pub async fn invalidate(&self, name: &str) -> Result<()> {
        self.cache
            .invalidate(name)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }
}

#[async_trait]
impl<S: RoleStore> RoleStore for CachedRoleStore<S> {
    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        match self.cache.get::<Role>(name).await {
            Ok(Some(role)) => {
                debug!(role = name, "role cache hit");
                return Ok(Some(role));
            }
            Ok(None) => debug!(role = name, "role cache miss"),
            Err(e) => warn!(role = name, error = %e, "role cache unavailable, reading through"),
        }

        let role = self.inner.get_role(name).await?;

        if let Some(role) = &role {
            if let Err(e) = self.cache.set(name, role).await {
                warn!(role = name, error = %e, "failed to cache role");
            }
        }

        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::store::InMemoryRoleStore;
    use redis_utils::RedisPool;

    // Needs a running Redis at REDIS_URL.
    #[tokio::test]
    #[ignore]
    async fn test_cached_lookup_and_invalidate() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let pool = RedisPool::connect(&url).await.unwrap();

        let store = CachedRoleStore::new(
            InMemoryRoleStore::new([Role::new("cache_test_teller", ["deposit:create"])]),
            pool.manager(),
            Duration::from_secs(30),
        );
        store.invalidate("cache_test_teller").await.unwrap();

        let first = store.get_role("cache_test_teller").await.unwrap().unwrap();
        assert!(first.has_permission("deposit:create"));

        store.inner.upsert(Role::new("cache_test_teller", ["loan:approve"])).await;

        // Still served from cache.
        let cached = store.get_role("cache_test_teller").await.unwrap().unwrap();
        assert!(cached.has_permission("deposit:create"));

        store.invalidate("cache_test_teller").await.unwrap();
        let fresh = store.get_role("cache_test_teller").await.unwrap().unwrap();
        assert!(fresh.has_permission("loan:approve"));

        store.invalidate("cache_test_teller").await.unwrap();
    }
}
