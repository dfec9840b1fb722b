//! Session-scoped authorization result cache
//!
//! Boolean permission/role check results are cached per user in a bucket
//! stamped with its creation time. Buckets expire after the configured
//! session timeout (checked lazily on read) and the oldest bucket is
//! evicted when the cache is full.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Authorization cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a user's bucket stays valid after creation
    pub session_timeout: Duration,

    /// Maximum number of per-user buckets
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            max_entries: 1000,
        }
    }
}

/// Cached check results for one user
struct UserBucket {
    permissions: DashMap<String, bool>,
    roles: DashMap<String, bool>,
    created_at: Instant,
}

impl UserBucket {
    fn new() -> Self {
        Self {
            permissions: DashMap::new(),
            roles: DashMap::new(),
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.created_at.elapsed() > timeout
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone)]
pub struct AuthorizationCacheStats {
    /// Total buckets currently held
    pub total_users: usize,
    /// Buckets still inside their session timeout
    pub active_users: usize,
    /// Buckets past their session timeout but not yet swept
    pub expired_users: usize,
    /// Configured bucket limit
    pub max_entries: usize,
    /// Configured session timeout
    pub session_timeout: Duration,
}

/// Bounded, per-user, TTL-based cache of boolean check results
pub struct AuthorizationCache {
    buckets: DashMap<String, Arc<UserBucket>>,
    config: CacheConfig,
}

impl AuthorizationCache {
    /// Create a cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Cached permission result, if present and the bucket is fresh.
    ///
    /// Expired buckets are removed on the spot.
    pub fn get_permission(&self, user_id: &str, permission: &str) -> Option<bool> {
        self.live_bucket(user_id)
            .and_then(|bucket| bucket.permissions.get(permission).map(|v| *v))
    }

    /// Cached role result, if present and the bucket is fresh
    pub fn get_role(&self, user_id: &str, role: &str) -> Option<bool> {
        self.live_bucket(user_id)
            .and_then(|bucket| bucket.roles.get(role).map(|v| *v))
    }

    /// Store a permission result, evicting the oldest bucket if full
    pub fn put_permission(&self, user_id: &str, permission: &str, value: bool) {
        self.bucket_for_insert(user_id)
            .permissions
            .insert(permission.to_string(), value);
    }

    /// Store a role result, evicting the oldest bucket if full
    pub fn put_role(&self, user_id: &str, role: &str, value: bool) {
        self.bucket_for_insert(user_id)
            .roles
            .insert(role.to_string(), value);
    }

    /// Drop the user's bucket unconditionally.
    ///
    /// Call whenever the user's grants change.
    pub fn invalidate(&self, user_id: &str) {
        if self.buckets.remove(user_id).is_some() {
            debug!(user = %user_id, "invalidated authorization cache");
        }
    }

    /// Remove every expired bucket; returns how many were dropped.
    ///
    /// Advisory: reads already reject expired buckets, this just frees
    /// memory. Driven by an external scheduler.
    pub fn cleanup_expired(&self) -> usize {
        let timeout = self.config.session_timeout;
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(timeout));
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "cleaned up expired authorization cache buckets");
        }
        removed
    }

    /// Current cache statistics
    pub fn stats(&self) -> AuthorizationCacheStats {
        let timeout = self.config.session_timeout;
        let total_users = self.buckets.len();
        let expired_users = self
            .buckets
            .iter()
            .filter(|entry| entry.value().is_expired(timeout))
            .count();

        AuthorizationCacheStats {
            total_users,
            active_users: total_users.saturating_sub(expired_users),
            expired_users,
            max_entries: self.config.max_entries,
            session_timeout: timeout,
        }
    }

    /// The user's bucket if it exists and is fresh; removes it if expired
    fn live_bucket(&self, user_id: &str) -> Option<Arc<UserBucket>> {
        let bucket = self.buckets.get(user_id)?.clone();
        if bucket.is_expired(self.config.session_timeout) {
            drop(bucket);
            self.buckets.remove(user_id);
            debug!(user = %user_id, "removed expired authorization cache bucket");
            return None;
        }
        Some(bucket)
    }

    /// Create-or-reuse the user's bucket, evicting first if at capacity
    fn bucket_for_insert(&self, user_id: &str) -> Arc<UserBucket> {
        if self.buckets.len() >= self.config.max_entries {
            self.evict_oldest();
        }
        self.buckets
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(UserBucket::new()))
            .clone()
    }

    /// Remove the single oldest-created bucket
    fn evict_oldest(&self) {
        let oldest = self
            .buckets
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(user_id) = oldest {
            self.buckets.remove(&user_id);
            debug!(user = %user_id, "evicted oldest authorization cache bucket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(max_entries: usize, timeout: Duration) -> AuthorizationCache {
        AuthorizationCache::new(CacheConfig {
            session_timeout: timeout,
            max_entries,
        })
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = small_cache(10, Duration::from_secs(60));

        assert!(cache.get_permission("u-1", "document:read").is_none());
        cache.put_permission("u-1", "document:read", true);
        cache.put_role("u-1", "DEVELOPER", false);

        assert_eq!(cache.get_permission("u-1", "document:read"), Some(true));
        assert_eq!(cache.get_role("u-1", "DEVELOPER"), Some(false));
        assert!(cache.get_permission("u-1", "document:write").is_none());
    }

    #[test]
    fn test_expired_bucket_removed_on_read() {
        let cache = small_cache(10, Duration::from_millis(20));
        cache.put_permission("u-1", "document:read", true);

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get_permission("u-1", "document:read").is_none());
        assert_eq!(cache.stats().total_users, 0);
    }

    #[test]
    fn test_oldest_bucket_evicted_at_capacity() {
        let cache = small_cache(2, Duration::from_secs(60));

        cache.put_permission("u-1", "p", true);
        std::thread::sleep(Duration::from_millis(5));
        cache.put_permission("u-2", "p", true);
        std::thread::sleep(Duration::from_millis(5));
        cache.put_permission("u-3", "p", true);

        assert!(cache.get_permission("u-1", "p").is_none());
        assert_eq!(cache.get_permission("u-2", "p"), Some(true));
        assert_eq!(cache.get_permission("u-3", "p"), Some(true));
    }

    #[test]
    fn test_invalidate() {
        let cache = small_cache(10, Duration::from_secs(60));
        cache.put_role("u-1", "DEVELOPER", true);

        cache.invalidate("u-1");
        assert!(cache.get_role("u-1", "DEVELOPER").is_none());
    }

    #[test]
    fn test_cleanup_expired_sweep() {
        let cache = small_cache(10, Duration::from_millis(20));
        cache.put_permission("u-1", "p", true);
        cache.put_permission("u-2", "p", false);

        std::thread::sleep(Duration::from_millis(40));
        cache.put_permission("u-3", "p", true);

        let removed = cache.cleanup_expired();
        assert_eq!(removed, 2);
        assert_eq!(cache.stats().total_users, 1);
        assert_eq!(cache.get_permission("u-3", "p"), Some(true));

        // idempotent
        assert_eq!(cache.cleanup_expired(), 0);
    }
}
