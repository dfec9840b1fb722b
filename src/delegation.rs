//! Time-bounded permission/role delegation between users
//!
//! A delegation grants a delegatee a set of permissions and/or role codes
//! for a bounded window. Grants are purely additive: they can turn a deny
//! into an allow but never revoke anything granted directly.
//!
//! Aggregated per-user grant sets are served from a short-TTL cache that is
//! invalidated immediately on creation and revocation. Expiry is driven by
//! an external scheduler calling
//! [`DelegationManager::expire_overdue_delegations`].

use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delegation lifecycle status. `Revoked` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationStatus {
    /// Grant is live (subject to its validity window)
    Active,
    /// Explicitly revoked before expiry
    Revoked,
    /// Validity window elapsed
    Expired,
}

/// A time-bounded grant of permissions/roles from one user to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDelegation {
    /// Delegation identifier
    pub id: String,
    /// User granting the permissions
    pub delegator_id: String,
    /// User receiving the permissions
    pub delegatee_id: String,
    /// Delegated permission names
    pub delegated_permissions: HashSet<String>,
    /// Delegated role codes
    pub delegated_roles: HashSet<String>,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window
    pub valid_to: DateTime<Utc>,
    /// Why the delegation was created
    pub reason: String,
    /// Lifecycle status
    pub status: DelegationStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the delegation was revoked or expired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    /// Who revoked it ("SYSTEM" for the expiry sweep)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
}

impl PermissionDelegation {
    /// A delegation is active iff its status is `Active` and `now` falls
    /// inside `[valid_from, valid_to]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DelegationStatus::Active
            && now >= self.valid_from
            && now <= self.valid_to
    }
}

/// Parameters for creating a delegation
#[derive(Debug, Clone)]
pub struct NewDelegation {
    /// User granting the permissions
    pub delegator_id: String,
    /// User receiving the permissions
    pub delegatee_id: String,
    /// Permission names to delegate
    pub permissions: HashSet<String>,
    /// Role codes to delegate
    pub roles: HashSet<String>,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window
    pub valid_to: DateTime<Utc>,
    /// Why the delegation is being created
    pub reason: String,
}

/// Storage seam for delegations
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Persist a new delegation
    async fn save(&self, delegation: PermissionDelegation) -> Result<()>;

    /// Look up a delegation by id
    async fn find_by_id(&self, id: &str) -> Result<Option<PermissionDelegation>>;

    /// All delegations granted to a delegatee
    async fn find_by_delegatee(&self, delegatee_id: &str) -> Result<Vec<PermissionDelegation>>;

    /// All delegations granted by a delegator
    async fn find_by_delegator(&self, delegator_id: &str) -> Result<Vec<PermissionDelegation>>;

    /// Active delegations whose validity window ended before `now`
    async fn find_expired_active(&self, now: DateTime<Utc>) -> Result<Vec<PermissionDelegation>>;

    /// Move a delegation into a terminal status; returns false if missing.
    ///
    /// Implementations must leave already-terminal delegations untouched.
    async fn update_status(
        &self,
        id: &str,
        status: DelegationStatus,
        revoked_by: Option<&str>,
    ) -> Result<bool>;
}

/// In-memory delegation store
pub struct InMemoryDelegationStore {
    delegations: Arc<RwLock<HashMap<String, PermissionDelegation>>>,
}

impl InMemoryDelegationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            delegations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryDelegationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelegationStore for InMemoryDelegationStore {
    async fn save(&self, delegation: PermissionDelegation) -> Result<()> {
        let mut delegations = self.delegations.write().await;
        delegations.insert(delegation.id.clone(), delegation);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PermissionDelegation>> {
        let delegations = self.delegations.read().await;
        Ok(delegations.get(id).cloned())
    }

    async fn find_by_delegatee(&self, delegatee_id: &str) -> Result<Vec<PermissionDelegation>> {
        let delegations = self.delegations.read().await;
        Ok(delegations
            .values()
            .filter(|d| d.delegatee_id == delegatee_id)
            .cloned()
            .collect())
    }

    async fn find_by_delegator(&self, delegator_id: &str) -> Result<Vec<PermissionDelegation>> {
        let delegations = self.delegations.read().await;
        Ok(delegations
            .values()
            .filter(|d| d.delegator_id == delegator_id)
            .cloned()
            .collect())
    }

    async fn find_expired_active(&self, now: DateTime<Utc>) -> Result<Vec<PermissionDelegation>> {
        let delegations = self.delegations.read().await;
        Ok(delegations
            .values()
            .filter(|d| d.status == DelegationStatus::Active && d.valid_to < now)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DelegationStatus,
        revoked_by: Option<&str>,
    ) -> Result<bool> {
        let mut delegations = self.delegations.write().await;
        match delegations.get_mut(id) {
            Some(delegation) => {
                if delegation.status != DelegationStatus::Active {
                    return Ok(false);
                }
                delegation.status = status;
                delegation.revoked_at = Some(Utc::now());
                delegation.revoked_by = revoked_by.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Aggregated grant set with its cache timestamp
struct CachedSet {
    values: HashSet<String>,
    cached_at: Instant,
}

impl CachedSet {
    fn new(values: HashSet<String>) -> Self {
        Self {
            values,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Delegation manager configuration
#[derive(Debug, Clone)]
pub struct DelegationConfig {
    /// TTL of the aggregated per-user grant cache
    pub cache_ttl: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Manages delegation lifecycle and serves aggregated grant sets
pub struct DelegationManager {
    store: Arc<dyn DelegationStore>,
    permission_cache: DashMap<String, CachedSet>,
    role_cache: DashMap<String, CachedSet>,
    cache_ttl: Duration,
}

impl DelegationManager {
    /// Create a manager over the given store
    pub fn new(store: Arc<dyn DelegationStore>, config: DelegationConfig) -> Self {
        Self {
            store,
            permission_cache: DashMap::new(),
            role_cache: DashMap::new(),
            cache_ttl: config.cache_ttl,
        }
    }

    /// Create a delegation after validating its parameters.
    ///
    /// No side effects are committed when validation fails.
    pub async fn create_delegation(&self, request: NewDelegation) -> Result<PermissionDelegation> {
        Self::validate(&request)?;

        let delegation = PermissionDelegation {
            id: Uuid::new_v4().to_string(),
            delegator_id: request.delegator_id,
            delegatee_id: request.delegatee_id,
            delegated_permissions: request.permissions,
            delegated_roles: request.roles,
            valid_from: request.valid_from,
            valid_to: request.valid_to,
            reason: request.reason,
            status: DelegationStatus::Active,
            created_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        };

        self.store.save(delegation.clone()).await?;
        self.invalidate_user_cache(&delegation.delegatee_id);

        info!(
            delegation = %delegation.id,
            delegator = %delegation.delegator_id,
            delegatee = %delegation.delegatee_id,
            "created permission delegation"
        );
        Ok(delegation)
    }

    /// Revoke an active delegation; returns false when the delegation is
    /// missing or already terminal.
    pub async fn revoke_delegation(&self, delegation_id: &str, revoked_by: &str) -> Result<bool> {
        let Some(delegation) = self.store.find_by_id(delegation_id).await? else {
            warn!(delegation = %delegation_id, "delegation not found");
            return Ok(false);
        };
        if delegation.status != DelegationStatus::Active {
            warn!(delegation = %delegation_id, "delegation is not active, cannot revoke");
            return Ok(false);
        }

        let updated = self
            .store
            .update_status(delegation_id, DelegationStatus::Revoked, Some(revoked_by))
            .await?;
        if updated {
            self.invalidate_user_cache(&delegation.delegatee_id);
            info!(delegation = %delegation_id, by = %revoked_by, "revoked delegation");
        }
        Ok(updated)
    }

    /// Look up a delegation by id
    pub async fn get_delegation(&self, delegation_id: &str) -> Result<Option<PermissionDelegation>> {
        self.store.find_by_id(delegation_id).await
    }

    /// Delegations currently active for a delegatee
    pub async fn active_delegations_for(
        &self,
        delegatee_id: &str,
    ) -> Result<Vec<PermissionDelegation>> {
        let now = Utc::now();
        let mut delegations = self.store.find_by_delegatee(delegatee_id).await?;
        delegations.retain(|d| d.is_active_at(now));
        Ok(delegations)
    }

    /// Delegations a user has granted, regardless of status
    pub async fn delegations_by_delegator(
        &self,
        delegator_id: &str,
    ) -> Result<Vec<PermissionDelegation>> {
        self.store.find_by_delegator(delegator_id).await
    }

    /// Permissions currently delegated to the user, via the short-TTL cache
    pub async fn delegated_permissions(&self, user_id: &str) -> Result<HashSet<String>> {
        if let Some(cached) = self.permission_cache.get(user_id) {
            if !cached.is_expired(self.cache_ttl) {
                return Ok(cached.values.clone());
            }
        }

        let permissions: HashSet<String> = self
            .active_delegations_for(user_id)
            .await?
            .into_iter()
            .flat_map(|d| d.delegated_permissions)
            .collect();

        self.permission_cache
            .insert(user_id.to_string(), CachedSet::new(permissions.clone()));
        Ok(permissions)
    }

    /// Role codes currently delegated to the user, via the short-TTL cache
    pub async fn delegated_roles(&self, user_id: &str) -> Result<HashSet<String>> {
        if let Some(cached) = self.role_cache.get(user_id) {
            if !cached.is_expired(self.cache_ttl) {
                return Ok(cached.values.clone());
            }
        }

        let roles: HashSet<String> = self
            .active_delegations_for(user_id)
            .await?
            .into_iter()
            .flat_map(|d| d.delegated_roles)
            .collect();

        self.role_cache
            .insert(user_id.to_string(), CachedSet::new(roles.clone()));
        Ok(roles)
    }

    /// Transition every overdue ACTIVE delegation to EXPIRED.
    ///
    /// Driven by an external scheduler; safe to call concurrently and
    /// repeatedly. Returns how many delegations this call expired.
    pub async fn expire_overdue_delegations(&self) -> Result<usize> {
        let overdue = self.store.find_expired_active(Utc::now()).await?;

        let mut affected: HashSet<String> = HashSet::new();
        let mut expired = 0usize;
        for delegation in &overdue {
            if self
                .store
                .update_status(&delegation.id, DelegationStatus::Expired, Some("SYSTEM"))
                .await?
            {
                expired += 1;
                affected.insert(delegation.delegatee_id.clone());
            }
        }

        for user_id in &affected {
            self.invalidate_user_cache(user_id);
        }
        if expired > 0 {
            info!(count = expired, "expired overdue delegations");
        }
        Ok(expired)
    }

    /// Revoke every active delegation granted by or to the user, e.g. on
    /// offboarding. Returns how many delegations were revoked.
    pub async fn revoke_all_for_user(&self, user_id: &str, revoked_by: &str) -> Result<usize> {
        let mut candidates = self.store.find_by_delegator(user_id).await?;
        candidates.extend(self.store.find_by_delegatee(user_id).await?);

        let mut revoked = 0usize;
        for delegation in candidates {
            if delegation.status == DelegationStatus::Active
                && self.revoke_delegation(&delegation.id, revoked_by).await?
            {
                revoked += 1;
            }
        }

        info!(user = %user_id, count = revoked, "revoked all delegations for user");
        Ok(revoked)
    }

    /// Drop the user's cached grant sets
    pub fn invalidate_user_cache(&self, user_id: &str) {
        self.permission_cache.remove(user_id);
        self.role_cache.remove(user_id);
        debug!(user = %user_id, "invalidated delegation cache");
    }

    /// Whether a delegation window is acceptable: start before end, start
    /// at most 30 days in the past, end at most 1 year in the future.
    pub fn is_valid_time_range(valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> bool {
        if valid_to <= valid_from {
            return false;
        }
        let now = Utc::now();
        if valid_from < now - ChronoDuration::days(30) {
            return false;
        }
        if valid_to > now + ChronoDuration::days(365) {
            return false;
        }
        true
    }

    fn validate(request: &NewDelegation) -> Result<()> {
        if request.delegator_id.trim().is_empty() {
            return Err(AuthzError::Validation("Delegator id is required".to_string()));
        }
        if request.delegatee_id.trim().is_empty() {
            return Err(AuthzError::Validation("Delegatee id is required".to_string()));
        }
        if request.delegator_id == request.delegatee_id {
            return Err(AuthzError::Validation(
                "Cannot delegate permissions to self".to_string(),
            ));
        }
        if request.permissions.is_empty() && request.roles.is_empty() {
            return Err(AuthzError::Validation(
                "At least one permission or role must be delegated".to_string(),
            ));
        }
        if !Self::is_valid_time_range(request.valid_from, request.valid_to) {
            return Err(AuthzError::Validation(
                "Invalid delegation time range".to_string(),
            ));
        }
        Ok(())
    }
}
