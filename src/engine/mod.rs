//! Engine assembly
//!
//! [`AuthzEngine`] is the explicit context object wiring every component
//! together, constructed once at process start and passed by reference to
//! all consumers. There is no module-level singleton state.
//!
//! ```text
//! check → PermissionEvaluator → AuthorizationCache
//!                             → PolicyStore (via ResilienceFacade)
//!                             → DelegationManager
//!            ↓
//!        AuditSink
//! CircuitBreakerRegistry / DegradationManager wrap any failing collaborator
//! ```

pub mod evaluator;

pub use evaluator::PermissionEvaluator;

use crate::audit::AuditSink;
use crate::cache::{AuthorizationCache, AuthorizationCacheStats, CacheConfig};
use crate::delegation::{
    DelegationConfig, DelegationManager, DelegationStore, NewDelegation, PermissionDelegation,
};
use crate::error::Result;
use crate::resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, DegradationManager, ResilienceFacade,
};
use crate::resolver::RoleAssignmentResolver;
use crate::store::PolicyStore;
use crate::types::{EffectiveRole, Principal};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Authorization cache settings
    pub cache: CacheConfig,

    /// Delegation manager settings
    pub delegation: DelegationConfig,

    /// Default circuit breaker settings
    pub breaker_defaults: CircuitBreakerConfig,
}

/// Authorization resolution & resilience engine
pub struct AuthzEngine {
    cache: Arc<AuthorizationCache>,
    resolver: RoleAssignmentResolver,
    delegations: Arc<DelegationManager>,
    registry: Arc<CircuitBreakerRegistry>,
    resilience: Arc<ResilienceFacade>,
    degradation: Arc<DegradationManager>,
    evaluator: PermissionEvaluator,
}

impl AuthzEngine {
    /// Assemble an engine over the given stores and audit sink
    pub fn new(
        config: EngineConfig,
        policy_store: Arc<dyn PolicyStore>,
        delegation_store: Arc<dyn DelegationStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let registry = Arc::new(CircuitBreakerRegistry::new(config.breaker_defaults.clone()));

        // pre-register breakers for the common operations
        registry.breaker("database-read");
        registry.breaker_with("database-write", CircuitBreakerConfig::critical());
        registry.breaker_with("external-auth", CircuitBreakerConfig::critical());
        registry.breaker("external-notification");

        let resilience = Arc::new(ResilienceFacade::new(registry.clone()));
        let degradation = Arc::new(DegradationManager::new(registry.clone()));
        let cache = Arc::new(AuthorizationCache::new(config.cache.clone()));
        let delegations = Arc::new(DelegationManager::new(
            delegation_store,
            config.delegation.clone(),
        ));
        let resolver = RoleAssignmentResolver::new(policy_store.clone());
        let evaluator = PermissionEvaluator::new(
            policy_store,
            cache.clone(),
            delegations.clone(),
            resilience.clone(),
            audit,
        );

        info!(breakers = registry.len(), "authorization engine initialized");

        Self {
            cache,
            resolver,
            delegations,
            registry,
            resilience,
            degradation,
            evaluator,
        }
    }

    /// Fail-safe permission check
    pub async fn has_permission(&self, principal: Option<&Principal>, permission: &str) -> bool {
        self.evaluator.has_permission(principal, permission).await
    }

    /// Fail-safe role check
    pub async fn has_role(&self, principal: Option<&Principal>, role: &str) -> bool {
        self.evaluator.has_role(principal, role).await
    }

    /// A user's merged effective roles in discovery order
    pub async fn get_effective_roles(&self, user_id: &str) -> Result<Vec<EffectiveRole>> {
        self.resolver.resolve_effective_roles(user_id).await
    }

    /// Distinct effective role codes in discovery order
    pub async fn get_effective_role_codes(&self, user_id: &str) -> Result<Vec<String>> {
        self.resolver.effective_role_codes(user_id).await
    }

    /// Create a delegation; drops the delegatee's cached check results so
    /// the grant is visible immediately
    pub async fn create_delegation(&self, request: NewDelegation) -> Result<PermissionDelegation> {
        let delegation = self.delegations.create_delegation(request).await?;
        self.cache.invalidate(&delegation.delegatee_id);
        Ok(delegation)
    }

    /// Revoke a delegation; drops the delegatee's cached check results
    pub async fn revoke_delegation(&self, delegation_id: &str, revoked_by: &str) -> Result<bool> {
        let delegatee = self
            .delegations
            .get_delegation(delegation_id)
            .await?
            .map(|d| d.delegatee_id);

        let revoked = self
            .delegations
            .revoke_delegation(delegation_id, revoked_by)
            .await?;
        if revoked {
            if let Some(delegatee) = delegatee {
                self.cache.invalidate(&delegatee);
            }
        }
        Ok(revoked)
    }

    /// Permissions currently delegated to the user
    pub async fn get_delegated_permissions(&self, user_id: &str) -> Result<HashSet<String>> {
        self.delegations.delegated_permissions(user_id).await
    }

    /// Role codes currently delegated to the user
    pub async fn get_delegated_roles(&self, user_id: &str) -> Result<HashSet<String>> {
        self.delegations.delegated_roles(user_id).await
    }

    /// Expire overdue delegations; call from an external scheduler
    pub async fn expire_overdue_delegations(&self) -> Result<usize> {
        self.delegations.expire_overdue_delegations().await
    }

    /// Sweep expired cache buckets; call from an external scheduler
    pub fn cleanup_expired_cache_entries(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Adjust degradation levels from breaker health; call from an external
    /// scheduler
    pub fn perform_health_check(&self) {
        self.degradation.perform_health_check();
    }

    /// Authorization cache statistics
    pub fn cache_stats(&self) -> AuthorizationCacheStats {
        self.cache.stats()
    }

    /// Administrative access to the breaker registry
    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Administrative access to the degradation manager
    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    /// Category resilience wrappers, for callers running their own guarded
    /// operations
    pub fn resilience(&self) -> &Arc<ResilienceFacade> {
        &self.resilience
    }

    /// The delegation manager
    pub fn delegations(&self) -> &Arc<DelegationManager> {
        &self.delegations
    }
}
