//! Fail-safe permission evaluation
//!
//! The public entry point for boolean checks. Pipeline:
//! authenticated-principal guard → cache lookup → breaker-protected store
//! query → delegation overlay → cache write → audit. Every ambiguous or
//! failed state resolves to deny, and a failure deny is never cached.

use crate::audit::{AuditRecord, AuditSink, CheckKind, Provenance};
use crate::cache::AuthorizationCache;
use crate::delegation::DelegationManager;
use crate::error::Result;
use crate::resilience::ResilienceFacade;
use crate::store::PolicyStore;
use crate::types::Principal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Combines cache, store, delegation overlay and resilience into fail-safe
/// boolean checks
pub struct PermissionEvaluator {
    store: Arc<dyn PolicyStore>,
    cache: Arc<AuthorizationCache>,
    delegations: Arc<DelegationManager>,
    resilience: Arc<ResilienceFacade>,
    audit: Arc<dyn AuditSink>,
}

impl PermissionEvaluator {
    /// Wire an evaluator from its collaborators
    pub fn new(
        store: Arc<dyn PolicyStore>,
        cache: Arc<AuthorizationCache>,
        delegations: Arc<DelegationManager>,
        resilience: Arc<ResilienceFacade>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            cache,
            delegations,
            resilience,
            audit,
        }
    }

    /// Whether the principal holds the permission.
    ///
    /// Without an authenticated principal the check denies immediately, no
    /// lookup performed.
    pub async fn has_permission(&self, principal: Option<&Principal>, permission: &str) -> bool {
        let Some(principal) = Self::require_authenticated(principal) else {
            debug!(permission = %permission, "permission denied: no authenticated principal");
            return false;
        };
        self.check(&principal.id, CheckKind::Permission, permission)
            .await
    }

    /// Whether the principal holds the role
    pub async fn has_role(&self, principal: Option<&Principal>, role: &str) -> bool {
        let Some(principal) = Self::require_authenticated(principal) else {
            debug!(role = %role, "role denied: no authenticated principal");
            return false;
        };
        self.check(&principal.id, CheckKind::Role, role).await
    }

    fn require_authenticated(principal: Option<&Principal>) -> Option<&Principal> {
        principal.filter(|p| p.authenticated)
    }

    async fn check(&self, user_id: &str, kind: CheckKind, subject: &str) -> bool {
        // cache hit short-circuits every further lookup
        let cached = match kind {
            CheckKind::Permission => self.cache.get_permission(user_id, subject),
            CheckKind::Role => self.cache.get_role(user_id, subject),
        };
        if let Some(value) = cached {
            debug!(user = %user_id, subject = %subject, value, "check served from cache");
            self.audit
                .record(AuditRecord::new(
                    user_id,
                    kind,
                    subject,
                    value,
                    Provenance::CacheHit,
                ))
                .await;
            return value;
        }

        match self.fresh_check(user_id, kind, subject).await {
            Ok(value) => {
                match kind {
                    CheckKind::Permission => self.cache.put_permission(user_id, subject, value),
                    CheckKind::Role => self.cache.put_role(user_id, subject, value),
                }
                self.audit
                    .record(AuditRecord::new(
                        user_id,
                        kind,
                        subject,
                        value,
                        Provenance::Fresh,
                    ))
                    .await;
                value
            }
            Err(err) => {
                // fail-safe deny: never cached, so the next call retries
                warn!(user = %user_id, subject = %subject, %err, "check failed, denying");
                self.audit
                    .record(AuditRecord::new(
                        user_id,
                        kind,
                        subject,
                        false,
                        Provenance::Failure,
                    ))
                    .await;
                false
            }
        }
    }

    /// Store check plus additive delegation overlay
    async fn fresh_check(&self, user_id: &str, kind: CheckKind, subject: &str) -> Result<bool> {
        let direct = match kind {
            CheckKind::Permission => {
                self.resilience
                    .security_check_result("permission-check", self.store.has_permission(user_id, subject))
                    .await?
            }
            CheckKind::Role => {
                self.resilience
                    .security_check_result("role-check", self.store.has_role(user_id, subject))
                    .await?
            }
        };
        if direct {
            return Ok(true);
        }

        let delegated = match kind {
            CheckKind::Permission => self.delegations.delegated_permissions(user_id).await?,
            CheckKind::Role => self.delegations.delegated_roles(user_id).await?,
        };
        Ok(delegated.contains(subject))
    }
}
