//! Category-specific resilience wrappers
//!
//! Each wrapper runs the protected operation through a named circuit
//! breaker from the registry and applies its category fallback on any
//! residual failure: database reads fall back to empty collections,
//! external calls to a caller-supplied last-known-good value, and
//! security-sensitive boolean checks always fall back to deny.

use super::circuit_breaker::CircuitBreakerConfig;
use super::fallback::FallbackStrategy;
use super::registry::CircuitBreakerRegistry;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Category wrappers combining circuit breakers with fallback strategies
pub struct ResilienceFacade {
    registry: Arc<CircuitBreakerRegistry>,
}

impl ResilienceFacade {
    /// Create a facade over the given breaker registry
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Database read returning a collection; falls back to empty
    pub async fn database_list<T, Fut>(&self, operation_name: &str, operation: Fut) -> Vec<T>
    where
        Fut: Future<Output = Result<Vec<T>>>,
        T: Clone + 'static,
    {
        let breaker = self.registry.breaker(&format!("database-{operation_name}"));
        match breaker.execute(operation).await {
            Ok(values) => values,
            Err(err) => {
                error!(operation = %operation_name, %err, "database list operation failed");
                FallbackStrategy::supplied(Vec::new).resolve(&err)
            }
        }
    }

    /// Database read returning an optional row; falls back to `None`
    pub async fn database_optional<T, Fut>(
        &self,
        operation_name: &str,
        operation: Fut,
    ) -> Option<T>
    where
        Fut: Future<Output = Result<Option<T>>>,
        T: Clone + 'static,
    {
        let breaker = self.registry.breaker(&format!("database-{operation_name}"));
        match breaker.execute(operation).await {
            Ok(value) => value,
            Err(err) => {
                error!(operation = %operation_name, %err, "database optional operation failed");
                FallbackStrategy::supplied(|| None).resolve(&err)
            }
        }
    }

    /// Database count; falls back to zero
    pub async fn database_count<Fut>(&self, operation_name: &str, operation: Fut) -> u64
    where
        Fut: Future<Output = Result<u64>>,
    {
        let breaker = self.registry.breaker(&format!("database-{operation_name}"));
        match breaker.execute(operation).await {
            Ok(count) => count,
            Err(err) => {
                error!(operation = %operation_name, %err, "database count operation failed");
                FallbackStrategy::fixed(0u64).resolve(&err)
            }
        }
    }

    /// External service call; falls back to the caller's last-known-good
    /// value
    pub async fn external_call<T, Fut>(
        &self,
        service_name: &str,
        operation: Fut,
        last_known_good: T,
    ) -> T
    where
        T: Clone,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.registry.breaker_with(
            &format!("external-{service_name}"),
            CircuitBreakerConfig::critical(),
        );
        match breaker.execute(operation).await {
            Ok(value) => value,
            Err(err) => {
                error!(service = %service_name, %err, "external service call failed");
                FallbackStrategy::fixed(last_known_good).resolve(&err)
            }
        }
    }

    /// Security-sensitive boolean check; any failure denies
    pub async fn security_check<Fut>(&self, operation_name: &str, operation: Fut) -> bool
    where
        Fut: Future<Output = Result<bool>>,
    {
        match self.security_check_result(operation_name, operation).await {
            Ok(value) => value,
            Err(err) => {
                error!(operation = %operation_name, %err, "security operation failed, denying");
                FallbackStrategy::fixed(false).resolve(&err)
            }
        }
    }

    /// Breaker-protected security check that surfaces the error instead of
    /// applying the deny fallback.
    ///
    /// For callers that must tell a failure apart from a genuine deny:
    /// the permission evaluator uses this so a failure deny is never
    /// written to its cache.
    pub async fn security_check_result<Fut>(
        &self,
        operation_name: &str,
        operation: Fut,
    ) -> Result<bool>
    where
        Fut: Future<Output = Result<bool>>,
    {
        let breaker = self.registry.breaker_with(
            &format!("security-{operation_name}"),
            CircuitBreakerConfig::critical(),
        );
        breaker.execute(operation).await
    }

    /// Critical operation with no fallback: failures propagate, an open
    /// breaker surfaces as [`AuthzError::CircuitOpen`](crate::AuthzError::CircuitOpen)
    pub async fn critical<T, Fut>(&self, operation_name: &str, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.registry.breaker_with(
            &format!("critical-{operation_name}"),
            CircuitBreakerConfig::critical(),
        );
        breaker.execute(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;

    fn facade() -> ResilienceFacade {
        ResilienceFacade::new(Arc::new(CircuitBreakerRegistry::default()))
    }

    fn down<T>() -> Result<T> {
        Err(AuthzError::LookupFailure("store down".to_string()))
    }

    #[tokio::test]
    async fn test_database_fallbacks() {
        let facade = facade();

        let list: Vec<u32> = facade.database_list("users", async { down() }).await;
        assert!(list.is_empty());

        let row: Option<u32> = facade.database_optional("user", async { down() }).await;
        assert!(row.is_none());

        let count = facade.database_count("users", async { down() }).await;
        assert_eq!(count, 0);

        // success path is untouched
        let list = facade
            .database_list("users", async { Ok(vec![1u32, 2]) })
            .await;
        assert_eq!(list, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_external_last_known_good() {
        let facade = facade();
        let value = facade
            .external_call("profile", async { down() }, "cached".to_string())
            .await;
        assert_eq!(value, "cached");
    }

    #[tokio::test]
    async fn test_security_denies_on_failure() {
        let facade = facade();
        assert!(!facade.security_check("perm", async { down() }).await);
        // even when the underlying check would have allowed
        assert!(facade.security_check("perm", async { Ok(true) }).await);
    }

    #[tokio::test]
    async fn test_security_result_surfaces_error() {
        let facade = facade();
        let err = facade
            .security_check_result("perm", async { down::<bool>() })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::LookupFailure(_)));
    }

    #[tokio::test]
    async fn test_critical_propagates_circuit_open() {
        let facade = facade();
        facade
            .registry()
            .breaker_with("critical-payments", CircuitBreakerConfig::critical())
            .force_open();

        let err = facade
            .critical::<u32, _>("payments", async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn test_open_breaker_still_applies_category_fallback() {
        let facade = facade();
        facade.registry().breaker("database-users").force_open();

        let list: Vec<u32> = facade
            .database_list("users", async { Ok(vec![1u32]) })
            .await;
        assert!(list.is_empty());
    }
}
