//! Named circuit breaker registry
//!
//! One registry per process, constructed explicitly at startup and passed
//! by reference to every consumer. Breaker creation is create-if-absent and
//! idempotent under concurrent callers.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Factory and lookup for named circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry with the given default breaker configuration
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Get the named breaker, creating it with the default config if absent
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(name, self.default_config.clone())
    }

    /// Get the named breaker, creating it with the given config if absent.
    ///
    /// An existing breaker keeps its original configuration.
    pub fn breaker_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    /// Status of every registered breaker
    pub fn status(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Reset every breaker to CLOSED
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        info!("all circuit breakers reset");
    }

    /// Force every breaker OPEN
    pub fn force_open_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().force_open();
        }
        info!("all circuit breakers forced open");
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry holds no breakers
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    #[test]
    fn test_create_if_absent_is_idempotent() {
        let registry = CircuitBreakerRegistry::default();

        let first = registry.breaker("database-read");
        let second = registry.breaker("database-read");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_existing_breaker_keeps_config() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.breaker("external-auth");
        let again = registry.breaker_with("external-auth", CircuitBreakerConfig::critical());
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_admin_fanout() {
        let registry = CircuitBreakerRegistry::default();
        registry.breaker("a");
        registry.breaker("b");

        registry.force_open_all();
        assert!(registry
            .status()
            .values()
            .all(|status| status.state == CircuitState::Open));

        registry.reset_all();
        assert!(registry
            .status()
            .values()
            .all(|status| status.state == CircuitState::Closed));
    }
}
