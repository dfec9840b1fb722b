//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A backing store was unreachable or returned an error.
    ///
    /// Resolves outward as deny for permission/role checks and is never
    /// cached.
    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    /// Malformed input, e.g. a bad delegation time range
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A circuit breaker short-circuited the call with no fallback configured
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Name of the open breaker
        name: String,
    },

    /// A feature was invoked while disabled and no degraded path was supplied
    #[error("Feature '{feature}' is currently disabled")]
    FeatureDisabled {
        /// Name of the disabled feature
        feature: String,
    },

    /// Delegation not found
    #[error("Delegation not found: {0}")]
    DelegationNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::CircuitOpen {
            name: "database-read".to_string(),
        };
        assert_eq!(err.to_string(), "Circuit breaker 'database-read' is open");

        let err = AuthzError::FeatureDisabled {
            feature: "reporting".to_string(),
        };
        assert!(err.to_string().contains("reporting"));
    }
}
