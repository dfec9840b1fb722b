//! Fallback strategies for failed operations
//!
//! A strategy pairs a fallback value with a predicate over the error it can
//! handle and a priority (lower number wins). Values are either fixed or
//! computed by a supplier at resolution time.

use crate::error::AuthzError;
use std::sync::Arc;
use tracing::warn;

/// Supplier of a computed fallback value
pub type SupplierFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// The value a strategy falls back to
#[derive(Clone)]
pub enum FallbackValue<T> {
    /// A fixed value, cloned on resolution
    Fixed(T),
    /// A value computed at resolution time
    Supplied(SupplierFn<T>),
}

/// Which errors a strategy is willing to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Handles every error
    Any,
    /// Only store/lookup failures
    LookupOnly,
    /// Only circuit-open short circuits
    CircuitOpenOnly,
}

impl ErrorScope {
    /// Whether an error falls inside this scope
    pub fn can_handle(&self, error: &AuthzError) -> bool {
        match self {
            ErrorScope::Any => true,
            ErrorScope::LookupOnly => matches!(error, AuthzError::LookupFailure(_)),
            ErrorScope::CircuitOpenOnly => matches!(error, AuthzError::CircuitOpen { .. }),
        }
    }
}

/// A fallback value scoped to the errors it handles, with a priority
#[derive(Clone)]
pub struct FallbackStrategy<T> {
    value: FallbackValue<T>,
    scope: ErrorScope,
    priority: i32,
}

impl<T: Clone> FallbackStrategy<T> {
    /// Strategy returning a fixed value for any error
    pub fn fixed(value: T) -> Self {
        Self {
            value: FallbackValue::Fixed(value),
            scope: ErrorScope::Any,
            priority: 10,
        }
    }

    /// Strategy computing its value at resolution time
    pub fn supplied(supplier: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            value: FallbackValue::Supplied(Arc::new(supplier)),
            scope: ErrorScope::Any,
            priority: 10,
        }
    }

    /// Strategy returning a fixed value only for errors in the given scope
    pub fn scoped(scope: ErrorScope, value: T) -> Self {
        Self {
            value: FallbackValue::Fixed(value),
            scope,
            priority: 10,
        }
    }

    /// Override the priority (lower wins)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this strategy handles the error
    pub fn can_handle(&self, error: &AuthzError) -> bool {
        self.scope.can_handle(error)
    }

    /// This strategy's priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Produce the fallback value for the error
    pub fn resolve(&self, error: &AuthzError) -> T {
        warn!(%error, "operation failed, applying fallback");
        match &self.value {
            FallbackValue::Fixed(value) => value.clone(),
            FallbackValue::Supplied(supplier) => supplier(),
        }
    }
}

/// Pick the handling strategy with the best (lowest) priority
pub fn select_for<'a, T: Clone>(
    strategies: &'a [FallbackStrategy<T>],
    error: &AuthzError,
) -> Option<&'a FallbackStrategy<T>> {
    strategies
        .iter()
        .filter(|strategy| strategy.can_handle(error))
        .min_by_key(|strategy| strategy.priority)
}
