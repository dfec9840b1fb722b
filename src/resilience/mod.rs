//! Resilience layer: circuit breakers, fallbacks, graceful degradation
//!
//! Wraps every call that can fail against partial infrastructure outage.
//! Circuit breakers stop hammering a failing dependency, category fallbacks
//! keep non-security reads serving benign defaults, and the degradation
//! manager switches features onto reduced paths while breakers are open.

pub mod circuit_breaker;
pub mod degradation;
pub mod facade;
pub mod fallback;
pub mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
};
pub use degradation::{DegradationLevel, DegradationManager, DegradationStatus};
pub use facade::ResilienceFacade;
pub use fallback::{select_for, ErrorScope, FallbackStrategy, FallbackValue};
pub use registry::CircuitBreakerRegistry;
