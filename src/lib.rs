//! # Authorization Resolution & Resilience Engine
//!
//! Computes a user's effective roles from hierarchical, time-bounded
//! assignment sources, overlays time-bounded delegations, caches boolean
//! check results per user, and protects every lookup against partial
//! infrastructure failure with circuit breakers and graceful degradation.
//! Every ambiguous or failed state resolves to denial of access.
//!
//! ## Features
//!
//! - **Effective-role resolution** across direct, department,
//!   department-hierarchy and virtual-group assignments, with per-role
//!   source provenance
//! - **Permission delegation** between users with validity windows and an
//!   externally driven expiry sweep
//! - **Fail-safe checks**: lookup failures deny, are never cached, and are
//!   always audited
//! - **Circuit breakers** with lock-free CAS state transitions and a
//!   process-wide registry
//! - **Graceful degradation** of named features driven by breaker health,
//!   including an emergency mode
//!
//! ## Example
//!
//! ```rust
//! use authz_engine::{AuthzEngine, EngineConfig, Principal};
//! use authz_engine::audit::TracingAuditSink;
//! use authz_engine::delegation::InMemoryDelegationStore;
//! use authz_engine::store::InMemoryPolicyStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryPolicyStore::new());
//! store.grant_permission("user:alice", "document:read").await;
//!
//! let engine = AuthzEngine::new(
//!     EngineConfig::default(),
//!     store,
//!     Arc::new(InMemoryDelegationStore::new()),
//!     Arc::new(TracingAuditSink),
//! );
//!
//! let alice = Principal::authenticated("user:alice");
//! assert!(engine.has_permission(Some(&alice), "document:read").await);
//! assert!(!engine.has_permission(None, "document:read").await);
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod resilience;
pub mod resolver;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditRecord, AuditSink, CheckKind, Provenance};
pub use cache::{AuthorizationCache, CacheConfig};
pub use delegation::{
    DelegationManager, DelegationStatus, NewDelegation, PermissionDelegation,
};
pub use engine::{AuthzEngine, EngineConfig, PermissionEvaluator};
pub use error::{AuthzError, Result};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    DegradationLevel, DegradationManager, ResilienceFacade,
};
pub use resolver::RoleAssignmentResolver;
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use types::{
    AssignmentTargetType, EffectiveRole, Principal, Role, RoleAssignment, RoleSource, RoleStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
