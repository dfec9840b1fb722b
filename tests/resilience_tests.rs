//! Circuit breaker, fallback and degradation behavior end to end

use authz_engine::audit::MemoryAuditSink;
use authz_engine::delegation::InMemoryDelegationStore;
use authz_engine::error::{AuthzError, Result};
use authz_engine::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, DegradationLevel,
    DegradationManager, ResilienceFacade,
};
use authz_engine::store::InMemoryPolicyStore;
use authz_engine::{AuthzEngine, EngineConfig};
use std::sync::Arc;
use std::time::Duration;

fn spec_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        failure_window: Duration::from_secs(10),
        recovery_timeout: Duration::from_millis(60),
        success_threshold: 2,
        auto_recovery: true,
    }
}

async fn fail_once(breaker: &CircuitBreaker) {
    let _ = breaker
        .execute::<(), _>(async { Err(AuthzError::LookupFailure("down".to_string())) })
        .await;
}

#[tokio::test]
async fn breaker_walks_the_full_state_machine() {
    let breaker = CircuitBreaker::new("database-read", spec_config());
    assert_eq!(breaker.state(), CircuitState::Closed);

    // three qualifying failures inside the window open the breaker
    for _ in 0..3 {
        fail_once(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // while open, calls are short-circuited without running
    let err = breaker.execute(async { Ok(1u32) }).await.unwrap_err();
    assert!(matches!(err, AuthzError::CircuitOpen { .. }));

    // after the recovery timeout the next call observes HALF_OPEN
    tokio::time::sleep(Duration::from_millis(100)).await;
    breaker.execute(async { Ok(1u32) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // the second consecutive success closes it
    breaker.execute(async { Ok(1u32) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn half_open_failure_reopens_immediately() {
    let breaker = CircuitBreaker::new("database-read", spec_config());
    for _ in 0..3 {
        fail_once(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    breaker.execute(async { Ok(1u32) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    fail_once(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn registry_admin_surface() {
    let registry = CircuitBreakerRegistry::new(spec_config());
    registry.breaker("database-read");
    registry.breaker("external-profile");

    registry.force_open_all();
    let status = registry.status();
    assert_eq!(status.len(), 2);
    assert!(status.values().all(|s| s.failing()));

    registry.reset_all();
    assert!(registry.status().values().all(|s| s.healthy()));
}

#[tokio::test]
async fn facade_database_and_external_fallbacks() {
    let facade = ResilienceFacade::new(Arc::new(CircuitBreakerRegistry::new(spec_config())));

    let users: Vec<String> = facade
        .database_list("find-users", async {
            Err(AuthzError::LookupFailure("down".to_string()))
        })
        .await;
    assert!(users.is_empty());

    let department: Option<String> = facade
        .database_optional("find-department", async {
            Err(AuthzError::LookupFailure("down".to_string()))
        })
        .await;
    assert!(department.is_none());

    let count = facade
        .database_count("count-users", async {
            Err(AuthzError::LookupFailure("down".to_string()))
        })
        .await;
    assert_eq!(count, 0);

    let profile = facade
        .external_call(
            "profile-service",
            async { Err(AuthzError::LookupFailure("down".to_string())) },
            "last-known".to_string(),
        )
        .await;
    assert_eq!(profile, "last-known");
}

#[tokio::test]
async fn security_category_always_denies_on_failure() {
    let facade = ResilienceFacade::new(Arc::new(CircuitBreakerRegistry::new(spec_config())));

    assert!(
        !facade
            .security_check("has-permission", async {
                Err(AuthzError::LookupFailure("down".to_string()))
            })
            .await
    );

    // even with the breaker forced open, security falls back to deny rather
    // than an error
    facade.registry().breaker_with("security-has-permission", CircuitBreakerConfig::critical());
    facade.registry().force_open_all();
    assert!(!facade.security_check("has-permission", async { Ok(true) }).await);
}

#[tokio::test]
async fn repeated_database_failures_open_the_breaker() {
    let registry = Arc::new(CircuitBreakerRegistry::new(spec_config()));
    let facade = ResilienceFacade::new(registry.clone());

    for _ in 0..3 {
        let _: Vec<u8> = facade
            .database_list("flaky", async {
                Err(AuthzError::LookupFailure("down".to_string()))
            })
            .await;
    }

    let status = registry.status();
    assert!(status.get("database-flaky").unwrap().failing());

    // short-circuited calls still serve the category fallback
    let values: Vec<u8> = facade.database_list("flaky", async { Ok(vec![1]) }).await;
    assert!(values.is_empty());
}

#[tokio::test]
async fn degradation_follows_breaker_health() {
    let registry = Arc::new(CircuitBreakerRegistry::new(spec_config()));
    let manager = DegradationManager::new(registry.clone());

    let breaker = registry.breaker("database-read");
    for _ in 0..3 {
        fail_once(&breaker).await;
    }

    manager.perform_health_check();
    assert_eq!(manager.degradation_level("basic-crud"), DegradationLevel::Reduced);
    assert!(manager.is_feature_available("basic-crud"));

    breaker.reset();
    manager.perform_health_check();
    assert_eq!(manager.degradation_level("basic-crud"), DegradationLevel::Normal);
}

#[tokio::test]
async fn degraded_execution_paths() {
    let manager = DegradationManager::new(Arc::new(CircuitBreakerRegistry::new(spec_config())));

    // NORMAL: primary result
    let value = manager
        .execute_with_degradation(
            "advanced-search",
            || async { Ok::<_, AuthzError>("full".to_string()) },
            || async { Ok("partial".to_string()) },
        )
        .await
        .unwrap();
    assert_eq!(value, "full");

    // primary failure: feature drops to REDUCED, degraded result served
    let value = manager
        .execute_with_degradation(
            "advanced-search",
            || async { Err(AuthzError::LookupFailure("index down".to_string())) },
            || async { Ok("partial".to_string()) },
        )
        .await
        .unwrap();
    assert_eq!(value, "partial");
    assert_eq!(
        manager.degradation_level("advanced-search"),
        DegradationLevel::Reduced
    );

    // DISABLED: neither path runs
    manager.degrade_feature("advanced-search", DegradationLevel::Disabled, "test");
    let err: Result<String> = manager
        .execute_with_degradation(
            "advanced-search",
            || async { Ok("full".to_string()) },
            || async { Ok("partial".to_string()) },
        )
        .await;
    assert!(matches!(err.unwrap_err(), AuthzError::FeatureDisabled { .. }));
}

#[tokio::test]
async fn engine_emergency_mode_keeps_critical_features() {
    let engine = AuthzEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryPolicyStore::new()),
        Arc::new(InMemoryDelegationStore::new()),
        Arc::new(MemoryAuditSink::new()),
    );

    engine.degradation().enter_emergency_mode();
    assert!(engine.degradation().is_feature_available("authorization"));
    assert!(engine.degradation().is_feature_available("authentication"));
    assert!(engine.degradation().is_feature_available("basic-crud"));
    assert!(!engine.degradation().is_feature_available("reporting"));

    engine.degradation().exit_emergency_mode();
    assert!(engine.degradation().is_feature_available("reporting"));
}

#[tokio::test]
async fn in_flight_check_completes_after_force_open() {
    let registry = Arc::new(CircuitBreakerRegistry::new(spec_config()));
    let breaker = registry.breaker("slow-op");

    let slow = breaker.execute(async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok::<_, AuthzError>(7u32)
    });

    // open the breaker while the call is in flight; the call still
    // completes and reports its own outcome
    let opener = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.breaker("slow-op").force_open();
    };

    let (result, _) = tokio::join!(slow, opener);
    assert_eq!(result.unwrap(), 7);
}
