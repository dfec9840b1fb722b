//! Graceful degradation of features during partial failures
//!
//! Each named feature carries a degradation level. Primary operations run
//! while a feature is NORMAL; a primary failure marks it REDUCED and the
//! degraded path takes over until a health-check sweep observes the mapped
//! circuit breaker closed again.

use super::registry::CircuitBreakerRegistry;
use crate::error::{AuthzError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Declared operating mode of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationLevel {
    /// Full functionality
    Normal,
    /// Degraded path only
    Reduced,
    /// Feature unavailable
    Disabled,
}

/// A feature's level with its derived availability flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationStatus {
    /// Feature name
    pub feature: String,
    /// Current level
    pub level: DegradationLevel,
    /// False only when the feature is disabled
    pub available: bool,
}

/// Features that survive emergency mode
const CRITICAL_FEATURES: [&str; 3] = ["authentication", "authorization", "basic-crud"];

/// Features tracked out of the box
const DEFAULT_FEATURES: [&str; 8] = [
    "authentication",
    "authorization",
    "basic-crud",
    "advanced-search",
    "reporting",
    "notifications",
    "audit-logging",
    "external-integrations",
];

/// Per-feature availability driven by circuit-breaker health
pub struct DegradationManager {
    levels: DashMap<String, DegradationLevel>,
    registry: Arc<CircuitBreakerRegistry>,
}

impl DegradationManager {
    /// Create a manager seeded with the default feature set, all NORMAL
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        let levels = DashMap::new();
        for feature in DEFAULT_FEATURES {
            levels.insert(feature.to_string(), DegradationLevel::Normal);
        }
        Self { levels, registry }
    }

    /// A feature is available unless it is DISABLED. Unknown features are
    /// treated as available.
    pub fn is_feature_available(&self, feature: &str) -> bool {
        self.degradation_level(feature) != DegradationLevel::Disabled
    }

    /// Current level of a feature (NORMAL when unknown)
    pub fn degradation_level(&self, feature: &str) -> DegradationLevel {
        self.levels
            .get(feature)
            .map(|level| *level)
            .unwrap_or(DegradationLevel::Normal)
    }

    /// Move a feature to the given level
    pub fn degrade_feature(&self, feature: &str, level: DegradationLevel, reason: &str) {
        let previous = self.levels.insert(feature.to_string(), level);
        warn!(
            feature = %feature,
            previous = ?previous,
            level = ?level,
            reason = %reason,
            "feature degraded"
        );
    }

    /// Restore a feature to NORMAL
    pub fn restore_feature(&self, feature: &str) {
        let previous = self
            .levels
            .insert(feature.to_string(), DegradationLevel::Normal);
        info!(feature = %feature, previous = ?previous, "feature restored to NORMAL");
    }

    /// Run an operation honoring the feature's degradation level.
    ///
    /// NORMAL runs the primary; a primary failure marks the feature REDUCED
    /// and runs the degraded path (whose failure is propagated). REDUCED
    /// runs the degraded path directly. DISABLED fails with
    /// [`AuthzError::FeatureDisabled`] without running either.
    pub async fn execute_with_degradation<T, P, PFut, D, DFut>(
        &self,
        feature: &str,
        primary: P,
        degraded: D,
    ) -> Result<T>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T>>,
        D: FnOnce() -> DFut,
        DFut: Future<Output = Result<T>>,
    {
        match self.degradation_level(feature) {
            DegradationLevel::Normal => match primary().await {
                Ok(value) => Ok(value),
                Err(err) => {
                    warn!(feature = %feature, %err, "primary operation failed, degrading");
                    self.degrade_feature(feature, DegradationLevel::Reduced, "primary operation failure");
                    degraded().await
                }
            },
            DegradationLevel::Reduced => {
                debug!(feature = %feature, "feature in reduced mode, using degraded operation");
                degraded().await
            }
            DegradationLevel::Disabled => {
                warn!(feature = %feature, "feature is disabled");
                Err(AuthzError::FeatureDisabled {
                    feature: feature.to_string(),
                })
            }
        }
    }

    /// Inspect circuit-breaker health and adjust feature levels: an OPEN
    /// breaker degrades its mapped feature to REDUCED; a CLOSED breaker
    /// restores a previously degraded feature.
    ///
    /// Driven by an external scheduler; safe to invoke concurrently.
    pub fn perform_health_check(&self) {
        for (name, status) in self.registry.status() {
            let feature = Self::feature_for_breaker(&name);
            if status.failing() {
                self.degrade_feature(&feature, DegradationLevel::Reduced, "circuit breaker is open");
            } else if status.healthy()
                && self.degradation_level(&feature) != DegradationLevel::Normal
            {
                self.restore_feature(&feature);
            }
        }
    }

    /// All tracked features and their status
    pub fn get_degradation_status(&self) -> HashMap<String, DegradationStatus> {
        self.levels
            .iter()
            .map(|entry| {
                let level = *entry.value();
                (
                    entry.key().clone(),
                    DegradationStatus {
                        feature: entry.key().clone(),
                        level,
                        available: level != DegradationLevel::Disabled,
                    },
                )
            })
            .collect()
    }

    /// Disable every non-critical feature
    pub fn enter_emergency_mode(&self) {
        error!("entering emergency mode, disabling non-critical features");
        let features: Vec<String> = self.levels.iter().map(|e| e.key().clone()).collect();
        for feature in features {
            if !CRITICAL_FEATURES.contains(&feature.as_str()) {
                self.degrade_feature(&feature, DegradationLevel::Disabled, "emergency mode activated");
            }
        }
    }

    /// Restore every feature to NORMAL
    pub fn exit_emergency_mode(&self) {
        info!("exiting emergency mode, restoring all features");
        let features: Vec<String> = self.levels.iter().map(|e| e.key().clone()).collect();
        for feature in features {
            self.restore_feature(&feature);
        }
    }

    /// Map a breaker name onto the feature it guards
    fn feature_for_breaker(breaker_name: &str) -> String {
        if breaker_name.contains("database") {
            "basic-crud".to_string()
        } else if breaker_name.contains("auth") {
            "authentication".to_string()
        } else if breaker_name.contains("external") {
            "external-integrations".to_string()
        } else {
            breaker_name.to_string()
        }
    }
}
