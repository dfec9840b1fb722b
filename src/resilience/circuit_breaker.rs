//! Circuit breaker for protecting against cascading failures
//!
//! # States
//!
//! ```text
//! CLOSED → OPEN:      failure count reaches threshold inside the window
//! OPEN → HALF_OPEN:   first call attempt after the recovery timeout
//! HALF_OPEN → CLOSED: success threshold reached
//! HALF_OPEN → OPEN:   any single failure
//! ```
//!
//! State and counters live in atomics; transitions use compare-and-swap so
//! exactly one concurrent attempt performs each transition.

use crate::error::{AuthzError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal execution; failures are tallied
    Closed,
    /// Calls are short-circuited until the recovery timeout elapses
    Open,
    /// Trial calls are allowed; successes are tallied
    HalfOpen,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside the window required to open the breaker
    pub failure_threshold: u32,
    /// Rolling window inside which failures count toward the threshold
    pub failure_window: Duration,
    /// How long the breaker stays open before allowing a trial call
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes required to close the breaker
    pub success_threshold: u32,
    /// When false, an open breaker never recovers on its own
    pub auto_recovery: bool,
}

impl CircuitBreakerConfig {
    /// Tolerant defaults for routine operations
    pub fn default_config() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 3,
            auto_recovery: true,
        }
    }

    /// Stricter settings for critical dependencies: trips earlier, recovers
    /// more cautiously
    pub fn critical() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            auto_recovery: true,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerStatus {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failure tally (CLOSED window)
    pub failure_count: u32,
    /// Success tally (HALF_OPEN trials)
    pub success_count: u32,
    /// Milliseconds since the most recent failure, if any
    pub last_failure_age_ms: Option<u64>,
}

impl CircuitBreakerStatus {
    /// The guarded dependency appears healthy
    pub fn healthy(&self) -> bool {
        self.state == CircuitState::Closed
    }

    /// The breaker is currently rejecting calls
    pub fn failing(&self) -> bool {
        self.state == CircuitState::Open
    }
}

/// Per-named-operation failure-tracking state machine
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    window_start_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    transition_ms: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            window_start_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            transition_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Reading does not trigger transitions.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run the operation under breaker protection.
    ///
    /// Returns [`AuthzError::CircuitOpen`] without running the operation
    /// when the breaker is open and the recovery timeout has not elapsed.
    pub async fn execute<T, Fut>(&self, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if !self.can_execute() {
            debug!(breaker = %self.name, "circuit open, short-circuiting call");
            return Err(AuthzError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        match operation.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure();
                Err(error)
            }
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// In OPEN, the first call after the recovery timeout flips the breaker
    /// to HALF_OPEN (when auto-recovery is enabled) and proceeds as a trial.
    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => self.should_attempt_recovery(),
        }
    }

    /// Force CLOSED and zero all counters
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.transition_ms.store(self.now_ms(), Ordering::SeqCst);
        info!(breaker = %self.name, "circuit breaker manually reset to CLOSED");
    }

    /// Force OPEN regardless of counters
    pub fn force_open(&self) {
        self.state.store(STATE_OPEN, Ordering::SeqCst);
        self.transition_ms.store(self.now_ms(), Ordering::SeqCst);
        warn!(breaker = %self.name, "circuit breaker forced to OPEN");
    }

    /// Status snapshot
    pub fn status(&self) -> CircuitBreakerStatus {
        let last_failure = self.last_failure_ms.load(Ordering::SeqCst);
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::SeqCst),
            success_count: self.success_count.load(Ordering::SeqCst),
            last_failure_age_ms: (last_failure > 0)
                .then(|| self.now_ms().saturating_sub(last_failure)),
        }
    }

    fn on_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    breaker = %self.name,
                    successes,
                    threshold = self.config.success_threshold,
                    "half-open trial succeeded"
                );
                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = self.now_ms();
        self.last_failure_ms.store(now, Ordering::SeqCst);

        match self.state() {
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Closed => {
                let window = self.config.failure_window.as_millis() as u64;
                let window_start = self.window_start_ms.load(Ordering::SeqCst);

                // failures outside the window don't count: restart the tally
                let failures = if now.saturating_sub(window_start) > window {
                    self.window_start_ms.store(now, Ordering::SeqCst);
                    self.failure_count.store(1, Ordering::SeqCst);
                    1
                } else {
                    let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                    if count == 1 {
                        self.window_start_ms.store(now, Ordering::SeqCst);
                    }
                    count
                };

                debug!(
                    breaker = %self.name,
                    failures,
                    threshold = self.config.failure_threshold,
                    "recorded failure"
                );
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn should_attempt_recovery(&self) -> bool {
        if !self.config.auto_recovery {
            return false;
        }

        let elapsed = self
            .now_ms()
            .saturating_sub(self.transition_ms.load(Ordering::SeqCst));
        if elapsed < self.config.recovery_timeout.as_millis() as u64 {
            return false;
        }

        self.transition_to_half_open();
        // either this thread performed the transition or a concurrent one
        // did; trial calls are allowed in HALF_OPEN either way
        self.state() == CircuitState::HalfOpen
    }

    fn transition_to_closed(&self) {
        if self
            .state
            .compare_exchange(
                STATE_HALF_OPEN,
                STATE_CLOSED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.failure_count.store(0, Ordering::SeqCst);
            self.success_count.store(0, Ordering::SeqCst);
            self.transition_ms.store(self.now_ms(), Ordering::SeqCst);
            info!(breaker = %self.name, "circuit breaker transitioned to CLOSED");
        }
    }

    fn transition_to_open(&self) {
        let previous = self.state.swap(STATE_OPEN, Ordering::SeqCst);
        if previous != STATE_OPEN {
            self.success_count.store(0, Ordering::SeqCst);
            self.transition_ms.store(self.now_ms(), Ordering::SeqCst);
            warn!(breaker = %self.name, "circuit breaker transitioned to OPEN");
        }
    }

    fn transition_to_half_open(&self) {
        if self
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_HALF_OPEN,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.success_count.store(0, Ordering::SeqCst);
            self.transition_ms.store(self.now_ms(), Ordering::SeqCst);
            info!(breaker = %self.name, "circuit breaker transitioned to HALF_OPEN");
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
