//! Per-job circuit breakers.
//!
//! State is process-local. Under horizontal scale-out each instance keeps
//! its own counters, so protection is best-effort.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. `0` never opens it.
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close it again.
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a run may start now. An open circuit whose timeout has
    /// elapsed moves to half-open and lets one trial request through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| opened.elapsed());
                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            // A run admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if self.config.failure_threshold > 0
                    && inner.consecutive_failures >= self.config.failure_threshold
                {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }
}

/// Settings shared by every breaker the registry creates; the failure
/// threshold comes from each job's config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitDefaults {
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitDefaults {
    fn default() -> Self {
        Self {
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitDefaults {
    #[must_use]
    pub fn from_app_config(config: &pricewatch_core::AppConfig) -> Self {
        Self {
            success_threshold: config.circuit_success_threshold,
            open_timeout: Duration::from_secs(config.circuit_open_timeout_secs),
        }
    }
}

/// Breakers keyed by string, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitDefaults,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(defaults: CircuitDefaults) -> Self {
        Self {
            defaults,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `key`, creating it with `failure_threshold`
    /// if absent. An existing breaker keeps its original configuration.
    pub fn get_or_create(&self, key: &str, failure_threshold: u32) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(key.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold,
                success_threshold: self.defaults.success_threshold,
                open_timeout: self.defaults.open_timeout,
            }))
        }))
    }

    /// Current state of every breaker created so far, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<(String, CircuitState)> = breakers
            .iter()
            .map(|(key, breaker)| (key.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
