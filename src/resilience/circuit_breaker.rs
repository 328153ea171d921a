//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since opening
//! Half-Open → Closed: consecutive successes >= success_threshold
//! Half-Open → Open: any trial fails (recovery clock restarts)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), one lock per service
//! - Fail fast in Open state (no waiting for timeout)
//! - Bounded concurrent trials in Half-Open
//! - Admission returns a permit; an unreported permit counts as a failure
//! - Outcomes of calls admitted before the last transition are ignored
//! - Only `sync_services` creates records; the route table owns the set

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::resilience::timeouts::round_up_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub half_open_max_calls: u32,
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            success_threshold: config.success_threshold.max(1),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_state_change: Instant,
    half_open_in_flight: u32,
    generation: u64,
}

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_state_change: now,
            half_open_in_flight: 0,
            generation: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.last_state_change = now;
        self.half_open_in_flight = 0;
        self.generation += 1;
        if to != CircuitState::Open {
            self.consecutive_failures = 0;
        }
        self.consecutive_successes = 0;
    }
}

/// Breaker record of a single service.
#[derive(Debug)]
pub struct ServiceBreaker {
    service: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
}

impl ServiceBreaker {
    fn new(service: String, settings: BreakerSettings, now: Instant) -> Self {
        Self {
            service,
            settings,
            inner: Mutex::new(BreakerState::new(now)),
        }
    }

    fn admit(self: &Arc<Self>, now: Instant) -> Result<BreakerPermit, GatewayError> {
        let mut st = self.inner.lock();

        if st.state == CircuitState::Open {
            let elapsed = now.saturating_duration_since(st.last_state_change);
            if elapsed < self.settings.recovery_timeout {
                return Err(self.open_error(self.settings.recovery_timeout - elapsed));
            }
            st.transition(CircuitState::HalfOpen, now);
            tracing::info!(service = %self.service, "Circuit half-open, admitting trial calls");
        }

        let trial = st.state == CircuitState::HalfOpen;
        if trial {
            if st.half_open_in_flight >= self.settings.half_open_max_calls {
                return Err(self.open_error(Duration::from_secs(1)));
            }
            st.half_open_in_flight += 1;
        }

        Ok(BreakerPermit {
            breaker: self.clone(),
            generation: st.generation,
            trial,
            reported: false,
        })
    }

    fn open_error(&self, retry_after: Duration) -> GatewayError {
        GatewayError::CircuitOpen {
            service: self.service.clone(),
            retry_after: round_up_secs(retry_after),
        }
    }

    fn on_success(&self, generation: u64, trial: bool, now: Instant) {
        let mut st = self.inner.lock();
        if st.generation != generation {
            return;
        }
        if trial {
            st.half_open_in_flight = st.half_open_in_flight.saturating_sub(1);
        }
        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = 0;
                st.consecutive_successes = st.consecutive_successes.saturating_add(1);
            }
            CircuitState::HalfOpen => {
                st.consecutive_successes += 1;
                if st.consecutive_successes >= self.settings.success_threshold {
                    st.transition(CircuitState::Closed, now);
                    tracing::info!(service = %self.service, "Circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64, trial: bool, now: Instant) {
        let mut st = self.inner.lock();
        if st.generation != generation {
            return;
        }
        if trial {
            st.half_open_in_flight = st.half_open_in_flight.saturating_sub(1);
        }
        match st.state {
            CircuitState::Closed => {
                st.consecutive_successes = 0;
                st.consecutive_failures += 1;
                if st.consecutive_failures >= self.settings.failure_threshold {
                    let failures = st.consecutive_failures;
                    st.transition(CircuitState::Open, now);
                    tracing::warn!(service = %self.service, failures, "Circuit opened");
                }
            }
            CircuitState::HalfOpen => {
                st.consecutive_failures += 1;
                st.transition(CircuitState::Open, now);
                tracing::warn!(service = %self.service, "Trial call failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    fn reset(&self, now: Instant) {
        let mut st = self.inner.lock();
        st.transition(CircuitState::Closed, now);
    }

    fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        let st = self.inner.lock();
        BreakerSnapshot {
            service: self.service.clone(),
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            consecutive_successes: st.consecutive_successes,
            seconds_since_state_change: now
                .saturating_duration_since(st.last_state_change)
                .as_secs(),
            half_open_in_flight: st.half_open_in_flight,
        }
    }
}

/// Admission ticket for one upstream attempt.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). Dropping it unreported records a failure, so
/// cancelled calls count like timeouts.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<ServiceBreaker>,
    generation: u64,
    trial: bool,
    reported: bool,
}

impl BreakerPermit {
    pub fn service(&self) -> &str {
        &self.breaker.service
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(self) {
        self.success_at(Instant::now());
    }

    pub fn failure(self) {
        self.failure_at(Instant::now());
    }

    pub(crate) fn success_at(mut self, now: Instant) {
        self.reported = true;
        self.breaker.on_success(self.generation, self.trial, now);
    }

    pub(crate) fn failure_at(mut self, now: Instant) {
        self.reported = true;
        self.breaker.on_failure(self.generation, self.trial, now);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.reported {
            tracing::debug!(service = %self.breaker.service, "Attempt abandoned, counting as failure");
            self.breaker
                .on_failure(self.generation, self.trial, Instant::now());
        }
    }
}

/// Point-in-time view of a service breaker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub seconds_since_state_change: u64,
    pub half_open_in_flight: u32,
}

/// Registry of per-service breakers.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    services: DashMap<String, Arc<ServiceBreaker>>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            services: DashMap::new(),
        }
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    /// Ask to call `service`; fails fast with `CircuitOpen`.
    pub fn admit(&self, service: &str) -> Result<BreakerPermit, GatewayError> {
        self.admit_at(service, Instant::now())
    }

    /// Services outside the route table get a detached breaker whose
    /// outcomes are discarded, so late requests never resurrect a record.
    pub(crate) fn admit_at(&self, service: &str, now: Instant) -> Result<BreakerPermit, GatewayError> {
        let breaker = match self.services.get(service) {
            Some(registered) => registered.clone(),
            None => {
                tracing::debug!(service, "Admitting call for unregistered service");
                Arc::new(ServiceBreaker::new(service.to_string(), self.settings, now))
            }
        };
        breaker.admit(now)
    }

    /// Force `service` back to Closed with zeroed counters. Idempotent.
    pub fn force_reset(&self, service: &str) -> bool {
        match self.services.get(service) {
            Some(breaker) => {
                breaker.reset(Instant::now());
                tracing::info!(service, "Circuit breaker reset by admin");
                true
            }
            None => false,
        }
    }

    pub fn state(&self, service: &str) -> Option<CircuitState> {
        self.services.get(service).map(|b| b.inner.lock().state)
    }

    pub fn snapshot(&self, service: &str) -> Option<BreakerSnapshot> {
        let now = Instant::now();
        self.services.get(service).map(|b| b.snapshot(now))
    }

    /// Every breaker, ordered by service name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut all: Vec<_> = self.services.iter().map(|b| b.snapshot(now)).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    /// Keep records for exactly these services; survivors keep their state.
    pub fn sync_services<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let now = Instant::now();
        let wanted: HashSet<&str> = names.into_iter().collect();
        self.services.retain(|name, _| wanted.contains(name.as_str()));
        for name in wanted {
            self.services
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ServiceBreaker::new(name.to_string(), self.settings, now)));
        }
    }
}
