//! Service health state machine.
//!
//! # States
//! - Unknown: no probe has completed yet
//! - Healthy: last probe succeeded within the latency budget
//! - Degraded: last probe slow, or failing below the threshold
//! - Unhealthy: consecutive failures >= unhealthy_threshold
//!
//! # State Transitions
//! ```text
//! any → Healthy:   probe succeeds under degraded_latency
//! any → Degraded:  probe succeeds slowly, or fails below the threshold
//! any → Unhealthy: consecutive failures >= unhealthy_threshold
//! ```
//!
//! # Design Decisions
//! - Records are immutable values; each probe produces the next one
//! - A single success clears the failure streak
//! - Probe results never feed the circuit breaker

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::HealthCheckConfig;

const LATENCY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Value exported on the `gateway_service_health` gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unknown | HealthStatus::Unhealthy => 0.0,
        }
    }
}

/// What one probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency: Duration },
    Failure { latency: Duration, error: String },
}

/// Thresholds a record is judged against.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub degraded_latency: Duration,
    pub unhealthy_threshold: u32,
}

impl From<&HealthCheckConfig> for HealthThresholds {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            degraded_latency: Duration::from_millis(config.degraded_latency_ms),
            unhealthy_threshold: config.unhealthy_threshold.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub service: String,
    pub status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    /// Mean latency of the recent successful probes.
    pub average_latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    #[serde(skip)]
    recent_latencies: VecDeque<u64>,
}

impl HealthRecord {
    pub fn unknown(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Unknown,
            last_checked_at: None,
            last_latency_ms: None,
            average_latency_ms: None,
            consecutive_failures: 0,
            last_error: None,
            recent_latencies: VecDeque::new(),
        }
    }

    /// The record after observing `outcome` at `at`.
    pub fn observe(&self, outcome: &ProbeOutcome, thresholds: &HealthThresholds, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_checked_at = Some(at);

        match outcome {
            ProbeOutcome::Success { latency } => {
                let ms = latency.as_millis() as u64;
                next.last_latency_ms = Some(ms);
                next.consecutive_failures = 0;
                next.last_error = None;
                next.status = if *latency > thresholds.degraded_latency {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                if next.recent_latencies.len() == LATENCY_WINDOW {
                    next.recent_latencies.pop_front();
                }
                next.recent_latencies.push_back(ms);
                let sum: u64 = next.recent_latencies.iter().sum();
                next.average_latency_ms = Some(sum / next.recent_latencies.len() as u64);
            }
            ProbeOutcome::Failure { latency, error } => {
                next.last_latency_ms = Some(latency.as_millis() as u64);
                next.consecutive_failures = self.consecutive_failures.saturating_add(1);
                next.last_error = Some(error.clone());
                next.status = if next.consecutive_failures >= thresholds.unhealthy_threshold {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
            }
        }
        next
    }
}

/// Fleet-wide health derived from the share of healthy services.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FleetHealth {
    pub status: HealthStatus,
    pub total_services: usize,
    pub healthy_services: usize,
    pub unhealthy_services: usize,
    pub health_percentage: f64,
}

pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> FleetHealth {
    let (mut total, mut healthy) = (0usize, 0usize);
    for status in statuses {
        total += 1;
        if *status == HealthStatus::Healthy {
            healthy += 1;
        }
    }

    let percentage = if total == 0 {
        100.0
    } else {
        healthy as f64 * 100.0 / total as f64
    };
    let status = if percentage >= 80.0 {
        HealthStatus::Healthy
    } else if percentage >= 50.0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    FleetHealth {
        status,
        total_services: total,
        healthy_services: healthy,
        unhealthy_services: total - healthy,
        health_percentage: percentage,
    }
}
