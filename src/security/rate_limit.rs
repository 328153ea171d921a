//! Tiered fixed-window rate limiting.

use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{RateLimitConfig, TierLimit};
use crate::error::GatewayError;
use crate::resilience::timeouts::round_up_secs;
use crate::observability::metrics;
use crate::routing::descriptor::AuthLevel;
use crate::security::auth::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Default,
    Authenticated,
    Public,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Default => "default",
            Tier::Authenticated => "authenticated",
            Tier::Public => "public",
        }
    }

    /// Verified claims win; anonymous callers of public routes get the public quota.
    pub fn select(claims: Option<&Claims>, route_level: AuthLevel) -> Self {
        match (claims, route_level) {
            (Some(_), _) => Tier::Authenticated,
            (None, AuthLevel::Public) => Tier::Public,
            (None, _) => Tier::Default,
        }
    }
}

/// Who a bucket belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Subject(String),
    Ip(IpAddr),
    Unknown,
}

impl ClientKey {
    pub fn resolve(claims: Option<&Claims>, ip: Option<IpAddr>) -> Self {
        match (claims, ip) {
            (Some(claims), _) => ClientKey::Subject(claims.sub.clone()),
            (None, Some(ip)) => ClientKey::Ip(ip),
            (None, None) => ClientKey::Unknown,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Result of an admitted check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    default: TierLimit,
    authenticated: TierLimit,
    public: TierLimit,
    buckets: DashMap<(ClientKey, Tier), Bucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            default: config.default,
            authenticated: config.authenticated,
            public: config.public,
            buckets: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn tier_limit(&self, tier: Tier) -> TierLimit {
        match tier {
            Tier::Default => self.default,
            Tier::Authenticated => self.authenticated,
            Tier::Public => self.public,
        }
    }

    /// Count one request against the caller's bucket.
    pub fn check(&self, key: &ClientKey, tier: Tier) -> Result<Option<Quota>, GatewayError> {
        self.check_at(key, tier, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        key: &ClientKey,
        tier: Tier,
        now: Instant,
    ) -> Result<Option<Quota>, GatewayError> {
        if !self.enabled {
            return Ok(None);
        }

        let TierLimit { limit, window_secs } = self.tier_limit(tier);
        let window = Duration::from_secs(window_secs);

        let mut bucket = self
            .buckets
            .entry((key.clone(), tier))
            .or_insert_with(|| Bucket {
                window_start: now,
                count: 0,
            });

        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        let elapsed = now.saturating_duration_since(bucket.window_start);
        let reset_after = window.saturating_sub(elapsed);

        if bucket.count >= limit {
            drop(bucket);
            tracing::warn!(client = ?key, tier = tier.as_str(), limit, "Rate limit exceeded");
            metrics::record_rate_limited(tier.as_str());
            return Err(GatewayError::RateLimited {
                tier: tier.as_str(),
                limit,
                retry_after: round_up_secs(reset_after),
            });
        }

        bucket.count += 1;
        Ok(Some(Quota {
            limit,
            remaining: limit - bucket.count,
            reset_after,
        }))
    }

    /// Drop buckets whose window has passed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|(_, tier), bucket| {
            let window = Duration::from_secs(self.tier_limit(*tier).window_secs);
            now.saturating_duration_since(bucket.window_start) < window
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Periodically evict idle buckets until shutdown.
    pub async fn run_sweeper(
        self: std::sync::Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_idle(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.bucket_count(), "Swept idle rate limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper stopping");
                    break;
                }
            }
        }
    }
}
