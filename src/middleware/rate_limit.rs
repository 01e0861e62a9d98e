use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;

use crate::errors::RateLimitConfigError;
use crate::store::{Backend, CounterStore, MemoryCounterStore};

/// Longest accepted window (one year); keeps `Instant + window` in range.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// A named quota class: at most `limit` requests per `window_seconds` per identifier.
///
/// Both values are validated on construction: `limit > 0` and
/// `0 < window_seconds <= MAX_WINDOW_SECONDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    class: &'static str,
    limit: u64,
    window_seconds: u64,
}

impl RateLimitConfig {
    pub const fn try_new(
        class: &'static str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<Self, RateLimitConfigError> {
        if limit == 0 {
            return Err(RateLimitConfigError::ZeroLimit);
        }
        if window_seconds == 0 {
            return Err(RateLimitConfigError::ZeroWindow);
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(RateLimitConfigError::WindowTooLong(window_seconds));
        }
        Ok(Self {
            class,
            limit,
            window_seconds,
        })
    }

    /// Panics on an invalid pair; in a `const` item that is a compile error.
    pub const fn new(class: &'static str, limit: u64, window_seconds: u64) -> Self {
        match Self::try_new(class, limit, window_seconds) {
            Ok(config) => config,
            Err(_) => panic!(
                "rate limit config needs limit > 0 and 0 < window_seconds <= MAX_WINDOW_SECONDS"
            ),
        }
    }

    pub const fn class(&self) -> &'static str {
        self.class
    }

    pub const fn limit(&self) -> u64 {
        self.limit
    }

    pub const fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Identifiers are scoped per class, so the same IP under two classes is
    /// counted independently.
    pub fn key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:{}", self.class, identifier)
    }
}

/// Inbound webhook deliveries.
pub const WEBHOOK_LIMIT: RateLimitConfig = RateLimitConfig::new("webhook", 100, 60);
/// OAuth install/callback flow.
pub const OAUTH_LIMIT: RateLimitConfig = RateLimitConfig::new("oauth", 10, 60);
/// Generic authenticated API routes.
pub const API_LIMIT: RateLimitConfig = RateLimitConfig::new("api", 30, 60);
/// Outbound calls to the partner API, per integration.
pub const PARTNER_API_LIMIT: RateLimitConfig = RateLimitConfig::new("partner-api", 35, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Whole seconds until the window resets; always in `1..=window_seconds`.
    pub reset_in: u64,
}

impl RateLimitResult {
    /// Value for the `Retry-After` header on a 429.
    pub fn retry_after_header(&self) -> String {
        self.reset_in.to_string()
    }
}

/// Fixed-window rate limiter over a [`CounterStore`].
///
/// Windows are fixed, not sliding: a burst straddling a window boundary can
/// see up to twice the nominal rate. When the distributed store fails the
/// limiter fails open (request allowed, warning logged) so a cache outage
/// does not take the partner integration down with it.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn in_process() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()))
    }

    /// Which backend is active. Configuration only, no network round trip.
    pub fn is_distributed_enabled(&self) -> bool {
        self.store.backend() == Backend::Distributed
    }

    pub async fn check(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitResult {
        let key = config.key(identifier);
        let hit = match self.store.hit(&key, config.window()).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(
                    rate_limit = true,
                    class = config.class,
                    error = %e,
                    "counter store unavailable, failing open"
                );
                return RateLimitResult {
                    success: true,
                    limit: config.limit,
                    remaining: config.limit.saturating_sub(1),
                    reset_in: config.window_seconds,
                };
            }
        };

        let result = RateLimitResult {
            success: hit.count <= config.limit,
            limit: config.limit,
            remaining: config.limit.saturating_sub(hit.count),
            reset_in: whole_seconds(hit.reset_in).min(config.window_seconds).max(1),
        };

        if !result.success {
            tracing::info!(
                rate_limit = true,
                class = config.class,
                identifier = identifier,
                count = hit.count,
                limit = config.limit,
                reset_in = result.reset_in,
                "rate limit exceeded"
            );
        }
        result
    }

    pub async fn check_webhook_rate_limit(&self, headers: &HeaderMap) -> RateLimitResult {
        self.check(&client_identifier(headers), &WEBHOOK_LIMIT).await
    }

    pub async fn check_oauth_rate_limit(&self, headers: &HeaderMap) -> RateLimitResult {
        self.check(&client_identifier(headers), &OAUTH_LIMIT).await
    }

    /// `identifier` is typically a user ID, or the client IP for anonymous routes.
    pub async fn check_api_rate_limit(&self, identifier: &str) -> RateLimitResult {
        self.check(identifier, &API_LIMIT).await
    }

    pub async fn check_partner_api_rate_limit(&self, integration_id: &str) -> RateLimitResult {
        self.check(integration_id, &PARTNER_API_LIMIT).await
    }
}

fn whole_seconds(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Best-effort client address: first hop of `X-Forwarded-For`, then
/// `X-Real-IP`, then `"unknown"`. Spoofable; fine for abuse throttling, never
/// for authentication.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    "unknown".to_string()
}
