//! Token bucket rate limiting per client.
//!
//! Authenticated requests are keyed by user, anonymous ones by client IP.
//! The login route has its own, stricter IP-keyed bucket. Rates are read from
//! the live config on every check so a reload applies immediately.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::SharedConfig;
use crate::http::middleware::auth::bearer_token;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Login burst relative to its per-second rate.
const LOGIN_BURST_FACTOR: f64 = 5.0;

/// Buckets untouched for this long are dropped during cleanup.
const IDLE_BUCKET: Duration = Duration::from_secs(600);

/// Cleanup runs once the table grows past this size.
const CLEANUP_THRESHOLD: usize = 10_000;

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Which bucket family a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Api,
    Login,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Api => "api",
            Scope::Login => "login",
        }
    }
}

pub struct RateLimiter {
    buckets: DashMap<(Scope, String), TokenBucket>,
    config: SharedConfig,
}

impl RateLimiter {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Take one token for `key`; `false` means the client is over its limit.
    pub fn check(&self, scope: Scope, key: &str) -> bool {
        let (enabled, rate, burst) = {
            let cfg = self.config.load();
            let limits = &cfg.rate_limit;
            match scope {
                Scope::Api => (
                    limits.enabled,
                    f64::from(limits.requests_per_second),
                    f64::from(limits.burst_size),
                ),
                Scope::Login => (
                    limits.enabled,
                    f64::from(limits.login_per_second),
                    f64::from(limits.login_per_second) * LOGIN_BURST_FACTOR,
                ),
            }
        };
        if !enabled {
            return true;
        }

        if self.buckets.len() > CLEANUP_THRESHOLD {
            self.purge_idle(IDLE_BUCKET);
        }

        self.buckets
            .entry((scope, key.to_string()))
            .or_insert_with(|| TokenBucket::new(burst))
            .try_acquire(burst, rate)
    }

    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.last_update.elapsed() < max_idle);
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Rate limiting middleware for the API router.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let scope = if request.uri().path().ends_with("/auth/login") {
        Scope::Login
    } else {
        Scope::Api
    };

    let user = match scope {
        Scope::Login => None,
        Scope::Api => bearer_token(request.headers())
            .and_then(|token| state.crm.sessions.get(token))
            .map(|session| session.user_id),
    };
    let key = match user {
        Some(user_id) => format!("user:{user_id}"),
        None => match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
            None => "ip:unknown".to_string(),
        },
    };

    if state.limiter.check(scope, &key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, scope = scope.as_str(), "Rate limit exceeded");
        metrics::record_rate_limited(scope.as_str());
        ApiError::rate_limited().into_response()
    }
}
