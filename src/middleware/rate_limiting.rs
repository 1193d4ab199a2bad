// ABOUTME: Sliding-window rate limiting middleware for credential-bearing POST routes
// ABOUTME: Counts per route and client IP through a pluggable RateLimitStore seam
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Rate Limiting Middleware
//!
//! A fixed set of POST routes accepts credentials or mints tokens; each
//! gets a sliding window counted per `(route, client IP)`. The counter
//! lives behind [`RateLimitStore`] so a multi-node deployment can swap
//! the shipped in-memory store for a shared one.
//!
//! Failure handling is deliberately asymmetric: a request whose client
//! IP cannot be resolved, or that hits a transient store error, passes
//! through unlimited; a missing store binding while limiting is enabled
//! is a deployment error and fails the request with a 500.

use crate::config::environment::RateLimitConfig;
use crate::errors::{AppError, AppResult};
use crate::security::audit::{client_ip, AuditCategory, AuditEvent, AuditResult};
use crate::server::ServerResources;
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use dashmap::DashMap;
use http::{HeaderValue, Method};
use std::sync::Arc;

/// POST routes subject to rate limiting; everything else bypasses
const LIMITED_ROUTES: [&str; 4] = ["/auth", "/oauth/authorize", "/oauth/token", "/oauth/register"];

/// Map size at which the in-memory store sweeps expired counters
const SWEEP_THRESHOLD: usize = 10_000;

/// Counter state for one `(route, client IP)` window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCounter {
    /// Requests seen in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window resets
    pub reset_at_epoch_ms: i64,
}

/// Outcome of counting one request against its window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request exceeded the window maximum
    pub limited: bool,
    /// Seconds until the window resets, rounded up
    pub retry_after_secs: i64,
}

/// TTL'd counter storage keyed by `"<route>:<ip>"`
///
/// Implementations may expire entries lazily; callers treat an entry
/// whose `reset_at_epoch_ms` has passed as absent regardless.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Read the counter for a key
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable. Callers treat this
    /// as transient and let the request through.
    async fn get(&self, key: &str) -> AppResult<Option<RateLimitCounter>>;

    /// Persist the counter for a key, valid for roughly `ttl_secs`
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn put(&self, key: &str, counter: RateLimitCounter, ttl_secs: u64) -> AppResult<()>;
}

/// In-memory store for single-node deployments
///
/// `DashMap` gives sharded locking per key; expired entries are dropped
/// on read, plus a full sweep once the map outgrows [`SWEEP_THRESHOLD`].
#[derive(Default)]
pub struct MemoryRateLimitStore {
    counters: DashMap<String, RateLimitCounter>,
}

impl MemoryRateLimitStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    fn sweep(&self, now_ms: i64) {
        if self.counters.len() > SWEEP_THRESHOLD {
            self.counters
                .retain(|_, counter| counter.reset_at_epoch_ms > now_ms);
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, key: &str) -> AppResult<Option<RateLimitCounter>> {
        let now_ms = Utc::now().timestamp_millis();
        let counter = self.counters.get(key).map(|entry| *entry.value());
        match counter {
            Some(counter) if counter.reset_at_epoch_ms <= now_ms => {
                self.counters.remove(key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, key: &str, counter: RateLimitCounter, _ttl_secs: u64) -> AppResult<()> {
        self.counters.insert(key.to_owned(), counter);
        self.sweep(Utc::now().timestamp_millis());
        Ok(())
    }
}

/// Rate limiting middleware applied ahead of the router
///
/// Layered via `axum::middleware::from_fn_with_state` so it shares the
/// [`ServerResources`] state with the route handlers it protects.
pub async fn rate_limit_middleware(
    State(resources): State<Arc<ServerResources>>,
    req: Request,
    next: Next,
) -> Response {
    let limits = &resources.config.security.rate_limit;
    if !limits.enabled || !is_limited_route(req.method(), req.uri().path()) {
        return next.run(req).await;
    }
    let path = req.uri().path().to_owned();

    let Some(store) = resources.rate_limit_store.as_ref() else {
        // Enabled with nothing to count against is a deployment error,
        // not a reason to let credential endpoints run unlimited
        tracing::error!(path = %path, "rate limiting enabled but no store is bound");
        return AppError::config("Rate limiting misconfigured").into_response();
    };

    let Some(ip) = client_ip(req.headers()) else {
        tracing::debug!(path = %path, "client IP not resolvable, skipping rate limit");
        return next.run(req).await;
    };

    let key = format!("{path}:{ip}");
    match count_request(store.as_ref(), &key, limits).await {
        Ok(decision) if decision.limited => {
            AuditEvent::new(audit_category(&path), "rate_limit", AuditResult::RateLimited)
                .with_ip(Some(&ip))
                .with_path(&path)
                .emit();
            rate_limited_response(decision.retry_after_secs)
        }
        Ok(_) => next.run(req).await,
        Err(e) => {
            tracing::warn!(error = %e, path = %path, "rate limit store unavailable, allowing request");
            next.run(req).await
        }
    }
}

/// Whether this method + path combination is subject to limiting
fn is_limited_route(method: &Method, path: &str) -> bool {
    method == Method::POST && LIMITED_ROUTES.contains(&path)
}

/// Audit category for a limited path
fn audit_category(path: &str) -> AuditCategory {
    if path.starts_with("/oauth") {
        AuditCategory::Oauth
    } else {
        AuditCategory::Auth
    }
}

/// Count one request against its window and decide
///
/// An absent or expired window restarts at zero before the increment,
/// so the first request of a window always passes.
async fn count_request(
    store: &dyn RateLimitStore,
    key: &str,
    limits: &RateLimitConfig,
) -> AppResult<RateLimitDecision> {
    let now_ms = Utc::now().timestamp_millis();
    let window_ms = i64::try_from(limits.window_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);

    let mut counter = match store.get(key).await? {
        Some(counter) if counter.reset_at_epoch_ms > now_ms => counter,
        _ => RateLimitCounter {
            count: 0,
            reset_at_epoch_ms: now_ms.saturating_add(window_ms),
        },
    };
    counter.count = counter.count.saturating_add(1);

    // A failed persist only loses this increment; the decision below
    // still stands for the current request
    if let Err(e) = store.put(key, counter, limits.window_seconds).await {
        tracing::warn!(error = %e, "failed to persist rate limit counter");
    }

    Ok(RateLimitDecision {
        limited: counter.count > limits.requests_per_window,
        retry_after_secs: retry_after_secs(counter.reset_at_epoch_ms, now_ms),
    })
}

/// Seconds until the window resets, rounded up, never negative
fn retry_after_secs(reset_at_epoch_ms: i64, now_ms: i64) -> i64 {
    (reset_at_epoch_ms.saturating_sub(now_ms).max(0) + 999) / 1000
}

/// 429 response with `Retry-After` and the standard error body
fn rate_limited_response(retry_after_secs: i64) -> Response {
    let mut response = AppError::rate_limit_exceeded(retry_after_secs).into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response
            .headers_mut()
            .insert(http::header::RETRY_AFTER, value);
    }
    response
}
