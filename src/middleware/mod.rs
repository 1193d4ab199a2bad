// ABOUTME: HTTP middleware for cross-cutting request concerns
// ABOUTME: Rate limiting ahead of the router plus CORS configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Middleware applied around the route handlers

/// CORS configuration for cross-origin agent clients
pub mod cors;
/// Sliding-window rate limiting for credential-bearing POST routes
pub mod rate_limiting;

pub use cors::setup_cors;
pub use rate_limiting::{
    rate_limit_middleware, MemoryRateLimitStore, RateLimitCounter, RateLimitStore,
};
