// ABOUTME: Route module organization for the epicflare HTTP endpoints
// ABOUTME: Each domain module owns its route definitions and thin handler functions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Route modules for the epicflare server
//!
//! Routes are organized by domain. Each module contains only route
//! definitions and handler functions that delegate to the auth, crypto
//! and database layers.

/// Login, signup, session introspection and logout routes
pub mod auth;
/// Health check route
pub mod health;
/// MCP protected-resource routes and the bearer-token guard
pub mod mcp;
/// Password reset request and confirmation routes
pub mod password_reset;

/// Authentication route handlers
pub use auth::AuthRoutes;
/// Health check route handlers
pub use health::HealthRoutes;
/// MCP resource route handlers
pub use mcp::McpRoutes;
/// Context injected by the MCP resource guard
pub use mcp::ResourceContext;
/// Password reset route handlers
pub use password_reset::PasswordResetRoutes;
