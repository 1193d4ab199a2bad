// ABOUTME: Main library entry point for the epicflare auth core
// ABOUTME: Sessions, password auth, OAuth 2.0 authorization server and MCP resource guard
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

#![deny(unsafe_code)]

//! # epicflare auth core
//!
//! The authentication and OAuth authorization core of epicflare, the
//! multi-tenant appliance-energy application with an MCP tool surface
//! for agent clients.
//!
//! ## Features
//!
//! - **Password auth**: PBKDF2-SHA256 credential storage with online
//!   migration of legacy SHA-256 digests
//! - **Sessions**: HMAC-signed session cookies, no server-side session
//!   table
//! - **Password reset**: single-use hashed reset tokens delivered over
//!   email
//! - **OAuth 2.0 server**: dynamic client registration, PKCE-capable
//!   `authorization_code` grant, bearer tokens scoped to this deployment
//! - **MCP resource guard**: bearer verification with protected-resource
//!   metadata discovery for agent clients
//! - **Abuse protection**: sliding-window rate limiting on
//!   credential-bearing routes, audit logging with hashed identifiers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use epicflare_server::config::environment::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = ServerConfig::from_env()?;
//!
//!     println!("epicflare server configured with port: HTTP={}",
//!              config.http_port);
//!
//!     Ok(())
//! }
//! ```

// ── Public API ──────────────────────────────────────────────────────────
// These modules are used by the server binary (src/bin/) and integration
// tests (tests/). They must remain `pub`.

/// Session cookie codec and request-origin helpers
pub mod auth;

/// Configuration management from environment variables
pub mod config;

/// Cryptographic utilities: password KDF, digests, constant-time checks
pub mod crypto;

/// SQLite storage for accounts, reset tokens and OAuth grants
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// Production logging and structured output
pub mod logging;

/// HTTP middleware: rate limiting and CORS
pub mod middleware;

/// Common data models: users, sessions, reset tokens, grant props
pub mod models;

/// Outbound notifications (password-reset email)
pub mod notifications;

/// OAuth 2.0 authorization server (epicflare as provider for MCP clients)
pub mod oauth2_server;

/// `HTTP` routes for auth, password reset, health and the MCP resource
pub mod routes;

/// Audit logging with hashed identifiers
pub mod security;

/// Resource container and HTTP server assembly
pub mod server;
