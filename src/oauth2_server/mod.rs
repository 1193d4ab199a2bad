// ABOUTME: OAuth 2.0 authorization server with grant storage behind a provider trait
// ABOUTME: RFC 7591 client registration plus authorization_code grant with PKCE S256
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # OAuth 2.0 Server
//!
//! Authorization server for agent clients connecting to the MCP surface.
//! The authorize flow and the resource guard consume grant storage through
//! the [`OAuthProvider`] trait; [`GrantStore`] is the shipped sqlite-backed
//! implementation. [`AuthorizationServer`] covers dynamic client
//! registration and the token endpoint.

/// OAuth 2.0 authorization server endpoints (registration, token exchange)
pub mod endpoints;
/// OAuth 2.0 data models and request/response types
pub mod models;
/// Provider trait and the shipped grant store
pub mod provider;
/// HTTP route handlers for the OAuth 2.0 surface
pub mod routes;

pub use endpoints::AuthorizationServer;
pub use models::OAuth2Error;
pub use provider::{GrantStore, OAuthProvider};
pub use routes::OAuth2Routes;

/// Scopes this authorization server understands
pub const SUPPORTED_SCOPES: [&str; 2] = ["profile", "email"];

/// Resolve requested scopes against the supported set
///
/// An empty request resolves to the full default set. Any unsupported
/// scope yields an error message naming the offending scopes.
///
/// # Errors
///
/// Returns the user-facing error message listing the unsupported scopes.
pub fn resolve_scopes(requested: &[String]) -> Result<Vec<String>, String> {
    if requested.is_empty() {
        return Ok(SUPPORTED_SCOPES.iter().map(|s| (*s).to_owned()).collect());
    }

    let unsupported: Vec<&str> = requested
        .iter()
        .filter(|scope| !SUPPORTED_SCOPES.contains(&scope.as_str()))
        .map(String::as_str)
        .collect();

    if unsupported.is_empty() {
        Ok(requested.to_vec())
    } else {
        Err(format!(
            "Unsupported scopes requested: {}",
            unsupported.join(", ")
        ))
    }
}
