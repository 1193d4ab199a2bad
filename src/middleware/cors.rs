// ABOUTME: CORS middleware configuration for the HTTP endpoints
// ABOUTME: Agent clients fetch OAuth metadata and token endpoints cross-origin
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use http::{header::HeaderName, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Configure CORS for the server
///
/// The OAuth discovery documents, dynamic client registration and the
/// token endpoint are fetched cross-origin by agent clients. Responses
/// never rely on ambient credentials (the builder default), so the
/// session cookie stays same-origin.
#[must_use]
pub fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("origin"),
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
}
