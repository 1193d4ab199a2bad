// ABOUTME: Bearer-token guard for the MCP resource endpoint plus protected-resource metadata
// ABOUTME: Verifies token audience against the request origin and injects ResourceContext
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # MCP Resource Routes
//!
//! `/mcp` is the OAuth-protected resource. The guard middleware resolves
//! the bearer token through the OAuth provider, checks that the token
//! audience covers this deployment, and hands the authenticated grant
//! props to the wrapped handler through a request extension. Every
//! rejection is a bare `401` whose `WWW-Authenticate` header points
//! agent clients at the protected-resource metadata document, per the
//! OAuth 2.0 protected-resource discovery flow.

use crate::auth::request_origin;
use crate::models::GrantProps;
use crate::oauth2_server::SUPPORTED_SCOPES;
use crate::server::ServerResources;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Path of the protected resource
pub const MCP_RESOURCE_PATH: &str = "/mcp";
/// Well-known path of the protected-resource metadata document
pub const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// Authenticated context handed to the resource handler
///
/// Inserted into request extensions by the guard; handlers downstream
/// of the guard can rely on it being present.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    /// Origin of this deployment as seen by the client
    pub base_url: String,
    /// Grant props issued at authorization time
    pub user: GrantProps,
}

/// MCP resource route handlers
pub struct McpRoutes;

impl McpRoutes {
    /// Create the guarded resource route and the metadata routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        let guarded = Router::new()
            .route(MCP_RESOURCE_PATH, any(Self::handle_resource))
            .route_layer(middleware::from_fn_with_state(
                resources.clone(),
                resource_guard,
            ));

        Router::new()
            .merge(guarded)
            .route(
                PROTECTED_RESOURCE_METADATA_PATH,
                get(Self::handle_metadata),
            )
            // Agent clients also probe the metadata path suffixed with
            // the resource path itself
            .route(
                "/.well-known/oauth-protected-resource/mcp",
                get(Self::handle_metadata),
            )
            .with_state(resources)
    }

    /// The wrapped resource: echoes the authenticated grant identity
    ///
    /// The tool surface behind this endpoint lives in its own service;
    /// this handler is what local deployments and tests talk to.
    async fn handle_resource(Extension(context): Extension<ResourceContext>) -> Json<Value> {
        Json(json!({
            "ok": true,
            "baseUrl": context.base_url,
            "user": context.user,
        }))
    }

    /// Protected-resource metadata document
    async fn handle_metadata(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        let origin = request_origin(&headers, &resources.config.app_base_url);
        Json(json!({
            "resource": format!("{origin}{MCP_RESOURCE_PATH}"),
            "authorization_servers": [origin],
            "scopes_supported": SUPPORTED_SCOPES,
        }))
    }
}

/// Bearer-token guard for the resource route
///
/// Rejections carry no body and never say why; the distinction between
/// a missing header, an unknown token and a foreign audience matters
/// only to the log stream.
pub async fn resource_guard(
    State(resources): State<Arc<ServerResources>>,
    mut req: Request,
    next: Next,
) -> Response {
    let origin = request_origin(req.headers(), &resources.config.app_base_url);

    let Some(token) = bearer_token(req.headers()) else {
        tracing::debug!("resource request without a usable bearer token");
        return unauthorized(&origin);
    };
    let token = token.to_owned();

    let unwrapped = match resources.provider.unwrap_token(&token).await {
        Ok(Some(unwrapped)) => unwrapped,
        Ok(None) => {
            tracing::debug!("resource request with an unknown or expired token");
            return unauthorized(&origin);
        }
        Err(e) => return e.into_response(),
    };

    if !audience_matches(&unwrapped.audience, &origin) {
        tracing::debug!("resource request with a foreign token audience");
        return unauthorized(&origin);
    }

    req.extensions_mut().insert(ResourceContext {
        base_url: origin,
        user: unwrapped.props,
    });
    next.run(req).await
}

/// Extract a non-empty bearer token from the `Authorization` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Whether the token audience covers this origin or the resource URL
fn audience_matches(audience: &[String], origin: &str) -> bool {
    let resource = format!("{origin}{MCP_RESOURCE_PATH}");
    audience.iter().any(|aud| aud == origin || *aud == resource)
}

/// Bare `401` pointing at the metadata document
fn unauthorized(origin: &str) -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    if let Ok(value) = HeaderValue::from_str(&www_authenticate(origin, &SUPPORTED_SCOPES)) {
        response
            .headers_mut()
            .insert(http::header::WWW_AUTHENTICATE, value);
    }
    response
}

/// `WWW-Authenticate` challenge; the scope parameter is omitted when no
/// scopes are supported
fn www_authenticate(origin: &str, scopes: &[&str]) -> String {
    let scope = if scopes.is_empty() {
        String::new()
    } else {
        format!(" scope=\"{}\"", scopes.join(" "))
    };
    format!("Bearer resource_metadata=\"{origin}{PROTECTED_RESOURCE_METADATA_PATH}\"{scope}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(http::header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(
            http::header::AUTHORIZATION,
            "Bearer tok-123".parse().unwrap(),
        );
        assert_eq!(bearer_token(&headers), Some("tok-123"));
    }

    #[test]
    fn test_audience_must_cover_origin_or_resource() {
        let origin = "http://localhost:8080";
        assert!(audience_matches(
            &["http://localhost:8080".to_owned()],
            origin
        ));
        assert!(audience_matches(
            &["http://localhost:8080/mcp".to_owned()],
            origin
        ));
        assert!(audience_matches(
            &[
                "https://other.example".to_owned(),
                "http://localhost:8080/mcp".to_owned()
            ],
            origin
        ));

        assert!(!audience_matches(&[], origin));
        assert!(!audience_matches(&["https://other.example".to_owned()], origin));
        // Prefix is not enough, the match is exact
        assert!(!audience_matches(
            &["http://localhost:8080/mcp/tools".to_owned()],
            origin
        ));
    }

    #[test]
    fn test_www_authenticate_shape() {
        let challenge = www_authenticate("http://localhost:8080", &["profile", "email"]);
        assert_eq!(
            challenge,
            "Bearer resource_metadata=\"http://localhost:8080/.well-known/oauth-protected-resource\" scope=\"profile email\""
        );

        let bare = www_authenticate("http://localhost:8080", &[]);
        assert!(!bare.contains("scope="));
    }

    #[test]
    fn test_unauthorized_has_challenge_and_empty_body() {
        let response = unauthorized("http://localhost:8080");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response
            .headers()
            .get(http::header::WWW_AUTHENTICATE)
            .is_some());
    }
}
