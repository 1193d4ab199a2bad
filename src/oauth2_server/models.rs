// ABOUTME: OAuth 2.0 data models for client registration, authorization and token exchange
// ABOUTME: Implements RFC 7591 and OAuth 2.0 request/response structures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use crate::models::GrantProps;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique client identifier
    pub client_id: String,
    /// SHA-256 hash of the client secret, `None` for public clients
    pub client_secret_hash: Option<String>,
    /// Display name shown on the consent screen
    pub client_name: Option<String>,
    /// Redirect URIs registered for authorization code flow
    pub redirect_uris: Vec<String>,
    /// Token endpoint auth method: `client_secret_post`, `client_secret_basic` or `none`
    pub token_endpoint_auth_method: String,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Name to display for this client, falling back to the id
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(&self.client_id)
    }
}

/// OAuth 2.0 Client Registration Request (RFC 7591)
#[derive(Debug, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for authorization code flow
    pub redirect_uris: Vec<String>,
    /// Optional client name for display
    pub client_name: Option<String>,
    /// Token endpoint auth method; defaults to `client_secret_post`
    pub token_endpoint_auth_method: Option<String>,
    /// Grant types the client can use
    pub grant_types: Option<Vec<String>>,
    /// Response types the client can use
    pub response_types: Option<Vec<String>>,
    /// Scopes the client can request
    pub scope: Option<String>,
}

/// OAuth 2.0 Client Registration Response (RFC 7591)
#[derive(Debug, Serialize)]
pub struct ClientRegistrationResponse {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret; omitted for public clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// When the client id was issued (unix seconds)
    pub client_id_issued_at: i64,
    /// Redirect URIs registered for this client
    pub redirect_uris: Vec<String>,
    /// Grant types allowed for this client
    pub grant_types: Vec<String>,
    /// Response types allowed for this client
    pub response_types: Vec<String>,
    /// Client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Token endpoint auth method
    pub token_endpoint_auth_method: String,
    /// Scopes this client can request
    pub scope: String,
}

/// Pending authorization request parsed from the authorize endpoint query
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeQuery {
    /// Response type; only `code` is supported
    pub response_type: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Redirect URI for the response
    pub redirect_uri: Option<String>,
    /// Requested scopes, space-separated
    pub scope: Option<String>,
    /// Opaque client state echoed back on redirect
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; only `S256` is supported
    pub code_challenge_method: Option<String>,
}

impl AuthorizeQuery {
    /// Requested scopes split on whitespace; empty when none requested
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// Validated authorization request with a resolved client
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes (may be empty, meaning the default set)
    pub scopes: Vec<String>,
    /// Opaque client state echoed back on redirect
    pub state: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method
    pub code_challenge_method: Option<String>,
}

/// Grant-completion parameters handed to the provider on approval
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    /// The validated authorization request being completed
    pub request: AuthRequest,
    /// Stable pseudonymous user id
    pub user_id: String,
    /// Scopes resolved against the supported set
    pub scope: Vec<String>,
    /// Authenticated-user properties stored with the grant
    pub props: GrantProps,
}

/// Stored authorization code, hashed, single-use
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    /// SHA-256 hex digest of the raw code
    pub code_hash: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI bound at authorization time
    pub redirect_uri: String,
    /// Granted scopes
    pub scope: Vec<String>,
    /// Authenticated-user properties carried to the token
    pub props: GrantProps,
    /// PKCE code challenge bound at authorization time
    pub code_challenge: Option<String>,
    /// PKCE code challenge method
    pub code_challenge_method: Option<String>,
    /// Expiry instant; codes live ten minutes
    pub expires_at: DateTime<Utc>,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
}

/// Stored access token, hashed
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    /// SHA-256 hex digest of the raw token
    pub token_hash: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scope: Vec<String>,
    /// Resource identifiers the token is valid for
    pub audience: Vec<String>,
    /// Authenticated-user properties from the grant
    pub props: GrantProps,
    /// Expiry instant; tokens live one hour
    pub expires_at: DateTime<Utc>,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
}

/// Verified bearer token as seen by the resource guard
#[derive(Debug, Clone)]
pub struct UnwrappedToken {
    /// Resource identifiers the token is valid for
    pub audience: Vec<String>,
    /// Granted scopes
    pub scope: Vec<String>,
    /// Authenticated-user properties from the grant
    pub props: GrantProps,
}

/// OAuth 2.0 Token Request
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Grant type; only `authorization_code` is supported
    pub grant_type: String,
    /// Authorization code
    pub code: Option<String>,
    /// Redirect URI, must match the one bound to the code
    pub redirect_uri: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret, required for confidential clients
    pub client_secret: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Access token value
    pub access_token: String,
    /// Token type, always "Bearer"
    pub token_type: String,
    /// Seconds until expiry
    pub expires_in: i64,
    /// Space-joined granted scopes
    pub scope: String,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Serialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_client_metadata` registration error (RFC 7591)
    #[must_use]
    pub fn invalid_client_metadata(description: &str) -> Self {
        Self {
            error: "invalid_client_metadata".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
        }
    }

    /// HTTP status for this error per RFC 6749 section 5.2
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        if self.error == "invalid_client" {
            http::StatusCode::UNAUTHORIZED
        } else {
            http::StatusCode::BAD_REQUEST
        }
    }
}

impl axum::response::IntoResponse for OAuth2Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        (status, axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_query_scope_splitting() {
        let query = AuthorizeQuery {
            response_type: Some("code".into()),
            client_id: Some("c1".into()),
            redirect_uri: Some("https://client.example/cb".into()),
            scope: Some("profile email".into()),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
        };
        assert_eq!(query.scopes(), vec!["profile", "email"]);

        let empty = AuthorizeQuery {
            scope: None,
            ..query
        };
        assert!(empty.scopes().is_empty());
    }

    #[test]
    fn test_oauth2_error_status() {
        assert_eq!(
            OAuth2Error::invalid_client().http_status(),
            http::StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuth2Error::invalid_grant("bad code").http_status(),
            http::StatusCode::BAD_REQUEST
        );
    }
}
