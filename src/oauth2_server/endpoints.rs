// ABOUTME: OAuth 2.0 authorization-server operations: client registration and token exchange
// ABOUTME: RFC 7591 registration subset plus the authorization_code grant with PKCE S256
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Authorization Server Endpoints
//!
//! [`AuthorizationServer`] backs `POST /oauth/register` and
//! `POST /oauth/token`. Client secrets are random 32-byte values stored as
//! SHA-256 digests and compared in constant time; authorization codes are
//! consumed atomically before any token is issued, so a replayed code can
//! never mint a second token. Errors use the RFC 6749 wire shape.

use super::models::{
    ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error, OAuthClient, TokenRequest,
    TokenResponse,
};
use crate::crypto::sha256_hex;
use crate::database::Database;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Access token lifetime in seconds
pub const TOKEN_TTL_SECS: i64 = 3600;
/// Random length in bytes for access tokens and client secrets
const TOKEN_LEN: usize = 32;

/// Token endpoint auth methods a client may register with
const SUPPORTED_AUTH_METHODS: [&str; 3] = ["client_secret_post", "client_secret_basic", "none"];

/// OAuth 2.0 authorization server backing registration and token exchange
pub struct AuthorizationServer {
    database: Arc<Database>,
    app_base_url: String,
    rng: SystemRandom,
}

/// Client credentials presented to the token endpoint, from the form body
/// or an HTTP Basic `Authorization` header
struct ClientCredentials {
    client_id: String,
    client_secret: Option<String>,
}

impl AuthorizationServer {
    /// Create an authorization server over the shared database
    #[must_use]
    pub fn new(database: Arc<Database>, app_base_url: &str) -> Self {
        Self {
            database,
            app_base_url: app_base_url.trim_end_matches('/').to_owned(),
            rng: SystemRandom::new(),
        }
    }

    /// Register a new OAuth client (RFC 7591 subset)
    ///
    /// Public clients (`token_endpoint_auth_method: "none"`) get no secret;
    /// confidential clients get a generated secret returned once and stored
    /// hashed.
    ///
    /// # Errors
    ///
    /// Returns an `invalid_client_metadata` error for rejected redirect
    /// URIs, grant types, response types or auth methods, and an
    /// `invalid_request` error if storage fails.
    pub async fn register_client(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuth2Error> {
        Self::validate_registration(&request)?;

        let auth_method = request
            .token_endpoint_auth_method
            .unwrap_or_else(|| "client_secret_post".to_owned());

        let client_id = format!("client_{}", Uuid::new_v4().simple());
        let client_secret = if auth_method == "none" {
            None
        } else {
            Some(self.generate_secret().map_err(|e| {
                tracing::error!(error = %e, "system RNG failure generating client secret");
                OAuth2Error::invalid_request("Failed to generate client secret")
            })?)
        };

        let created_at = Utc::now();
        let client = OAuthClient {
            client_id: client_id.clone(),
            client_secret_hash: client_secret
                .as_deref()
                .map(|secret| sha256_hex(secret.as_bytes())),
            client_name: request.client_name.clone(),
            redirect_uris: request.redirect_uris.clone(),
            token_endpoint_auth_method: auth_method.clone(),
            created_at,
        };

        self.database.insert_oauth_client(&client).await.map_err(|e| {
            tracing::error!(error = %e, client_id = %client_id, "failed to store client registration");
            OAuth2Error::invalid_request("Failed to store client registration")
        })?;

        tracing::info!(client_id = %client_id, auth_method = %auth_method, "registered OAuth client");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            client_id_issued_at: created_at.timestamp(),
            redirect_uris: request.redirect_uris,
            grant_types: vec!["authorization_code".to_owned()],
            response_types: vec!["code".to_owned()],
            client_name: request.client_name,
            token_endpoint_auth_method: auth_method,
            scope: request
                .scope
                .unwrap_or_else(|| super::SUPPORTED_SCOPES.join(" ")),
        })
    }

    /// Exchange an authorization code for an access token
    ///
    /// The code row is consumed before any validation beyond existence, so
    /// a code that fails redirect, client or PKCE checks is burned rather
    /// than left replayable.
    ///
    /// # Errors
    ///
    /// Returns `unsupported_grant_type`, `invalid_client`, `invalid_request`
    /// or `invalid_grant` per RFC 6749 section 5.2.
    pub async fn exchange_token(
        &self,
        request: TokenRequest,
        authorization_header: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        if request.grant_type.is_empty() {
            return Err(OAuth2Error::invalid_request("Missing grant_type"));
        }
        if request.grant_type != "authorization_code" {
            return Err(OAuth2Error::unsupported_grant_type());
        }

        let credentials = resolve_client_credentials(&request, authorization_header)
            .ok_or_else(OAuth2Error::invalid_client)?;
        let client = self.authenticate_client(&credentials).await?;

        let code = request
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("Missing authorization code"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;

        let record = self
            .database
            .consume_authorization_code(&sha256_hex(code.as_bytes()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to consume authorization code");
                OAuth2Error::invalid_grant("Failed to consume authorization code")
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid or expired authorization code"))?;

        if record.expires_at <= Utc::now() {
            return Err(OAuth2Error::invalid_grant(
                "Invalid or expired authorization code",
            ));
        }
        if record.client_id != client.client_id {
            return Err(OAuth2Error::invalid_grant(
                "Authorization code was issued to a different client",
            ));
        }
        if record.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        verify_pkce(
            record.code_challenge.as_deref(),
            record.code_challenge_method.as_deref(),
            request.code_verifier.as_deref(),
        )?;

        let token = self.generate_secret().map_err(|e| {
            tracing::error!(error = %e, "system RNG failure generating access token");
            OAuth2Error::invalid_request("Failed to generate access token")
        })?;

        let now = Utc::now();
        let token_record = super::models::AccessTokenRecord {
            token_hash: sha256_hex(token.as_bytes()),
            client_id: client.client_id.clone(),
            scope: record.scope.clone(),
            audience: vec![
                self.app_base_url.clone(),
                format!("{}/mcp", self.app_base_url),
            ],
            props: record.props,
            expires_at: now + Duration::seconds(TOKEN_TTL_SECS),
            created_at: now,
        };

        self.database
            .insert_access_token(&token_record)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to store access token");
                OAuth2Error::invalid_request("Failed to store access token")
            })?;

        tracing::info!(client_id = %client.client_id, "issued access token");

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_owned(),
            expires_in: TOKEN_TTL_SECS,
            scope: record.scope.join(" "),
        })
    }

    /// Authenticate the presented client credentials
    ///
    /// Public clients require no secret; confidential clients must present
    /// one matching the stored digest. Comparison is constant-time over the
    /// hex digests.
    async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuth2Error> {
        let client = self
            .database
            .get_oauth_client(&credentials.client_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to look up client for token exchange");
                OAuth2Error::invalid_client()
            })?
            .ok_or_else(OAuth2Error::invalid_client)?;

        let Some(stored_hash) = client.client_secret_hash.as_deref() else {
            // Public client, nothing to verify
            return Ok(client);
        };

        let presented = credentials
            .client_secret
            .as_deref()
            .ok_or_else(OAuth2Error::invalid_client)?;
        let presented_hash = sha256_hex(presented.as_bytes());

        if presented_hash
            .as_bytes()
            .ct_eq(stored_hash.as_bytes())
            .into()
        {
            Ok(client)
        } else {
            Err(OAuth2Error::invalid_client())
        }
    }

    /// Generate a random 32-byte secret, hex encoded
    fn generate_secret(&self) -> Result<String, ring::error::Unspecified> {
        let mut bytes = [0u8; TOKEN_LEN];
        self.rng.fill(&mut bytes)?;
        Ok(hex::encode(bytes))
    }

    /// Validate a registration request
    fn validate_registration(request: &ClientRegistrationRequest) -> Result<(), OAuth2Error> {
        if request.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_client_metadata(
                "At least one redirect_uri is required",
            ));
        }
        for uri in &request.redirect_uris {
            if !is_valid_redirect_uri(uri) {
                return Err(OAuth2Error::invalid_client_metadata(&format!(
                    "Invalid redirect_uri: {uri}"
                )));
            }
        }

        if let Some(grant_types) = &request.grant_types {
            for grant_type in grant_types {
                if grant_type != "authorization_code" {
                    return Err(OAuth2Error::invalid_client_metadata(&format!(
                        "Unsupported grant_type: {grant_type}"
                    )));
                }
            }
        }
        if let Some(response_types) = &request.response_types {
            for response_type in response_types {
                if response_type != "code" {
                    return Err(OAuth2Error::invalid_client_metadata(&format!(
                        "Unsupported response_type: {response_type}"
                    )));
                }
            }
        }
        if let Some(method) = &request.token_endpoint_auth_method {
            if !SUPPORTED_AUTH_METHODS.contains(&method.as_str()) {
                return Err(OAuth2Error::invalid_client_metadata(&format!(
                    "Unsupported token_endpoint_auth_method: {method}"
                )));
            }
        }

        Ok(())
    }
}

/// Redirect URI rules: absolute, no fragment, no wildcard, https except
/// for loopback hosts (RFC 6749 section 3.1.2 / RFC 8252)
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
        return false;
    }

    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };

    let is_loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match parsed.scheme() {
        "https" => true,
        "http" => is_loopback,
        _ => false,
    }
}

/// Resolve client credentials from the form body or HTTP Basic header
///
/// Form fields win when both are present; a Basic header that fails to
/// decode yields no credentials rather than an error.
fn resolve_client_credentials(
    request: &TokenRequest,
    authorization_header: Option<&str>,
) -> Option<ClientCredentials> {
    if let Some(client_id) = request.client_id.as_deref().filter(|id| !id.is_empty()) {
        return Some(ClientCredentials {
            client_id: client_id.to_owned(),
            client_secret: request
                .client_secret
                .clone()
                .filter(|secret| !secret.is_empty()),
        });
    }

    let encoded = authorization_header?.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    if client_id.is_empty() {
        return None;
    }

    Some(ClientCredentials {
        client_id: client_id.to_owned(),
        client_secret: (!client_secret.is_empty()).then(|| client_secret.to_owned()),
    })
}

/// Verify a PKCE S256 code verifier against the recorded challenge
///
/// Runs after the code row is consumed; verification failure burns the
/// code. A request carrying a verifier against a challenge-less code is
/// accepted, matching RFC 7636 (the challenge drives the requirement).
fn verify_pkce(
    stored_challenge: Option<&str>,
    stored_method: Option<&str>,
    code_verifier: Option<&str>,
) -> Result<(), OAuth2Error> {
    let Some(challenge) = stored_challenge else {
        return Ok(());
    };

    let verifier =
        code_verifier.ok_or_else(|| OAuth2Error::invalid_grant("code_verifier is required"))?;

    // RFC 7636 section 4.1: 43-128 unreserved characters
    if verifier.len() < 43 || verifier.len() > 128 {
        return Err(OAuth2Error::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(OAuth2Error::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let method = stored_method.unwrap_or("S256");
    if method != "S256" {
        return Err(OAuth2Error::invalid_grant(
            "Only the S256 code_challenge_method is supported",
        ));
    }

    let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    if computed.as_bytes().ct_eq(challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(OAuth2Error::invalid_grant("Invalid code_verifier"))
    }
}
