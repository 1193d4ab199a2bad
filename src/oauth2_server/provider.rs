// ABOUTME: OAuth provider seam consumed by the authorize flow and the resource guard
// ABOUTME: GrantStore is the shipped implementation, persisting grants hashed in sqlite
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # OAuth Provider
//!
//! The authorize endpoints and the resource-token guard talk to grant
//! storage through [`OAuthProvider`], never to the database directly. The
//! shipped implementation, [`GrantStore`], issues single-use authorization
//! codes and resolves bearer tokens, storing SHA-256 digests only; raw
//! code and token values exist solely in transit to the client.

use super::models::{AuthorizationCodeRecord, AuthorizationGrant, OAuthClient, UnwrappedToken};
use crate::crypto::sha256_hex;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use url::Url;

/// Authorization code lifetime in seconds
const CODE_TTL_SECS: i64 = 600;
/// Random length in bytes for authorization codes
const CODE_LEN: usize = 32;

/// Grant storage operations needed by the authorization flow
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Look up a registered client by id
    ///
    /// # Errors
    ///
    /// Returns an error if grant storage is unreachable.
    async fn lookup_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>>;

    /// Complete an approved authorization
    ///
    /// Issues a single-use code bound to the request and returns the
    /// client redirect URL carrying `code` and the echoed `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI fails to parse or the code
    /// cannot be persisted.
    async fn complete_authorization(&self, grant: AuthorizationGrant) -> AppResult<String>;

    /// Resolve a presented bearer token to its grant
    ///
    /// Unknown and expired tokens are `Ok(None)`, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error if grant storage is unreachable.
    async fn unwrap_token(&self, token: &str) -> AppResult<Option<UnwrappedToken>>;
}

/// Sqlite-backed grant store
pub struct GrantStore {
    database: Arc<Database>,
    rng: SystemRandom,
}

impl GrantStore {
    /// Create a grant store over the shared database
    #[must_use]
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            rng: SystemRandom::new(),
        }
    }

    /// Generate a fresh authorization code value
    fn generate_code(&self) -> AppResult<String> {
        let mut bytes = [0u8; CODE_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::internal("System RNG failure"))?;
        Ok(hex::encode(bytes))
    }
}

#[async_trait]
impl OAuthProvider for GrantStore {
    async fn lookup_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        self.database.get_oauth_client(client_id).await.map_err(|e| {
            tracing::error!(error = %e, client_id, "failed to look up OAuth client");
            AppError::database("Failed to look up OAuth client")
        })
    }

    async fn complete_authorization(&self, grant: AuthorizationGrant) -> AppResult<String> {
        let mut redirect = Url::parse(&grant.request.redirect_uri)
            .map_err(|e| AppError::invalid_input(format!("Invalid redirect URI: {e}")))?;

        let code = self.generate_code()?;
        let now = Utc::now();
        let record = AuthorizationCodeRecord {
            code_hash: sha256_hex(code.as_bytes()),
            client_id: grant.request.client_id.clone(),
            redirect_uri: grant.request.redirect_uri.clone(),
            scope: grant.scope,
            props: grant.props,
            code_challenge: grant.request.code_challenge.clone(),
            code_challenge_method: grant.request.code_challenge_method.clone(),
            expires_at: now + Duration::seconds(CODE_TTL_SECS),
            created_at: now,
        };

        self.database
            .insert_authorization_code(&record)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to store authorization code");
                AppError::database("Failed to store authorization code")
            })?;

        redirect.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &grant.request.state {
            redirect.query_pairs_mut().append_pair("state", state);
        }

        Ok(redirect.into())
    }

    async fn unwrap_token(&self, token: &str) -> AppResult<Option<UnwrappedToken>> {
        let token_hash = sha256_hex(token.as_bytes());

        let Some(record) = self
            .database
            .get_access_token(&token_hash)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to resolve access token");
                AppError::database("Failed to resolve access token")
            })?
        else {
            return Ok(None);
        };

        if record.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(UnwrappedToken {
            audience: record.audience,
            scope: record.scope,
            props: record.props,
        }))
    }
}
