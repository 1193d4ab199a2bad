// ABOUTME: OAuth client, authorization code and access token database operations
// ABOUTME: Codes and tokens are stored hashed; codes are consumed atomically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use super::{with_write_retry, Database};
use crate::models::GrantProps;
use crate::oauth2_server::models::{AccessTokenRecord, AuthorizationCodeRecord, OAuthClient};
use anyhow::Result;
use sqlx::Row;

impl Database {
    /// Create OAuth client, code and token tables
    ///
    /// # Errors
    ///
    /// Returns an error if table creation fails.
    pub(super) async fn migrate_oauth(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                client_id TEXT PRIMARY KEY,
                client_secret_hash TEXT,
                client_name TEXT,
                redirect_uris TEXT NOT NULL,
                token_endpoint_auth_method TEXT NOT NULL DEFAULT 'client_secret_post',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_codes (
                code_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                props TEXT NOT NULL,
                code_challenge TEXT,
                code_challenge_method TEXT,
                expires_at INTEGER NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                token_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                audience TEXT NOT NULL,
                props TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a newly registered OAuth client
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn insert_oauth_client(&self, client: &OAuthClient) -> Result<()> {
        let redirect_uris = serde_json::to_string(&client.redirect_uris)?;

        with_write_retry(|| {
            sqlx::query(
                r"
                INSERT INTO oauth_clients (
                    client_id, client_secret_hash, client_name,
                    redirect_uris, token_endpoint_auth_method, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&client.client_id)
            .bind(&client.client_secret_hash)
            .bind(&client.client_name)
            .bind(&redirect_uris)
            .bind(&client.token_endpoint_auth_method)
            .bind(client.created_at)
            .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Look up a registered client
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn get_oauth_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query(
            r"
            SELECT client_id, client_secret_hash, client_name,
                   redirect_uris, token_endpoint_auth_method, created_at
            FROM oauth_clients WHERE client_id = $1
            ",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_oauth_client).transpose()
    }

    /// Insert an authorization code row
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn insert_authorization_code(&self, code: &AuthorizationCodeRecord) -> Result<()> {
        let scope = serde_json::to_string(&code.scope)?;
        let props = serde_json::to_string(&code.props)?;

        with_write_retry(|| {
            sqlx::query(
                r"
                INSERT INTO oauth_codes (
                    code_hash, client_id, redirect_uri, scope, props,
                    code_challenge, code_challenge_method, expires_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(&code.code_hash)
            .bind(&code.client_id)
            .bind(&code.redirect_uri)
            .bind(&scope)
            .bind(&props)
            .bind(&code.code_challenge)
            .bind(&code.code_challenge_method)
            .bind(code.expires_at.timestamp_millis())
            .bind(code.created_at)
            .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Atomically remove and return an authorization code by hash
    ///
    /// Single-statement delete-returning so a code can never be redeemed
    /// twice. Expiry is the caller's check; an expired code is still
    /// removed by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or row decoding fails.
    pub async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCodeRecord>> {
        let row = with_write_retry(|| {
            sqlx::query(
                r"
                DELETE FROM oauth_codes WHERE code_hash = $1
                RETURNING code_hash, client_id, redirect_uri, scope, props,
                          code_challenge, code_challenge_method, expires_at, created_at
                ",
            )
            .bind(code_hash)
            .fetch_optional(&self.pool)
        })
        .await?;

        row.as_ref().map(Self::row_to_authorization_code).transpose()
    }

    /// Insert an access token row
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn insert_access_token(&self, token: &AccessTokenRecord) -> Result<()> {
        let scope = serde_json::to_string(&token.scope)?;
        let audience = serde_json::to_string(&token.audience)?;
        let props = serde_json::to_string(&token.props)?;

        with_write_retry(|| {
            sqlx::query(
                r"
                INSERT INTO oauth_tokens (
                    token_hash, client_id, scope, audience, props, expires_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(&token.token_hash)
            .bind(&token.client_id)
            .bind(&scope)
            .bind(&audience)
            .bind(&props)
            .bind(token.expires_at.timestamp_millis())
            .bind(token.created_at)
            .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Look up an access token by its SHA-256 hash
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn get_access_token(&self, token_hash: &str) -> Result<Option<AccessTokenRecord>> {
        let row = sqlx::query(
            r"
            SELECT token_hash, client_id, scope, audience, props, expires_at, created_at
            FROM oauth_tokens WHERE token_hash = $1
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_access_token).transpose()
    }

    fn row_to_oauth_client(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthClient> {
        let redirect_uris: String = row.get("redirect_uris");
        Ok(OAuthClient {
            client_id: row.get("client_id"),
            client_secret_hash: row.get("client_secret_hash"),
            client_name: row.get("client_name"),
            redirect_uris: serde_json::from_str(&redirect_uris)?,
            token_endpoint_auth_method: row.get("token_endpoint_auth_method"),
            created_at: row.get("created_at"),
        })
    }

    fn row_to_authorization_code(row: &sqlx::sqlite::SqliteRow) -> Result<AuthorizationCodeRecord> {
        let scope: String = row.get("scope");
        let props: String = row.get("props");
        let expires_at_ms: i64 = row.get("expires_at");

        Ok(AuthorizationCodeRecord {
            code_hash: row.get("code_hash"),
            client_id: row.get("client_id"),
            redirect_uri: row.get("redirect_uri"),
            scope: serde_json::from_str(&scope)?,
            props: serde_json::from_str::<GrantProps>(&props)?,
            code_challenge: row.get("code_challenge"),
            code_challenge_method: row.get("code_challenge_method"),
            expires_at: chrono::DateTime::from_timestamp_millis(expires_at_ms)
                .unwrap_or_default(),
            created_at: row.get("created_at"),
        })
    }

    fn row_to_access_token(row: &sqlx::sqlite::SqliteRow) -> Result<AccessTokenRecord> {
        let scope: String = row.get("scope");
        let audience: String = row.get("audience");
        let props: String = row.get("props");
        let expires_at_ms: i64 = row.get("expires_at");

        Ok(AccessTokenRecord {
            token_hash: row.get("token_hash"),
            client_id: row.get("client_id"),
            scope: serde_json::from_str(&scope)?,
            audience: serde_json::from_str(&audience)?,
            props: serde_json::from_str::<GrantProps>(&props)?,
            expires_at: chrono::DateTime::from_timestamp_millis(expires_at_ms)
                .unwrap_or_default(),
            created_at: row.get("created_at"),
        })
    }
}
