// ABOUTME: Password-reset request and confirm route handlers
// ABOUTME: Issues single-use hashed reset tokens and emails the raw value to the account
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Password Reset Routes
//!
//! Token lifecycle per user: none -> issued -> consumed or expired.
//! `POST /password-reset` always answers with the same generic success
//! message so the endpoint cannot confirm whether an email is
//! registered; the real outcome is visible only in the audit stream.
//! Only the SHA-256 hash of a token is stored, so a leaked database
//! row cannot be replayed against `POST /password-reset/confirm`.

use crate::crypto::sha256_hex;
use crate::errors::{AppError, ErrorCode};
use crate::models::{normalize_email, PasswordResetToken};
use crate::notifications::email::EmailDispatch;
use crate::security::audit::{client_ip, AuditCategory, AuditEvent, AuditResult};
use crate::server::ServerResources;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Reset token lifetime in seconds
const RESET_TOKEN_TTL_SECS: i64 = 3600;
/// Random length in bytes for reset tokens
const RESET_TOKEN_LEN: usize = 32;

/// Password reset route handlers
pub struct PasswordResetRoutes;

impl PasswordResetRoutes {
    /// Create the reset request and confirm routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/password-reset", post(Self::handle_request))
            .route("/password-reset/confirm", post(Self::handle_confirm))
            .with_state(resources)
    }

    /// Issue a reset token and email the reset link
    ///
    /// The response is the same whether or not the account exists;
    /// an unknown email only produces an internal audit failure.
    async fn handle_request(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&headers);

        let Ok(payload) = serde_json::from_str::<Value>(&body) else {
            return Err(AppError::invalid_input("Invalid JSON payload."));
        };
        let email = payload
            .get("email")
            .and_then(Value::as_str)
            .map(normalize_email)
            .unwrap_or_default();
        if email.is_empty() {
            AuditEvent::new(AuditCategory::Auth, "password_reset_request", AuditResult::Failure)
                .with_ip(ip.as_deref())
                .with_path("/password-reset")
                .with_reason("invalid_payload")
                .emit();
            return Err(AppError::new(
                ErrorCode::MissingRequiredField,
                "Email is required.",
            ));
        }

        let user = resources
            .database
            .get_user_by_email(&email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load account for password reset");
                AppError::database("Failed to process reset request")
            })?;

        if let Some(user) = user {
            let token = generate_reset_token()?;
            let now = Utc::now();
            let record = PasswordResetToken {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash: sha256_hex(token.as_bytes()),
                expires_at: now + Duration::seconds(RESET_TOKEN_TTL_SECS),
                created_at: now,
            };

            // Replace-then-insert is two independent writes; a race
            // between concurrent requests can briefly leave two live
            // rows, which is fine because confirm matches on the exact
            // token hash
            resources
                .database
                .delete_reset_tokens_for_user(user.id)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "failed to clear previous reset tokens");
                    AppError::database("Failed to process reset request")
                })?;
            resources
                .database
                .insert_reset_token(&record)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "failed to store reset token");
                    AppError::database("Failed to process reset request")
                })?;

            let reset_url = format!(
                "{}/reset-password?token={}",
                resources.config.app_base_url,
                urlencoding::encode(&token)
            );
            // Every dispatch outcome is non-fatal here; the handler
            // already committed the token
            match resources.email.send_password_reset(&email, &reset_url).await {
                EmailDispatch::Sent => {}
                EmailDispatch::Skipped => {
                    tracing::warn!("reset email skipped, delivery is not configured");
                }
                EmailDispatch::Failed => {
                    tracing::warn!("reset email dispatch failed");
                }
            }

            AuditEvent::new(AuditCategory::Auth, "password_reset_request", AuditResult::Success)
                .with_email(&email)
                .with_ip(ip.as_deref())
                .with_path("/password-reset")
                .emit();
        } else {
            AuditEvent::new(AuditCategory::Auth, "password_reset_request", AuditResult::Failure)
                .with_email(&email)
                .with_ip(ip.as_deref())
                .with_path("/password-reset")
                .with_reason("email_not_found")
                .emit();
        }

        Ok(Json(json!({
            "ok": true,
            "message": "If the account exists, a reset email has been sent.",
        }))
        .into_response())
    }

    /// Consume a reset token and set the new password
    async fn handle_confirm(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&headers);

        let Ok(payload) = serde_json::from_str::<Value>(&body) else {
            return Err(AppError::invalid_input("Invalid JSON payload."));
        };
        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .map_or("", str::trim);
        let password = payload.get("password").and_then(Value::as_str).unwrap_or("");

        if token.is_empty() || password.is_empty() {
            AuditEvent::new(AuditCategory::Auth, "password_reset_confirm", AuditResult::Failure)
                .with_ip(ip.as_deref())
                .with_path("/password-reset/confirm")
                .with_reason("invalid_payload")
                .emit();
            return Err(AppError::new(
                ErrorCode::MissingRequiredField,
                "Token and password are required.",
            ));
        }

        let token_hash = sha256_hex(token.as_bytes());
        let record = resources
            .database
            .get_reset_token_by_hash(&token_hash)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to look up reset token");
                AppError::database("Failed to process reset confirmation")
            })?;

        let now = Utc::now();
        let record = match record {
            None => {
                return Err(Self::rejected_token(ip.as_deref(), "invalid_token"));
            }
            // Expired rows are removed on sight so they cannot be
            // probed repeatedly
            Some(record) if record.expires_at < now => {
                resources
                    .database
                    .delete_reset_token(record.id)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "failed to delete expired reset token");
                        AppError::database("Failed to process reset confirmation")
                    })?;
                return Err(Self::rejected_token(ip.as_deref(), "expired_token"));
            }
            Some(record) => record,
        };

        let hasher = resources.password_hasher.clone();
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "password hashing task failed");
                AppError::internal("Password hashing failed")
            })??;

        resources
            .database
            .update_password_hash(record.user_id, &password_hash)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to update password");
                AppError::database("Failed to process reset confirmation")
            })?;
        resources
            .database
            .delete_reset_tokens_for_user(record.user_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to consume reset token");
                AppError::database("Failed to process reset confirmation")
            })?;

        AuditEvent::new(AuditCategory::Auth, "password_reset_confirm", AuditResult::Success)
            .with_ip(ip.as_deref())
            .with_path("/password-reset/confirm")
            .emit();

        Ok(Json(json!({ "ok": true })).into_response())
    }

    /// Audit and build the generic rejection used for unknown and
    /// expired tokens alike
    fn rejected_token(ip: Option<&str>, reason: &str) -> AppError {
        AuditEvent::new(AuditCategory::Auth, "password_reset_confirm", AuditResult::Failure)
            .with_ip(ip)
            .with_path("/password-reset/confirm")
            .with_reason(reason)
            .emit();
        AppError::invalid_input("Reset link is invalid or expired.")
    }
}

/// Generate a fresh reset token value
fn generate_reset_token() -> Result<String, AppError> {
    let mut bytes = [0u8; RESET_TOKEN_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::internal("System RNG failure"))?;
    Ok(hex::encode(bytes))
}
