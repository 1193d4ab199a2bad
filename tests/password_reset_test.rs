// ABOUTME: Integration tests for the password reset request and confirm endpoints
// ABOUTME: Covers enumeration-safe responses, token rotation, expiry and replay
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use epicflare_server::crypto::sha256_hex;
use epicflare_server::models::PasswordResetToken;
use epicflare_server::server::ServerResources;
use helpers::axum_test::AxumTestRequest;
use serde_json::{json, Value};
use uuid::Uuid;

/// Plant a reset token directly so tests control the raw value and expiry.
async fn seed_reset_token(
    resources: &Arc<ServerResources>,
    user_id: Uuid,
    raw_token: &str,
    ttl_secs: i64,
) -> Result<()> {
    let record = PasswordResetToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash: sha256_hex(raw_token.as_bytes()),
        expires_at: Utc::now() + Duration::seconds(ttl_secs),
        created_at: Utc::now(),
    };
    resources.database.insert_reset_token(&record).await?;
    Ok(())
}

#[tokio::test]
async fn test_reset_requests_do_not_reveal_accounts() -> Result<()> {
    let resources = common::create_test_resources().await?;
    common::create_test_account(&resources, "ada@example.com", "correct horse").await?;
    let app = common::test_app(resources);

    let known = AxumTestRequest::post("/password-reset")
        .json(&json!({ "email": "ada@example.com" }))
        .send(app.clone())
        .await;
    assert_eq!(known.status(), 200);
    let known: Value = known.json();

    let unknown = AxumTestRequest::post("/password-reset")
        .json(&json!({ "email": "ghost@example.com" }))
        .send(app)
        .await;
    assert_eq!(unknown.status(), 200);
    let unknown: Value = unknown.json();

    assert_eq!(known, unknown);
    assert_eq!(known["ok"], true);
    assert_eq!(
        known["message"],
        "If the account exists, a reset email has been sent."
    );
    Ok(())
}

#[tokio::test]
async fn test_reset_request_validation() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let app = common::test_app(resources);

    let response = AxumTestRequest::post("/password-reset")
        .raw_body("{oops")
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid JSON payload.");

    for payload in [json!({}), json!({ "email": "   " })] {
        let response = AxumTestRequest::post("/password-reset")
            .json(&payload)
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 400);
        let body: Value = response.json();
        assert_eq!(body["error"], "Email is required.");
        assert_eq!(body["code"], "MISSING_REQUIRED_FIELD");
    }
    Ok(())
}

#[tokio::test]
async fn test_confirm_rotates_the_password_once() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let user = common::create_test_account(&resources, "ada@example.com", "old password").await?;
    seed_reset_token(&resources, user.id, "raw-reset-token", 3600).await?;
    let app = common::test_app(resources);

    let response = AxumTestRequest::post("/password-reset/confirm")
        .json(&json!({ "token": "raw-reset-token", "password": "new password" }))
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json();
    assert_eq!(body["ok"], true);

    let old_login = AxumTestRequest::post("/auth")
        .json(&json!({ "email": "ada@example.com", "password": "old password", "mode": "login" }))
        .send(app.clone())
        .await;
    assert_eq!(old_login.status(), 401);

    let new_login = AxumTestRequest::post("/auth")
        .json(&json!({ "email": "ada@example.com", "password": "new password", "mode": "login" }))
        .send(app.clone())
        .await;
    assert_eq!(new_login.status(), 200);

    // A consumed token cannot be replayed
    let replay = AxumTestRequest::post("/password-reset/confirm")
        .json(&json!({ "token": "raw-reset-token", "password": "third password" }))
        .send(app)
        .await;
    assert_eq!(replay.status(), 400);
    let body: Value = replay.json();
    assert_eq!(body["error"], "Reset link is invalid or expired.");
    assert_eq!(body["code"], "INVALID_INPUT");
    Ok(())
}

#[tokio::test]
async fn test_confirm_rejects_unknown_and_expired_tokens() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let user = common::create_test_account(&resources, "ada@example.com", "old password").await?;
    seed_reset_token(&resources, user.id, "stale-token", -1).await?;
    let app = common::test_app(resources.clone());

    let response = AxumTestRequest::post("/password-reset/confirm")
        .json(&json!({ "token": "never-issued", "password": "new password" }))
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "Reset link is invalid or expired.");

    let response = AxumTestRequest::post("/password-reset/confirm")
        .json(&json!({ "token": "stale-token", "password": "new password" }))
        .send(app)
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "Reset link is invalid or expired.");

    // The expired row is purged on first touch
    let purged = resources
        .database
        .get_reset_token_by_hash(&sha256_hex(b"stale-token"))
        .await?;
    assert!(purged.is_none());
    Ok(())
}

#[tokio::test]
async fn test_confirm_requires_token_and_password() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let app = common::test_app(resources);

    for payload in [
        json!({}),
        json!({ "token": "raw-reset-token" }),
        json!({ "token": "", "password": "new password" }),
        json!({ "token": "raw-reset-token", "password": "" }),
    ] {
        let response = AxumTestRequest::post("/password-reset/confirm")
            .json(&payload)
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 400, "payload {payload} should be rejected");
        let body: Value = response.json();
        assert_eq!(body["error"], "Token and password are required.");
        assert_eq!(body["code"], "MISSING_REQUIRED_FIELD");
    }
    Ok(())
}

#[tokio::test]
async fn test_new_request_invalidates_previous_tokens() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let user = common::create_test_account(&resources, "ada@example.com", "old password").await?;
    seed_reset_token(&resources, user.id, "first-token", 3600).await?;
    let app = common::test_app(resources);

    let response = AxumTestRequest::post("/password-reset")
        .json(&json!({ "email": "ada@example.com" }))
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 200);

    let response = AxumTestRequest::post("/password-reset/confirm")
        .json(&json!({ "token": "first-token", "password": "new password" }))
        .send(app)
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "Reset link is invalid or expired.");
    Ok(())
}
