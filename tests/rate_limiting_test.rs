// ABOUTME: Integration tests for rate limiting wired through the full router
// ABOUTME: Covers header-based client identity, fail-open/fail-closed and route scoping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use anyhow::Result;
use helpers::axum_test::AxumTestRequest;
use serde_json::{json, Value};

#[tokio::test]
async fn test_limit_trips_after_the_window_is_spent() -> Result<()> {
    let resources = common::create_rate_limited_resources(3, 60).await?;
    let app = common::test_app(resources);

    for _ in 0..3 {
        let response = AxumTestRequest::post("/auth")
            .header("cf-connecting-ip", "203.0.113.9")
            .json(&json!({}))
            .send(app.clone())
            .await;
        // Under the limit the handler itself answers
        assert_eq!(response.status(), 400);
    }

    let response = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "203.0.113.9")
        .json(&json!({}))
        .send(app)
        .await;
    assert_eq!(response.status(), 429);
    let retry_after: i64 = response.header("retry-after").unwrap().parse()?;
    assert!((1..=60).contains(&retry_after));
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Too many requests. Retry in"));
    Ok(())
}

#[tokio::test]
async fn test_limits_are_scoped_per_ip_and_per_route() -> Result<()> {
    let resources = common::create_rate_limited_resources(1, 60).await?;
    let app = common::test_app(resources);

    let first = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "203.0.113.9")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(first.status(), 400);

    let second = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "203.0.113.9")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(second.status(), 429);

    // Another client is not affected
    let other_ip = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "198.51.100.7")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(other_ip.status(), 400);

    // The same client gets a fresh window on another route
    let other_route = AxumTestRequest::post("/oauth/token")
        .header("cf-connecting-ip", "203.0.113.9")
        .form(&json!({}))
        .send(app)
        .await;
    assert_eq!(other_route.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_only_credential_posts_are_limited() -> Result<()> {
    let resources = common::create_rate_limited_resources(1, 60).await?;
    let app = common::test_app(resources);

    // Reads never count, even on limited paths
    for _ in 0..3 {
        let response = AxumTestRequest::get("/oauth/authorize")
            .header("cf-connecting-ip", "203.0.113.9")
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 200);
    }
    for _ in 0..3 {
        let response = AxumTestRequest::get("/session")
            .header("cf-connecting-ip", "203.0.113.9")
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 200);
    }

    // Reset requests are throttled upstream by email delivery, not here
    for _ in 0..3 {
        let response = AxumTestRequest::post("/password-reset")
            .header("cf-connecting-ip", "203.0.113.9")
            .json(&json!({ "email": "ada@example.com" }))
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 200);
    }
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_client_ip_passes_through() -> Result<()> {
    let resources = common::create_rate_limited_resources(1, 60).await?;
    let app = common::test_app(resources);

    for _ in 0..4 {
        let response = AxumTestRequest::post("/auth")
            .json(&json!({}))
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 400);
    }
    Ok(())
}

#[tokio::test]
async fn test_enabled_without_a_store_fails_closed() -> Result<()> {
    // Limiting enabled but no store bound: credential routes refuse
    let config = common::test_config_with_rate_limit(10, 60);
    let resources = common::create_test_resources_with_config(config).await?;
    let app = common::test_app(resources);

    let response = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "203.0.113.9")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(response.status(), 500);
    let body: Value = response.json();
    assert_eq!(body["code"], "CONFIG_ERROR");

    // Unlimited routes are unaffected by the misconfiguration
    let response = AxumTestRequest::get("/session").send(app).await;
    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_disabled_limiter_is_inert() -> Result<()> {
    let resources = common::create_test_resources().await?;
    let app = common::test_app(resources);

    for _ in 0..30 {
        let response = AxumTestRequest::post("/auth")
            .header("cf-connecting-ip", "203.0.113.9")
            .json(&json!({}))
            .send(app.clone())
            .await;
        assert_eq!(response.status(), 400);
    }
    Ok(())
}

#[tokio::test]
async fn test_client_identity_comes_from_proxy_headers() -> Result<()> {
    let resources = common::create_rate_limited_resources(1, 60).await?;
    let app = common::test_app(resources);

    // First entry of x-forwarded-for names the client
    let first = AxumTestRequest::post("/auth")
        .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(first.status(), 400);

    let second = AxumTestRequest::post("/auth")
        .header("x-forwarded-for", "198.51.100.7, 10.0.0.2")
        .json(&json!({}))
        .send(app.clone())
        .await;
    assert_eq!(second.status(), 429);

    // cf-connecting-ip wins over x-forwarded-for
    let third = AxumTestRequest::post("/auth")
        .header("cf-connecting-ip", "198.51.100.7")
        .header("x-forwarded-for", "203.0.113.50")
        .json(&json!({}))
        .send(app)
        .await;
    assert_eq!(third.status(), 429);
    Ok(())
}
