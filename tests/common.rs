// ABOUTME: Shared test fixtures: deployment config, server resources and accounts
// ABOUTME: Builds in-memory instances of the auth core for integration tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]
//! Shared test fixtures for `epicflare_server`
//!
//! Builds complete in-memory deployments: configuration with a test
//! signing secret, a fresh sqlite database and the assembled
//! `ServerResources`, plus direct-to-storage account helpers.

use anyhow::Result;
use epicflare_server::config::environment::{
    AuthConfig, DatabaseConfig, EmailConfig, LogLevel, RateLimitConfig, SecurityConfig,
    ServerConfig,
};
use epicflare_server::database::Database;
use epicflare_server::middleware::MemoryRateLimitStore;
use epicflare_server::models::User;
use epicflare_server::server::{HttpServer, ServerResources};
use std::sync::{Arc, Once};

/// Signing secret used by every test deployment; 32 characters, the
/// configured minimum
pub const TEST_COOKIE_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Base URL every test deployment claims; requests without a `Host`
/// header resolve their origin to this value
pub const TEST_BASE_URL: &str = "http://localhost:8080";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // TEST_LOG controls verbosity; default WARN keeps test output quiet
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Deployment configuration with rate limiting disabled, for tests that
/// do not exercise the limiter
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 8080,
        log_level: LogLevel::Info,
        app_base_url: TEST_BASE_URL.to_owned(),
        auth: AuthConfig {
            cookie_secret: TEST_COOKIE_SECRET.to_owned(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
        },
        email: EmailConfig {
            api_key: None,
            api_base_url: "https://api.resend.com".to_owned(),
            from_address: None,
        },
        security: SecurityConfig {
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_window: 10,
                window_seconds: 60,
            },
        },
    }
}

/// Deployment configuration with the limiter enabled at the given window
pub fn test_config_with_rate_limit(requests_per_window: u32, window_seconds: u64) -> ServerConfig {
    let mut config = test_config();
    config.security.rate_limit = RateLimitConfig {
        enabled: true,
        requests_per_window,
        window_seconds,
    };
    config
}

/// Standard in-memory deployment of the full auth core
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    create_test_resources_with_config(test_config()).await
}

/// In-memory deployment over a custom configuration
pub async fn create_test_resources_with_config(
    config: ServerConfig,
) -> Result<Arc<ServerResources>> {
    init_test_logging();
    let database = Database::new(&config.database.url).await?;
    let resources = ServerResources::new(database, Arc::new(config))?;
    Ok(Arc::new(resources))
}

/// In-memory deployment with the limiter enabled and an in-memory
/// counter store bound
pub async fn create_rate_limited_resources(
    requests_per_window: u32,
    window_seconds: u64,
) -> Result<Arc<ServerResources>> {
    init_test_logging();
    let config = test_config_with_rate_limit(requests_per_window, window_seconds);
    let database = Database::new(&config.database.url).await?;
    let mut resources = ServerResources::new(database, Arc::new(config))?;
    resources.set_rate_limit_store(Arc::new(MemoryRateLimitStore::new()));
    Ok(Arc::new(resources))
}

/// Full application router over the given resources, with the same
/// middleware stack the binary serves
pub fn test_app(resources: Arc<ServerResources>) -> axum::Router {
    HttpServer::new(resources).router()
}

/// Create an account directly in storage, bypassing the signup route
pub async fn create_test_account(
    resources: &ServerResources,
    email: &str,
    password: &str,
) -> Result<User> {
    let password_hash = resources.password_hasher.hash(password)?;
    let user = User::new(email.to_owned(), password_hash);
    resources.database.create_user(&user).await?;
    Ok(user)
}

/// Create an account whose stored credential is the legacy bare SHA-256
/// digest, as imported installations carry
pub async fn create_legacy_account(
    resources: &ServerResources,
    email: &str,
    password: &str,
) -> Result<User> {
    let legacy_hash = epicflare_server::crypto::sha256_hex(password.as_bytes());
    let user = User::new(email.to_owned(), legacy_hash);
    resources.database.create_user(&user).await?;
    Ok(user)
}
