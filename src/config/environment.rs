// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses and validates server, auth, database, email and rate-limit settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Environment-based configuration management for production deployment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

/// Default HTTP port when `HTTP_PORT` is unset
const DEFAULT_HTTP_PORT: &str = "8080";
/// Default rate-limit threshold per window
const DEFAULT_RATE_LIMIT_REQUESTS: &str = "10";
/// Default rate-limit window in seconds
const DEFAULT_RATE_LIMIT_WINDOW_SECS: &str = "60";
/// Minimum accepted length for the session signing secret
const MIN_COOKIE_SECRET_LEN: usize = 32;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Public base URL of the deployment (scheme + host, no trailing slash);
    /// used for reset links, token audiences and resource metadata
    pub app_base_url: String,
    /// Session and credential settings
    pub auth: AuthConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// Outbound email settings
    pub email: EmailConfig,
    /// Abuse protection settings
    pub security: SecurityConfig,
}

/// Session signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for the session cookie HMAC; at least 32 characters
    pub cookie_secret: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL (`sqlite:...`)
    pub url: String,
}

/// Outbound email (Resend-compatible HTTP API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// API key; when absent, sends are skipped with a warning
    pub api_key: Option<String>,
    /// API base URL
    pub api_base_url: String,
    /// From address; when absent, sends are skipped with a warning
    pub from_address: Option<String>,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Sliding-window rate limiting for sensitive POST routes
    pub rate_limit: RateLimitConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether the limiter is enforced at all
    pub enabled: bool,
    /// Maximum requests per window per (route, client IP)
    pub requests_per_window: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or fails
    /// validation (notably a short `COOKIE_SECRET`).
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let config = Self {
            http_port: env_var_or("HTTP_PORT", DEFAULT_HTTP_PORT)?
                .parse()
                .context("Invalid HTTP_PORT value")?,
            log_level: LogLevel::from_str_or_default(&env_var_or("LOG_LEVEL", "info")?),
            app_base_url: trim_trailing_slash(&env_var_or(
                "APP_BASE_URL",
                "http://localhost:8080",
            )?),
            auth: AuthConfig {
                cookie_secret: env::var("COOKIE_SECRET")
                    .context("COOKIE_SECRET is required for session signing")?,
            },
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/epicflare.db")?,
            },
            email: EmailConfig {
                api_key: env::var("RESEND_API_KEY").ok(),
                api_base_url: trim_trailing_slash(&env_var_or(
                    "RESEND_API_BASE_URL",
                    "https://api.resend.com",
                )?),
                from_address: env::var("RESEND_FROM_EMAIL").ok(),
            },
            security: SecurityConfig {
                rate_limit: RateLimitConfig {
                    enabled: env_var_or("RATE_LIMIT_ENABLED", "true")?
                        .parse()
                        .context("Invalid RATE_LIMIT_ENABLED value")?,
                    requests_per_window: env_var_or(
                        "RATE_LIMIT_REQUESTS",
                        DEFAULT_RATE_LIMIT_REQUESTS,
                    )?
                    .parse()
                    .context("Invalid RATE_LIMIT_REQUESTS value")?,
                    window_seconds: env_var_or(
                        "RATE_LIMIT_WINDOW",
                        DEFAULT_RATE_LIMIT_WINDOW_SECS,
                    )?
                    .parse()
                    .context("Invalid RATE_LIMIT_WINDOW value")?,
                },
            },
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error for a short cookie secret or an unparseable base URL.
    pub fn validate(&self) -> Result<()> {
        if self.auth.cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "COOKIE_SECRET must be at least 32 characters for session signing."
            ));
        }

        url::Url::parse(&self.app_base_url).context("APP_BASE_URL is not a valid URL")?;

        if self.security.rate_limit.requests_per_window == 0 {
            return Err(anyhow::anyhow!("RATE_LIMIT_REQUESTS must be at least 1"));
        }
        if self.security.rate_limit.window_seconds == 0 {
            return Err(anyhow::anyhow!("RATE_LIMIT_WINDOW must be at least 1"));
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "epicflare server configuration:\n\
             - HTTP Port: {}\n\
             - Log Level: {}\n\
             - Base URL: {}\n\
             - Database: {}\n\
             - Email: {}\n\
             - Rate Limiting: {}",
            self.http_port,
            self.log_level,
            self.app_base_url,
            self.database.url,
            if self.email.api_key.is_some() && self.email.from_address.is_some() {
                "Configured"
            } else {
                "Disabled (sends will be skipped)"
            },
            if self.security.rate_limit.enabled {
                format!(
                    "{} requests / {}s",
                    self.security.rate_limit.requests_per_window,
                    self.security.rate_limit.window_seconds
                )
            } else {
                "Disabled".to_owned()
            },
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_owned()))
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}
