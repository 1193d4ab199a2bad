// ABOUTME: Centralized resource container and HTTP server assembly
// ABOUTME: Wires config, database, crypto and OAuth services into the axum router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Server Assembly
//!
//! [`ServerResources`] is the dependency-injection container: every
//! shared service is constructed once, Arc-wrapped and handed to the
//! route modules through axum state. [`HttpServer`] merges the route
//! modules into one router, layers rate limiting, tracing and CORS
//! around it, and serves it.

use crate::auth::SessionCodec;
use crate::config::environment::ServerConfig;
use crate::crypto::PasswordHasher;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::middleware::{rate_limit_middleware, setup_cors, RateLimitStore};
use crate::notifications::EmailClient;
use crate::oauth2_server::{AuthorizationServer, GrantStore, OAuth2Routes, OAuthProvider};
use crate::routes::{AuthRoutes, HealthRoutes, McpRoutes, PasswordResetRoutes};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Centralized resource container for dependency injection
///
/// Holds all shared server state so route handlers never rebuild
/// expensive objects per request.
pub struct ServerResources {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// SQLite-backed persistence
    pub database: Arc<Database>,
    /// Signed session-cookie codec
    pub session_codec: SessionCodec,
    /// Password hashing and verification
    pub password_hasher: Arc<PasswordHasher>,
    /// OAuth grant storage consumed by the authorize flow and the guard
    pub provider: Arc<dyn OAuthProvider>,
    /// Client registration and token exchange
    pub authorization_server: AuthorizationServer,
    /// Counter store for the rate limiter; `None` when no store is bound
    pub rate_limit_store: Option<Arc<dyn RateLimitStore>>,
    /// Outbound email for the password-reset flow
    pub email: EmailClient,
}

impl std::fmt::Debug for ServerResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResources").finish_non_exhaustive()
    }
}

impl ServerResources {
    /// Create the resource container from a connected database and config
    ///
    /// The rate-limit store is a deployment binding and starts unbound;
    /// wire one with [`Self::set_rate_limit_store`] before serving when
    /// limiting is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the password hasher cannot initialize its
    /// random source.
    pub fn new(database: Database, config: Arc<ServerConfig>) -> AppResult<Self> {
        let database = Arc::new(database);
        let session_codec = SessionCodec::new(&config.auth.cookie_secret);
        let password_hasher = Arc::new(PasswordHasher::new()?);
        let provider: Arc<dyn OAuthProvider> = Arc::new(GrantStore::new(database.clone()));
        let authorization_server =
            AuthorizationServer::new(database.clone(), &config.app_base_url);
        let email = EmailClient::new(&config.email);

        Ok(Self {
            config,
            database,
            session_codec,
            password_hasher,
            provider,
            authorization_server,
            rate_limit_store: None,
            email,
        })
    }

    /// Bind a rate-limit counter store
    pub fn set_rate_limit_store(&mut self, store: Arc<dyn RateLimitStore>) {
        self.rate_limit_store = Some(store);
    }

    /// Create a new builder for `ServerResources`
    #[must_use]
    pub const fn builder() -> ServerResourcesBuilder {
        ServerResourcesBuilder::new()
    }
}

/// Builder for [`ServerResources`]
pub struct ServerResourcesBuilder {
    database: Option<Database>,
    config: Option<Arc<ServerConfig>>,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
}

impl ServerResourcesBuilder {
    /// Create an empty builder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            database: None,
            config: None,
            rate_limit_store: None,
        }
    }

    /// Set the database
    #[must_use]
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Set the server configuration
    #[must_use]
    pub fn with_config(mut self, config: Arc<ServerConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Bind a rate-limit counter store
    #[must_use]
    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    /// Build the `ServerResources`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the database or config is
    /// missing, or the underlying construction error.
    pub fn build(self) -> AppResult<ServerResources> {
        let database = self
            .database
            .ok_or_else(|| AppError::config("Database is required"))?;
        let config = self
            .config
            .ok_or_else(|| AppError::config("Server config is required"))?;

        let mut resources = ServerResources::new(database, config)?;
        if let Some(store) = self.rate_limit_store {
            resources.set_rate_limit_store(store);
        }
        Ok(resources)
    }

    /// Build the `ServerResources` wrapped in an `Arc`
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::build`].
    pub fn build_arc(self) -> AppResult<Arc<ServerResources>> {
        Ok(Arc::new(self.build()?))
    }
}

impl Default for ServerResourcesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembled HTTP server
pub struct HttpServer {
    resources: Arc<ServerResources>,
}

impl HttpServer {
    /// Create the server around shared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Build the full application router
    ///
    /// Layer order matters: the rate limiter runs innermost of the three
    /// so CORS preflights and trace spans are never counted against a
    /// client's window.
    #[must_use]
    pub fn router(&self) -> Router {
        let resources = self.resources.clone();
        Router::new()
            .merge(AuthRoutes::routes(resources.clone()))
            .merge(PasswordResetRoutes::routes(resources.clone()))
            .merge(OAuth2Routes::routes(resources.clone()))
            .merge(McpRoutes::routes(resources.clone()))
            .merge(HealthRoutes::routes())
            .layer(axum::middleware::from_fn_with_state(
                resources,
                rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(setup_cors())
    }

    /// Bind the listen port and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound or the server fails
    /// while running.
    pub async fn run(self, port: u16) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
        info!("HTTP server listening on http://127.0.0.1:{port}");

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Resolve when the process receives SIGINT
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install shutdown signal handler: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}
