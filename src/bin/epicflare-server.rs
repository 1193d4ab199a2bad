// ABOUTME: Server binary wiring configuration, database and shared resources
// ABOUTME: Serves the auth, OAuth 2.0 and MCP resource-guard HTTP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # epicflare Server Binary
//!
//! Starts the authentication and OAuth authorization core: session
//! endpoints, the password-reset flow, the OAuth 2.0 authorization
//! server and the guarded MCP resource endpoint.

use anyhow::Result;
use clap::Parser;
use epicflare_server::{
    config::environment::ServerConfig,
    database::Database,
    logging,
    middleware::MemoryRateLimitStore,
    server::{HttpServer, ServerResources},
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "epicflare-server")]
#[command(about = "epicflare auth core - sessions, OAuth 2.0 and the MCP resource guard")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle container environments where clap may not work properly
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Argument parsing failed: {e}");
            eprintln!("Using environment configuration only");
            Args { http_port: None }
        }
    };

    // Load configuration from environment
    let mut config = ServerConfig::from_env()?;

    // Override port if specified
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    // Initialize production logging
    logging::init_from_env()?;

    info!("Starting epicflare auth core");
    info!("{}", config.summary());

    let database = Database::new(&config.database.url).await?;
    info!("Database initialized: {}", config.database.url);

    let config = Arc::new(config);
    let mut resources = ServerResources::new(database, config.clone())?;

    // The counter store is a deployment binding; single-node deployments
    // get the in-memory store when limiting is enabled
    if config.security.rate_limit.enabled {
        resources.set_rate_limit_store(Arc::new(MemoryRateLimitStore::new()));
        info!(
            "Rate limiting enabled: {} requests / {}s per route and client IP",
            config.security.rate_limit.requests_per_window,
            config.security.rate_limit.window_seconds
        );
    }

    let server = HttpServer::new(Arc::new(resources));

    display_available_endpoints(&config);
    info!("Ready to serve authentication requests");

    if let Err(e) = server.run(config.http_port).await {
        error!("Server error: {e}");
        return Err(e);
    }

    Ok(())
}

/// Display all available API endpoints
fn display_available_endpoints(config: &ServerConfig) {
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());

    info!("=== Available API Endpoints ===");
    display_auth_endpoints(&host, config.http_port);
    display_oauth2_endpoints(&host, config.http_port);
    display_mcp_endpoints(&host, config.http_port);
    info!("Monitoring:");
    info!(
        "   Health Check:      GET  http://{host}:{port}/health",
        port = config.http_port
    );
    info!("=== End of Endpoint List ===");
}

#[allow(clippy::cognitive_complexity)]
fn display_auth_endpoints(host: &str, port: u16) {
    info!("Authentication:");
    info!("   Login / Signup:    POST http://{host}:{port}/auth");
    info!("   Session Check:     GET  http://{host}:{port}/session");
    info!("   Logout:            GET  http://{host}:{port}/logout");
    info!("   Reset Request:     POST http://{host}:{port}/password-reset");
    info!("   Reset Confirm:     POST http://{host}:{port}/password-reset/confirm");
}

#[allow(clippy::cognitive_complexity)]
fn display_oauth2_endpoints(host: &str, port: u16) {
    info!("OAuth 2.0 Server:");
    info!("   Authorize Page:    GET  http://{host}:{port}/oauth/authorize");
    info!("   Authorize Info:    GET  http://{host}:{port}/oauth/authorize-info");
    info!("   Authorize:         POST http://{host}:{port}/oauth/authorize");
    info!("   Callback Page:     GET  http://{host}:{port}/oauth/callback");
    info!("   Token Exchange:    POST http://{host}:{port}/oauth/token");
    info!("   Client Registration: POST http://{host}:{port}/oauth/register");
}

#[allow(clippy::cognitive_complexity)]
fn display_mcp_endpoints(host: &str, port: u16) {
    info!("MCP Resource:");
    info!("   Protected Resource: ANY http://{host}:{port}/mcp");
    info!("   Resource Metadata:  GET http://{host}:{port}/.well-known/oauth-protected-resource");
}
