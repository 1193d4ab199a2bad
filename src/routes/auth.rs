// ABOUTME: Login, signup, session introspection and logout route handlers
// ABOUTME: Issues and clears the signed session cookie, audits every credential outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Authentication Routes
//!
//! `POST /auth` is the combined login/signup endpoint the SPA talks to,
//! `GET /session` reports whether the request carries a valid session
//! cookie, and `/logout` clears it.
//!
//! Failure responses are deliberately uniform: a login failure says
//! `"Invalid email or password."` whether the account is missing or the
//! password is wrong, and verification always runs a key derivation even
//! for absent accounts. The signup duplicate check is the one deliberate
//! place where account existence is disclosed.

use crate::auth::is_secure_request;
use crate::errors::{AppError, ErrorCode};
use crate::models::{normalize_email, AuthMode, Session, User};
use crate::security::audit::{client_ip, AuditCategory, AuditEvent, AuditResult};
use crate::server::ServerResources;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Authentication route handlers
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all authentication routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/auth", post(Self::handle_auth))
            .route("/session", get(Self::handle_session))
            .route(
                "/logout",
                get(Self::handle_logout).post(Self::handle_logout),
            )
            .with_state(resources)
    }

    /// Combined login/signup endpoint
    ///
    /// The body is read raw so a syntactically broken payload and a
    /// well-formed non-object payload get distinct messages.
    async fn handle_auth(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&headers);

        let Ok(payload) = serde_json::from_str::<Value>(&body) else {
            return Err(AppError::invalid_input("Invalid JSON payload."));
        };
        let Some(fields) = payload.as_object() else {
            return Err(AppError::invalid_input("Invalid request body."));
        };

        let email = fields
            .get("email")
            .and_then(Value::as_str)
            .map_or("", str::trim);
        let password = fields.get("password").and_then(Value::as_str).unwrap_or("");
        let mode = match fields.get("mode").and_then(Value::as_str) {
            Some("login") => Some(AuthMode::Login),
            Some("signup") => Some(AuthMode::Signup),
            _ => None,
        };

        let Some(mode) = mode.filter(|_| !email.is_empty() && !password.is_empty()) else {
            AuditEvent::new(AuditCategory::Auth, "auth", AuditResult::Failure)
                .with_ip(ip.as_deref())
                .with_reason("invalid_payload")
                .emit();
            return Err(AppError::new(
                ErrorCode::MissingRequiredField,
                "Email, password, and mode are required.",
            ));
        };

        let email = normalize_email(email);
        match mode {
            AuthMode::Signup => {
                Self::handle_signup(&resources, &headers, &email, password, ip.as_deref()).await
            }
            AuthMode::Login => {
                Self::handle_login(&resources, &headers, &email, password, ip.as_deref()).await
            }
        }
    }

    /// Create an account and establish a session
    async fn handle_signup(
        resources: &Arc<ServerResources>,
        headers: &HeaderMap,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<Response, AppError> {
        let existing = resources
            .database
            .get_user_by_email(email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to check for an existing account");
                AppError::database("Failed to create account")
            })?;

        if existing.is_some() {
            AuditEvent::new(AuditCategory::Auth, "signup", AuditResult::Failure)
                .with_email(email)
                .with_ip(ip)
                .with_reason("email_in_use")
                .emit();
            return Err(AppError::conflict("Email already registered."));
        }

        // Key derivation runs on the blocking pool
        let hasher = resources.password_hasher.clone();
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "password hashing task failed");
                AppError::internal("Password hashing failed")
            })??;

        let user = User::new(email.to_owned(), password_hash);
        resources.database.create_user(&user).await.map_err(|e| {
            tracing::error!(error = %e, "failed to create account");
            AppError::database("Failed to create account")
        })?;

        AuditEvent::new(AuditCategory::Auth, "signup", AuditResult::Success)
            .with_email(email)
            .with_ip(ip)
            .emit();

        Self::session_response(
            resources,
            headers,
            &user.id.to_string(),
            email,
            AuthMode::Signup,
        )
    }

    /// Verify credentials and establish a session
    async fn handle_login(
        resources: &Arc<ServerResources>,
        headers: &HeaderMap,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<Response, AppError> {
        let user = resources
            .database
            .get_user_by_email(email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load account for login");
                AppError::database("Failed to load account")
            })?;

        // An absent account still verifies against the dummy hash so the
        // response timing matches the wrong-password case
        let hasher = resources.password_hasher.clone();
        let stored_hash = user.as_ref().map_or_else(
            || hasher.dummy_hash().to_owned(),
            |record| record.password_hash.clone(),
        );
        let candidate = password.to_owned();
        let verification =
            tokio::task::spawn_blocking(move || hasher.verify(&candidate, &stored_hash))
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "password verification task failed");
                    AppError::internal("Password verification failed")
                })?;

        let authenticated = user.filter(|_| verification.valid);
        let Some(user) = authenticated else {
            AuditEvent::new(AuditCategory::Auth, "login", AuditResult::Failure)
                .with_email(email)
                .with_ip(ip)
                .with_reason("invalid_credentials")
                .emit();
            return Err(AppError::auth_invalid("Invalid email or password."));
        };

        // Legacy hash migration persists best-effort; a write failure
        // must not fail a valid login
        if let Some(upgraded) = verification.upgraded_hash {
            if let Err(e) = resources
                .database
                .update_password_hash(user.id, &upgraded)
                .await
            {
                tracing::warn!(error = %e, "failed to persist upgraded password hash");
            }
        }

        AuditEvent::new(AuditCategory::Auth, "login", AuditResult::Success)
            .with_email(email)
            .with_ip(ip)
            .emit();

        Self::session_response(
            resources,
            headers,
            &user.id.to_string(),
            email,
            AuthMode::Login,
        )
    }

    /// Session introspection for the SPA; never errors
    async fn handle_session(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        match resources.session_codec.read(&headers) {
            Some(session) => Json(json!({ "ok": true, "session": { "email": session.email } })),
            None => Json(json!({ "ok": false })),
        }
    }

    /// Clear the session cookie and send the browser back to the login page
    ///
    /// Succeeds whether or not a session was present.
    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let secure = is_secure_request(&headers, &resources.config.app_base_url);
        let cookie = resources.session_codec.clear(secure);

        let mut response = (
            StatusCode::SEE_OTHER,
            [(http::header::LOCATION, "/login")],
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(http::header::SET_COOKIE, value);
        }
        response
    }

    /// `200 {ok:true, mode}` with the freshly issued session cookie
    fn session_response(
        resources: &ServerResources,
        headers: &HeaderMap,
        user_id: &str,
        email: &str,
        mode: AuthMode,
    ) -> Result<Response, AppError> {
        let secure = is_secure_request(headers, &resources.config.app_base_url);
        let cookie = resources
            .session_codec
            .issue(&Session::new(user_id, email), secure)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to encode session cookie");
                AppError::internal("Failed to establish session")
            })?;
        let cookie = HeaderValue::from_str(&cookie).map_err(|e| {
            tracing::error!(error = %e, "session cookie is not a valid header value");
            AppError::internal("Failed to establish session")
        })?;

        let mut response = Json(json!({ "ok": true, "mode": mode })).into_response();
        response.headers_mut().insert(http::header::SET_COOKIE, cookie);
        Ok(response)
    }
}
