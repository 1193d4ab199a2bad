// ABOUTME: HTTP route handlers for the OAuth 2.0 surface: authorize, callback, register, token
// ABOUTME: Serves the SPA shell for browser steps and dual-mode JSON/redirect error delivery
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # OAuth 2.0 Routes
//!
//! The authorize flow is client-rendered: `GET /oauth/authorize` and
//! `GET /oauth/callback` serve the embedded SPA shell, the page calls
//! `GET /oauth/authorize-info` for consent-screen data, and the decision
//! comes back as a form `POST /oauth/authorize`.
//!
//! Decision errors are delivered two ways: clients accepting
//! `application/json` get a `400 {ok:false, error, code}` body; browser
//! clients get a `303` back to the authorize URL with `error` and
//! `error_description` query parameters so the shell can render them.

use super::models::{
    AuthRequest, AuthorizationGrant, AuthorizeQuery, ClientRegistrationRequest, OAuth2Error,
    OAuthClient, TokenRequest,
};
use super::resolve_scopes;
use crate::auth::request_origin;
use crate::crypto::sha256_hex;
use crate::errors::AppError;
use crate::models::{normalize_email, GrantProps};
use crate::security::audit::{client_ip, AuditCategory, AuditEvent, AuditResult};
use crate::server::ServerResources;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Client-rendered application shell served on the browser-facing steps
const APP_SHELL: &str = include_str!("../../templates/app_shell.html");

/// Outcome of validating the authorize query against registered clients
enum RequestResolution {
    /// Query names a known client and one of its registered redirect URIs
    Valid(Box<(AuthRequest, OAuthClient)>),
    /// User-facing message describing the rejection
    Invalid(String),
}

/// OAuth 2.0 route handlers
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/oauth/authorize",
                get(Self::handle_authorize_shell).post(Self::handle_authorize_decision),
            )
            .route("/oauth/authorize-info", get(Self::handle_authorize_info))
            .route("/oauth/callback", get(Self::handle_callback))
            .route("/oauth/register", post(Self::handle_register))
            .route("/oauth/token", post(Self::handle_token))
            .with_state(resources)
    }

    /// Serve the consent screen shell
    async fn handle_authorize_shell() -> Html<&'static str> {
        Html(APP_SHELL)
    }

    /// Serve the post-authorization landing shell
    ///
    /// Status is 400 when the authorization server redirected back with
    /// error parameters, so agent clients treating the page as an API
    /// response see the failure.
    async fn handle_callback(Query(query): Query<HashMap<String, String>>) -> Response {
        let status = if query.contains_key("error") || query.contains_key("error_description") {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        (status, Html(APP_SHELL)).into_response()
    }

    /// Consent-screen data for the client-rendered authorize page
    async fn handle_authorize_info(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<AuthorizeQuery>,
    ) -> Result<Response, AppError> {
        let (request, client) = match Self::resolve_auth_request(&resources, &query).await? {
            RequestResolution::Valid(resolved) => *resolved,
            RequestResolution::Invalid(message) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "ok": false, "error": message })),
                )
                    .into_response());
            }
        };

        let scopes = match resolve_scopes(&request.scopes) {
            Ok(scopes) => scopes,
            Err(message) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "ok": false, "error": message })),
                )
                    .into_response());
            }
        };

        Ok(Json(json!({
            "ok": true,
            "client": { "id": client.client_id, "name": client.display_name() },
            "scopes": scopes,
        }))
        .into_response())
    }

    /// Handle the consent decision form
    async fn handle_authorize_decision(
        State(resources): State<Arc<ServerResources>>,
        uri: Uri,
        headers: HeaderMap,
        Query(query): Query<AuthorizeQuery>,
        body: String,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&headers);

        let (request, _client) = match Self::resolve_auth_request(&resources, &query).await? {
            RequestResolution::Valid(resolved) => *resolved,
            RequestResolution::Invalid(message) => {
                AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
                    .with_ip(ip.as_deref())
                    .with_reason("invalid_request")
                    .emit();
                return Ok(Self::authorize_error_response(
                    &resources, &headers, &uri, &message,
                ));
            }
        };

        let form = parse_form(&body);
        // Absent decision means approve, matching the consent form default
        let decision = form.get("decision").map_or("approve", String::as_str);
        if decision == "deny" {
            return Ok(Self::deny_response(
                &resources,
                &headers,
                &uri,
                &request,
                ip.as_deref(),
            ));
        }

        let email = form.get("email").map_or("", |value| value.trim());
        let password = form.get("password").map_or("", String::as_str);
        let session_email = resources
            .session_codec
            .read(&headers)
            .map(|session| normalize_email(&session.email));
        let has_form_credentials = !email.is_empty() && !password.is_empty();

        let approved_email = if has_form_credentials {
            let normalized = normalize_email(email);
            if Self::verify_credentials(&resources, &normalized, password).await? {
                normalized
            } else {
                AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
                    .with_email(&normalized)
                    .with_ip(ip.as_deref())
                    .with_client_id(&request.client_id)
                    .with_reason("invalid_password")
                    .emit();
                return Ok(Self::authorize_error_response(
                    &resources,
                    &headers,
                    &uri,
                    "Invalid email or password.",
                ));
            }
        } else if let Some(session_email) = session_email {
            session_email
        } else {
            AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
                .with_ip(ip.as_deref())
                .with_client_id(&request.client_id)
                .with_reason("missing_credentials")
                .emit();
            return Ok(Self::authorize_error_response(
                &resources,
                &headers,
                &uri,
                "Email and password are required.",
            ));
        };

        let scope = match resolve_scopes(&request.scopes) {
            Ok(scope) => scope,
            Err(message) => {
                AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
                    .with_email(&approved_email)
                    .with_ip(ip.as_deref())
                    .with_client_id(&request.client_id)
                    .with_reason("unsupported_scope")
                    .emit();
                return Ok(Self::authorize_error_response(
                    &resources, &headers, &uri, &message,
                ));
            }
        };

        let user_id = sha256_hex(approved_email.as_bytes());
        let props = GrantProps::from_email(user_id.clone(), &approved_email);
        let client_id = request.client_id.clone();
        let grant = AuthorizationGrant {
            request,
            user_id,
            scope,
            props,
        };

        let redirect_to = resources.provider.complete_authorization(grant).await?;

        AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Success)
            .with_email(&approved_email)
            .with_ip(ip.as_deref())
            .with_client_id(&client_id)
            .emit();

        Ok(deliver_redirect(&headers, &redirect_to))
    }

    /// Dynamic client registration (RFC 7591)
    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        body: String,
    ) -> Result<Response, OAuth2Error> {
        let request: ClientRegistrationRequest = serde_json::from_str(&body)
            .map_err(|_| OAuth2Error::invalid_client_metadata("Invalid registration payload"))?;

        let response = resources
            .authorization_server
            .register_client(request)
            .await?;
        Ok((StatusCode::CREATED, Json(response)).into_response())
    }

    /// Token exchange for the `authorization_code` grant
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<Response, OAuth2Error> {
        let form = parse_form(&body);
        let request = TokenRequest {
            grant_type: form.get("grant_type").cloned().unwrap_or_default(),
            code: form.get("code").cloned(),
            redirect_uri: form.get("redirect_uri").cloned(),
            client_id: form.get("client_id").cloned(),
            client_secret: form.get("client_secret").cloned(),
            code_verifier: form.get("code_verifier").cloned(),
        };
        let authorization = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let response = resources
            .authorization_server
            .exchange_token(request, authorization)
            .await?;
        Ok(Json(response).into_response())
    }

    /// Validate the authorize query: client id and redirect URI present,
    /// client registered, redirect URI among the registered set
    ///
    /// An unregistered redirect URI gets the same message as an unknown
    /// client so the response does not confirm client existence.
    async fn resolve_auth_request(
        resources: &ServerResources,
        query: &AuthorizeQuery,
    ) -> Result<RequestResolution, AppError> {
        let (Some(client_id), Some(redirect_uri)) = (
            query.client_id.as_deref().filter(|id| !id.is_empty()),
            query.redirect_uri.as_deref().filter(|uri| !uri.is_empty()),
        ) else {
            return Ok(RequestResolution::Invalid(
                "Invalid OAuth request. Client ID and redirect URI are required.".to_owned(),
            ));
        };

        let Some(client) = resources.provider.lookup_client(client_id).await? else {
            return Ok(RequestResolution::Invalid(
                "Unknown OAuth client.".to_owned(),
            ));
        };
        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            return Ok(RequestResolution::Invalid(
                "Unknown OAuth client.".to_owned(),
            ));
        }

        Ok(RequestResolution::Valid(Box::new((
            AuthRequest {
                client_id: client_id.to_owned(),
                redirect_uri: redirect_uri.to_owned(),
                scopes: query.scopes(),
                state: query.state.clone().filter(|state| !state.is_empty()),
                code_challenge: query
                    .code_challenge
                    .clone()
                    .filter(|challenge| !challenge.is_empty()),
                code_challenge_method: query
                    .code_challenge_method
                    .clone()
                    .filter(|method| !method.is_empty()),
            },
            client,
        ))))
    }

    /// Verify form credentials against the account store
    ///
    /// Key derivation runs on the blocking pool. A missing account
    /// verifies against the dummy hash so response timing matches the
    /// wrong-password case. Legacy hash upgrades persist best-effort.
    async fn verify_credentials(
        resources: &Arc<ServerResources>,
        email: &str,
        password: &str,
    ) -> Result<bool, AppError> {
        let user = resources
            .database
            .get_user_by_email(email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load user for authorization");
                AppError::database("Failed to load user")
            })?;

        let hasher = resources.password_hasher.clone();
        let stored_hash = user.as_ref().map_or_else(
            || hasher.dummy_hash().to_owned(),
            |record| record.password_hash.clone(),
        );
        let password = password.to_owned();
        let verification =
            tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "password verification task failed");
                    AppError::internal("Password verification failed")
                })?;

        let Some(user) = user else {
            return Ok(false);
        };
        if !verification.valid {
            return Ok(false);
        }

        if let Some(upgraded) = verification.upgraded_hash {
            if let Err(e) = resources
                .database
                .update_password_hash(user.id, &upgraded)
                .await
            {
                tracing::warn!(error = %e, "failed to persist upgraded password hash");
            }
        }
        Ok(true)
    }

    /// Redirect back to the client with `error=access_denied`
    fn deny_response(
        resources: &ServerResources,
        headers: &HeaderMap,
        uri: &Uri,
        request: &AuthRequest,
        ip: Option<&str>,
    ) -> Response {
        let Ok(mut redirect) = Url::parse(&request.redirect_uri) else {
            AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
                .with_ip(ip)
                .with_client_id(&request.client_id)
                .with_reason("invalid_redirect")
                .emit();
            return Self::authorize_error_response(
                resources,
                headers,
                uri,
                "Missing redirect URI for access denial.",
            );
        };

        redirect
            .query_pairs_mut()
            .append_pair("error", "access_denied");
        if let Some(state) = &request.state {
            redirect.query_pairs_mut().append_pair("state", state);
        }

        AuditEvent::new(AuditCategory::Oauth, "authorize", AuditResult::Failure)
            .with_ip(ip)
            .with_client_id(&request.client_id)
            .with_reason("access_denied")
            .emit();

        let redirect_to: String = redirect.into();
        deliver_redirect(headers, &redirect_to)
    }

    /// Deliver a decision error: JSON body for API clients, a `303` back
    /// to the authorize URL with error parameters for browsers
    fn authorize_error_response(
        resources: &ServerResources,
        headers: &HeaderMap,
        uri: &Uri,
        message: &str,
    ) -> Response {
        let json_body = || {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": message, "code": "invalid_request" })),
            )
                .into_response()
        };

        if wants_json(headers) {
            return json_body();
        }

        let origin = request_origin(headers, &resources.config.app_base_url);
        let Ok(mut redirect) = Url::parse(&format!("{origin}{uri}")) else {
            return json_body();
        };

        // Replace any error parameters the URL already carries
        let retained: Vec<(String, String)> = redirect
            .query_pairs()
            .filter(|(key, _)| key != "error" && key != "error_description")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        redirect.query_pairs_mut().clear();
        for (key, value) in &retained {
            redirect.query_pairs_mut().append_pair(key, value);
        }
        redirect
            .query_pairs_mut()
            .append_pair("error", "invalid_request")
            .append_pair("error_description", message);

        let location: String = redirect.into();
        (
            StatusCode::SEE_OTHER,
            [(http::header::LOCATION, location)],
        )
            .into_response()
    }
}

/// Redirect delivery: JSON clients get `{ok:true, redirectTo}`, browsers
/// get a `302 Found`
fn deliver_redirect(headers: &HeaderMap, redirect_to: &str) -> Response {
    if wants_json(headers) {
        Json(json!({ "ok": true, "redirectTo": redirect_to })).into_response()
    } else {
        (
            StatusCode::FOUND,
            [(http::header::LOCATION, redirect_to.to_owned())],
        )
            .into_response()
    }
}

/// Whether the client asked for a JSON response
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Lenient form-body parse; duplicate keys keep the last value
fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_json_checks_accept_header() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(http::header::ACCEPT, "text/html".parse().unwrap());
        assert!(!wants_json(&headers));

        headers.insert(
            http::header::ACCEPT,
            "application/json, text/plain".parse().unwrap(),
        );
        assert!(wants_json(&headers));
    }

    #[test]
    fn test_parse_form_is_lenient() {
        let form = parse_form("decision=deny&email=a%40b.com");
        assert_eq!(form.get("decision").map(String::as_str), Some("deny"));
        assert_eq!(form.get("email").map(String::as_str), Some("a@b.com"));

        assert!(parse_form("").is_empty());
        assert_eq!(
            parse_form("not a form").get("not a form").map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn test_deliver_redirect_modes() {
        let browser = deliver_redirect(&HeaderMap::new(), "https://client.example/cb?code=x");
        assert_eq!(browser.status(), StatusCode::FOUND);
        assert_eq!(
            browser.headers().get(http::header::LOCATION).unwrap(),
            "https://client.example/cb?code=x"
        );

        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, "application/json".parse().unwrap());
        let json = deliver_redirect(&headers, "https://client.example/cb?code=x");
        assert_eq!(json.status(), StatusCode::OK);
    }

    #[test]
    fn test_shell_embeds_mount_node() {
        assert!(APP_SHELL.contains("app-shell"));
        assert!(APP_SHELL.contains("id=\"root\""));
    }
}
