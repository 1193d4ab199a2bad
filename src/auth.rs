// ABOUTME: Signed session-cookie encoding, decoding and request-scheme detection
// ABOUTME: Handles session issuance, verification and clearing via an HMAC-signed cookie
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Session Cookie Codec
//!
//! Sessions are a `{id, email}` record serialized to JSON, carried in a
//! single `HttpOnly` cookie as `base64url(payload).base64url(hmac)` with
//! an HMAC-SHA256 signature over the encoded payload.
//!
//! The codec is an explicitly constructed instance holding the signing
//! key; it is built once at startup from the validated cookie secret and
//! threaded through `ServerResources`. Reading degrades to `None` on any
//! malformed input, it never errors.

use crate::models::Session;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http::HeaderMap;
use ring::hmac;
use serde::Deserialize;

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "epicflare_session";
/// Session lifetime in seconds (7 days)
pub const SESSION_MAX_AGE_SECS: u64 = 604_800;

/// Encodes and decodes the signed session cookie
pub struct SessionCodec {
    key: hmac::Key,
}

impl SessionCodec {
    /// Build a codec from the cookie secret
    ///
    /// Secret length is validated upstream by configuration loading.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    /// Produce a `Set-Cookie` value carrying the signed session
    ///
    /// # Errors
    ///
    /// Returns an error only if the session record fails to serialize.
    pub fn issue(&self, session: &Session, secure: bool) -> Result<String, serde_json::Error> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(session)?);
        let signature = URL_SAFE_NO_PAD.encode(hmac::sign(&self.key, payload.as_bytes()));
        Ok(format!(
            "{SESSION_COOKIE_NAME}={payload}.{signature}; HttpOnly;{} Path=/; SameSite=Lax; Max-Age={SESSION_MAX_AGE_SECS}",
            secure_attr(secure)
        ))
    }

    /// Read and verify the session cookie from request headers
    ///
    /// Returns `None` on a missing cookie, failed signature verification,
    /// non-JSON payload, or a payload whose `id`/`email` are missing,
    /// mistyped or empty.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<Session> {
        let cookie_header = headers.get(http::header::COOKIE)?.to_str().ok()?;
        let raw = extract_cookie_value(cookie_header, SESSION_COOKIE_NAME)?;

        let (payload, signature) = raw.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        hmac::verify(&self.key, payload.as_bytes(), &signature).ok()?;

        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        validate_session_payload(&payload)
    }

    /// Produce a `Set-Cookie` value that expires the session immediately
    #[must_use]
    pub fn clear(&self, secure: bool) -> String {
        format!(
            "{SESSION_COOKIE_NAME}=; HttpOnly;{} Path=/; SameSite=Lax; Max-Age=0",
            secure_attr(secure)
        )
    }
}

const fn secure_attr(secure: bool) -> &'static str {
    if secure {
        " Secure;"
    } else {
        ""
    }
}

/// Expected shape of the session payload; anything else is "no session"
#[derive(Deserialize)]
struct SessionShape {
    id: String,
    email: String,
}

/// Explicit shape check with a tagged result: a valid record needs both
/// fields present, string-typed and non-empty
fn validate_session_payload(payload: &[u8]) -> Option<Session> {
    let shape: SessionShape = serde_json::from_slice(payload).ok()?;
    if shape.id.is_empty() || shape.email.is_empty() {
        return None;
    }
    Some(Session {
        id: shape.id,
        email: shape.email,
    })
}

/// Find a cookie value in a `Cookie` request header
fn extract_cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some((cookie_name, value)) = cookie.split_once('=') {
            if cookie_name == name {
                return Some(value);
            }
        }
    }
    None
}

/// Whether the request reached us over https, including proxy detection
/// via `X-Forwarded-Proto` and `Forwarded: proto=`
#[must_use]
pub fn is_secure_request(headers: &HeaderMap, app_base_url: &str) -> bool {
    if app_base_url.starts_with("https://") {
        return true;
    }

    if let Some(proto) = headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        if proto
            .split(',')
            .next()
            .is_some_and(|first| first.trim().eq_ignore_ascii_case("https"))
        {
            return true;
        }
    }

    if let Some(forwarded) = headers.get(http::header::FORWARDED).and_then(|v| v.to_str().ok()) {
        return forwarded
            .split(';')
            .flat_map(|part| part.split(','))
            .filter_map(|directive| directive.trim().split_once('='))
            .any(|(key, value)| {
                key.trim().eq_ignore_ascii_case("proto")
                    && value.trim().trim_matches('"').eq_ignore_ascii_case("https")
            });
    }

    false
}

/// Origin (`scheme://host`) of the incoming request, falling back to the
/// configured base URL when no `Host` header is present
#[must_use]
pub fn request_origin(headers: &HeaderMap, app_base_url: &str) -> String {
    let Some(host) = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
    else {
        return app_base_url.trim_end_matches('/').to_owned();
    };

    let scheme = if is_secure_request(headers, app_base_url) {
        "https"
    } else {
        "http"
    };
    format!("{scheme}://{host}")
}
