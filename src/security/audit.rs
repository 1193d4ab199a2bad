// ABOUTME: Security audit logging for authentication and OAuth operations
// ABOUTME: Emits structured audit events with hashed identifiers, never raw emails or IPs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Security Audit Module
//!
//! Every credential and token outcome produces an audit event carrying
//! category, action and result plus hashed email/IP identifiers. Hashing
//! is SHA-256 over the trimmed, lowercased value so the same principal
//! correlates across events without exposing the identifier itself.

use http::HeaderMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Category of the audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Auth,
    Oauth,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Oauth => write!(f, "oauth"),
        }
    }
}

/// Outcome of the audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
    RateLimited,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Security audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Category of the audited operation
    pub category: AuditCategory,
    /// Action performed (e.g. "login", "signup", "authorize")
    pub action: String,
    /// Result of the action
    pub result: AuditResult,
    /// SHA-256 hash of the normalized email, if one was involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_hash: Option<String>,
    /// SHA-256 hash of the client IP, if one was resolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    /// OAuth client identifier, if the event concerns a client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Request path, for events keyed by endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-text reason code for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Timestamp of the event
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuditEvent {
    /// Create a new audit event
    #[must_use]
    pub fn new(category: AuditCategory, action: &str, result: AuditResult) -> Self {
        Self {
            category,
            action: action.to_owned(),
            result,
            email_hash: None,
            ip_hash: None,
            client_id: None,
            path: None,
            reason: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach a hashed email identifier
    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email_hash = Some(hash_identifier(email));
        self
    }

    /// Attach a hashed client IP identifier
    #[must_use]
    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip_hash = ip.map(hash_identifier);
        self
    }

    /// Attach the OAuth client id
    #[must_use]
    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_owned());
        self
    }

    /// Attach the request path
    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    /// Attach a failure reason code
    #[must_use]
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_owned());
        self
    }

    /// Emit the event to the structured log stream
    ///
    /// Successes log at info, failures and rate limits at warn.
    pub fn emit(&self) {
        match self.result {
            AuditResult::Success => {
                tracing::info!(
                    category = %self.category,
                    action = %self.action,
                    result = %self.result,
                    email_hash = ?self.email_hash,
                    ip_hash = ?self.ip_hash,
                    client_id = ?self.client_id,
                    path = ?self.path,
                    "audit event"
                );
            }
            AuditResult::Failure | AuditResult::RateLimited => {
                tracing::warn!(
                    category = %self.category,
                    action = %self.action,
                    result = %self.result,
                    email_hash = ?self.email_hash,
                    ip_hash = ?self.ip_hash,
                    client_id = ?self.client_id,
                    path = ?self.path,
                    reason = ?self.reason,
                    "audit event"
                );
            }
        }
    }
}

/// Hash an identifier for audit logging
///
/// Normalizes with trim + lowercase first so differently-cased inputs
/// correlate to the same hash.
fn hash_identifier(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Resolve the client IP from proxy headers
///
/// Prefers `CF-Connecting-IP`, then the first `X-Forwarded-For` entry.
/// Returns `None` when neither header carries a usable value.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(ip) = headers
        .get("cf-connecting-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(ip.to_owned());
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_identifier_normalizes_case_and_whitespace() {
        assert_eq!(hash_identifier("  User@Example.COM "), hash_identifier("user@example.com"));
        assert_eq!(hash_identifier("a").len(), 64);
    }

    #[test]
    fn test_event_builders_hash_identifiers() {
        let event = AuditEvent::new(AuditCategory::Auth, "login", AuditResult::Failure)
            .with_email("user@example.com")
            .with_ip(Some("203.0.113.9"))
            .with_reason("invalid_password");

        let email_hash = event.email_hash.as_deref().unwrap();
        assert_ne!(email_hash, "user@example.com");
        assert_eq!(email_hash.len(), 64);
        assert!(event.ip_hash.is_some());
        assert_eq!(event.reason.as_deref(), Some("invalid_password"));
    }

    #[test]
    fn test_client_ip_prefers_cf_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.7"));

        headers.insert("cf-connecting-ip", "203.0.113.9".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));

        assert!(client_ip(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_client_ip_ignores_empty_forwarded_entries() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "   ".parse().unwrap());
        assert!(client_ip(&headers).is_none());
    }
}
