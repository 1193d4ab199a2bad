// ABOUTME: Core data models for accounts, sessions, reset tokens and grant props
// ABOUTME: Shared across the auth routes, OAuth flow and persistence layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Data Models
//!
//! Domain types shared across the auth core. Everything here serializes to
//! JSON; wire field names follow the client contract (camelCase where the
//! browser or an OAuth client sees them).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User account credential record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Email address, stored normalized (trimmed, lowercased), unique
    pub email: String,
    /// Password hash in tagged or legacy format (see `crypto::password`)
    pub password_hash: String,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (password migration or reset)
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user record with a freshly generated id
    #[must_use]
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Requested operation on the combined login/signup endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Verify credentials against an existing account
    Login,
    /// Create a new account
    Signup,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::Signup => f.write_str("signup"),
        }
    }
}

/// Session record carried inside the signed session cookie
///
/// Both fields must be non-empty for the record to be considered valid;
/// the codec treats anything else as "no session".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User id the session belongs to
    pub id: String,
    /// Normalized account email
    pub email: String,
}

impl Session {
    /// Build a session record for a user
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Password-reset token row
///
/// Only the SHA-256 hash of the raw token is persisted; the raw value
/// exists solely inside the reset email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    /// Row identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// SHA-256 hex digest of the raw token
    pub token_hash: String,
    /// Expiry instant; tokens live one hour
    pub expires_at: DateTime<Utc>,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
}

/// Authenticated-user properties attached to an OAuth grant
///
/// Serialized into grant storage at authorization time and handed to the
/// protected resource on every verified request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantProps {
    /// Stable pseudonymous id (SHA-256 of the normalized email)
    pub user_id: String,
    /// Account email
    pub email: String,
    /// Display name derived from the email local part
    pub display_name: String,
}

impl GrantProps {
    /// Derive grant props from a normalized email
    #[must_use]
    pub fn from_email(user_id: String, email: &str) -> Self {
        let display_name = email
            .split('@')
            .next()
            .filter(|part| !part.is_empty())
            .unwrap_or("user");
        Self {
            user_id,
            email: email.to_owned(),
            display_name: display_name.to_owned(),
        }
    }
}

/// Normalize an email for lookup and storage: trim then lowercase
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
