// ABOUTME: Salted PBKDF2 password hashing with tagged storage format and legacy migration
// ABOUTME: Verification is constant-time and never errors on malformed stored hashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Password Hashing
//!
//! Passwords are stored as `pbkdf2_sha256$<iterations>$<saltHex>$<hashHex>`.
//! Verification also accepts the legacy bare SHA-256 hex digest; a
//! successful legacy match returns a freshly derived tagged hash so the
//! caller can migrate the stored credential in place.
//!
//! Malformed stored hashes are never an error: any parse failure verifies
//! as invalid, which keeps the response identical whether the stored value
//! is wrong, corrupt or absent.

use crate::errors::{AppError, AppResult};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Algorithm tag in the stored format
const ALGORITHM_TAG: &str = "pbkdf2_sha256";
/// Iteration count for newly produced hashes
const PBKDF2_ITERATIONS: u32 = 120_000;
/// Salt length in bytes
const SALT_LEN: usize = 16;
/// Derived key length in bytes for newly produced hashes
const DERIVED_KEY_LEN: usize = 32;
/// Length of the legacy bare SHA-256 hex digest
const LEGACY_DIGEST_LEN: usize = 64;

/// Outcome of a password verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Whether the password matches the stored hash
    pub valid: bool,
    /// Replacement tagged hash when a legacy hash verified successfully;
    /// the caller is responsible for persisting it
    pub upgraded_hash: Option<String>,
}

impl Verification {
    const fn invalid() -> Self {
        Self {
            valid: false,
            upgraded_hash: None,
        }
    }
}

/// Password hasher holding the process RNG and a dummy hash for
/// timing-equalized verification against nonexistent accounts
pub struct PasswordHasher {
    rng: SystemRandom,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher and derive its dummy hash
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails.
    pub fn new() -> AppResult<Self> {
        let rng = SystemRandom::new();
        let mut unguessable = [0u8; 32];
        rng.fill(&mut unguessable)
            .map_err(|_| AppError::internal("System RNG failure"))?;
        let dummy_hash = hash_with_rng(&rng, &hex::encode(unguessable))?;
        Ok(Self { rng, dummy_hash })
    }

    /// Hash a password into the tagged storage format
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails to produce a salt.
    pub fn hash(&self, password: &str) -> AppResult<String> {
        hash_with_rng(&self.rng, password)
    }

    /// Verify a password against a stored hash
    ///
    /// Accepts both the tagged format and the legacy bare digest. Never
    /// errors: malformed stored hashes verify as invalid.
    #[must_use]
    pub fn verify(&self, password: &str, stored_hash: &str) -> Verification {
        let stored = stored_hash.trim();

        if let Some(parsed) = TaggedHash::parse(stored) {
            let derived = derive_key(password, &parsed.salt, parsed.iterations, parsed.hash.len());
            return Verification {
                valid: constant_time_eq(&derived, &parsed.hash),
                upgraded_hash: None,
            };
        }

        if is_legacy_digest(stored) {
            let digest = hex::encode(Sha256::digest(password.as_bytes()));
            if constant_time_eq(digest.as_bytes(), stored.to_lowercase().as_bytes()) {
                // Upgrade failure only costs the migration, not the login
                let upgraded_hash = match self.hash(password) {
                    Ok(upgraded) => Some(upgraded),
                    Err(e) => {
                        warn!(error = %e, "failed to derive upgraded hash for legacy credential");
                        None
                    }
                };
                return Verification {
                    valid: true,
                    upgraded_hash,
                };
            }
            return Verification::invalid();
        }

        Verification::invalid()
    }

    /// Tagged hash with no matching password, for verify calls against
    /// accounts that do not exist
    #[must_use]
    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

fn hash_with_rng(rng: &SystemRandom, password: &str) -> AppResult<String> {
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| AppError::internal("System RNG failure"))?;

    // Safe width: PBKDF2_ITERATIONS is a nonzero constant
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| AppError::internal("invalid iteration constant"))?;
    let derived = derive_key(password, &salt, iterations, DERIVED_KEY_LEN);

    Ok(format!(
        "{ALGORITHM_TAG}${PBKDF2_ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(derived)
    ))
}

fn derive_key(password: &str, salt: &[u8], iterations: NonZeroU32, out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut out,
    );
    out
}

/// Parsed tagged hash fields
struct TaggedHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl TaggedHash {
    /// Strict parse of the tagged format; any malformed field yields `None`
    fn parse(stored: &str) -> Option<Self> {
        let fields: Vec<&str> = stored.split('$').collect();
        if fields.len() != 4 || fields[0] != ALGORITHM_TAG {
            return None;
        }

        let iterations: u32 = fields[1].trim().parse().ok()?;
        let iterations = NonZeroU32::new(iterations)?;
        let salt = decode_hex_field(fields[2])?;
        let hash = decode_hex_field(fields[3])?;

        Some(Self {
            iterations,
            salt,
            hash,
        })
    }
}

/// Decode a hex field: trimmed, case-insensitive, non-empty, even length
fn decode_hex_field(field: &str) -> Option<Vec<u8>> {
    let cleaned = field.trim().to_lowercase();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return None;
    }
    hex::decode(cleaned).ok()
}

/// Whether a stored value matches the legacy bare SHA-256 digest shape
fn is_legacy_digest(stored: &str) -> bool {
    stored.len() == LEGACY_DIGEST_LEN && stored.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Constant-time equality over the longer of the two buffers, with a
/// separate exact-length requirement so truncated values never match
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut padded_a = a.to_vec();
    let mut padded_b = b.to_vec();
    padded_a.resize(len, 0);
    padded_b.resize(len, 0);

    let bytes_eq = padded_a.ct_eq(&padded_b);
    let len_eq = a.len().ct_eq(&b.len());
    bool::from(bytes_eq & len_eq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_parse_rejects_wrong_field_count() {
        assert!(TaggedHash::parse("pbkdf2_sha256$120000$aabb").is_none());
        assert!(TaggedHash::parse("pbkdf2_sha256$120000$aabb$ccdd$extra").is_none());
    }

    #[test]
    fn test_tagged_parse_rejects_bad_fields() {
        // wrong algorithm tag
        assert!(TaggedHash::parse("pbkdf2_sha512$120000$aabb$ccdd").is_none());
        // non-numeric and zero iterations
        assert!(TaggedHash::parse("pbkdf2_sha256$lots$aabb$ccdd").is_none());
        assert!(TaggedHash::parse("pbkdf2_sha256$0$aabb$ccdd").is_none());
        // non-hex, odd-length and empty salt/hash fields
        assert!(TaggedHash::parse("pbkdf2_sha256$120000$zzzz$ccdd").is_none());
        assert!(TaggedHash::parse("pbkdf2_sha256$120000$aab$ccdd").is_none());
        assert!(TaggedHash::parse("pbkdf2_sha256$120000$$ccdd").is_none());
    }

    #[test]
    fn test_tagged_parse_accepts_stored_parameters() {
        let parsed = TaggedHash::parse("pbkdf2_sha256$1000$AABB$ccdd").unwrap();
        assert_eq!(parsed.iterations.get(), 1000);
        assert_eq!(parsed.salt, vec![0xaa, 0xbb]);
        assert_eq!(parsed.hash, vec![0xcc, 0xdd]);
    }

    #[test]
    fn test_constant_time_eq_requires_exact_length() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_legacy_digest_shape() {
        assert!(is_legacy_digest(&"a".repeat(64)));
        assert!(is_legacy_digest(&"A0".repeat(32)));
        assert!(!is_legacy_digest(&"a".repeat(63)));
        assert!(!is_legacy_digest(&"g".repeat(64)));
    }
}
