// ABOUTME: SHA-256 digest helpers for token hashing and pseudonymous identifiers
// ABOUTME: Codes, bearer tokens and reset tokens are stored as hex digests only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of the input
///
/// Used wherever a secret is stored or compared by hash: reset tokens,
/// authorization codes, bearer tokens, client secrets, and the stable
/// pseudonymous user id derived from a normalized email.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}
