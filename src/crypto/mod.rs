// ABOUTME: Cryptographic primitives for credential storage
// ABOUTME: Password key derivation, legacy digest migration and constant-time comparison
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Cryptographic utilities for the auth core

/// SHA-256 digest helpers for stored secrets and pseudonymous ids
pub mod digest;
/// Password hashing, verification and online migration
pub mod password;

pub use digest::sha256_hex;
pub use password::{PasswordHasher, Verification};
