// ABOUTME: Security support modules for audit logging and identifier hashing
// ABOUTME: Exposes the audit event types used across auth, OAuth and rate limiting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Security Module
//!
//! Audit logging for authentication and OAuth operations. Events carry
//! hashed identifiers only, raw emails and client IPs never reach the log
//! stream.

pub mod audit;

pub use audit::{client_ip, AuditCategory, AuditEvent, AuditResult};
