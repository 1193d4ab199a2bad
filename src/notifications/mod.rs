// ABOUTME: Outbound notification channels for account lifecycle events
// ABOUTME: Currently email only, used by the password-reset flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Notification delivery for the auth core

/// Email dispatch via the Resend-compatible HTTP API
pub mod email;

pub use email::{EmailClient, EmailDispatch};
