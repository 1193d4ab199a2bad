// ABOUTME: Shared test helpers for integration tests
// ABOUTME: Exports the in-process HTTP request plumbing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod axum_test;
