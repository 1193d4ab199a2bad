// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: All runtime configuration is sourced from environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Configuration module for the epicflare auth core

/// Environment and server configuration
pub mod environment;

pub use environment::ServerConfig;
