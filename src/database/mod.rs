// ABOUTME: SQLite database management with schema migration and bounded write retry
// ABOUTME: Splits user, password-reset and OAuth storage across submodules on one pool
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! # Database Management
//!
//! Storage for user accounts, password-reset tokens and OAuth grants. All
//! operations share one SQLite pool; schema migration runs at connect time.
//!
//! Writes are retried up to three times with short backoff when SQLite
//! reports transient lock contention. Reads are never retried.

mod oauth;
mod password_resets;
mod users;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::future::Future;
use std::time::Duration;

/// Backoff delays applied before each write retry, first attempt is immediate
const WRITE_RETRY_DELAYS_MS: [u64; 3] = [50, 150, 300];

/// Database manager for account and grant storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect and run schema migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration statement fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_users().await?;
        self.migrate_password_resets().await?;
        self.migrate_oauth().await?;
        Ok(())
    }
}

/// Run a write operation, retrying on transient SQLite lock contention
///
/// The first attempt runs immediately; up to three retries follow with
/// 50/150/300ms delays. Non-transient errors return at once.
async fn with_write_retry<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = op().await;
    for delay_ms in WRITE_RETRY_DELAYS_MS {
        match attempt {
            Err(ref err) if is_transient_write_error(err) => {
                tracing::warn!(delay_ms, "transient write contention, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt = op().await;
            }
            _ => break,
        }
    }
    attempt
}

/// Whether a write failed on transient lock contention worth retrying
fn is_transient_write_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    let message = db_err.message().to_lowercase();
    message.contains("database is locked") || message.contains("database table is locked")
}
