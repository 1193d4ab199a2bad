// ABOUTME: User account database operations
// ABOUTME: Handles account creation, email lookup and password hash updates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use super::{with_write_retry, Database};
use crate::models::User;
use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the users table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub(super) async fn migrate_users(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already in use or the insert fails.
    pub async fn create_user(&self, user: &User) -> Result<Uuid> {
        with_write_retry(|| {
            sqlx::query(
                r"
                INSERT INTO users (id, email, password_hash, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
        })
        .await?;

        Ok(user.id)
    }

    /// Get a user by normalized email
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Replace a user's password hash
    ///
    /// Used both for reset-confirm and for persisting legacy hash upgrades
    /// after a successful verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        with_write_retry(|| {
            sqlx::query(
                r"
                UPDATE users
                SET password_hash = $1, updated_at = CURRENT_TIMESTAMP
                WHERE id = $2
                ",
            )
            .bind(password_hash)
            .bind(user_id.to_string())
            .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Convert a database row to a User struct
    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let id: String = row.get("id");
        Ok(User {
            id: Uuid::parse_str(&id)?,
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
