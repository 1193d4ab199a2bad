// ABOUTME: Password-reset token database operations
// ABOUTME: Stores hashed single-use tokens with millisecond expiry timestamps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use super::{with_write_retry, Database};
use crate::models::PasswordResetToken;
use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the password_resets table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails.
    pub(super) async fn migrate_password_resets(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS password_resets (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_password_resets_token_hash ON password_resets(token_hash)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_password_resets_user_id ON password_resets(user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a reset token row
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<()> {
        with_write_retry(|| {
            sqlx::query(
                r"
                INSERT INTO password_resets (id, user_id, token_hash, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(token.id.to_string())
            .bind(token.user_id.to_string())
            .bind(&token.token_hash)
            .bind(token.expires_at.timestamp_millis())
            .bind(token.created_at)
            .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Look up a reset token by its SHA-256 hash
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_reset_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM password_resets WHERE token_hash = $1
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reset_token).transpose()
    }

    /// Delete a single reset token row by id
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_reset_token(&self, id: Uuid) -> Result<()> {
        with_write_retry(|| {
            sqlx::query("DELETE FROM password_resets WHERE id = $1")
                .bind(id.to_string())
                .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Delete every reset token belonging to a user
    ///
    /// Runs before issuing a replacement token and after a successful
    /// confirm.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<()> {
        with_write_retry(|| {
            sqlx::query("DELETE FROM password_resets WHERE user_id = $1")
                .bind(user_id.to_string())
                .execute(&self.pool)
        })
        .await?;

        Ok(())
    }

    /// Convert a database row to a reset token struct
    fn row_to_reset_token(row: &sqlx::sqlite::SqliteRow) -> Result<PasswordResetToken> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        let expires_at_ms: i64 = row.get("expires_at");

        Ok(PasswordResetToken {
            id: Uuid::parse_str(&id)?,
            user_id: Uuid::parse_str(&user_id)?,
            token_hash: row.get("token_hash"),
            expires_at: chrono::DateTime::from_timestamp_millis(expires_at_ms)
                .unwrap_or_default(),
            created_at: row.get("created_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::create_test_db;
    use crate::models::{PasswordResetToken, User};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn token_for(user_id: Uuid, hash: &str) -> PasswordResetToken {
        PasswordResetToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash.to_owned(),
            expires_at: Utc::now() + Duration::hours(1),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup_by_hash() -> Result<()> {
        let db = create_test_db().await?;
        let user = User::new("a@b.com".into(), "hash".into());
        db.create_user(&user).await?;

        let token = token_for(user.id, "deadbeef");
        db.insert_reset_token(&token).await?;

        let found = db.get_reset_token_by_hash("deadbeef").await?.unwrap();
        assert_eq!(found.id, token.id);
        assert_eq!(found.user_id, user.id);
        assert_eq!(
            found.expires_at.timestamp_millis(),
            token.expires_at.timestamp_millis()
        );

        assert!(db.get_reset_token_by_hash("unknown").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_tokens_for_user_clears_all() -> Result<()> {
        let db = create_test_db().await?;
        let user = User::new("a@b.com".into(), "hash".into());
        db.create_user(&user).await?;

        db.insert_reset_token(&token_for(user.id, "h1")).await?;
        db.insert_reset_token(&token_for(user.id, "h2")).await?;
        db.delete_reset_tokens_for_user(user.id).await?;

        assert!(db.get_reset_token_by_hash("h1").await?.is_none());
        assert!(db.get_reset_token_by_hash("h2").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_single_token() -> Result<()> {
        let db = create_test_db().await?;
        let user = User::new("a@b.com".into(), "hash".into());
        db.create_user(&user).await?;

        let token = token_for(user.id, "h1");
        db.insert_reset_token(&token).await?;
        db.delete_reset_token(token.id).await?;

        assert!(db.get_reset_token_by_hash("h1").await?.is_none());
        Ok(())
    }
}
