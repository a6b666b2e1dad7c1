// showcache - Episode rotation with a bounded local cache
// Copyright (C) 2025 The showcache contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Named credentials in SQLite
//!
//! Values are stored as given. Protecting the database file is up to the host.

use crate::error::Result;
use crate::remote::CredentialStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

/// Credential name for the access key id
pub const ACCESS_KEY_ID: &str = "accessKeyId";
/// Credential name for the secret access key
pub const SECRET_ACCESS_KEY: &str = "secretAccessKey";
/// Credential name for the bucket
pub const BUCKET_NAME: &str = "bucketName";

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM credentials WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (name, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_credentials_round_trip() {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteCredentialStore::new(db.pool().clone());

        assert_eq!(store.get(BUCKET_NAME).await.unwrap(), None);
        store.set(BUCKET_NAME, "videos").await.unwrap();
        store.set(BUCKET_NAME, "videos-2").await.unwrap();
        assert_eq!(store.get(BUCKET_NAME).await.unwrap().as_deref(), Some("videos-2"));

        store.remove(BUCKET_NAME).await.unwrap();
        assert_eq!(store.get(BUCKET_NAME).await.unwrap(), None);
    }
}
