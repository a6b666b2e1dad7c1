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


//! SQLite-backed preference documents
//!
//! Rows are keyed by `"{bucket}/{group}"` plus the owner (the access key id),
//! so two people sharing a bucket keep separate ratings.

use crate::error::Result;
use crate::remote::{EpisodePreference, PreferenceDocument, PreferenceStore, PREFERENCES_VERSION};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SqlitePreferenceStore {
    pool: SqlitePool,
    bucket: String,
    owner: String,
}

impl SqlitePreferenceStore {
    pub fn new<B: Into<String>, O: Into<String>>(pool: SqlitePool, bucket: B, owner: O) -> Self {
        Self {
            pool,
            bucket: bucket.into(),
            owner: owner.into(),
        }
    }

    fn group_key(&self, group: &str) -> String {
        format!("{}/{}", self.bucket, group)
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    /// A group without a stored row yields an empty document
    async fn get_preferences(&self, group: &str) -> Result<PreferenceDocument> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT version, prefs
            FROM preferences
            WHERE group_key = ? AND owner = ?
            "#,
        )
        .bind(self.group_key(group))
        .bind(&self.owner)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((version, prefs)) => {
                let version = u32::try_from(version).unwrap_or(u32::MAX);
                PreferenceDocument::from_parts(version, &prefs)
            }
            None => {
                debug!(group, "No stored preferences");
                Ok(PreferenceDocument::empty())
            }
        }
    }

    async fn set_preferences(&self, group: &str, prefs: &[EpisodePreference]) -> Result<()> {
        let prefs_json = serde_json::to_string(prefs)?;

        sqlx::query(
            r#"
            INSERT INTO preferences (group_key, owner, version, prefs, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(group_key, owner) DO UPDATE SET
                version = excluded.version,
                prefs = excluded.prefs,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(self.group_key(group))
        .bind(&self.owner)
        .bind(PREFERENCES_VERSION as i64)
        .bind(&prefs_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(group, count = prefs.len(), "Stored preferences");
        Ok(())
    }
}
