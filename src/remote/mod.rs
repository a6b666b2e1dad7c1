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


//! Remote collaborators
//!
//! The core talks to three external services through these traits:
//!
//! - [`ObjectStore`] - bucket listing and object transfer
//! - [`PreferenceStore`] - per-group rating/last-played documents
//! - [`CredentialStore`] - named secrets (access key, bucket name, ...)
//!
//! Retry and timeout policy belongs to the implementations, not to the core.
//! [`HttpObjectStore`] is the bundled object store; SQLite-backed preference
//! and credential stores live in [`crate::storage`].

pub mod http_store;
pub mod signing;

pub use http_store::HttpObjectStore;
pub use signing::RequestSigner;

use crate::error::{Result, WatchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The only preference document version this crate understands
pub const PREFERENCES_VERSION: u32 = 1;

/// Parameters for a single listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Key to start listing after
    pub marker: Option<String>,
}

/// One object in a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub items: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    /// More pages follow
    pub truncated: bool,
    /// Marker for the next page, when the store provides one
    pub next_marker: Option<String>,
}

/// Bucket listing and object transfer
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a single listing page
    async fn list_objects(&self, request: &ListRequest) -> Result<ObjectListing>;

    /// Download `key` into `temp_path`, then move it to `destination`
    ///
    /// `temp_path` must grow while the transfer runs so progress can be
    /// sampled; `destination` must not exist until the transfer succeeded.
    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        temp_path: &Path,
        destination: &Path,
    ) -> Result<()>;
}

/// Stored rating and last-played time for one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodePreference {
    pub key: String,
    #[serde(default)]
    pub rating: i64,
    /// ISO-8601 timestamp
    #[serde(default)]
    pub last_played: Option<String>,
}

/// Versioned preference payload for a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceDocument {
    pub version: u32,
    pub prefs: Vec<EpisodePreference>,
}

impl PreferenceDocument {
    pub fn new(prefs: Vec<EpisodePreference>) -> Self {
        Self {
            version: PREFERENCES_VERSION,
            prefs,
        }
    }

    /// Document for a group nobody has rated yet
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Reject documents written by an unknown version
    pub fn validate(&self) -> Result<()> {
        if self.version != PREFERENCES_VERSION {
            return Err(WatchError::preference_format(format!(
                "unknown preferences version {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Parse the `prefs` JSON array stored for a given version
    pub fn from_parts(version: u32, prefs_json: &str) -> Result<Self> {
        let document = Self {
            version,
            prefs: Vec::new(),
        };
        document.validate()?;

        let prefs: Vec<EpisodePreference> = serde_json::from_str(prefs_json).map_err(|e| {
            WatchError::preference_format(format!("malformed preferences JSON: {}", e))
        })?;

        Ok(Self { version, prefs })
    }

    /// Serialize just the `prefs` array
    pub fn prefs_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.prefs)?)
    }
}

/// Per-group preference persistence
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_preferences(&self, group: &str) -> Result<PreferenceDocument>;

    /// Best effort; callers log failures and move on
    async fn set_preferences(&self, group: &str, prefs: &[EpisodePreference]) -> Result<()>;
}

/// Named secret storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>>;
    async fn set(&self, name: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_wire_format() {
        let json = r#"[{"key":"simpsons/a.m3u8","rating":4,"lastPlayed":"2019-02-01T10:00:00Z"}]"#;
        let document = PreferenceDocument::from_parts(1, json).unwrap();
        assert_eq!(document.prefs.len(), 1);
        assert_eq!(document.prefs[0].rating, 4);
        assert_eq!(
            document.prefs[0].last_played.as_deref(),
            Some("2019-02-01T10:00:00Z")
        );

        let round = document.prefs_json().unwrap();
        assert!(round.contains("\"lastPlayed\""));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = PreferenceDocument::from_parts(2, "[]").unwrap_err();
        assert!(err.is_preference_error());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = PreferenceDocument::from_parts(1, "{not json").unwrap_err();
        assert!(err.is_preference_error());
    }
}
