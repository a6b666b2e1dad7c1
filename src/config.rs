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


//! Configuration
//!
//! Read from a TOML file with three sections:
//!
//! ```toml
//! [storage]
//! bucket_name = "videos"
//! bucket_region = "us-west-2"
//!
//! [downloads]
//! max_concurrent_downloads = 5
//! max_downloaded_episodes = 10
//! max_episodes_in_cache = 2
//!
//! [paths]
//! download_dir = "/home/me/.local/share/showcache/download"
//! ```
//!
//! Every field has a default. Credentials left out of the file are looked up
//! in the credential store by [`Credentials::resolve`].

use crate::download::coordinator::{
    default_excluded_suffixes, default_playable_suffixes, DownloadConfig,
    DEFAULT_MAX_CONCURRENT_DOWNLOADS,
};
use crate::error::{Result, WatchError};
use crate::file::cache::{CacheLimits, DEFAULT_MAX_DOWNLOADED_EPISODES, DEFAULT_MAX_EPISODES_IN_CACHE};
use crate::file::paths::CacheLayout;
use crate::remote::CredentialStore;
use crate::storage::credentials::{ACCESS_KEY_ID, BUCKET_NAME, SECRET_ACCESS_KEY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

const APP_DIR: &str = "showcache";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Bucket location and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(default = "default_region")]
    pub bucket_region: String,
    /// Overrides the regional endpoint (S3-compatible servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Base URL episodes are played from; defaults to `{endpoint}/{bucket}/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            bucket_name: None,
            bucket_region: default_region(),
            endpoint: None,
            public_base_url: None,
        }
    }
}

impl StorageConfig {
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.bucket_region))
    }

    /// Base URL for public episode links
    pub fn public_base_url(&self, bucket: &str) -> Result<Url> {
        let raw = match &self.public_base_url {
            Some(url) => url.clone(),
            None => format!("{}/{}", self.endpoint().trim_end_matches('/'), bucket),
        };
        // join() drops the last segment unless the base ends with a slash
        let with_slash = if raw.ends_with('/') { raw } else { format!("{}/", raw) };
        Ok(Url::parse(&with_slash)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadsConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_max_downloaded")]
    pub max_downloaded_episodes: usize,
    #[serde(default = "default_max_cached")]
    pub max_episodes_in_cache: usize,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_playable_suffixes")]
    pub playable_suffixes: Vec<String>,
    #[serde(default = "default_excluded_suffixes")]
    pub excluded_suffixes: Vec<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            max_downloaded_episodes: default_max_downloaded(),
            max_episodes_in_cache: default_max_cached(),
            progress_interval_ms: default_progress_interval_ms(),
            playable_suffixes: default_playable_suffixes(),
            excluded_suffixes: default_excluded_suffixes(),
        }
    }
}

/// Where files and the database live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_precache_dir")]
    pub precache_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            precache_dir: default_precache_dir(),
            cache_dir: default_cache_dir(),
            database_path: default_database_path(),
        }
    }
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_max_downloaded() -> usize {
    DEFAULT_MAX_DOWNLOADED_EPISODES
}

fn default_max_cached() -> usize {
    DEFAULT_MAX_EPISODES_IN_CACHE
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_download_dir() -> PathBuf {
    data_dir().join("download")
}

fn default_precache_dir() -> PathBuf {
    cache_dir().join("precache")
}

fn default_cache_dir() -> PathBuf {
    cache_dir().join("cache")
}

fn default_database_path() -> PathBuf {
    data_dir().join("showcache.db")
}

impl WatchConfig {
    /// Parse a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatchError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Parse `path` (or the default location) if it exists, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        if path.exists() {
            Self::load(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file location
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Reject settings that would make the cache unusable
    pub fn validate(&self) -> Result<()> {
        let downloads = &self.downloads;
        if downloads.max_concurrent_downloads == 0 {
            return Err(WatchError::configuration("max_concurrent_downloads must be at least 1"));
        }
        if downloads.max_downloaded_episodes == 0 {
            return Err(WatchError::configuration("max_downloaded_episodes must be at least 1"));
        }
        if downloads.max_episodes_in_cache == 0 {
            return Err(WatchError::configuration("max_episodes_in_cache must be at least 1"));
        }
        if downloads.progress_interval_ms == 0 {
            return Err(WatchError::configuration("progress_interval_ms must be at least 1"));
        }
        if downloads.playable_suffixes.is_empty() {
            return Err(WatchError::configuration("playable_suffixes is empty"));
        }
        Url::parse(&self.storage.endpoint()).map_err(|e| {
            WatchError::configuration(format!("invalid endpoint '{}': {}", self.storage.endpoint(), e))
        })?;

        let paths = &self.paths;
        if paths.download_dir == paths.precache_dir
            || paths.download_dir == paths.cache_dir
            || paths.precache_dir == paths.cache_dir
        {
            return Err(WatchError::configuration(
                "download, precache and cache directories must differ",
            ));
        }
        Ok(())
    }

    pub fn cache_layout(&self) -> CacheLayout {
        CacheLayout::new(
            &self.paths.download_dir,
            &self.paths.precache_dir,
            &self.paths.cache_dir,
        )
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_downloaded_episodes: self.downloads.max_downloaded_episodes,
            max_episodes_in_cache: self.downloads.max_episodes_in_cache,
        }
    }

    pub fn download_config(&self, bucket: &str) -> DownloadConfig {
        DownloadConfig {
            bucket: bucket.to_string(),
            max_concurrent_downloads: self.downloads.max_concurrent_downloads,
            playable_suffixes: self.downloads.playable_suffixes.clone(),
            excluded_suffixes: self.downloads.excluded_suffixes.clone(),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.downloads.progress_interval_ms)
    }
}

/// Access key, secret and bucket, all present
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

impl Credentials {
    /// Take each value from the config, falling back to the credential store
    ///
    /// Fails with a configuration error naming every missing value.
    pub async fn resolve(storage: &StorageConfig, store: &dyn CredentialStore) -> Result<Self> {
        let access_key_id = pick(&storage.access_key_id, store, ACCESS_KEY_ID).await?;
        let secret_access_key = pick(&storage.secret_access_key, store, SECRET_ACCESS_KEY).await?;
        let bucket_name = pick(&storage.bucket_name, store, BUCKET_NAME).await?;

        match (access_key_id, secret_access_key, bucket_name) {
            (Some(access_key_id), Some(secret_access_key), Some(bucket_name)) => Ok(Self {
                access_key_id,
                secret_access_key,
                bucket_name,
            }),
            (a, s, b) => {
                let missing: Vec<&str> = [(a.is_none(), ACCESS_KEY_ID), (s.is_none(), SECRET_ACCESS_KEY), (b.is_none(), BUCKET_NAME)]
                    .into_iter()
                    .filter_map(|(missing, name)| missing.then_some(name))
                    .collect();
                Err(WatchError::configuration(format!(
                    "missing credentials: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Persist all three values
    pub async fn save(&self, store: &dyn CredentialStore) -> Result<()> {
        store.set(ACCESS_KEY_ID, &self.access_key_id).await?;
        store.set(SECRET_ACCESS_KEY, &self.secret_access_key).await?;
        store.set(BUCKET_NAME, &self.bucket_name).await?;
        Ok(())
    }
}

async fn pick(
    configured: &Option<String>,
    store: &dyn CredentialStore,
    name: &str,
) -> Result<Option<String>> {
    match configured.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(Some(value.to_string())),
        _ => Ok(store
            .get(name)
            .await?
            .filter(|value| !value.trim().is_empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SqliteCredentialStore};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WatchConfig::default();
        assert_eq!(config.downloads.max_concurrent_downloads, 5);
        assert_eq!(config.downloads.max_downloaded_episodes, 10);
        assert_eq!(config.downloads.max_episodes_in_cache, 2);
        assert_eq!(config.storage.endpoint(), "https://s3.us-west-2.amazonaws.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: WatchConfig = toml::from_str(
            r#"
            [storage]
            bucket_name = "videos"
            endpoint = "http://localhost:9000"

            [downloads]
            max_episodes_in_cache = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.downloads.max_episodes_in_cache, 3);
        assert_eq!(config.downloads.max_concurrent_downloads, 5);
        assert_eq!(
            config.storage.public_base_url("videos").unwrap().as_str(),
            "http://localhost:9000/videos/"
        );
    }

    #[test]
    fn test_zero_bound_rejected() {
        let mut config = WatchConfig::default();
        config.downloads.max_concurrent_downloads = 0;
        assert!(config.validate().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join("config.toml");
        let mut config = WatchConfig::default();
        config.storage.bucket_name = Some("videos".into());
        config.save(&path).unwrap();

        assert_eq!(WatchConfig::load(&path).unwrap(), config);
        assert_eq!(WatchConfig::load_or_default(Some(path.as_path())).unwrap(), config);
        let missing = WatchConfig::load_or_default(Some(temp.path().join("none.toml").as_path())).unwrap();
        assert_eq!(missing, WatchConfig::default());
    }

    #[tokio::test]
    async fn test_credentials_fall_back_to_store() {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteCredentialStore::new(db.pool().clone());
        store.set(SECRET_ACCESS_KEY, "secret").await.unwrap();
        store.set(BUCKET_NAME, "from-store").await.unwrap();

        let storage = StorageConfig {
            access_key_id: Some("AKIA1".into()),
            bucket_name: Some("from-config".into()),
            ..Default::default()
        };
        let credentials = Credentials::resolve(&storage, &store).await.unwrap();
        assert_eq!(credentials.bucket_name, "from-config");
        assert_eq!(credentials.secret_access_key, "secret");
        assert!(!format!("{:?}", credentials).contains("secret\""));
    }

    #[tokio::test]
    async fn test_missing_credentials_named() {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteCredentialStore::new(db.pool().clone());
        let err = Credentials::resolve(&StorageConfig::default(), &store)
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains(ACCESS_KEY_ID));
        assert!(err.to_string().contains(BUCKET_NAME));
    }
}
