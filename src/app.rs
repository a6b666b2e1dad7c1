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


//! Wiring
//!
//! [`AppContext`] owns one of each component, built from a [`WatchConfig`].
//! Hosts create it once and hand out catalogs from it.

use crate::catalog::EpisodeCatalog;
use crate::config::{Credentials, WatchConfig};
use crate::download::coordinator::DownloadCoordinator;
use crate::download::progress::{ProgressCallback, ProgressMonitor, ProgressPoller};
use crate::error::Result;
use crate::events::EventCallback;
use crate::file::cache::LocalCacheManager;
use crate::remote::{HttpObjectStore, ObjectStore, PreferenceStore, RequestSigner};
use crate::storage::{Database, SqliteCredentialStore, SqlitePreferenceStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

pub struct AppContext {
    database: Option<Database>,
    coordinator: Arc<DownloadCoordinator>,
    preferences: Arc<dyn PreferenceStore>,
    events: EventCallback,
    base_url: Url,
    progress_interval: Duration,
}

impl AppContext {
    /// Open the database, resolve credentials and build every component
    ///
    /// Fails with a configuration error before any network access when the
    /// config is invalid or credentials are missing.
    pub async fn new(config: &WatchConfig, events: EventCallback) -> Result<Self> {
        config.validate()?;

        let database = Database::new(&config.paths.database_path).await?;
        let credential_store = SqliteCredentialStore::new(database.pool().clone());
        let credentials = Credentials::resolve(&config.storage, &credential_store).await?;

        let base_url = config.storage.public_base_url(&credentials.bucket_name)?;
        let signer = RequestSigner::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            config.storage.bucket_region.clone(),
        );
        let store: Arc<dyn ObjectStore> =
            Arc::new(HttpObjectStore::new(&config.storage.endpoint())?.with_signer(signer));
        let preferences: Arc<dyn PreferenceStore> = Arc::new(SqlitePreferenceStore::new(
            database.pool().clone(),
            credentials.bucket_name.clone(),
            credentials.access_key_id.clone(),
        ));

        info!(
            bucket = %credentials.bucket_name,
            endpoint = %config.storage.endpoint(),
            "Context ready"
        );

        // The bucket may come from the credential store rather than the file
        let mut resolved = config.clone();
        resolved.storage.bucket_name = Some(credentials.bucket_name);
        let mut context = Self::with_parts(&resolved, store, preferences, base_url, events);
        context.database = Some(database);
        Ok(context)
    }

    /// Build from already constructed stores
    pub fn with_parts(
        config: &WatchConfig,
        store: Arc<dyn ObjectStore>,
        preferences: Arc<dyn PreferenceStore>,
        base_url: Url,
        events: EventCallback,
    ) -> Self {
        let bucket = config.storage.bucket_name.clone().unwrap_or_default();
        let cache = Arc::new(LocalCacheManager::new(config.cache_layout(), config.cache_limits()));
        let coordinator = Arc::new(DownloadCoordinator::new(
            store,
            cache,
            config.download_config(&bucket),
            events.clone(),
        ));
        Self {
            database: None,
            coordinator,
            preferences,
            events,
            base_url,
            progress_interval: config.progress_interval(),
        }
    }

    /// A catalog sharing this context's coordinator and stores
    pub fn catalog(&self) -> EpisodeCatalog {
        EpisodeCatalog::new(
            self.base_url.clone(),
            self.coordinator.clone(),
            self.preferences.clone(),
            self.events.clone(),
        )
    }

    pub fn coordinator(&self) -> &Arc<DownloadCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<LocalCacheManager> {
        self.coordinator.cache()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Credential store backed by this context's database
    pub fn credential_store(&self) -> Option<SqliteCredentialStore> {
        self.database
            .as_ref()
            .map(|db| SqliteCredentialStore::new(db.pool().clone()))
    }

    /// Poll `monitor` at the configured interval
    pub fn watch_progress(&self, monitor: &Arc<ProgressMonitor>, callback: ProgressCallback) -> ProgressPoller {
        monitor.spawn_poller(self.progress_interval, callback)
    }

    /// Checkpoint and close the database
    pub async fn shutdown(self) -> Result<()> {
        if let Some(database) = self.database {
            database.checkpoint().await?;
            database.close().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("base_url", &self.base_url.as_str())
            .field("coordinator", &self.coordinator)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}
