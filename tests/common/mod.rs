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


//! In-memory object and preference stores for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use showcache::catalog::EpisodeCatalog;
use showcache::download::{DownloadConfig, DownloadCoordinator};
use showcache::file::{CacheLayout, CacheLimits, LocalCacheManager};
use showcache::remote::{
    EpisodePreference, ListRequest, ObjectListing, ObjectStore, ObjectSummary, PreferenceDocument,
    PreferenceStore,
};
use showcache::{EventCallback, Result, WatchError, WatchEvent};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use url::Url;

pub const BUCKET: &str = "videos";

/// Object store backed by a map, with optional gating of transfers
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_keys: Mutex<HashSet<String>>,
    page_size: Mutex<Option<usize>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub fail_listing: AtomicBool,
    pub list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, size: usize) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), vec![b'x'; size]);
    }

    pub fn fail_download(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn set_page_size(&self, size: usize) {
        *self.page_size.lock().unwrap() = Some(size);
    }

    /// Transfers block until permits are added to the returned semaphore
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list_objects(&self, request: &ListRequest) -> Result<ObjectListing> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(WatchError::transport("listing unavailable", Some(503)));
        }

        let objects = self.objects.lock().unwrap().clone();
        let prefix = request.prefix.clone().unwrap_or_default();

        if request.delimiter.is_some() {
            let prefixes: BTreeSet<String> = objects
                .keys()
                .filter_map(|key| key.split_once('/').map(|(group, _)| format!("{}/", group)))
                .collect();
            return Ok(ObjectListing {
                common_prefixes: prefixes.into_iter().collect(),
                ..Default::default()
            });
        }

        let matching: Vec<ObjectSummary> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| request.marker.as_ref().map_or(true, |m| key.as_str() > m.as_str()))
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect();

        let page_size = self.page_size.lock().unwrap().unwrap_or(usize::MAX);
        let truncated = matching.len() > page_size;
        Ok(ObjectListing {
            items: matching.into_iter().take(page_size).collect(),
            common_prefixes: Vec::new(),
            truncated,
            next_marker: None,
        })
    }

    async fn download_object(
        &self,
        _bucket: &str,
        key: &str,
        temp_path: &Path,
        destination: &Path,
    ) -> Result<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);

        let result = self.transfer(key, temp_path, destination).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeStore {
    async fn transfer(&self, key: &str, temp_path: &Path, destination: &Path) -> Result<()> {
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| WatchError::transport(format!("NoSuchKey: {}", key), Some(404)))?;

        // Half the body first so progress can be observed mid-transfer
        tokio::fs::write(temp_path, &body[..body.len() / 2]).await?;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| WatchError::internal("gate closed"))?
                .forget();
        }

        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(WatchError::transport("connection reset", None));
        }

        tokio::fs::write(temp_path, &body).await?;
        tokio::fs::rename(temp_path, destination).await?;
        Ok(())
    }
}

/// Preference store backed by a map
#[derive(Default)]
pub struct FakePreferences {
    documents: Mutex<HashMap<String, PreferenceDocument>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub fail_get: AtomicBool,
    pub saves: Mutex<Vec<(String, Vec<EpisodePreference>)>>,
}

impl FakePreferences {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store(&self, group: &str, prefs: Vec<EpisodePreference>) {
        self.documents
            .lock()
            .unwrap()
            .insert(group.to_string(), PreferenceDocument::new(prefs));
    }

    /// Reads block until permits are added to the returned semaphore
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<Vec<EpisodePreference>> {
        self.saves.lock().unwrap().last().map(|(_, prefs)| prefs.clone())
    }
}

#[async_trait]
impl PreferenceStore for FakePreferences {
    async fn get_preferences(&self, group: &str) -> Result<PreferenceDocument> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| WatchError::internal("gate closed"))?
                .forget();
        }
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(WatchError::transport("preferences unavailable", Some(500)));
        }
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(group)
            .cloned()
            .unwrap_or_else(PreferenceDocument::empty))
    }

    async fn set_preferences(&self, group: &str, prefs: &[EpisodePreference]) -> Result<()> {
        self.saves
            .lock()
            .unwrap()
            .push((group.to_string(), prefs.to_vec()));
        self.store(group, prefs.to_vec());
        Ok(())
    }
}

pub fn pref(key: &str, rating: i64, last_played: Option<&str>) -> EpisodePreference {
    EpisodePreference {
        key: key.to_string(),
        rating,
        last_played: last_played.map(str::to_string),
    }
}

/// Collects every event
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<WatchEvent>>>,
}

impl Recorder {
    pub fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(WatchEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn all(&self) -> Vec<WatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Store, cache, coordinator and catalog over one temp directory
pub struct Harness {
    pub temp: Arc<TempDir>,
    pub store: Arc<FakeStore>,
    pub preferences: Arc<FakePreferences>,
    pub events: Recorder,
    pub cache: Arc<LocalCacheManager>,
    pub coordinator: Arc<DownloadCoordinator>,
    pub catalog: EpisodeCatalog,
    max_concurrent_downloads: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(5, CacheLimits::default())
    }

    pub fn with_limits(max_concurrent_downloads: usize, limits: CacheLimits) -> Self {
        Self::build(
            Arc::new(TempDir::new().unwrap()),
            FakeStore::new(),
            FakePreferences::new(),
            max_concurrent_downloads,
            limits,
        )
    }

    /// Fresh cache, coordinator and catalog over the same directories and
    /// stores, as after a process restart
    pub fn restart(&self) -> Self {
        Self::build(
            Arc::clone(&self.temp),
            Arc::clone(&self.store),
            Arc::clone(&self.preferences),
            self.max_concurrent_downloads,
            self.cache.limits(),
        )
    }

    fn build(
        temp: Arc<TempDir>,
        store: Arc<FakeStore>,
        preferences: Arc<FakePreferences>,
        max_concurrent_downloads: usize,
        limits: CacheLimits,
    ) -> Self {
        let events = Recorder::default();

        let cache = Arc::new(LocalCacheManager::new(CacheLayout::under(temp.path()), limits));
        let config = DownloadConfig {
            bucket: BUCKET.to_string(),
            max_concurrent_downloads,
            ..Default::default()
        };
        let coordinator = Arc::new(DownloadCoordinator::new(
            store.clone(),
            Arc::clone(&cache),
            config,
            events.callback(),
        ));
        let catalog = EpisodeCatalog::new(
            Url::parse("https://videos.example.com/").unwrap(),
            Arc::clone(&coordinator),
            preferences.clone(),
            events.callback(),
        );

        Self {
            temp,
            store,
            preferences,
            events,
            cache,
            coordinator,
            catalog,
            max_concurrent_downloads,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        self.cache.layout()
    }
}
