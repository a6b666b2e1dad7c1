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


//! Download coordination
//!
//! # Responsibilities
//! - Listing a group's playable objects (paginated)
//! - Deduplicating transfers by key
//! - Bounding concurrent transfers (default: 5); requests over the bound are
//!   rejected, not queued
//! - Handing finished files to the [`LocalCacheManager`]
//!
//! # Transfer flow
//! 1. Reuse a local file if the download directory or the cache has one
//! 2. Register the key in the in-flight set (check and insert under one lock)
//! 3. Spawn the transfer into `{destination}.part`
//! 4. On success: cache handoff, `EpisodeAvailable`; on failure: `DownloadError`
//! 5. Remove the key from the in-flight set and resolve the [`DownloadHandle`]

use crate::download::progress::ProgressMonitor;
use crate::episode::Episode;
use crate::error::{Result, WatchError};
use crate::events::{EventCallback, WatchEvent};
use crate::file::cache::{CompletedDownload, LocalCacheManager};
use crate::file::manager::FileManager;
use crate::file::paths::{partial_path, Tier};
use crate::remote::{ListRequest, ObjectStore, ObjectSummary};
use crate::sync::Guarded;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Default limit on simultaneous transfers
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 5;

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Bucket holding every group
    pub bucket: String,

    /// Maximum concurrent downloads
    pub max_concurrent_downloads: usize,

    /// Keys must end in one of these to be listed
    pub playable_suffixes: Vec<String>,

    /// Keys ending in one of these are never listed
    pub excluded_suffixes: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            playable_suffixes: default_playable_suffixes(),
            excluded_suffixes: default_excluded_suffixes(),
        }
    }
}

pub fn default_playable_suffixes() -> Vec<String> {
    [".m3u8", ".mp4", ".m4v", ".mov", ".mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_excluded_suffixes() -> Vec<String> {
    vec!["-480p.m3u8".to_string()]
}

impl DownloadConfig {
    /// Non-empty object whose key has a playable, non-excluded suffix
    pub fn is_playable(&self, item: &ObjectSummary) -> bool {
        if item.size == 0 {
            return false;
        }
        let key = item.key.to_ascii_lowercase();
        let matches = |suffixes: &[String]| {
            suffixes
                .iter()
                .any(|suffix| key.ends_with(&suffix.to_ascii_lowercase()))
        };
        matches(&self.playable_suffixes) && !matches(&self.excluded_suffixes)
    }
}

/// Transfer tracked while in flight
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub key: String,
    pub temp_path: PathBuf,
    pub destination: PathBuf,
    pub total_size: u64,
    pub monitor: Arc<ProgressMonitor>,
}

/// What [`DownloadCoordinator::fetch`] did
#[derive(Debug)]
pub enum FetchOutcome {
    /// File already on disk, no transfer needed
    Local(PathBuf),
    /// Another transfer for this key is running
    InFlight,
    /// Concurrency limit reached; nothing was queued
    AtCapacity,
    /// A new transfer was spawned
    Started(DownloadHandle),
}

/// Awaitable result of one transfer
#[derive(Debug)]
pub struct DownloadHandle {
    key: String,
    monitor: Arc<ProgressMonitor>,
    receiver: oneshot::Receiver<Result<CompletedDownload>>,
}

impl DownloadHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn monitor(&self) -> &Arc<ProgressMonitor> {
        &self.monitor
    }

    /// Wait for the transfer and cache handoff to finish
    pub async fn wait(self) -> Result<CompletedDownload> {
        self.receiver.await.map_err(|_| {
            WatchError::internal(format!("transfer task for {} ended without a result", self.key))
        })?
    }
}

/// What [`DownloadCoordinator::prefetch`] did with its candidates
#[derive(Debug, Default)]
pub struct PrefetchReport {
    /// Candidates looked at, including ones skipped as already in flight
    pub consumed: usize,
    /// Transfers that were started
    pub started: Vec<DownloadHandle>,
    /// Candidates that were already on disk
    pub local: Vec<(String, PathBuf)>,
    /// Stopped early because the concurrency limit was reached
    pub at_capacity: bool,
}

impl PrefetchReport {
    /// Number of candidates that counted toward the attempt limit
    pub fn attempts(&self) -> usize {
        self.started.len() + self.local.len()
    }
}

/// Deduplicating, bounded downloader
pub struct DownloadCoordinator {
    store: Arc<dyn ObjectStore>,
    cache: Arc<LocalCacheManager>,
    config: DownloadConfig,
    events: EventCallback,
    files: FileManager,

    /// In-flight transfers (key -> task)
    in_flight: Arc<Guarded<HashMap<String, DownloadTask>>>,
}

impl DownloadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<LocalCacheManager>,
        config: DownloadConfig,
        events: EventCallback,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            events,
            files: FileManager::new(),
            in_flight: Arc::new(Guarded::default()),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<LocalCacheManager> {
        &self.cache
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.read(|m| m.len())
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.read(|m| m.contains_key(key))
    }

    /// Snapshot of running transfers
    pub fn in_flight_tasks(&self) -> Vec<DownloadTask> {
        self.in_flight.read(|m| m.values().cloned().collect())
    }

    /// Progress monitor of a running transfer
    pub fn monitor(&self, key: &str) -> Option<Arc<ProgressMonitor>> {
        self.in_flight.read(|m| m.get(key).map(|t| Arc::clone(&t.monitor)))
    }

    /// Plain download path for an episode
    pub fn destination_for(&self, episode: &Episode) -> PathBuf {
        self.cache.layout().path_for(Tier::Download, episode)
    }

    /// Every playable object under `{group}/`, in listing order
    pub async fn list_group(&self, group: &str) -> Result<Vec<Episode>> {
        let prefix = format!("{}/", group.trim_end_matches('/'));
        let mut episodes = Vec::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let request = ListRequest {
                bucket: self.config.bucket.clone(),
                prefix: Some(prefix.clone()),
                delimiter: None,
                marker: marker.clone(),
            };
            let page = self.store.list_objects(&request).await?;
            pages += 1;

            let last_key = page.items.last().map(|item| item.key.clone());
            episodes.extend(
                page.items
                    .iter()
                    .filter(|item| self.config.is_playable(item))
                    .map(|item| Episode::new(group, item.key.clone()).with_size(item.size)),
            );
            (self.events)(WatchEvent::ListProgress {
                group: group.to_string(),
                items_found: episodes.len(),
            });

            if !page.truncated {
                break;
            }
            let next = page.next_marker.or(last_key);
            if next.is_none() || next == marker {
                warn!(group, pages, "Truncated listing without a usable marker, stopping");
                break;
            }
            marker = next;
        }

        info!(group, pages, episodes = episodes.len(), "Listed group");
        Ok(episodes)
    }

    /// Top-level groups in the bucket
    pub async fn list_groups(&self) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let request = ListRequest {
                bucket: self.config.bucket.clone(),
                prefix: None,
                delimiter: Some("/".to_string()),
                marker: marker.clone(),
            };
            let page = self.store.list_objects(&request).await?;

            let last = page
                .common_prefixes
                .last()
                .cloned()
                .or_else(|| page.items.last().map(|item| item.key.clone()));
            groups.extend(
                page.common_prefixes
                    .iter()
                    .map(|p| p.trim_end_matches('/').to_string())
                    .filter(|p| !p.is_empty()),
            );

            if !page.truncated {
                break;
            }
            let next = page.next_marker.or(last);
            if next.is_none() || next == marker {
                warn!("Truncated group listing without a usable marker, stopping");
                break;
            }
            marker = next;
        }

        Ok(groups)
    }

    /// Make `episode` available locally
    pub async fn fetch(&self, episode: &Episode) -> Result<FetchOutcome> {
        let key = episode.key.clone();
        let destination = self.destination_for(episode);

        if FileManager::file_exists(&destination).await {
            debug!(key = %key, "Reusing downloaded file");
            return Ok(FetchOutcome::Local(destination));
        }
        if let Some(path) = self.cache.locate(&key) {
            debug!(key = %key, "Already cached");
            return Ok(FetchOutcome::Local(path));
        }

        let temp_path = partial_path(&destination);
        let monitor = Arc::new(ProgressMonitor::new(key.clone(), &temp_path, episode.size));
        let task = DownloadTask {
            key: key.clone(),
            temp_path: temp_path.clone(),
            destination: destination.clone(),
            total_size: episode.size,
            monitor: Arc::clone(&monitor),
        };

        let limit = self.config.max_concurrent_downloads;
        let registered = self.in_flight.write(|m| {
            if m.contains_key(&key) {
                Err(FetchOutcome::InFlight)
            } else if m.len() >= limit {
                Err(FetchOutcome::AtCapacity)
            } else {
                m.insert(key.clone(), task);
                Ok(())
            }
        });
        if let Err(outcome) = registered {
            match outcome {
                FetchOutcome::AtCapacity => info!(key = %key, limit, "Download limit reached, not starting"),
                _ => debug!(key = %key, "Already downloading"),
            }
            return Ok(outcome);
        }

        if let Some(parent) = destination.parent() {
            if let Err(e) = self.files.ensure_directory_exists(parent).await {
                self.in_flight.write(|m| m.remove(&key));
                monitor.mark_failed();
                (self.events)(WatchEvent::DownloadError {
                    key: key.clone(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        }

        (self.events)(WatchEvent::DownloadStarted {
            key: key.clone(),
            monitor: Arc::clone(&monitor),
        });
        info!(key = %key, size = episode.size, "Download started");

        let (sender, receiver) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let events = Arc::clone(&self.events);
        let in_flight = Arc::clone(&self.in_flight);
        let files = self.files.clone();
        let bucket = self.config.bucket.clone();
        let mut finished = episode.clone();
        let task_monitor = Arc::clone(&monitor);
        let task_key = key.clone();

        tokio::spawn(async move {
            let key = task_key;
            let transfer = store
                .download_object(&bucket, &key, &temp_path, &destination)
                .await;

            let outcome = match transfer {
                Ok(()) => {
                    task_monitor.mark_complete();
                    finished.local_path = Some(destination.clone());
                    let completed = cache.on_download_completed(finished).await;
                    in_flight.write(|m| m.remove(&key));
                    info!(key = %key, path = %completed.path.display(), "Episode available");
                    events(WatchEvent::EpisodeAvailable {
                        key: key.clone(),
                        path: completed.path.clone(),
                    });
                    Ok(completed)
                }
                Err(e) => {
                    task_monitor.mark_failed();
                    if let Err(cleanup) = files.safe_delete(&temp_path).await {
                        warn!(key = %key, error = %cleanup, "Could not remove partial file");
                    }
                    in_flight.write(|m| m.remove(&key));
                    error!(key = %key, error = %e, "Download failed");
                    events(WatchEvent::DownloadError {
                        key: key.clone(),
                        message: e.user_message(),
                    });
                    Err(e)
                }
            };

            // Receiver may have been dropped; the events already went out
            let _ = sender.send(outcome);
        });

        Ok(FetchOutcome::Started(DownloadHandle {
            key,
            monitor,
            receiver,
        }))
    }

    /// Try to realize up to `n` of `candidates`
    ///
    /// Stops as soon as the concurrency limit is reached. Candidates already
    /// in flight are skipped without counting toward `n`.
    pub async fn prefetch(&self, candidates: &[Episode], n: usize) -> PrefetchReport {
        let mut report = PrefetchReport::default();
        let limit = self.config.max_concurrent_downloads;

        for episode in candidates {
            if report.attempts() >= n {
                break;
            }
            if self.in_flight_count() >= limit {
                info!(limit, "Skipping prefetch, download limit reached");
                report.at_capacity = true;
                break;
            }

            match self.fetch(episode).await {
                Ok(FetchOutcome::Local(path)) => {
                    report.consumed += 1;
                    report.local.push((episode.key.clone(), path));
                }
                Ok(FetchOutcome::Started(handle)) => {
                    report.consumed += 1;
                    report.started.push(handle);
                }
                Ok(FetchOutcome::InFlight) => {
                    report.consumed += 1;
                }
                Ok(FetchOutcome::AtCapacity) => {
                    info!(limit, "Skipping prefetch, download limit reached");
                    report.at_capacity = true;
                    break;
                }
                Err(e) => {
                    report.consumed += 1;
                    warn!(key = %episode.key, error = %e, "Prefetch failed");
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}
