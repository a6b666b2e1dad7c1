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


//! Tiered local cache
//!
//! # Lifecycle
//!
//! ```text
//! Downloading ──► Precache ──► Cache ──► Reusable
//!  (coordinator)   (FIFO,       (FIFO,     (plain download dir,
//!                   bounded)     bounded)    untracked)
//! ```
//!
//! - A completed download is moved into the precache directory and queued.
//! - [`LocalCacheManager::try_shift`] promotes the oldest precache entry into
//!   the cache directory when the cache has a free slot.
//! - After playback the file goes back to the download directory where it can
//!   be reused without another transfer.
//!
//! # Locking
//!
//! Precache and cache each have their own [`Guarded`] bucket. A slot is
//! reserved under the bucket lock before any file is moved, and the move itself
//! runs with no lock held, so neither bound can be exceeded by concurrent
//! completions. The two locks are never held at the same time.

use super::manager::FileManager;
use super::paths::{CacheLayout, Tier};
use crate::episode::Episode;
use crate::error::{Result, WatchError};
use crate::sync::Guarded;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Default bound on completed-but-not-promoted episodes
pub const DEFAULT_MAX_DOWNLOADED_EPISODES: usize = 10;

/// Default bound on ready-to-play episodes
pub const DEFAULT_MAX_EPISODES_IN_CACHE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_downloaded_episodes: usize,
    pub max_episodes_in_cache: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_downloaded_episodes: DEFAULT_MAX_DOWNLOADED_EPISODES,
            max_episodes_in_cache: DEFAULT_MAX_EPISODES_IN_CACHE,
        }
    }
}

/// Result of handing a finished transfer to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    /// Where the file is now
    pub path: PathBuf,
    /// Precache still has a free slot after the shift
    pub precache_has_room: bool,
}

/// What [`LocalCacheManager::warm_cache`] found on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub precached: usize,
    pub cached: usize,
    /// Files over a bound that were moved to the download directory
    pub demoted: usize,
}

/// FIFO bucket with slots reserved for moves in progress
#[derive(Debug, Default)]
struct Bucket {
    entries: VecDeque<Episode>,
    reserved: usize,
}

impl Bucket {
    fn try_reserve(&mut self, bound: usize) -> bool {
        if self.entries.len() + self.reserved < bound {
            self.reserved += 1;
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Fill a reserved slot
    fn commit(&mut self, episode: Episode) {
        self.release();
        self.entries.push_back(episode);
    }

    fn has_room(&self, bound: usize) -> bool {
        self.entries.len() + self.reserved < bound
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }
}

/// On-disk lifecycle of downloaded episodes
#[derive(Debug)]
pub struct LocalCacheManager {
    layout: CacheLayout,
    limits: CacheLimits,
    files: FileManager,
    precache: Guarded<Bucket>,
    cache: Guarded<Bucket>,
}

impl LocalCacheManager {
    pub fn new(layout: CacheLayout, limits: CacheLimits) -> Self {
        Self::with_file_manager(layout, limits, FileManager::new())
    }

    pub fn with_file_manager(layout: CacheLayout, limits: CacheLimits, files: FileManager) -> Self {
        Self {
            layout,
            limits,
            files,
            precache: Guarded::default(),
            cache: Guarded::default(),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Take ownership of a finished download
    ///
    /// `episode.local_path` must point at the downloaded file. When the
    /// precache is full the file stays where it is and is not tracked.
    pub async fn on_download_completed(&self, mut episode: Episode) -> CompletedDownload {
        let source = episode
            .local_path
            .clone()
            .unwrap_or_else(|| self.layout.path_for(Tier::Download, &episode));

        if let Some(path) = self.locate(&episode.key) {
            debug!(key = %episode.key, "Download already tracked");
            return CompletedDownload {
                path,
                precache_has_room: self.precache_has_room(),
            };
        }

        let key = episode.key.clone();
        let bound = self.limits.max_downloaded_episodes;
        let mut path = source.clone();
        if self.precache.write(|b| b.try_reserve(bound)) {
            let target = self.layout.path_for(Tier::Precache, &episode);
            match self.files.safe_move(&source, &target).await {
                Ok(()) => path = target,
                Err(e) => warn!(key = %episode.key, error = %e, "Could not move into precache, tracking in place"),
            }
            episode.local_path = Some(path.clone());
            self.precache.write(|b| b.commit(episode));
            debug!(key = %key, "Precached");
        } else {
            info!(key = %episode.key, "Precache full, leaving download untracked");
        }

        self.try_shift().await;

        CompletedDownload {
            path: self.locate(&key).unwrap_or(path),
            precache_has_room: self.precache_has_room(),
        }
    }

    /// Promote the oldest precache entry if the cache has a free slot
    ///
    /// Returns the promoted episode. A failed move deletes the file.
    pub async fn try_shift(&self) -> Option<Episode> {
        let bound = self.limits.max_episodes_in_cache;
        if !self.cache.write(|b| b.try_reserve(bound)) {
            return None;
        }

        let Some(mut episode) = self.precache.write(|b| b.entries.pop_front()) else {
            self.cache.write(Bucket::release);
            return None;
        };

        let source = episode
            .local_path
            .clone()
            .unwrap_or_else(|| self.layout.path_for(Tier::Precache, &episode));
        let target = self.layout.path_for(Tier::Cache, &episode);

        match self.files.safe_move(&source, &target).await {
            Ok(()) => {
                episode.local_path = Some(target);
                debug!(key = %episode.key, "Promoted to cache");
                let promoted = episode.clone();
                self.cache.write(|b| b.commit(episode));
                Some(promoted)
            }
            Err(e) => {
                warn!(key = %episode.key, error = %e, "Promotion failed, deleting file");
                if let Err(e) = self.files.safe_delete(&source).await {
                    warn!(path = %source.display(), error = %e, "Could not delete orphaned file");
                }
                self.cache.write(Bucket::release);
                None
            }
        }
    }

    /// Move a played episode back to the download directory
    ///
    /// Returns the reusable path, or `None` when the file was deleted or
    /// there was nothing to move.
    pub async fn on_playback_completed(&self, episode: &Episode) -> Option<PathBuf> {
        let removed = self.cache.write(|b| {
            let index = b.position(&episode.key)?;
            b.entries.remove(index)
        });

        let source = match &removed {
            Some(entry) => entry
                .local_path
                .clone()
                .unwrap_or_else(|| self.layout.path_for(Tier::Cache, episode)),
            None => {
                warn!(key = %episode.key, "Played episode absent from cache");
                self.layout.path_for(Tier::Cache, episode)
            }
        };
        let target = self.layout.path_for(Tier::Download, episode);

        let reusable = if FileManager::file_exists(&source).await {
            match self.files.safe_move(&source, &target).await {
                Ok(()) => Some(target),
                Err(e) => {
                    warn!(key = %episode.key, error = %e, "Could not demote played file, deleting it");
                    if let Err(e) = self.files.safe_delete(&source).await {
                        warn!(path = %source.display(), error = %e, "Delete failed");
                    }
                    None
                }
            }
        } else if FileManager::file_exists(&target).await {
            Some(target)
        } else {
            debug!(key = %episode.key, "No file to demote");
            None
        };

        self.try_shift().await;
        reusable
    }

    /// Rebuild both buckets for `group` from what is on disk
    ///
    /// Files are queued oldest first. Anything over a bound is moved to the
    /// download directory.
    pub async fn warm_cache(&self, group: &str) -> Result<WarmReport> {
        let mut report = WarmReport::default();

        for tier in [Tier::Cache, Tier::Precache] {
            let dir = self.layout.group_dir(tier, group);
            let scanned = FileManager::scan_tree(&dir).await?;
            let (bucket, bound) = match tier {
                Tier::Cache => (&self.cache, self.limits.max_episodes_in_cache),
                _ => (&self.precache, self.limits.max_downloaded_episodes),
            };

            // Forget stale entries for this group before refilling
            bucket.write(|b| b.entries.retain(|e| e.group != group));

            for file in scanned {
                let Some(key) = self.layout.key_for(tier, group, &file.path) else {
                    debug!(path = %file.path.display(), "Skipping file without a usable key");
                    continue;
                };
                let mut episode = Episode::new(group, key).with_size(file.size);
                episode.local_path = Some(file.path.clone());

                let admitted = bucket.write(|b| {
                    if b.position(&episode.key).is_some() || !b.has_room(bound) {
                        return None;
                    }
                    b.entries.push_back(episode.clone());
                    Some(())
                });

                match (admitted, tier) {
                    (Some(()), Tier::Cache) => report.cached += 1,
                    (Some(()), _) => report.precached += 1,
                    (None, _) => {
                        let target = self.layout.path_for(Tier::Download, &episode);
                        match self.files.safe_move(&file.path, &target).await {
                            Ok(()) => report.demoted += 1,
                            Err(e) => warn!(error = %e, "Could not demote overflow file"),
                        }
                    }
                }
            }
        }

        while self.try_shift().await.is_some() {}

        info!(
            group,
            cached = report.cached,
            precached = report.precached,
            demoted = report.demoted,
            "Cache warmed"
        );
        Ok(report)
    }

    /// Current path of a tracked episode
    pub fn locate(&self, key: &str) -> Option<PathBuf> {
        let find = |b: &Bucket| {
            b.entries
                .iter()
                .find(|e| e.key == key)
                .and_then(|e| e.local_path.clone())
        };
        self.cache.read(find).or_else(|| self.precache.read(find))
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.cache.read(|b| b.position(key).is_some())
            || self.precache.read(|b| b.position(key).is_some())
    }

    pub fn precache_has_room(&self) -> bool {
        let bound = self.limits.max_downloaded_episodes;
        self.precache.read(|b| b.has_room(bound))
    }

    /// Cache entries, oldest first
    pub fn cached(&self) -> Vec<Episode> {
        self.cache.read(|b| b.entries.iter().cloned().collect())
    }

    /// Precache entries, oldest first
    pub fn precached(&self) -> Vec<Episode> {
        self.precache.read(|b| b.entries.iter().cloned().collect())
    }

    /// Episode at `position` in play order: cache entries, then precache
    pub fn queued_episode(&self, position: usize) -> Option<Episode> {
        let cached = self.cache.read(|b| b.entries.get(position).cloned().ok_or(b.entries.len()));
        match cached {
            Ok(episode) => Some(episode),
            Err(len) => self.precache.read(|b| b.entries.get(position - len).cloned()),
        }
    }

    pub fn first_queued(&self) -> Option<Episode> {
        self.queued_episode(0)
    }

    pub fn second_queued(&self) -> Option<Episode> {
        self.queued_episode(1)
    }

    /// Drop an entry from tracking without touching the file
    pub fn forget(&self, key: &str) -> Result<Episode> {
        let take = |b: &mut Bucket| b.position(key).and_then(|i| b.entries.remove(i));
        self.cache
            .write(take)
            .or_else(|| self.precache.write(take))
            .ok_or_else(|| WatchError::not_found(format!("cached episode {}", key)))
    }
}
