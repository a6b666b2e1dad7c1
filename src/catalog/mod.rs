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


//! Episode catalog
//!
//! Holds the merged episode list for the current group and decides what to
//! download next.
//!
//! # Load cycle
//! 1. On a group switch, the local cache is rebuilt from disk
//! 2. Remote listing and stored preferences are fetched concurrently
//! 3. Both results are in before anything is decided
//! 4. Listing decides membership, preferences decide rating and last-played
//! 5. Optional weighted randomization
//! 6. `ListCreated`, and a preference push when the member count changed
//!
//! One failed half is reported once through `LoadError` and the list is built
//! from the other half. Only when both fail does the load return an error.
//!
//! Loading the same group twice at once is a no-op. Loading another group
//! starts over; results from the older cycle are dropped when they arrive.

use crate::download::coordinator::{DownloadCoordinator, PrefetchReport};
use crate::episode::{merge, Episode, EpisodeList, MAX_RATING};
use crate::error::Result;
use crate::events::{EventCallback, WatchEvent};
use crate::remote::PreferenceStore;
use crate::sync::Guarded;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Result of [`EpisodeCatalog::load_group`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The list is ready
    Loaded {
        count: usize,
        /// Member count differed between listing and preferences
        has_changes: bool,
        /// 0 when both halves succeeded
        failures: usize,
    },
    /// A load for this group is already running
    AlreadyLoading,
    /// A load for another group started while this one ran
    Superseded,
}

#[derive(Debug, Default)]
struct LoadState {
    group: Option<String>,
    loading: bool,
    generation: u64,
}

#[derive(Debug, Default)]
struct CatalogState {
    list: Option<EpisodeList>,
    /// Next position to prefetch from
    cursor: usize,
}

pub struct EpisodeCatalog {
    base_url: Url,
    coordinator: Arc<DownloadCoordinator>,
    preferences: Arc<dyn PreferenceStore>,
    events: EventCallback,
    load: Guarded<LoadState>,
    state: Guarded<CatalogState>,
    pushes: Guarded<Vec<JoinHandle<()>>>,
}

impl EpisodeCatalog {
    pub fn new(
        base_url: Url,
        coordinator: Arc<DownloadCoordinator>,
        preferences: Arc<dyn PreferenceStore>,
        events: EventCallback,
    ) -> Self {
        Self {
            base_url,
            coordinator,
            preferences,
            events,
            load: Guarded::default(),
            state: Guarded::default(),
            pushes: Guarded::default(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn current_group(&self) -> Option<String> {
        self.load.read(|s| s.group.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.load.read(|s| s.loading)
    }

    /// Load (or reload) a group's list
    pub async fn load_group(&self, group: &str, randomize: bool) -> Result<LoadOutcome> {
        let started = self.load.write(|s| {
            let same_group = s.group.as_deref() == Some(group);
            if s.loading && same_group {
                return None;
            }
            s.generation += 1;
            s.loading = true;
            s.group = Some(group.to_string());
            Some((s.generation, !same_group))
        });
        let Some((generation, group_changed)) = started else {
            debug!(group, "Load already in progress");
            return Ok(LoadOutcome::AlreadyLoading);
        };
        let loading = LoadGuard {
            load: &self.load,
            generation,
        };
        if group_changed {
            self.state.replace(CatalogState::default());
            // Pick up files a previous run left in precache and cache
            if let Err(e) = self.coordinator.cache().warm_cache(group).await {
                warn!(group, error = %e, "Could not rebuild cache from disk");
            }
        }
        info!(group, generation, "Loading group");

        let (listing, stored) = tokio::join!(
            self.coordinator.list_group(group),
            self.preferences.get_preferences(group)
        );

        if !self.is_current(generation) {
            debug!(group, generation, "Discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }

        let remote = listing.map(|episodes| EpisodeList::from_episodes(self.base_url.clone(), episodes));
        let stored = stored
            .and_then(|document| EpisodeList::from_preferences(self.base_url.clone(), group, &document));

        let (mut list, has_changes, failures) = match (remote, stored) {
            (Ok(remote), Ok(stored)) => {
                let merged = merge(&remote, &stored);
                (merged.list, merged.has_changes, 0)
            }
            (Ok(remote), Err(e)) => {
                warn!(group, error = %e, "Preferences unavailable, using listing only");
                self.report_load_error(group, 1, e.user_message());
                (remote, false, 1)
            }
            (Err(e), Ok(stored)) => {
                warn!(group, error = %e, "Listing failed, using stored preferences");
                self.report_load_error(group, 1, e.user_message());
                (stored, false, 1)
            }
            (Err(listing_error), Err(preference_error)) => {
                warn!(group, error = %listing_error, preference_error = %preference_error, "Load failed");
                self.report_load_error(group, 2, listing_error.user_message());
                return Err(listing_error);
            }
        };

        if randomize {
            self.randomize_list(group, &mut list);
        }

        let count = list.len();
        let created = self.state.write(|s| {
            let created = s.list.is_none();
            s.list = Some(list);
            s.cursor = 0;
            created
        });
        drop(loading);

        let event = if created {
            WatchEvent::ListCreated {
                group: group.to_string(),
                count,
            }
        } else {
            WatchEvent::ListChanged {
                group: group.to_string(),
                count,
            }
        };
        (self.events)(event);

        if has_changes {
            info!(group, count, "Membership changed, saving preferences");
            self.push_preferences();
        }

        Ok(LoadOutcome::Loaded {
            count,
            has_changes,
            failures,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.load.read(|s| s.generation == generation)
    }

    fn report_load_error(&self, group: &str, failures: usize, message: String) {
        (self.events)(WatchEvent::LoadError {
            group: group.to_string(),
            failures,
            message,
        });
    }

    fn randomize_list(&self, group: &str, list: &mut EpisodeList) {
        let total = list.len();
        let step = (total / 20).max(1);
        let events = Arc::clone(&self.events);
        let group_name = group.to_string();
        list.randomize_with(&mut rand::thread_rng(), |placed, total| {
            if placed % step == 0 || placed == total {
                events(WatchEvent::RandomizationProgress {
                    group: group_name.clone(),
                    placed,
                    total,
                });
            }
        });
        debug!(group, total, "Randomized");
    }

    /// Reshuffle the current list
    pub fn randomize(&self) -> bool {
        let Some(group) = self.current_group() else {
            return false;
        };
        let generation = self.load.read(|s| s.generation);
        let Some(mut shuffled) = self.state.read(|s| s.list.clone()) else {
            warn!("Nothing to randomize");
            return false;
        };

        self.randomize_list(&group, &mut shuffled);
        let order = shuffled.keys().to_vec();

        // A load that finished meanwhile wins
        if !self.is_current(generation) {
            return false;
        }
        // Only the order is written back; edits made during the shuffle stay
        let applied = self.state.write(|s| {
            let list = s.list.as_mut()?;
            match list.reorder(order) {
                Ok(()) => {
                    let count = list.len();
                    s.cursor = 0;
                    Some(count)
                }
                Err(e) => {
                    debug!(error = %e, "List changed during shuffle, keeping old order");
                    None
                }
            }
        });
        match applied {
            Some(count) => {
                (self.events)(WatchEvent::ListChanged { group, count });
                true
            }
            None => false,
        }
    }

    /// Put `key` first, keeping the rest in order
    pub fn move_key_to_front(&self, key: &str) -> bool {
        let moved = self.state.write(|s| {
            let list = s.list.as_mut()?;
            if !list.move_to_front(key) {
                return None;
            }
            let count = list.len();
            s.cursor = 0;
            Some(count)
        });
        match moved {
            Some(count) => {
                self.emit_changed(count);
                true
            }
            None => false,
        }
    }

    /// Back to listing order
    pub fn reset_order(&self) {
        let count = self.state.write(|s| {
            s.cursor = 0;
            s.list.as_mut().map(|list| {
                list.reset_order();
                list.len()
            })
        });
        if let Some(count) = count {
            self.emit_changed(count);
        }
    }

    fn emit_changed(&self, count: usize) {
        if let Some(group) = self.current_group() {
            (self.events)(WatchEvent::ListChanged { group, count });
        }
    }

    /// Set a rating (clamped to 0..=5) and save preferences in the background
    pub fn set_rating(&self, key: &str, rating: u8) -> bool {
        if rating > MAX_RATING {
            debug!(key, rating, "Clamping rating");
        }
        self.update_episode(key, |episode| episode.set_rating(rating))
    }

    /// Set last-played and save preferences in the background
    pub fn set_last_played(&self, key: &str, when: Option<DateTime<Utc>>) -> bool {
        self.update_episode(key, |episode| episode.last_played = when)
    }

    fn update_episode(&self, key: &str, update: impl FnOnce(&mut Episode)) -> bool {
        let found = self.state.write(|s| {
            match s.list.as_mut().and_then(|list| list.get_mut(key)) {
                Some(episode) => {
                    update(episode);
                    true
                }
                None => false,
            }
        });
        if found {
            self.push_preferences();
        } else {
            warn!(key, "Unknown episode, ignoring update");
        }
        found
    }

    /// Save the whole list to the preference store on a background task
    ///
    /// Failures are logged and never retried.
    pub fn push_preferences(&self) {
        let Some(group) = self.current_group() else {
            return;
        };
        let Some(prefs) = self.state.read(|s| s.list.as_ref().map(EpisodeList::to_preferences)) else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(group, "No async runtime, preferences not saved");
                return;
            }
        };

        let store = Arc::clone(&self.preferences);
        let handle = runtime.spawn(async move {
            match store.set_preferences(&group, &prefs).await {
                Ok(()) => debug!(group, count = prefs.len(), "Preferences saved"),
                Err(e) => warn!(group, error = %e, "Could not save preferences"),
            }
        });
        self.pushes.write(|pushes| {
            pushes.retain(|h| !h.is_finished());
            pushes.push(handle);
        });
    }

    /// Wait for background preference saves to finish
    pub async fn flush_preferences(&self) {
        let pending = self.pushes.write(std::mem::take);
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Preference save task failed");
            }
        }
    }

    /// Episodes in playback order
    pub fn episodes(&self) -> Vec<Episode> {
        self.state.read(|s| {
            s.list
                .as_ref()
                .map(|list| list.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn episode(&self, key: &str) -> Option<Episode> {
        self.state.read(|s| s.list.as_ref().and_then(|list| list.get(key).cloned()))
    }

    pub fn len(&self) -> usize {
        self.state.read(|s| s.list.as_ref().map_or(0, EpisodeList::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn public_url(&self, key: &str) -> Option<Url> {
        self.state.read(|s| s.list.as_ref().and_then(|list| list.public_url(key)))
    }

    /// Start downloads for the next `n` episodes after the cursor
    ///
    /// The cursor wraps at the end of the list and advances by the number of
    /// candidates the coordinator consumed.
    pub async fn prefetch_upcoming(&self, n: usize) -> PrefetchReport {
        if !self.coordinator.cache().precache_has_room() {
            info!("Precache full, not prefetching");
            return PrefetchReport::default();
        }

        let (candidates, start) = self.state.read(|s| match &s.list {
            Some(list) if !list.is_empty() => {
                let start = s.cursor % list.len();
                let ordered: Vec<Episode> = list
                    .iter()
                    .skip(start)
                    .chain(list.iter().take(start))
                    .cloned()
                    .collect();
                (ordered, start)
            }
            _ => (Vec::new(), 0),
        });
        if candidates.is_empty() {
            return PrefetchReport::default();
        }

        let report = self.coordinator.prefetch(&candidates, n).await;

        self.state.write(|s| {
            if let Some(list) = s.list.as_mut() {
                for (key, path) in &report.local {
                    if let Some(episode) = list.get_mut(key) {
                        episode.local_path = Some(path.clone());
                    }
                }
                if !list.is_empty() && s.cursor % list.len() == start {
                    s.cursor = (start + report.consumed) % list.len();
                }
            }
        });
        report
    }

    /// Playback of `key` finished
    ///
    /// Records the time, moves the file out of the cache, then prefetches one
    /// more episode. Returns where the played file can be reused from.
    pub async fn episode_finished(&self, key: &str) -> Option<PathBuf> {
        self.set_last_played(key, Some(Utc::now()));

        let episode = match self.episode(key) {
            Some(episode) => episode,
            None => {
                let group = self.current_group()?;
                Episode::new(group, key)
            }
        };

        let reusable = self.coordinator.cache().on_playback_completed(&episode).await;
        self.state.write(|s| {
            if let Some(episode) = s.list.as_mut().and_then(|list| list.get_mut(key)) {
                episode.local_path = reusable.clone();
            }
        });

        self.prefetch_upcoming(1).await;
        reusable
    }
}

/// Clears the loading flag when its load cycle ends, however it ends
struct LoadGuard<'a> {
    load: &'a Guarded<LoadState>,
    generation: u64,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.load.write(|s| {
            if s.generation == generation {
                s.loading = false;
            }
        });
    }
}

impl std::fmt::Debug for EpisodeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodeCatalog")
            .field("group", &self.current_group())
            .field("episodes", &self.len())
            .finish()
    }
}
