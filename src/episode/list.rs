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


//! Ordered episode list
//!
//! Keeps a playback order of keys next to a key → [`Episode`] map. Every key in
//! the order is in the map and vice versa; the listing order is remembered so
//! the list can be reset after a shuffle.

use super::{Episode, MAX_RATING};
use crate::error::{Result, WatchError};
use crate::remote::{EpisodePreference, PreferenceDocument};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Ordered, key-unique collection of episodes for one group
#[derive(Debug, Clone)]
pub struct EpisodeList {
    base_url: Url,
    order: Vec<String>,
    listing_order: Vec<String>,
    episodes: HashMap<String, Episode>,
}

/// Outcome of reconciling the remote listing with stored preferences
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub list: EpisodeList,
    /// Membership differs between the two inputs (count comparison only)
    pub has_changes: bool,
}

impl EpisodeList {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            order: Vec::new(),
            listing_order: Vec::new(),
            episodes: HashMap::new(),
        }
    }

    /// Build from episodes in listing order; later duplicates are dropped
    pub fn from_episodes<I>(base_url: Url, episodes: I) -> Self
    where
        I: IntoIterator<Item = Episode>,
    {
        let mut list = Self::new(base_url);
        for episode in episodes {
            list.push(episode);
        }
        list
    }

    /// Build from a stored preference document
    ///
    /// Membership comes from the document itself; ratings are clamped and
    /// unparsable timestamps fail the whole document.
    pub fn from_preferences(
        base_url: Url,
        group: &str,
        document: &PreferenceDocument,
    ) -> Result<Self> {
        document.validate()?;

        let mut list = Self::new(base_url);
        for pref in &document.prefs {
            let mut episode = Episode::new(group, pref.key.clone());
            episode.rating = pref.rating.clamp(0, MAX_RATING as i64) as u8;
            episode.last_played = match pref.last_played.as_deref() {
                Some(raw) => parse_last_played(raw)?,
                None => None,
            };
            list.push(episode);
        }
        Ok(list)
    }

    /// Preference records in playback order
    pub fn to_preferences(&self) -> Vec<EpisodePreference> {
        self.iter()
            .map(|episode| EpisodePreference {
                key: episode.key.clone(),
                rating: episode.rating as i64,
                last_played: Some(format_last_played(episode.last_played)),
            })
            .collect()
    }

    /// Append an episode; returns false if the key was already present
    pub fn push(&mut self, episode: Episode) -> bool {
        if self.episodes.contains_key(&episode.key) {
            debug!(key = %episode.key, "Duplicate key ignored");
            return false;
        }
        self.order.push(episode.key.clone());
        self.listing_order.push(episode.key.clone());
        self.episodes.insert(episode.key.clone(), episode);
        true
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn contains(&self, key: &str) -> bool {
        self.episodes.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Episode> {
        self.episodes.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Episode> {
        self.episodes.get_mut(key)
    }

    /// Keys in playback order
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    /// Episodes in playback order
    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.order.iter().filter_map(move |key| self.episodes.get(key))
    }

    /// Rating for a key, 0 when unknown
    pub fn rating(&self, key: &str) -> u8 {
        self.episodes.get(key).map(|e| e.rating).unwrap_or(0)
    }

    /// Last played time for a key, `None` when unknown or never played
    pub fn last_played(&self, key: &str) -> Option<DateTime<Utc>> {
        self.episodes.get(key).and_then(|e| e.last_played)
    }

    pub fn public_url(&self, key: &str) -> Option<Url> {
        let episode = self.episodes.get(key)?;
        match episode.public_url(&self.base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(key, error = %e, "Could not build public URL");
                None
            }
        }
    }

    /// Move `key` to the front, keeping the relative order of the rest
    pub fn move_to_front(&mut self, key: &str) -> bool {
        match self.order.iter().position(|k| k == key) {
            Some(index) => {
                let key = self.order.remove(index);
                self.order.insert(0, key);
                true
            }
            None => {
                warn!(key, "Trying to move key to front, but it is not in the list");
                false
            }
        }
    }

    /// Restore the order the episodes were listed in
    pub fn reset_order(&mut self) {
        self.order = self.listing_order.clone();
    }

    /// Replace the playback order; `order` must be a permutation of the keys
    pub fn reorder(&mut self, order: Vec<String>) -> Result<()> {
        if order.len() != self.episodes.len() {
            return Err(WatchError::invalid_input(format!(
                "order has {} keys, list has {}",
                order.len(),
                self.episodes.len()
            )));
        }
        let mut seen = std::collections::HashSet::with_capacity(order.len());
        for key in &order {
            if !self.episodes.contains_key(key) || !seen.insert(key.as_str()) {
                return Err(WatchError::invalid_input(format!(
                    "order is not a permutation of the list (at {})",
                    key
                )));
            }
        }
        self.order = order;
        Ok(())
    }
}

/// Reconcile the remote listing with stored preferences
///
/// `authoritative` decides which keys exist and in which order; ratings and
/// last-played times are copied from `preferences` where the key is present
/// there. `has_changes` only compares the two sizes, so an add and a remove of
/// the same size go unnoticed.
pub fn merge(authoritative: &EpisodeList, preferences: &EpisodeList) -> MergeResult {
    let mut list = EpisodeList::new(authoritative.base_url.clone());

    for episode in authoritative.iter() {
        let mut merged = episode.clone();
        match preferences.get(&episode.key) {
            Some(pref) => {
                merged.rating = pref.rating;
                merged.last_played = pref.last_played;
            }
            None => {
                merged.rating = 0;
                merged.last_played = None;
            }
        }
        list.push(merged);
    }

    MergeResult {
        list,
        has_changes: authoritative.len() != preferences.len(),
    }
}

/// Parse a stored timestamp; anything at or before the epoch means never
fn parse_last_played(raw: &str) -> Result<Option<DateTime<Utc>>> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
        WatchError::preference_format(format!("bad lastPlayed timestamp '{}': {}", raw, e))
    })?;
    let parsed = parsed.with_timezone(&Utc);
    if parsed <= DateTime::<Utc>::UNIX_EPOCH {
        Ok(None)
    } else {
        Ok(Some(parsed))
    }
}

fn format_last_played(last_played: Option<DateTime<Utc>>) -> String {
    last_played
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
