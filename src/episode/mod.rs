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


//! Episode model and ordered episode lists
//!
//! An [`Episode`] is identified by its remote object key and nothing else:
//! two values with the same key are the same episode regardless of where the
//! file currently lives on disk.

pub mod list;
pub mod randomize;

pub use list::{merge, EpisodeList, MergeResult};
pub use randomize::{priority_score, recency_factor, weighted_order};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use url::Url;

/// Highest rating a user can give
pub const MAX_RATING: u8 = 5;

/// One playable media item in a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Remote object key, unique within the bucket
    pub key: String,

    /// Group (show) the episode belongs to
    pub group: String,

    /// User rating, 0 = unrated
    pub rating: u8,

    /// Last time playback finished, `None` if never played
    pub last_played: Option<DateTime<Utc>>,

    /// Size in bytes (0 if unknown)
    pub size: u64,

    /// Where the downloaded file currently lives
    pub local_path: Option<PathBuf>,
}

impl Episode {
    pub fn new<G: Into<String>, K: Into<String>>(group: G, key: K) -> Self {
        Self {
            key: key.into(),
            group: group.into(),
            rating: 0,
            last_played: None,
            size: 0,
            local_path: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Last component of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Key components below the group prefix
    ///
    /// `simpsons/s1/e1.mp4` in group `simpsons` gives `["s1", "e1.mp4"]`.
    /// A key outside its group keeps every component.
    pub fn relative_components(&self) -> Vec<&str> {
        let prefix = format!("{}/", self.group.trim_end_matches('/'));
        let relative = self.key.strip_prefix(prefix.as_str()).unwrap_or(&self.key);
        relative.split('/').filter(|part| !part.is_empty()).collect()
    }

    /// Human readable title: file stem with underscores as spaces
    pub fn printable_title(&self) -> String {
        let name = self.file_name();
        let stem = match name.rfind('.') {
            Some(0) | None => name,
            Some(dot) => &name[..dot],
        };
        stem.replace('_', " ")
    }

    /// Public URL of the remote object
    pub fn public_url(&self, base_url: &Url) -> Result<Url> {
        Ok(base_url.join(&self.key)?)
    }

    pub fn has_been_played(&self) -> bool {
        self.last_played.is_some()
    }

    /// Set rating, clamped to [`MAX_RATING`]
    pub fn set_rating(&mut self, rating: u8) {
        self.rating = rating.min(MAX_RATING);
    }
}

impl PartialEq for Episode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Episode {}

impl Hash for Episode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_and_title() {
        let episode = Episode::new("simpsons", "simpsons/Bart_the_Genius.m3u8");
        assert_eq!(episode.file_name(), "Bart_the_Genius.m3u8");
        assert_eq!(episode.printable_title(), "Bart the Genius");

        let bare = Episode::new("misc", "README");
        assert_eq!(bare.file_name(), "README");
        assert_eq!(bare.printable_title(), "README");
    }

    #[test]
    fn test_relative_components() {
        let nested = Episode::new("simpsons", "simpsons/s1/e1.mp4");
        assert_eq!(nested.relative_components(), vec!["s1", "e1.mp4"]);

        let flat = Episode::new("simpsons", "simpsons/e1.mp4");
        assert_eq!(flat.relative_components(), vec!["e1.mp4"]);

        let outside = Episode::new("simpsons", "other/e1.mp4");
        assert_eq!(outside.relative_components(), vec!["other", "e1.mp4"]);
    }

    #[test]
    fn test_identity_is_key() {
        let mut a = Episode::new("simpsons", "simpsons/a.m3u8");
        let mut b = Episode::new("simpsons", "simpsons/a.m3u8");
        a.local_path = Some(PathBuf::from("/tmp/download/simpsons/a.m3u8"));
        b.local_path = Some(PathBuf::from("/tmp/cache/simpsons/a.m3u8"));
        b.rating = 4;
        assert_eq!(a, b);
    }

    #[test]
    fn test_public_url() {
        let base = Url::parse("https://videos.example.com/bucket/").unwrap();
        let episode = Episode::new("simpsons", "simpsons/Lisa's Pony.m3u8");
        let url = episode.public_url(&base).unwrap();
        assert!(url.as_str().starts_with("https://videos.example.com/bucket/simpsons/"));
    }

    #[test]
    fn test_rating_clamped() {
        let mut episode = Episode::new("g", "g/x.mp4");
        episode.set_rating(9);
        assert_eq!(episode.rating, MAX_RATING);
    }
}
