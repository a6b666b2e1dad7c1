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


//! On-disk layout
//!
//! Three roots, each holding one directory per group:
//!
//! ```text
//! {download_root}/{group}/{rest of key}   plain downloads and played episodes
//! {precache_root}/{group}/{rest of key}   completed, waiting for a cache slot
//! {cache_root}/{group}/{rest of key}      ready to play
//! ```
//!
//! Group names and key components come from remote keys, so each is reduced
//! to a single safe path component before use.

use super::manager::PARTIAL_SUFFIX;
use crate::episode::Episode;
use std::path::{Path, PathBuf};

/// Which of the three directories a file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Download,
    Precache,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub download_root: PathBuf,
    pub precache_root: PathBuf,
    pub cache_root: PathBuf,
}

impl CacheLayout {
    pub fn new<D, P, C>(download_root: D, precache_root: P, cache_root: C) -> Self
    where
        D: Into<PathBuf>,
        P: Into<PathBuf>,
        C: Into<PathBuf>,
    {
        Self {
            download_root: download_root.into(),
            precache_root: precache_root.into(),
            cache_root: cache_root.into(),
        }
    }

    /// `download`, `precache` and `cache` below a single base directory
    pub fn under<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self::new(base.join("download"), base.join("precache"), base.join("cache"))
    }

    pub fn root(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Download => &self.download_root,
            Tier::Precache => &self.precache_root,
            Tier::Cache => &self.cache_root,
        }
    }

    /// Per-group directory in a tier
    pub fn group_dir(&self, tier: Tier, group: &str) -> PathBuf {
        self.root(tier).join(sanitize_component(group))
    }

    /// Where `episode`'s file lives in a tier
    ///
    /// Keeps the key's structure below the group, one sanitized directory per
    /// key component, so distinct keys never share a file.
    pub fn path_for(&self, tier: Tier, episode: &Episode) -> PathBuf {
        let mut path = self.group_dir(tier, &episode.group);
        let components = episode.relative_components();
        if components.is_empty() {
            path.push(sanitize_component(&episode.key));
        }
        for component in components {
            path.push(sanitize_component(component));
        }
        path
    }

    /// Rebuild a key from a file found under a group directory
    pub fn key_for(&self, tier: Tier, group: &str, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(self.group_dir(tier, group)).ok()?;
        let mut key = group.trim_end_matches('/').to_string();
        for component in relative.components() {
            key.push('/');
            key.push_str(component.as_os_str().to_str()?);
        }
        Some(key)
    }

    /// Which tier a path belongs to, if any
    pub fn tier_of(&self, path: &Path) -> Option<Tier> {
        [Tier::Cache, Tier::Precache, Tier::Download]
            .into_iter()
            .find(|tier| path.starts_with(self.root(*tier)))
    }
}

/// File a transfer writes to before it is complete
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Reduce a remote name to one safe path component
///
/// Separators and control characters become `_`; `.` and `..` are replaced.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim_end_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
