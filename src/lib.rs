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


//! Episode rotation with a bounded local cache
//!
//! Episodes live in a remote object-storage bucket, one prefix per group.
//! A catalog merges the bucket listing with stored per-user preferences,
//! orders the episodes by a weighted shuffle and keeps a few of them
//! downloaded ahead of playback.
//!
//! # Modules
//! - [`catalog`]: load cycle, ordering, prefetch decisions
//! - [`download`]: deduplicated, bounded transfers and progress
//! - [`file`]: download / precache / cache tiers on disk
//! - [`remote`]: object store and preference store seams
//! - [`storage`]: SQLite-backed preference and credential stores
//! - [`config`], [`logging`], [`app`]: ambient setup

pub mod app;
pub mod catalog;
pub mod config;
pub mod download;
pub mod episode;
pub mod error;
pub mod events;
pub mod file;
pub mod logging;
pub mod remote;
pub mod storage;
pub mod sync;

pub use app::AppContext;
pub use catalog::{EpisodeCatalog, LoadOutcome};
pub use config::{Credentials, WatchConfig};
pub use download::{DownloadCoordinator, FetchOutcome, PrefetchReport, ProgressMonitor};
pub use episode::{Episode, EpisodeList};
pub use error::{Result, WatchError};
pub use events::{EventCallback, WatchEvent};
pub use file::{CacheLayout, CacheLimits, LocalCacheManager};
pub use remote::{CredentialStore, ObjectStore, PreferenceStore};
