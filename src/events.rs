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


//! Notifications for the presentation layer
//!
//! Events are delivered on whatever task produced them. Hosts that need a
//! specific thread should forward them through a channel.

use crate::download::progress::ProgressMonitor;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A group's list was built for the first time in this load cycle
    ListCreated { group: String, count: usize },

    /// The list order or contents changed (randomized, reordered, reset)
    ListChanged { group: String, count: usize },

    /// Weighted randomization placed another episode
    RandomizationProgress {
        group: String,
        placed: usize,
        total: usize,
    },

    /// Another listing page arrived
    ListProgress { group: String, items_found: usize },

    /// A transfer began; the monitor reports its progress
    DownloadStarted {
        key: String,
        monitor: Arc<ProgressMonitor>,
    },

    /// A file is ready to play
    EpisodeAvailable { key: String, path: PathBuf },

    /// A transfer failed
    DownloadError { key: String, message: String },

    /// At least one half of a load cycle failed
    LoadError {
        group: String,
        /// 1 or 2
        failures: usize,
        message: String,
    },
}

impl WatchEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::ListCreated { .. } => "list_created",
            WatchEvent::ListChanged { .. } => "list_changed",
            WatchEvent::RandomizationProgress { .. } => "randomization_progress",
            WatchEvent::ListProgress { .. } => "list_progress",
            WatchEvent::DownloadStarted { .. } => "download_started",
            WatchEvent::EpisodeAvailable { .. } => "episode_available",
            WatchEvent::DownloadError { .. } => "download_error",
            WatchEvent::LoadError { .. } => "load_error",
        }
    }
}

/// Callback type for events
pub type EventCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Callback that drops every event
pub fn ignore_events() -> EventCallback {
    Arc::new(|_| {})
}
