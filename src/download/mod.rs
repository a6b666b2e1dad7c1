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


//! Listing, transfer coordination and progress reporting
//!
//! # Architecture
//! - [`coordinator`]: dedup by key, concurrency bound, cache handoff
//! - [`progress`]: temp-file based progress sampling and polling

pub mod coordinator;
pub mod progress;

pub use coordinator::{
    DownloadConfig, DownloadCoordinator, DownloadHandle, DownloadTask, FetchOutcome,
    PrefetchReport, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
};
pub use progress::{
    ProgressCallback, ProgressMonitor, ProgressPoller, TransferState, DEFAULT_POLL_INTERVAL,
};
