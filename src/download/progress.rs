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


//! Download progress sampling
//!
//! Transfers write into a temp file; progress is the temp file's size over the
//! expected total. Nothing here touches the transfer itself, so cancelling a
//! poller only stops the reporting.
//!
//! # Sample values
//! - `Some(0.0)` while the temp file cannot be read or the total is unknown
//! - `Some(size / total)` while the size is within `[0, total]`
//! - `None` when the size is past the total (a torn read)
//! - `Some(1.0)` once the transfer is marked complete
//!
//! While the temp file is readable, samples never go backwards: the highest
//! fraction seen so far is a floor.

use crate::sync::Guarded;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default polling cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of one transfer, as seen by its monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Bytes are arriving in the temp file
    Downloading,
    /// File is at its destination
    Completed,
    /// Transfer gave up
    Failed,
}

/// Callback type for progress updates (fraction in `[0, 1]`)
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug)]
struct Sampled {
    state: TransferState,
    high_water: f64,
}

/// Observes one in-flight transfer
#[derive(Debug)]
pub struct ProgressMonitor {
    key: String,
    temp_path: PathBuf,
    total_size: u64,
    sampled: Guarded<Sampled>,
    token: CancellationToken,
}

impl ProgressMonitor {
    pub fn new<K: Into<String>, P: Into<PathBuf>>(key: K, temp_path: P, total_size: u64) -> Self {
        Self {
            key: key.into(),
            temp_path: temp_path.into(),
            total_size,
            sampled: Guarded::new(Sampled {
                state: TransferState::Downloading,
                high_water: 0.0,
            }),
            token: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn state(&self) -> TransferState {
        self.sampled.read(|s| s.state)
    }

    /// Current completion fraction, see the module docs for the cases
    pub async fn sample(&self) -> Option<f64> {
        let state = self.state();
        if state == TransferState::Completed {
            return Some(1.0);
        }
        if self.total_size == 0 {
            return Some(0.0);
        }

        let size = match tokio::fs::metadata(&self.temp_path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                debug!(key = %self.key, error = %e, "Temp file unreadable");
                return Some(0.0);
            }
        };

        if size > self.total_size {
            debug!(key = %self.key, size, total = self.total_size, "Temp file larger than expected");
            return None;
        }

        let fraction = size as f64 / self.total_size as f64;
        let fraction = self.sampled.write(|s| {
            s.high_water = s.high_water.max(fraction);
            s.high_water
        });
        trace!(key = %self.key, fraction, "Sampled");
        Some(fraction)
    }

    /// Transfer finished; later samples report 1.0
    pub fn mark_complete(&self) {
        self.sampled.write(|s| {
            s.state = TransferState::Completed;
            s.high_water = 1.0;
        });
    }

    /// Transfer failed; stops every poller
    pub fn mark_failed(&self) {
        self.sampled.write(|s| s.state = TransferState::Failed);
        self.token.cancel();
    }

    /// Stop every poller attached to this monitor
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Forward samples to `callback` every `interval`
    ///
    /// The poller stops after reporting 1.0, when the transfer fails, or when
    /// cancelled. Torn reads are skipped.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration, callback: ProgressCallback) -> ProgressPoller {
        let token = self.token.child_token();
        let monitor = Arc::clone(self);
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        trace!(key = %monitor.key, "Poller cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(fraction) = monitor.sample().await {
                            callback(fraction);
                            if fraction >= 1.0 {
                                break;
                            }
                        }
                    }
                }
            }
        });

        ProgressPoller { token, handle }
    }
}

/// Handle to a running progress poller
#[derive(Debug)]
pub struct ProgressPoller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressPoller {
    /// Stop polling; the transfer keeps going
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the poller to stop
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            debug!(error = %e, "Poller task ended abnormally");
        }
    }
}
