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


//! File operations
//!
//! # Key Operations
//! - Moves between cache directories (rename with retry, copy across devices)
//! - Deletes that tolerate an already missing file
//! - Directory scans that report modification times
//!
//! Everything returns [`WatchError::FileSystem`] on failure so callers can
//! decide between logging and cleaning up.

use super::paths::partial_path;
use crate::error::{Result, WatchError};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::time::sleep;
use tracing::debug;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Suffix of files still being written by a transfer
pub const PARTIAL_SUFFIX: &str = ".part";

#[cfg(windows)]
const CROSS_DEVICE_ERROR: i32 = 17; // ERROR_NOT_SAME_DEVICE

#[cfg(not(windows))]
const CROSS_DEVICE_ERROR: i32 = 18; // EXDEV

/// Rename failed because source and destination are on different filesystems
fn is_cross_device(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(CROSS_DEVICE_ERROR)
}

/// A regular file found by [`FileManager::scan_directory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Retrying file operations
#[derive(Debug, Clone)]
pub struct FileManager {
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for FileManager {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry policy (tests use a single attempt)
    pub fn with_retry(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Move `source` to `destination`, replacing any file already there
    ///
    /// Creates the destination directory. Fails if `source` is missing.
    pub async fn safe_move(&self, source: &Path, destination: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.try_move(source, destination).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= self.max_attempts => {
                    return Err(WatchError::file_system(format!(
                        "Failed to move file after {} attempts: {} -> {}: {}",
                        attempts,
                        source.display(),
                        destination.display(),
                        e
                    )));
                }
                Err(e) => {
                    debug!(error = %e, attempt = attempts, "Move failed, retrying");
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_move(&self, source: &Path, destination: &Path) -> Result<()> {
        if !Self::file_exists(source).await {
            return Err(WatchError::file_system(format!(
                "source missing: {}",
                source.display()
            )));
        }

        if source == destination {
            return Ok(());
        }

        if let Some(parent) = destination.parent() {
            self.ensure_directory_exists(parent).await?;
        }

        // rename replaces an existing destination on every supported platform
        match fs::rename(source, destination).await {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "Roots on different devices, copying"
                );
                self.move_by_copy(source, destination).await
            }
            Err(e) => Err(WatchError::file_system(format!(
                "Move failed: {} -> {}: {}",
                source.display(),
                destination.display(),
                e
            ))),
        }
    }

    /// Copy next to `destination`, rename into place, then delete `source`
    async fn move_by_copy(&self, source: &Path, destination: &Path) -> Result<()> {
        let staging = partial_path(destination);
        if let Err(e) = fs::copy(source, &staging).await {
            Self::delete_once(&staging).await.ok();
            return Err(WatchError::file_system(format!(
                "Copy failed: {} -> {}: {}",
                source.display(),
                staging.display(),
                e
            )));
        }
        fs::rename(&staging, destination).await.map_err(|e| {
            WatchError::file_system(format!(
                "Move failed: {} -> {}: {}",
                staging.display(),
                destination.display(),
                e
            ))
        })?;
        Self::delete_once(source).await
    }

    /// Delete a file; a missing file is not an error
    pub async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= self.max_attempts => {
                    return Err(WatchError::file_system(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        attempts,
                        path.display(),
                        e
                    )));
                }
                Err(_) => sleep(self.retry_delay).await,
            }
        }
    }

    async fn delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WatchError::file_system(format!(
                "Delete failed: {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Create a directory and its parents if needed
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| {
            WatchError::file_system(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Size in bytes
    pub async fn get_file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            WatchError::file_system(format!("Failed to get file size {}: {}", path.display(), e))
        })?;

        Ok(metadata.len())
    }

    /// Regular, visible, complete files in `dir`, oldest first
    ///
    /// A missing directory yields an empty list. Files whose modification
    /// time cannot be read are skipped.
    pub async fn scan_directory(dir: &Path) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();
        Self::scan_into(dir, &mut files, None).await?;
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }

    /// Like [`scan_directory`](Self::scan_directory), descending into
    /// visible subdirectories
    pub async fn scan_tree(dir: &Path) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(next) = pending.pop() {
            Self::scan_into(&next, &mut files, Some(&mut pending)).await?;
        }
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }

    async fn scan_into(
        dir: &Path,
        files: &mut Vec<ScannedFile>,
        mut subdirs: Option<&mut Vec<PathBuf>>,
    ) -> Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(WatchError::file_system(format!(
                    "Failed to read directory {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(file = %name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if metadata.is_dir() {
                if let Some(subdirs) = subdirs.as_deref_mut() {
                    subdirs.push(entry.path());
                }
                continue;
            }
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                debug!(file = %name, "Skipping file without modification time");
                continue;
            };
            files.push(ScannedFile {
                path: entry.path(),
                size: metadata.len(),
                modified,
            });
        }
        Ok(())
    }
}
