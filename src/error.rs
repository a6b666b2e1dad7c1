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


//! Error types for showcache
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the collaborator that produced them:
//!
//! - **Transport**: listing or transfer failures reported by the object store.
//!   Never retried here; surfaced through the event callback.
//! - **File system**: failed moves, deletes, or missing metadata. Treated as
//!   recoverable by the cache manager.
//! - **Preference format**: unknown document version, malformed JSON, or bad
//!   timestamps in the preference store payload.
//! - **Configuration**: missing credentials or invalid bounds, raised before
//!   any network call is attempted.

use thiserror::Error;

/// Result type alias using our WatchError type
pub type Result<T> = std::result::Result<T, WatchError>;

/// Main error type for showcache
#[derive(Error, Debug)]
pub enum WatchError {
    // ===== Remote Errors =====

    /// Object store listing or transfer failed
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
    },

    /// Preference document could not be interpreted
    #[error("Invalid preferences: {0}")]
    PreferenceFormat(String),

    // ===== File Errors =====

    /// Move, delete, or metadata lookup failed
    #[error("File system error: {0}")]
    FileSystem(String),

    // ===== Configuration/State Errors =====

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Application state is invalid for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    // ===== General Errors =====

    /// Operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be parsed or joined
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// TOML config could not be parsed
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML config could not be written
    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

// Helper methods for creating common errors
impl WatchError {
    /// Create a Transport error
    pub fn transport<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        WatchError::Transport {
            message: message.into(),
            status_code,
        }
    }

    /// Create a FileSystem error with a message
    pub fn file_system<S: Into<String>>(message: S) -> Self {
        WatchError::FileSystem(message.into())
    }

    /// Create a PreferenceFormat error with a message
    pub fn preference_format<S: Into<String>>(message: S) -> Self {
        WatchError::PreferenceFormat(message.into())
    }

    /// Create a Configuration error with a message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        WatchError::Configuration(message.into())
    }

    /// Create a NotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        WatchError::NotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        WatchError::InvalidInput(message.into())
    }

    /// Create an Internal error with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        WatchError::Internal(message.into())
    }

    /// Check if error came from the remote transport (object store or HTTP)
    pub fn is_transport_error(&self) -> bool {
        matches!(self, WatchError::Transport { .. } | WatchError::Reqwest(_))
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(self, WatchError::FileSystem(_) | WatchError::Io(_))
    }

    /// Check if error means the app is not configured well enough to run
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            WatchError::Configuration(_) | WatchError::TomlDe(_) | WatchError::TomlSer(_)
        )
    }

    /// Check if error came from a malformed preference document
    pub fn is_preference_error(&self) -> bool {
        matches!(self, WatchError::PreferenceFormat(_))
    }

    /// Get user-friendly error message suitable for an alert
    pub fn user_message(&self) -> String {
        match self {
            WatchError::Transport {
                message,
                status_code: Some(403),
            } => format!("Access to the bucket was denied: {}", message),
            WatchError::Transport { message, .. } => {
                format!("Could not reach the episode server: {}", message)
            }
            WatchError::Configuration(message) => {
                format!("Setup is incomplete: {}. Check your access key and bucket.", message)
            }
            WatchError::PreferenceFormat(_) => {
                "Saved ratings could not be read; episodes will use default ratings.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(WatchError::transport("timeout", None).is_transport_error());
        assert!(WatchError::file_system("move failed").is_file_error());
        assert!(WatchError::configuration("missing key").is_configuration_error());
        assert!(WatchError::preference_format("version 2").is_preference_error());
        assert!(!WatchError::Cancelled.is_transport_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: WatchError = io.into();
        assert!(err.is_file_error());
    }

    #[test]
    fn test_user_message() {
        let denied = WatchError::transport("AccessDenied", Some(403));
        assert!(denied.user_message().contains("denied"));

        let config = WatchError::configuration("missing bucket name");
        assert!(config.user_message().contains("missing bucket name"));
    }
}
