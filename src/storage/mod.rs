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


//! Local persistence
//!
//! SQLite (through sqlx) backs the bundled preference and credential stores.
//!
//! # Schema
//! - `preferences`: one JSON document per (bucket/group, owner)
//! - `credentials`: name → value
//!
//! # Usage Example
//! ```no_run
//! use showcache::remote::PreferenceStore;
//! use showcache::storage::{Database, SqlitePreferenceStore};
//!
//! # async fn example() -> showcache::Result<()> {
//! let db = Database::new("./showcache.db").await?;
//! let prefs = SqlitePreferenceStore::new(db.pool().clone(), "videos", "AKIAEXAMPLE");
//! let document = prefs.get_preferences("simpsons").await?;
//! println!("{} stored ratings", document.prefs.len());
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod database;
pub mod migrations;
pub mod preferences;

pub use credentials::SqliteCredentialStore;
pub use database::Database;
pub use preferences::SqlitePreferenceStore;
