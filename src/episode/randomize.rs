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


//! Weighted random playback order
//!
//! # Scoring
//!
//! ```text
//! score   = (rating == 0 ? 3 : rating) * recency
//! recency = 10                                  if never played
//!         = clamp(round(years since played), 1, 5) otherwise
//! ```
//!
//! Each key is placed `max(1, round(score))` times in a pool. Draws are
//! uniform over the pool; the drawn key is appended to the result and every
//! copy of it is removed. The result is always a permutation of the input.

use super::{Episode, EpisodeList};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Score used for episodes nobody has rated
pub const UNRATED_SCORE: f64 = 3.0;

/// Recency factor for episodes that were never played
pub const NEVER_PLAYED_FACTOR: f64 = 10.0;

/// Upper bound on the recency factor for played episodes
pub const MAX_RECENCY: f64 = 5.0;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Recency factor for a last-played time
pub fn recency_factor(last_played: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_played {
        None => NEVER_PLAYED_FACTOR,
        Some(when) => {
            let seconds = (now - when).num_seconds() as f64;
            (seconds / SECONDS_PER_YEAR).round().clamp(1.0, MAX_RECENCY)
        }
    }
}

/// Selection weight of one episode
pub fn priority_score(episode: &Episode, now: DateTime<Utc>) -> f64 {
    let rating = if episode.rating == 0 {
        UNRATED_SCORE
    } else {
        episode.rating as f64
    };
    rating * recency_factor(episode.last_played, now)
}

/// Weighted permutation of `episodes`' keys
///
/// `progress` is called with `(placed, total)` after every draw.
pub fn weighted_order<R, F>(
    episodes: &[&Episode],
    now: DateTime<Utc>,
    rng: &mut R,
    mut progress: F,
) -> Vec<String>
where
    R: Rng + ?Sized,
    F: FnMut(usize, usize),
{
    let total = episodes.len();
    let mut pool: Vec<usize> = Vec::new();
    for (index, episode) in episodes.iter().enumerate() {
        let copies = priority_score(episode, now).round().max(1.0) as usize;
        pool.extend(std::iter::repeat(index).take(copies));
    }

    let mut order = Vec::with_capacity(total);
    while !pool.is_empty() {
        let picked = pool[rng.gen_range(0..pool.len())];
        order.push(episodes[picked].key.clone());
        pool.retain(|&index| index != picked);
        progress(order.len(), total);
    }
    order
}

impl EpisodeList {
    /// Shuffle the playback order with a caller-supplied RNG
    pub fn randomize_with<R, F>(&mut self, rng: &mut R, progress: F)
    where
        R: Rng + ?Sized,
        F: FnMut(usize, usize),
    {
        let now = Utc::now();
        let order = {
            let episodes: Vec<&Episode> = self.iter().collect();
            weighted_order(&episodes, now, rng, progress)
        };
        // Permutation of our own keys, cannot fail
        if let Err(e) = self.reorder(order) {
            tracing::error!(error = %e, "Randomized order rejected");
        }
    }

    /// Shuffle the playback order using the thread RNG
    pub fn randomize(&mut self) {
        self.randomize_with(&mut rand::thread_rng(), |_, _| {});
    }
}
