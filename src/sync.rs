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


//! Lock-guarded shared collections
//!
//! Every piece of shared mutable state (the in-flight download set, each cache
//! bucket, the catalog list and its load flag) lives in its own [`Guarded`].
//! Access is only possible through a closure, so the lock is released on every
//! exit path and can never be held across an `.await`.

use std::sync::{Mutex, PoisonError};

/// A value behind its own mutex, accessed through scoped closures
#[derive(Debug, Default)]
pub struct Guarded<T> {
    inner: Mutex<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with shared access to the value
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with exclusive access to the value
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Replace the value, returning the old one
    pub fn replace(&self, value: T) -> T {
        self.write(|slot| std::mem::replace(slot, value))
    }
}

impl<T: Clone> Guarded<T> {
    /// Clone the current value out of the lock
    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_read() {
        let guarded = Guarded::new(Vec::<u32>::new());
        guarded.write(|v| v.push(7));
        assert_eq!(guarded.read(|v| v.len()), 1);
        assert_eq!(guarded.snapshot(), vec![7]);
    }

    #[test]
    fn test_released_after_panic() {
        let guarded = Arc::new(Guarded::new(0u32));
        let clone = Arc::clone(&guarded);
        let _ = thread::spawn(move || {
            clone.write(|_| panic!("boom"));
        })
        .join();

        // Poisoned lock is still usable
        guarded.write(|v| *v += 1);
        assert_eq!(guarded.snapshot(), 1);
    }
}
