// Copyright (c) 2026 the blue_sync authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Counting semaphore (C7), grounded on spec.md §4.7 and on
//! `ESemaphore.cpp`'s `NonfairSync`/`FairSync` split from
//! `examples/original_source/efc/src/concurrent/ESemaphore.cpp`.
//! `state` (C2) is the permit count; shared mode only.

use crate::aqs::{self, Aqs, Synchronizer};
use crate::error::{Result, SyncError};
use std::sync::Arc;
use std::time::Duration;

/// Permit count saturates at `i32::MAX`; a `release` that would push it
/// past that is a hard error rather than a silent wrap.
const MAX_PERMITS: u32 = i32::MAX as u32;

/// A classic counting semaphore: `acquire` blocks until a permit is
/// available, `release` returns one. Permits need not be acquired and
/// released by the same thread. Non-fair by default, same barging
/// trade as [`crate::mutex::ReentrantLock`].
pub struct Semaphore {
    aqs: Aqs,
    fair: bool,
}

impl Semaphore {
    pub fn new(permits: u32) -> Arc<Semaphore> {
        Arc::new(Semaphore { aqs: Aqs::new(permits), fair: false })
    }

    pub fn new_fair(permits: u32) -> Arc<Semaphore> {
        Arc::new(Semaphore { aqs: Aqs::new(permits), fair: true })
    }

    pub fn is_fair(&self) -> bool {
        self.fair
    }

    pub fn available_permits(&self) -> u32 {
        self.aqs.state()
    }

    /// Acquire one permit, blocking uninterruptibly until available.
    pub fn acquire(&self) -> Result<()> {
        aqs::acquire_shared(self, 1)
    }

    pub fn acquire_interruptibly(&self) -> Result<()> {
        aqs::acquire_shared_interruptibly(self, 1)
    }

    pub fn try_acquire(&self) -> Result<bool> {
        self.non_fair_try_acquire_shared(1)
    }

    pub fn try_acquire_timeout(&self, timeout: Duration) -> Result<bool> {
        aqs::try_acquire_shared_nanos(self, 1, timeout)
    }

    pub fn release(&self) -> Result<()> {
        aqs::release_shared(self, 1).map(|_| ())
    }

    /// Acquire `permits` atomically: either all are granted or the
    /// caller blocks until they are.
    pub fn acquire_n(&self, permits: u32) -> Result<()> {
        if permits == 0 {
            return Ok(());
        }
        aqs::acquire_shared(self, permits)
    }

    pub fn release_n(&self, permits: u32) -> Result<()> {
        if permits == 0 {
            return Ok(());
        }
        aqs::release_shared(self, permits).map(|_| ())
    }

    pub fn try_acquire_n(&self, permits: u32) -> Result<bool> {
        if permits == 0 {
            return Ok(true);
        }
        self.non_fair_try_acquire_shared(permits)
    }

    /// Drain and return however many permits are currently available.
    pub fn drain_permits(&self) -> u32 {
        loop {
            let c = self.aqs.state();
            if c == 0 || self.aqs.compare_and_set_state(c, 0) {
                return c;
            }
        }
    }

    /// Shrink the permit count by `reduction` without blocking,
    /// allowing it to go negative (wrapping is not observable: callers
    /// only ever see `available_permits` go down). Matches
    /// `Semaphore.reducePermits`.
    pub fn reduce_permits(&self, reduction: u32) {
        loop {
            let c = self.aqs.state();
            let next = c.wrapping_sub(reduction);
            if self.aqs.compare_and_set_state(c, next) {
                return;
            }
        }
    }

    pub fn has_queued_threads(&self) -> bool {
        aqs::has_queued_threads(&self.aqs)
    }

    pub fn queue_length(&self) -> usize {
        aqs::queue_length(&self.aqs)
    }

    fn non_fair_try_acquire_shared(&self, permits: u32) -> Result<bool> {
        loop {
            let available = self.aqs.state();
            let remaining = available.checked_sub(permits);
            match remaining {
                None => return Ok(false),
                Some(remaining) => {
                    if self.aqs.compare_and_set_state(available, remaining) {
                        return Ok(true);
                    }
                }
            }
        }
    }
}

impl Synchronizer for Semaphore {
    fn aqs(&self) -> &Aqs {
        &self.aqs
    }

    fn try_acquire_shared(&self, permits: u32) -> Result<i32> {
        loop {
            if self.fair && aqs::has_queued_predecessors(&self.aqs) {
                return Ok(-1);
            }
            let available = self.aqs.state();
            let remaining = match available.checked_sub(permits) {
                Some(r) => r,
                None => return Ok(-1),
            };
            if self.aqs.compare_and_set_state(available, remaining) {
                return Ok(remaining as i32);
            }
        }
    }

    fn try_release_shared(&self, permits: u32) -> Result<bool> {
        loop {
            let current = self.aqs.state();
            let next = current.checked_add(permits).ok_or(SyncError::CapacityExceeded)?;
            if next > MAX_PERMITS {
                return Err(SyncError::CapacityExceeded);
            }
            if self.aqs.compare_and_set_state(current, next) {
                return Ok(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::thread;

    #[test]
    fn acquire_and_release_restore_permits() {
        let sem = Semaphore::new(2);
        sem.acquire().unwrap();
        sem.acquire().unwrap();
        assert_eq!(sem.available_permits(), 0);
        assert!(!sem.try_acquire().unwrap());
        sem.release().unwrap();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn never_exceeds_permit_count_under_contention() {
        let sem = Semaphore::new(3);
        let concurrent = Arc::new(AtomicI32::new(0));
        let max_seen = Arc::new(AtomicI32::new(0));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let sem = sem.clone();
                let concurrent = concurrent.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        sem.acquire().unwrap();
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        sem.release().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.available_permits(), 3);
    }

    #[test]
    fn drain_permits_takes_everything_available() {
        let sem = Semaphore::new(5);
        assert_eq!(sem.drain_permits(), 5);
        assert_eq!(sem.available_permits(), 0);
    }
}
