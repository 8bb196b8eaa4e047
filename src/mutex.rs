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
//! Reentrant mutual-exclusion lock (C5), grounded on spec.md §4.5 and
//! on the `Sync`/`FairSync`/`NonfairSync` split documented in
//! `EAbstractQueuedSynchronizer.hh` from
//! `examples/original_source/efc/inc/concurrent/EAbstractQueuedSynchronizer.hh`,
//! the same fair/non-fair acquire split every synchronizer in this
//! crate follows. `state` (C2) is the hold count; exclusive mode only.

use crate::aqs::{self, Aqs, Synchronizer};
use crate::condition::Condition;
use crate::error::{Result, SyncError};
use crate::park::ParkToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Hold count is capped at `i32::MAX`, matching `ReentrantLock`'s own
/// documented overflow limit.
const MAX_HOLD_COUNT: u32 = i32::MAX as u32;

fn add_hold(current: u32, acquires: u32) -> Result<u32> {
    let next = current.checked_add(acquires).ok_or(SyncError::CapacityExceeded)?;
    if next > MAX_HOLD_COUNT {
        return Err(SyncError::CapacityExceeded);
    }
    Ok(next)
}

/// One thread's exclusive critical section, reentrant on the same
/// thread. Fair instances grant the lock in FIFO arrival order; the
/// default (non-fair) lets a thread that calls `try_lock`/`lock` barge
/// ahead of threads already parked in the queue, trading fairness for
/// throughput — the same trade `NonfairSync` makes over `FairSync`.
pub struct ReentrantLock {
    aqs: Aqs,
    fair: bool,
    owner: StdMutex<Option<ParkToken>>,
    has_owner: AtomicBool,
}

impl ReentrantLock {
    pub fn new() -> Arc<ReentrantLock> {
        Self::with_fairness(false)
    }

    pub fn new_fair() -> Arc<ReentrantLock> {
        Self::with_fairness(true)
    }

    fn with_fairness(fair: bool) -> Arc<ReentrantLock> {
        Arc::new(ReentrantLock {
            aqs: Aqs::new(0),
            fair,
            owner: StdMutex::new(None),
            has_owner: AtomicBool::new(false),
        })
    }

    pub(crate) fn aqs_ref(&self) -> &Aqs {
        &self.aqs
    }

    fn set_owner(&self, token: Option<ParkToken>) {
        self.has_owner.store(token.is_some(), Ordering::Release);
        *self.owner.lock().unwrap() = token;
    }

    fn is_owner(&self, token: &ParkToken) -> bool {
        self.has_owner.load(Ordering::Acquire) && self.owner.lock().unwrap().as_ref() == Some(token)
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.is_owner(&ParkToken::current())
    }

    pub fn is_locked(&self) -> bool {
        self.aqs.state() != 0
    }

    pub fn hold_count(&self) -> u32 {
        if self.is_held_by_current_thread() {
            self.aqs.state()
        } else {
            0
        }
    }

    pub fn is_fair(&self) -> bool {
        self.fair
    }

    pub fn has_queued_threads(&self) -> bool {
        aqs::has_queued_threads(&self.aqs)
    }

    pub fn queue_length(&self) -> usize {
        aqs::queue_length(&self.aqs)
    }

    /// Block uninterruptibly until the lock is held by the current
    /// thread, incrementing the hold count on reentry.
    pub fn lock(&self) -> Result<()> {
        aqs::acquire(self, 1)
    }

    /// As `lock`, but abort early with `SyncError::Interrupted` if the
    /// current thread's interrupt flag is observed.
    pub fn lock_interruptibly(&self) -> Result<()> {
        aqs::acquire_interruptibly(self, 1)
    }

    /// Try to acquire without blocking, ignoring fairness (matches
    /// JDK's `ReentrantLock.tryLock()`, which always barges).
    pub fn try_lock(&self) -> Result<bool> {
        self.non_fair_try_acquire(1)
    }

    /// Try to acquire within `timeout`, honoring fairness.
    pub fn try_lock_timeout(&self, timeout: Duration) -> Result<bool> {
        aqs::try_acquire_nanos(self, 1, timeout)
    }

    /// Release one hold. Unlocks fully (and wakes a waiter) only once
    /// the hold count returns to zero.
    pub fn unlock(&self) -> Result<()> {
        aqs::release(self, 1).map(|_| ())
    }

    /// Create a `Condition` bound to this lock. `self` must be held in
    /// an `Arc` so the condition can own a reference that outlives the
    /// call site.
    pub fn new_condition(self: &Arc<Self>) -> Condition {
        Condition::new(self.clone())
    }

    fn non_fair_try_acquire(&self, acquires: u32) -> Result<bool> {
        let current = ParkToken::current();
        let c = self.aqs.state();
        if c == 0 {
            if self.aqs.compare_and_set_state(0, acquires) {
                self.set_owner(Some(current));
                return Ok(true);
            }
            return Ok(false);
        }
        if self.is_owner(&current) {
            let next = add_hold(c, acquires)?;
            self.aqs.set_state(next);
            return Ok(true);
        }
        Ok(false)
    }
}

impl Synchronizer for ReentrantLock {
    fn aqs(&self) -> &Aqs {
        &self.aqs
    }

    fn try_acquire(&self, acquires: u32) -> Result<bool> {
        if self.fair {
            let current = ParkToken::current();
            let c = self.aqs.state();
            if c == 0 {
                if !aqs::has_queued_predecessors(&self.aqs) && self.aqs.compare_and_set_state(0, acquires) {
                    self.set_owner(Some(current));
                    return Ok(true);
                }
                return Ok(false);
            }
            if self.is_owner(&current) {
                let next = add_hold(c, acquires)?;
                self.aqs.set_state(next);
                return Ok(true);
            }
            Ok(false)
        } else {
            self.non_fair_try_acquire(acquires)
        }
    }

    fn try_release(&self, releases: u32) -> Result<bool> {
        if !self.is_held_by_current_thread() {
            return Err(SyncError::IllegalMonitorState);
        }
        let remaining = self.aqs.state() - releases;
        let free = remaining == 0;
        if free {
            self.set_owner(None);
        }
        self.aqs.set_state(remaining);
        Ok(free)
    }

    fn is_held_exclusively(&self) -> bool {
        self.is_held_by_current_thread()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    #[test]
    fn lock_is_reentrant() {
        let lock = ReentrantLock::new();
        lock.lock().unwrap();
        lock.lock().unwrap();
        assert_eq!(lock.hold_count(), 2);
        lock.unlock().unwrap();
        assert!(lock.is_locked());
        lock.unlock().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn unlock_without_holding_is_illegal_monitor_state() {
        let lock = ReentrantLock::new();
        assert_eq!(lock.unlock(), Err(SyncError::IllegalMonitorState));
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = ReentrantLock::new();
        let counter = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        lock.lock().unwrap();
                        counter.fetch_add(1, Ordering::Relaxed);
                        lock.unlock().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn fair_lock_has_no_predecessors_fast_path() {
        let lock = ReentrantLock::new_fair();
        assert!(lock.try_lock().unwrap());
        lock.unlock().unwrap();
    }
}
