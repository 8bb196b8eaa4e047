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
//! One-shot countdown gate (C8), grounded on spec.md §4.8 and on
//! `ECountDownLatch.cpp` from
//! `examples/original_source/efc/src/concurrent/ECountDownLatch.cpp`.
//! `state` (C2) is the remaining count; shared mode only, and the
//! gate never resets once it reaches zero.

use crate::aqs::{self, Aqs, Synchronizer};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// A gate that opens once `count_down` has been called `count` times.
/// Threads calling `await` block until then; the gate never closes
/// again afterward.
pub struct CountDownLatch {
    aqs: Aqs,
}

impl CountDownLatch {
    pub fn new(count: u32) -> Arc<CountDownLatch> {
        Arc::new(CountDownLatch { aqs: Aqs::new(count) })
    }

    /// Block uninterruptibly until the count reaches zero.
    pub fn await_(&self) -> Result<()> {
        aqs::acquire_shared(self, 1)
    }

    pub fn await_interruptibly(&self) -> Result<()> {
        aqs::acquire_shared_interruptibly(self, 1)
    }

    /// As `await_`, bounded by `timeout`. `Ok(true)` if the gate
    /// opened before the deadline, `Ok(false)` on timeout.
    pub fn await_timeout(&self, timeout: Duration) -> Result<bool> {
        aqs::try_acquire_shared_nanos(self, 1, timeout)
    }

    /// Decrement the count, opening the gate and waking all waiters
    /// once it reaches zero. A no-op once already at zero.
    pub fn count_down(&self) -> Result<()> {
        aqs::release_shared(self, 1).map(|_| ())
    }

    /// Current count. Racy by design (per the original): a reader
    /// observes a point-in-time snapshot with no ordering guarantee
    /// relative to concurrent `count_down` calls, useful only for
    /// diagnostics/progress reporting.
    pub fn count(&self) -> u32 {
        self.aqs.state()
    }
}

impl Synchronizer for CountDownLatch {
    fn aqs(&self) -> &Aqs {
        &self.aqs
    }

    fn try_acquire_shared(&self, _arg: u32) -> Result<i32> {
        Ok(if self.aqs.state() == 0 { 1 } else { -1 })
    }

    fn try_release_shared(&self, _arg: u32) -> Result<bool> {
        loop {
            let c = self.aqs.state();
            if c == 0 {
                return Ok(false);
            }
            let next = c - 1;
            if self.aqs.compare_and_set_state(c, next) {
                return Ok(next == 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_count_at_construction_opens_the_gate_immediately() {
        let latch = CountDownLatch::new(0);
        latch.await_().unwrap();
    }

    #[test]
    fn await_returns_immediately_once_counted_down() {
        let latch = CountDownLatch::new(1);
        latch.count_down().unwrap();
        latch.await_().unwrap();
    }

    #[test]
    fn extra_count_downs_are_no_ops() {
        let latch = CountDownLatch::new(1);
        latch.count_down().unwrap();
        latch.count_down().unwrap();
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn await_timeout_expires_before_count_reaches_zero() {
        let latch = CountDownLatch::new(1);
        assert_eq!(latch.await_timeout(Duration::from_millis(20)).unwrap(), false);
    }

    #[test]
    fn releases_all_waiters_at_once() {
        let latch = CountDownLatch::new(1);
        let passed = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let latch = latch.clone();
                let passed = passed.clone();
                thread::spawn(move || {
                    latch.await_().unwrap();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(passed.load(Ordering::SeqCst), 0);
        latch.count_down().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 6);
    }
}
