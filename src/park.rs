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
//! Park engine (C1): per-thread one-shot blocking, grounded on the
//! teacher's wait/wake pairing in `sync/atomic_wait.rs`, adapted to
//! park directly on the OS thread (`std::thread::park`/`unpark`)
//! rather than on a custom scheduler, since this crate's threads are
//! real OS threads, not kernel-scheduled ones.
//!
//! `std::thread::park`/`Thread::unpark` already give us exactly the
//! "single sticky permit" semantics spec'd in spec.md §4.1: a permit
//! does not accumulate past one, `unpark` before `park` is not lost,
//! and `park` may return spuriously. The only piece std doesn't give
//! us is a sticky per-thread interrupt flag, which we add here.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// A handle to one thread's park/interrupt state. Cloning is cheap
/// (it's a `Thread` handle plus an `Arc<AtomicBool>`); clones all
/// refer to the same underlying thread.
#[derive(Clone)]
pub struct ParkToken {
    thread: Thread,
    interrupted: Arc<AtomicBool>,
}

thread_local! {
    static CURRENT: RefCell<Option<ParkToken>> = const { RefCell::new(None) };
}

impl ParkToken {
    /// The token for the calling thread.
    pub fn current() -> ParkToken {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if let Some(token) = slot.as_ref() {
                return token.clone();
            }
            let token = ParkToken {
                thread: thread::current(),
                interrupted: Arc::new(AtomicBool::new(false)),
            };
            *slot = Some(token.clone());
            token
        })
    }

    /// Block until `unpark` is called on this token, the deadline (if
    /// any) passes, or a spurious wake occurs. Callers MUST recheck
    /// their own predicate on return; this never indicates why it
    /// returned.
    pub fn park(&self, deadline: Option<Instant>) {
        debug_assert!(
            self.thread.id() == thread::current().id(),
            "a thread may only park itself"
        );
        match deadline {
            None => thread::park(),
            Some(when) => {
                let now = Instant::now();
                if when > now {
                    thread::park_timeout(when - now);
                }
                // Non-positive remaining time: spec §5 says check once
                // and return without parking.
            }
        }
    }

    /// Set the permit and wake the thread if it is currently parked.
    /// Idempotent: a permit already set is not doubled.
    pub fn unpark(&self) {
        self.thread.unpark();
    }

    /// Set the sticky interrupt flag and wake the thread (so a parked
    /// `park()` returns promptly to observe it).
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.thread.unpark();
    }

    /// Read the interrupt flag without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Read and clear the interrupt flag. Only meaningful when called
    /// by the thread the token belongs to.
    pub fn take_interrupted(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Re-set the interrupt flag without waking anyone. Used by
    /// non-interruptible acquire paths that observed an interrupt but
    /// must return normally, per spec §5.
    pub fn restore_interrupted(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// The OS-level identity this token tracks; used as a map key by
    /// callers that need per-thread bookkeeping keyed independent of
    /// this token's own identity comparison.
    pub fn thread_id(&self) -> thread::ThreadId {
        self.thread.id()
    }
}

impl PartialEq for ParkToken {
    fn eq(&self, other: &Self) -> bool {
        self.thread.id() == other.thread.id()
    }
}
impl Eq for ParkToken {}

impl std::fmt::Debug for ParkToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkToken").field("thread", &self.thread.id()).finish()
    }
}

/// Turn a nanosecond duration into a deadline `Instant`, saturating
/// rather than overflowing (spec §5: timeout arithmetic is in
/// nanoseconds; a non-positive remaining time means "don't park").
pub fn deadline_from(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpark_before_park_is_not_lost() {
        let token = ParkToken::current();
        token.unpark();
        // Must return immediately, consuming the permit.
        token.park(Some(Instant::now() + Duration::from_millis(200)));
    }

    #[test]
    fn interrupt_sets_flag_and_wakes() {
        let token = ParkToken::current();
        assert!(!token.is_interrupted());
        token.interrupt();
        assert!(token.is_interrupted());
        assert!(token.take_interrupted());
        assert!(!token.is_interrupted());
    }

    #[test]
    fn cross_thread_unpark() {
        use std::sync::mpsc;
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let token = ParkToken::current();
            tx.send(token).unwrap();
            thread::park();
            42
        });
        let token = rx.recv().unwrap();
        // Give the spawned thread a moment to reach `park()`; if it
        // hasn't yet, unpark still sets the permit for its next park.
        thread::sleep(Duration::from_millis(50));
        token.unpark();
        assert_eq!(handle.join().unwrap(), 42);
    }
}
