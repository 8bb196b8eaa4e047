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
//! Reusable rendezvous barrier (C9), grounded on spec.md §4.9 and on
//! `ECyclicBarrier.cpp` from
//! `examples/original_source/efc/src/concurrent/ECyclicBarrier.cpp`.
//! Built directly on [`ReentrantLock`]/[`Condition`] rather than on
//! the raw AQS kernel, exactly as the original composes
//! `ReentrantLock` + one `Condition` instead of subclassing AQS
//! itself.

use crate::condition::Condition;
use crate::error::{Result, SyncError};
use crate::mutex::ReentrantLock;
use crate::park::ParkToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Generation {
    broken: bool,
}

struct State {
    generation: Generation,
    count: usize,
}

/// A barrier for a fixed party size that trips (runs its action, if
/// any, then releases every waiter) once the last party arrives, and
/// is reusable for the next generation afterward. A broken barrier
/// (because a waiter timed out, was interrupted, or the action
/// itself... ran into trouble) stays broken until `reset`.
pub struct CyclicBarrier {
    parties: usize,
    lock: Arc<ReentrantLock>,
    trip: Condition,
    state: Mutex<State>,
    action: Option<Box<dyn Fn() + Send + Sync>>,
    trips: AtomicUsize,
}

impl CyclicBarrier {
    pub fn new(parties: usize) -> Result<Arc<CyclicBarrier>> {
        Self::with_action(parties, None)
    }

    pub fn new_with_action(parties: usize, action: Box<dyn Fn() + Send + Sync>) -> Result<Arc<CyclicBarrier>> {
        Self::with_action(parties, Some(action))
    }

    fn with_action(parties: usize, action: Option<Box<dyn Fn() + Send + Sync>>) -> Result<Arc<CyclicBarrier>> {
        if parties == 0 {
            return Err(SyncError::IllegalArgument("a barrier needs at least one party"));
        }
        let lock = ReentrantLock::new();
        let trip = lock.new_condition();
        Ok(Arc::new(CyclicBarrier {
            parties,
            trip,
            lock,
            state: Mutex::new(State { generation: Generation { broken: false }, count: parties }),
            action,
            trips: AtomicUsize::new(0),
        }))
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub fn is_broken(&self) -> bool {
        self.lock.lock().expect("internal barrier lock cannot exceed its hold-count capacity");
        let broken = self.state.lock().unwrap().generation.broken;
        self.lock.unlock().expect("barrier lock was just acquired by this thread");
        broken
    }

    pub fn number_waiting(&self) -> usize {
        self.lock.lock().expect("internal barrier lock cannot exceed its hold-count capacity");
        let waiting = self.parties - self.state.lock().unwrap().count;
        self.lock.unlock().expect("barrier lock was just acquired by this thread");
        waiting
    }

    /// Wait for the other parties, with no deadline. An interrupt
    /// while waiting breaks the barrier for everyone and propagates
    /// as `SyncError::Interrupted`. Returns the arrival index:
    /// `parties - 1` for the first thread to arrive, counting down to
    /// `0` for the thread that trips the barrier.
    pub fn await_(&self) -> Result<usize> {
        self.do_wait(None)
    }

    pub fn await_timeout(&self, timeout: Duration) -> Result<usize> {
        self.do_wait(Some(timeout))
    }

    /// Reset the barrier to its initial generation, breaking it for
    /// any party currently waiting (they observe `BrokenBarrier`).
    pub fn reset(&self) -> Result<()> {
        self.lock.lock()?;
        let result = (|| -> Result<()> {
            self.break_current_generation()?;
            self.next_generation()?;
            Ok(())
        })();
        self.lock.unlock()?;
        result
    }

    fn break_current_generation(&self) -> Result<()> {
        log::warn!("breaking barrier generation, {} parties released early", self.parties);
        let mut state = self.state.lock().unwrap();
        state.generation.broken = true;
        state.count = self.parties;
        drop(state);
        self.trip.signal_all()
    }

    fn next_generation(&self) -> Result<()> {
        self.trip.signal_all()?;
        let mut state = self.state.lock().unwrap();
        state.count = self.parties;
        state.generation = Generation { broken: false };
        self.trips.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn do_wait(&self, timeout: Option<Duration>) -> Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.lock.lock()?;
        let outcome = self.do_wait_locked(deadline);
        self.lock.unlock()?;
        outcome
    }

    fn do_wait_locked(&self, deadline: Option<Instant>) -> Result<usize> {
        {
            let broken = self.state.lock().unwrap().generation.broken;
            if broken {
                return Err(SyncError::BrokenBarrier);
            }
        }

        if ParkToken::current().take_interrupted() {
            self.break_current_generation()?;
            return Err(SyncError::Interrupted);
        }

        let index = {
            let mut state = self.state.lock().unwrap();
            state.count -= 1;
            state.count
        };

        if index == 0 {
            // Last party to arrive: run the action (with the lock
            // held, matching the original), then trip the barrier.
            let ran_ok = match &self.action {
                Some(f) => std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f())).is_ok(),
                None => true,
            };
            if !ran_ok {
                self.break_current_generation()?;
                return Err(SyncError::BrokenBarrier);
            }
            self.next_generation()?;
            return Ok(0);
        }

        loop {
            {
                let broken = self.state.lock().unwrap().generation.broken;
                if broken {
                    return Err(SyncError::BrokenBarrier);
                }
            }
            let generation_trips_now = self.trips.load(Ordering::Relaxed);
            let waited = match deadline {
                None => match self.trip.await_() {
                    Ok(()) => true,
                    Err(SyncError::Interrupted) => {
                        self.break_current_generation()?;
                        return Err(SyncError::Interrupted);
                    }
                    Err(e) => return Err(e),
                },
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        self.break_current_generation()?;
                        return Err(SyncError::Timeout);
                    }
                    match self.trip.await_timeout(dl - now) {
                        Ok(w) => w,
                        Err(SyncError::Interrupted) => {
                            self.break_current_generation()?;
                            return Err(SyncError::Interrupted);
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
            if !waited {
                self.break_current_generation()?;
                return Err(SyncError::Timeout);
            }
            if self.trips.load(Ordering::Relaxed) != generation_trips_now {
                return Ok(index);
            }
            // Spurious wake within the same generation: loop and
            // recheck broken/tripped state.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn single_party_trips_immediately_without_parking() {
        let barrier = CyclicBarrier::new(1).unwrap();
        assert_eq!(barrier.await_().unwrap(), 0);
    }

    #[test]
    fn trips_once_all_parties_arrive() {
        let barrier = CyclicBarrier::new(3).unwrap();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.await_().unwrap())
            })
            .collect();
        let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[test]
    fn runs_trip_action_once_per_generation() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let barrier = CyclicBarrier::new_with_action(
            2,
            Box::new(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        for _ in 0..2 {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let barrier = barrier.clone();
                    thread::spawn(move || barrier.await_().unwrap())
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timeout_breaks_the_barrier_for_everyone() {
        let barrier = CyclicBarrier::new(2).unwrap();
        let result = barrier.await_timeout(Duration::from_millis(20));
        assert_eq!(result, Err(SyncError::Timeout));
        assert!(barrier.is_broken());
    }

    #[test]
    fn interrupted_waiter_breaks_the_barrier_for_everyone() {
        let barrier = CyclicBarrier::new(2).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                tx.send(ParkToken::current()).unwrap();
                barrier.await_()
            })
        };
        let token = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        token.interrupt();
        assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
        assert!(barrier.is_broken());
    }

    #[test]
    fn reset_clears_broken_state() {
        let barrier = CyclicBarrier::new(2).unwrap();
        let _ = barrier.await_timeout(Duration::from_millis(10));
        assert!(barrier.is_broken());
        barrier.reset().unwrap();
        assert!(!barrier.is_broken());
    }
}
