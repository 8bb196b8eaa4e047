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
//! Condition variable layer (C4), grounded on spec.md §4.4 and on
//! `EAbstractQueuedSynchronizer.hh`'s `ConditionObject` inner class
//! from `examples/original_source/efc/inc/concurrent/EAbstractQueuedSynchronizer.hh`.
//!
//! A `Condition` owns the lock it was created from (`Arc<ReentrantLock>`)
//! rather than borrowing it, so it can outlive the stack frame that
//! created it and move freely into spawned threads — the lock
//! reference a JDK `Condition` captures implicitly via its outer-class
//! pointer has to be made explicit in Rust.

use crate::aqs::{
    acquire_queued_uninterruptibly, full_release, is_on_sync_queue, transfer_after_cancelled_wait,
    transfer_for_signal,
};
use crate::error::{Result, SyncError};
use crate::mutex::ReentrantLock;
use crate::node::{Node, WAIT_CONDITION};
use crate::park::{deadline_from, ParkToken};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monitor condition tied to one `ReentrantLock`. Constructed with
/// `ReentrantLock::new_condition`; never constructed directly.
pub struct Condition {
    lock: Arc<ReentrantLock>,
    first_waiter: std::sync::Mutex<Option<Arc<Node>>>,
    last_waiter: std::sync::Mutex<Option<Arc<Node>>>,
}

impl Condition {
    pub(crate) fn new(lock: Arc<ReentrantLock>) -> Condition {
        Condition {
            lock,
            first_waiter: std::sync::Mutex::new(None),
            last_waiter: std::sync::Mutex::new(None),
        }
    }

    fn check_held(&self) -> Result<()> {
        if self.lock.is_held_by_current_thread() {
            Ok(())
        } else {
            Err(SyncError::IllegalMonitorState)
        }
    }

    fn add_condition_waiter(&self) -> Result<Arc<Node>> {
        self.check_held()?;
        self.unlink_cancelled_waiters();
        let node = Node::condition_node();
        let mut last = self.last_waiter.lock().unwrap();
        match last.as_ref() {
            Some(l) => l.set_next_waiter(Some(node.clone())),
            None => {
                *self.first_waiter.lock().unwrap() = Some(node.clone());
            }
        }
        *last = Some(node.clone());
        Ok(node)
    }

    /// Walks the condition list once, dropping nodes that left
    /// `CONDITION` state without being signalled (i.e. were cancelled
    /// from the sync queue side). Mirrors `unlinkCancelledWaiters`.
    fn unlink_cancelled_waiters(&self) {
        let mut first_guard = self.first_waiter.lock().unwrap();
        let mut t = first_guard.clone();
        let mut trail: Option<Arc<Node>> = None;
        while let Some(node) = t {
            let next = node.next_waiter();
            if node.status() != WAIT_CONDITION {
                node.set_next_waiter(None);
                match &trail {
                    None => *first_guard = next.clone(),
                    Some(tr) => tr.set_next_waiter(next.clone()),
                }
                if next.is_none() {
                    *self.last_waiter.lock().unwrap() = trail.clone();
                }
            } else {
                trail = Some(node);
            }
            t = next;
        }
    }

    fn do_signal(&self) {
        loop {
            let first = self.first_waiter.lock().unwrap().clone();
            let Some(node) = first else { return };
            let next = node.next_waiter();
            {
                let mut fw = self.first_waiter.lock().unwrap();
                *fw = next.clone();
            }
            if next.is_none() {
                *self.last_waiter.lock().unwrap() = None;
            }
            node.set_next_waiter(None);
            if transfer_for_signal(self.lock.aqs_ref(), &node) {
                return;
            }
            // node was already cancelled off the condition list; keep looking
        }
    }

    fn do_signal_all(&self) {
        let mut cur = self.first_waiter.lock().unwrap().take();
        *self.last_waiter.lock().unwrap() = None;
        while let Some(node) = cur {
            let next = node.next_waiter();
            node.set_next_waiter(None);
            transfer_for_signal(self.lock.aqs_ref(), &node);
            cur = next;
        }
    }

    /// Wake one waiting thread. Must be called while the owning lock
    /// is held by the current thread.
    pub fn signal(&self) -> Result<()> {
        self.check_held()?;
        self.do_signal();
        Ok(())
    }

    /// Wake every waiting thread. Must be called while the owning lock
    /// is held by the current thread.
    pub fn signal_all(&self) -> Result<()> {
        self.check_held()?;
        self.do_signal_all();
        Ok(())
    }

    /// Release the lock (fully, regardless of hold count) and block
    /// until signalled or interrupted, then reacquire it (restoring
    /// the saved hold count) before returning.
    pub fn await_(&self) -> Result<()> {
        let node = self.add_condition_waiter()?;
        let saved = full_release(&*self.lock)?;
        let mut interrupted_while_waiting = false;
        let mut throw_interrupted = false;
        while !is_on_sync_queue(self.lock.aqs_ref(), &node) {
            let token = node.thread();
            if let Some(token) = token {
                token.park(None);
                if token.take_interrupted() {
                    interrupted_while_waiting = true;
                    log::trace!("condition wait interrupted before any signal arrived");
                    throw_interrupted = transfer_after_cancelled_wait(self.lock.aqs_ref(), &node);
                    break;
                }
            } else {
                break;
            }
        }
        acquire_queued_uninterruptibly(&*self.lock, &node, saved)?;
        self.unlink_cancelled_waiters();
        if throw_interrupted {
            return Err(SyncError::Interrupted);
        }
        if interrupted_while_waiting {
            // The signal won the race: this wait succeeded, but the
            // thread's interrupt flag must still be observable on
            // return rather than silently swallowed.
            ParkToken::current().restore_interrupted();
        }
        Ok(())
    }

    /// As `await_`, but bounded by `timeout`. Returns `Ok(false)` on
    /// timeout, `Ok(true)` if signalled before the deadline.
    pub fn await_timeout(&self, timeout: Duration) -> Result<bool> {
        let node = self.add_condition_waiter()?;
        let saved = full_release(&*self.lock)?;
        let deadline = deadline_from(timeout);
        let mut timed_out = false;
        let mut interrupted_while_waiting = false;
        let mut throw_interrupted = false;
        while !is_on_sync_queue(self.lock.aqs_ref(), &node) {
            if Instant::now() >= deadline {
                timed_out = transfer_after_cancelled_wait(self.lock.aqs_ref(), &node);
                break;
            }
            let token = node.thread();
            if let Some(token) = token {
                token.park(Some(deadline));
                if token.take_interrupted() {
                    interrupted_while_waiting = true;
                    throw_interrupted = transfer_after_cancelled_wait(self.lock.aqs_ref(), &node);
                    break;
                }
            } else {
                break;
            }
        }
        acquire_queued_uninterruptibly(&*self.lock, &node, saved)?;
        self.unlink_cancelled_waiters();
        if throw_interrupted {
            return Err(SyncError::Interrupted);
        }
        if interrupted_while_waiting {
            ParkToken::current().restore_interrupted();
        }
        Ok(!timed_out)
    }

    /// As `await_timeout`, but expressed as an absolute deadline.
    pub fn await_until(&self, deadline: Instant) -> Result<bool> {
        let now = Instant::now();
        if deadline <= now {
            return self.await_timeout(Duration::from_nanos(0));
        }
        self.await_timeout(deadline - now)
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition").finish_non_exhaustive()
    }
}
