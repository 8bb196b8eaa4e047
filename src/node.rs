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
//! Wait-queue node (part of C3). Grounded on spec.md §3 "Node" and on
//! the `EAbstractQueuedSynchronizer.hh` `Node` inner class from
//! `examples/original_source/efc/inc/concurrent/EAbstractQueuedSynchronizer.hh`.
//!
//! The original publishes nodes into the queue with pure CAS on raw
//! pointers. We ground the queue-structure mutation on the teacher's
//! own pattern instead (`sync/mutex.rs`, `sync/semaphore.rs`,
//! `sync/atomic_wait.rs` all protect their wait list with a short
//! critical section rather than hand-rolled lock-free pointer CAS):
//! `prev`/`next` live behind the owning `Aqs`'s single `queue` mutex,
//! while `wait_status` remains a true lock-free `AtomicI32` exactly as
//! spec'd, since predecessor-status peeking/CASing happens without
//! that mutex held.

use crate::park::ParkToken;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const WAIT_INIT: i32 = 0;
pub(crate) const WAIT_SIGNAL: i32 = -1;
pub(crate) const WAIT_CANCELLED: i32 = 1;
pub(crate) const WAIT_CONDITION: i32 = -2;
pub(crate) const WAIT_PROPAGATE: i32 = -3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Exclusive,
    Shared,
}

/// `prev`/`next`: mutated only while the owning `Aqs::queue` mutex is
/// held. `next_waiter`: mutated only while a thread holds the owning
/// exclusive synchronizer (spec §3 Condition invariant) — the sync
/// queue never reads it, so it needs no separate protection.
pub(crate) struct Node {
    pub(crate) wait_status: AtomicI32,
    pub(crate) mode: Mode,
    thread: Mutex<Option<ParkToken>>,
    links: UnsafeCell<Links>,
    next_waiter: UnsafeCell<Option<Arc<Node>>>,
}

struct Links {
    prev: Option<Arc<Node>>,
    next: Option<Arc<Node>>,
}

// SAFETY: `links` and `next_waiter` are only ever touched while the
// caller holds the discipline documented on each field above (the
// owning Aqs's queue mutex, or exclusive ownership of the outer
// synchronizer, respectively) — never concurrently.
unsafe impl Sync for Node {}

impl Node {
    pub(crate) fn new(mode: Mode, thread: Option<ParkToken>) -> Arc<Node> {
        Arc::new(Node {
            wait_status: AtomicI32::new(WAIT_INIT),
            mode,
            thread: Mutex::new(thread),
            links: UnsafeCell::new(Links { prev: None, next: None }),
            next_waiter: UnsafeCell::new(None),
        })
    }

    pub(crate) fn condition_node() -> Arc<Node> {
        Arc::new(Node {
            wait_status: AtomicI32::new(WAIT_CONDITION),
            mode: Mode::Exclusive,
            thread: Mutex::new(Some(ParkToken::current())),
            links: UnsafeCell::new(Links { prev: None, next: None }),
            next_waiter: UnsafeCell::new(None),
        })
    }

    pub(crate) fn status(&self) -> i32 {
        self.wait_status.load(Ordering::Acquire)
    }

    pub(crate) fn set_status(&self, value: i32) {
        self.wait_status.store(value, Ordering::Release);
    }

    pub(crate) fn cas_status(&self, expect: i32, new: i32) -> bool {
        self.wait_status
            .compare_exchange(expect, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn thread(&self) -> Option<ParkToken> {
        self.thread.lock().unwrap().clone()
    }

    pub(crate) fn clear_thread(&self) {
        *self.thread.lock().unwrap() = None;
    }

    pub(crate) fn set_thread(&self, token: ParkToken) {
        *self.thread.lock().unwrap() = Some(token);
    }

    // --- queue links: caller must hold the owning Aqs::queue mutex ---

    pub(crate) fn prev(&self) -> Option<Arc<Node>> {
        unsafe { (*self.links.get()).prev.clone() }
    }

    pub(crate) fn set_prev(&self, node: Option<Arc<Node>>) {
        unsafe { (*self.links.get()).prev = node };
    }

    pub(crate) fn next(&self) -> Option<Arc<Node>> {
        unsafe { (*self.links.get()).next.clone() }
    }

    pub(crate) fn set_next(&self, node: Option<Arc<Node>>) {
        unsafe { (*self.links.get()).next = node };
    }

    // --- condition list link: caller must hold the owning exclusive lock ---

    pub(crate) fn next_waiter(&self) -> Option<Arc<Node>> {
        unsafe { (*self.next_waiter.get()).clone() }
    }

    pub(crate) fn set_next_waiter(&self, node: Option<Arc<Node>>) {
        unsafe { (*self.next_waiter.get()) = node };
    }

    pub(crate) fn is_shared(&self) -> bool {
        self.mode == Mode::Shared
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("status", &self.status())
            .field("mode", &self.mode)
            .finish()
    }
}
