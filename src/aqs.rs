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
//! Wait-queue kernel (C3): the engine every high-level primitive in
//! this crate delegates to. Grounded on spec.md §4.3 and on the
//! private helper set named in
//! `examples/original_source/efc/inc/concurrent/EAbstractQueuedSynchronizer.hh`
//! (`isOnSyncQueue`, `transferForSignal`, `transferAfterCancelledWait`,
//! `doReleaseShared`, `setHeadAndPropagate`, `cancelAcquire`,
//! `shouldParkAfterFailedAcquire`) — this module's private functions
//! are named after those one-for-one.
//!
//! Queue-structure mutation (`prev`/`next`) is protected by a single
//! short-held `Mutex` per synchronizer rather than raw pointer CAS,
//! the same trade the teacher makes throughout its own wait-queue code
//! (`sync/mutex.rs`, `sync/semaphore.rs`, `sync/atomic_wait.rs` all
//! guard their wait list with `SpinLock<WaitQueue>`). `state` (C2)
//! remains genuinely lock-free CAS via `AtomicU32`, matching spec §3's
//! "every mutation goes through a CAS" invariant for the state word
//! itself.

use crate::error::SyncError;
use crate::node::{Mode, Node, WAIT_CANCELLED, WAIT_CONDITION, WAIT_INIT, WAIT_PROPAGATE, WAIT_SIGNAL};
use crate::park::{deadline_from, ParkToken};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The atomic state cell (C2) plus the FIFO wait queue (C3) that a
/// concrete primitive embeds and delegates to.
pub(crate) struct Aqs {
    state: AtomicU32,
    queue: Mutex<Queue>,
}

#[derive(Default)]
struct Queue {
    head: Option<Arc<Node>>,
    tail: Option<Arc<Node>>,
}

impl Aqs {
    pub(crate) const fn new(initial: u32) -> Self {
        Aqs {
            state: AtomicU32::new(initial),
            queue: Mutex::new(Queue { head: None, tail: None }),
        }
    }

    pub(crate) fn state(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, value: u32) {
        self.state.store(value, Ordering::Release);
    }

    pub(crate) fn compare_and_set_state(&self, expect: u32, new: u32) -> bool {
        self.state
            .compare_exchange(expect, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Hooks a concrete primitive implements to ride the kernel. Mirrors
/// spec.md §4.3.8. Hooks MUST NOT block; they are pure state math over
/// `self.aqs().state()`.
pub(crate) trait Synchronizer {
    fn aqs(&self) -> &Aqs;

    fn try_acquire(&self, _arg: u32) -> Result<bool, SyncError> {
        Ok(false)
    }
    fn try_release(&self, _arg: u32) -> Result<bool, SyncError> {
        Ok(false)
    }
    fn try_acquire_shared(&self, _arg: u32) -> Result<i32, SyncError> {
        Ok(-1)
    }
    fn try_release_shared(&self, _arg: u32) -> Result<bool, SyncError> {
        Ok(false)
    }
    fn is_held_exclusively(&self) -> bool {
        false
    }
}

// ---- queue structure primitives -------------------------------------------------

fn enq(aqs: &Aqs, node: Arc<Node>) -> Arc<Node> {
    let mut q = aqs.queue.lock().unwrap();
    if q.tail.is_none() {
        let dummy = Node::new(Mode::Exclusive, None);
        q.head = Some(dummy.clone());
        q.tail = Some(dummy);
    }
    let tail = q.tail.clone().expect("queue initialized above");
    node.set_prev(Some(tail.clone()));
    q.tail = Some(node.clone());
    tail.set_next(Some(node.clone()));
    node
}

fn add_waiter(aqs: &Aqs, mode: Mode) -> Arc<Node> {
    enq(aqs, Node::new(mode, Some(ParkToken::current())))
}

fn prev_of(aqs: &Aqs, node: &Arc<Node>) -> Option<Arc<Node>> {
    let _q = aqs.queue.lock().unwrap();
    node.prev()
}

fn next_of(aqs: &Aqs, node: &Arc<Node>) -> Option<Arc<Node>> {
    let _q = aqs.queue.lock().unwrap();
    node.next()
}

fn is_current_head(aqs: &Aqs, node: &Arc<Node>) -> bool {
    let q = aqs.queue.lock().unwrap();
    q.head.as_ref().is_some_and(|h| Arc::ptr_eq(h, node))
}

fn set_head(aqs: &Aqs, node: &Arc<Node>, pred: &Arc<Node>) {
    let mut q = aqs.queue.lock().unwrap();
    q.head = Some(node.clone());
    node.set_prev(None);
    node.clear_thread();
    pred.set_next(None);
}

fn should_park_after_failed_acquire(aqs: &Aqs, pred: &Arc<Node>, node: &Arc<Node>) -> bool {
    let ws = pred.status();
    if ws == WAIT_SIGNAL {
        return true;
    }
    if ws > 0 {
        let mut p = pred.clone();
        let live = loop {
            let pp = prev_of(aqs, &p).expect("a cancelled node retains a live predecessor");
            if pp.status() > 0 {
                p = pp;
            } else {
                break pp;
            }
        };
        let _q = aqs.queue.lock().unwrap();
        node.set_prev(Some(live.clone()));
        live.set_next(Some(node.clone()));
        false
    } else {
        pred.cas_status(ws, WAIT_SIGNAL);
        false
    }
}

fn unpark_successor(aqs: &Aqs, node: &Arc<Node>) {
    let ws = node.status();
    if ws < 0 {
        node.cas_status(ws, WAIT_INIT);
    }
    let mut target = next_of(aqs, node);
    if target.as_ref().map_or(true, |s| s.status() > 0) {
        target = None;
        let q = aqs.queue.lock().unwrap();
        let mut t = q.tail.clone();
        drop(q);
        while let Some(tn) = t {
            if Arc::ptr_eq(&tn, node) {
                break;
            }
            if tn.status() <= 0 {
                target = Some(tn.clone());
            }
            t = prev_of(aqs, &tn);
        }
    }
    if let Some(succ) = target {
        if let Some(token) = succ.thread() {
            token.unpark();
        }
    }
}

fn cancel_acquire<S: Synchronizer + ?Sized>(sync: &S, node: &Arc<Node>) {
    log::trace!("cancelling a queued node, status was {}", node.status());
    node.clear_thread();
    let aqs = sync.aqs();
    let mut unpark_target = None;
    {
        let mut q = aqs.queue.lock().unwrap();
        let mut pred = node.prev();
        while let Some(p) = pred.clone() {
            if p.status() > 0 {
                pred = p.prev();
            } else {
                break;
            }
        }
        node.set_status(WAIT_CANCELLED);
        let was_tail = q.tail.as_ref().is_some_and(|t| Arc::ptr_eq(t, node));
        if was_tail {
            q.tail = pred.clone();
            if let Some(p) = &pred {
                p.set_next(None);
            }
        } else if let Some(p) = &pred {
            let is_head = q.head.as_ref().is_some_and(|h| Arc::ptr_eq(h, p));
            let can_signal = p.status() == WAIT_SIGNAL || p.cas_status(WAIT_INIT, WAIT_SIGNAL);
            if !is_head && can_signal && p.thread().is_some() {
                p.set_next(node.next());
            } else {
                unpark_target = Some(node.clone());
            }
        } else {
            unpark_target = Some(node.clone());
        }
    }
    if let Some(n) = unpark_target {
        unpark_successor(aqs, &n);
    }
}

fn next_head_propagation_ok(aqs: &Aqs, node: &Arc<Node>) -> bool {
    let next = next_of(aqs, node);
    next.map_or(true, |n| n.is_shared())
}

fn set_head_and_propagate(aqs: &Aqs, node: &Arc<Node>, pred: &Arc<Node>, propagate: i32) {
    let old_head_status = pred.status();
    set_head(aqs, node, pred);
    let new_head_status = { aqs.queue.lock().unwrap().head.as_ref().map_or(0, |h| h.status()) };
    let should_propagate = propagate > 0 || old_head_status < 0 || new_head_status < 0;
    if should_propagate && next_head_propagation_ok(aqs, node) {
        do_release_shared(aqs);
    }
}

fn do_release_shared(aqs: &Aqs) {
    loop {
        let h = { aqs.queue.lock().unwrap().head.clone() };
        if let Some(h) = &h {
            let is_tail = { aqs.queue.lock().unwrap().tail.as_ref().is_some_and(|t| Arc::ptr_eq(t, h)) };
            if !is_tail {
                let ws = h.status();
                if ws == WAIT_SIGNAL {
                    if !h.cas_status(WAIT_SIGNAL, WAIT_INIT) {
                        continue;
                    }
                    unpark_successor(aqs, h);
                } else if ws == WAIT_INIT && !h.cas_status(WAIT_INIT, WAIT_PROPAGATE) {
                    continue;
                }
            }
        } else {
            return;
        }
        let h_now = { aqs.queue.lock().unwrap().head.clone() };
        let unchanged = match (&h, &h_now) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
    }
}

// ---- exclusive acquire/release ---------------------------------------------------

fn acquire_queued<S: Synchronizer + ?Sized>(
    sync: &S,
    node: &Arc<Node>,
    arg: u32,
    interruptible: bool,
    deadline: Option<Instant>,
) -> Result<bool, SyncError> {
    let aqs = sync.aqs();
    let mut interrupted = false;
    loop {
        let pred = prev_of(aqs, node);
        if let Some(pred) = &pred {
            if is_current_head(aqs, pred) {
                match sync.try_acquire(arg) {
                    Ok(true) => {
                        set_head(aqs, node, pred);
                        if interrupted {
                            ParkToken::current().restore_interrupted();
                        }
                        return Ok(true);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        cancel_acquire(sync, node);
                        return Err(e);
                    }
                }
            }
        }
        let pred = pred.expect("a queued node always has a predecessor");
        if let Some(dl) = deadline {
            if dl <= Instant::now() {
                cancel_acquire(sync, node);
                return Ok(false);
            }
        }
        if should_park_after_failed_acquire(aqs, &pred, node) {
            if let Some(token) = node.thread() {
                token.park(deadline);
                if token.take_interrupted() {
                    if interruptible {
                        cancel_acquire(sync, node);
                        return Err(SyncError::Interrupted);
                    }
                    interrupted = true;
                }
            }
        }
    }
}

pub(crate) fn acquire<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<(), SyncError> {
    if sync.try_acquire(arg)? {
        return Ok(());
    }
    let node = add_waiter(sync.aqs(), Mode::Exclusive);
    acquire_queued(sync, &node, arg, false, None)?;
    Ok(())
}

pub(crate) fn acquire_interruptibly<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<(), SyncError> {
    if ParkToken::current().take_interrupted() {
        return Err(SyncError::Interrupted);
    }
    if sync.try_acquire(arg)? {
        return Ok(());
    }
    let node = add_waiter(sync.aqs(), Mode::Exclusive);
    acquire_queued(sync, &node, arg, true, None)?;
    Ok(())
}

pub(crate) fn try_acquire_nanos<S: Synchronizer + ?Sized>(
    sync: &S,
    arg: u32,
    timeout: Duration,
) -> Result<bool, SyncError> {
    if ParkToken::current().take_interrupted() {
        return Err(SyncError::Interrupted);
    }
    if sync.try_acquire(arg)? {
        return Ok(true);
    }
    if timeout.is_zero() {
        return Ok(false);
    }
    let deadline = deadline_from(timeout);
    let node = add_waiter(sync.aqs(), Mode::Exclusive);
    acquire_queued(sync, &node, arg, true, Some(deadline))
}

pub(crate) fn release<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<bool, SyncError> {
    if sync.try_release(arg)? {
        let aqs = sync.aqs();
        let h = { aqs.queue.lock().unwrap().head.clone() };
        if let Some(h) = &h {
            if h.status() != WAIT_INIT {
                unpark_successor(aqs, h);
            }
        }
        Ok(true)
    } else {
        Ok(false)
    }
}

// ---- shared acquire/release -------------------------------------------------------

fn acquire_shared_queued<S: Synchronizer + ?Sized>(
    sync: &S,
    node: &Arc<Node>,
    arg: u32,
    interruptible: bool,
    deadline: Option<Instant>,
) -> Result<bool, SyncError> {
    let aqs = sync.aqs();
    let mut interrupted = false;
    loop {
        let pred = prev_of(aqs, node);
        if let Some(pred) = &pred {
            if is_current_head(aqs, pred) {
                match sync.try_acquire_shared(arg) {
                    Ok(r) if r >= 0 => {
                        set_head_and_propagate(aqs, node, pred, r);
                        if interrupted {
                            ParkToken::current().restore_interrupted();
                        }
                        return Ok(true);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        cancel_acquire(sync, node);
                        return Err(e);
                    }
                }
            }
        }
        let pred = pred.expect("a queued node always has a predecessor");
        if let Some(dl) = deadline {
            if dl <= Instant::now() {
                cancel_acquire(sync, node);
                return Ok(false);
            }
        }
        if should_park_after_failed_acquire(aqs, &pred, node) {
            if let Some(token) = node.thread() {
                token.park(deadline);
                if token.take_interrupted() {
                    if interruptible {
                        cancel_acquire(sync, node);
                        return Err(SyncError::Interrupted);
                    }
                    interrupted = true;
                }
            }
        }
    }
}

pub(crate) fn acquire_shared<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<(), SyncError> {
    match sync.try_acquire_shared(arg)? {
        r if r >= 0 => Ok(()),
        _ => {
            let node = add_waiter(sync.aqs(), Mode::Shared);
            acquire_shared_queued(sync, &node, arg, false, None)?;
            Ok(())
        }
    }
}

pub(crate) fn acquire_shared_interruptibly<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<(), SyncError> {
    if ParkToken::current().take_interrupted() {
        return Err(SyncError::Interrupted);
    }
    match sync.try_acquire_shared(arg)? {
        r if r >= 0 => Ok(()),
        _ => {
            let node = add_waiter(sync.aqs(), Mode::Shared);
            acquire_shared_queued(sync, &node, arg, true, None)?;
            Ok(())
        }
    }
}

pub(crate) fn try_acquire_shared_nanos<S: Synchronizer + ?Sized>(
    sync: &S,
    arg: u32,
    timeout: Duration,
) -> Result<bool, SyncError> {
    if ParkToken::current().take_interrupted() {
        return Err(SyncError::Interrupted);
    }
    if sync.try_acquire_shared(arg)? >= 0 {
        return Ok(true);
    }
    if timeout.is_zero() {
        return Ok(false);
    }
    let deadline = deadline_from(timeout);
    let node = add_waiter(sync.aqs(), Mode::Shared);
    acquire_shared_queued(sync, &node, arg, true, Some(deadline))
}

pub(crate) fn release_shared<S: Synchronizer + ?Sized>(sync: &S, arg: u32) -> Result<bool, SyncError> {
    if sync.try_release_shared(arg)? {
        do_release_shared(sync.aqs());
        Ok(true)
    } else {
        Ok(false)
    }
}

// ---- fairness / introspection ------------------------------------------------------

pub(crate) fn has_queued_predecessors(aqs: &Aqs) -> bool {
    let q = aqs.queue.lock().unwrap();
    match (&q.head, &q.tail) {
        (Some(h), Some(t)) if !Arc::ptr_eq(h, t) => match h.next() {
            Some(first) => !first.thread().is_some_and(|t| t == ParkToken::current()),
            None => true,
        },
        _ => false,
    }
}

/// True if the node at the head of the wait queue is waiting in
/// exclusive mode. Used by the non-fair read/write lock read-side
/// policy to avoid writer starvation without paying for full
/// fairness: a reader barges past other queued readers freely, but
/// defers once a writer is first in line.
pub(crate) fn apparently_first_queued_is_exclusive(aqs: &Aqs) -> bool {
    let q = aqs.queue.lock().unwrap();
    q.head.as_ref().and_then(|h| h.next()).is_some_and(|s| !s.is_shared())
}

pub(crate) fn has_queued_threads(aqs: &Aqs) -> bool {
    let q = aqs.queue.lock().unwrap();
    match (&q.head, &q.tail) {
        (Some(h), Some(t)) => !Arc::ptr_eq(h, t),
        _ => false,
    }
}

pub(crate) fn queue_length(aqs: &Aqs) -> usize {
    let q = aqs.queue.lock().unwrap();
    let mut n = 0;
    let mut cur = q.head.as_ref().and_then(|h| h.next());
    while let Some(node) = cur {
        if node.thread().is_some() {
            n += 1;
        }
        cur = node.next();
    }
    n
}

// ---- condition-layer support (C4), operating on the sync queue directly -----------

pub(crate) fn full_release<S: Synchronizer + ?Sized>(sync: &S) -> Result<u32, SyncError> {
    let saved = sync.aqs().state();
    if release(sync, saved)? {
        Ok(saved)
    } else {
        Err(SyncError::IllegalMonitorState)
    }
}

pub(crate) fn acquire_queued_uninterruptibly<S: Synchronizer + ?Sized>(
    sync: &S,
    node: &Arc<Node>,
    arg: u32,
) -> Result<(), SyncError> {
    acquire_queued(sync, node, arg, false, None).map(|_| ())
}

pub(crate) fn enqueue_condition_node(aqs: &Aqs, node: Arc<Node>) -> Arc<Node> {
    enq(aqs, node)
}

pub(crate) fn is_on_sync_queue(aqs: &Aqs, node: &Arc<Node>) -> bool {
    if node.status() == WAIT_CONDITION {
        return false;
    }
    let q = aqs.queue.lock().unwrap();
    if node.prev().is_none() {
        return false;
    }
    if node.next().is_some() {
        return true;
    }
    let mut t = q.tail.clone();
    while let Some(tn) = t {
        if Arc::ptr_eq(&tn, node) {
            return true;
        }
        t = tn.prev();
    }
    false
}

pub(crate) fn transfer_for_signal(aqs: &Aqs, node: &Arc<Node>) -> bool {
    if !node.cas_status(WAIT_CONDITION, WAIT_INIT) {
        return false;
    }
    let n = enqueue_condition_node(aqs, node.clone());
    if let Some(p) = prev_of(aqs, &n) {
        let ws = p.status();
        if ws > 0 || !p.cas_status(ws, WAIT_SIGNAL) {
            if let Some(token) = n.thread() {
                token.unpark();
            }
        }
    }
    true
}

pub(crate) fn transfer_after_cancelled_wait(aqs: &Aqs, node: &Arc<Node>) -> bool {
    if node.cas_status(WAIT_CONDITION, WAIT_INIT) {
        enqueue_condition_node(aqs, node.clone());
        return true;
    }
    while !is_on_sync_queue(aqs, node) {
        std::thread::yield_now();
    }
    false
}
