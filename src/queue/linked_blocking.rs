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
//! Bounded FIFO blocking queue (C10a), grounded on spec.md §4.10.1 and
//! on `ELinkedBlockingQueue.cpp` from
//! `examples/original_source/efc/src/concurrent/ELinkedBlockingQueue.cpp`'s
//! two-lock algorithm: a dedicated put-side lock/condition pair and a
//! dedicated take-side lock/condition pair, so a blocked producer
//! never holds up a consumer and vice versa. `count` is the one field
//! genuinely shared between the two sides; its atomic
//! load/compare-exchange supplies the cross-lock visibility the
//! original gets for free from a plain `volatile int`.

use crate::condition::Condition;
use crate::error::Result;
use crate::mutex::ReentrantLock;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct QNode<T> {
    item: UnsafeCell<Option<T>>,
    next: UnsafeCell<Option<Arc<QNode<T>>>>,
}

impl<T> QNode<T> {
    fn new(item: Option<T>) -> Arc<QNode<T>> {
        Arc::new(QNode { item: UnsafeCell::new(item), next: UnsafeCell::new(None) })
    }
}

// SAFETY: `item`/`next` on a given node are written at most once by
// whichever side (put or take) owns that access at the time — see the
// module doc — and every write/read is preceded by acquiring the
// corresponding side's lock, which together with `count`'s atomic ops
// supplies the needed happens-before edge across the put/take split.
unsafe impl<T: Send> Sync for QNode<T> {}

/// A FIFO blocking queue with a fixed capacity (or effectively
/// unbounded, via [`LinkedBlockingQueue::unbounded`]).
pub struct LinkedBlockingQueue<T> {
    capacity: usize,
    count: AtomicUsize,
    head: UnsafeCell<Arc<QNode<T>>>,
    last: UnsafeCell<Arc<QNode<T>>>,
    take_lock: Arc<ReentrantLock>,
    not_empty: Condition,
    put_lock: Arc<ReentrantLock>,
    not_full: Condition,
}

// SAFETY: `head` is read/written only while `take_lock` is held,
// `last` only while `put_lock` is held.
unsafe impl<T: Send> Sync for LinkedBlockingQueue<T> {}

impl<T: Send> LinkedBlockingQueue<T> {
    pub fn new(capacity: usize) -> Result<Arc<LinkedBlockingQueue<T>>> {
        if capacity == 0 {
            return Err(crate::error::SyncError::IllegalArgument("a bounded queue needs a positive capacity"));
        }
        let dummy = QNode::new(None);
        let take_lock = ReentrantLock::new();
        let put_lock = ReentrantLock::new();
        let not_empty = take_lock.new_condition();
        let not_full = put_lock.new_condition();
        Ok(Arc::new(LinkedBlockingQueue {
            capacity,
            count: AtomicUsize::new(0),
            head: UnsafeCell::new(dummy.clone()),
            last: UnsafeCell::new(dummy),
            take_lock,
            not_empty,
            put_lock,
            not_full,
        }))
    }

    pub fn unbounded() -> Arc<LinkedBlockingQueue<T>> {
        Self::new(usize::MAX).expect("usize::MAX is always a valid capacity")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.len()
    }

    fn enqueue(&self, node: Arc<QNode<T>>) {
        // SAFETY: caller holds `put_lock`.
        unsafe {
            let last = &mut *self.last.get();
            *(*last).next.get() = Some(node.clone());
            *last = node;
        }
    }

    fn dequeue(&self) -> T {
        // SAFETY: caller holds `take_lock`.
        unsafe {
            let head = &mut *self.head.get();
            let new_head = (*(*head).next.get()).clone().expect("dequeue called on empty queue");
            let item = (*new_head.item.get()).take().expect("live node always carries an item");
            *head = new_head;
            item
        }
    }

    fn signal_not_empty(&self) {
        self.take_lock.lock().expect("internal queue lock cannot exceed its hold-count capacity");
        self.not_empty.signal().expect("lock is held by this call");
        self.take_lock.unlock().expect("lock was just acquired by this call");
    }

    fn signal_not_full(&self) {
        self.put_lock.lock().expect("internal queue lock cannot exceed its hold-count capacity");
        self.not_full.signal().expect("lock is held by this call");
        self.put_lock.unlock().expect("lock was just acquired by this call");
    }

    /// Append `item`, blocking while the queue is at capacity. An
    /// interrupt while waiting propagates as `SyncError::Interrupted`.
    pub fn put(&self, item: T) -> Result<()> {
        let mut node = Some(QNode::new(Some(item)));
        self.put_lock.lock()?;
        let result = (|| -> Result<usize> {
            while self.count.load(Ordering::Acquire) == self.capacity {
                self.not_full.await_()?;
            }
            self.enqueue(node.take().unwrap());
            let prev_count = self.count.fetch_add(1, Ordering::AcqRel);
            if prev_count + 1 < self.capacity {
                self.not_full.signal()?;
            }
            Ok(prev_count)
        })();
        self.put_lock.unlock()?;
        let prev_count = result?;
        if prev_count == 0 {
            self.signal_not_empty();
        }
        Ok(())
    }

    /// Remove and return the head, blocking while empty. An interrupt
    /// while waiting propagates as `SyncError::Interrupted`.
    pub fn take(&self) -> Result<T> {
        self.take_lock.lock()?;
        let result = (|| -> Result<(T, usize)> {
            while self.count.load(Ordering::Acquire) == 0 {
                self.not_empty.await_()?;
            }
            let item = self.dequeue();
            let prev_count = self.count.fetch_sub(1, Ordering::AcqRel);
            if prev_count > 1 {
                self.not_empty.signal()?;
            }
            Ok((item, prev_count))
        })();
        self.take_lock.unlock()?;
        let (item, prev_count) = result?;
        if prev_count == self.capacity {
            self.signal_not_full();
        }
        Ok(item)
    }

    /// Append `item` without blocking; `Ok(false)` if the queue is
    /// full.
    pub fn offer(&self, item: T) -> Result<bool> {
        if self.count.load(Ordering::Acquire) == self.capacity {
            return Ok(false);
        }
        let node = QNode::new(Some(item));
        self.put_lock.lock()?;
        let inserted = if self.count.load(Ordering::Acquire) < self.capacity {
            self.enqueue(node);
            let prev_count = self.count.fetch_add(1, Ordering::AcqRel);
            if prev_count + 1 < self.capacity {
                self.not_full.signal()?;
            }
            Some(prev_count)
        } else {
            None
        };
        self.put_lock.unlock()?;
        if let Some(0) = inserted {
            self.signal_not_empty();
        }
        Ok(inserted.is_some())
    }

    pub fn offer_timeout(&self, item: T, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut node = Some(QNode::new(Some(item)));
        self.put_lock.lock()?;
        let result = (|| -> Result<Option<usize>> {
            let mut full = self.count.load(Ordering::Acquire) == self.capacity;
            while full {
                let now = Instant::now();
                if now >= deadline || !self.not_full.await_timeout(deadline - now)? {
                    return Ok(None);
                }
                full = self.count.load(Ordering::Acquire) == self.capacity;
            }
            self.enqueue(node.take().unwrap());
            let prev_count = self.count.fetch_add(1, Ordering::AcqRel);
            if prev_count + 1 < self.capacity {
                self.not_full.signal()?;
            }
            Ok(Some(prev_count))
        })();
        self.put_lock.unlock()?;
        match result? {
            Some(prev_count) => {
                if prev_count == 0 {
                    self.signal_not_empty();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove and return the head without blocking; `Ok(None)` if
    /// empty.
    pub fn poll(&self) -> Result<Option<T>> {
        if self.count.load(Ordering::Acquire) == 0 {
            return Ok(None);
        }
        self.take_lock.lock()?;
        let item = if self.count.load(Ordering::Acquire) > 0 {
            let item = self.dequeue();
            let prev_count = self.count.fetch_sub(1, Ordering::AcqRel);
            if prev_count > 1 {
                self.not_empty.signal()?;
            }
            Some((item, prev_count))
        } else {
            None
        };
        self.take_lock.unlock()?;
        if let Some((item, prev_count)) = item {
            if prev_count == self.capacity {
                self.signal_not_full();
            }
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        self.take_lock.lock()?;
        let result = (|| -> Result<Option<(T, usize)>> {
            let mut empty = self.count.load(Ordering::Acquire) == 0;
            while empty {
                let now = Instant::now();
                if now >= deadline || !self.not_empty.await_timeout(deadline - now)? {
                    return Ok(None);
                }
                empty = self.count.load(Ordering::Acquire) == 0;
            }
            let item = self.dequeue();
            let prev_count = self.count.fetch_sub(1, Ordering::AcqRel);
            if prev_count > 1 {
                self.not_empty.signal()?;
            }
            Ok(Some((item, prev_count)))
        })();
        self.take_lock.unlock()?;
        match result? {
            Some((item, prev_count)) => {
                if prev_count == self.capacity {
                    self.signal_not_full();
                }
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Remove all available elements and append them to `sink` in FIFO
    /// order, returning how many were moved. Only the take side needs
    /// locking: draining never touches `last` or the put-side count
    /// check, so a concurrent `put` can proceed once it observes the
    /// reduced count.
    pub fn drain_to(&self, sink: &mut Vec<T>) -> usize {
        self.take_lock.lock().expect("internal queue lock cannot exceed its hold-count capacity");
        let n = self.count.load(Ordering::Acquire);
        for _ in 0..n {
            sink.push(self.dequeue());
        }
        let signal_not_full = if n > 0 { self.count.fetch_sub(n, Ordering::AcqRel) == self.capacity } else { false };
        self.take_lock.unlock().expect("lock was just acquired by this call");
        if signal_not_full {
            self.signal_not_full();
        }
        n
    }

    /// Peek at the head without removing it.
    pub fn peek(&self) -> Result<Option<T>>
    where
        T: Clone,
    {
        self.take_lock.lock()?;
        // SAFETY: `take_lock` is held.
        let item = unsafe {
            let head = &*self.head.get();
            (*(*head).next.get()).as_ref().and_then(|n| (*n.item.get()).clone())
        };
        self.take_lock.unlock()?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_order_is_preserved() {
        let q = LinkedBlockingQueue::new(8).unwrap();
        for i in 0..5 {
            q.put(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(q.take().unwrap(), i);
        }
    }

    #[test]
    fn offer_fails_when_full() {
        let q = LinkedBlockingQueue::new(1).unwrap();
        assert!(q.offer(1).unwrap());
        assert!(!q.offer(2).unwrap());
        assert_eq!(q.take().unwrap(), 1);
        assert!(q.offer(2).unwrap());
    }

    #[test]
    fn poll_on_empty_queue_returns_none() {
        let q: Arc<LinkedBlockingQueue<i32>> = LinkedBlockingQueue::new(4).unwrap();
        assert_eq!(q.poll().unwrap(), None);
    }

    #[test]
    fn drain_to_moves_every_element_in_order() {
        let q = LinkedBlockingQueue::new(4).unwrap();
        for i in 0..3 {
            q.put(i).unwrap();
        }
        let mut sink = Vec::new();
        assert_eq!(q.drain_to(&mut sink), 3);
        assert_eq!(sink, vec![0, 1, 2]);
        assert!(q.is_empty());
        q.put(9).unwrap();
        assert_eq!(q.take().unwrap(), 9);
    }

    #[test]
    fn producer_consumer_handoff() {
        let q = LinkedBlockingQueue::new(2).unwrap();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut sum = 0;
                for _ in 0..100 {
                    sum += q.take().unwrap();
                }
                sum
            })
        };
        for i in 0..100 {
            q.put(i).unwrap();
        }
        assert_eq!(consumer.join().unwrap(), (0..100).sum::<i32>());
    }
}
