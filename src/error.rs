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
//! Error type for the synchronizer kernel.
//!
//! Mirrors the "one small `Error` value for the whole subsystem" shape
//! the kernel uses (`kernel/src/error.rs` in the teacher), but built on
//! `std::error::Error`/`Display` rather than an errno-style newtype,
//! since this crate runs hosted rather than `no_std`.

use std::fmt;

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// A thread called `release`/`unlock`/`signal`/`await` while not
    /// holding the synchronizer, or a read-unlock underflowed the
    /// per-thread hold count.
    IllegalMonitorState,
    /// A blocking call observed its interrupt flag set. The flag is
    /// cleared as part of raising this error.
    Interrupted,
    /// A timed `await`/`acquire` expired before succeeding.
    Timeout,
    /// The barrier is in the broken state.
    BrokenBarrier,
    /// A reader/writer/hold count would exceed its representable range.
    CapacityExceeded,
    /// An argument was out of its legal range (negative permits,
    /// negative count, zero parties, ...).
    IllegalArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::IllegalMonitorState => {
                write!(f, "current thread does not hold the synchronizer")
            }
            SyncError::Interrupted => write!(f, "thread interrupted while blocked"),
            SyncError::Timeout => write!(f, "timed out before the operation could complete"),
            SyncError::BrokenBarrier => write!(f, "barrier is broken"),
            SyncError::CapacityExceeded => write!(f, "hold/permit/reader count exceeded its limit"),
            SyncError::IllegalArgument(why) => write!(f, "illegal argument: {why}"),
        }
    }
}

impl std::error::Error for SyncError {}
