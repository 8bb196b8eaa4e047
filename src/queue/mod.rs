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
//! Blocking queues (C10), grounded on spec.md §4.10.

mod linked_blocking;
mod synchronous;

pub use linked_blocking::LinkedBlockingQueue;
pub use synchronous::SynchronousQueue;
