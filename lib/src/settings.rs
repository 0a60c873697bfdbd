// Copyright 2025 The Lakota Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide knobs. Everything here is advisory: inline execution and
//! an unbounded memory pod are always correct, just slower or larger.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static THREADED: AtomicBool = AtomicBool::new(false);
static POD_CACHE_BUDGET: AtomicUsize = AtomicUsize::new(0);

/// Whether [`crate::pool::run`] dispatches tasks on the rayon pool.
pub fn threaded() -> bool {
    THREADED.load(Ordering::Relaxed)
}

pub fn set_threaded(on: bool) {
    THREADED.store(on, Ordering::Relaxed);
}

/// Byte budget for the two-generation cache of memory pods created as the
/// local half of a cache overlay. Zero disables eviction.
pub fn pod_cache_budget() -> usize {
    POD_CACHE_BUDGET.load(Ordering::Relaxed)
}

pub fn set_pod_cache_budget(bytes: usize) {
    POD_CACHE_BUDGET.store(bytes, Ordering::Relaxed);
}
