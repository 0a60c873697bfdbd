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

//! Fork/join helper for batches of blocking I/O tasks.
//!
//! Tasks handed to [`run`] must be idempotent: segment and commit writes
//! are content-addressed, so re-running a cancelled batch is safe. The
//! process-wide [`crate::settings::threaded`] toggle selects between
//! inline execution and the rayon pool.

use rayon::prelude::*;

use crate::settings;

pub fn run<T, F>(tasks: Vec<F>) -> Vec<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    if settings::threaded() {
        tasks.into_par_iter().map(|task| task()).collect()
    } else {
        tasks.into_iter().map(|task| task()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_inline_preserves_order() {
        let tasks: Vec<_> = (0..8).map(|i| move || i * 2).collect();
        assert_eq!(run(tasks), vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }
}
