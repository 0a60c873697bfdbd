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

//! A logical column slice resolved lazily from the pod.
//!
//! A segment carries per-column digests plus the clipped index range it
//! stands for. Nothing is read until a column is requested; decoded
//! columns are cached for the lifetime of the segment.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::array::Array;
use crate::array::Value;
use crate::error::Error;
use crate::error::Result;
use crate::frame::Closed;
use crate::object_id::segment_path;
use crate::object_id::Digest;
use crate::pod::Pod;
use crate::schema::Schema;

pub struct Segment {
    schema: Schema,
    pod: Arc<dyn Pod>,
    digests: Vec<Digest>,
    start: Vec<Value>,
    stop: Vec<Value>,
    closed: Closed,
    window: Mutex<Option<(usize, usize)>>,
    columns: Mutex<HashMap<usize, Arc<Array>>>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("start", &self.start)
            .field("stop", &self.stop)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Segment {
    pub fn new(
        schema: Schema,
        pod: Arc<dyn Pod>,
        digests: Vec<Digest>,
        start: Vec<Value>,
        stop: Vec<Value>,
        closed: Closed,
    ) -> Result<Segment> {
        if digests.len() != schema.columns().len() {
            return Err(Error::invariant(format!(
                "segment carries {} digests for {} columns",
                digests.len(),
                schema.columns().len()
            )));
        }
        Ok(Segment {
            schema,
            pod,
            digests,
            start,
            stop,
            closed,
            window: Mutex::new(None),
            columns: Mutex::new(HashMap::new()),
        })
    }

    pub fn start(&self) -> &[Value] {
        &self.start
    }

    pub fn stop(&self) -> &[Value] {
        &self.stop
    }

    pub fn closed(&self) -> Closed {
        self.closed
    }

    pub fn digests(&self) -> &[Digest] {
        &self.digests
    }

    fn fetch(&self, pos: usize) -> Result<Arc<Array>> {
        if let Some(arr) = self.columns.lock().unwrap().get(&pos) {
            return Ok(arr.clone());
        }
        let col = &self.schema.columns()[pos];
        let payload = self.pod.read(&segment_path(&self.digests[pos]))?;
        let arr = Arc::new(col.decode(&payload)?);
        self.columns.lock().unwrap().insert(pos, arr.clone());
        Ok(arr)
    }

    /// Resolves the positions of the clipped range inside the stored
    /// arrays, reading only the index columns.
    fn window(&self) -> Result<(usize, usize)> {
        if let Some(window) = *self.window.lock().unwrap() {
            return Ok(window);
        }
        let idx_positions: Vec<usize> = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(pos, col)| col.is_idx().then_some(pos))
            .collect();
        let mut arrays = vec![];
        for pos in idx_positions {
            arrays.push(self.fetch(pos)?);
        }
        let len = arrays.first().map(|arr| arr.len()).unwrap_or(0);
        let lo = if self.start.is_empty() {
            0
        } else {
            bisect_tuple(&arrays, &self.start, len, !self.closed.left())
        };
        let hi = if self.stop.is_empty() {
            len
        } else {
            bisect_tuple(&arrays, &self.stop, len, self.closed.right())
        };
        let window = (lo, hi.max(lo));
        *self.window.lock().unwrap() = Some(window);
        Ok(window)
    }

    /// Row count of the clipped range.
    pub fn len(&self) -> Result<usize> {
        let (lo, hi) = self.window()?;
        Ok(hi - lo)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads `[from, to)` of the clipped range for one column; `to` is
    /// clamped to the range length.
    pub fn read(&self, name: &str, from: usize, to: usize) -> Result<Array> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| Error::not_found("column", name.to_string()))?;
        let (lo, hi) = self.window()?;
        let arr = self.fetch(pos)?;
        let slice_lo = (lo + from).min(hi);
        let slice_hi = lo.saturating_add(to).min(hi);
        Ok(arr.slice(slice_lo, slice_hi.max(slice_lo)))
    }
}

/// Lexicographic bisect over parallel sorted arrays, `values` possibly a
/// prefix of the full tuple.
fn bisect_tuple(arrays: &[Arc<Array>], values: &[Value], len: usize, right: bool) -> usize {
    let mut lo = 0;
    let mut hi = len;
    for (arr, value) in arrays.iter().zip(values) {
        let new_lo = arr.bisect(value, lo, hi, false);
        let new_hi = arr.bisect(value, new_lo, hi, true);
        lo = new_lo;
        hi = new_hi;
    }
    if right {
        hi
    } else {
        lo
    }
}
