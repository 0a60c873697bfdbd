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

//! Series: a named, versioned dataframe inside a collection.
//!
//! Reads reconstruct a frame from the overlapping revisions of the
//! changelog, newest first: the first commit covering a range wins it,
//! and the uncovered remainders descend to older commits. With a single
//! history line everything resolves from the leaf commit; older commits
//! only contribute under `before`/`after` bounds or unmerged branches.

use std::cmp::Ordering;

use tracing::debug;

use crate::array::cmp_prefix;
use crate::array::cmp_values;
use crate::array::Value;
use crate::changelog::Revision;
use crate::collection::Batch;
use crate::collection::Collection;
use crate::commit::Commit;
use crate::commit::RevRow;
use crate::error::Error;
use crate::error::Result;
use crate::frame::Aggregate;
use crate::frame::Closed;
use crate::frame::Frame;
use crate::frame::ReduceSpec;
use crate::object_id::segment_path;
use crate::pod::Pod;
use crate::pool;
use crate::schema::Schema;
use crate::schema::SchemaKind;
use crate::segment::Segment;

#[derive(Clone, Debug)]
pub struct Series {
    label: String,
    collection: Collection,
}

/// Write knobs. `start`/`stop` override the recorded range (needed for
/// empty overwrites), `root` forces a phi-parented commit, `batch`
/// defers the changelog append.
#[derive(Default)]
pub struct WriteOptions<'a> {
    pub start: Option<Vec<Value>>,
    pub stop: Option<Vec<Value>>,
    pub root: bool,
    pub batch: Option<&'a mut Batch>,
}

/// One historical revision row of a series, as shown by `rev`.
#[derive(Clone, Debug)]
pub struct SeriesRevision {
    pub epoch_ms: u64,
    pub row: RevRow,
}

impl Series {
    pub(crate) fn new(label: String, collection: Collection) -> Series {
        Series { label, collection }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schema(&self) -> &Schema {
        self.collection.schema()
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn refresh(&self) {
        self.collection.changelog().refresh();
    }

    /// Writes a frame with default options: record its own index range,
    /// extend the current leaf.
    pub fn write(&self, frame: &Frame) -> Result<Vec<Revision>> {
        self.write_opts(frame, WriteOptions::default())
    }

    pub fn write_opts(&self, frame: &Frame, opts: WriteOptions<'_>) -> Result<Vec<Revision>> {
        let kv = self.schema().kind() == SchemaKind::Kv;
        if kv && !opts.root && opts.start.is_none() && opts.stop.is_none() {
            self.write_kv(frame, opts)
        } else {
            self.write_plain(frame, opts)
        }
    }

    /// Last-writer-wins upsert: merge the incoming frame with the stored
    /// rows over its range, keeping the first (new) occurrence per index
    /// tuple.
    fn write_kv(&self, frame: &Frame, opts: WriteOptions<'_>) -> Result<Vec<Revision>> {
        let frame = frame.sorted();
        if frame.is_empty() {
            return Ok(vec![]);
        }
        let start = frame.start().ok_or_else(|| Error::invariant("empty frame"))?;
        let stop = frame.stop().ok_or_else(|| Error::invariant("empty frame"))?;
        let segments = self.read(
            &QueryParams::default()
                .with_range(start, stop)
                .with_closed(Closed::Both),
        )?;
        let stored = Frame::from_segments(self.schema(), &segments, None, 0, None)?;
        if stored.is_empty() {
            return self.write_plain(&frame, opts);
        }
        let merged = Frame::concat(&[frame, stored])?;
        let specs: Vec<ReduceSpec> = self
            .schema()
            .columns()
            .iter()
            .map(|col| {
                if col.is_idx() {
                    ReduceSpec::group(col.name())
                } else {
                    ReduceSpec::agg(col.name(), col.name(), Aggregate::First)
                }
            })
            .collect();
        let merged = merged.reduce(&specs)?;
        self.write_plain(&merged, opts)
    }

    fn write_plain(&self, frame: &Frame, opts: WriteOptions<'_>) -> Result<Vec<Revision>> {
        if frame.schema() != self.schema() {
            return Err(Error::SchemaMismatch(format!(
                "frame does not match the schema of series `{}`",
                self.label
            )));
        }
        if !frame.is_sorted() {
            return Err(Error::invariant("frame is not sorted"));
        }
        if frame.is_empty() && opts.start.is_none() && opts.stop.is_none() {
            return Ok(vec![]);
        }
        let pod = self.collection.pod();
        let tasks: Vec<_> = self
            .schema()
            .columns()
            .iter()
            .zip(frame.columns())
            .map(|(col, arr)| {
                move || -> Result<_> {
                    let (payload, digest) = col.encode_with_digest(arr)?;
                    pod.write(&segment_path(&digest), &payload, false)?;
                    Ok(digest)
                }
            })
            .collect();
        let digest = pool::run(tasks)
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let start = match opts.start {
            Some(start) => start,
            None => frame.start().ok_or_else(|| Error::invariant("empty frame"))?,
        };
        let stop = match opts.stop {
            Some(stop) => stop,
            None => frame.stop().ok_or_else(|| Error::invariant("empty frame"))?,
        };
        let row = RevRow {
            label: self.label.clone(),
            start,
            stop,
            digest,
            length: frame.len() as u64,
            closed: Closed::Both,
        };
        self.collection.register_series(&self.label)?;
        match opts.batch {
            Some(batch) => {
                batch.append(row);
                Ok(vec![])
            }
            None => {
                let mut batch = self.collection.batch(opts.root);
                batch.append(row);
                Ok(batch.flush()?.unwrap_or_default())
            }
        }
    }

    /// Finds all segments matching the query, sorted by start and
    /// guaranteed non-overlapping.
    ///
    /// The revision rows are walked newest commit first (rows of one
    /// commit in descending start order); the first row intersecting an
    /// uncovered interval wins it, and the remainders on both sides
    /// descend to the rows after it. Worked over an explicit stack so
    /// deep histories cannot blow the call stack.
    pub fn read(&self, params: &QueryParams) -> Result<Vec<Segment>> {
        let changelog = self.collection.changelog();
        let log = changelog.log()?;
        // Newest first; a merge commit appears once per parent, keep one.
        let mut nodes: Vec<Revision> = vec![];
        for rev in log.iter().rev() {
            if params.after.is_some_and(|after| rev.epoch_ms() < after) {
                continue;
            }
            if params.before.is_some_and(|before| rev.epoch_ms() >= before) {
                continue;
            }
            if nodes.iter().any(|seen| seen.child == rev.child) {
                continue;
            }
            nodes.push(rev.clone());
        }
        let mut rows: Vec<RevRow> = vec![];
        for node in &nodes {
            let payload = changelog.read_payload(node)?;
            let commit = Commit::decode(self.schema().clone(), &payload)?;
            let matching: Vec<RevRow> = commit
                .rows()
                .filter(|row| row.label == self.label)
                .collect();
            rows.extend(matching.into_iter().rev());
        }
        debug!(label = %self.label, rows = rows.len(), "read series");

        let mut segments = vec![];
        let mut stack = vec![ReadTask {
            row: 0,
            start: params.start.clone(),
            stop: params.stop.clone(),
            incl_left: params.closed.left(),
            incl_right: params.closed.right(),
        }];
        while let Some(task) = stack.pop() {
            for pos in task.row..rows.len() {
                let row = &rows[pos];
                if !intersects(row, &task) {
                    continue;
                }
                let Some(clip) = clip(row, &task) else {
                    continue;
                };
                segments.push(Segment::new(
                    self.schema().clone(),
                    self.collection.pod().clone(),
                    row.digest.clone(),
                    clip.start.clone(),
                    clip.stop.clone(),
                    Closed::from_flags(clip.incl_left, clip.incl_right),
                )?);
                if pos + 1 < rows.len() {
                    // Left and right remainders, their shared boundaries
                    // complementing what the emitted segment took.
                    let left = ReadTask {
                        row: pos + 1,
                        start: task.start.clone(),
                        stop: clip.start,
                        incl_left: task.incl_left,
                        incl_right: !clip.incl_left,
                    };
                    if left.is_nonempty() {
                        stack.push(left);
                    }
                    let right = ReadTask {
                        row: pos + 1,
                        start: clip.stop,
                        stop: task.stop.clone(),
                        incl_left: !clip.incl_right,
                        incl_right: task.incl_right,
                    };
                    if right.is_nonempty() {
                        stack.push(right);
                    }
                }
                break;
            }
        }
        segments.sort_by(|a, b| {
            cmp_values(a.start(), b.start()).then_with(|| cmp_values(a.stop(), b.stop()))
        });
        Ok(segments)
    }

    /// Historical revision rows of this series, oldest commit first.
    pub fn revisions(&self) -> Result<Vec<SeriesRevision>> {
        let changelog = self.collection.changelog();
        let log = changelog.log()?;
        let mut seen = std::collections::HashSet::new();
        let mut out = vec![];
        for rev in log.iter() {
            if !seen.insert(rev.child) {
                continue;
            }
            let payload = changelog.read_payload(rev)?;
            let commit = Commit::decode(self.schema().clone(), &payload)?;
            for row in commit.rows() {
                if row.label == self.label {
                    out.push(SeriesRevision {
                        epoch_ms: rev.epoch_ms(),
                        row,
                    });
                }
            }
        }
        Ok(out)
    }

    pub fn query(&self) -> Query<'_> {
        Query {
            series: self,
            params: QueryParams::default(),
        }
    }

    /// Total row count, reading only the index columns.
    pub fn len(&self) -> Result<usize> {
        self.query().len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Full frame of the series.
    pub fn frame(&self) -> Result<Frame> {
        self.query().frame()
    }
}

/// One uncovered query interval, to be resolved against the revision
/// rows from `row` onward.
struct ReadTask {
    row: usize,
    start: Vec<Value>,
    stop: Vec<Value>,
    incl_left: bool,
    incl_right: bool,
}

impl ReadTask {
    fn is_nonempty(&self) -> bool {
        if self.start.is_empty() || self.stop.is_empty() {
            return true;
        }
        match cmp_values(&self.start, &self.stop) {
            Ordering::Less => true,
            Ordering::Equal => self.incl_left && self.incl_right,
            Ordering::Greater => false,
        }
    }
}

struct Emitted {
    start: Vec<Value>,
    stop: Vec<Value>,
    incl_left: bool,
    incl_right: bool,
}

fn intersects(row: &RevRow, task: &ReadTask) -> bool {
    if !task.stop.is_empty() && cmp_prefix(&row.start, &task.stop) == Ordering::Greater {
        return false;
    }
    if !task.start.is_empty() && cmp_prefix(&row.stop, &task.start) == Ordering::Less {
        return false;
    }
    true
}

/// Intersection of a row with the task interval. The inclusion flag of
/// each clipped edge follows whichever side supplied the boundary; when
/// both name the same bound, both must include it.
fn clip(row: &RevRow, task: &ReadTask) -> Option<Emitted> {
    let (start, incl_left) = if task.start.is_empty() {
        (row.start.clone(), row.closed.left())
    } else {
        match cmp_values(&row.start, &task.start) {
            Ordering::Greater => (row.start.clone(), row.closed.left()),
            Ordering::Less => (task.start.clone(), task.incl_left),
            Ordering::Equal => (row.start.clone(), row.closed.left() && task.incl_left),
        }
    };
    let (stop, incl_right) = if task.stop.is_empty() {
        (row.stop.clone(), row.closed.right())
    } else {
        match cmp_values(&row.stop, &task.stop) {
            Ordering::Less => (row.stop.clone(), row.closed.right()),
            Ordering::Greater => (task.stop.clone(), task.incl_right),
            Ordering::Equal => (row.stop.clone(), row.closed.right() && task.incl_right),
        }
    };
    let emitted = Emitted {
        start,
        stop,
        incl_left,
        incl_right,
    };
    match cmp_values(&emitted.start, &emitted.stop) {
        Ordering::Less => Some(emitted),
        Ordering::Equal if emitted.incl_left && emitted.incl_right => Some(emitted),
        _ => None,
    }
}

/// Query parameters; `closed` defaults to `left`.
#[derive(Clone, Debug)]
pub struct QueryParams {
    pub start: Vec<Value>,
    pub stop: Vec<Value>,
    pub closed: Closed,
    pub limit: Option<usize>,
    pub offset: usize,
    pub before: Option<u64>,
    pub after: Option<u64>,
    pub select: Option<Vec<String>>,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            start: vec![],
            stop: vec![],
            closed: Closed::Left,
            limit: None,
            offset: 0,
            before: None,
            after: None,
            select: None,
        }
    }
}

impl QueryParams {
    pub fn with_range(mut self, start: Vec<Value>, stop: Vec<Value>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_closed(mut self, closed: Closed) -> Self {
        self.closed = closed;
        self
    }
}

/// Parameterized reader over one series.
#[derive(Clone, Debug)]
pub struct Query<'a> {
    series: &'a Series,
    params: QueryParams,
}

impl<'a> Query<'a> {
    pub fn start(mut self, start: Vec<Value>) -> Self {
        self.params.start = start;
        self
    }

    pub fn stop(mut self, stop: Vec<Value>) -> Self {
        self.params.stop = stop;
        self
    }

    pub fn closed(mut self, closed: Closed) -> Self {
        self.params.closed = closed;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.params.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.params.offset = offset;
        self
    }

    pub fn before(mut self, epoch_ms: u64) -> Self {
        self.params.before = Some(epoch_ms);
        self
    }

    pub fn after(mut self, epoch_ms: u64) -> Self {
        self.params.after = Some(epoch_ms);
        self
    }

    pub fn select(mut self, columns: Vec<String>) -> Self {
        self.params.select = Some(columns);
        self
    }

    pub fn segments(&self) -> Result<Vec<Segment>> {
        self.series.read(&self.params)
    }

    pub fn len(&self) -> Result<usize> {
        let mut total = 0;
        for segment in self.segments()? {
            total += segment.len()?;
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn frame(&self) -> Result<Frame> {
        let segments = self.segments()?;
        Frame::from_segments(
            self.series.schema(),
            &segments,
            self.params.limit,
            self.params.offset,
            self.params.select.as_deref(),
        )
    }

    /// Iterator of frames walking the result `step` rows at a time.
    pub fn paginate(&self, step: usize) -> Result<Paginate> {
        if step == 0 {
            return Err(Error::invariant("paginate step must be > 0"));
        }
        Ok(Paginate {
            schema: self.series.schema().clone(),
            segments: self.segments()?,
            select: self.params.select.clone(),
            step,
            pos: self.params.offset,
            remaining: self.params.limit,
            done: false,
        })
    }
}

#[derive(Debug)]
pub struct Paginate {
    schema: Schema,
    segments: Vec<Segment>,
    select: Option<Vec<String>>,
    step: usize,
    pos: usize,
    remaining: Option<usize>,
    done: bool,
}

impl Iterator for Paginate {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let limit = match self.remaining {
            Some(remaining) => self.step.min(remaining),
            None => self.step,
        };
        let frame = match Frame::from_segments(
            &self.schema,
            &self.segments,
            Some(limit),
            self.pos,
            self.select.as_deref(),
        ) {
            Ok(frame) => frame,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        if frame.is_empty() {
            self.done = true;
            return None;
        }
        if let Some(remaining) = &mut self.remaining {
            *remaining -= frame.len().min(*remaining);
        }
        self.pos += self.step;
        Some(Ok(frame))
    }
}
