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

//! Commit records: ordered sets of revision rows with per-label,
//! per-range overwrite semantics.
//!
//! A commit is stored as parallel arrays sorted by `(label, start)`.
//! Within one commit, rows of a given label never overlap; `update`
//! maintains that invariant by truncating or splitting the rows an
//! insertion shadows.

use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools as _;
use serde::Deserialize;
use serde::Serialize;
use serde_bytes::ByteBuf;

use crate::array::cmp_prefix;
use crate::array::cmp_values;
use crate::array::Array;
use crate::array::DataType;
use crate::array::Value;
use crate::codec;
use crate::codec::Codec;
use crate::error::Error;
use crate::error::Result;
use crate::frame::Closed;
use crate::object_id::Digest;
use crate::pod::Pod;
use crate::schema::Schema;
use crate::segment::Segment;

/// One revision row: a contiguous index range of one series, with the
/// per-column digests backing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevRow {
    pub label: String,
    pub start: Vec<Value>,
    pub stop: Vec<Value>,
    pub digest: Vec<Digest>,
    pub length: u64,
    pub closed: Closed,
}

#[derive(Clone, Debug)]
pub struct Commit {
    schema: Schema,
    label: Vec<String>,
    start: Vec<Array>,
    stop: Vec<Array>,
    digest: Vec<Vec<Digest>>,
    length: Vec<u64>,
    closed: Vec<Closed>,
}

/// Codecs for the bookkeeping arrays of the payload.
const TEXT_CODECS: [Codec; 2] = [Codec::MsgPack, Codec::Zstd];
const LEN_CODECS: [Codec; 1] = [Codec::Zstd];

fn cmp_key(label_a: &str, tuple_a: &[Value], label_b: &str, tuple_b: &[Value]) -> Ordering {
    label_a
        .cmp(label_b)
        .then_with(|| cmp_values(tuple_a, tuple_b))
}

impl Commit {
    pub fn empty(schema: Schema) -> Commit {
        let start = schema
            .idx_columns()
            .map(|col| col.dtype().empty_array())
            .collect::<Vec<_>>();
        let stop = start.clone();
        let digest = vec![vec![]; schema.columns().len()];
        Commit {
            schema,
            label: vec![],
            start,
            stop,
            digest,
            length: vec![],
            closed: vec![],
        }
    }

    pub fn one(schema: Schema, row: RevRow) -> Result<Commit> {
        if row.digest.len() != schema.columns().len() {
            return Err(Error::invariant(format!(
                "row carries {} digests for {} columns",
                row.digest.len(),
                schema.columns().len()
            )));
        }
        if row.start.len() != schema.idx_len() || row.stop.len() != schema.idx_len() {
            return Err(Error::invariant(
                "row bounds do not span the index columns",
            ));
        }
        let mut commit = Commit::empty(schema);
        for (arr, value) in commit.start.iter_mut().zip(row.start) {
            arr.push(value)?;
        }
        for (arr, value) in commit.stop.iter_mut().zip(row.stop) {
            arr.push(value)?;
        }
        for (digests, digest) in commit.digest.iter_mut().zip(row.digest) {
            digests.push(digest);
        }
        commit.label.push(row.label);
        commit.length.push(row.length);
        commit.closed.push(row.closed);
        Ok(commit)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }

    fn row_start(&self, pos: usize) -> Vec<Value> {
        self.start.iter().map(|arr| arr.value(pos)).collect()
    }

    fn row_stop(&self, pos: usize) -> Vec<Value> {
        self.stop.iter().map(|arr| arr.value(pos)).collect()
    }

    pub fn at(&self, pos: usize) -> RevRow {
        RevRow {
            label: self.label[pos].clone(),
            start: self.row_start(pos),
            stop: self.row_stop(pos),
            digest: self.digest.iter().map(|digests| digests[pos]).collect(),
            length: self.length[pos],
            closed: self.closed[pos],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = RevRow> + '_ {
        (0..self.len()).map(|pos| self.at(pos))
    }

    /// Sorted unique labels of this commit.
    pub fn labels(&self) -> Vec<String> {
        self.label.iter().unique().sorted().cloned().collect()
    }

    pub fn digests(&self) -> impl Iterator<Item = &Digest> + '_ {
        self.digest.iter().flatten()
    }

    /// Positions bracketing the replacement zone of `[start, stop]` for
    /// `label`, under the `(label, bound)` ordering.
    pub fn split(&self, label: &str, start: &[Value], stop: &[Value]) -> (usize, usize) {
        let start_pos = partition_point(self.len(), |pos| {
            cmp_key(&self.label[pos], &self.row_stop(pos), label, start) != Ordering::Greater
        });
        let stop_pos = partition_point(self.len(), |pos| {
            cmp_key(&self.label[pos], &self.row_start(pos), label, stop) == Ordering::Less
        });
        (start_pos, stop_pos)
    }

    fn slice(&self, lo: usize, hi: usize) -> Commit {
        Commit {
            schema: self.schema.clone(),
            label: self.label[lo..hi].to_vec(),
            start: self.start.iter().map(|arr| arr.slice(lo, hi)).collect(),
            stop: self.stop.iter().map(|arr| arr.slice(lo, hi)).collect(),
            digest: self
                .digest
                .iter()
                .map(|digests| digests[lo..hi].to_vec())
                .collect(),
            length: self.length[lo..hi].to_vec(),
            closed: self.closed[lo..hi].to_vec(),
        }
    }

    fn head(&self, pos: usize) -> Commit {
        self.slice(0, pos.min(self.len()))
    }

    fn tail(&self, pos: usize) -> Commit {
        self.slice(pos.min(self.len()), self.len())
    }

    /// Concatenates commits, asserting no overlap at the seams.
    pub fn concat(parts: &[&Commit]) -> Result<Commit> {
        let Some(first) = parts.first() else {
            return Err(Error::invariant("cannot concat zero commits"));
        };
        let parts: Vec<&Commit> = parts.iter().filter(|ci| !ci.is_empty()).copied().collect();
        if parts.is_empty() {
            return Ok(Commit::empty(first.schema.clone()));
        }
        for pair in parts.windows(2) {
            let prev = pair[0].at(pair[0].len() - 1);
            let next = pair[1].at(0);
            if cmp_key(&prev.label, &prev.stop, &next.label, &next.start) == Ordering::Greater {
                return Err(Error::invariant(format!(
                    "overlapping commit seam: `{}` {:?} over `{}` {:?}",
                    prev.label, prev.stop, next.label, next.start
                )));
            }
        }
        let schema = parts[0].schema.clone();
        let mut out = Commit::empty(schema);
        for part in &parts {
            out.label.extend_from_slice(&part.label);
            out.length.extend_from_slice(&part.length);
            out.closed.extend_from_slice(&part.closed);
            for (acc, digests) in out.digest.iter_mut().zip(&part.digest) {
                acc.extend_from_slice(digests);
            }
        }
        for pos in 0..out.start.len() {
            let starts: Vec<&Array> = parts.iter().map(|part| &part.start[pos]).collect();
            let stops: Vec<&Array> = parts.iter().map(|part| &part.stop[pos]).collect();
            out.start[pos] = Array::concat(&starts)?;
            out.stop[pos] = Array::concat(&stops)?;
        }
        Ok(out)
    }

    /// Inserts a row, overwriting any portion of existing rows of the
    /// same label whose range intersects it.
    pub fn update(&self, row: RevRow) -> Result<Commit> {
        if cmp_values(&row.start, &row.stop) == Ordering::Greater {
            return Err(Error::invariant(format!(
                "invalid range {:?} -> {:?}",
                row.start, row.stop
            )));
        }
        let inner = Commit::one(self.schema.clone(), row.clone())?;
        if self.is_empty() {
            return Ok(inner);
        }

        let first = self.at(0);
        let last = self.at(self.len() - 1);
        if cmp_key(&row.label, &row.start, &first.label, &first.start) != Ordering::Greater
            && cmp_key(&row.label, &row.stop, &last.label, &last.stop) != Ordering::Less
        {
            // The new row supersedes everything.
            return Ok(inner);
        }

        let (start_pos, stop_pos) = self.split(&row.label, &row.start, &row.stop);

        // The new interval lands strictly inside a single existing row:
        // split that row in two around it.
        if start_pos + 1 == stop_pos {
            let hit = self.at(start_pos);
            if hit.label == row.label
                && cmp_values(&hit.start, &row.start) == Ordering::Less
                && cmp_values(&row.stop, &hit.stop) == Ordering::Less
            {
                let mut left = hit.clone();
                left.stop = row.start.clone();
                left.closed = hit.closed.keep_left();
                let mut right = hit;
                right.start = row.stop.clone();
                right.closed = right.closed.keep_right();
                return Commit::concat(&[
                    &self.head(start_pos),
                    &Commit::one(self.schema.clone(), left)?,
                    &inner,
                    &Commit::one(self.schema.clone(), right)?,
                    &self.tail(stop_pos),
                ]);
            }
        }

        // Truncate the row hit on the left of the replacement zone.
        let mut head = self.head(start_pos);
        if start_pos < self.len() {
            let hit = self.at(start_pos);
            if hit.label == row.label
                && cmp_values(&hit.start, &row.start) == Ordering::Less
                && cmp_values(&row.start, &hit.stop) != Ordering::Greater
            {
                let mut left = hit;
                left.stop = row.start.clone();
                left.closed = left.closed.keep_left();
                if cmp_values(&left.start, &left.stop) == Ordering::Less {
                    head = Commit::concat(&[&head, &Commit::one(self.schema.clone(), left)?])?;
                }
            }
        }

        // Truncate the row hit on the right of the replacement zone.
        let mut tail = self.tail(stop_pos);
        if stop_pos > 0 && stop_pos <= self.len() {
            let hit = self.at(stop_pos - 1);
            if hit.label == row.label
                && cmp_values(&hit.start, &row.stop) != Ordering::Greater
                && cmp_values(&row.stop, &hit.stop) == Ordering::Less
            {
                let mut right = hit;
                right.start = row.stop.clone();
                right.closed = right.closed.keep_right();
                if cmp_values(&right.start, &right.stop) == Ordering::Less {
                    tail = Commit::concat(&[&Commit::one(self.schema.clone(), right)?, &tail])?;
                }
            }
        }

        Commit::concat(&[&head, &inner, &tail])
    }

    /// Segments of `label` whose range intersects `[start, stop]`,
    /// clipped to the intersection and carrying the row's closed flag.
    pub fn segments(
        &self,
        label: &str,
        pod: &Arc<dyn Pod>,
        start: &[Value],
        stop: &[Value],
    ) -> Result<Vec<Segment>> {
        let mut out = vec![];
        for pos in 0..self.len() {
            if self.label[pos] != label {
                continue;
            }
            let row_start = self.row_start(pos);
            let row_stop = self.row_stop(pos);
            if !start.is_empty() && cmp_prefix(&row_stop, start) == Ordering::Less {
                continue;
            }
            if !stop.is_empty() && cmp_prefix(&row_start, stop) == Ordering::Greater {
                continue;
            }
            let clip_start = if !start.is_empty()
                && cmp_values(&row_start, start) == Ordering::Less
            {
                start.to_vec()
            } else {
                row_start
            };
            let clip_stop = if !stop.is_empty() && cmp_values(&row_stop, stop) == Ordering::Greater
            {
                stop.to_vec()
            } else {
                row_stop
            };
            out.push(Segment::new(
                self.schema.clone(),
                pod.clone(),
                self.digest.iter().map(|digests| digests[pos]).collect(),
                clip_start,
                clip_stop,
                self.closed[pos],
            )?);
        }
        Ok(out)
    }

    /// Keeps only the rows whose label is not listed.
    pub fn delete_labels(&self, labels: &[&str]) -> Commit {
        let keep: Vec<bool> = self
            .label
            .iter()
            .map(|label| !labels.contains(&label.as_str()))
            .collect();
        let positions: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(pos, keep)| keep.then_some(pos))
            .collect();
        Commit {
            schema: self.schema.clone(),
            label: positions.iter().map(|&pos| self.label[pos].clone()).collect(),
            start: self.start.iter().map(|arr| arr.take(&positions)).collect(),
            stop: self.stop.iter().map(|arr| arr.take(&positions)).collect(),
            digest: self
                .digest
                .iter()
                .map(|digests| positions.iter().map(|&pos| digests[pos]).collect())
                .collect(),
            length: positions.iter().map(|&pos| self.length[pos]).collect(),
            closed: positions.iter().map(|&pos| self.closed[pos]).collect(),
        }
    }

    /// Membership by `(label, start, stop, digest)`.
    pub fn contains(&self, row: &RevRow) -> bool {
        let (start_pos, _) = self.split(&row.label, &row.start, &row.stop);
        if start_pos >= self.len() {
            return false;
        }
        let candidate = self.at(start_pos);
        candidate.label == row.label
            && candidate.start == row.start
            && candidate.stop == row.stop
            && candidate.digest == row.digest
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut start = IndexMap::new();
        let mut stop = IndexMap::new();
        for (col, (starts, stops)) in self
            .schema
            .idx_columns()
            .zip(self.start.iter().zip(&self.stop))
        {
            start.insert(col.name().to_string(), ByteBuf::from(col.encode(starts)?));
            stop.insert(col.name().to_string(), ByteBuf::from(col.encode(stops)?));
        }
        let mut digest = IndexMap::new();
        for (col, digests) in self.schema.columns().iter().zip(&self.digest) {
            let arr = Array::Str(digests.iter().map(Digest::hex).collect());
            digest.insert(
                col.name().to_string(),
                ByteBuf::from(codec::encode_array(&TEXT_CODECS, &arr)?),
            );
        }
        let length = Array::Int(self.length.iter().map(|&len| len as i64).collect());
        let closed = Array::Str(self.closed.iter().map(|c| c.name().to_string()).collect());
        let label = Array::Str(self.label.clone());
        let payload = Payload {
            start,
            stop,
            digest,
            length: ByteBuf::from(codec::encode_array(&LEN_CODECS, &length)?),
            closed: ByteBuf::from(codec::encode_array(&TEXT_CODECS, &closed)?),
            label: ByteBuf::from(codec::encode_array(&TEXT_CODECS, &label)?),
        };
        Ok(rmp_serde::to_vec_named(&vec![payload])?)
    }

    pub fn decode(schema: Schema, payload: &[u8]) -> Result<Commit> {
        let mut decoded: Vec<Payload> = rmp_serde::from_slice(payload)?;
        let payload = decoded
            .pop()
            .ok_or_else(|| Error::Integrity("empty commit payload".to_string()))?;
        let missing = |name: &str| Error::Integrity(format!("commit payload misses `{name}`"));
        let mut start = vec![];
        let mut stop = vec![];
        for col in schema.idx_columns() {
            let bytes = payload
                .start
                .get(col.name())
                .ok_or_else(|| missing(col.name()))?;
            start.push(col.decode(bytes)?);
            let bytes = payload
                .stop
                .get(col.name())
                .ok_or_else(|| missing(col.name()))?;
            stop.push(col.decode(bytes)?);
        }
        let mut digest = vec![];
        for col in schema.columns() {
            let bytes = payload
                .digest
                .get(col.name())
                .ok_or_else(|| missing(col.name()))?;
            let Array::Str(hexes) = codec::decode_array(DataType::Str, &TEXT_CODECS, bytes)?
            else {
                return Err(Error::Integrity("malformed digest column".to_string()));
            };
            let digests = hexes
                .iter()
                .map(|hex| {
                    Digest::from_hex(hex)
                        .ok_or_else(|| Error::Integrity(format!("bad digest `{hex}`")))
                })
                .collect::<Result<Vec<_>>>()?;
            digest.push(digests);
        }
        let Array::Int(length) = codec::decode_array(DataType::Int, &LEN_CODECS, &payload.length)?
        else {
            return Err(Error::Integrity("malformed length column".to_string()));
        };
        let Array::Str(closed) = codec::decode_array(DataType::Str, &TEXT_CODECS, &payload.closed)?
        else {
            return Err(Error::Integrity("malformed closed column".to_string()));
        };
        let Array::Str(label) = codec::decode_array(DataType::Str, &TEXT_CODECS, &payload.label)?
        else {
            return Err(Error::Integrity("malformed label column".to_string()));
        };
        let closed = closed
            .iter()
            .map(|name| Closed::parse(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Commit {
            schema,
            label,
            start,
            stop,
            digest,
            length: length.into_iter().map(|len| len as u64).collect(),
            closed,
        })
    }
}

/// Single-element list holding a map of per-column encoded arrays; see
/// the on-disk format notes in the crate docs.
#[derive(Serialize, Deserialize)]
struct Payload {
    start: IndexMap<String, ByteBuf>,
    stop: IndexMap<String, ByteBuf>,
    digest: IndexMap<String, ByteBuf>,
    length: ByteBuf,
    closed: ByteBuf,
    label: ByteBuf,
}

fn partition_point(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let mut lo = 0;
    let mut hi = n;
    while lo < hi {
        let mid = (lo + hi) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
