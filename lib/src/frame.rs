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

//! In-memory columnar container with index search, slicing, masking,
//! sorted concat and grouped reduction.

use std::cmp::Ordering;

use crate::array::Array;
use crate::array::DataType;
use crate::array::Value;
use crate::error::Error;
use crate::error::Result;
use crate::pool;
use crate::schema::Schema;
use crate::segment::Segment;

/// Interval endpoint inclusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Closed {
    Left,
    Right,
    Both,
    None,
}

impl Closed {
    pub fn left(&self) -> bool {
        matches!(self, Closed::Left | Closed::Both)
    }

    pub fn right(&self) -> bool {
        matches!(self, Closed::Right | Closed::Both)
    }

    pub fn from_flags(left: bool, right: bool) -> Closed {
        match (left, right) {
            (true, true) => Closed::Both,
            (true, false) => Closed::Left,
            (false, true) => Closed::Right,
            (false, false) => Closed::None,
        }
    }

    /// Inclusion flags of the left remnant after a row is truncated at
    /// its stop side.
    pub fn keep_left(&self) -> Closed {
        Closed::from_flags(self.left(), false)
    }

    /// Inclusion flags of the right remnant after a row is truncated at
    /// its start side.
    pub fn keep_right(&self) -> Closed {
        Closed::from_flags(false, self.right())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Closed::Left => "left",
            Closed::Right => "right",
            Closed::Both => "both",
            Closed::None => "none",
        }
    }

    pub fn parse(name: &str) -> Result<Closed> {
        match name {
            "left" => Ok(Closed::Left),
            "right" => Ok(Closed::Right),
            "both" => Ok(Closed::Both),
            "none" => Ok(Closed::None),
            other => Err(Error::invariant(format!("unknown closed flag `{other}`"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    schema: Schema,
    columns: Vec<Array>,
}

impl Frame {
    pub fn empty(schema: Schema) -> Frame {
        let columns = schema
            .columns()
            .iter()
            .map(|col| col.dtype().empty_array())
            .collect();
        Frame { schema, columns }
    }

    /// Builds a frame from one array per schema column, in schema order.
    /// All columns must agree on dtype and length.
    pub fn new(schema: Schema, columns: Vec<Array>) -> Result<Frame> {
        if columns.len() != schema.columns().len() {
            return Err(Error::invariant(format!(
                "expected {} columns, got {}",
                schema.columns().len(),
                columns.len()
            )));
        }
        let mut len = None;
        for (col, arr) in schema.columns().iter().zip(&columns) {
            if arr.data_type() != col.dtype() {
                return Err(Error::invariant(format!(
                    "column `{}` expects {}, got {}",
                    col.name(),
                    col.dtype().name(),
                    arr.data_type().name()
                )));
            }
            match len {
                None => len = Some(arr.len()),
                Some(len) if len != arr.len() => {
                    return Err(Error::invariant(format!(
                        "column `{}` has {} rows, expected {}",
                        col.name(),
                        arr.len(),
                        len
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(Frame { schema, columns })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.columns.first().map(Array::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Array> {
        self.schema.position(name).map(|pos| &self.columns[pos])
    }

    pub fn columns(&self) -> &[Array] {
        &self.columns
    }

    /// Full row at `pos`, in schema order.
    pub fn row(&self, pos: usize) -> Vec<Value> {
        self.columns.iter().map(|arr| arr.value(pos)).collect()
    }

    /// Index tuple at `pos`.
    pub fn idx_row(&self, pos: usize) -> Vec<Value> {
        self.schema
            .columns()
            .iter()
            .zip(&self.columns)
            .filter(|(col, _)| col.is_idx())
            .map(|(_, arr)| arr.value(pos))
            .collect()
    }

    /// First index tuple, if any.
    pub fn start(&self) -> Option<Vec<Value>> {
        (!self.is_empty()).then(|| self.idx_row(0))
    }

    /// Last index tuple, if any.
    pub fn stop(&self) -> Option<Vec<Value>> {
        (!self.is_empty()).then(|| self.idx_row(self.len() - 1))
    }

    fn idx_arrays(&self) -> Vec<&Array> {
        self.schema
            .columns()
            .iter()
            .zip(&self.columns)
            .filter(|(col, _)| col.is_idx())
            .map(|(_, arr)| arr)
            .collect()
    }

    /// Lexicographic bisect across the index columns. `values` may be a
    /// prefix of the full index tuple; returns the lower bound, or the
    /// upper one with `right`.
    pub fn index(&self, values: &[Value], right: bool) -> usize {
        let mut lo = 0;
        let mut hi = self.len();
        for (arr, value) in self.idx_arrays().into_iter().zip(values) {
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

    /// Positions bracketing `[start, stop]` under the given endpoint
    /// inclusion. Empty bounds are unbounded.
    pub fn index_slice(&self, start: &[Value], stop: &[Value], closed: Closed) -> (usize, usize) {
        let lo = if start.is_empty() {
            0
        } else {
            self.index(start, !closed.left())
        };
        let hi = if stop.is_empty() {
            self.len()
        } else {
            self.index(stop, closed.right())
        };
        (lo, hi.max(lo))
    }

    pub fn slice(&self, lo: usize, hi: usize) -> Frame {
        let columns = self.columns.iter().map(|arr| arr.slice(lo, hi)).collect();
        Frame {
            schema: self.schema.clone(),
            columns,
        }
    }

    pub fn mask(&self, mask: &[bool]) -> Result<Frame> {
        if mask.len() != self.len() {
            return Err(Error::invariant(format!(
                "mask of {} entries over {} rows",
                mask.len(),
                self.len()
            )));
        }
        let columns = self.columns.iter().map(|arr| arr.filter(mask)).collect();
        Ok(Frame {
            schema: self.schema.clone(),
            columns,
        })
    }

    pub fn take(&self, positions: &[usize]) -> Frame {
        let columns = self.columns.iter().map(|arr| arr.take(positions)).collect();
        Frame {
            schema: self.schema.clone(),
            columns,
        }
    }

    fn cmp_rows(&self, i: usize, j: usize) -> Ordering {
        for arr in self.idx_arrays() {
            match arr.cmp_at(i, j) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Stable sort permutation, leftmost index column heaviest.
    pub fn lexsort(&self) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.sort_by(|&i, &j| self.cmp_rows(i, j));
        perm
    }

    pub fn is_sorted(&self) -> bool {
        (1..self.len()).all(|i| self.cmp_rows(i - 1, i) != Ordering::Greater)
    }

    pub fn sorted(&self) -> Frame {
        if self.is_sorted() {
            return self.clone();
        }
        self.take(&self.lexsort())
    }

    /// Concatenates per-column then sorts. Schemas must match exactly.
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let Some(first) = frames.first() else {
            return Err(Error::invariant("cannot concat zero frames"));
        };
        if frames.len() == 1 {
            return Ok(first.clone());
        }
        for frame in &frames[1..] {
            if frame.schema != first.schema {
                return Err(Error::invariant("cannot concat frames with different schemas"));
            }
        }
        let mut columns = vec![];
        for pos in 0..first.columns.len() {
            let parts: Vec<&Array> = frames.iter().map(|frame| &frame.columns[pos]).collect();
            columns.push(Array::concat(&parts)?);
        }
        let frame = Frame {
            schema: first.schema.clone(),
            columns,
        };
        Ok(frame.sorted())
    }

    /// Groups by the non-aggregated specs and evaluates the aggregated
    /// ones over each group. Rows of a group keep their original order,
    /// so `first` is the earliest occurrence.
    pub fn reduce(&self, specs: &[ReduceSpec]) -> Result<Frame> {
        let group_positions: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter_map(|(pos, spec)| spec.agg.is_none().then_some(pos))
            .collect();
        if group_positions.is_empty() {
            return Err(Error::invariant("reduce needs at least one grouping column"));
        }
        let mut sources = vec![];
        let mut source_defs = vec![];
        for spec in specs {
            let pos = self
                .schema
                .position(&spec.column)
                .ok_or_else(|| Error::not_found("column", spec.column.clone()))?;
            sources.push(&self.columns[pos]);
            source_defs.push(&self.schema.columns()[pos]);
        }
        let group_arrays: Vec<&Array> = group_positions.iter().map(|&pos| sources[pos]).collect();
        let cmp_keys = |i: usize, j: usize| -> Ordering {
            for arr in &group_arrays {
                match arr.cmp_at(i, j) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            Ordering::Equal
        };
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.sort_by(|&i, &j| cmp_keys(i, j));

        // Output columns, one per spec.
        let mut defs = vec![];
        let mut outputs = vec![];
        for (pos, spec) in specs.iter().enumerate() {
            let source_dtype = sources[pos].data_type();
            // Grouping columns form the output index; aggregates that
            // keep their dtype also keep their codec pipeline so a
            // reduced frame stays writable under the source schema.
            let def = match &spec.agg {
                None => source_defs[pos].renamed(&spec.alias).with_idx(true),
                Some(agg) => {
                    let dtype = agg.output_dtype(source_dtype)?;
                    if dtype == source_dtype {
                        source_defs[pos].renamed(&spec.alias).with_idx(false)
                    } else {
                        crate::schema::ColumnDef::new(&spec.alias, dtype, vec![], false)?
                    }
                }
            };
            outputs.push(def.dtype().empty_array());
            defs.push(def);
        }

        let mut run_start = 0;
        while run_start < perm.len() {
            let mut run_stop = run_start + 1;
            while run_stop < perm.len() && cmp_keys(perm[run_start], perm[run_stop]) == Ordering::Equal
            {
                run_stop += 1;
            }
            let run = &perm[run_start..run_stop];
            for (pos, spec) in specs.iter().enumerate() {
                let value = match &spec.agg {
                    None => sources[pos].value(run[0]),
                    Some(agg) => agg.eval(sources[pos], run)?,
                };
                outputs[pos].push(value)?;
            }
            run_start = run_stop;
        }
        Frame::new(Schema::with_kind(self.schema.kind(), defs)?, outputs)
    }

    /// Concatenates per-column arrays from ordered segments, honoring
    /// limit and offset. Column reads may run in parallel.
    pub fn from_segments(
        schema: &Schema,
        segments: &[Segment],
        limit: Option<usize>,
        offset: usize,
        select: Option<&[String]>,
    ) -> Result<Frame> {
        let out_schema = match select {
            Some(names) => schema.project(names)?,
            None => schema.clone(),
        };
        if segments.is_empty() {
            return Ok(Frame::empty(out_schema));
        }
        let lens = segments
            .iter()
            .map(Segment::len)
            .collect::<Result<Vec<usize>>>()?;
        let lens = &lens;
        let tasks: Vec<_> = out_schema
            .columns()
            .iter()
            .map(|col| {
                let name = col.name().to_string();
                let dtype = col.dtype();
                move || read_column(segments, lens, &name, dtype, limit, offset)
            })
            .collect();
        let columns = pool::run(tasks).into_iter().collect::<Result<Vec<_>>>()?;
        Frame::new(out_schema, columns)
    }
}

fn read_column(
    segments: &[Segment],
    lens: &[usize],
    name: &str,
    dtype: DataType,
    limit: Option<usize>,
    offset: usize,
) -> Result<Array> {
    let total: usize = lens.iter().sum();
    let mut start = offset;
    let mut stop = match limit {
        Some(limit) => offset + limit,
        None => total + 1,
    };
    let mut parts = vec![];
    for (segment, &len) in segments.iter().zip(lens) {
        if stop == 0 {
            break;
        }
        if start >= len {
            start -= len;
            stop = stop.saturating_sub(len);
            continue;
        }
        parts.push(segment.read(name, start, stop)?);
        start = 0;
        stop = stop.saturating_sub(len);
    }
    if parts.is_empty() {
        return Ok(dtype.empty_array());
    }
    let refs: Vec<&Array> = parts.iter().collect();
    Array::concat(&refs)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    First,
    Last,
    Min,
    Max,
    Sum,
    Mean,
    Count,
}

impl Aggregate {
    pub fn parse(name: &str) -> Result<Aggregate> {
        match name {
            "first" => Ok(Aggregate::First),
            "last" => Ok(Aggregate::Last),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "sum" => Ok(Aggregate::Sum),
            "mean" | "average" => Ok(Aggregate::Mean),
            "count" => Ok(Aggregate::Count),
            other => Err(Error::invariant(format!("unknown aggregate `{other}`"))),
        }
    }

    fn output_dtype(&self, source: DataType) -> Result<DataType> {
        match self {
            Aggregate::Count => Ok(DataType::Int),
            Aggregate::Mean => match source {
                DataType::Int | DataType::Float => Ok(DataType::Float),
                other => Err(Error::invariant(format!(
                    "cannot average {} column",
                    other.name()
                ))),
            },
            Aggregate::Sum => match source {
                DataType::Int | DataType::Float => Ok(source),
                other => Err(Error::invariant(format!("cannot sum {} column", other.name()))),
            },
            _ => Ok(source),
        }
    }

    fn eval(&self, arr: &Array, run: &[usize]) -> Result<Value> {
        match self {
            Aggregate::First => Ok(arr.value(run[0])),
            Aggregate::Last => Ok(arr.value(run[run.len() - 1])),
            Aggregate::Count => Ok(Value::Int(run.len() as i64)),
            Aggregate::Min => Ok(run
                .iter()
                .map(|&pos| arr.value(pos))
                .min()
                .expect("non-empty group")),
            Aggregate::Max => Ok(run
                .iter()
                .map(|&pos| arr.value(pos))
                .max()
                .expect("non-empty group")),
            Aggregate::Sum | Aggregate::Mean => {
                let sum = match arr {
                    Array::Int(values) => {
                        Value::Int(run.iter().map(|&pos| values[pos]).sum::<i64>())
                    }
                    Array::Float(values) => {
                        Value::Float(run.iter().map(|&pos| values[pos]).sum::<f64>())
                    }
                    other => {
                        return Err(Error::invariant(format!(
                            "cannot sum {} column",
                            other.data_type().name()
                        )))
                    }
                };
                if *self == Aggregate::Sum {
                    return Ok(sum);
                }
                let total = match sum {
                    Value::Int(v) => v as f64,
                    Value::Float(v) => v,
                    _ => unreachable!(),
                };
                Ok(Value::Float(total / run.len() as f64))
            }
        }
    }
}

/// One output column of a [`Frame::reduce`] call. `agg == None` marks a
/// grouping column.
#[derive(Clone, Debug)]
pub struct ReduceSpec {
    pub alias: String,
    pub column: String,
    pub agg: Option<Aggregate>,
}

impl ReduceSpec {
    pub fn group(column: &str) -> ReduceSpec {
        ReduceSpec {
            alias: column.to_string(),
            column: column.to_string(),
            agg: None,
        }
    }

    pub fn agg(alias: &str, column: &str, agg: Aggregate) -> ReduceSpec {
        ReduceSpec {
            alias: alias.to_string(),
            column: column.to_string(),
            agg: Some(agg),
        }
    }
}
