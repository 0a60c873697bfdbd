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

//! Dynamic column types: a tagged variant over the supported dtypes,
//! with scalar [`Value`]s for index tuples and contiguous [`Array`]
//! buffers for column data.

use std::cmp::Ordering;

use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;

use crate::error::Error;
use crate::error::Result;

/// Supported column dtypes. `Timestamp` is `datetime64[s]` (seconds
/// since epoch), `Date` is `datetime64[D]` (days since epoch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Float,
    Timestamp,
    Date,
    Str,
    Obj,
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Parses `input` into seconds since epoch, accepting the same datetime
/// shapes the CLI does plus a raw integer.
pub fn parse_timestamp(input: &str) -> Result<i64> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    input
        .parse::<i64>()
        .map_err(|_| Error::invariant(format!("unable to parse `{input}` as datetime")))
}

impl DataType {
    pub fn parse(name: &str) -> Result<DataType> {
        match name {
            "int" | "i8" | "int64" => Ok(DataType::Int),
            "float" | "f8" | "float64" => Ok(DataType::Float),
            "timestamp" | "M8[s]" | "datetime64[s]" => Ok(DataType::Timestamp),
            "date" | "M8[D]" | "datetime64[D]" => Ok(DataType::Date),
            "str" | "U" => Ok(DataType::Str),
            "obj" | "O" | "object" => Ok(DataType::Obj),
            other => Err(Error::invariant(format!("unknown dtype `{other}`"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "int64",
            DataType::Float => "float64",
            DataType::Timestamp => "datetime64[s]",
            DataType::Date => "datetime64[D]",
            DataType::Str => "str",
            DataType::Obj => "object",
        }
    }

    /// Numeric dtypes are backed by fixed-width little-endian buffers and
    /// hash on their raw bytes.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::Timestamp | DataType::Date
        )
    }

    /// Whether values of this dtype form a total order usable in a
    /// compound index.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, DataType::Obj)
    }

    pub fn empty_array(&self) -> Array {
        match self {
            DataType::Int => Array::Int(vec![]),
            DataType::Float => Array::Float(vec![]),
            DataType::Timestamp => Array::Timestamp(vec![]),
            DataType::Date => Array::Date(vec![]),
            DataType::Str => Array::Str(vec![]),
            DataType::Obj => Array::Obj(vec![]),
        }
    }

    /// Parses one textual value (CLI bounds, CSV cells) into this dtype.
    pub fn parse_value(&self, input: &str) -> Result<Value> {
        match self {
            DataType::Int => input
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::invariant(format!("unable to parse `{input}` as int"))),
            DataType::Float => input
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| Error::invariant(format!("unable to parse `{input}` as float"))),
            DataType::Timestamp => parse_timestamp(input).map(Value::Timestamp),
            DataType::Date => {
                if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
                    Ok(Value::Date((date - epoch_date()).num_days()))
                } else {
                    input
                        .parse::<i64>()
                        .map(Value::Date)
                        .map_err(|_| Error::invariant(format!("unable to parse `{input}` as date")))
                }
            }
            DataType::Str => Ok(Value::Str(input.to_string())),
            DataType::Obj => Ok(serde_json::from_str(input)
                .map(Value::Obj)
                .unwrap_or_else(|_| Value::Obj(serde_json::Value::String(input.to_string())))),
        }
    }
}

/// One scalar cell.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Timestamp(i64),
    Date(i64),
    Str(String),
    Obj(serde_json::Value),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Date(_) => DataType::Date,
            Value::Str(_) => DataType::Str,
            Value::Obj(_) => DataType::Obj,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Date(_) => 3,
            Value::Str(_) => 4,
            Value::Obj(_) => 5,
        }
    }

    /// Textual rendering, CSV-friendly and re-parseable by
    /// [`DataType::parse_value`].
    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Timestamp(v) => DateTime::from_timestamp(*v, 0)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_else(|| v.to_string()),
            Value::Date(v) => epoch_date()
                .checked_add_signed(Duration::days(*v))
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| v.to_string()),
            Value::Str(v) => v.clone(),
            Value::Obj(v) => v.to_string(),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Obj(a), Value::Obj(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

/// Lexicographic comparison of index tuples; a tuple that is a strict
/// prefix of another sorts before it, like Python tuples.
pub fn cmp_values(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// Comparison over the common prefix only: a shorter bound matches every
/// tuple it prefixes.
pub fn cmp_prefix(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// One column worth of contiguous values.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Timestamp(Vec<i64>),
    Date(Vec<i64>),
    Str(Vec<String>),
    Obj(Vec<serde_json::Value>),
}

macro_rules! per_variant {
    ($self:expr, $values:pat => $body:expr) => {
        match $self {
            Array::Int($values) => $body,
            Array::Float($values) => $body,
            Array::Timestamp($values) => $body,
            Array::Date($values) => $body,
            Array::Str($values) => $body,
            Array::Obj($values) => $body,
        }
    };
}

impl Array {
    pub fn data_type(&self) -> DataType {
        match self {
            Array::Int(_) => DataType::Int,
            Array::Float(_) => DataType::Float,
            Array::Timestamp(_) => DataType::Timestamp,
            Array::Date(_) => DataType::Date,
            Array::Str(_) => DataType::Str,
            Array::Obj(_) => DataType::Obj,
        }
    }

    pub fn len(&self) -> usize {
        per_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, pos: usize) -> Value {
        match self {
            Array::Int(values) => Value::Int(values[pos]),
            Array::Float(values) => Value::Float(values[pos]),
            Array::Timestamp(values) => Value::Timestamp(values[pos]),
            Array::Date(values) => Value::Date(values[pos]),
            Array::Str(values) => Value::Str(values[pos].clone()),
            Array::Obj(values) => Value::Obj(values[pos].clone()),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (Array::Int(values), Value::Int(v)) => values.push(v),
            (Array::Float(values), Value::Float(v)) => values.push(v),
            (Array::Timestamp(values), Value::Timestamp(v)) => values.push(v),
            (Array::Date(values), Value::Date(v)) => values.push(v),
            (Array::Str(values), Value::Str(v)) => values.push(v),
            (Array::Obj(values), Value::Obj(v)) => values.push(v),
            (array, value) => {
                return Err(Error::invariant(format!(
                    "cannot push {} value into {} column",
                    value.data_type().name(),
                    array.data_type().name()
                )))
            }
        }
        Ok(())
    }

    pub fn slice(&self, lo: usize, hi: usize) -> Array {
        match self {
            Array::Int(values) => Array::Int(values[lo..hi].to_vec()),
            Array::Float(values) => Array::Float(values[lo..hi].to_vec()),
            Array::Timestamp(values) => Array::Timestamp(values[lo..hi].to_vec()),
            Array::Date(values) => Array::Date(values[lo..hi].to_vec()),
            Array::Str(values) => Array::Str(values[lo..hi].to_vec()),
            Array::Obj(values) => Array::Obj(values[lo..hi].to_vec()),
        }
    }

    pub fn take(&self, positions: &[usize]) -> Array {
        match self {
            Array::Int(values) => Array::Int(positions.iter().map(|&i| values[i]).collect()),
            Array::Float(values) => Array::Float(positions.iter().map(|&i| values[i]).collect()),
            Array::Timestamp(values) => {
                Array::Timestamp(positions.iter().map(|&i| values[i]).collect())
            }
            Array::Date(values) => Array::Date(positions.iter().map(|&i| values[i]).collect()),
            Array::Str(values) => {
                Array::Str(positions.iter().map(|&i| values[i].clone()).collect())
            }
            Array::Obj(values) => {
                Array::Obj(positions.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Array {
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&positions)
    }

    pub fn concat(parts: &[&Array]) -> Result<Array> {
        let Some(first) = parts.first() else {
            return Err(Error::invariant("cannot concat zero arrays"));
        };
        let mut out = first.data_type().empty_array();
        for part in parts {
            if part.data_type() != out.data_type() {
                return Err(Error::invariant(format!(
                    "cannot concat {} array with {} array",
                    out.data_type().name(),
                    part.data_type().name()
                )));
            }
            match (&mut out, part) {
                (Array::Int(acc), Array::Int(values)) => acc.extend_from_slice(values),
                (Array::Float(acc), Array::Float(values)) => acc.extend_from_slice(values),
                (Array::Timestamp(acc), Array::Timestamp(values)) => acc.extend_from_slice(values),
                (Array::Date(acc), Array::Date(values)) => acc.extend_from_slice(values),
                (Array::Str(acc), Array::Str(values)) => acc.extend_from_slice(values),
                (Array::Obj(acc), Array::Obj(values)) => acc.extend_from_slice(values),
                _ => unreachable!(),
            }
        }
        Ok(out)
    }

    /// Compares two cells of the same array without materializing
    /// [`Value`]s.
    pub fn cmp_at(&self, i: usize, j: usize) -> Ordering {
        match self {
            Array::Int(values) | Array::Timestamp(values) | Array::Date(values) => {
                values[i].cmp(&values[j])
            }
            Array::Float(values) => values[i].total_cmp(&values[j]),
            Array::Str(values) => values[i].cmp(&values[j]),
            Array::Obj(values) => values[i].to_string().cmp(&values[j].to_string()),
        }
    }

    /// Bisects the sorted range `[lo, hi)`. With `right` the upper bound
    /// of the run equal to `value` is returned, otherwise the lower one.
    pub fn bisect(&self, value: &Value, lo: usize, hi: usize, right: bool) -> usize {
        fn cut<T>(values: &[T], lo: usize, hi: usize, pred: impl Fn(&T) -> bool) -> usize {
            lo + values[lo..hi].partition_point(pred)
        }
        match (self, value) {
            (Array::Int(values), Value::Int(v)) => {
                cut(values, lo, hi, |e| if right { e <= v } else { e < v })
            }
            (Array::Timestamp(values), Value::Timestamp(v)) => {
                cut(values, lo, hi, |e| if right { e <= v } else { e < v })
            }
            (Array::Date(values), Value::Date(v)) => {
                cut(values, lo, hi, |e| if right { e <= v } else { e < v })
            }
            (Array::Float(values), Value::Float(v)) => cut(values, lo, hi, |e| {
                let ord = e.total_cmp(v);
                if right {
                    ord != Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }),
            (Array::Str(values), Value::Str(v)) => cut(values, lo, hi, |e| {
                if right {
                    e.as_str() <= v.as_str()
                } else {
                    e.as_str() < v.as_str()
                }
            }),
            _ => lo,
        }
    }

    /// Raw little-endian bytes of a numeric column. This is the byte
    /// stream numeric digests are computed over.
    pub fn to_le_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() * 8);
        match self {
            Array::Int(values) | Array::Timestamp(values) | Array::Date(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Array::Float(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            other => {
                return Err(Error::invariant(format!(
                    "{} column has no fixed-width representation",
                    other.data_type().name()
                )))
            }
        }
        Ok(out)
    }

    pub fn from_le_bytes(dtype: DataType, bytes: &[u8]) -> Result<Array> {
        if bytes.len() % 8 != 0 {
            return Err(Error::Integrity(format!(
                "numeric column payload of {} bytes is not a multiple of 8",
                bytes.len()
            )));
        }
        let ints = || {
            bytes
                .chunks_exact(8)
                .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
                .collect::<Vec<i64>>()
        };
        match dtype {
            DataType::Int => Ok(Array::Int(ints())),
            DataType::Timestamp => Ok(Array::Timestamp(ints())),
            DataType::Date => Ok(Array::Date(ints())),
            DataType::Float => Ok(Array::Float(
                bytes
                    .chunks_exact(8)
                    .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
                    .collect(),
            )),
            other => Err(Error::invariant(format!(
                "{} column has no fixed-width representation",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_ordering_matches_prefix_semantics() {
        let short = vec![Value::Int(5)];
        let long = vec![Value::Int(5), Value::Int(3)];
        assert_eq!(cmp_values(&short, &long), Ordering::Less);
        assert_eq!(cmp_prefix(&short, &long), Ordering::Equal);
        assert_eq!(cmp_prefix(&long, &short), Ordering::Equal);
        assert_eq!(
            cmp_values(&[Value::Int(6)], &long),
            Ordering::Greater
        );
    }

    #[test]
    fn test_bisect_bounds() {
        let arr = Array::Int(vec![1, 2, 2, 4]);
        assert_eq!(arr.bisect(&Value::Int(2), 0, 4, false), 1);
        assert_eq!(arr.bisect(&Value::Int(2), 0, 4, true), 3);
        assert_eq!(arr.bisect(&Value::Int(3), 0, 4, false), 3);
        assert_eq!(arr.bisect(&Value::Int(5), 0, 4, true), 4);
    }

    #[test]
    fn test_timestamp_parse_render_round_trip() {
        let v = DataType::Timestamp.parse_value("1970-01-01T00:00:03").unwrap();
        assert_eq!(v, Value::Timestamp(3));
        assert_eq!(v.render(), "1970-01-01T00:00:03");
        assert_eq!(
            DataType::Date.parse_value("1970-01-11").unwrap(),
            Value::Date(10)
        );
    }

    #[test]
    fn test_numeric_round_trip_le_bytes() {
        let arr = Array::Float(vec![1.5, -2.0]);
        let bytes = arr.to_le_bytes().unwrap();
        assert_eq!(Array::from_le_bytes(DataType::Float, &bytes).unwrap(), arr);
    }
}
