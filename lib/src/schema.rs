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

//! Schemas: an ordered mapping of column name to dtype, codec pipeline
//! and index membership. The ordered index columns form the compound
//! key; the leftmost carries the highest sort weight.

use serde_json::json;

use crate::array::Array;
use crate::array::DataType;
use crate::array::Value;
use crate::codec;
use crate::codec::Codec;
use crate::error::Error;
use crate::error::Result;
use crate::object_id::Digest;

/// `kv` flips write semantics to last-writer-wins merge on the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Default,
    Kv,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    name: String,
    dtype: DataType,
    codecs: Vec<Codec>,
    idx: bool,
}

impl ColumnDef {
    pub fn new(name: &str, dtype: DataType, codecs: Vec<Codec>, idx: bool) -> Result<ColumnDef> {
        let codecs = if codecs.is_empty() {
            codec::default_codecs(dtype)
        } else {
            codecs
        };
        codec::validate(dtype, &codecs)?;
        Ok(ColumnDef {
            name: name.to_string(),
            dtype,
            codecs,
            idx,
        })
    }

    /// Parses a column spec of the shape `"name dtype [*] [| codec …]"`,
    /// `*` marking index membership, e.g. `"timestamp timestamp* | zstd"`.
    pub fn from_spec(spec: &str) -> Result<ColumnDef> {
        let (head, pipeline) = match spec.split_once('|') {
            Some((head, pipeline)) => (head, Some(pipeline)),
            None => (spec, None),
        };
        let mut words = head.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| Error::invariant(format!("empty column spec `{spec}`")))?;
        let mut dtype_token = words
            .next()
            .ok_or_else(|| Error::invariant(format!("column spec `{spec}` is missing a dtype")))?
            .to_string();
        let mut idx = false;
        if let Some(stripped) = dtype_token.strip_suffix('*') {
            dtype_token = stripped.to_string();
            idx = true;
        }
        match words.next() {
            Some("*") => idx = true,
            Some(extra) => {
                return Err(Error::invariant(format!(
                    "unexpected token `{extra}` in column spec `{spec}`"
                )))
            }
            None => {}
        }
        let dtype = DataType::parse(&dtype_token)?;
        let codecs = match pipeline {
            Some(pipeline) => pipeline
                .split_whitespace()
                .map(Codec::parse)
                .collect::<Result<Vec<_>>>()?,
            None => vec![],
        };
        ColumnDef::new(name, dtype, codecs, idx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same definition under another name.
    pub fn renamed(&self, name: &str) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn with_idx(&self, idx: bool) -> ColumnDef {
        ColumnDef {
            idx,
            ..self.clone()
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    pub fn is_idx(&self) -> bool {
        self.idx
    }

    pub fn encode(&self, arr: &Array) -> Result<Vec<u8>> {
        codec::encode_array(&self.codecs, arr)
    }

    pub fn encode_with_digest(&self, arr: &Array) -> Result<(Vec<u8>, Digest)> {
        codec::encode_with_digest(&self.codecs, arr)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Array> {
        codec::decode_array(self.dtype, &self.codecs, payload)
    }

    pub fn parse_value(&self, input: &str) -> Result<Value> {
        self.dtype.parse_value(input)
    }

    fn dump(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "dt": self.dtype.name(),
            "codecs": self.codecs.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "idx": self.idx,
        })
    }

    fn load(data: &serde_json::Value) -> Result<ColumnDef> {
        let bad = || Error::invariant(format!("malformed column definition: {data}"));
        let name = data["name"].as_str().ok_or_else(bad)?;
        let dtype = DataType::parse(data["dt"].as_str().ok_or_else(bad)?)?;
        let codecs = data["codecs"]
            .as_array()
            .ok_or_else(bad)?
            .iter()
            .map(|c| c.as_str().ok_or_else(bad).and_then(Codec::parse))
            .collect::<Result<Vec<_>>>()?;
        let idx = data["idx"].as_bool().ok_or_else(bad)?;
        ColumnDef::new(name, dtype, codecs, idx)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    kind: SchemaKind,
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Schema> {
        Schema::with_kind(SchemaKind::Default, columns)
    }

    pub fn kv(columns: Vec<ColumnDef>) -> Result<Schema> {
        Schema::with_kind(SchemaKind::Kv, columns)
    }

    pub fn with_kind(kind: SchemaKind, columns: Vec<ColumnDef>) -> Result<Schema> {
        if !columns.iter().any(|col| col.idx) {
            return Err(Error::invariant("invalid schema, no index defined"));
        }
        for (pos, col) in columns.iter().enumerate() {
            if col.idx && !col.dtype.is_orderable() {
                return Err(Error::invariant(format!(
                    "{} column `{}` cannot be an index",
                    col.dtype.name(),
                    col.name
                )));
            }
            if columns[..pos].iter().any(|other| other.name == col.name) {
                return Err(Error::invariant(format!(
                    "duplicated column `{}`",
                    col.name
                )));
            }
        }
        Ok(Schema { kind, columns })
    }

    /// Builds a schema from column specs, e.g.
    /// `["timestamp timestamp*", "value float"]`.
    pub fn from_specs(specs: &[&str]) -> Result<Schema> {
        let columns = specs
            .iter()
            .map(|spec| ColumnDef::from_spec(spec))
            .collect::<Result<Vec<_>>>()?;
        Schema::new(columns)
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn idx_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|col| col.idx)
    }

    pub fn idx_len(&self) -> usize {
        self.idx_columns().count()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Parses one textual value per index column, in index order. Fewer
    /// values than index columns form a prefix bound.
    pub fn parse_bound(&self, values: &[String]) -> Result<Vec<Value>> {
        if values.len() > self.idx_len() {
            return Err(Error::invariant(format!(
                "bound has {} values but the index has {} columns",
                values.len(),
                self.idx_len()
            )));
        }
        self.idx_columns()
            .zip(values)
            .map(|(col, value)| col.parse_value(value))
            .collect()
    }

    /// Sub-schema over `names`, kept in schema order. Index validation is
    /// relaxed: projections are read-side artifacts.
    pub fn project(&self, names: &[String]) -> Result<Schema> {
        for name in names {
            if self.position(name).is_none() {
                return Err(Error::not_found("column", name.clone()));
            }
        }
        let columns = self
            .columns
            .iter()
            .filter(|col| names.iter().any(|name| *name == col.name))
            .cloned()
            .collect();
        Ok(Schema {
            kind: self.kind,
            columns,
        })
    }

    pub fn dump(&self) -> serde_json::Value {
        json!({
            "kind": match self.kind {
                SchemaKind::Default => "default",
                SchemaKind::Kv => "kv",
            },
            "columns": self.columns.iter().map(|col| col.dump()).collect::<Vec<_>>(),
        })
    }

    pub fn load(data: &serde_json::Value) -> Result<Schema> {
        let bad = || Error::invariant(format!("malformed schema: {data}"));
        let kind = match data["kind"].as_str() {
            Some("kv") => SchemaKind::Kv,
            Some("default") | None => SchemaKind::Default,
            Some(other) => {
                return Err(Error::invariant(format!("unknown schema kind `{other}`")))
            }
        };
        let columns = data["columns"]
            .as_array()
            .ok_or_else(bad)?
            .iter()
            .map(ColumnDef::load)
            .collect::<Result<Vec<_>>>()?;
        Schema::with_kind(kind, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spec_grammar() {
        let col = ColumnDef::from_spec("stamp timestamp* | zstd").unwrap();
        assert_eq!(col.name(), "stamp");
        assert_eq!(col.dtype(), DataType::Timestamp);
        assert!(col.is_idx());
        assert_eq!(col.codecs(), &[Codec::Zstd]);

        let col = ColumnDef::from_spec("meta O").unwrap();
        assert_eq!(col.dtype(), DataType::Obj);
        assert!(!col.is_idx());
        assert_eq!(col.codecs(), &[Codec::MsgPack, Codec::Zstd]);

        assert!(ColumnDef::from_spec("value").is_err());
        assert!(ColumnDef::from_spec("value float extra").is_err());
    }

    #[test]
    fn test_schema_requires_an_index() {
        assert!(Schema::from_specs(&["value float"]).is_err());
        assert!(Schema::from_specs(&["meta obj*", "value float"]).is_err());
        let schema = Schema::from_specs(&["stamp timestamp*", "value float"]).unwrap();
        assert_eq!(schema.idx_len(), 1);
    }

    #[test]
    fn test_dump_load_round_trip_preserves_order() {
        let schema = Schema::from_specs(&["b int*", "a float", "c str"]).unwrap();
        let back = Schema::load(&schema.dump()).unwrap();
        assert_eq!(back, schema);
        let names: Vec<_> = back.columns().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
