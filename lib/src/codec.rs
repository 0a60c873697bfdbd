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

//! Per-column codec pipelines.
//!
//! A pipeline is an ordered codec list: encode applies in order, decode
//! in reverse. `msgpack` and `vlen-utf8` are array codecs and may only
//! open a pipeline; the remaining codecs transform raw bytes. Numeric
//! columns enter the pipeline as their little-endian buffer.

use std::io::Read as _;
use std::io::Write as _;

use crate::array::Array;
use crate::array::DataType;
use crate::error::Error;
use crate::error::Result;
use crate::object_id::Digest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    Zstd,
    Gzip,
    Lz4,
    MsgPack,
    VlenUtf8,
}

impl Codec {
    pub fn parse(name: &str) -> Result<Codec> {
        match name {
            // blosc pipelines from foreign writers are zstd-based
            "zstd" | "blosc" => Ok(Codec::Zstd),
            "gzip" => Ok(Codec::Gzip),
            "lz4" => Ok(Codec::Lz4),
            "msgpack" | "msgpack2" => Ok(Codec::MsgPack),
            "vlen-utf8" => Ok(Codec::VlenUtf8),
            other => Err(Error::invariant(format!("unknown codec `{other}`"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Zstd => "zstd",
            Codec::Gzip => "gzip",
            Codec::Lz4 => "lz4",
            Codec::MsgPack => "msgpack",
            Codec::VlenUtf8 => "vlen-utf8",
        }
    }

    /// Array codecs serialize a whole column; byte codecs compress.
    pub fn is_array_codec(&self) -> bool {
        matches!(self, Codec::MsgPack | Codec::VlenUtf8)
    }

    fn encode_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Zstd => zstd::stream::encode_all(data, 0).map_err(|source| Error::Codec {
                codec: "zstd",
                source,
            }),
            Codec::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(data)
                    .and_then(|()| encoder.finish())
                    .map_err(|source| Error::Codec {
                        codec: "gzip",
                        source,
                    })
            }
            Codec::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            _ => Err(Error::invariant(format!(
                "`{}` cannot appear after a byte codec",
                self.name()
            ))),
        }
    }

    fn decode_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Zstd => zstd::stream::decode_all(data).map_err(|source| Error::Codec {
                codec: "zstd",
                source,
            }),
            Codec::Gzip => {
                let mut out = Vec::new();
                flate2::read::GzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|source| Error::Codec {
                        codec: "gzip",
                        source,
                    })?;
                Ok(out)
            }
            Codec::Lz4 => lz4_flex::decompress_size_prepended(data).map_err(|err| {
                Error::Integrity(format!("lz4 payload rejected: {err}"))
            }),
            _ => Err(Error::invariant(format!(
                "`{}` cannot appear after a byte codec",
                self.name()
            ))),
        }
    }
}

pub fn default_codecs(dtype: DataType) -> Vec<Codec> {
    if dtype.is_numeric() {
        vec![Codec::Zstd]
    } else {
        vec![Codec::MsgPack, Codec::Zstd]
    }
}

/// Validates a pipeline for a column dtype: str/obj columns must open
/// with an array codec, and array codecs may only open a pipeline.
pub fn validate(dtype: DataType, codecs: &[Codec]) -> Result<()> {
    if codecs.is_empty() {
        return Err(Error::invariant("empty codec pipeline"));
    }
    for codec in &codecs[1..] {
        if codec.is_array_codec() {
            return Err(Error::invariant(format!(
                "`{}` can only open a codec pipeline",
                codec.name()
            )));
        }
    }
    if !dtype.is_numeric() && !codecs[0].is_array_codec() {
        return Err(Error::invariant(format!(
            "{} columns need `msgpack` or `vlen-utf8` first, got `{}`",
            dtype.name(),
            codecs[0].name()
        )));
    }
    if codecs[0] == Codec::VlenUtf8 && dtype != DataType::Str {
        return Err(Error::invariant("`vlen-utf8` only applies to str columns"));
    }
    Ok(())
}

fn msgpack_encode(arr: &Array) -> Result<Vec<u8>> {
    let bytes = match arr {
        Array::Int(values) | Array::Timestamp(values) | Array::Date(values) => {
            rmp_serde::to_vec(values)?
        }
        Array::Float(values) => rmp_serde::to_vec(values)?,
        Array::Str(values) => rmp_serde::to_vec(values)?,
        Array::Obj(values) => rmp_serde::to_vec(values)?,
    };
    Ok(bytes)
}

fn msgpack_decode(dtype: DataType, bytes: &[u8]) -> Result<Array> {
    let arr = match dtype {
        DataType::Int => Array::Int(rmp_serde::from_slice(bytes)?),
        DataType::Timestamp => Array::Timestamp(rmp_serde::from_slice(bytes)?),
        DataType::Date => Array::Date(rmp_serde::from_slice(bytes)?),
        DataType::Float => Array::Float(rmp_serde::from_slice(bytes)?),
        DataType::Str => Array::Str(rmp_serde::from_slice(bytes)?),
        DataType::Obj => Array::Obj(rmp_serde::from_slice(bytes)?),
    };
    Ok(arr)
}

fn vlen_encode(arr: &Array) -> Result<Vec<u8>> {
    let Array::Str(values) = arr else {
        return Err(Error::invariant("`vlen-utf8` only applies to str columns"));
    };
    let mut out = Vec::new();
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    Ok(out)
}

fn vlen_error(detail: &str) -> Error {
    Error::Integrity(format!("vlen-utf8 payload rejected: {detail}"))
}

fn take_u32(rest: &mut &[u8]) -> Result<usize> {
    if rest.len() < 4 {
        return Err(vlen_error("truncated length header"));
    }
    let (head, tail) = rest.split_at(4);
    *rest = tail;
    Ok(u32::from_le_bytes(head.try_into().unwrap()) as usize)
}

fn vlen_decode(bytes: &[u8]) -> Result<Array> {
    let mut rest = bytes;
    let count = take_u32(&mut rest)?;
    let mut values = Vec::with_capacity(count.min(rest.len()));
    for _ in 0..count {
        let len = take_u32(&mut rest)?;
        if rest.len() < len {
            return Err(vlen_error("truncated item"));
        }
        let (head, tail) = rest.split_at(len);
        rest = tail;
        values.push(
            std::str::from_utf8(head)
                .map_err(|err| vlen_error(&err.to_string()))?
                .to_string(),
        );
    }
    Ok(Array::Str(values))
}

/// Runs a column through its pipeline. An empty column encodes to empty
/// bytes.
pub fn encode_array(codecs: &[Codec], arr: &Array) -> Result<Vec<u8>> {
    if arr.is_empty() {
        return Ok(vec![]);
    }
    let (mut bytes, rest) = if codecs.first().is_some_and(Codec::is_array_codec) {
        let bytes = match codecs[0] {
            Codec::MsgPack => msgpack_encode(arr)?,
            Codec::VlenUtf8 => vlen_encode(arr)?,
            _ => unreachable!(),
        };
        (bytes, &codecs[1..])
    } else {
        (arr.to_le_bytes()?, codecs)
    };
    for codec in rest {
        bytes = codec.encode_bytes(&bytes)?;
    }
    Ok(bytes)
}

pub fn decode_array(dtype: DataType, codecs: &[Codec], payload: &[u8]) -> Result<Array> {
    if payload.is_empty() {
        return Ok(dtype.empty_array());
    }
    let (array_codec, byte_codecs) = if codecs.first().is_some_and(Codec::is_array_codec) {
        (Some(codecs[0]), &codecs[1..])
    } else {
        (None, codecs)
    };
    let mut bytes = payload.to_vec();
    for codec in byte_codecs.iter().rev() {
        bytes = codec.decode_bytes(&bytes)?;
    }
    match array_codec {
        Some(Codec::MsgPack) => msgpack_decode(dtype, &bytes),
        Some(Codec::VlenUtf8) => vlen_decode(&bytes),
        Some(_) => unreachable!(),
        None => Array::from_le_bytes(dtype, &bytes),
    }
}

/// Encodes and digests in one pass. Numeric columns hash their raw
/// little-endian bytes, str/obj columns hash the encoded payload; the
/// rule is fixed per dtype so identical logical arrays always share a
/// digest.
pub fn encode_with_digest(codecs: &[Codec], arr: &Array) -> Result<(Vec<u8>, Digest)> {
    let payload = encode_array(codecs, arr)?;
    let digest = if arr.data_type().is_numeric() {
        Digest::of(&arr.to_le_bytes()?)
    } else {
        Digest::of(&payload)
    };
    Ok((payload, digest))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Array::Int(vec![1, 2, 3]); "int")]
    #[test_case(Array::Float(vec![1.5, -0.25]); "float")]
    #[test_case(Array::Timestamp(vec![0, 86400]); "timestamp")]
    #[test_case(Array::Str(vec!["ham".into(), "spam".into()]); "str")]
    fn test_default_pipeline_round_trip(arr: Array) {
        let codecs = default_codecs(arr.data_type());
        let payload = encode_array(&codecs, &arr).unwrap();
        let back = decode_array(arr.data_type(), &codecs, &payload).unwrap();
        assert_eq!(back, arr);
    }

    #[test_case(Codec::Gzip; "gzip")]
    #[test_case(Codec::Lz4; "lz4")]
    fn test_alternate_compressors(codec: Codec) {
        let arr = Array::Int((0..100).collect());
        let codecs = vec![codec];
        let payload = encode_array(&codecs, &arr).unwrap();
        let back = decode_array(DataType::Int, &codecs, &payload).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn test_vlen_utf8_round_trip() {
        let arr = Array::Str(vec!["".into(), "caf\u{e9}".into()]);
        let codecs = vec![Codec::VlenUtf8, Codec::Zstd];
        let payload = encode_array(&codecs, &arr).unwrap();
        assert_eq!(decode_array(DataType::Str, &codecs, &payload).unwrap(), arr);
    }

    #[test]
    fn test_digest_ignores_compression_choice_for_numeric() {
        let arr = Array::Int(vec![7, 8, 9]);
        let (_, zstd_digest) = encode_with_digest(&[Codec::Zstd], &arr).unwrap();
        let (_, lz4_digest) = encode_with_digest(&[Codec::Lz4], &arr).unwrap();
        assert_eq!(zstd_digest, lz4_digest);
    }

    #[test]
    fn test_empty_array_encodes_empty() {
        let codecs = default_codecs(DataType::Int);
        assert!(encode_array(&codecs, &Array::Int(vec![])).unwrap().is_empty());
        assert_eq!(
            decode_array(DataType::Int, &codecs, b"").unwrap(),
            Array::Int(vec![])
        );
    }

    #[test]
    fn test_validate_rejects_bad_pipelines() {
        assert!(validate(DataType::Str, &[Codec::Zstd]).is_err());
        assert!(validate(DataType::Int, &[Codec::Zstd, Codec::MsgPack]).is_err());
        assert!(validate(DataType::Obj, &[Codec::VlenUtf8]).is_err());
        assert!(validate(DataType::Int, &[Codec::Zstd]).is_ok());
    }
}
