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

//! Engine-level error kinds.
//!
//! A `force_parent` that disagrees with the current leaf is not an error:
//! it simply produces a sibling branch that `merge` reconciles later.

use thiserror::Error;

use crate::pod::PodError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error("{kind} `{label}` not found")]
    NotFound { kind: &'static str, label: String },
    #[error("label `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid label `{0}`")]
    InvalidLabel(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("integrity failure: {0}")]
    Integrity(String),
    #[error("codec `{codec}` failed")]
    Codec {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode payload")]
    EncodePayload(#[from] rmp_serde::encode::Error),
    #[error("failed to decode payload")]
    DecodePayload(#[from] rmp_serde::decode::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, label: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            label: label.into(),
        }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
