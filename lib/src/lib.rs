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

//! Versioned, concurrent, content-addressed columnar storage for
//! ordered multi-dimensional series.
//!
//! Data is organized as collections of series. Every immutable column
//! segment is keyed by the SHA-1 of its bytes; every commit is a small
//! metadata record pointing at those digests, linked into a tree of
//! parent/child-named changelog files. That layout gives historical
//! versions, lock-free concurrent writers and cheap replication for
//! free: everything on disk is write-once and idempotent.

#![deny(unused_must_use)]

pub mod array;
pub mod changelog;
pub mod codec;
pub mod collection;
pub mod commit;
pub mod error;
pub mod file_pod;
pub mod frame;
pub mod memory_pod;
pub mod object_id;
pub mod pod;
pub mod pool;
pub mod repo;
pub mod schema;
pub mod segment;
pub mod series;
pub mod settings;
