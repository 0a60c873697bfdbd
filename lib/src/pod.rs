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

//! The flat blob store every other layer sits on.
//!
//! A pod is a tree of named byte blobs. Writes are idempotent and refuse
//! to overwrite by default, which is what makes concurrent writers safe:
//! two tasks racing to store the same content-addressed key both appear
//! to succeed and leave identical bytes behind.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::memory_pod::MemoryPod;
use crate::settings;

#[derive(Debug, Error)]
pub enum PodError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` is not empty")]
    NotEmpty(String),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("unsupported pod URI `{0}`")]
    UnsupportedUri(String),
}

pub type PodResult<T> = Result<T, PodError>;

pub trait Pod: Send + Sync + Debug {
    /// Returns a pod rooted at `relpath` under this one.
    fn cd(&self, relpath: &str) -> Arc<dyn Pod>;

    /// Reads a whole key. Fails with [`PodError::NotFound`] when absent.
    fn read(&self, relpath: &str) -> PodResult<Vec<u8>>;

    /// Writes a key. By default an existing key is left untouched and
    /// `None` is returned; `force` replaces it. Returns the number of
    /// bytes written otherwise.
    fn write(&self, relpath: &str, data: &[u8], force: bool) -> PodResult<Option<usize>>;

    /// Lists the entry names under `relpath`. A file lists as itself.
    fn ls(&self, relpath: &str, missing_ok: bool) -> PodResult<Vec<String>>;

    /// Removes a key, or a subtree when `recursive`. Removing an absent
    /// key is not an error.
    fn rm(&self, relpath: &str, recursive: bool) -> PodResult<()>;

    fn mv(&self, from: &str, to: &str) -> PodResult<()>;

    fn isfile(&self, relpath: &str) -> bool;

    fn isdir(&self, relpath: &str) -> bool;

    fn uri(&self) -> String;

    /// Yields every file path below this pod, depth-first over an
    /// explicit stack. Directories at `max_depth` are not descended.
    fn walk(&self, max_depth: Option<usize>) -> PodResult<Vec<String>> {
        if max_depth == Some(0) {
            return Ok(vec![]);
        }
        let mut out = vec![];
        let mut stack: Vec<(String, usize)> = self
            .ls(".", true)?
            .into_iter()
            .rev()
            .map(|name| (name, 1))
            .collect();
        while let Some((path, depth)) = stack.pop() {
            if self.isdir(&path) {
                if max_depth.is_some_and(|max| depth >= max) {
                    continue;
                }
                let children = self.ls(&path, true)?;
                for child in children.into_iter().rev() {
                    stack.push((format!("{path}/{child}"), depth + 1));
                }
            } else {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Removes every top-level entry except the named ones.
    fn clear(&self, keep: &[&str]) -> PodResult<()> {
        for name in self.ls(".", true)? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            self.rm(&name, true)?;
        }
        Ok(())
    }
}

/// Builds a pod from a URI.
///
/// Supported schemes are `memory://` and `file://path` (a bare path is
/// treated as `file://`). Two URIs joined with `+` compose into a cache
/// overlay, local side first: `memory://+file:///data`. The `s3://` and
/// `http(s)://` schemes are recognized but their drivers live outside
/// this crate.
pub fn from_uri(uri: &str) -> PodResult<Arc<dyn Pod>> {
    if let Some((local, remote)) = uri.split_once('+') {
        return Ok(CachePod::new(from_uri(local)?, from_uri(remote)?));
    }
    let (protocol, path) = match uri.split_once("://") {
        Some((protocol, path)) => (protocol, path),
        None if uri.is_empty() => ("memory", "."),
        None => ("file", uri),
    };
    match protocol {
        "memory" => {
            let budget = settings::pod_cache_budget();
            if budget > 0 {
                Ok(MemoryPod::with_cache(budget))
            } else {
                Ok(MemoryPod::new())
            }
        }
        "file" => Ok(crate::file_pod::FilePod::new(path.into())),
        _ => Err(PodError::UnsupportedUri(uri.to_string())),
    }
}

/// Read-through cache overlay: reads consult `local` first and populate
/// it on miss, writes go to both sides, listings always come from
/// `remote` (the authoritative store).
#[derive(Debug)]
pub struct CachePod {
    local: Arc<dyn Pod>,
    remote: Arc<dyn Pod>,
}

impl CachePod {
    pub fn new(local: Arc<dyn Pod>, remote: Arc<dyn Pod>) -> Arc<dyn Pod> {
        Arc::new(CachePod { local, remote })
    }
}

impl Pod for CachePod {
    fn cd(&self, relpath: &str) -> Arc<dyn Pod> {
        CachePod::new(self.local.cd(relpath), self.remote.cd(relpath))
    }

    fn read(&self, relpath: &str) -> PodResult<Vec<u8>> {
        match self.local.read(relpath) {
            Ok(data) => return Ok(data),
            Err(PodError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        let data = self.remote.read(relpath)?;
        self.local.write(relpath, &data, false)?;
        Ok(data)
    }

    fn write(&self, relpath: &str, data: &[u8], force: bool) -> PodResult<Option<usize>> {
        self.local.write(relpath, data, force)?;
        self.remote.write(relpath, data, force)
    }

    fn ls(&self, relpath: &str, missing_ok: bool) -> PodResult<Vec<String>> {
        self.remote.ls(relpath, missing_ok)
    }

    fn rm(&self, relpath: &str, recursive: bool) -> PodResult<()> {
        self.remote.rm(relpath, recursive)?;
        self.local.rm(relpath, recursive)
    }

    fn mv(&self, from: &str, to: &str) -> PodResult<()> {
        self.remote.mv(from, to)?;
        match self.local.mv(from, to) {
            Ok(()) | Err(PodError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn isfile(&self, relpath: &str) -> bool {
        self.remote.isfile(relpath)
    }

    fn isdir(&self, relpath: &str) -> bool {
        self.remote.isdir(relpath)
    }

    fn uri(&self) -> String {
        format!("{}+{}", self.local.uri(), self.remote.uri())
    }
}

/// Splits a relative path into its non-trivial fragments.
pub(crate) fn split_fragments(relpath: &str) -> Vec<&str> {
    relpath
        .split('/')
        .filter(|frag| !frag.is_empty() && *frag != ".")
        .collect()
}
