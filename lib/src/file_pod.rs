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

//! Local filesystem pod. Directory layout matches relpaths; writes go
//! through a temp file so a key is only ever observed whole.

use std::fs;
use std::io::ErrorKind;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::pod::split_fragments;
use crate::pod::Pod;
use crate::pod::PodError;
use crate::pod::PodResult;

#[derive(Debug)]
pub struct FilePod {
    path: PathBuf,
}

impl FilePod {
    pub fn new(path: PathBuf) -> Arc<dyn Pod> {
        Arc::new(FilePod { path })
    }

    fn target(&self, relpath: &str) -> PathBuf {
        let mut path = self.path.clone();
        for frag in split_fragments(relpath) {
            path.push(frag);
        }
        path
    }
}

fn not_found(err: std::io::Error, path: &PathBuf) -> PodError {
    if err.kind() == ErrorKind::NotFound {
        PodError::NotFound(path.display().to_string())
    } else {
        PodError::Io(err)
    }
}

impl Pod for FilePod {
    fn cd(&self, relpath: &str) -> Arc<dyn Pod> {
        FilePod::new(self.target(relpath))
    }

    fn read(&self, relpath: &str) -> PodResult<Vec<u8>> {
        let path = self.target(relpath);
        debug!(path = %path.display(), "READ file://");
        fs::read(&path).map_err(|err| not_found(err, &path))
    }

    fn write(&self, relpath: &str, data: &[u8], force: bool) -> PodResult<Option<usize>> {
        let path = self.target(relpath);
        if !force && path.is_file() {
            debug!(path = %path.display(), "SKIP-WRITE file://");
            return Ok(None);
        }
        debug!(path = %path.display(), "WRITE file://");
        let parent = path
            .parent()
            .ok_or_else(|| PodError::NotFound(path.display().to_string()))?;
        fs::create_dir_all(parent)?;
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(data)?;
        // Like NamedTempFile::persist(), the rename makes racing writers
        // of the same content-addressed key both succeed.
        temp_file
            .persist(&path)
            .map_err(|err| PodError::Io(err.error))?;
        Ok(Some(data.len()))
    }

    fn ls(&self, relpath: &str, missing_ok: bool) -> PodResult<Vec<String>> {
        let path = self.target(relpath);
        debug!(path = %path.display(), "LIST file://");
        if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(vec![name]);
        }
        match fs::read_dir(&path) {
            Ok(entries) => {
                let mut names = vec![];
                for entry in entries {
                    names.push(entry?.file_name().to_string_lossy().into_owned());
                }
                names.sort_unstable();
                Ok(names)
            }
            Err(err) if err.kind() == ErrorKind::NotFound && missing_ok => Ok(vec![]),
            Err(err) => Err(not_found(err, &path)),
        }
    }

    fn rm(&self, relpath: &str, recursive: bool) -> PodResult<()> {
        let path = self.target(relpath);
        debug!(path = %path.display(), "REMOVE file://");
        let result = if path.is_dir() {
            if recursive {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            }
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PodError::Io(err)),
        }
    }

    fn mv(&self, from: &str, to: &str) -> PodResult<()> {
        let from_path = self.target(from);
        let to_path = self.target(to);
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from_path, &to_path).map_err(|err| not_found(err, &from_path))
    }

    fn isfile(&self, relpath: &str) -> bool {
        self.target(relpath).is_file()
    }

    fn isdir(&self, relpath: &str) -> bool {
        self.target(relpath).is_dir()
    }

    fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
