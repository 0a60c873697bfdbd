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

//! The repo: a pod holding a registry of collections, their changelogs
//! and every content-addressed segment, plus the garbage collector that
//! reclaims unreferenced segments.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::info;

use crate::array::Array;
use crate::array::Value;
use crate::collection::Collection;
use crate::error::Error;
use crate::error::Result;
use crate::frame::Closed;
use crate::frame::Frame;
use crate::object_id::digest_from_path;
use crate::object_id::segment_path;
use crate::object_id::Digest;
use crate::pod;
use crate::pod::Pod;
use crate::schema::Schema;
use crate::series::Series;
use crate::series::WriteOptions;

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9._-]+$").expect("valid regex"));

/// Directory soft gc moves unreferenced segments into.
const ARCHIVE_DIR: &str = "archive";

pub(crate) fn validate_label(label: &str) -> Result<()> {
    if LABEL_RE.is_match(label) {
        Ok(())
    } else {
        Err(Error::InvalidLabel(label.to_string()))
    }
}

/// A hierarchical KV series mapping labels to metadata. The repo uses
/// one for collection → {path, schema}; each collection uses one for
/// series → {schema}.
pub struct Registry {
    series: Series,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish()
    }
}

fn registry_schema() -> Schema {
    let columns = vec![
        crate::schema::ColumnDef::from_spec("label str*").expect("static schema"),
        crate::schema::ColumnDef::from_spec("meta O").expect("static schema"),
    ];
    match Schema::kv(columns) {
        Ok(schema) => schema,
        Err(_) => unreachable!("static registry schema"),
    }
}

impl Registry {
    pub(crate) fn open(pod: Arc<dyn Pod>, path: &str) -> Registry {
        let collection = Collection::internal(":registry:", registry_schema(), pod, path);
        Registry {
            series: Series::new(":registry:".to_string(), collection),
        }
    }

    pub fn refresh(&self) {
        self.series.refresh();
    }

    fn frame(&self) -> Result<Frame> {
        self.series.frame()
    }

    pub fn ls(&self) -> Result<Vec<String>> {
        match self.frame()?.column("label") {
            Some(Array::Str(labels)) => Ok(labels.clone()),
            _ => Ok(vec![]),
        }
    }

    /// Metadata recorded for `label`, if any.
    pub fn get(&self, label: &str) -> Result<Option<serde_json::Value>> {
        let bound = vec![Value::Str(label.to_string())];
        let frame = self
            .series
            .query()
            .start(bound.clone())
            .stop(bound)
            .closed(Closed::Both)
            .frame()?;
        if frame.is_empty() {
            return Ok(None);
        }
        match frame.column("meta") {
            Some(Array::Obj(values)) => Ok(values.last().cloned()),
            _ => Ok(None),
        }
    }

    /// Registers labels with their metadata. Existing labels are
    /// overwritten (last writer wins) unless `raise_if_exists`.
    pub fn create(
        &self,
        items: &[(String, serde_json::Value)],
        raise_if_exists: bool,
    ) -> Result<()> {
        for (label, _) in items {
            validate_label(label)?;
            if raise_if_exists && self.get(label)?.is_some() {
                return Err(Error::AlreadyExists(label.clone()));
            }
        }
        let labels = Array::Str(items.iter().map(|(label, _)| label.clone()).collect());
        let metas = Array::Obj(items.iter().map(|(_, meta)| meta.clone()).collect());
        let frame = Frame::new(registry_schema(), vec![labels, metas])?;
        self.series.write(&frame)?;
        Ok(())
    }

    /// Removes labels by rewriting their range into a root-parented
    /// commit; entries outside the range survive on the older line.
    pub fn delete(&self, labels: &[&str]) -> Result<()> {
        let Some(min) = labels.iter().min() else {
            return Ok(());
        };
        let max = labels.iter().max().expect("non-empty labels");
        let start = vec![Value::Str(min.to_string())];
        let stop = vec![Value::Str(max.to_string())];
        let frame = self
            .series
            .query()
            .start(start.clone())
            .stop(stop.clone())
            .closed(Closed::Both)
            .frame()?;
        let mask: Vec<bool> = match frame.column("label") {
            Some(Array::Str(current)) => current
                .iter()
                .map(|label| !labels.contains(&label.as_str()))
                .collect(),
            _ => vec![],
        };
        let kept = frame.mask(&mask)?;
        self.series.write_opts(
            &kept,
            WriteOptions {
                start: Some(start),
                stop: Some(stop),
                root: true,
                batch: None,
            },
        )?;
        Ok(())
    }

    /// Segment digests referenced by any commit of the registry.
    pub fn digests(&self) -> Result<HashSet<Digest>> {
        self.series.collection().digests()
    }

    pub(crate) fn pull(&self, remote: &Registry) -> Result<()> {
        self.series.collection().pull(remote.series.collection())
    }

    pub(crate) fn collection(&self) -> &Collection {
        self.series.collection()
    }
}

pub struct Repo {
    pod: Arc<dyn Pod>,
    registry: Registry,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo").field("pod", &self.pod).finish()
    }
}

/// Changelog path of the repo registry: the hashed path of the all-zero
/// digest.
fn registry_path() -> String {
    segment_path(&Digest::ZERO)
}

impl Repo {
    /// Opens (or lazily initializes) a repo at `uri`; see
    /// [`crate::pod::from_uri`] for the supported schemes.
    pub fn open(uri: &str) -> Result<Repo> {
        Ok(Repo::from_pod(pod::from_uri(uri)?))
    }

    pub fn from_pod(pod: Arc<dyn Pod>) -> Repo {
        let registry = Registry::open(pod.clone(), &registry_path());
        Repo { pod, registry }
    }

    pub fn pod(&self) -> &Arc<dyn Pod> {
        &self.pod
    }

    pub fn refresh(&self) {
        self.registry.refresh();
    }

    /// Labels of the registered collections.
    pub fn ls(&self) -> Result<Vec<String>> {
        self.registry.ls()
    }

    pub fn create_collection(
        &self,
        schema: &Schema,
        labels: &[&str],
        raise_if_exists: bool,
    ) -> Result<Vec<Collection>> {
        let items: Vec<(String, serde_json::Value)> = labels
            .iter()
            .map(|label| {
                let path = segment_path(&Digest::of(label.as_bytes()));
                (
                    label.to_string(),
                    json!({"path": path, "schema": schema.dump()}),
                )
            })
            .collect();
        self.registry.create(&items, raise_if_exists)?;
        labels
            .iter()
            .map(|label| {
                self.collection(label)?
                    .ok_or_else(|| Error::not_found("collection", *label))
            })
            .collect()
    }

    /// A handle on a registered collection, `None` otherwise.
    pub fn collection(&self, label: &str) -> Result<Option<Collection>> {
        let Some(meta) = self.registry.get(label)? else {
            return Ok(None);
        };
        let path = meta["path"]
            .as_str()
            .ok_or_else(|| Error::Integrity(format!("malformed meta for `{label}`")))?
            .to_string();
        let schema = Schema::load(&meta["schema"])?;
        Ok(Some(Collection::open(label, schema, self.pod.clone(), &path)))
    }

    pub fn delete_collection(&self, labels: &[&str]) -> Result<()> {
        self.registry.delete(labels)
    }

    pub fn push(&self, remote: &Repo, labels: &[&str]) -> Result<()> {
        remote.pull(self, labels)
    }

    /// Pulls collections from a remote repo. A label whose local schema
    /// differs from the remote one is rejected before anything moves.
    pub fn pull(&self, remote: &Repo, labels: &[&str]) -> Result<()> {
        let labels: Vec<String> = if labels.is_empty() {
            remote.ls()?
        } else {
            labels.iter().map(|label| label.to_string()).collect()
        };
        for label in &labels {
            let (Some(local), Some(remote_meta)) =
                (self.registry.get(label)?, remote.registry.get(label)?)
            else {
                continue;
            };
            if local["schema"] != remote_meta["schema"] {
                return Err(Error::SchemaMismatch(format!(
                    "unable to pull label `{label}`, incompatible schema"
                )));
            }
        }
        self.registry.pull(&remote.registry)?;
        self.refresh();
        for label in &labels {
            info!(label = %label, "sync collection");
            let Some(remote_collection) = remote.collection(label)? else {
                continue;
            };
            let local_collection = self
                .collection(label)?
                .ok_or_else(|| Error::not_found("collection", label.clone()))?;
            local_collection.pull(&remote_collection)?;
        }
        Ok(())
    }

    /// Collapses the registry history into a single root commit.
    pub fn squash(&self) -> Result<()> {
        self.registry.collection().squash()?;
        Ok(())
    }

    /// Removes every segment no live commit references. With `soft`,
    /// unreferenced segments are moved under `archive/` instead.
    /// Returns the number of reclaimed segments.
    pub fn gc(&self, soft: bool) -> Result<usize> {
        let mut active = self.registry.digests()?;
        for label in self.ls()? {
            if let Some(collection) = self.collection(&label)? {
                active.extend(collection.digests()?);
                active.extend(collection.registry_digests()?);
            }
        }
        let mut count = 0;
        for path in self.pod.walk(Some(3))? {
            let Some(digest) = digest_from_path(&path) else {
                continue;
            };
            if active.contains(&digest) {
                continue;
            }
            info!(path = %path, "gc segment");
            if soft {
                self.pod.mv(&path, &format!("{ARCHIVE_DIR}/{path}"))?;
            } else {
                self.pod.rm(&path, false)?;
            }
            count += 1;
        }
        Ok(count)
    }
}
