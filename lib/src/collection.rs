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

//! Collections: a schema-scoped group of series sharing one changelog.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::changelog::Changelog;
use crate::changelog::NodeId;
use crate::changelog::Revision;
use crate::changelog::PHI;
use crate::commit::Commit;
use crate::commit::RevRow;
use crate::error::Error;
use crate::error::Result;
use crate::frame::Frame;
use crate::object_id::segment_path;
use crate::object_id::Digest;
use crate::pod::Pod;
use crate::pool;
use crate::repo::validate_label;
use crate::repo::Registry;
use crate::schema::Schema;
use crate::series::Series;
use crate::series::WriteOptions;

/// Page size used when squash rewrites series histories.
const SQUASH_STEP: usize = 500_000;

#[derive(Clone)]
pub struct Collection {
    label: String,
    schema: Schema,
    pod: Arc<dyn Pod>,
    changelog: Arc<Changelog>,
    registry: Option<Arc<Registry>>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("label", &self.label)
            .finish()
    }
}

impl Collection {
    /// Opens a collection rooted at `path` under the repo pod. The data
    /// changelog lives at `path` itself, the series registry under
    /// `path/registry`; segment blobs go to the pod root.
    pub(crate) fn open(label: &str, schema: Schema, pod: Arc<dyn Pod>, path: &str) -> Collection {
        let changelog = Arc::new(Changelog::new(pod.cd(path)));
        let registry = Registry::open(pod.clone(), &format!("{path}/registry"));
        Collection {
            label: label.to_string(),
            schema,
            pod,
            changelog,
            registry: Some(Arc::new(registry)),
        }
    }

    /// A registry's own backing collection: no nested series registry.
    pub(crate) fn internal(
        label: &str,
        schema: Schema,
        pod: Arc<dyn Pod>,
        changelog_path: &str,
    ) -> Collection {
        let changelog = Arc::new(Changelog::new(pod.cd(changelog_path)));
        Collection {
            label: label.to_string(),
            schema,
            pod,
            changelog,
            registry: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn pod(&self) -> &Arc<dyn Pod> {
        &self.pod
    }

    pub fn changelog(&self) -> &Arc<Changelog> {
        &self.changelog
    }

    pub fn refresh(&self) {
        self.changelog.refresh();
        if let Some(registry) = &self.registry {
            registry.refresh();
        }
    }

    /// A handle on a series. Series come into existence on first write;
    /// reading a never-written label yields an empty frame.
    pub fn series(&self, label: &str) -> Result<Series> {
        validate_label(label)?;
        Ok(Series::new(label.to_string(), self.clone()))
    }

    /// A handle on a series known to the registry, `None` otherwise.
    pub fn get_series(&self, label: &str) -> Result<Option<Series>> {
        match &self.registry {
            Some(registry) => match registry.get(label)? {
                Some(_) => Ok(Some(self.series(label)?)),
                None => Ok(None),
            },
            None => Ok(Some(self.series(label)?)),
        }
    }

    /// Registers series labels explicitly, recording the collection
    /// schema for each.
    pub fn create_series(&self, labels: &[&str], raise_if_exists: bool) -> Result<Vec<Series>> {
        let Some(registry) = &self.registry else {
            return Err(Error::invariant("internal collections have no registry"));
        };
        let meta = json!({"schema": self.schema.dump()});
        let items: Vec<(String, serde_json::Value)> = labels
            .iter()
            .map(|label| (label.to_string(), meta.clone()))
            .collect();
        registry.create(&items, raise_if_exists)?;
        labels.iter().map(|label| self.series(label)).collect()
    }

    /// Idempotent upsert of a series label into the registry, called on
    /// first write.
    pub(crate) fn register_series(&self, label: &str) -> Result<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        if registry.get(label)?.is_some() {
            return Ok(());
        }
        let meta = json!({"schema": self.schema.dump()});
        registry.create(&[(label.to_string(), meta)], false)
    }

    /// Labels of the registered series.
    pub fn ls(&self) -> Result<Vec<String>> {
        match &self.registry {
            Some(registry) => registry.ls(),
            None => Ok(self.leaf_commit()?.labels()),
        }
    }

    /// Decoded leaf commit, or an empty one for a fresh changelog.
    pub fn leaf_commit(&self) -> Result<Commit> {
        match self.changelog.leaf()? {
            Some(leaf) => {
                let payload = self.changelog.read_payload(&leaf)?;
                Commit::decode(self.schema.clone(), &payload)
            }
            None => Ok(Commit::empty(self.schema.clone())),
        }
    }

    pub fn batch(&self, root: bool) -> Batch {
        Batch {
            collection: self.clone(),
            rows: vec![],
            root,
        }
    }

    /// Reconciles all current leafs into one commit. A no-op on a single
    /// head; idempotent when re-run.
    pub fn merge(&self) -> Result<Vec<Revision>> {
        let heads: Vec<NodeId> = self.changelog.leafs()?.iter().map(|rev| rev.child).collect();
        self.merge_heads(&heads)
    }

    pub fn merge_heads(&self, heads: &[NodeId]) -> Result<Vec<Revision>> {
        let log = self.changelog.log()?;
        if log.is_empty() {
            return Ok(vec![]);
        }
        let mut seen = HashSet::new();
        let heads: Vec<NodeId> = heads
            .iter()
            .filter(|head| seen.insert(**head))
            .copied()
            .collect();
        if heads.len() < 2 {
            return Ok(vec![]);
        }

        let mut by_child: HashMap<NodeId, Vec<Revision>> = HashMap::new();
        for rev in log.iter() {
            by_child.entry(rev.child).or_default().push(rev.clone());
        }
        let ancestor_lines: Vec<Vec<Revision>> = heads
            .iter()
            .map(|head| ancestors(*head, &by_child))
            .collect();
        let ancestor_sets: Vec<HashSet<(NodeId, NodeId)>> = ancestor_lines[1..]
            .iter()
            .map(|line| line.iter().map(|rev| (rev.parent, rev.child)).collect())
            .collect();
        let root = ancestor_lines[0]
            .iter()
            .find(|rev| {
                ancestor_sets
                    .iter()
                    .all(|set| set.contains(&(rev.parent, rev.child)))
            })
            .cloned();

        let decode = |child: NodeId| -> Result<Commit> {
            let rev = by_child
                .get(&child)
                .and_then(|revs| revs.first())
                .ok_or_else(|| Error::invariant(format!("unknown head {child}")))?;
            let payload = self.changelog.read_payload(rev)?;
            Commit::decode(self.schema.clone(), &payload)
        };
        let mut primary = decode(heads[0])?;
        let root_commit = match &root {
            Some(rev) => {
                let payload = self.changelog.read_payload(rev)?;
                Commit::decode(self.schema.clone(), &payload)?
            }
            None => Commit::empty(self.schema.clone()),
        };
        for head in &heads[1..] {
            let commit = decode(*head)?;
            for row in commit.rows() {
                if primary.contains(&row) || root_commit.contains(&row) {
                    continue;
                }
                primary = primary.update(row)?;
            }
        }
        let payload = primary.encode()?;
        self.changelog.commit(&payload, Some(heads))
    }

    /// Collapses history: every series is rewritten through one
    /// root-parented batch and superseded commit files are removed.
    pub fn squash(&self) -> Result<Option<Revision>> {
        let labels = self.ls()?;
        let mut batch = self.batch(true);
        for label in &labels {
            info!(label = %label, "squash series");
            // Not `self.series()`: internal registry labels would fail
            // user-label validation.
            let series = Series::new(label.clone(), self.clone());
            let frames: Vec<Frame> = series
                .query()
                .paginate(SQUASH_STEP)?
                .collect::<Result<Vec<_>>>()?;
            for frame in frames {
                series.write_opts(
                    &frame,
                    WriteOptions {
                        batch: Some(&mut batch),
                        ..Default::default()
                    },
                )?;
            }
        }
        let Some(revs) = batch.flush()? else {
            return Ok(None);
        };
        let keep: Vec<String> = revs.iter().map(Revision::path).collect();
        let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
        self.changelog.clear(&keep)?;
        Ok(revs.into_iter().next())
    }

    /// Collapses the active line of the changelog without rewriting
    /// segment data.
    pub fn pack(&self) -> Result<Option<Revision>> {
        self.changelog.pack()
    }

    /// Removes series: their rows disappear from a new leaf commit and
    /// their labels from the registry. Their segments become garbage.
    pub fn delete(&self, labels: &[&str]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        if let Some(leaf) = self.changelog.leaf()? {
            let payload = self.changelog.read_payload(&leaf)?;
            let commit = Commit::decode(self.schema.clone(), &payload)?;
            let pruned = commit.delete_labels(labels);
            self.changelog.commit(&pruned.encode()?, Some(vec![leaf.child]))?;
        }
        if let Some(registry) = &self.registry {
            registry.delete(labels)?;
        }
        Ok(())
    }

    /// Drops every commit file of the data changelog. Data segments stay
    /// behind for `gc`.
    pub fn truncate(&self) -> Result<()> {
        self.changelog.clear(&[])
    }

    /// Every segment digest referenced by any commit on any live branch.
    pub fn digests(&self) -> Result<HashSet<Digest>> {
        let log = self.changelog.log()?;
        let mut seen = HashSet::new();
        let mut out = HashSet::new();
        for rev in log.iter() {
            if !seen.insert(rev.child) {
                continue;
            }
            let payload = self.changelog.read_payload(rev)?;
            let commit = Commit::decode(self.schema.clone(), &payload)?;
            out.extend(commit.digests().copied());
        }
        Ok(out)
    }

    /// Digests referenced by the series registry.
    pub fn registry_digests(&self) -> Result<HashSet<Digest>> {
        match &self.registry {
            Some(registry) => registry.digests(),
            None => Ok(HashSet::new()),
        }
    }

    pub fn push(&self, remote: &Collection) -> Result<()> {
        remote.pull(self)
    }

    /// Pulls the remote changelog and the segment blobs it references.
    pub fn pull(&self, remote: &Collection) -> Result<()> {
        if self.schema != *remote.schema() {
            return Err(Error::SchemaMismatch(format!(
                "unable to pull collection `{}`",
                self.label
            )));
        }
        let known = self.digests()?;
        self.changelog.pull(remote.changelog())?;
        if let (Some(local), Some(remote_registry)) = (&self.registry, &remote.registry) {
            local.pull(remote_registry)?;
        }
        let needed: Vec<Digest> = self
            .digests()?
            .difference(&known)
            .copied()
            .collect();
        let tasks: Vec<_> = needed
            .iter()
            .map(|digest| {
                move || -> Result<()> {
                    let path = segment_path(digest);
                    if self.pod.isfile(&path) {
                        return Ok(());
                    }
                    let payload = remote.pod.read(&path)?;
                    self.pod.write(&path, &payload, false)?;
                    Ok(())
                }
            })
            .collect();
        pool::run(tasks).into_iter().collect::<Result<Vec<_>>>()?;
        self.refresh();
        Ok(())
    }
}

/// Ancestor edges of `head`, depth first, the head's own edges included.
fn ancestors(head: NodeId, by_child: &HashMap<NodeId, Vec<Revision>>) -> Vec<Revision> {
    let mut queue: Vec<Revision> = by_child.get(&head).cloned().unwrap_or_default();
    let mut out = vec![];
    let mut seen = HashSet::new();
    while let Some(rev) = queue.pop() {
        if !seen.insert((rev.parent, rev.child)) {
            continue;
        }
        if let Some(parents) = by_child.get(&rev.parent) {
            queue.extend(parents.iter().cloned());
        }
        out.push(rev);
    }
    out
}

/// Accumulates revision rows under a single collection; `flush` reads
/// the current leaf once, folds every `update` in and appends one
/// commit. `root` starts a new history line on phi instead.
pub struct Batch {
    collection: Collection,
    rows: Vec<RevRow>,
    root: bool,
}

impl Batch {
    pub fn append(&mut self, row: RevRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, other: Batch) {
        self.rows.extend(other.rows);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn flush(&mut self) -> Result<Option<Vec<Revision>>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let changelog = self.collection.changelog();
        let leaf = if self.root { None } else { changelog.leaf()? };
        let mut commit = match &leaf {
            Some(rev) => {
                let payload = changelog.read_payload(rev)?;
                Commit::decode(self.collection.schema().clone(), &payload)?
            }
            None => Commit::empty(self.collection.schema().clone()),
        };
        for row in self.rows.drain(..) {
            commit = commit.update(row)?;
        }
        let payload = commit.encode()?;
        let parents = match leaf {
            Some(rev) => vec![rev.child],
            None => vec![PHI],
        };
        let revs = changelog.commit(&payload, Some(parents))?;
        Ok(Some(revs))
    }
}
