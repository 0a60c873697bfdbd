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

//! The changelog: an append-only tree of commit files over a pod.
//!
//! A commit file is named `"<parent>.<child>"` where each id is
//! `"<hextime>-<sha1>"`. Because names are content-addressed by both
//! ends, two writers racing to extend the same parent produce two
//! distinct sibling files and both survive; `merge` reconciles later.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::object_id::Digest;
use crate::pod::Pod;
use crate::pool;

/// Width of the lexicographically sortable millisecond timestamp.
pub const HEXTIME_LEN: usize = 11;

/// Root parent of every history line.
pub const PHI: NodeId = NodeId {
    epoch_ms: 0,
    digest: Digest::ZERO,
};

/// One end of a commit file name: millisecond timestamp plus payload
/// digest, rendered as `"<11-hex>-<40-hex>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub epoch_ms: u64,
    pub digest: Digest,
}

impl NodeId {
    pub fn new(epoch_ms: u64, digest: Digest) -> NodeId {
        NodeId { epoch_ms, digest }
    }

    /// An id stamped with the current UTC time.
    pub fn now(digest: Digest) -> NodeId {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        NodeId { epoch_ms, digest }
    }

    pub fn parse(input: &str) -> Option<NodeId> {
        let (hextime, hash) = input.split_once('-')?;
        if hextime.len() != HEXTIME_LEN {
            return None;
        }
        let epoch_ms = u64::from_str_radix(hextime, 16).ok()?;
        let digest = Digest::from_hex(hash)?;
        Some(NodeId { epoch_ms, digest })
    }

    pub fn is_phi(&self) -> bool {
        *self == PHI
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0width$x}-{}", self.epoch_ms, self.digest, width = HEXTIME_LEN)
    }
}

/// One parent→child edge of the tree. The same child appears once per
/// parent after a merge commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    pub parent: NodeId,
    pub child: NodeId,
    pub is_leaf: bool,
}

impl Revision {
    pub fn path(&self) -> String {
        format!("{}.{}", self.parent, self.child)
    }

    pub fn epoch_ms(&self) -> u64 {
        self.child.epoch_ms
    }
}

fn parse_name(name: &str) -> Option<(NodeId, NodeId)> {
    let (parent, child) = name.split_once('.')?;
    Some((NodeId::parse(parent)?, NodeId::parse(child)?))
}

pub struct Changelog {
    pod: Arc<dyn Pod>,
    cache: Mutex<Option<Arc<Vec<Revision>>>>,
}

impl std::fmt::Debug for Changelog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changelog").field("pod", &self.pod).finish()
    }
}

impl Changelog {
    pub fn new(pod: Arc<dyn Pod>) -> Changelog {
        Changelog {
            pod,
            cache: Mutex::new(None),
        }
    }

    pub fn pod(&self) -> &Arc<dyn Pod> {
        &self.pod
    }

    /// Drops the listing snapshot; the next read observes appends made
    /// by other writers since.
    pub fn refresh(&self) {
        *self.cache.lock().unwrap() = None;
    }

    fn entries(&self) -> Result<Vec<(NodeId, NodeId)>> {
        let mut names = self.pod.ls(".", true)?;
        names.sort_unstable();
        Ok(names.iter().filter_map(|name| parse_name(name)).collect())
    }

    /// Appends a commit file per parent. Without explicit parents the
    /// current leaf is extended (or phi on an empty log). A parent whose
    /// payload hash equals the new payload hash is a no-op double write
    /// and is skipped.
    pub fn commit(&self, payload: &[u8], parents: Option<Vec<NodeId>>) -> Result<Vec<Revision>> {
        let parents = match parents {
            Some(parents) if !parents.is_empty() => parents,
            _ => match self.leaf()? {
                Some(leaf) => vec![leaf.child],
                None => vec![PHI],
            },
        };
        let key = Digest::of(payload);
        let child = NodeId::now(key);
        let mut seen = HashSet::new();
        let mut revs = vec![];
        for parent in parents {
            if !seen.insert(parent) {
                continue;
            }
            if !parent.is_phi() && parent.digest == key {
                // Double write: the parent already carries this payload.
                continue;
            }
            let rev = Revision {
                parent,
                child,
                is_leaf: false,
            };
            self.pod.write(&rev.path(), payload, false)?;
            revs.push(rev);
        }
        self.refresh();
        Ok(revs)
    }

    /// All active revisions, depth-first from the parentless nodes.
    /// Ordering is deterministic: sibling branches follow the
    /// `(hextime, hash)` order of their child ids, so the last element
    /// is the newest leaf across branches.
    pub fn log(&self) -> Result<Arc<Vec<Revision>>> {
        if let Some(cached) = self.cache.lock().unwrap().clone() {
            return Ok(cached);
        }
        let entries = self.entries()?;
        let mut children_of: BTreeMap<NodeId, Vec<Revision>> = BTreeMap::new();
        let mut all_children = HashSet::new();
        for (parent, child) in entries {
            if parent == child {
                continue;
            }
            all_children.insert(child);
            children_of.entry(parent).or_default().push(Revision {
                parent,
                child,
                is_leaf: false,
            });
        }
        let first_gen: Vec<Revision> = children_of
            .iter()
            .filter(|(parent, _)| !all_children.contains(parent))
            .flat_map(|(_, revs)| revs.iter().cloned())
            .collect();
        let mut queue: Vec<Revision> = first_gen.into_iter().rev().collect();
        let mut out = vec![];
        while let Some(mut rev) = queue.pop() {
            let kids = children_of.get(&rev.child);
            rev.is_leaf = kids.map_or(true, |kids| kids.is_empty());
            if let Some(kids) = kids {
                queue.extend(kids.iter().rev().cloned());
            }
            out.push(rev);
        }
        let out = Arc::new(out);
        *self.cache.lock().unwrap() = Some(out.clone());
        Ok(out)
    }

    /// Nodes with no children.
    pub fn leafs(&self) -> Result<Vec<Revision>> {
        Ok(self
            .log()?
            .iter()
            .filter(|rev| rev.is_leaf)
            .cloned()
            .collect())
    }

    /// The newest leaf across branches, if any.
    pub fn leaf(&self) -> Result<Option<Revision>> {
        Ok(self.log()?.last().cloned())
    }

    /// Reads and checksum-verifies a commit payload. A mismatch is
    /// usually a racing writer mid-flight, so a few retries with backoff
    /// are attempted before giving up.
    pub fn read_payload(&self, rev: &Revision) -> Result<Vec<u8>> {
        let path = rev.path();
        for attempt in 1..=4u64 {
            let payload = self.pod.read(&path)?;
            if Digest::of(&payload) == rev.child.digest {
                return Ok(payload);
            }
            warn!(path = %path, attempt, "commit payload checksum mismatch, retrying");
            std::thread::sleep(Duration::from_millis(100 * attempt));
        }
        Err(Error::Integrity(format!(
            "payload of `{path}` does not match its name"
        )))
    }

    /// Copies every commit file whose digest pair is unknown locally.
    /// Payload transfers may run in parallel.
    pub fn pull(&self, remote: &Changelog) -> Result<Vec<String>> {
        let known: HashSet<(Digest, Digest)> = self
            .entries()?
            .into_iter()
            .map(|(parent, child)| (parent.digest, child.digest))
            .collect();
        let missing: Vec<Revision> = remote
            .entries()?
            .into_iter()
            .filter(|(parent, child)| !known.contains(&(parent.digest, child.digest)))
            .map(|(parent, child)| Revision {
                parent,
                child,
                is_leaf: false,
            })
            .collect();
        let tasks: Vec<_> = missing
            .iter()
            .map(|rev| {
                move || -> Result<String> {
                    let path = rev.path();
                    let payload = remote.pod.read(&path)?;
                    self.pod.write(&path, &payload, false)?;
                    Ok(path)
                }
            })
            .collect();
        let new_paths = pool::run(tasks).into_iter().collect::<Result<Vec<_>>>()?;
        self.refresh();
        Ok(new_paths)
    }

    /// Collapses the active line (root→newest leaf) into a single commit
    /// on phi and removes the superseded files. Sibling branches are
    /// left untouched so racing writers keep their history.
    pub fn pack(&self) -> Result<Option<Revision>> {
        let log = self.log()?;
        if log.len() < 2 {
            return Ok(None);
        }
        let leaf = log.last().cloned().ok_or_else(|| Error::invariant("empty log"))?;
        let by_child: HashMap<NodeId, &Revision> =
            log.iter().map(|rev| (rev.child, rev)).collect();
        let mut line = vec![leaf.path()];
        let mut cursor = &leaf;
        while !cursor.parent.is_phi() {
            match by_child.get(&cursor.parent) {
                Some(prev) => {
                    line.push(prev.path());
                    cursor = prev;
                }
                None => break,
            }
        }
        let payload = self.read_payload(&leaf)?;
        let revs = self.commit(&payload, Some(vec![PHI]))?;
        let keep: HashSet<String> = revs.iter().map(Revision::path).collect();
        for path in line {
            if !keep.contains(&path) {
                self.pod.rm(&path, false)?;
            }
        }
        self.refresh();
        Ok(revs.into_iter().next())
    }

    /// Removes every commit file except the named ones. Non-commit
    /// entries (the series registry directory) are preserved.
    pub fn clear(&self, keep: &[&str]) -> Result<()> {
        for name in self.pod.ls(".", true)? {
            if keep.contains(&name.as_str()) || parse_name(&name).is_none() {
                continue;
            }
            self.pod.rm(&name, false)?;
        }
        self.refresh();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trip() {
        let id = NodeId::new(0x123, Digest::of(b"ham"));
        let rendered = id.to_string();
        assert_eq!(rendered.len(), HEXTIME_LEN + 1 + 40);
        assert_eq!(NodeId::parse(&rendered), Some(id));
        assert_eq!(PHI.to_string(), format!("{}-{}", "0".repeat(11), "0".repeat(40)));
        assert!(NodeId::parse("junk").is_none());
    }
}
