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

//! In-memory pod: a tree of nested maps, optionally bounded by a
//! two-generation byte-budget cache.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;

use crate::pod::split_fragments;
use crate::pod::Pod;
use crate::pod::PodError;
use crate::pod::PodResult;

#[derive(Debug)]
enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

impl Node {
    fn dir() -> Node {
        Node::Dir(BTreeMap::new())
    }
}

/// Two-generation eviction bookkeeping. New and recently touched keys
/// live in `front`; when `front` outgrows half the byte budget it becomes
/// `back` and a fresh `front` begins. Keys still in `back` at swap time
/// are evicted. Items larger than the whole budget go straight to `back`.
#[derive(Debug)]
struct TwoGenCache {
    budget: usize,
    front: HashMap<String, usize>,
    back: HashMap<String, usize>,
    front_bytes: usize,
}

impl TwoGenCache {
    fn new(budget: usize) -> Self {
        TwoGenCache {
            budget,
            front: HashMap::new(),
            back: HashMap::new(),
            front_bytes: 0,
        }
    }

    #[must_use]
    fn insert(&mut self, path: &str, size: usize) -> Vec<String> {
        if size > self.budget {
            self.back.insert(path.to_string(), size);
            return vec![];
        }
        if let Some(old) = self.front.insert(path.to_string(), size) {
            self.front_bytes -= old;
        }
        self.front_bytes += size;
        self.back.remove(path);
        if self.front_bytes > self.budget / 2 {
            let evicted = self.back.drain().map(|(path, _)| path).collect();
            self.back = std::mem::take(&mut self.front);
            self.front_bytes = 0;
            evicted
        } else {
            vec![]
        }
    }

    #[must_use]
    fn touch(&mut self, path: &str) -> Vec<String> {
        if self.front.contains_key(path) {
            return vec![];
        }
        match self.back.get(path).copied() {
            Some(size) => self.insert(path, size),
            None => vec![],
        }
    }

    fn forget(&mut self, path: &str) {
        if let Some(size) = self.front.remove(path) {
            self.front_bytes -= size;
        }
        self.back.remove(path);
    }
}

#[derive(Debug)]
struct Inner {
    root: BTreeMap<String, Node>,
    cache: Option<TwoGenCache>,
}

impl Inner {
    /// Immutable lookup from the root.
    fn node(&self, fragments: &[&str]) -> Option<&Node> {
        let mut map = &self.root;
        let (leaf, dirs) = fragments.split_last()?;
        for frag in dirs {
            match map.get(*frag) {
                Some(Node::Dir(sub)) => map = sub,
                _ => return None,
            }
        }
        map.get(*leaf)
    }

    /// Mutable handle on the parent directory, creating intermediate
    /// directories on demand.
    fn dir_mut(&mut self, fragments: &[&str]) -> Option<&mut BTreeMap<String, Node>> {
        let mut map = &mut self.root;
        for frag in fragments {
            let entry = map
                .entry((*frag).to_string())
                .or_insert_with(Node::dir);
            match entry {
                Node::Dir(sub) => map = sub,
                Node::File(_) => return None,
            }
        }
        Some(map)
    }

    fn remove_file(&mut self, path: &str) {
        let fragments = split_fragments(path);
        let Some((leaf, dirs)) = fragments.split_last() else {
            return;
        };
        let mut map = &mut self.root;
        for frag in dirs {
            match map.get_mut(*frag) {
                Some(Node::Dir(sub)) => map = sub,
                _ => return,
            }
        }
        if matches!(map.get(*leaf), Some(Node::File(_))) {
            map.remove(*leaf);
        }
    }

    fn evict(&mut self, paths: Vec<String>) {
        for path in paths {
            debug!(path = %path, "EVICT memory://");
            self.remove_file(&path);
        }
    }
}

#[derive(Debug)]
pub struct MemoryPod {
    inner: Arc<Mutex<Inner>>,
    base: Vec<String>,
}

impl MemoryPod {
    pub fn new() -> Arc<dyn Pod> {
        MemoryPod::build(None)
    }

    /// A memory pod whose contents are evicted with a two-generation
    /// byte-budget policy. Meant for the local half of a cache overlay.
    pub fn with_cache(budget: usize) -> Arc<dyn Pod> {
        MemoryPod::build(Some(TwoGenCache::new(budget)))
    }

    fn build(cache: Option<TwoGenCache>) -> Arc<dyn Pod> {
        Arc::new(MemoryPod {
            inner: Arc::new(Mutex::new(Inner {
                root: BTreeMap::new(),
                cache,
            })),
            base: vec![],
        })
    }

    /// Full fragment list for `relpath` under this pod's base.
    fn fragments<'a>(&'a self, relpath: &'a str) -> Vec<&'a str> {
        let mut fragments: Vec<&str> = self.base.iter().map(String::as_str).collect();
        fragments.extend(split_fragments(relpath));
        fragments
    }

    fn full_path(&self, relpath: &str) -> String {
        self.fragments(relpath).join("/")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Pod for MemoryPod {
    fn cd(&self, relpath: &str) -> Arc<dyn Pod> {
        let base = self.fragments(relpath).iter().map(|s| s.to_string()).collect();
        Arc::new(MemoryPod {
            inner: self.inner.clone(),
            base,
        })
    }

    fn read(&self, relpath: &str) -> PodResult<Vec<u8>> {
        let path = self.full_path(relpath);
        debug!(path = %path, "READ memory://");
        let mut inner = self.lock();
        let fragments = self.fragments(relpath);
        let data = match inner.node(&fragments) {
            Some(Node::File(data)) => data.clone(),
            _ => return Err(PodError::NotFound(path)),
        };
        if inner.cache.is_some() {
            let evicted = inner.cache.as_mut().map(|c| c.touch(&path)).unwrap_or_default();
            inner.evict(evicted);
        }
        Ok(data)
    }

    fn write(&self, relpath: &str, data: &[u8], force: bool) -> PodResult<Option<usize>> {
        let path = self.full_path(relpath);
        let mut inner = self.lock();
        let fragments = self.fragments(relpath);
        let Some((leaf, dirs)) = fragments.split_last() else {
            return Err(PodError::NotFound(path));
        };
        let dir = inner
            .dir_mut(dirs)
            .ok_or_else(|| PodError::NotFound(path.clone()))?;
        match dir.get(*leaf) {
            Some(Node::Dir(_)) => return Err(PodError::NotEmpty(path)),
            Some(Node::File(_)) if !force => {
                debug!(path = %path, "SKIP-WRITE memory://");
                return Ok(None);
            }
            _ => {}
        }
        debug!(path = %path, "WRITE memory://");
        dir.insert((*leaf).to_string(), Node::File(data.to_vec()));
        if inner.cache.is_some() {
            let evicted = inner
                .cache
                .as_mut()
                .map(|c| c.insert(&path, data.len()))
                .unwrap_or_default();
            inner.evict(evicted);
        }
        Ok(Some(data.len()))
    }

    fn ls(&self, relpath: &str, missing_ok: bool) -> PodResult<Vec<String>> {
        let path = self.full_path(relpath);
        debug!(path = %path, "LIST memory://");
        let inner = self.lock();
        let fragments = self.fragments(relpath);
        if fragments.is_empty() {
            return Ok(inner.root.keys().cloned().collect());
        }
        match inner.node(&fragments) {
            Some(Node::Dir(map)) => Ok(map.keys().cloned().collect()),
            Some(Node::File(_)) => Ok(vec![fragments.last().map(|s| s.to_string()).unwrap_or_default()]),
            None if missing_ok => Ok(vec![]),
            None => Err(PodError::NotFound(path)),
        }
    }

    fn rm(&self, relpath: &str, recursive: bool) -> PodResult<()> {
        let path = self.full_path(relpath);
        debug!(path = %path, "REMOVE memory://");
        let mut inner = self.lock();
        let fragments = self.fragments(relpath);
        let Some((leaf, dirs)) = fragments.split_last() else {
            return Err(PodError::NotEmpty(path));
        };
        let Some(dir) = inner.dir_mut(dirs) else {
            return Ok(());
        };
        match dir.get(*leaf) {
            None => return Ok(()),
            Some(Node::Dir(sub)) if !recursive && !sub.is_empty() => {
                return Err(PodError::NotEmpty(path));
            }
            _ => {}
        }
        dir.remove(*leaf);
        if let Some(cache) = inner.cache.as_mut() {
            cache.forget(&path);
        }
        Ok(())
    }

    fn mv(&self, from: &str, to: &str) -> PodResult<()> {
        let mut inner = self.lock();
        let from_fragments = self.fragments(from);
        let Some((from_leaf, from_dirs)) = from_fragments.split_last() else {
            return Err(PodError::NotFound(self.full_path(from)));
        };
        let node = match inner.dir_mut(from_dirs) {
            Some(dir) => dir
                .remove(*from_leaf)
                .ok_or_else(|| PodError::NotFound(self.full_path(from)))?,
            None => return Err(PodError::NotFound(self.full_path(from))),
        };
        let to_fragments = self.fragments(to);
        let Some((to_leaf, to_dirs)) = to_fragments.split_last() else {
            return Err(PodError::NotFound(self.full_path(to)));
        };
        let dir = inner
            .dir_mut(to_dirs)
            .ok_or_else(|| PodError::NotFound(self.full_path(to)))?;
        dir.insert((*to_leaf).to_string(), node);
        Ok(())
    }

    fn isfile(&self, relpath: &str) -> bool {
        let inner = self.lock();
        matches!(inner.node(&self.fragments(relpath)), Some(Node::File(_)))
    }

    fn isdir(&self, relpath: &str) -> bool {
        let inner = self.lock();
        let fragments = self.fragments(relpath);
        if fragments.is_empty() {
            return true;
        }
        matches!(inner.node(&fragments), Some(Node::Dir(_)))
    }

    fn uri(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_generation_swap_evicts_back() {
        let mut cache = TwoGenCache::new(100);
        assert!(cache.insert("a", 30).is_empty());
        // Front (60) exceeded half the budget: a+b become the back
        // generation, nothing was behind them to evict.
        assert!(cache.insert("b", 30).is_empty());
        // `a` is touched back into the new front, `b` is not.
        assert!(cache.touch("a").is_empty());
        // The next swap drops what is still in back.
        let evicted = cache.insert("d", 40);
        assert_eq!(evicted, vec!["b".to_string()]);
        assert!(cache.back.contains_key("a"));
        assert!(cache.back.contains_key("d"));
    }

    #[test]
    fn test_oversized_item_goes_to_back() {
        let mut cache = TwoGenCache::new(10);
        assert!(cache.insert("big", 100).is_empty());
        assert!(cache.back.contains_key("big"));
        assert!(cache.front.is_empty());
    }
}
