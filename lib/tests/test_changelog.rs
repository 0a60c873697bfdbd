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

use assert_matches::assert_matches;
use lakota_lib::changelog::Changelog;
use lakota_lib::changelog::PHI;
use lakota_lib::error::Error;
use lakota_lib::memory_pod::MemoryPod;
use lakota_lib::object_id::Digest;
use lakota_lib::pod::Pod;

fn changelog() -> Changelog {
    Changelog::new(MemoryPod::new())
}

#[test]
fn test_commit_extends_the_leaf() {
    let log = changelog();
    assert!(log.leaf().unwrap().is_none());

    let first = log.commit(b"one", None).unwrap();
    assert_eq!(first.len(), 1);
    assert!(first[0].parent.is_phi());

    let second = log.commit(b"two", None).unwrap();
    assert_eq!(second[0].parent, first[0].child);

    let revisions = log.log().unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(log.leaf().unwrap().unwrap().child, second[0].child);
    assert_eq!(log.leafs().unwrap().len(), 1);
}

#[test]
fn test_double_write_is_rejected() {
    let log = changelog();
    log.commit(b"one", None).unwrap();
    // Same payload on the same parent: nothing to record.
    let revs = log.commit(b"one", None).unwrap();
    assert!(revs.is_empty());
    assert_eq!(log.log().unwrap().len(), 1);
}

#[test]
fn test_concurrent_writers_produce_sibling_leafs() {
    let log = changelog();
    // Two writers race on the empty log.
    log.commit(b"ham", Some(vec![PHI])).unwrap();
    log.commit(b"spam", Some(vec![PHI])).unwrap();
    let leafs = log.leafs().unwrap();
    assert_eq!(leafs.len(), 2);
    // Deterministic order: the newest (hextime, hash) leaf wins.
    let leaf = log.leaf().unwrap().unwrap();
    let max = leafs.iter().map(|rev| rev.child).max().unwrap();
    assert_eq!(leaf.child, max);
}

#[test]
fn test_read_payload_verifies_checksum() {
    let log = changelog();
    let revs = log.commit(b"payload", None).unwrap();
    assert_eq!(log.read_payload(&revs[0]).unwrap(), b"payload");

    // Corrupt the file behind the changelog's back.
    log.pod()
        .write(&revs[0].path(), b"tampered", true)
        .unwrap();
    assert_matches!(log.read_payload(&revs[0]), Err(Error::Integrity(_)));
}

#[test]
fn test_pull_copies_missing_commits() {
    let local = changelog();
    let remote = changelog();
    remote.commit(b"one", None).unwrap();
    remote.commit(b"two", None).unwrap();
    local.commit(b"three", None).unwrap();

    let new_paths = local.pull(&remote).unwrap();
    assert_eq!(new_paths.len(), 2);
    assert_eq!(local.log().unwrap().len(), 3);
    // Pulling again is a no-op.
    assert!(local.pull(&remote).unwrap().is_empty());
}

#[test]
fn test_pack_collapses_the_active_line() {
    let log = changelog();
    log.commit(b"one", None).unwrap();
    log.commit(b"two", None).unwrap();
    log.commit(b"three", None).unwrap();

    let packed = log.pack().unwrap().unwrap();
    assert!(packed.parent.is_phi());
    assert_eq!(packed.child.digest, Digest::of(b"three"));
    let revisions = log.log().unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(log.read_payload(&revisions[0]).unwrap(), b"three");
    // Nothing left to pack.
    assert!(log.pack().unwrap().is_none());
}

#[test]
fn test_pack_leaves_sibling_branches_alone() {
    let log = changelog();
    let first = log.commit(b"one", None).unwrap();
    log.commit(b"two", None).unwrap();
    // A racing writer extends the old parent.
    log.commit(b"rogue", Some(vec![first[0].child])).unwrap();

    log.pack().unwrap().unwrap();
    let payloads: Vec<Vec<u8>> = log
        .log()
        .unwrap()
        .iter()
        .map(|rev| log.read_payload(rev).unwrap())
        .collect();
    assert!(payloads.contains(&b"rogue".to_vec()));
}

#[test]
fn test_log_snapshot_and_refresh() {
    let log = changelog();
    log.commit(b"one", None).unwrap();
    let snapshot = log.log().unwrap();

    // Another writer appends behind our back.
    let other = Changelog::new(log.pod().clone());
    other.commit(b"two", None).unwrap();

    // Our snapshot is stable until refresh.
    assert_eq!(log.log().unwrap().len(), snapshot.len());
    log.refresh();
    assert_eq!(log.log().unwrap().len(), 2);
}
