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

use std::sync::Arc;

use assert_matches::assert_matches;
use lakota_lib::file_pod::FilePod;
use lakota_lib::memory_pod::MemoryPod;
use lakota_lib::pod::from_uri;
use lakota_lib::pod::CachePod;
use lakota_lib::pod::Pod;
use lakota_lib::pod::PodError;
use test_case::test_case;

fn file_pod(temp_dir: &tempfile::TempDir) -> Arc<dyn Pod> {
    FilePod::new(temp_dir.path().to_path_buf())
}

#[test_case(MemoryPod::new(); "memory")]
fn test_write_is_idempotent(pod: Arc<dyn Pod>) {
    assert_eq!(pod.write("ab/cd/key", b"ham", false).unwrap(), Some(3));
    // Second write of the same key signals a no-op and leaves the
    // original bytes behind.
    assert_eq!(pod.write("ab/cd/key", b"spam", false).unwrap(), None);
    assert_eq!(pod.read("ab/cd/key").unwrap(), b"ham");
    // force replaces.
    assert_eq!(pod.write("ab/cd/key", b"spam", true).unwrap(), Some(4));
    assert_eq!(pod.read("ab/cd/key").unwrap(), b"spam");
}

#[test]
fn test_file_pod_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let pod = file_pod(&temp_dir);
    assert_eq!(pod.write("ab/cd/key", b"ham", false).unwrap(), Some(3));
    assert_eq!(pod.write("ab/cd/key", b"spam", false).unwrap(), None);
    assert_eq!(pod.read("ab/cd/key").unwrap(), b"ham");
    assert!(pod.isdir("ab/cd"));
    assert!(pod.isfile("ab/cd/key"));
    assert_eq!(pod.ls("ab/cd", false).unwrap(), vec!["key".to_string()]);
    assert_matches!(pod.read("nope"), Err(PodError::NotFound(_)));
    pod.rm("ab/cd/key", false).unwrap();
    assert!(!pod.isfile("ab/cd/key"));
    // Removing an absent key is not an error.
    pod.rm("ab/cd/key", false).unwrap();
}

#[test]
fn test_memory_pod_tree_semantics() {
    let pod = MemoryPod::new();
    pod.write("a/b/one", b"1", false).unwrap();
    pod.write("a/b/two", b"2", false).unwrap();
    pod.write("a/three", b"3", false).unwrap();
    assert_eq!(
        pod.ls("a", false).unwrap(),
        vec!["b".to_string(), "three".to_string()]
    );
    // A file lists as itself, a missing path honors missing_ok.
    assert_eq!(pod.ls("a/three", false).unwrap(), vec!["three".to_string()]);
    assert_eq!(pod.ls("nope", true).unwrap(), Vec::<String>::new());
    assert_matches!(pod.ls("nope", false), Err(PodError::NotFound(_)));
    // Non-recursive rm refuses a populated directory.
    assert_matches!(pod.rm("a/b", false), Err(PodError::NotEmpty(_)));
    pod.rm("a/b", true).unwrap();
    assert!(!pod.isdir("a/b"));

    let sub = pod.cd("a");
    assert_eq!(sub.read("three").unwrap(), b"3");
    sub.write("four", b"4", false).unwrap();
    assert_eq!(pod.read("a/four").unwrap(), b"4");
}

#[test]
fn test_walk_depth_bound() {
    let pod = MemoryPod::new();
    pod.write("aa/bb/rest", b"segment", false).unwrap();
    pod.write("aa/bb/deep/parent.child", b"commit", false).unwrap();
    pod.write("top", b"t", false).unwrap();
    let mut all = pod.walk(None).unwrap();
    all.sort_unstable();
    assert_eq!(
        all,
        vec![
            "aa/bb/deep/parent.child".to_string(),
            "aa/bb/rest".to_string(),
            "top".to_string(),
        ]
    );
    // Directories at max_depth are not descended: the depth-4 file is
    // invisible, the depth-3 file and shallower ones are not.
    let mut bounded = pod.walk(Some(3)).unwrap();
    bounded.sort_unstable();
    assert_eq!(bounded, vec!["aa/bb/rest".to_string(), "top".to_string()]);
    assert_eq!(pod.walk(Some(0)).unwrap(), Vec::<String>::new());
}

#[test]
fn test_mv() {
    let pod = MemoryPod::new();
    pod.write("a/key", b"ham", false).unwrap();
    pod.mv("a/key", "b/c/key").unwrap();
    assert!(!pod.isfile("a/key"));
    assert_eq!(pod.read("b/c/key").unwrap(), b"ham");
    assert_matches!(pod.mv("a/key", "elsewhere"), Err(PodError::NotFound(_)));
}

#[test]
fn test_cache_pod_overlay() {
    let local = MemoryPod::new();
    let remote = MemoryPod::new();
    let cache = CachePod::new(local.clone(), remote.clone());

    // Writes land on both sides.
    cache.write("key", b"ham", false).unwrap();
    assert_eq!(local.read("key").unwrap(), b"ham");
    assert_eq!(remote.read("key").unwrap(), b"ham");

    // Reads fall through and populate the local side.
    remote.write("other", b"spam", false).unwrap();
    assert_eq!(cache.read("other").unwrap(), b"spam");
    assert_eq!(local.read("other").unwrap(), b"spam");

    // Listings are authoritative from the remote.
    local.write("ghost", b"boo", false).unwrap();
    let names = cache.ls(".", false).unwrap();
    assert!(!names.contains(&"ghost".to_string()));
    assert!(names.contains(&"other".to_string()));
}

#[test]
fn test_from_uri() {
    assert_eq!(from_uri("memory://").unwrap().uri(), "memory://");
    let temp_dir = tempfile::tempdir().unwrap();
    let uri = format!("file://{}", temp_dir.path().display());
    assert_eq!(from_uri(&uri).unwrap().uri(), uri);
    // A bare path is a file pod, `+` composes a cache overlay.
    assert!(from_uri("/tmp/somewhere").unwrap().uri().starts_with("file://"));
    let overlay = from_uri(&format!("memory://+{uri}")).unwrap();
    assert_eq!(overlay.uri(), format!("memory://+{uri}"));
    assert_matches!(
        from_uri("s3://bucket/path"),
        Err(PodError::UnsupportedUri(_))
    );
}

#[test]
fn test_two_generation_cache_evicts_from_store() {
    let pod = MemoryPod::with_cache(100);
    // a+b exceed half the budget: they become the back generation.
    pod.write("a", &[0u8; 30], false).unwrap();
    pod.write("b", &[0u8; 30], false).unwrap();
    // Touch `a` into the fresh front so it survives the next swap.
    pod.read("a").unwrap();
    // This write triggers the swap; `b` was left in back and is gone.
    pod.write("c", &[0u8; 40], false).unwrap();
    assert!(pod.isfile("a"));
    assert!(!pod.isfile("b"));
    assert!(pod.isfile("c"));
}
