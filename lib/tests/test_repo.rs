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
use lakota_lib::array::Array;
use lakota_lib::collection::Collection;
use lakota_lib::error::Error;
use lakota_lib::frame::Frame;
use lakota_lib::pod::Pod;
use lakota_lib::repo::Repo;
use lakota_lib::schema::Schema;
use lakota_lib::series::Series;
use lakota_lib::series::WriteOptions;

fn schema() -> Schema {
    Schema::from_specs(&["stamp timestamp*", "value float"]).unwrap()
}

fn write(series: &Series, stamps: &[i64], values: &[f64], root: bool) {
    let frame = Frame::new(
        series.schema().clone(),
        vec![
            Array::Timestamp(stamps.to_vec()),
            Array::Float(values.to_vec()),
        ],
    )
    .unwrap();
    series
        .write_opts(
            &frame,
            WriteOptions {
                root,
                ..Default::default()
            },
        )
        .unwrap();
}

fn read_values(series: &Series) -> Vec<f64> {
    match series.frame().unwrap().column("value") {
        Some(Array::Float(values)) => values.clone(),
        _ => panic!("missing value column"),
    }
}

#[test]
fn test_create_ls_get_collections() {
    let repo = Repo::open("memory://").unwrap();
    assert_eq!(repo.ls().unwrap(), Vec::<String>::new());
    repo.create_collection(&schema(), &["temp", "wind"], true).unwrap();
    assert_eq!(repo.ls().unwrap(), vec!["temp".to_string(), "wind".to_string()]);
    assert!(repo.collection("temp").unwrap().is_some());
    assert!(repo.collection("nope").unwrap().is_none());

    // The collection round-trips through the registry metadata.
    let reopened = Repo::from_pod(repo.pod().clone());
    let collection = reopened.collection("temp").unwrap().unwrap();
    assert_eq!(collection.schema(), &schema());
}

#[test]
fn test_create_collection_errors() {
    let repo = Repo::open("memory://").unwrap();
    repo.create_collection(&schema(), &["temp"], true).unwrap();
    assert_matches!(
        repo.create_collection(&schema(), &["temp"], true),
        Err(Error::AlreadyExists(_))
    );
    // Re-creating without raise_if_exists is a last-writer-wins upsert.
    repo.create_collection(&schema(), &["temp"], false).unwrap();
    assert_matches!(
        repo.create_collection(&schema(), &["bad label"], true),
        Err(Error::InvalidLabel(_))
    );
}

#[test]
fn test_series_registry_tracks_first_writes() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    assert!(collection.get_series("room").unwrap().is_none());
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2], &[1.0, 2.0], false);
    assert!(collection.get_series("room").unwrap().is_some());

    // Explicit creation still works and can be strict.
    collection.create_series(&["roof"], true).unwrap();
    assert_matches!(
        collection.create_series(&["roof"], true),
        Err(Error::AlreadyExists(_))
    );
    let mut labels = collection.ls().unwrap();
    labels.sort_unstable();
    assert_eq!(labels, vec!["roof".to_string(), "room".to_string()]);
}

#[test]
fn test_merge_concurrent_roots() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    // Two writers race on the empty collection: root-parented siblings.
    let ham = collection.series("ham").unwrap();
    let spam = collection.series("spam").unwrap();
    write(&ham, &[1, 2], &[1.0, 2.0], true);
    write(&spam, &[1, 2], &[10.0, 20.0], true);
    assert_eq!(collection.changelog().leafs().unwrap().len(), 2);

    let revs = collection.merge().unwrap();
    assert!(!revs.is_empty());
    // One commit now carries both series.
    let leaf_commit = collection.leaf_commit().unwrap();
    assert_eq!(
        leaf_commit.labels(),
        vec!["ham".to_string(), "spam".to_string()]
    );
    assert_eq!(read_values(&ham), vec![1.0, 2.0]);
    assert_eq!(read_values(&spam), vec![10.0, 20.0]);

    // Merging again changes nothing.
    assert!(collection.merge().unwrap().is_empty());
}

#[test]
fn test_merge_divergent_branches_newest_wins_on_overlap() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2, 3], &[1.0, 2.0, 3.0], false);

    // A second writer with its own snapshot extends the same leaf.
    let stale = Repo::from_pod(repo.pod().clone())
        .collection("temp")
        .unwrap()
        .unwrap();
    let stale_series = stale.series("room").unwrap();
    // Prime the stale writer's log snapshot before the first writer
    // moves the leaf; its next commit then lands on the old parent.
    stale_series.len().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    write(&series, &[4, 5], &[4.0, 5.0], false);
    std::thread::sleep(std::time::Duration::from_millis(5));
    write(&stale_series, &[6, 7], &[6.0, 7.0], false);
    assert_eq!(collection.changelog().leafs().unwrap().len(), 2);

    collection.merge().unwrap();
    collection.refresh();
    let result = series.frame().unwrap();
    assert_eq!(
        result.column("stamp").unwrap(),
        &Array::Timestamp(vec![1, 2, 3, 4, 5, 6, 7])
    );
}

#[test]
fn test_squash_then_gc_keeps_live_data() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2, 3], &[1.0, 2.0, 3.0], false);
    write(&series, &[2, 3, 4], &[20.0, 30.0, 40.0], false);

    collection.squash().unwrap().unwrap();
    // History collapsed to a single root commit.
    let log = collection.changelog().log().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].parent.is_phi());

    // The original partial segments are unreferenced now.
    let reclaimed = repo.gc(false).unwrap();
    assert!(reclaimed > 0);
    assert_eq!(read_values(&series), vec![1.0, 20.0, 30.0, 40.0]);

    // gc is idempotent once everything live is kept.
    assert_eq!(repo.gc(false).unwrap(), 0);
}

#[test]
fn test_soft_gc_archives_instead_of_deleting() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2], &[1.0, 2.0], false);
    write(&series, &[1, 2], &[10.0, 20.0], false);

    collection.squash().unwrap();
    let reclaimed = repo.gc(true).unwrap();
    assert!(reclaimed > 0);
    assert!(!repo.pod().ls("archive", true).unwrap().is_empty());
    assert_eq!(read_values(&series), vec![10.0, 20.0]);
}

#[test]
fn test_push_pull_between_repos() {
    let local = Repo::open("memory://").unwrap();
    let remote = Repo::open("memory://").unwrap();
    let collection = local
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2, 3], &[1.0, 2.0, 3.0], false);

    local.push(&remote, &[]).unwrap();
    let mirrored = remote.collection("temp").unwrap().unwrap();
    let mirrored_series = mirrored.series("room").unwrap();
    assert_eq!(read_values(&mirrored_series), vec![1.0, 2.0, 3.0]);

    // Pulling again is safe and a fresh write flows over.
    write(&series, &[4], &[4.0], false);
    remote.pull(&local, &["temp"]).unwrap();
    mirrored.refresh();
    assert_eq!(read_values(&mirrored_series), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_pull_rejects_schema_mismatch() {
    let local = Repo::open("memory://").unwrap();
    let remote = Repo::open("memory://").unwrap();
    remote.create_collection(&schema(), &["temp"], true).unwrap();
    let other = Schema::from_specs(&["stamp timestamp*", "value int"]).unwrap();
    local.create_collection(&other, &["temp"], true).unwrap();
    assert_matches!(
        local.pull(&remote, &["temp"]),
        Err(Error::SchemaMismatch(_))
    );
}

#[test]
fn test_delete_series_and_collection() {
    let repo = Repo::open("memory://").unwrap();
    let collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let room = collection.series("room").unwrap();
    let roof = collection.series("roof").unwrap();
    write(&room, &[1, 2], &[1.0, 2.0], false);
    write(&roof, &[1, 2], &[-1.0, -2.0], false);

    collection.delete(&["room"]).unwrap();
    collection.refresh();
    assert_eq!(collection.ls().unwrap(), vec!["roof".to_string()]);
    assert_eq!(room.len().unwrap(), 0);
    assert_eq!(read_values(&roof), vec![-1.0, -2.0]);

    repo.delete_collection(&["temp"]).unwrap();
    repo.refresh();
    assert_eq!(repo.ls().unwrap(), Vec::<String>::new());
    assert!(repo.collection("temp").unwrap().is_none());
}

#[test]
fn test_truncate_drops_history_keeps_segments() {
    let repo = Repo::open("memory://").unwrap();
    let collection: Collection = repo
        .create_collection(&schema(), &["temp"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("room").unwrap();
    write(&series, &[1, 2], &[1.0, 2.0], false);

    collection.truncate().unwrap();
    assert!(collection.changelog().log().unwrap().is_empty());
    assert_eq!(series.len().unwrap(), 0);
    // The registry still knows the series; only data history is gone.
    assert_eq!(collection.ls().unwrap(), vec!["room".to_string()]);
}
