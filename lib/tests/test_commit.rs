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
use lakota_lib::array::Value;
use lakota_lib::commit::Commit;
use lakota_lib::commit::RevRow;
use lakota_lib::error::Error;
use lakota_lib::frame::Closed;
use lakota_lib::object_id::Digest;
use lakota_lib::schema::Schema;

fn schema() -> Schema {
    Schema::from_specs(&["stamp int*", "value float"]).unwrap()
}

fn row(label: &str, start: i64, stop: i64, tag: &str) -> RevRow {
    RevRow {
        label: label.to_string(),
        start: vec![Value::Int(start)],
        stop: vec![Value::Int(stop)],
        digest: vec![Digest::of(tag.as_bytes()), Digest::of(tag.as_bytes())],
        length: (stop - start) as u64,
        closed: Closed::Both,
    }
}

fn ranges(commit: &Commit) -> Vec<(String, i64, i64, Closed)> {
    commit
        .rows()
        .map(|row| {
            let Value::Int(start) = row.start[0] else { panic!() };
            let Value::Int(stop) = row.stop[0] else { panic!() };
            (row.label, start, stop, row.closed)
        })
        .collect()
}

#[test]
fn test_update_into_empty() {
    let commit = Commit::empty(schema());
    let commit = commit.update(row("ham", 1, 5, "a")).unwrap();
    assert_eq!(ranges(&commit), vec![("ham".to_string(), 1, 5, Closed::Both)]);
}

#[test]
fn test_update_superseding_everything() {
    let commit = Commit::empty(schema())
        .update(row("ham", 2, 3, "a"))
        .unwrap()
        .update(row("ham", 4, 5, "b"))
        .unwrap()
        .update(row("ham", 1, 9, "c"))
        .unwrap();
    assert_eq!(ranges(&commit), vec![("ham".to_string(), 1, 9, Closed::Both)]);
}

#[test]
fn test_update_strictly_inside_splits_the_row() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 9, "a"))
        .unwrap()
        .update(row("ham", 3, 5, "b"))
        .unwrap();
    assert_eq!(
        ranges(&commit),
        vec![
            ("ham".to_string(), 1, 3, Closed::Left),
            ("ham".to_string(), 3, 5, Closed::Both),
            ("ham".to_string(), 5, 9, Closed::Right),
        ]
    );
    // The remnants keep the original digests.
    let rows: Vec<RevRow> = commit.rows().collect();
    assert_eq!(rows[0].digest, rows[2].digest);
    assert_ne!(rows[0].digest, rows[1].digest);
}

#[test]
fn test_update_truncates_boundary_rows() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 5, "a"))
        .unwrap()
        .update(row("ham", 3, 7, "b"))
        .unwrap();
    assert_eq!(
        ranges(&commit),
        vec![
            ("ham".to_string(), 1, 3, Closed::Left),
            ("ham".to_string(), 3, 7, Closed::Both),
        ]
    );

    // Hitting the left side truncates the start of the old row.
    let commit = Commit::empty(schema())
        .update(row("ham", 3, 7, "a"))
        .unwrap()
        .update(row("ham", 1, 5, "b"))
        .unwrap();
    assert_eq!(
        ranges(&commit),
        vec![
            ("ham".to_string(), 1, 5, Closed::Both),
            ("ham".to_string(), 5, 7, Closed::Right),
        ]
    );
}

#[test]
fn test_update_keeps_labels_apart() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 5, "a"))
        .unwrap()
        .update(row("spam", 2, 4, "b"))
        .unwrap();
    assert_eq!(
        ranges(&commit),
        vec![
            ("ham".to_string(), 1, 5, Closed::Both),
            ("spam".to_string(), 2, 4, Closed::Both),
        ]
    );
    assert_eq!(commit.labels(), vec!["ham".to_string(), "spam".to_string()]);
}

#[test]
fn test_update_rejects_inverted_range() {
    let commit = Commit::empty(schema());
    assert_matches!(commit.update(row("ham", 5, 1, "a")), Err(Error::Invariant(_)));
}

#[test]
fn test_concat_rejects_overlapping_seams() {
    let one = Commit::empty(schema()).update(row("ham", 1, 5, "a")).unwrap();
    let two = Commit::empty(schema()).update(row("ham", 3, 9, "b")).unwrap();
    assert_matches!(Commit::concat(&[&one, &two]), Err(Error::Invariant(_)));
    let far = Commit::empty(schema()).update(row("ham", 6, 9, "b")).unwrap();
    let merged = Commit::concat(&[&one, &far]).unwrap();
    assert_eq!(merged.len(), 2);
}

#[test]
fn test_contains_and_delete_labels() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 5, "a"))
        .unwrap()
        .update(row("spam", 1, 5, "b"))
        .unwrap();
    assert!(commit.contains(&row("ham", 1, 5, "a")));
    assert!(!commit.contains(&row("ham", 1, 5, "other")));
    assert!(!commit.contains(&row("eggs", 1, 5, "a")));

    let pruned = commit.delete_labels(&["ham"]);
    assert_eq!(pruned.labels(), vec!["spam".to_string()]);
    assert_eq!(pruned.len(), 1);
}

#[test]
fn test_encode_decode_round_trip() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 5, "a"))
        .unwrap()
        .update(row("ham", 8, 9, "b"))
        .unwrap()
        .update(row("spam", 1, 2, "c"))
        .unwrap();
    let payload = commit.encode().unwrap();
    let decoded = Commit::decode(schema(), &payload).unwrap();
    assert_eq!(ranges(&decoded), ranges(&commit));
    let rows: Vec<RevRow> = commit.rows().collect();
    let decoded_rows: Vec<RevRow> = decoded.rows().collect();
    assert_eq!(decoded_rows, rows);
    // Identical content encodes to identical bytes.
    assert_eq!(commit.encode().unwrap(), payload);

    // The empty commit survives the round trip too.
    let empty = Commit::empty(schema());
    let decoded = Commit::decode(schema(), &empty.encode().unwrap()).unwrap();
    assert!(decoded.is_empty());
}

#[test]
fn test_split_brackets_the_replacement_zone() {
    let commit = Commit::empty(schema())
        .update(row("ham", 1, 3, "a"))
        .unwrap()
        .update(row("ham", 5, 7, "b"))
        .unwrap()
        .update(row("ham", 9, 11, "c"))
        .unwrap();
    let (start_pos, stop_pos) = commit.split("ham", &[Value::Int(4)], &[Value::Int(8)]);
    assert_eq!((start_pos, stop_pos), (1, 2));
}
