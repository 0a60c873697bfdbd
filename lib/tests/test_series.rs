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
use lakota_lib::array::Value;
use lakota_lib::collection::Collection;
use lakota_lib::error::Error;
use lakota_lib::frame::Closed;
use lakota_lib::frame::Frame;
use lakota_lib::repo::Repo;
use lakota_lib::schema::Schema;
use lakota_lib::series::Series;
use test_case::test_case;

fn timeseries_collection() -> Collection {
    let repo = Repo::open("memory://").unwrap();
    let schema = Schema::from_specs(&["stamp timestamp*", "value float"]).unwrap();
    repo.create_collection(&schema, &["temperature"], true)
        .unwrap()
        .remove(0)
}

fn frame(series: &Series, stamps: &[i64], values: &[f64]) -> Frame {
    Frame::new(
        series.schema().clone(),
        vec![
            Array::Timestamp(stamps.to_vec()),
            Array::Float(values.to_vec()),
        ],
    )
    .unwrap()
}

fn stamps(frame: &Frame) -> Vec<i64> {
    match frame.column("stamp") {
        Some(Array::Timestamp(values)) => values.clone(),
        _ => panic!("missing stamp column"),
    }
}

fn values(frame: &Frame) -> Vec<f64> {
    match frame.column("value") {
        Some(Array::Float(values)) => values.clone(),
        _ => panic!("missing value column"),
    }
}

#[test]
fn test_write_then_read_round_trip() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series.write(&frame(&series, &[1, 2, 3], &[11.0, 12.0, 13.0])).unwrap();

    let result = series.frame().unwrap();
    assert_eq!(stamps(&result), vec![1, 2, 3]);
    assert_eq!(values(&result), vec![11.0, 12.0, 13.0]);
    assert_eq!(series.len().unwrap(), 3);
}

#[test]
fn test_unsorted_write_is_rejected() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    let unsorted = frame(&series, &[3, 1, 2], &[3.0, 1.0, 2.0]);
    assert_matches!(series.write(&unsorted), Err(Error::Invariant(_)));
    // Nothing was committed.
    assert_eq!(series.len().unwrap(), 0);
}

#[test]
fn test_adjacent_writes_with_closed_both() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series.write(&frame(&series, &[1, 2, 3], &[1.0, 2.0, 3.0])).unwrap();
    series.write(&frame(&series, &[4, 5, 6], &[4.0, 5.0, 6.0])).unwrap();

    let result = series
        .query()
        .start(vec![Value::Timestamp(3)])
        .stop(vec![Value::Timestamp(4)])
        .closed(Closed::Both)
        .frame()
        .unwrap();
    assert_eq!(stamps(&result), vec![3, 4]);
}

#[test]
fn test_overlapping_write_newest_wins() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series
        .write(&frame(&series, &[1, 2, 3, 4, 5], &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .unwrap();
    series
        .write(&frame(&series, &[3, 4, 5, 6, 7], &[30.0, 40.0, 50.0, 60.0, 70.0]))
        .unwrap();

    let result = series.frame().unwrap();
    assert_eq!(stamps(&result), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(
        values(&result),
        vec![1.0, 2.0, 30.0, 40.0, 50.0, 60.0, 70.0]
    );
}

#[test_case(Closed::Both, &[2, 3, 4]; "both")]
#[test_case(Closed::Left, &[2, 3]; "left")]
#[test_case(Closed::Right, &[3, 4]; "right")]
#[test_case(Closed::None, &[3]; "none")]
fn test_query_closed(closed: Closed, expected: &[i64]) {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series
        .write(&frame(&series, &[1, 2, 3, 4, 5], &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .unwrap();
    let result = series
        .query()
        .start(vec![Value::Timestamp(2)])
        .stop(vec![Value::Timestamp(4)])
        .closed(closed)
        .frame()
        .unwrap();
    assert_eq!(stamps(&result), expected);
}

#[test]
fn test_limit_offset_select() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series
        .write(&frame(&series, &[1, 2, 3, 4, 5], &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .unwrap();

    let result = series
        .query()
        .limit(2)
        .offset(1)
        .select(vec!["stamp".to_string()])
        .frame()
        .unwrap();
    assert_eq!(stamps(&result), vec![2, 3]);
    assert!(result.column("value").is_none());

    // Limit and offset walk across segment boundaries too.
    series.write(&frame(&series, &[6, 7], &[6.0, 7.0])).unwrap();
    let result = series.query().limit(3).offset(4).frame().unwrap();
    assert_eq!(stamps(&result), vec![5, 6, 7]);
}

#[test]
fn test_paginate() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series
        .write(&frame(&series, &[1, 2, 3, 4, 5], &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .unwrap();

    let pages: Vec<Vec<i64>> = series
        .query()
        .paginate(2)
        .unwrap()
        .map(|page| stamps(&page.unwrap()))
        .collect();
    assert_eq!(pages, vec![vec![1, 2], vec![3, 4], vec![5]]);

    assert_matches!(series.query().paginate(0), Err(Error::Invariant(_)));

    // Pagination honors an overall limit.
    let pages: Vec<Vec<i64>> = series
        .query()
        .limit(3)
        .paginate(2)
        .unwrap()
        .map(|page| stamps(&page.unwrap()))
        .collect();
    assert_eq!(pages, vec![vec![1, 2], vec![3]]);
}

#[test]
fn test_before_reads_an_older_version() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series.write(&frame(&series, &[1, 2], &[1.0, 2.0])).unwrap();
    let first_epoch = collection.changelog().leaf().unwrap().unwrap().epoch_ms();
    // Commits are stamped at millisecond resolution.
    std::thread::sleep(std::time::Duration::from_millis(5));
    series.write(&frame(&series, &[1, 2], &[10.0, 20.0])).unwrap();

    let now = series.frame().unwrap();
    assert_eq!(values(&now), vec![10.0, 20.0]);

    let past = series.query().before(first_epoch + 1).frame().unwrap();
    assert_eq!(values(&past), vec![1.0, 2.0]);

    let future_only = series.query().after(first_epoch + 1).frame().unwrap();
    assert_eq!(values(&future_only), vec![10.0, 20.0]);
}

#[test]
fn test_kv_series_last_writer_wins() {
    let repo = Repo::open("memory://").unwrap();
    let columns = vec![
        lakota_lib::schema::ColumnDef::from_spec("key str*").unwrap(),
        lakota_lib::schema::ColumnDef::from_spec("value int").unwrap(),
    ];
    let schema = Schema::kv(columns).unwrap();
    let collection = repo
        .create_collection(&schema, &["settings"], true)
        .unwrap()
        .remove(0);
    let series = collection.series("main").unwrap();

    let write = |keys: &[&str], vals: &[i64]| {
        let frame = Frame::new(
            schema.clone(),
            vec![
                Array::Str(keys.iter().map(|k| k.to_string()).collect()),
                Array::Int(vals.to_vec()),
            ],
        )
        .unwrap();
        series.write(&frame).unwrap();
    };
    write(&["a", "b"], &[1, 2]);
    write(&["b", "c"], &[20, 30]);

    let result = series.frame().unwrap();
    assert_eq!(
        result.column("key").unwrap(),
        &Array::Str(vec!["a".into(), "b".into(), "c".into()])
    );
    assert_eq!(result.column("value").unwrap(), &Array::Int(vec![1, 20, 30]));
}

#[test]
fn test_series_are_isolated_by_label() {
    let collection = timeseries_collection();
    let room = collection.series("room").unwrap();
    let roof = collection.series("roof").unwrap();
    room.write(&frame(&room, &[1, 2], &[1.0, 2.0])).unwrap();
    roof.write(&frame(&roof, &[1, 2], &[-1.0, -2.0])).unwrap();

    assert_eq!(values(&room.frame().unwrap()), vec![1.0, 2.0]);
    assert_eq!(values(&roof.frame().unwrap()), vec![-1.0, -2.0]);
    let mut labels = collection.ls().unwrap();
    labels.sort_unstable();
    assert_eq!(labels, vec!["roof".to_string(), "room".to_string()]);
}

#[test]
fn test_revisions_lists_history() {
    let collection = timeseries_collection();
    let series = collection.series("room").unwrap();
    series.write(&frame(&series, &[1, 2], &[1.0, 2.0])).unwrap();
    series.write(&frame(&series, &[3, 4], &[3.0, 4.0])).unwrap();

    let revisions = series.revisions().unwrap();
    // First commit holds one row, the second holds both.
    assert_eq!(revisions.len(), 3);
    assert_eq!(revisions[0].row.start, vec![Value::Timestamp(1)]);
    assert_eq!(revisions[2].row.start, vec![Value::Timestamp(3)]);
}

#[test]
fn test_invalid_series_label() {
    let collection = timeseries_collection();
    assert_matches!(
        collection.series("no/slashes"),
        Err(Error::InvalidLabel(_))
    );
    assert_matches!(collection.series(""), Err(Error::InvalidLabel(_)));
}
