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

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use lakota_lib::frame::Frame;
use lakota_lib::repo::Repo;

use crate::commands::get_collection;

/// Reads CSV from stdin (header row first) into `collection/series`.
/// The series springs into existence on first write.
pub fn run(repo: &Repo, label: &str) -> Result<()> {
    let (c_label, s_label) = label
        .split_once('/')
        .ok_or_else(|| anyhow!("label should have the form \"collection/series\""))?;
    let collection = get_collection(repo, c_label)?;
    let series = collection.series(s_label)?;
    let schema = series.schema().clone();

    let mut reader = csv::Reader::from_reader(std::io::stdin());
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(|name| name.to_string())
        .collect();
    for col in schema.columns() {
        if !headers.iter().any(|name| name == col.name()) {
            bail!("CSV input misses column `{}`", col.name());
        }
    }
    let mut arrays: Vec<_> = schema
        .columns()
        .iter()
        .map(|col| col.dtype().empty_array())
        .collect();
    let positions: Vec<usize> = schema
        .columns()
        .iter()
        .map(|col| {
            headers
                .iter()
                .position(|name| name == col.name())
                .expect("checked above")
        })
        .collect();
    for record in reader.records() {
        let record = record.context("reading CSV row")?;
        for ((col, arr), &pos) in schema.columns().iter().zip(&mut arrays).zip(&positions) {
            let cell = record
                .get(pos)
                .ok_or_else(|| anyhow!("short CSV row: {record:?}"))?;
            arr.push(col.parse_value(cell)?)?;
        }
    }
    let frame = Frame::new(schema, arrays)?.sorted();
    series.write(&frame)?;
    Ok(())
}
