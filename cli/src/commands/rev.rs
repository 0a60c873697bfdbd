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

use anyhow::Result;
use lakota_lib::array::Value;
use lakota_lib::repo::Repo;

use crate::commands::get_collection;
use crate::commands::get_series;

fn render_epoch(epoch_ms: u64) -> String {
    Value::Timestamp((epoch_ms / 1000) as i64).render()
}

fn render_bound(bound: &[Value]) -> String {
    bound
        .iter()
        .map(Value::render)
        .collect::<Vec<_>>()
        .join("/")
}

/// Lists commits: for a series, one line per revision row; for a
/// collection, one line per changelog node; with no label, the
/// collections themselves.
pub fn run(repo: &Repo, label: Option<&str>) -> Result<()> {
    match label {
        Some(label) if label.contains('/') => {
            let series = get_series(repo, label)?;
            for revision in series.revisions()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    render_bound(&revision.row.start),
                    render_bound(&revision.row.stop),
                    revision.row.length,
                    render_epoch(revision.epoch_ms),
                );
            }
        }
        Some(label) => {
            let collection = get_collection(repo, label)?;
            for rev in collection.changelog().log()?.iter() {
                let marker = if rev.is_leaf { "*" } else { "" };
                println!("{}\t{}{}", rev.path(), render_epoch(rev.epoch_ms()), marker);
            }
        }
        None => {
            for label in repo.ls()? {
                println!("{label}");
            }
        }
    }
    Ok(())
}
