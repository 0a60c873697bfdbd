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
use lakota_lib::repo::Repo;

use crate::commands::get_collection;
use crate::commands::get_series;

pub fn run(repo: &Repo, label: &str) -> Result<()> {
    let total = if label.contains('/') {
        get_series(repo, label)?.len()?
    } else {
        let collection = get_collection(repo, label)?;
        let mut total = 0;
        for name in collection.ls()? {
            if let Some(series) = collection.get_series(&name)? {
                total += series.len()?;
            }
        }
        total
    };
    println!("{total}");
    Ok(())
}
