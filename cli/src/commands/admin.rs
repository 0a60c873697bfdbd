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

//! Housekeeping commands: squash, pack, delete, truncate, gc.

use anyhow::Result;
use lakota_lib::repo::Repo;

use crate::commands::get_collection;

fn targets(repo: &Repo, collections: &[String]) -> Result<Vec<String>> {
    if collections.is_empty() {
        Ok(repo.ls()?)
    } else {
        Ok(collections.to_vec())
    }
}

pub fn squash(repo: &Repo, collections: &[String]) -> Result<()> {
    for label in targets(repo, collections)? {
        get_collection(repo, &label)?.squash()?;
    }
    Ok(())
}

pub fn pack(repo: &Repo, collections: &[String]) -> Result<()> {
    for label in targets(repo, collections)? {
        get_collection(repo, &label)?.pack()?;
    }
    Ok(())
}

pub fn delete(repo: &Repo, label: &str) -> Result<()> {
    match label.split_once('/') {
        Some((c_label, s_label)) => {
            get_collection(repo, c_label)?.delete(&[s_label])?;
        }
        None => {
            // Make sure the label exists so typos fail loudly.
            get_collection(repo, label)?;
            repo.delete_collection(&[label])?;
        }
    }
    Ok(())
}

pub fn truncate(repo: &Repo, label: &str) -> Result<()> {
    get_collection(repo, label)?.truncate()?;
    Ok(())
}

pub fn gc(repo: &Repo, soft: bool) -> Result<()> {
    let count = repo.gc(soft)?;
    println!("{count}");
    Ok(())
}
