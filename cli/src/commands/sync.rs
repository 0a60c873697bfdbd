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

pub fn push(repo: &Repo, remote: &str, collections: &[String]) -> Result<()> {
    let remote = Repo::open(remote)?;
    let labels: Vec<&str> = collections.iter().map(String::as_str).collect();
    repo.push(&remote, &labels)?;
    Ok(())
}

pub fn pull(repo: &Repo, remote: &str, collections: &[String]) -> Result<()> {
    let remote = Repo::open(remote)?;
    let labels: Vec<&str> = collections.iter().map(String::as_str).collect();
    repo.pull(&remote, &labels)?;
    Ok(())
}
