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
use clap::Args;
use lakota_lib::repo::Repo;
use lakota_lib::schema::Schema;

#[derive(Args)]
pub struct CreateArgs {
    pub collection: String,

    /// Column specs, e.g. "timestamp timestamp*" "value float | zstd".
    #[arg(required = true)]
    pub columns: Vec<String>,

    /// Use last-writer-wins merge semantics on the index.
    #[arg(long)]
    pub kv: bool,
}

pub fn run(repo: &Repo, args: &CreateArgs) -> Result<()> {
    let specs: Vec<&str> = args.columns.iter().map(String::as_str).collect();
    let mut schema = Schema::from_specs(&specs)?;
    if args.kv {
        schema = Schema::with_kind(
            lakota_lib::schema::SchemaKind::Kv,
            schema.columns().to_vec(),
        )?;
    }
    repo.create_collection(&schema, &[&args.collection], true)?;
    Ok(())
}
