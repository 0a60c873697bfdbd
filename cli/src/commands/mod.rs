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
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use lakota_lib::collection::Collection;
use lakota_lib::repo::Repo;
use lakota_lib::series::Series;
use tracing_subscriber::filter::LevelFilter;

mod admin;
mod create;
mod length;
mod ls;
mod read;
mod rev;
mod sync;
mod write;

/// Versioned, concurrent, content-addressed columnar storage.
#[derive(Parser)]
#[command(name = "lakota", version)]
pub struct Cli {
    /// Repo URI; `file://path`, `memory://`, composable with `+` for
    /// cache overlays.
    #[arg(long, env = "LAKOTA_REPO", default_value = ".lakota", global = true)]
    pub repo: String,

    /// Raise log verbosity (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run blocking I/O on a thread pool.
    #[arg(long, global = true)]
    pub threaded: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print series content as CSV.
    Read(read::ReadArgs),
    /// Print the row count of a series or of a whole collection.
    Len {
        label: String,
    },
    /// List the commits holding a series or collection.
    Rev {
        label: Option<String>,
    },
    /// List collections, or the series of one collection.
    Ls {
        collection: Option<String>,
    },
    /// Create a collection from column specs like "name dtype [*] [| codec …]".
    Create(create::CreateArgs),
    /// Write CSV from stdin into a series.
    Write {
        label: String,
    },
    /// Collapse collection histories into single root commits.
    Squash {
        collections: Vec<String>,
    },
    /// Collapse changelog lines without rewriting segments.
    Pack {
        collections: Vec<String>,
    },
    /// Delete a collection, or one series with `collection/series`.
    Delete {
        label: String,
    },
    /// Drop every commit of a collection changelog, keeping segments.
    Truncate {
        label: String,
    },
    /// Remove (or archive) segments no live commit references.
    Gc {
        #[arg(long)]
        soft: bool,
    },
    /// Push collections to a remote repo.
    Push {
        remote: String,
        collections: Vec<String>,
    },
    /// Pull collections from a remote repo.
    Pull {
        remote: String,
        collections: Vec<String>,
    },
}

pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn dispatch(cli: &Cli) -> Result<()> {
    lakota_lib::settings::set_threaded(cli.threaded);
    let repo = Repo::open(&cli.repo)?;
    match &cli.command {
        Command::Read(args) => read::run(&repo, args),
        Command::Len { label } => length::run(&repo, label),
        Command::Rev { label } => rev::run(&repo, label.as_deref()),
        Command::Ls { collection } => ls::run(&repo, collection.as_deref()),
        Command::Create(args) => create::run(&repo, args),
        Command::Write { label } => write::run(&repo, label),
        Command::Squash { collections } => admin::squash(&repo, collections),
        Command::Pack { collections } => admin::pack(&repo, collections),
        Command::Delete { label } => admin::delete(&repo, label),
        Command::Truncate { label } => admin::truncate(&repo, label),
        Command::Gc { soft } => admin::gc(&repo, *soft),
        Command::Push {
            remote,
            collections,
        } => sync::push(&repo, remote, collections),
        Command::Pull {
            remote,
            collections,
        } => sync::pull(&repo, remote, collections),
    }
}

/// Looks up a collection, failing with the label in the message.
pub(crate) fn get_collection(repo: &Repo, label: &str) -> Result<Collection> {
    repo.collection(label)?
        .ok_or_else(|| anyhow!("collection `{label}` not found"))
}

/// Splits `collection/series` and resolves both ends.
pub(crate) fn get_series(repo: &Repo, label: &str) -> Result<Series> {
    let (c_label, s_label) = label
        .split_once('/')
        .ok_or_else(|| anyhow!("label should have the form \"collection/series\""))?;
    let collection = get_collection(repo, c_label)?;
    collection
        .get_series(s_label)?
        .ok_or_else(|| anyhow!("series `{label}` not found"))
}
