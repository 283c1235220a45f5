#![deny(clippy::pedantic)]
#![deny(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]
use std::io::Read;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use clap_derive::Args;
use clio::Input;
use fixation_cli::replay::{replay, ReplayKeeper};
use fixation_cli::script::Script;
use fixation_registry::{Context, LogSink};
use itertools::Itertools;
use log::debug;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Args)]
pub struct QueryArgs {
    script: Input,
    /// Height to read at. Defaults to the last block of the script.
    #[arg(long)]
    height: Option<u64>,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Replay a block script and print what happened.
    Replay { script: Input },
    /// Replay a block script, then print a project as of a height.
    Project {
        #[command(flatten)]
        query: QueryArgs,
        id: String,
    },
    /// Replay a block script, then print the project a developer key
    /// belongs to as of a height.
    Developer {
        #[command(flatten)]
        query: QueryArgs,
        key: String,
    },
    /// Replay a block script, then list the projects live at a height.
    Indices {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Replay a block script, then print every stored version of a project.
    History { script: Input, id: String },
}

fn load_script(mut input: Input) -> Result<Script> {
    let mut source = String::new();
    input
        .read_to_string(&mut source)
        .with_context(|| format!("failed to read {}", input.path().display()))?;
    debug!("read {} bytes of script", source.len());
    source.parse()
}

/// Replay the script behind `query` and resolve the height to read at.
fn replay_query(query: QueryArgs) -> Result<(ReplayKeeper, u64)> {
    let script = load_script(query.script)?;
    let height = query.height.unwrap_or_else(|| script.last_height());
    let (keeper, _) = replay(&script, &LogSink)?;
    Ok((keeper, height))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();
    match cli.command {
        Command::Replay { script } => {
            let script = load_script(script)?;
            let (keeper, report) = replay(&script, &LogSink)?;
            println!(
                "blocks: {}, applied: {}, rejected: {}, pruned: {}",
                report.blocks, report.applied, report.failed, report.pruned
            );
            println!("projects: [{}]", keeper.project_ids(script.last_height())?.iter().join(", "));
        }
        Command::Project { query, id } => {
            let (keeper, height) = replay_query(query)?;
            let ctx = Context::new(height, &LogSink);
            let project = keeper.get_project_for_block(&ctx, &id, height)?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Command::Developer { query, key } => {
            let (keeper, height) = replay_query(query)?;
            let ctx = Context::new(height, &LogSink);
            let (project, vrfpk) = keeper.get_project_for_developer(&ctx, &key, height)?;
            println!("vrfpk: {vrfpk}");
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Command::Indices { query } => {
            let (keeper, height) = replay_query(query)?;
            keeper.project_ids(height)?.iter().for_each(|id| println!("{id}"));
        }
        Command::History { script, id } => {
            let script = load_script(script)?;
            let (keeper, _) = replay(&script, &LogSink)?;
            for entry in keeper.projects().get_entry_versions(&id)? {
                println!(
                    "{}..{} refs={}",
                    entry.created_at,
                    entry.deleted_at.map_or_else(String::new, |h| h.to_string()),
                    entry.refs.get()
                );
            }
        }
    }
    Ok(())
}
