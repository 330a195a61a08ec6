// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Command-line surface of `wisktrack`.
//!
//! Everything after the first `---` is the target command and is never
//! inspected, so the target's own flags cannot collide with ours:
//!
//! ```text
//! wisktrack --wsroot . --trackfile build/deps --- make -j8 all
//! ```

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "wisktrack",
    version,
    about = "Track the file and process dependencies of a command",
    disable_help_subcommand = true
)]
pub struct Args {
    /// Workspace root; paths under it are reported workspace-relative.
    #[arg(long, value_name = "DIR")]
    pub wsroot: Option<PathBuf>,

    /// Base name for the run artifacts (.raw, .dep, .cmds, .insight).
    #[arg(long, value_name = "BASE")]
    pub trackfile: Option<PathBuf>,

    /// Classification rules file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the cleaned full tree to stdout after the run.
    #[arg(long)]
    pub clean: bool,

    /// Print the raw event stream to stdout after the run.
    #[arg(long)]
    pub show: bool,

    /// Extract the named subtrees (comma-separated UUIDs) from the run.
    #[arg(long, value_name = "UUID[,UUID...]")]
    pub extract: Option<String>,

    /// Event families to record: process,reads,writes,links,chmods.
    #[arg(long, value_name = "FAMILIES")]
    pub filter: Option<String>,

    /// Forward only this variable to the target (repeatable).
    #[arg(long = "environ", value_name = "VAR")]
    pub environ: Vec<String>,

    /// Route interposer diagnostics to stderr.
    #[arg(long)]
    pub trace: bool,

    /// Increase verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Split `argv` at the `---` separator and parse the supervisor's half.
/// The target command is returned verbatim.
pub fn parse_argv(argv: &[String]) -> Result<(Args, Vec<String>), clap::Error> {
    let (ours, command) = match argv.iter().position(|a| a == "---") {
        Some(split) => (argv[..split].to_vec(), argv[split + 1..].to_vec()),
        None => (argv.to_vec(), Vec::new()),
    };
    let args = Args::try_parse_from(ours)?;
    Ok((args, command))
}
