// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The `wisktrack` supervisor binary.
//!
//! Exit code: the target's own exit code, or 0/1/2 for supervisor
//! success / user error / internal error.

use tracing_subscriber::filter::LevelFilter;
use wisk_common::constants::DEFAULT_TRACKFILE_BASE;
use wisk_tracker::supervisor::{self, RunOptions};
use wisk_tracker::cli;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let argv: Vec<String> = std::env::args().collect();
    let (args, command) = match cli::parse_argv(&argv) {
        Ok(parsed) => parsed,
        Err(err) => {
            // clap renders --help/--version through the error path too.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return code;
        }
    };

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("wisktrack: cannot determine working directory: {err}");
            return 2;
        }
    };

    let filter_mask = match supervisor::filter_mask(args.filter.as_deref()) {
        Ok(mask) => mask,
        Err(err) => {
            eprintln!("wisktrack: {err}");
            return 1;
        }
    };

    let extract: Vec<String> = args
        .extract
        .as_deref()
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let opts = RunOptions {
        wsroot: args.wsroot.unwrap_or_else(|| cwd.clone()),
        trackfile: args
            .trackfile
            .unwrap_or_else(|| cwd.join(DEFAULT_TRACKFILE_BASE)),
        config: args.config,
        clean: args.clean,
        show: args.show,
        extract,
        filter_mask,
        environ: args.environ,
        trace: args.trace,
        verbose: args.verbose,
        command,
    };

    if opts.command.is_empty() && opts.extract.is_empty() {
        eprintln!("wisktrack: no target command given (use `--- <command>`)");
        return 1;
    }

    match supervisor::run(&opts) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run failed");
            2
        }
    }
}
