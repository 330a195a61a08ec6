// Unless explicitly stated otherwise all files in this repository are licensed under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/). Copyright 2021-Present Datadog, Inc.

//! The run orchestrator.
//!
//! One reader owns the FIFO and the tree on the main thread; the target
//! runs under a separate launcher thread so a blocked pipe read can never
//! prevent the child from being reaped. The run is over when the child is
//! reaped AND the pipe hits end-of-stream (every tracked writer closed).
//!
//! SIGINT does not abort: the handler only raises a flag, the interrupt
//! propagates to the target's process group, writers close, the reader
//! drains what exists, and partial artifacts are still written with
//! incomplete nodes marked.

use crate::classify::Classifier;
use crate::config::TrackerConfig;
use crate::emit;
use crate::extract;
use crate::merge::merge_tree;
use crate::receiver;
use crate::resolve::Resolver;
use crate::tree::ProcessTree;
use anyhow::{bail, Context};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::stat::Mode;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, warn};
use wisk_common::constants::{self, filter};
use wisk_common::uuid::ROOT_UUID;

#[derive(Debug)]
pub struct RunOptions {
    pub wsroot: PathBuf,
    pub trackfile: PathBuf,
    pub config: Option<PathBuf>,
    pub clean: bool,
    pub show: bool,
    pub extract: Vec<String>,
    pub filter_mask: u32,
    pub environ: Vec<String>,
    pub trace: bool,
    pub verbose: u8,
    pub command: Vec<String>,
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

enum LaunchOutcome {
    Exited(std::process::ExitStatus),
    SpawnFailed(std::io::Error),
}

/// Run the whole tracked session. The returned code is the target's exit
/// code; supervisor-internal failures surface as `Err` (exit 2 at main).
pub fn run(opts: &RunOptions) -> anyhow::Result<i32> {
    let config = TrackerConfig::load_or_default(opts.config.as_deref())?;
    let classifier = Classifier::from_config(&config)?;
    let resolver = Resolver::new(&config.interptool_patterns)?;
    let wsroot = opts.wsroot.to_string_lossy().into_owned();

    if opts.command.is_empty() {
        if opts.extract.is_empty() {
            bail!("no target command given (use `--- <command>`)");
        }
        return reprocess(opts, &config, &resolver, &classifier, &wsroot);
    }

    let pipe_path = PathBuf::from(constants::DEFAULT_TRACKER_PIPE);
    create_fifo(&pipe_path)?;
    install_sigint_handler()?;

    let raw_path = emit::artifact_path(&opts.trackfile, "raw");
    let mut raw_writer = BufWriter::new(
        File::create(&raw_path).with_context(|| format!("creating {}", raw_path.display()))?,
    );

    info!(command = %opts.command.join(" "), pipe = %pipe_path.display(), "starting tracked run");

    let launcher = {
        let command = opts.command.clone();
        let env = child_environment(opts);
        let pipe_path = pipe_path.clone();
        thread::spawn(move || {
            let status = Command::new(&command[0])
                .args(&command[1..])
                .env_clear()
                .envs(env)
                .status();
            // Wake the reader even if no interposer ever opened the pipe.
            unblock_reader(&pipe_path);
            match status {
                Ok(status) => LaunchOutcome::Exited(status),
                Err(err) => LaunchOutcome::SpawnFailed(err),
            }
        })
    };

    let mut tree = ProcessTree::new(&wsroot);
    let pipe = File::open(&pipe_path)
        .with_context(|| format!("opening pipe {}", pipe_path.display()))?;
    let stats = receiver::consume(
        BufReader::new(pipe),
        Some(&mut raw_writer),
        &mut tree,
        &resolver,
    )?;
    raw_writer.flush().context("flushing raw stream")?;

    let outcome = match launcher.join() {
        Ok(outcome) => outcome,
        Err(_) => bail!("launcher thread panicked"),
    };
    let _ = std::fs::remove_file(&pipe_path);

    if INTERRUPTED.load(Ordering::SeqCst) {
        warn!("interrupted; emitting partial tree");
    }
    debug!(events = stats.events, malformed = stats.malformed, nodes = tree.len(), "stream drained");

    finalize(opts, &config, &classifier, &resolver, &wsroot, &mut tree, &stats)?;

    let code = match outcome {
        LaunchOutcome::Exited(status) => exit_code_of(status),
        LaunchOutcome::SpawnFailed(err) => {
            eprintln!("wisktrack: {}: {}", opts.command[0], err);
            if err.kind() == ErrorKind::NotFound {
                127
            } else {
                126
            }
        }
    };
    Ok(code)
}

/// Classify, write artifacts, honor --show/--clean/--extract.
fn finalize(
    opts: &RunOptions,
    config: &TrackerConfig,
    classifier: &Classifier,
    resolver: &Resolver,
    wsroot: &str,
    tree: &mut ProcessTree,
    stats: &receiver::StreamStats,
) -> anyhow::Result<()> {
    let insights = classifier.classify_tree(tree);

    let dep_path = emit::artifact_path(&opts.trackfile, "dep");
    let dep = emit::dep_json(tree);
    emit::write_artifact(&dep_path, &dep)?;

    let mut merged = tree.clone();
    merge_tree(&mut merged);
    let cmds_path = emit::artifact_path(&opts.trackfile, "cmds");
    emit::write_artifact(&cmds_path, &emit::cmds_json(&merged, &config.filterfields))?;

    let insight_path = emit::artifact_path(&opts.trackfile, "insight");
    emit::write_artifact(&insight_path, &emit::insight_text(&insights, &stats.pending))?;

    info!(
        dep = %dep_path.display(),
        cmds = %cmds_path.display(),
        insights = insights.len(),
        "artifacts written"
    );

    if opts.show {
        let raw_path = emit::artifact_path(&opts.trackfile, "raw");
        let raw = std::fs::read_to_string(&raw_path)
            .with_context(|| format!("reading {}", raw_path.display()))?;
        print!("{raw}");
    }
    if opts.clean {
        print!("{dep}");
    }

    if !opts.extract.is_empty() {
        run_extract(opts, tree, resolver, wsroot)?;
    }
    Ok(())
}

fn run_extract(
    opts: &RunOptions,
    tree: &ProcessTree,
    resolver: &Resolver,
    wsroot: &str,
) -> anyhow::Result<()> {
    let (keep, missing) = extract::close_over_ancestors(tree, &opts.extract);
    for uuid in &missing {
        warn!(%uuid, "extract: uuid not present in this run");
    }
    let raw_path = emit::artifact_path(&opts.trackfile, "raw");
    let raw = File::open(&raw_path)
        .with_context(|| format!("re-reading {}", raw_path.display()))?;
    let filtered = extract::rebuild_filtered(BufReader::new(raw), &keep, wsroot, resolver)?;
    let out_path = emit::artifact_path(&opts.trackfile, "extract");
    emit::write_artifact(&out_path, &emit::dep_json(&filtered))?;
    info!(extract = %out_path.display(), kept = keep.len(), "extraction written");
    Ok(())
}

/// `--extract` without a command: re-parse an existing raw artifact.
fn reprocess(
    opts: &RunOptions,
    config: &TrackerConfig,
    resolver: &Resolver,
    classifier: &Classifier,
    wsroot: &str,
) -> anyhow::Result<i32> {
    let raw_path = emit::artifact_path(&opts.trackfile, "raw");
    let raw = File::open(&raw_path)
        .with_context(|| format!("opening {}", raw_path.display()))?;
    let mut tree = ProcessTree::new(wsroot);
    let stats = receiver::consume(BufReader::new(raw), None, &mut tree, resolver)?;
    finalize(opts, config, classifier, resolver, wsroot, &mut tree, &stats)?;
    Ok(0)
}

fn create_fifo(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(pipe = %path.display(), "unlinked stale pipe"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("unlinking stale {}", path.display()))
        }
    }
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)
        .with_context(|| format!("creating fifo {}", path.display()))?;
    Ok(())
}

fn install_sigint_handler() -> anyhow::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGINT, &action).context("installing SIGINT handler")?;
    }
    Ok(())
}

/// A FIFO's read-end `open` blocks until some writer arrives. When the
/// target dies without ever loading the interposer, the launcher opens
/// and closes the write end once so the reader observes end-of-stream.
/// `ENXIO` means the reader has not reached its own `open` yet; give it a
/// moment and try again.
fn unblock_reader(pipe_path: &Path) {
    for _ in 0..100 {
        match std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(pipe_path)
        {
            Ok(_) => return,
            Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(_) => return,
        }
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// The environment handed to the target: the forwarded base (all of ours,
/// or just the `--environ` selection) plus the tracker contract.
fn child_environment(opts: &RunOptions) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = if opts.environ.is_empty() {
        std::env::vars().collect()
    } else {
        opts.environ
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect()
    };

    let libdir = interpose_libdir();
    let mut search: Vec<String> = ["lib64", "lib32"]
        .iter()
        .map(|sub| libdir.join(sub).to_string_lossy().into_owned())
        .collect();
    search.push(libdir.to_string_lossy().into_owned());
    if let Some(existing) = env.get(constants::ENV_LD_LIBRARY_PATH) {
        if !existing.is_empty() {
            search.push(existing.clone());
        }
    }

    env.insert(
        constants::ENV_TRACKER_PIPE.to_string(),
        constants::DEFAULT_TRACKER_PIPE.to_string(),
    );
    env.insert(constants::ENV_TRACKER_UUID.to_string(), ROOT_UUID.to_string());
    let debuglevel = if opts.trace {
        opts.verbose.max(2)
    } else {
        opts.verbose.saturating_sub(1)
    };
    env.insert(
        constants::ENV_TRACKER_DEBUGLEVEL.to_string(),
        debuglevel.to_string(),
    );
    env.insert(
        constants::ENV_TRACKER_EVENTFILTER.to_string(),
        opts.filter_mask.to_string(),
    );
    if opts.trace {
        env.insert(constants::ENV_TRACKER_DEBUGLOG_FD.to_string(), "2".to_string());
    }
    env.insert(
        constants::ENV_LD_PRELOAD.to_string(),
        constants::INTERPOSE_SONAME.to_string(),
    );
    env.insert(constants::ENV_LD_LIBRARY_PATH.to_string(), search.join(":"));
    env
}

/// Where the interposer objects live: `WISK_INSTALL_LIB`, or `../lib`
/// relative to this executable.
fn interpose_libdir() -> PathBuf {
    if let Ok(dir) = std::env::var(constants::ENV_INSTALL_LIB) {
        return PathBuf::from(dir);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
        .map(|prefix| prefix.join("lib"))
        .unwrap_or_else(|| PathBuf::from("lib"))
}

/// Map the `--filter` CSV onto the event mask; absent means everything.
pub fn filter_mask(csv: Option<&str>) -> anyhow::Result<u32> {
    match csv {
        None => Ok(filter::ALL),
        Some(csv) => filter::mask_from_names(csv)
            .map_err(|name| anyhow::anyhow!("unknown event family: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_mask_rejects_unknown_families() {
        assert_eq!(filter_mask(None).unwrap(), filter::ALL);
        assert_eq!(filter_mask(Some("reads,writes")).unwrap(), 6);
        assert!(filter_mask(Some("sockets")).is_err());
    }

    #[test]
    fn exit_codes_fold_signals_like_a_shell() {
        use std::process::Command;
        let ok = Command::new("true").status().unwrap();
        assert_eq!(exit_code_of(ok), 0);
        let fail = Command::new("false").status().unwrap();
        assert_eq!(exit_code_of(fail), 1);
    }
}
