// Unless explicitly stated otherwise all files in this repository are licensed under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/). Copyright 2021-Present Datadog, Inc.

//! `libwisktrack`: the interposition half of the wisk dependency tracker.
//!
//! Loaded through `LD_PRELOAD` into every traced process, this library
//! wraps the libc entry points that touch files or launch processes and
//! emits one event record per wrapped call onto the tracker FIFO named by
//! `WISK_TRACKER_PIPE`. The supervisor (`wisktrack`) owns the read end and
//! assembles the records into a process tree.
//!
//! Design constraints, in order:
//! - the host program must never observe tracking failure: if the
//!   environment contract is missing or the pipe cannot be opened, every
//!   wrapper degrades to a plain forward to the real implementation;
//! - wrappers must not re-enter other wrappers: real implementations are
//!   resolved with `dlsym(RTLD_NEXT, ..)` once and the emit path only uses
//!   unwrapped primitives;
//! - the exit path that reports `COMPLETE` is async-signal-safe: a raw
//!   `write` of a buffer formatted at init time.

#![cfg(unix)]
#![allow(clippy::missing_safety_doc)]

mod emit;
mod envblock;
mod fdpath;
mod hooks;
mod real;
mod state;

pub use state::{Tracker, TrackerState};

use ctor::{ctor, dtor};

extern "C" {
    fn wisk_varargs_keepalive();
}

/// Library constructor: runs inside every traced process as soon as the
/// dynamic loader maps us, before `main`.
#[ctor]
fn wisk_interpose_init() {
    // Touch the C shim so its object, and the execl family it defines,
    // stay linked into the shared object.
    unsafe { wisk_varargs_keepalive() };
    state::initialize();
}

/// Backstop for processes that bypass `atexit` handlers on the way out.
#[dtor]
fn wisk_interpose_fini() {
    state::emit_complete_once();
}
