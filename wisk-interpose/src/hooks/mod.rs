// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The interposed libc surface.
//!
//! Each wrapper emits its event first (path operations) or around the real
//! call (process operations), then forwards to the implementation resolved
//! in [`crate::real`]. Emission is skipped, never the forward, when
//! tracking is degraded or the thread is already inside a wrapper.

mod chmod;
mod exec;
mod link;
mod open;
mod unlink;

use libc::c_int;
use wisk_common::constants::filter;
use wisk_common::Op;

/// Event-family bit for a file operation, for the `EVENTFILTER` mask.
pub(crate) fn family_of(op: Op) -> u32 {
    match op {
        Op::Reads => filter::READS,
        Op::Writes => filter::WRITES,
        // Directory-entry operations share one family.
        Op::Links | Op::Unlink => filter::LINKS,
        Op::Chmod => filter::CHMODS,
        _ => filter::PROCESS,
    }
}

/// `open`-style flag classification: any write intent makes it a `WRITES`.
pub(crate) fn op_for_flags(flags: c_int) -> Op {
    let write_bits = libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC | libc::O_APPEND;
    if flags & write_bits != 0 {
        Op::Writes
    } else {
        Op::Reads
    }
}

/// `fopen` mode strings: `r` and `rb` read; `w`, `a` and any `+` write.
pub(crate) fn op_for_fopen_mode(mode: &str) -> Op {
    if mode.contains('w') || mode.contains('a') || mode.contains('+') {
        Op::Writes
    } else {
        Op::Reads
    }
}
