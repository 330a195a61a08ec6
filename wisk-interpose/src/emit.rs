// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event emission onto the tracker FIFO.
//!
//! Records are framed by `wisk_common::codec` and written under the
//! per-process lock so continuations of one event stay contiguous in this
//! process's output. Each record fits in `PIPE_BUF`, so concurrent writers
//! in other processes can only interleave between records, never inside
//! one. A failed write (`EPIPE`, supervisor gone) drops the event and the
//! host program never notices.

use crate::state::Tracker;
use libc::c_void;
use serde::Serialize;
use wisk_common::codec;
use wisk_common::Op;

pub fn emit_json<T: Serialize>(t: &Tracker, op: Op, payload: &T) {
    let json = match serde_json::to_string(payload) {
        Ok(json) => json,
        Err(_) => return,
    };
    emit_raw(t, &t.uuid, op, &json);
}

/// `READS`/`WRITES`/`UNLINK`/`CHMOD`-style single-path events.
pub fn emit_path(t: &Tracker, op: Op, path: &str) {
    emit_json(t, op, &path);
}

/// `LINKS [source, target]`.
pub fn emit_links(t: &Tracker, source: &str, target: &str) {
    emit_json(t, Op::Links, &[source, target]);
}

/// `CALLS` emitted on behalf of `from` (normally our own UUID; the root
/// sentinel when announcing ourselves as the supervisor's target).
pub fn emit_calls_from(t: &Tracker, from: &str, child: &str) {
    let json = match serde_json::to_string(child) {
        Ok(json) => json,
        Err(_) => return,
    };
    emit_raw(t, from, Op::Calls, &json);
}

fn emit_raw(t: &Tracker, uuid: &str, op: Op, json: &str) {
    let records = codec::encode(uuid, op, json);
    let _lock = match t.write_lock.lock() {
        Ok(lock) => lock,
        Err(poisoned) => poisoned.into_inner(),
    };
    for record in &records {
        if !write_record(t.pipe_fd, record.as_bytes()) {
            return;
        }
    }
}

fn write_record(fd: libc::c_int, mut buf: &[u8]) -> bool {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
        if n < 0 {
            let errno = unsafe { *libc::__errno_location() };
            if errno == libc::EINTR {
                continue;
            }
            return false;
        }
        buf = &buf[n as usize..];
    }
    true
}
