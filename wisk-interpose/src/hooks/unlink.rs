// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wrappers for `unlink`, `unlinkat` and `remove`.

use super::family_of;
use crate::state::HookGuard;
use crate::{emit, fdpath, real};
use libc::{c_char, c_int};
use wisk_common::Op;

fn record_unlink(path: *const c_char) {
    if let Some(g) = HookGuard::enter() {
        if !g.wants(family_of(Op::Unlink)) {
            return;
        }
        if let Some(p) = fdpath::arg_path(path) {
            emit::emit_path(g.tracker, Op::Unlink, &fdpath::absolutize(&p));
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn unlink(path: *const c_char) -> c_int {
    record_unlink(path);
    real::unlink(path)
}

#[no_mangle]
pub unsafe extern "C" fn unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int {
    if let Some(g) = HookGuard::enter() {
        if g.wants(family_of(Op::Unlink)) {
            if let Some(p) = fdpath::arg_path(path) {
                emit::emit_path(g.tracker, Op::Unlink, &fdpath::absolutize_at(dirfd, &p));
            }
        }
    }
    real::unlinkat(dirfd, path, flags)
}

#[no_mangle]
pub unsafe extern "C" fn remove(path: *const c_char) -> c_int {
    record_unlink(path);
    real::remove(path)
}
