// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wrappers for permission changes: `chmod` and `fchmodat`.

use super::family_of;
use crate::state::HookGuard;
use crate::{emit, fdpath, real};
use libc::{c_char, c_int, mode_t};
use wisk_common::Op;

#[no_mangle]
pub unsafe extern "C" fn chmod(path: *const c_char, mode: mode_t) -> c_int {
    if let Some(g) = HookGuard::enter() {
        if g.wants(family_of(Op::Chmod)) {
            if let Some(p) = fdpath::arg_path(path) {
                emit::emit_path(g.tracker, Op::Chmod, &fdpath::absolutize(&p));
            }
        }
    }
    real::chmod(path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fchmodat(
    dirfd: c_int,
    path: *const c_char,
    mode: mode_t,
    flags: c_int,
) -> c_int {
    if let Some(g) = HookGuard::enter() {
        if g.wants(family_of(Op::Chmod)) {
            if let Some(p) = fdpath::arg_path(path) {
                emit::emit_path(g.tracker, Op::Chmod, &fdpath::absolutize_at(dirfd, &p));
            }
        }
    }
    real::fchmodat(dirfd, path, mode, flags)
}
