// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wrappers for directory-entry creation: hard links, symlinks, renames.
//! All of them report `LINKS [source, target]`.

use super::family_of;
use crate::state::HookGuard;
use crate::{emit, fdpath, real};
use libc::{c_char, c_int};
use wisk_common::Op;

fn record_links(source: *const c_char, target: *const c_char) {
    if let Some(g) = HookGuard::enter() {
        if !g.wants(family_of(Op::Links)) {
            return;
        }
        if let (Some(s), Some(t)) = (fdpath::arg_path(source), fdpath::arg_path(target)) {
            emit::emit_links(g.tracker, &fdpath::absolutize(&s), &fdpath::absolutize(&t));
        }
    }
}

fn record_links_at(
    sourcedirfd: c_int,
    source: *const c_char,
    targetdirfd: c_int,
    target: *const c_char,
) {
    if let Some(g) = HookGuard::enter() {
        if !g.wants(family_of(Op::Links)) {
            return;
        }
        if let (Some(s), Some(t)) = (fdpath::arg_path(source), fdpath::arg_path(target)) {
            emit::emit_links(
                g.tracker,
                &fdpath::absolutize_at(sourcedirfd, &s),
                &fdpath::absolutize_at(targetdirfd, &t),
            );
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn link(oldpath: *const c_char, newpath: *const c_char) -> c_int {
    record_links(oldpath, newpath);
    real::link(oldpath, newpath)
}

#[no_mangle]
pub unsafe extern "C" fn linkat(
    olddirfd: c_int,
    oldpath: *const c_char,
    newdirfd: c_int,
    newpath: *const c_char,
    flags: c_int,
) -> c_int {
    record_links_at(olddirfd, oldpath, newdirfd, newpath);
    real::linkat(olddirfd, oldpath, newdirfd, newpath, flags)
}

#[no_mangle]
pub unsafe extern "C" fn symlink(target: *const c_char, linkpath: *const c_char) -> c_int {
    record_links(target, linkpath);
    real::symlink(target, linkpath)
}

#[no_mangle]
pub unsafe extern "C" fn symlinkat(
    target: *const c_char,
    newdirfd: c_int,
    linkpath: *const c_char,
) -> c_int {
    // The symlink body is stored verbatim; only the link path is relative
    // to the descriptor.
    if let Some(g) = HookGuard::enter() {
        if g.wants(family_of(Op::Links)) {
            if let (Some(s), Some(t)) = (fdpath::arg_path(target), fdpath::arg_path(linkpath)) {
                emit::emit_links(
                    g.tracker,
                    &fdpath::absolutize(&s),
                    &fdpath::absolutize_at(newdirfd, &t),
                );
            }
        }
    }
    real::symlinkat(target, newdirfd, linkpath)
}

#[no_mangle]
pub unsafe extern "C" fn rename(oldpath: *const c_char, newpath: *const c_char) -> c_int {
    record_links(oldpath, newpath);
    real::rename(oldpath, newpath)
}

#[no_mangle]
pub unsafe extern "C" fn renameat(
    olddirfd: c_int,
    oldpath: *const c_char,
    newdirfd: c_int,
    newpath: *const c_char,
) -> c_int {
    record_links_at(olddirfd, oldpath, newdirfd, newpath);
    real::renameat(olddirfd, oldpath, newdirfd, newpath)
}
