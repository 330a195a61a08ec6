// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wrappers for the open family: `open`/`openat`/`creat`/`fopen` and their
//! LFS variants.

use super::{family_of, op_for_flags, op_for_fopen_mode};
use crate::state::HookGuard;
use crate::{emit, fdpath, real};
use libc::{c_char, c_int, c_void, mode_t};
use std::ffi::CStr;
use wisk_common::Op;

fn record_open(path: *const c_char, flags: c_int) {
    if let Some(g) = HookGuard::enter() {
        if let Some(p) = fdpath::arg_path(path) {
            let op = op_for_flags(flags);
            if g.wants(family_of(op)) {
                emit::emit_path(g.tracker, op, &fdpath::absolutize(&p));
            }
        }
    }
}

fn record_openat(dirfd: c_int, path: *const c_char, flags: c_int) {
    if let Some(g) = HookGuard::enter() {
        if let Some(p) = fdpath::arg_path(path) {
            let op = op_for_flags(flags);
            if g.wants(family_of(op)) {
                emit::emit_path(g.tracker, op, &fdpath::absolutize_at(dirfd, &p));
            }
        }
    }
}

fn record_path(op: Op, path: *const c_char) {
    if let Some(g) = HookGuard::enter() {
        if let Some(p) = fdpath::arg_path(path) {
            if g.wants(family_of(op)) {
                emit::emit_path(g.tracker, op, &fdpath::absolutize(&p));
            }
        }
    }
}

fn record_fopen(path: *const c_char, mode: *const c_char) {
    if let Some(g) = HookGuard::enter() {
        let mode = if mode.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(mode) }.to_string_lossy().into_owned()
        };
        if let Some(p) = fdpath::arg_path(path) {
            let op = op_for_fopen_mode(&mode);
            if g.wants(family_of(op)) {
                emit::emit_path(g.tracker, op, &fdpath::absolutize(&p));
            }
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    record_open(path, flags);
    real::open(path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    record_open(path, flags);
    real::open64(path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    record_openat(dirfd, path, flags);
    real::openat(dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    record_openat(dirfd, path, flags);
    real::openat64(dirfd, path, flags, mode)
}

#[no_mangle]
pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
    record_path(Op::Writes, path);
    real::creat(path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn creat64(path: *const c_char, mode: mode_t) -> c_int {
    record_path(Op::Writes, path);
    real::creat64(path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut c_void {
    record_fopen(path, mode);
    real::fopen(path, mode)
}

#[no_mangle]
pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut c_void {
    record_fopen(path, mode);
    real::fopen64(path, mode)
}
