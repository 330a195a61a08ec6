// Unless explicitly stated otherwise all files in this repository are licensed under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/). Copyright 2021-Present Datadog, Inc.

//! Wrappers for process launch: the exec family, `posix_spawn`, and
//! `system`.
//!
//! The spawn protocol runs on the parent side of the handoff: mint a child
//! UUID, emit `CALLS` on behalf of the current process, rebuild the
//! environment block so the child identifies as that UUID, then invoke the
//! real call. The child-side identification block is emitted by the
//! interposer's own init once the loader maps us into the new image. A
//! failed exec leaves an orphaned `CALLS`; the supervisor reports it as
//! started-but-aborted.
//!
//! `execl`, `execlp` and `execle` are C-variadic and enter through the C
//! shim in `varargs.c`, which packs the argument list and calls the
//! `wisk_*_entry` exports below.

use crate::envblock::EnvBlock;
use crate::state::HookGuard;
use crate::{emit, real};
use libc::{c_char, c_int, c_void, pid_t};
use std::ffi::CString;
use wisk_common::constants::{self, filter};
use wisk_common::ProcessUuid;

extern "C" {
    static environ: *const *const c_char;
}

/// Mint a child UUID, announce it, and build the environment block the
/// child will identify with.
unsafe fn handoff(g: &HookGuard, base: *const *const c_char) -> EnvBlock {
    let child = ProcessUuid::generate();
    g.tracker.debug(2, &format!("spawn handoff to {child}"));
    emit::emit_calls_from(g.tracker, &g.tracker.uuid, child.as_str());
    EnvBlock::for_child(base, child.as_str(), &g.tracker.contract)
}

#[no_mangle]
pub unsafe extern "C" fn wisk_execve_entry(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let base = if envp.is_null() { environ } else { envp };
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, base);
            return real::execve(path, argv, block.as_ptr());
        }
    }
    real::execve(path, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn wisk_execv_entry(path: *const c_char, argv: *const *const c_char) -> c_int {
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, environ);
            return real::execve(path, argv, block.as_ptr());
        }
    }
    real::execve(path, argv, environ)
}

#[no_mangle]
pub unsafe extern "C" fn wisk_execvp_entry(
    file: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, environ);
            return real::execvpe(file, argv, block.as_ptr());
        }
    }
    real::execvpe(file, argv, environ)
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    wisk_execve_entry(path, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    wisk_execv_entry(path, argv)
}

#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    wisk_execvp_entry(file, argv)
}

#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let base = if envp.is_null() { environ } else { envp };
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, base);
            return real::execvpe(file, argv, block.as_ptr());
        }
    }
    real::execvpe(file, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const c_void,
    attrp: *const c_void,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let base = if envp.is_null() { environ } else { envp };
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, base);
            return real::posix_spawn(pid, path, file_actions, attrp, argv, block.as_ptr());
        }
    }
    real::posix_spawn(pid, path, file_actions, attrp, argv, envp)
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const c_void,
    attrp: *const c_void,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let base = if envp.is_null() { environ } else { envp };
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let block = handoff(&g, base);
            return real::posix_spawnp(pid, file, file_actions, attrp, argv, block.as_ptr());
        }
    }
    real::posix_spawnp(pid, file, file_actions, attrp, argv, envp)
}

/// `system` runs `sh -c` with the live environment, so the child UUID is
/// swapped into our own environ around the call and restored afterwards.
/// The emit lock is not needed; `HookGuard` keeps this thread out of other
/// wrappers and glibc forks internally without passing through our
/// exports.
#[no_mangle]
pub unsafe extern "C" fn system(command: *const c_char) -> c_int {
    if command.is_null() {
        return real::system(command);
    }
    if let Some(g) = HookGuard::enter() {
        if g.wants(filter::PROCESS) {
            let child = ProcessUuid::generate();
            emit::emit_calls_from(g.tracker, &g.tracker.uuid, child.as_str());
            set_tracker_uuid(child.as_str());
            let rc = real::system(command);
            set_tracker_uuid(&g.tracker.uuid);
            return rc;
        }
    }
    real::system(command)
}

fn set_tracker_uuid(uuid: &str) {
    if let (Ok(key), Ok(value)) = (
        CString::new(constants::ENV_TRACKER_UUID),
        CString::new(uuid),
    ) {
        unsafe { libc::setenv(key.as_ptr(), value.as_ptr(), 1) };
    }
}
