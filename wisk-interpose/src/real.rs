// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! "Next symbol" resolution for the wrapped libc entry points.
//!
//! Every wrapper forwards to the implementation that would have been used
//! had this library not been preloaded, looked up once per symbol with
//! `dlsym(RTLD_NEXT, ..)` and cached. Calling the symbol by name from Rust
//! would loop straight back into our own export.

use libc::{c_char, c_int, c_void, mode_t};
use std::sync::OnceLock;

unsafe fn next_sym(name: &'static str) -> *mut c_void {
    debug_assert!(name.ends_with('\0'));
    let ptr = libc::dlsym(libc::RTLD_NEXT, name.as_ptr() as *const c_char);
    if ptr.is_null() {
        // A wrapped symbol that does not exist underneath us cannot be
        // forwarded; carrying on would mean looping into ourselves.
        libc::abort();
    }
    ptr
}

macro_rules! real_fns {
    ($(fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        $(
            pub unsafe fn $name($($arg: $ty),*) -> $ret {
                static REAL: OnceLock<usize> = OnceLock::new();
                let addr = *REAL.get_or_init(|| {
                    next_sym(concat!(stringify!($name), "\0")) as usize
                });
                let f: unsafe extern "C" fn($($ty),*) -> $ret =
                    std::mem::transmute(addr);
                f($($arg),*)
            }
        )*
    };
}

real_fns! {
    fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int;
    fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int;
    fn openat(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int;
    fn openat64(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int;
    fn creat(path: *const c_char, mode: mode_t) -> c_int;
    fn creat64(path: *const c_char, mode: mode_t) -> c_int;
    fn fopen(path: *const c_char, mode: *const c_char) -> *mut c_void;
    fn fopen64(path: *const c_char, mode: *const c_char) -> *mut c_void;

    fn link(oldpath: *const c_char, newpath: *const c_char) -> c_int;
    fn linkat(olddirfd: c_int, oldpath: *const c_char, newdirfd: c_int, newpath: *const c_char, flags: c_int) -> c_int;
    fn symlink(target: *const c_char, linkpath: *const c_char) -> c_int;
    fn symlinkat(target: *const c_char, newdirfd: c_int, linkpath: *const c_char) -> c_int;
    fn rename(oldpath: *const c_char, newpath: *const c_char) -> c_int;
    fn renameat(olddirfd: c_int, oldpath: *const c_char, newdirfd: c_int, newpath: *const c_char) -> c_int;

    fn unlink(path: *const c_char) -> c_int;
    fn unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int;
    fn remove(path: *const c_char) -> c_int;

    fn chmod(path: *const c_char, mode: mode_t) -> c_int;
    fn fchmodat(dirfd: c_int, path: *const c_char, mode: mode_t, flags: c_int) -> c_int;

    fn execve(path: *const c_char, argv: *const *const c_char, envp: *const *const c_char) -> c_int;
    fn execvpe(file: *const c_char, argv: *const *const c_char, envp: *const *const c_char) -> c_int;
    fn system(command: *const c_char) -> c_int;

    fn posix_spawn(pid: *mut libc::pid_t, path: *const c_char,
                   file_actions: *const c_void, attrp: *const c_void,
                   argv: *const *const c_char, envp: *const *const c_char) -> c_int;
    fn posix_spawnp(pid: *mut libc::pid_t, file: *const c_char,
                    file_actions: *const c_void, attrp: *const c_void,
                    argv: *const *const c_char, envp: *const *const c_char) -> c_int;
}
