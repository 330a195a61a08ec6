// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning the path arguments of wrapped calls into absolute paths.
//!
//! Only unwrapped primitives (`getcwd`, `readlink`) are used here; the
//! emit path must never loop back into a wrapper.

use libc::{c_char, c_int};
use std::ffi::CStr;
use wisk_common::paths;

/// Current working directory, `/` if it cannot be read.
pub fn current_dir() -> String {
    let mut buf = [0u8; libc::PATH_MAX as usize];
    let ptr = unsafe { libc::getcwd(buf.as_mut_ptr() as *mut c_char, buf.len()) };
    if ptr.is_null() {
        return "/".to_string();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Copy a C path argument; None for null or non-UTF8-recoverable input.
pub fn arg_path(path: *const c_char) -> Option<String> {
    if path.is_null() {
        return None;
    }
    let s = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Absolutize a wrapped call's path argument against the working
/// directory.
pub fn absolutize(path: &str) -> String {
    paths::absolutize(path, &current_dir())
}

/// Absolutize a `*at`-style argument against its directory descriptor:
/// absolute paths pass through, `AT_FDCWD` means the working directory,
/// anything else is resolved through `/proc/self/fd`.
pub fn absolutize_at(dirfd: c_int, path: &str) -> String {
    if path.starts_with('/') {
        return paths::normalize(path);
    }
    if dirfd == libc::AT_FDCWD {
        return absolutize(path);
    }
    match fd_dir(dirfd) {
        Some(dir) => paths::absolutize(path, &dir),
        None => absolutize(path),
    }
}

fn fd_dir(fd: c_int) -> Option<String> {
    let link = format!("/proc/self/fd/{fd}\0");
    let mut buf = [0u8; libc::PATH_MAX as usize];
    let n = unsafe {
        libc::readlink(
            link.as_ptr() as *const c_char,
            buf.as_mut_ptr() as *mut c_char,
            buf.len(),
        )
    };
    if n <= 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..n as usize]).into_owned())
}
