// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-process tracker state, built once at library load.

use crate::{emit, real};
use libc::{c_char, c_int};
use std::cell::Cell;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use wisk_common::constants::{self, filter};
use wisk_common::uuid::ROOT_UUID;
use wisk_common::{Op, ProcessUuid};

/// What the library found in its environment at load time.
pub enum TrackerState {
    /// Contract variables missing or pipe unusable: forward every call,
    /// emit nothing.
    PassThrough,
    Ready(Tracker),
}

pub struct Tracker {
    /// UUID of this process. Events are emitted on its behalf.
    pub uuid: String,
    /// Write end of the tracker FIFO, CLOEXEC cleared.
    pub pipe_fd: c_int,
    /// Event-family mask from `WISK_TRACKER_EVENTFILTER`.
    pub filter: u32,
    /// Serializes record writes within this process.
    pub write_lock: Mutex<()>,
    /// Environment entries every spawned child must carry, snapshotted at
    /// init. `WISK_TRACKER_UUID` is handled separately per child.
    pub contract: Vec<(String, String)>,
    /// `"<uuid> COMPLETE true\n"`, formatted up front so the exit path
    /// only has to `write`.
    complete_record: Vec<u8>,
    debug_level: u8,
    debug_fd: c_int,
}

static STATE: OnceLock<TrackerState> = OnceLock::new();
static COMPLETE_EMITTED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Non-reentrancy ticket for one wrapper invocation. While it lives, nested
/// wrapped calls on the same thread skip their emit paths.
pub struct HookGuard {
    pub tracker: &'static Tracker,
}

impl HookGuard {
    /// Some(guard) when tracking is live and we are not already inside a
    /// wrapper on this thread.
    pub fn enter() -> Option<HookGuard> {
        let tracker = match STATE.get() {
            Some(TrackerState::Ready(t)) => t,
            _ => return None,
        };
        IN_HOOK.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(HookGuard { tracker })
            }
        })
    }

    pub fn wants(&self, family: u32) -> bool {
        self.tracker.filter & family != 0
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        IN_HOOK.with(|flag| flag.set(false));
    }
}

pub fn tracker() -> Option<&'static Tracker> {
    match STATE.get() {
        Some(TrackerState::Ready(t)) => Some(t),
        _ => None,
    }
}

/// Build the tracker from the environment contract and emit the init
/// block. Called from the library constructor; must never fail the host.
pub fn initialize() {
    let state = build_state();
    if let TrackerState::Ready(t) = &state {
        t.debug(1, "tracker initialized");
    }
    let _ = STATE.set(state);
    if let Some(t) = tracker() {
        emit_init_block(t);
        unsafe {
            libc::atexit(complete_atexit);
        }
    }
}

extern "C" fn complete_atexit() {
    emit_complete_once();
}

/// Emit `COMPLETE true` exactly once. Raw write of a preformatted buffer:
/// safe from exit handlers and destructor context.
pub fn emit_complete_once() {
    if COMPLETE_EMITTED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(t) = tracker() {
        unsafe {
            libc::write(
                t.pipe_fd,
                t.complete_record.as_ptr() as *const libc::c_void,
                t.complete_record.len(),
            );
        }
    }
}

fn build_state() -> TrackerState {
    let pipe_path = match std::env::var(constants::ENV_TRACKER_PIPE) {
        Ok(p) if !p.is_empty() => p,
        _ => return TrackerState::PassThrough,
    };
    let env_uuid = match std::env::var(constants::ENV_TRACKER_UUID) {
        Ok(u) if !u.is_empty() => u,
        _ => return TrackerState::PassThrough,
    };

    let pipe_fd = match open_pipe(&pipe_path) {
        Some(fd) => fd,
        None => return TrackerState::PassThrough,
    };

    // A process handed the root sentinel is the supervisor's target: it
    // becomes the root's virtual execution child under a fresh identity.
    let (uuid, spawned_by_root) = if env_uuid == ROOT_UUID {
        (ProcessUuid::generate().as_str().to_string(), true)
    } else {
        (env_uuid, false)
    };
    std::env::set_var(constants::ENV_TRACKER_UUID, &uuid);

    let filter = std::env::var(constants::ENV_TRACKER_EVENTFILTER)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(filter::ALL);
    let debug_level = std::env::var(constants::ENV_TRACKER_DEBUGLEVEL)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(0);
    let debug_fd = open_debug_sink();

    let mut contract = Vec::new();
    for key in [
        constants::ENV_TRACKER_PIPE,
        constants::ENV_TRACKER_DEBUGLEVEL,
        constants::ENV_TRACKER_EVENTFILTER,
        constants::ENV_TRACKER_DEBUGLOG,
        constants::ENV_TRACKER_DEBUGLOG_FD,
        constants::ENV_LD_PRELOAD,
        constants::ENV_LD_LIBRARY_PATH,
    ] {
        if let Ok(value) = std::env::var(key) {
            contract.push((key.to_string(), value));
        }
    }

    // COMPLETE belongs to the process family; an empty record makes the
    // exit path a no-op when that family is filtered out.
    let complete_record = if filter & filter::PROCESS != 0 {
        format!("{} {} true\n", uuid, Op::Complete.as_wire()).into_bytes()
    } else {
        Vec::new()
    };

    let tracker = Tracker {
        uuid,
        pipe_fd,
        filter,
        write_lock: Mutex::new(()),
        contract,
        complete_record,
        debug_level,
        debug_fd,
    };

    if spawned_by_root && filter & filter::PROCESS != 0 {
        emit::emit_calls_from(&tracker, ROOT_UUID, &tracker.uuid);
    }

    TrackerState::Ready(tracker)
}

fn open_pipe(path: &str) -> Option<c_int> {
    let mut bytes = path.as_bytes().to_vec();
    bytes.push(0);
    let cpath = CStr::from_bytes_with_nul(&bytes).ok()?;
    let fd = unsafe { real::open(cpath.as_ptr(), libc::O_WRONLY, 0) };
    if fd < 0 {
        return None;
    }
    // The descriptor must survive exec so long-lived build tools keep
    // their writer reference alive while re-opening by path.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
        }
    }
    Some(fd)
}

fn open_debug_sink() -> c_int {
    if let Ok(fd) = std::env::var(constants::ENV_TRACKER_DEBUGLOG_FD) {
        if let Ok(fd) = fd.parse::<c_int>() {
            return fd;
        }
    }
    if let Ok(path) = std::env::var(constants::ENV_TRACKER_DEBUGLOG) {
        let mut bytes = path.into_bytes();
        bytes.push(0);
        if let Ok(cpath) = CStr::from_bytes_with_nul(&bytes) {
            let fd = unsafe {
                real::open(
                    cpath.as_ptr(),
                    libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
                    0o644,
                )
            };
            if fd >= 0 {
                return fd;
            }
        }
    }
    -1
}

impl Tracker {
    pub fn debug(&self, level: u8, msg: &str) {
        if level > self.debug_level || self.debug_fd < 0 {
            return;
        }
        let line = format!("wisk[{}:{}] {}\n", unsafe { libc::getpid() }, self.uuid, msg);
        unsafe {
            libc::write(
                self.debug_fd,
                line.as_ptr() as *const libc::c_void,
                line.len(),
            );
        }
    }
}

/// Emit the per-process identification block: COMMAND, COMMAND_PATH,
/// WORKING_DIRECTORY, PID, PPID, ENVIRONMENT.
fn emit_init_block(t: &Tracker) {
    if t.filter & filter::PROCESS == 0 {
        return;
    }
    let argv = read_cmdline();
    emit::emit_json(t, Op::Command, &argv);
    emit::emit_json(t, Op::CommandPath, &exe_path().unwrap_or_default());
    emit::emit_json(t, Op::WorkingDirectory, &crate::fdpath::current_dir());
    emit::emit_json(t, Op::Pid, &(unsafe { libc::getpid() }));
    emit::emit_json(t, Op::Ppid, &(unsafe { libc::getppid() }));
    emit::emit_json(t, Op::Environment, &environment());
}

fn read_cmdline() -> Vec<String> {
    let raw = match read_raw("/proc/self/cmdline\0") {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

fn exe_path() -> Option<String> {
    let mut buf = [0u8; libc::PATH_MAX as usize];
    let n = unsafe {
        libc::readlink(
            "/proc/self/exe\0".as_ptr() as *const c_char,
            buf.as_mut_ptr() as *mut c_char,
            buf.len(),
        )
    };
    if n <= 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..n as usize]).into_owned())
}

fn read_raw(path_nul: &'static str) -> Option<Vec<u8>> {
    let fd = unsafe { real::open(path_nul.as_ptr() as *const c_char, libc::O_RDONLY, 0) };
    if fd < 0 {
        return None;
    }
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            out.extend_from_slice(&buf[..n as usize]);
        } else if n == 0 || unsafe { *libc::__errno_location() } != libc::EINTR {
            break;
        }
    }
    unsafe { libc::close(fd) };
    Some(out)
}

extern "C" {
    static environ: *const *const c_char;
}

/// The raw environment block, verbatim. Filtering of `WISK_*` and
/// `LD_PRELOAD` is the supervisor's job so the raw stream stays faithful.
fn environment() -> Vec<String> {
    let mut out = Vec::new();
    unsafe {
        if environ.is_null() {
            return out;
        }
        let mut cursor = environ;
        while !(*cursor).is_null() {
            out.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
            cursor = cursor.add(1);
        }
    }
    out
}
