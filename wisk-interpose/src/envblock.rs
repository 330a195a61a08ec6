// Unless explicitly stated otherwise all files in this repository are licensed under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/). Copyright 2021-Present Datadog, Inc.

//! Environment blocks for spawned children.
//!
//! Every wrapped exec or spawn hands the child a rebuilt block: the
//! caller's entries with `WISK_TRACKER_UUID` swapped for the freshly
//! minted child UUID, and the tracker contract (pipe path, preload hook,
//! filter, diagnostics) re-added if the caller stripped it. The storage
//! must stay alive until the real call returns or replaces the image.

use libc::c_char;
use std::ffi::{CStr, CString};
use wisk_common::constants;

pub struct EnvBlock {
    storage: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl EnvBlock {
    /// Build a child block from `base` (a NULL-terminated `envp`; pass the
    /// live `environ` for the exec variants that do not take one).
    ///
    /// # Safety
    /// `base` must be NULL or a valid NULL-terminated array of C strings.
    pub unsafe fn for_child(
        base: *const *const c_char,
        child_uuid: &str,
        contract: &[(String, String)],
    ) -> EnvBlock {
        let mut storage: Vec<CString> = Vec::new();
        let uuid_prefix = format!("{}=", constants::ENV_TRACKER_UUID);

        if !base.is_null() {
            let mut cursor = base;
            while !(*cursor).is_null() {
                let entry = CStr::from_ptr(*cursor);
                if !entry.to_bytes().starts_with(uuid_prefix.as_bytes()) {
                    storage.push(entry.to_owned());
                }
                cursor = cursor.add(1);
            }
        }

        if let Ok(entry) = CString::new(format!("{uuid_prefix}{child_uuid}")) {
            storage.push(entry);
        }
        for (key, value) in contract {
            let prefix = format!("{key}=");
            let present = storage
                .iter()
                .any(|e| e.to_bytes().starts_with(prefix.as_bytes()));
            if !present {
                if let Ok(entry) = CString::new(format!("{prefix}{value}")) {
                    storage.push(entry);
                }
            }
        }

        let mut ptrs: Vec<*const c_char> = storage.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        EnvBlock { storage, ptrs }
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    #[cfg(test)]
    fn entries(&self) -> Vec<String> {
        self.storage
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[&str]) -> (Vec<CString>, Vec<*const c_char>) {
        let owned: Vec<CString> = entries.iter().map(|e| CString::new(*e).unwrap()).collect();
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|e| e.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        (owned, ptrs)
    }

    #[test]
    fn swaps_the_uuid_and_keeps_caller_entries() {
        let (_keep, ptrs) = raw(&["PATH=/bin", "WISK_TRACKER_UUID=parent", "HOME=/root"]);
        let block = unsafe { EnvBlock::for_child(ptrs.as_ptr(), "child-uuid", &[]) };
        let entries = block.entries();
        assert!(entries.contains(&"PATH=/bin".to_string()));
        assert!(entries.contains(&"HOME=/root".to_string()));
        assert!(entries.contains(&"WISK_TRACKER_UUID=child-uuid".to_string()));
        assert!(!entries.iter().any(|e| e.ends_with("=parent")));
    }

    #[test]
    fn reinstates_a_stripped_contract() {
        let (_keep, ptrs) = raw(&["PATH=/bin"]);
        let contract = vec![
            ("WISK_TRACKER_PIPE".to_string(), "/tmp/p".to_string()),
            ("LD_PRELOAD".to_string(), "libwisktrack.so".to_string()),
        ];
        let block = unsafe { EnvBlock::for_child(ptrs.as_ptr(), "child", &contract) };
        let entries = block.entries();
        assert!(entries.contains(&"WISK_TRACKER_PIPE=/tmp/p".to_string()));
        assert!(entries.contains(&"LD_PRELOAD=libwisktrack.so".to_string()));
    }

    #[test]
    fn caller_contract_values_win() {
        let (_keep, ptrs) = raw(&["WISK_TRACKER_PIPE=/caller/pipe"]);
        let contract = vec![("WISK_TRACKER_PIPE".to_string(), "/tmp/p".to_string())];
        let block = unsafe { EnvBlock::for_child(ptrs.as_ptr(), "child", &contract) };
        let entries = block.entries();
        assert!(entries.contains(&"WISK_TRACKER_PIPE=/caller/pipe".to_string()));
        assert!(!entries.contains(&"WISK_TRACKER_PIPE=/tmp/p".to_string()));
    }

    #[test]
    fn block_is_null_terminated() {
        let (_keep, ptrs) = raw(&["A=1"]);
        let block = unsafe { EnvBlock::for_child(ptrs.as_ptr(), "child", &[]) };
        let mut len = 0;
        unsafe {
            let mut cursor = block.as_ptr();
            while !(*cursor).is_null() {
                len += 1;
                cursor = cursor.add(1);
            }
        }
        assert_eq!(len, block.entries().len());
    }
}
