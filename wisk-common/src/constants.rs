// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The environment contract between the supervisor and every traced process.
//!
//! The supervisor sets these variables before spawning the target; the
//! interposition library reads them at load time. A process that finds the
//! pipe or UUID variables missing runs in pass-through mode and emits
//! nothing.

/// Absolute path of the FIFO all interposers write to.
pub const ENV_TRACKER_PIPE: &str = "WISK_TRACKER_PIPE";

/// UUID assigned to the current process.
pub const ENV_TRACKER_UUID: &str = "WISK_TRACKER_UUID";

/// Interposer diagnostic verbosity, 0..5.
pub const ENV_TRACKER_DEBUGLEVEL: &str = "WISK_TRACKER_DEBUGLEVEL";

/// Bitmask over event families, see [`filter`].
pub const ENV_TRACKER_EVENTFILTER: &str = "WISK_TRACKER_EVENTFILTER";

/// Path of the interposer diagnostic sink.
pub const ENV_TRACKER_DEBUGLOG: &str = "WISK_TRACKER_DEBUGLOG";

/// Already-open file descriptor for the interposer diagnostic sink.
pub const ENV_TRACKER_DEBUGLOG_FD: &str = "WISK_TRACKER_DEBUGLOG_FD";

/// Overrides the directory the interposer objects are installed in.
pub const ENV_INSTALL_LIB: &str = "WISK_INSTALL_LIB";

pub const ENV_LD_PRELOAD: &str = "LD_PRELOAD";
pub const ENV_LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";

/// Environment keys with this prefix never survive into tracked node
/// environments and are stripped from rebuilt child environment blocks'
/// reported form.
pub const WISK_ENV_PREFIX: &str = "WISK_";

/// Default FIFO path when the supervisor is not told otherwise.
pub const DEFAULT_TRACKER_PIPE: &str = "/tmp/wisk_tracker.pipe";

/// Default artifact base name, relative to the working directory.
pub const DEFAULT_TRACKFILE_BASE: &str = "wisk_depdata";

/// Shared object name of the interposition library.
pub const INTERPOSE_SONAME: &str = "libwisktrack.so";

/// Event-family bits carried in `WISK_TRACKER_EVENTFILTER`.
pub mod filter {
    pub const PROCESS: u32 = 1;
    pub const READS: u32 = 2;
    pub const WRITES: u32 = 4;
    pub const LINKS: u32 = 8;
    pub const CHMODS: u32 = 16;
    pub const ALL: u32 = PROCESS | READS | WRITES | LINKS | CHMODS;

    /// Parse a comma-separated family list (`process,reads,...`) into a mask.
    /// Unknown names are reported back to the caller.
    pub fn mask_from_names(csv: &str) -> Result<u32, String> {
        let mut mask = 0;
        for name in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            mask |= match name {
                "process" => PROCESS,
                "reads" => READS,
                "writes" => WRITES,
                "links" => LINKS,
                "chmods" => CHMODS,
                other => return Err(other.to_string()),
            };
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::filter;

    #[test]
    fn filter_mask_parses_families() {
        assert_eq!(filter::mask_from_names("process,writes").unwrap(), 5);
        assert_eq!(filter::mask_from_names("reads").unwrap(), filter::READS);
        assert_eq!(
            filter::mask_from_names("process,reads,writes,links,chmods").unwrap(),
            filter::ALL
        );
        assert!(filter::mask_from_names("sockets").is_err());
    }
}
