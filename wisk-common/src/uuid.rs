// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Short per-process identifiers.
//!
//! These are not RFC-4122 UUIDs. A generated identifier packs a truncated
//! nanosecond timestamp with random bits into ten bytes and encodes them
//! URL-safe base64, giving a fourteen character token that is unique for the
//! lifetime of a run. The root of every run is the fixed sentinel below; the
//! supervisor hands it to the target, and the interposer mints fresh
//! identifiers for everything spawned underneath.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed identifier of the root node of every tracked run.
pub const ROOT_UUID: &str = "XXXXXXXX-XXXXXXXX-XXXXXXXX";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessUuid(String);

impl ProcessUuid {
    /// Mint a fresh identifier: 4 timestamp-derived bytes, 6 random bytes.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut bytes = [0u8; 10];
        // Keep the fast-moving part of the clock; the slow bits add nothing
        // within one run.
        bytes[..4].copy_from_slice(&((nanos >> 10) as u32).to_be_bytes());
        rand::thread_rng().fill(&mut bytes[4..]);
        ProcessUuid(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn root() -> Self {
        ProcessUuid(ROOT_UUID.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_UUID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessUuid {
    fn from(s: &str) -> Self {
        ProcessUuid(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuid_is_short_and_url_safe() {
        let id = ProcessUuid::generate();
        assert_eq!(id.as_str().len(), 14);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!id.is_root());
    }

    #[test]
    fn generated_uuids_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(ProcessUuid::generate()));
        }
    }

    #[test]
    fn root_is_the_sentinel() {
        assert_eq!(ProcessUuid::root().as_str(), ROOT_UUID);
        assert!(ProcessUuid::root().is_root());
    }
}
