// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Subtree extraction (`--extract`).
//!
//! The requested UUID set is closed over its ancestors using the full
//! tree, then the raw stream is re-parsed once keeping only events that
//! belong to the set. UUIDs that never appeared in the run are reported
//! and skipped; extraction is best effort.

use crate::resolve::Resolver;
use crate::tree::ProcessTree;
use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::warn;
use wisk_common::codec::{Decoded, Decoder};
use wisk_common::uuid::ROOT_UUID;
use wisk_common::Op;

/// Close the requested set over its ancestors. Returns the closed set and
/// the UUIDs the run never produced.
pub fn close_over_ancestors(
    tree: &ProcessTree,
    requested: &[String],
) -> (BTreeSet<String>, Vec<String>) {
    let mut keep = BTreeSet::new();
    let mut missing = Vec::new();
    keep.insert(ROOT_UUID.to_string());
    for uuid in requested {
        if tree.get(uuid).is_none() {
            missing.push(uuid.clone());
            continue;
        }
        let mut cursor = Some(uuid.clone());
        while let Some(current) = cursor {
            if !keep.insert(current.clone()) {
                break;
            }
            cursor = tree.get(&current).and_then(|n| n.parent.clone());
        }
    }
    (keep, missing)
}

/// Re-parse the raw stream keeping only events of the closed set.
pub fn rebuild_filtered<R: BufRead>(
    mut raw: R,
    keep: &BTreeSet<String>,
    wsroot: &str,
    resolver: &Resolver,
) -> anyhow::Result<ProcessTree> {
    let mut decoder = Decoder::new();
    let mut tree = ProcessTree::new(wsroot);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = raw.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let event = match decoder.decode_line(&line) {
            Decoded::Event(event) => event,
            Decoded::Partial => continue,
            Decoded::Malformed(record) => {
                warn!(%record, "skipping malformed record during extraction");
                continue;
            }
        };
        if !keep.contains(&event.uuid) {
            continue;
        }
        // A kept parent may call children outside the set.
        if event.op == Op::Calls {
            match event.payload.as_str() {
                Some(child) if keep.contains(child) => {}
                _ => continue,
            }
        }
        tree.apply(&event, resolver);
    }
    Ok(tree)
}
