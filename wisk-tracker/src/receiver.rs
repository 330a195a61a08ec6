// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The event stream consumer.
//!
//! Reads the FIFO line by line until end-of-stream (every writer closed),
//! tees the verbatim bytes into the `.raw` artifact, and folds decoded
//! events into the tree. A record that fails to decode is logged and
//! skipped; it never aborts the run.

use crate::resolve::Resolver;
use crate::tree::ProcessTree;
use std::io::{BufRead, Write};
use tracing::warn;
use wisk_common::codec::{Decoded, Decoder};

#[derive(Debug, Default)]
pub struct StreamStats {
    pub events: usize,
    pub malformed: usize,
    /// `(uuid, op)` pairs whose multi-line payloads never completed.
    pub pending: Vec<(String, String)>,
}

pub fn consume<R: BufRead>(
    mut reader: R,
    mut raw: Option<&mut dyn Write>,
    tree: &mut ProcessTree,
    resolver: &Resolver,
) -> anyhow::Result<StreamStats> {
    let mut decoder = Decoder::new();
    let mut stats = StreamStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        if let Some(writer) = raw.as_deref_mut() {
            writer.write_all(&buf)?;
        }
        let line = String::from_utf8_lossy(&buf);
        match decoder.decode_line(&line) {
            Decoded::Event(event) => {
                stats.events += 1;
                tree.apply(&event, resolver);
            }
            Decoded::Partial => {}
            Decoded::Malformed(record) => {
                stats.malformed += 1;
                warn!(%record, "skipping malformed record");
            }
        }
    }

    stats.pending = decoder
        .unterminated()
        .map(|(uuid, op)| (uuid.to_string(), op.as_wire().to_string()))
        .collect();
    stats.pending.sort();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisk_common::uuid::ROOT_UUID;

    #[test]
    fn consumes_a_stream_and_tees_raw_bytes() {
        let stream = format!(
            "{root} CALLS \"aaaa\"\n\
             aaaa COMMAND [\"touch\", \"/tmp/run/file1\"]\n\
             aaaa WRITES \"/tmp/run/file1\"\n\
             bad line\n\
             aaaa COMPLETE true\n",
            root = ROOT_UUID
        );
        let mut tree = ProcessTree::new("/ws");
        let resolver = Resolver::new(&[]).unwrap();
        let mut raw = Vec::new();
        let stats = consume(
            stream.as_bytes(),
            Some(&mut raw),
            &mut tree,
            &resolver,
        )
        .unwrap();

        assert_eq!(stats.events, 4);
        assert_eq!(stats.malformed, 1);
        assert!(stats.pending.is_empty());
        assert_eq!(String::from_utf8(raw).unwrap(), stream);
        let node = tree.get("aaaa").unwrap();
        assert!(node.complete);
        assert!(node.operations.get("WRITES").is_some());
    }

    #[test]
    fn split_payloads_reassemble_across_the_stream() {
        let entries: Vec<String> = (0..500).map(|i| format!("VAR{i}=value{i}")).collect();
        let payload = serde_json::to_string(&entries).unwrap();
        let records = wisk_common::codec::encode("aaaa", wisk_common::Op::Environment, &payload);
        assert!(records.len() > 1);
        let stream: String = records.concat();

        let mut tree = ProcessTree::new("/ws");
        let resolver = Resolver::new(&[]).unwrap();
        let stats = consume(stream.as_bytes(), None, &mut tree, &resolver).unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(tree.get("aaaa").unwrap().environment.len(), 500);
    }
}
