// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented wire framing for the tracker FIFO.
//!
//! One record per line: `UUID SPACE OP SPACE JSON NEWLINE`. A payload too
//! large for one atomic pipe write is split into continuation records that
//! carry the same UUID and operation; the decoder accumulates the payload
//! text per `(uuid, op)` until it parses as a JSON value. Parse success is
//! the only termination signal; there are no structural continuation
//! markers.

use crate::event::{Event, Op};
use serde_json::Value;
use std::collections::HashMap;

/// Largest record the interposer writes in one `write` call. Writes at or
/// under `PIPE_BUF` (4096 on Linux) are atomic, which keeps records from
/// different processes from interleaving mid-line.
pub const MAX_RECORD_LEN: usize = 4096;

/// Render one event into wire records, splitting the payload when the line
/// would exceed [`MAX_RECORD_LEN`]. Every returned string ends in a newline.
pub fn encode(uuid: &str, op: Op, payload: &str) -> Vec<String> {
    let header_len = uuid.len() + 1 + op.as_wire().len() + 1;
    let room = MAX_RECORD_LEN - header_len - 1;
    let mut records = Vec::with_capacity(1);
    let mut rest = payload;
    loop {
        let take = chunk_len(rest, room);
        let (chunk, tail) = rest.split_at(take);
        records.push(format!("{} {} {}\n", uuid, op.as_wire(), chunk));
        if tail.is_empty() {
            break;
        }
        rest = tail;
    }
    records
}

// Cut at a char boundary at or below `room` bytes.
fn chunk_len(s: &str, room: usize) -> usize {
    if s.len() <= room {
        return s.len();
    }
    let mut at = room;
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

/// What the decoder made of one input line.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A complete event, possibly reassembled from several records.
    Event(Event),
    /// A continuation was buffered; more records of the same `(uuid, op)`
    /// are expected.
    Partial,
    /// The line is not a well-formed record and was dropped.
    Malformed(String),
}

/// Reassembling decoder for the supervisor side of the FIFO.
///
/// Holds at most one pending payload per `(uuid, op)`; the interposer
/// guarantees continuations of one event are contiguous within a process,
/// and inter-process interleaving can only introduce records of *other*
/// uuids in between, which land in their own buffers.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: HashMap<(String, Op), String>,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder::default()
    }

    pub fn decode_line(&mut self, line: &str) -> Decoded {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut parts = line.splitn(3, ' ');
        let (uuid, opname, chunk) = match (parts.next(), parts.next(), parts.next()) {
            (Some(u), Some(o), Some(c)) if !u.is_empty() => (u, o, c),
            _ => return Decoded::Malformed(line.to_string()),
        };
        let op = match Op::from_wire(opname) {
            Some(op) => op,
            None => return Decoded::Malformed(line.to_string()),
        };

        let key = (uuid.to_string(), op);
        let text = match self.pending.remove(&key) {
            Some(mut buffered) => {
                buffered.push_str(chunk);
                buffered
            }
            None => chunk.to_string(),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(payload) if op.payload_matches(&payload) => Decoded::Event(Event {
                uuid: key.0,
                op,
                payload,
            }),
            Ok(_) => Decoded::Malformed(line.to_string()),
            Err(_) => {
                self.pending.insert(key, text);
                Decoded::Partial
            }
        }
    }

    /// `(uuid, op)` pairs still waiting for continuations, for end-of-stream
    /// diagnostics.
    pub fn unterminated(&self) -> impl Iterator<Item = (&str, Op)> {
        self.pending.iter().map(|((uuid, op), _)| (uuid.as_str(), *op))
    }
}
