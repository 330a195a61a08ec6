// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracked operations and the event records carried on the FIFO.

use serde_json::Value;
use std::fmt;

/// Every operation a traced process can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    /// Parent announces a freshly minted child UUID before handing off.
    Calls,
    /// argv of the process, as an array of strings.
    Command,
    /// Resolved absolute path of the executable.
    CommandPath,
    /// Absolute working directory at exec time.
    WorkingDirectory,
    /// `KEY=VALUE` strings, the raw environment block.
    Environment,
    Pid,
    Ppid,
    Reads,
    Writes,
    /// Two-element `[source, target]` array.
    Links,
    Unlink,
    Chmod,
    /// Emitted from the exit path; payload is `true`.
    Complete,
}

impl Op {
    pub const ALL: [Op; 13] = [
        Op::Calls,
        Op::Command,
        Op::CommandPath,
        Op::WorkingDirectory,
        Op::Environment,
        Op::Pid,
        Op::Ppid,
        Op::Reads,
        Op::Writes,
        Op::Links,
        Op::Unlink,
        Op::Chmod,
        Op::Complete,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            Op::Calls => "CALLS",
            Op::Command => "COMMAND",
            Op::CommandPath => "COMMAND_PATH",
            Op::WorkingDirectory => "WORKING_DIRECTORY",
            Op::Environment => "ENVIRONMENT",
            Op::Pid => "PID",
            Op::Ppid => "PPID",
            Op::Reads => "READS",
            Op::Writes => "WRITES",
            Op::Links => "LINKS",
            Op::Unlink => "UNLINK",
            Op::Chmod => "CHMOD",
            Op::Complete => "COMPLETE",
        }
    }

    pub fn from_wire(s: &str) -> Option<Op> {
        Op::ALL.iter().copied().find(|op| op.as_wire() == s)
    }

    /// Whether a decoded payload has the JSON shape this operation carries.
    pub fn payload_matches(&self, payload: &Value) -> bool {
        match self {
            Op::Calls | Op::CommandPath | Op::WorkingDirectory => payload.is_string(),
            Op::Reads | Op::Writes | Op::Unlink | Op::Chmod => payload.is_string(),
            Op::Command | Op::Environment => payload
                .as_array()
                .map(|a| a.iter().all(Value::is_string))
                .unwrap_or(false),
            Op::Links => payload
                .as_array()
                .map(|a| a.len() == 2 && a.iter().all(Value::is_string))
                .unwrap_or(false),
            Op::Pid | Op::Ppid => payload.is_i64() || payload.is_u64(),
            Op::Complete => payload.is_boolean(),
        }
    }

    /// File-system operations recorded in a node's `operations` map, as
    /// opposed to field-setting and lifecycle operations.
    pub fn is_path_op(&self) -> bool {
        matches!(
            self,
            Op::Reads | Op::Writes | Op::Links | Op::Unlink | Op::Chmod
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One decoded record from the FIFO.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uuid: String,
    pub op: Op,
    pub payload: Value,
}

impl Event {
    pub fn new(uuid: impl Into<String>, op: Op, payload: Value) -> Self {
        Event {
            uuid: uuid.into(),
            op,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_round_trip() {
        for op in Op::ALL {
            assert_eq!(Op::from_wire(op.as_wire()), Some(op));
        }
        assert_eq!(Op::from_wire("OPENS"), None);
    }

    #[test]
    fn payload_shapes() {
        assert!(Op::Calls.payload_matches(&json!("abcd")));
        assert!(Op::Command.payload_matches(&json!(["cc", "-c", "a.c"])));
        assert!(!Op::Command.payload_matches(&json!("cc -c a.c")));
        assert!(Op::Links.payload_matches(&json!(["src", "dst"])));
        assert!(!Op::Links.payload_matches(&json!(["src"])));
        assert!(Op::Pid.payload_matches(&json!(4711)));
        assert!(Op::Complete.payload_matches(&json!(true)));
        assert!(!Op::Complete.payload_matches(&json!("true?")));
    }
}
