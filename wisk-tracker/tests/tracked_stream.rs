// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs over synthetic event streams: raw bytes in, artifacts
//! out, the way the supervisor sees a real tracked build.

use wisk_common::codec;
use wisk_common::uuid::ROOT_UUID;
use wisk_common::Op;
use wisk_tracker::classify::{Classifier, CommandType};
use wisk_tracker::config::TrackerConfig;
use wisk_tracker::emit;
use wisk_tracker::merge::merge_tree;
use wisk_tracker::receiver;
use wisk_tracker::resolve::Resolver;
use wisk_tracker::tree::{OpEntry, ProcessTree};

fn consume(stream: &str, wsroot: &str) -> (ProcessTree, receiver::StreamStats) {
    let mut tree = ProcessTree::new(wsroot);
    let resolver = Resolver::new(&TrackerConfig::default().interptool_patterns).unwrap();
    let stats = receiver::consume(stream.as_bytes(), None, &mut tree, &resolver).unwrap();
    (tree, stats)
}

fn record(uuid: &str, op: Op, payload: &serde_json::Value) -> String {
    codec::encode(uuid, op, &payload.to_string()).concat()
}

/// `touch /tmp/run/file1` under the tracker.
#[test]
fn touch_reports_a_write() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("exec00000001")),
        record(
            "exec00000001",
            Op::Command,
            &serde_json::json!(["touch", "/tmp/run/file1"]),
        ),
        record(
            "exec00000001",
            Op::CommandPath,
            &serde_json::json!("/usr/bin/touch"),
        ),
        record("exec00000001", Op::Writes, &serde_json::json!("/tmp/run/file1")),
        record("exec00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, _) = consume(&stream, "/ws");
    let node = tree.get("exec00000001").unwrap();
    assert_eq!(
        node.operations.get("WRITES").unwrap(),
        &vec![OpEntry::Path("/tmp/run/file1".to_string())]
    );
}

/// `cat tests/fixtures/data.txt` with the workspace root at the repo.
#[test]
fn reads_under_the_workspace_are_relative() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("exec00000001")),
        record(
            "exec00000001",
            Op::Reads,
            &serde_json::json!("/repo/tests/fixtures/data.txt"),
        ),
        record("exec00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, _) = consume(&stream, "/repo");
    assert_eq!(
        tree.get("exec00000001").unwrap().operations.get("READS").unwrap(),
        &vec![OpEntry::Path("tests/fixtures/data.txt".to_string())]
    );
}

/// `ln src dst` then `ln -s src sdst`, run from the workspace root.
#[test]
fn links_carry_source_and_target() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("exec00000001")),
        record(
            "exec00000001",
            Op::Links,
            &serde_json::json!(["/ws/src", "/ws/dst"]),
        ),
        record(
            "exec00000001",
            Op::Links,
            &serde_json::json!(["/ws/src", "/ws/sdst"]),
        ),
        record("exec00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, _) = consume(&stream, "/ws");
    assert_eq!(
        tree.get("exec00000001").unwrap().operations.get("LINKS").unwrap(),
        &vec![
            OpEntry::Pair(["src".to_string(), "dst".to_string()]),
            OpEntry::Pair(["src".to_string(), "sdst".to_string()]),
        ]
    );
}

/// `sh -c 'cc -c a.c -o a.o'`: after classification and merge, a single
/// top-level `cc` node carries both processes' file operations and names
/// the shell in `mergedcommands`.
#[test]
fn shell_wrapped_compile_collapses_to_the_compiler() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("shell0000001")),
        record(
            "shell0000001",
            Op::Command,
            &serde_json::json!(["sh", "-c", "cc -c a.c -o a.o"]),
        ),
        record("shell0000001", Op::CommandPath, &serde_json::json!("/bin/sh")),
        record("shell0000001", Op::Pid, &serde_json::json!(100)),
        record("shell0000001", Op::Ppid, &serde_json::json!(99)),
        record("shell0000001", Op::Reads, &serde_json::json!("/etc/profile")),
        record("shell0000001", Op::Calls, &serde_json::json!("cc0000000001")),
        record(
            "cc0000000001",
            Op::Command,
            &serde_json::json!(["cc", "-c", "a.c", "-o", "a.o"]),
        ),
        record("cc0000000001", Op::CommandPath, &serde_json::json!("/usr/bin/cc")),
        record("cc0000000001", Op::Reads, &serde_json::json!("/ws/a.c")),
        record("cc0000000001", Op::Writes, &serde_json::json!("/ws/a.o")),
        record("cc0000000001", Op::Complete, &serde_json::json!(true)),
        record("shell0000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (mut tree, _) = consume(&stream, "/ws");
    let classifier = Classifier::from_config(&TrackerConfig::default()).unwrap();
    classifier.classify_tree(&mut tree);
    merge_tree(&mut tree);

    let root = tree.get(ROOT_UUID).unwrap();
    assert_eq!(root.children, vec!["shell0000001".to_string()]);
    let top = tree.get("shell0000001").unwrap();
    assert_eq!(top.command, vec!["cc", "-c", "a.c", "-o", "a.o"]);
    assert_eq!(top.command_type, CommandType::Hardtool);
    assert_eq!(top.mergedcommands, vec!["sh -c cc -c a.c -o a.o"]);
    let reads = top.operations.get("READS").unwrap();
    assert!(reads.contains(&OpEntry::Path("/etc/profile".to_string())));
    assert!(reads.contains(&OpEntry::Path("a.c".to_string())));
    assert!(top
        .operations
        .get("WRITES")
        .unwrap()
        .contains(&OpEntry::Path("a.o".to_string())));
}

/// `posix_spawn("/bin/cat", ...)`: the spawned child identifies itself
/// with its resolved path and its read.
#[test]
fn spawned_child_identifies_itself() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("parent000001")),
        record("parent000001", Op::Calls, &serde_json::json!("cat000000001")),
        record(
            "cat000000001",
            Op::Command,
            &serde_json::json!(["cat", "/ws/notes.txt"]),
        ),
        record("cat000000001", Op::CommandPath, &serde_json::json!("/bin/cat")),
        record("cat000000001", Op::Reads, &serde_json::json!("/ws/notes.txt")),
        record("cat000000001", Op::Complete, &serde_json::json!(true)),
        record("parent000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, _) = consume(&stream, "/ws");
    let cat = tree.get("cat000000001").unwrap();
    assert_eq!(cat.parent.as_deref(), Some("parent000001"));
    assert_eq!(cat.command_path.as_deref(), Some("/bin/cat"));
    assert_eq!(
        cat.operations.get("READS").unwrap(),
        &vec![OpEntry::Path("notes.txt".to_string())]
    );
}

/// An environment too large for one atomic pipe write arrives as
/// continuation records and reassembles to the process's real environment
/// minus the tracker's own keys.
#[test]
fn oversized_environment_reassembles() {
    let mut entries: Vec<String> = (0..400).map(|i| format!("VAR{i:04}={}", "x".repeat(20))).collect();
    entries.push("WISK_TRACKER_UUID=abcd".to_string());
    entries.push("LD_PRELOAD=libwisktrack.so".to_string());
    let payload = serde_json::to_string(&entries).unwrap();
    let records = codec::encode("exec00000001", Op::Environment, &payload);
    assert!(records.len() > 1, "payload must span several records");

    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("exec00000001")),
        records.concat(),
        record("exec00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, stats) = consume(&stream, "/ws");
    assert!(stats.pending.is_empty());
    let env = &tree.get("exec00000001").unwrap().environment;
    assert_eq!(env.len(), 400);
    assert!(env.keys().all(|k| !k.starts_with("WISK_") && k != "LD_PRELOAD"));
}

/// Round-trip law: rebuilding the tree from the teed raw bytes reproduces
/// the `.dep` artifact byte for byte.
#[test]
fn raw_stream_rebuild_reproduces_dep_exactly() {
    let entries: Vec<String> = (0..300).map(|i| format!("K{i}=v{i}")).collect();
    let env_payload = serde_json::to_string(&entries).unwrap();
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("exec00000001")),
        record(
            "exec00000001",
            Op::Command,
            &serde_json::json!(["make", "all"]),
        ),
        record("exec00000001", Op::CommandPath, &serde_json::json!("/usr/bin/make")),
        record("exec00000001", Op::Pid, &serde_json::json!(4242)),
        record("exec00000001", Op::Ppid, &serde_json::json!(4000)),
        codec::encode("exec00000001", Op::Environment, &env_payload).concat(),
        record("exec00000001", Op::Calls, &serde_json::json!("child0000001")),
        record("child0000001", Op::Command, &serde_json::json!(["cc", "-c", "a.c"])),
        record("child0000001", Op::Reads, &serde_json::json!("/ws/a.c")),
        record("child0000001", Op::Writes, &serde_json::json!("/ws/a.o")),
        record("child0000001", Op::Complete, &serde_json::json!(true)),
        record("exec00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();

    let resolver = Resolver::new(&TrackerConfig::default().interptool_patterns).unwrap();
    let classifier = Classifier::from_config(&TrackerConfig::default()).unwrap();

    // First pass, teeing the raw stream exactly as the supervisor would.
    let mut first = ProcessTree::new("/ws");
    let mut raw = Vec::new();
    receiver::consume(stream.as_bytes(), Some(&mut raw), &mut first, &resolver).unwrap();
    classifier.classify_tree(&mut first);
    let first_dep = emit::dep_json(&first);

    // Second pass over the teed bytes.
    let mut second = ProcessTree::new("/ws");
    receiver::consume(raw.as_slice(), None, &mut second, &resolver).unwrap();
    classifier.classify_tree(&mut second);
    assert_eq!(first_dep, emit::dep_json(&second));
}

/// Tree-wide invariants over a busy stream.
#[test]
fn tree_invariants_hold() {
    let stream = [
        record(ROOT_UUID, Op::Calls, &serde_json::json!("aaaa00000001")),
        record("aaaa00000001", Op::Calls, &serde_json::json!("bbbb00000001")),
        record("aaaa00000001", Op::Calls, &serde_json::json!("bbbb00000001")),
        record(
            "bbbb00000001",
            Op::Environment,
            &serde_json::json!(["PATH=/bin", "WISK_TRACKER_PIPE=/tmp/p"]),
        ),
        record("bbbb00000001", Op::Reads, &serde_json::json!("/ws/x/../y.txt")),
        record("bbbb00000001", Op::Complete, &serde_json::json!(true)),
        record("aaaa00000001", Op::Complete, &serde_json::json!(true)),
    ]
    .concat();
    let (tree, _) = consume(&stream, "/ws");

    for (uuid, node) in tree.iter() {
        // Parent/child agreement, exactly once.
        if let Some(parent) = &node.parent {
            let parent = tree.get(parent).unwrap();
            assert_eq!(
                parent.children.iter().filter(|c| *c == uuid).count(),
                1,
                "child {uuid} listed once"
            );
        }
        // No tracker keys, no parent escapes.
        assert!(node
            .environment
            .keys()
            .all(|k| !k.starts_with("WISK_") && !k.starts_with("LD_PRELOAD")));
        for entries in node.operations.values() {
            for entry in entries {
                let paths: Vec<&str> = match entry {
                    OpEntry::Path(p) => vec![p.as_str()],
                    OpEntry::Pair([s, t]) => vec![s.as_str(), t.as_str()],
                };
                for p in paths {
                    assert!(!p.contains(".."), "{p} escaped normalization");
                }
            }
        }
    }
}
