// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Artifact serialization: the `.dep` full tree, the `.cmds` merged tree,
//! and the insight diagnostics.
//!
//! Artifact bytes are deterministic: nodes are keyed by UUID in a
//! `BTreeMap`, environments and operations are ordered maps, and the same
//! tree always serializes identically, so rebuilding from the `.raw`
//! stream reproduces `.dep` byte for byte.

use crate::classify::Insight;
use crate::tree::ProcessTree;
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `<base>.<ext>` next to whatever directory the base names.
pub fn artifact_path(base: &Path, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}.{ext}", base.display()))
}

/// Strip every environment entry a node shares with its parent, top-down,
/// so each node shows only its overrides. Reversed by
/// [`expand_environments`].
pub fn compact_environments(tree: &mut ProcessTree) {
    let mut order = tree.post_order();
    order.reverse();
    for uuid in order {
        let parent_env = match tree.get(&uuid).and_then(|n| n.parent.clone()) {
            Some(parent) => match tree.get(&parent) {
                Some(p) => p.environment.clone(),
                None => continue,
            },
            None => continue,
        };
        if let Some(node) = tree.get_mut(&uuid) {
            node.environment
                .retain(|key, value| parent_env.get(key) != Some(value));
        }
    }
}

/// Rebuild full environments from compacted ones by overlaying each node's
/// overrides onto its parent's expanded environment.
pub fn expand_environments(tree: &mut ProcessTree) {
    let mut order = tree.post_order();
    order.reverse();
    for uuid in order {
        let parent_env = match tree.get(&uuid).and_then(|n| n.parent.clone()) {
            Some(parent) => match tree.get(&parent) {
                Some(p) => p.environment.clone(),
                None => continue,
            },
            None => continue,
        };
        if let Some(node) = tree.get_mut(&uuid) {
            for (key, value) in parent_env {
                node.environment.entry(key).or_insert(value);
            }
        }
    }
}

/// The `.dep` artifact: every node, all fields, environment compacted.
pub fn dep_json(tree: &ProcessTree) -> String {
    let mut compact = tree.clone();
    compact_environments(&mut compact);
    let mut text =
        serde_json::to_string_pretty(compact.nodes()).expect("process nodes serialize");
    text.push('\n');
    text
}

/// The `.cmds` artifact: the merged tree restricted to the configured
/// fields.
pub fn cmds_json(tree: &ProcessTree, filterfields: &[String]) -> String {
    let mut compact = tree.clone();
    compact_environments(&mut compact);
    let mut out: BTreeMap<String, Value> = BTreeMap::new();
    for (uuid, node) in compact.nodes() {
        let value = serde_json::to_value(node).expect("process node serializes");
        let mut object = match value {
            Value::Object(map) => map,
            _ => continue,
        };
        object.retain(|key, _| filterfields.iter().any(|f| f == key));
        out.insert(uuid.clone(), Value::Object(object));
    }
    let mut text = serde_json::to_string_pretty(&out).expect("filtered nodes serialize");
    text.push('\n');
    text
}

/// One line per diagnostic: unclassified and incomplete nodes, plus codec
/// buffers that never terminated.
pub fn insight_text(insights: &[Insight], pending: &[(String, String)]) -> String {
    let mut out = String::new();
    for insight in insights {
        out.push_str(&insight.to_string());
        out.push('\n');
    }
    for (uuid, op) in pending {
        out.push_str(&format!("UNTERMINATED {uuid} {op}\n"));
    }
    out
}

pub fn write_artifact(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Resolver;
    use serde_json::json;
    use wisk_common::uuid::ROOT_UUID;
    use wisk_common::{Event, Op};

    fn tree_with_envs() -> ProcessTree {
        let mut tree = ProcessTree::new("/ws");
        let resolver = Resolver::new(&[]).unwrap();
        let events = [
            (ROOT_UUID, Op::Calls, json!("aaaa")),
            (
                "aaaa",
                Op::Environment,
                json!(["PATH=/usr/bin", "HOME=/root", "LANG=C"]),
            ),
            ("aaaa", Op::Calls, json!("bbbb")),
            (
                "bbbb",
                Op::Environment,
                json!(["PATH=/usr/bin", "HOME=/root", "LANG=en_US.UTF-8", "EXTRA=1"]),
            ),
        ];
        for (uuid, op, payload) in events {
            tree.apply(&Event::new(uuid, op, payload), &resolver);
        }
        tree
    }

    #[test]
    fn compaction_keeps_only_overrides() {
        let mut tree = tree_with_envs();
        compact_environments(&mut tree);
        let child = tree.get("bbbb").unwrap();
        assert!(!child.environment.contains_key("PATH"));
        assert!(!child.environment.contains_key("HOME"));
        assert_eq!(
            child.environment.get("LANG").map(String::as_str),
            Some("en_US.UTF-8")
        );
        assert_eq!(child.environment.get("EXTRA").map(String::as_str), Some("1"));
    }

    #[test]
    fn compact_then_expand_is_identity() {
        let original = tree_with_envs();
        let mut round = original.clone();
        compact_environments(&mut round);
        expand_environments(&mut round);
        for (uuid, node) in original.nodes() {
            assert_eq!(
                node.environment,
                round.get(uuid).unwrap().environment,
                "environment of {uuid}"
            );
        }
    }

    #[test]
    fn dep_json_is_deterministic() {
        let tree = tree_with_envs();
        assert_eq!(dep_json(&tree), dep_json(&tree.clone()));
    }

    #[test]
    fn cmds_json_respects_filterfields() {
        let tree = tree_with_envs();
        let fields = vec!["command".to_string(), "children".to_string()];
        let parsed: Value = serde_json::from_str(&cmds_json(&tree, &fields)).unwrap();
        let node = parsed.get("aaaa").unwrap().as_object().unwrap();
        assert!(node.contains_key("children"));
        assert!(node.contains_key("command"));
        assert!(!node.contains_key("environment"));
        assert!(!node.contains_key("pid"));
    }
}
