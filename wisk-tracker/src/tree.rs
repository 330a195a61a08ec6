// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The process tree assembled from decoded events.
//!
//! Nodes are created lazily on the first mention of their UUID, from
//! either direction: a parent's `CALLS` may arrive after the child's own
//! identification block, because ordering across processes is only
//! guaranteed within one writer.

use crate::classify::CommandType;
use crate::resolve::Resolver;
use serde::Serialize;
use std::collections::BTreeMap;
use wisk_common::paths;
use wisk_common::uuid::ROOT_UUID;
use wisk_common::{Event, Op};

/// One recorded file-system operation: a path, or a `[source, target]`
/// pair for link-style operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OpEntry {
    Path(String),
    Pair([String; 2]),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessNode {
    #[serde(skip)]
    pub uuid: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub mergedcommands: Vec<String>,
    pub pid: Option<i64>,
    pub ppid: Option<i64>,
    pub command: Vec<String>,
    pub command_path: Option<String>,
    pub scriptlang: Option<String>,
    pub working_directory: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub operations: BTreeMap<String, Vec<OpEntry>>,
    pub complete: bool,
    pub command_type: CommandType,
}

impl ProcessNode {
    fn new(uuid: &str) -> Self {
        ProcessNode {
            uuid: uuid.to_string(),
            parent: None,
            children: Vec::new(),
            mergedcommands: Vec::new(),
            pid: None,
            ppid: None,
            command: Vec::new(),
            command_path: None,
            scriptlang: None,
            working_directory: None,
            environment: BTreeMap::new(),
            operations: BTreeMap::new(),
            complete: false,
            command_type: CommandType::Unknown,
        }
    }

    pub fn is_root(&self) -> bool {
        self.uuid == ROOT_UUID
    }

    /// Space-joined argv, the descriptor used in `mergedcommands` and
    /// diagnostics.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    fn push_op(&mut self, op: Op, entry: OpEntry) {
        let list = self.operations.entry(op.as_wire().to_string()).or_default();
        if !list.contains(&entry) {
            list.push(entry);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessTree {
    pub wsroot: String,
    nodes: BTreeMap<String, ProcessNode>,
}

impl ProcessTree {
    pub fn new(wsroot: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_UUID.to_string(), ProcessNode::new(ROOT_UUID));
        ProcessTree {
            wsroot: paths::normalize(wsroot),
            nodes,
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&ProcessNode> {
        self.nodes.get(uuid)
    }

    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut ProcessNode> {
        self.nodes.get_mut(uuid)
    }

    pub fn remove(&mut self, uuid: &str) -> Option<ProcessNode> {
        self.nodes.remove(uuid)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessNode)> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &BTreeMap<String, ProcessNode> {
        &self.nodes
    }

    pub fn uuids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    fn ensure(&mut self, uuid: &str) -> &mut ProcessNode {
        self.nodes
            .entry(uuid.to_string())
            .or_insert_with(|| ProcessNode::new(uuid))
    }

    /// Fold one event into the tree.
    pub fn apply(&mut self, event: &Event, resolver: &Resolver) {
        let uuid = event.uuid.clone();
        match event.op {
            Op::Calls => {
                if let Some(child) = event.payload.as_str().map(str::to_string) {
                    self.ensure(&uuid);
                    let node = self.ensure(&child);
                    if node.parent.is_none() {
                        node.parent = Some(uuid.clone());
                    }
                    let parent = self.ensure(&uuid);
                    if !parent.children.contains(&child) {
                        parent.children.push(child);
                    }
                }
            }
            Op::Command => {
                let argv: Vec<String> = string_array(&event.payload);
                self.ensure(&uuid).command = argv;
            }
            Op::CommandPath => {
                if let Some(path) = event.payload.as_str() {
                    let clean = paths::normalize_in_workspace(path, &self.wsroot);
                    self.ensure(&uuid).command_path = Some(clean);
                }
            }
            Op::WorkingDirectory => {
                if let Some(dir) = event.payload.as_str() {
                    self.ensure(&uuid).working_directory = Some(paths::normalize(dir));
                }
            }
            Op::Pid => {
                self.ensure(&uuid).pid = event.payload.as_i64();
            }
            Op::Ppid => {
                self.ensure(&uuid).ppid = event.payload.as_i64();
            }
            Op::Environment => {
                let entries = string_array(&event.payload);
                {
                    let node = self.ensure(&uuid);
                    for entry in entries {
                        if entry.starts_with("WISK_") || entry.starts_with("LD_PRELOAD") {
                            continue;
                        }
                        // A missing '=' means an empty value.
                        let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                        node.environment.insert(key.to_string(), value.to_string());
                    }
                }
                self.resolve_command(&uuid, resolver);
            }
            Op::Reads | Op::Writes | Op::Unlink | Op::Chmod => {
                if let Some(path) = event.payload.as_str() {
                    let clean = paths::normalize_in_workspace(path, &self.wsroot);
                    self.ensure(&uuid).push_op(event.op, OpEntry::Path(clean));
                }
            }
            Op::Links => {
                let pair = string_array(&event.payload);
                if let [source, target] = pair.as_slice() {
                    let entry = OpEntry::Pair([
                        paths::normalize_in_workspace(source, &self.wsroot),
                        paths::normalize_in_workspace(target, &self.wsroot),
                    ]);
                    self.ensure(&uuid).push_op(Op::Links, entry);
                }
            }
            Op::Complete => {
                self.ensure(&uuid).complete = true;
                self.complete_exec_chain(&uuid);
            }
        }
    }

    /// Resolve argv[0] once the node's environment is known: consume an
    /// interpreter prefix into `scriptlang` and find the executable on the
    /// node's PATH (falling back to an ancestor's, then the supervisor's).
    fn resolve_command(&mut self, uuid: &str, resolver: &Resolver) {
        let (command, cwd, have_path) = match self.nodes.get(uuid) {
            Some(n) if !n.command.is_empty() => (
                n.command.clone(),
                n.working_directory.clone(),
                n.command_path.is_some(),
            ),
            _ => return,
        };
        let path_var = self.lookup_path_var(uuid);
        if let Some(resolved) = resolver.resolve(&command, cwd.as_deref(), path_var.as_deref()) {
            let wsroot = self.wsroot.clone();
            let node = self.ensure(uuid);
            if node.scriptlang.is_none() {
                node.scriptlang = resolved.scriptlang;
            }
            if !have_path {
                if let Some(path) = resolved.path {
                    node.command_path = Some(paths::normalize_in_workspace(&path, &wsroot));
                }
            }
        }
    }

    fn lookup_path_var(&self, uuid: &str) -> Option<String> {
        let mut cursor = Some(uuid.to_string());
        while let Some(current) = cursor {
            let node = self.nodes.get(&current)?;
            if let Some(path) = node.environment.get("PATH") {
                return Some(path.clone());
            }
            cursor = node.parent.clone();
        }
        None
    }

    /// An exec without a fork reuses the pid: when a node completes, every
    /// ancestor sharing its pid/ppid was the same OS process in an earlier
    /// image and cannot complete on its own.
    fn complete_exec_chain(&mut self, uuid: &str) {
        let (pid, ppid, mut cursor) = match self.nodes.get(uuid) {
            Some(n) => (n.pid, n.ppid, n.parent.clone()),
            None => return,
        };
        if pid.is_none() {
            return;
        }
        while let Some(current) = cursor {
            let node = match self.nodes.get_mut(&current) {
                Some(n) => n,
                None => break,
            };
            if node.pid == pid && node.ppid == ppid {
                node.complete = true;
                cursor = node.parent.clone();
            } else {
                break;
            }
        }
    }

    /// UUIDs in bottom-up order: every node appears after all of its
    /// children. Deterministic given the event stream.
    pub fn post_order(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(ROOT_UUID.to_string(), false)];
        let mut seen = std::collections::BTreeSet::new();
        while let Some((uuid, expanded)) = stack.pop() {
            if expanded {
                out.push(uuid);
                continue;
            }
            if !seen.insert(uuid.clone()) {
                continue;
            }
            stack.push((uuid.clone(), true));
            if let Some(node) = self.nodes.get(&uuid) {
                for child in node.children.iter().rev() {
                    stack.push((child.clone(), false));
                }
            }
        }
        // Orphans (no ancestry back to the root) still need processing.
        for uuid in self.nodes.keys() {
            if !seen.contains(uuid) {
                out.insert(0, uuid.clone());
            }
        }
        out
    }
}

fn string_array(payload: &serde_json::Value) -> Vec<String> {
    payload
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
