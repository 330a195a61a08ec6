// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Folding trivial scaffolding into the commands that matter.
//!
//! Two passes alternate to a fixed point, bottom-up:
//!
//! - promotion: a shelltool whose completed children all share a class
//!   (hardtool, or buildtool) takes on that class, since the wrapper does
//!   nothing of its own;
//! - merge: a childless node folds into its parent when it is unknown, or
//!   when it is a hardtool under a hardtool or shelltool parent. A
//!   hardtool folding into a shell wrapper takes the wrapper's place: the
//!   wrapper's own command line moves into `mergedcommands` and the tool's
//!   identity survives.
//!
//! The root and its direct children are never merged, so top-level tools
//! are preserved, and buildtools never absorb their children, so per-tool
//! dependency granularity under `make` survives.

use crate::classify::CommandType;
use crate::tree::{OpEntry, ProcessTree};
use wisk_common::uuid::ROOT_UUID;

pub fn merge_tree(tree: &mut ProcessTree) {
    loop {
        // Merge before promoting: a hardtool must get its chance to take
        // over its shell wrapper while the wrapper still classifies as one.
        let mut changed = merge_pass(tree);
        changed |= promote_pass(tree);
        if !changed {
            break;
        }
    }
}

fn promote_pass(tree: &mut ProcessTree) -> bool {
    let mut changed = false;
    for uuid in tree.post_order() {
        let promoted = {
            let node = match tree.get(&uuid) {
                Some(n) => n,
                None => continue,
            };
            if node.is_root()
                || node.command_type != CommandType::Shelltool
                || node.children.is_empty()
            {
                continue;
            }
            let classes: Vec<CommandType> = node
                .children
                .iter()
                .filter_map(|c| tree.get(c))
                .filter(|c| c.complete)
                .map(|c| c.command_type)
                .collect();
            if classes.is_empty() {
                continue;
            }
            if classes.iter().all(|c| *c == CommandType::Hardtool) {
                Some(CommandType::Hardtool)
            } else if classes.iter().all(|c| *c == CommandType::Buildtool) {
                Some(CommandType::Buildtool)
            } else {
                None
            }
        };
        if let Some(class) = promoted {
            if let Some(node) = tree.get_mut(&uuid) {
                node.command_type = class;
                changed = true;
            }
        }
    }
    changed
}

fn merge_pass(tree: &mut ProcessTree) -> bool {
    let mut changed = false;
    for uuid in tree.post_order() {
        if uuid == ROOT_UUID {
            continue;
        }
        let parent_uuid = {
            let node = match tree.get(&uuid) {
                Some(n) => n,
                None => continue,
            };
            let parent_uuid = match &node.parent {
                Some(p) => p.clone(),
                None => continue,
            };
            if parent_uuid == ROOT_UUID || !node.children.is_empty() {
                continue;
            }
            let parent_class = match tree.get(&parent_uuid) {
                Some(p) => p.command_type,
                None => continue,
            };
            let eligible = match node.command_type {
                CommandType::Unknown => true,
                CommandType::Hardtool => matches!(
                    parent_class,
                    CommandType::Hardtool | CommandType::Shelltool
                ),
                _ => false,
            };
            if !eligible {
                continue;
            }
            parent_uuid
        };
        merge_into_parent(tree, &uuid, &parent_uuid);
        changed = true;
    }
    changed
}

fn merge_into_parent(tree: &mut ProcessTree, uuid: &str, parent_uuid: &str) {
    let child = match tree.remove(uuid) {
        Some(c) => c,
        None => return,
    };
    // The predicate guarantees no live children; anything left (a node
    // created by a stray mention) is reparented to keep the tree whole.
    let orphans = child.children.clone();

    if let Some(parent) = tree.get_mut(parent_uuid) {
        let adopt = child.command_type == CommandType::Hardtool
            && parent.command_type == CommandType::Shelltool;
        if adopt {
            let wrapper = parent.command_line();
            if !wrapper.is_empty() {
                parent.mergedcommands.push(wrapper);
            }
            parent.command = child.command;
            parent.command_path = child.command_path;
            if parent.scriptlang.is_none() {
                parent.scriptlang = child.scriptlang;
            }
            parent.command_type = CommandType::Hardtool;
        } else {
            let line = child.command.join(" ");
            if !line.is_empty() {
                parent.mergedcommands.push(line);
            }
        }
        parent.mergedcommands.extend(child.mergedcommands);

        for (op, entries) in child.operations {
            let list = parent.operations.entry(op).or_default();
            for entry in entries {
                push_unique(list, entry);
            }
        }

        parent.children.retain(|c| c != uuid);
        for orphan in &orphans {
            if !parent.children.contains(orphan) {
                parent.children.push(orphan.clone());
            }
        }
    }
    for orphan in orphans {
        if let Some(node) = tree.get_mut(&orphan) {
            node.parent = Some(parent_uuid.to_string());
        }
    }
}

fn push_unique(list: &mut Vec<OpEntry>, entry: OpEntry) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}
