// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tool classification.
//!
//! Each complete node's effective command is matched against the four
//! configured pattern lists; the first matching class wins. Nodes nothing
//! matches are tagged `unknown` and surface in the insight file so the
//! rules can be extended.

use crate::config::TrackerConfig;
use crate::tree::ProcessTree;
use anyhow::Context;
use regex::Regex;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Buildtool,
    Shelltool,
    Hardtool,
    Interptool,
    Unknown,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Buildtool => "buildtool",
            CommandType::Shelltool => "shelltool",
            CommandType::Hardtool => "hardtool",
            CommandType::Interptool => "interptool",
            CommandType::Unknown => "unknown",
        }
    }
}

impl Default for CommandType {
    fn default() -> Self {
        CommandType::Unknown
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a node landed in the insight file.
#[derive(Debug, Clone, PartialEq)]
pub enum Insight {
    Unclassified { uuid: String, command: String },
    Incomplete { uuid: String, command: String },
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::Unclassified { uuid, command } => {
                write!(f, "UNCLASSIFIED {uuid} {command}")
            }
            Insight::Incomplete { uuid, command } => {
                write!(f, "INCOMPLETE {uuid} {command}")
            }
        }
    }
}

pub struct Classifier {
    classes: Vec<(CommandType, Vec<Regex>)>,
}

impl Classifier {
    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        let compile = |patterns: &[String]| -> anyhow::Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("^(?:{p})$"))
                        .with_context(|| format!("bad command pattern: {p}"))
                })
                .collect()
        };
        Ok(Classifier {
            classes: vec![
                (CommandType::Buildtool, compile(&config.buildtool_patterns)?),
                (CommandType::Shelltool, compile(&config.shelltool_patterns)?),
                (CommandType::Hardtool, compile(&config.hardtool_patterns)?),
                (CommandType::Interptool, compile(&config.interptool_patterns)?),
            ],
        })
    }

    /// Classify one effective command string. Patterns are tried against
    /// the full string and its basename, in class order; first hit wins.
    pub fn classify(&self, effective: &str) -> CommandType {
        let basename = effective.rsplit('/').next().unwrap_or(effective);
        for (class, patterns) in &self.classes {
            for re in patterns {
                if re.is_match(effective) || re.is_match(basename) {
                    return *class;
                }
            }
        }
        CommandType::Unknown
    }

    /// Classify every node and collect the insight records. Incomplete
    /// nodes are left `unknown` so the merger treats them as noise.
    pub fn classify_tree(&self, tree: &mut ProcessTree) -> Vec<Insight> {
        let mut insights = Vec::new();
        for uuid in tree.uuids() {
            if uuid == wisk_common::uuid::ROOT_UUID {
                continue;
            }
            let (effective, complete, command) = {
                let node = tree.get(&uuid).expect("listed uuid exists");
                (effective_command(node), node.complete, node.command_line())
            };
            if !complete {
                insights.push(Insight::Incomplete {
                    uuid: uuid.clone(),
                    command,
                });
                continue;
            }
            let class = match &effective {
                Some(cmd) => self.classify(cmd),
                None => CommandType::Unknown,
            };
            if class == CommandType::Unknown {
                insights.push(Insight::Unclassified {
                    uuid: uuid.clone(),
                    command,
                });
            }
            if let Some(node) = tree.get_mut(&uuid) {
                node.command_type = class;
            }
        }
        insights
    }
}

/// The string classification runs against: the resolved executable path
/// when we have one, argv[0] otherwise.
pub fn effective_command(node: &crate::tree::ProcessNode) -> Option<String> {
    node.command_path
        .clone()
        .or_else(|| node.command.first().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::from_config(&TrackerConfig::default()).unwrap()
    }

    #[test]
    fn first_matching_class_wins() {
        let c = classifier();
        assert_eq!(c.classify("/usr/bin/make"), CommandType::Buildtool);
        assert_eq!(c.classify("/bin/sh"), CommandType::Shelltool);
        assert_eq!(c.classify("/usr/bin/cc"), CommandType::Hardtool);
        assert_eq!(c.classify("/usr/bin/g++"), CommandType::Hardtool);
        assert_eq!(c.classify("/usr/bin/python3.11"), CommandType::Interptool);
        assert_eq!(c.classify("/opt/tools/frobnicate"), CommandType::Unknown);
    }

    #[test]
    fn basenames_match_patterns_without_slashes() {
        let c = classifier();
        assert_eq!(c.classify("cc"), CommandType::Hardtool);
        assert_eq!(c.classify("/toolchain/7.5/bin/gcc"), CommandType::Hardtool);
        // A directory merely named like a tool must not leak into the match.
        assert_eq!(c.classify("/cc/tool"), CommandType::Unknown);
    }
}
