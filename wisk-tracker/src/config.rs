// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The tracker configuration file.
//!
//! A sectioned key/value format; the `[command_type]` section carries the
//! whitespace-separated regex lists driving classification plus the field
//! selection for the `.cmds` artifact. Lines starting with whitespace
//! continue the previous key, `#` and `;` start comments.

use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub buildtool_patterns: Vec<String>,
    pub shelltool_patterns: Vec<String>,
    pub hardtool_patterns: Vec<String>,
    pub interptool_patterns: Vec<String>,
    pub filterfields: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        TrackerConfig {
            buildtool_patterns: list(&["make", "gmake", "ninja", "cmake", "scons", "bazel"]),
            shelltool_patterns: list(&["sh", "bash", "dash", "ksh", "csh", "tcsh", "zsh"]),
            hardtool_patterns: list(&[
                "cc",
                "gcc",
                r"g\+\+",
                r"c\+\+",
                r"clang(?:\+\+)?",
                "ld",
                r"ld\.gold",
                r"ld\.lld",
                "ar",
                "as",
                "ranlib",
                "strip",
                "objcopy",
                "install",
            ]),
            interptool_patterns: list(&[
                r"(?:\S*/)?env\s+(\w[\w.-]*)",
                r"(?:\S*/)?(python[\d.]*)\s",
                r"(?:\S*/)?(perl[\d.]*)\s",
                r"(?:\S*/)?(ruby[\d.]*)\s",
                r"python[\d.]*",
                r"perl[\d.]*",
                r"ruby[\d.]*",
                "node",
            ]),
            filterfields: list(&[
                "command",
                "command_path",
                "command_type",
                "operations",
                "mergedcommands",
                "children",
            ]),
        }
    }
}

impl TrackerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text)
    }

    /// Read the file when given, fall back to the built-in rules.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let sections = parse_sections(text)?;
        let mut config = Self::default();
        if let Some(section) = sections.get("command_type") {
            let mut take = |key: &str, target: &mut Vec<String>| {
                if let Some(value) = section.get(key) {
                    *target = value.split_whitespace().map(str::to_string).collect();
                }
            };
            take("buildtool_patterns", &mut config.buildtool_patterns);
            take("shelltool_patterns", &mut config.shelltool_patterns);
            take("hardtool_patterns", &mut config.hardtool_patterns);
            take("interptool_patterns", &mut config.interptool_patterns);
            take("filterfields", &mut config.filterfields);
        }
        Ok(config)
    }
}

type Sections = BTreeMap<String, BTreeMap<String, String>>;

fn parse_sections(text: &str) -> anyhow::Result<Sections> {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if trimmed.starts_with('[') {
            let name = trimmed
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .with_context(|| format!("line {}: malformed section header", number + 1))?;
            current = Some(name.trim().to_string());
            sections.entry(name.trim().to_string()).or_default();
            last_key = None;
            continue;
        }
        let section = match &current {
            Some(name) => sections.get_mut(name).expect("section exists"),
            None => bail!("line {}: entry before any section header", number + 1),
        };
        if line.starts_with(char::is_whitespace) {
            // Continuation of the previous key.
            let key = last_key
                .as_ref()
                .with_context(|| format!("line {}: continuation without a key", number + 1))?;
            let value = section.get_mut(key).expect("key exists");
            value.push(' ');
            value.push_str(trimmed);
            continue;
        }
        let (key, value) = trimmed
            .split_once('=')
            .with_context(|| format!("line {}: expected key = value", number + 1))?;
        let key = key.trim().to_string();
        section.insert(key.clone(), value.trim().to_string());
        last_key = Some(key);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_usual_toolchain() {
        let config = TrackerConfig::default();
        assert!(config.hardtool_patterns.iter().any(|p| p == "cc"));
        assert!(config.shelltool_patterns.iter().any(|p| p == "sh"));
        assert!(config.buildtool_patterns.iter().any(|p| p == "make"));
        assert!(!config.filterfields.is_empty());
    }

    #[test]
    fn parses_sections_and_continuations() {
        let text = "
# rules for this site
[command_type]
buildtool_patterns = make gmake
hardtool_patterns = cc gcc
    ld ar
filterfields = command operations
";
        let config = TrackerConfig::parse(text).unwrap();
        assert_eq!(config.buildtool_patterns, vec!["make", "gmake"]);
        assert_eq!(config.hardtool_patterns, vec!["cc", "gcc", "ld", "ar"]);
        assert_eq!(config.filterfields, vec!["command", "operations"]);
        // Untouched keys keep their defaults.
        assert!(config.shelltool_patterns.iter().any(|p| p == "bash"));
    }

    #[test]
    fn rejects_entries_outside_sections() {
        assert!(TrackerConfig::parse("stray = value\n").is_err());
    }
}
