// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Command-path resolution.
//!
//! Runs when a node's environment arrives: an interpreter prefix such as
//! `/usr/bin/env python` is consumed into `scriptlang` (driven by the
//! configured interpreter patterns that carry a capture group), and the
//! effective command is resolved to an absolute path using the node's own
//! PATH, an ancestor's, or the supervisor's, with relative invocations
//! anchored at the node's working directory.

use anyhow::Context;
use regex::Regex;
use wisk_common::paths;

pub struct Resolved {
    pub scriptlang: Option<String>,
    pub path: Option<String>,
}

pub struct Resolver {
    interp: Vec<Regex>,
}

impl Resolver {
    /// Compile the interpreter patterns, anchored at the start of the
    /// joined command line.
    pub fn new(patterns: &[String]) -> anyhow::Result<Self> {
        let interp = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})"))
                    .with_context(|| format!("bad interpreter pattern: {p}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Resolver { interp })
    }

    pub fn resolve(
        &self,
        command: &[String],
        cwd: Option<&str>,
        path_var: Option<&str>,
    ) -> Option<Resolved> {
        let argv0 = command.first()?;
        let cmdline = command.join(" ");

        let mut scriptlang = None;
        let mut effective = argv0.clone();
        for re in &self.interp {
            let caps = match re.captures(&cmdline) {
                Some(caps) => caps,
                None => continue,
            };
            // Only a pattern with a capture group names a script language
            // and consumes tokens; the rest classify but do not rewrite.
            let lang = match caps.get(1) {
                Some(m) => m.as_str().to_string(),
                None => continue,
            };
            let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
            if let Some(next) = cmdline[consumed..].split_whitespace().next() {
                scriptlang = Some(lang);
                effective = next.to_string();
            }
            break;
        }

        let path = locate(&effective, cwd, path_var);
        Some(Resolved { scriptlang, path })
    }
}

/// Find an executable the way the loader's caller would have: explicit
/// paths are anchored at the working directory, bare names searched on
/// PATH.
fn locate(command: &str, cwd: Option<&str>, path_var: Option<&str>) -> Option<String> {
    if command.contains('/') {
        return Some(match cwd {
            Some(dir) if !command.starts_with('/') => paths::absolutize(command, dir),
            _ => paths::normalize(command),
        });
    }
    let search = match path_var {
        Some(p) => Some(p.to_string()),
        None => std::env::var("PATH").ok(),
    };
    if let Some(search) = search {
        for dir in search.split(':').filter(|d| !d.is_empty()) {
            let candidate = format!("{dir}/{command}");
            if std::path::Path::new(&candidate).is_file() {
                return Some(paths::normalize(&candidate));
            }
        }
    }
    // Scripts handed to an interpreter resolve against the working
    // directory, not PATH.
    if let Some(dir) = cwd {
        let candidate = paths::absolutize(command, dir);
        if std::path::Path::new(&candidate).is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new(&[
            r"(?:\S*/)?env\s+(\w[\w.-]*)".to_string(),
            r"(?:\S*/)?(python[\d.]*)\s".to_string(),
        ])
        .unwrap()
    }

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn env_prefix_is_consumed_into_scriptlang() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build.py"), b"").unwrap();
        let got = resolver()
            .resolve(
                &v(&["/usr/bin/env", "python", "build.py", "--fast"]),
                Some(dir.path().to_str().unwrap()),
                Some("/usr/bin"),
            )
            .unwrap();
        assert_eq!(got.scriptlang.as_deref(), Some("python"));
        assert!(got.path.unwrap().ends_with("/build.py"));
    }

    #[test]
    fn interpreter_with_script_argument() {
        let got = resolver()
            .resolve(
                &v(&["python3", "/ws/gen.py"]),
                Some("/ws"),
                Some("/nonexistent"),
            )
            .unwrap();
        assert_eq!(got.scriptlang.as_deref(), Some("python3"));
        assert_eq!(got.path.as_deref(), Some("/ws/gen.py"));
    }

    #[test]
    fn bare_interpreter_keeps_its_own_identity() {
        let got = resolver()
            .resolve(&v(&["python3"]), None, Some("/nonexistent"))
            .unwrap();
        assert_eq!(got.scriptlang, None);
        assert_eq!(got.path, None);
    }

    #[test]
    fn path_search_finds_executables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mycc"), b"#!/bin/sh\n").unwrap();
        let search = format!("/nonexistent:{}", dir.path().display());
        let got = resolver()
            .resolve(&v(&["mycc", "-c", "a.c"]), Some("/ws"), Some(&search))
            .unwrap();
        assert_eq!(
            got.path.unwrap(),
            format!("{}/mycc", dir.path().display())
        );
    }

    #[test]
    fn relative_invocations_anchor_at_the_working_directory() {
        let got = resolver()
            .resolve(&v(&["./tool", "x"]), Some("/ws/bin"), None)
            .unwrap();
        assert_eq!(got.path.as_deref(), Some("/ws/bin/tool"));
    }
}
