// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lexical path normalization for tracked operations.
//!
//! Paths reported by traced processes are cleaned without touching the
//! file system: the files involved may already be gone by the time the
//! supervisor sees the event, so `canonicalize` is not an option.

/// Normalize a path lexically: collapse `//` and `.`, resolve `..` against
/// the preceding segment. `..` at the root stays at the root; `..` at the
/// start of a relative path is preserved (there is nothing to pop).
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(&"..")) || (out.is_empty() && !absolute) {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            seg => out.push(seg),
        }
    }
    let joined = out.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Normalize and, when the result lies under `wsroot`, make it
/// workspace-relative.
pub fn normalize_in_workspace(path: &str, wsroot: &str) -> String {
    let clean = normalize(path);
    let root = normalize(wsroot);
    if root != "/" {
        if let Some(rest) = clean.strip_prefix(&root) {
            if let Some(rel) = rest.strip_prefix('/') {
                return rel.to_string();
            }
            if rest.is_empty() {
                return ".".to_string();
            }
        }
    }
    clean
}

/// Resolve a possibly-relative path against a working directory, then
/// normalize.
pub fn absolutize(path: &str, cwd: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{cwd}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots_and_slashes() {
        assert_eq!(normalize("/a//b/./c"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize("a/./b/.."), "a");
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("."), ".");
    }

    #[test]
    fn workspace_relative_strips_the_root() {
        assert_eq!(
            normalize_in_workspace("/ws/src/../tests/fixtures/data.txt", "/ws"),
            "tests/fixtures/data.txt"
        );
        assert_eq!(normalize_in_workspace("/other/file", "/ws"), "/other/file");
        // A sibling directory sharing the prefix string is not inside the root.
        assert_eq!(normalize_in_workspace("/wsx/file", "/ws"), "/wsx/file");
        assert_eq!(normalize_in_workspace("/ws", "/ws"), ".");
    }

    #[test]
    fn normalized_paths_never_retain_parent_escapes() {
        for p in ["/a/../../b", "/ws/../ws/./src//x.c"] {
            assert!(!normalize(p).contains(".."), "{p}");
        }
    }

    #[test]
    fn absolutize_uses_the_working_directory() {
        assert_eq!(absolutize("a.c", "/ws/src"), "/ws/src/a.c");
        assert_eq!(absolutize("../a.c", "/ws/src"), "/ws/a.c");
        assert_eq!(absolutize("/abs/a.c", "/ws/src"), "/abs/a.c");
    }
}
