//! Canonical path names (spec.md §4.1).
//!
//! A [`PathName`] normalizes a user-supplied, possibly-relative path against
//! a working directory into a canonical absolute form: a parent chain that
//! always starts with the synthetic `"root"` component (see
//! [`crate::tree`]'s super-root indirection) and a target name.

use std::fmt;

use crate::error::{Failure, OpResult};

/// A canonicalized path: an ordered parent chain (first element always
/// `"root"`) plus a final target component, alongside the original
/// user-supplied string (kept for error messages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathName {
    /// The string the caller originally passed in, before canonicalization.
    pub symbolic: String,
    /// Canonical parent components, including the leading synthetic `"root"`.
    pub parents: Vec<String>,
    /// The final path component.
    pub target: String,
}

impl PathName {
    /// Parses `symbolic` relative to `working_directory`, producing a
    /// canonical [`PathName`].
    ///
    /// Mirrors spec.md §4.1 steps 1-5: validates that a relative path is
    /// only used with an absolute working directory, splits both strings on
    /// `/` (dropping empty segments), then walks segments left to right
    /// resolving `.` and `..` against a component stack. A leading synthetic
    /// `"root"` is always prepended so every path shares one super-root.
    pub fn parse(symbolic: &str, working_directory: &str) -> OpResult<PathName> {
        if !symbolic.starts_with('/') && !working_directory.starts_with('/') {
            return Err(Failure::invalid_argument(format!(
                "Can't use relative path '{symbolic}' from working directory \
                 '{working_directory}' that isn't absolute"
            )));
        }

        let mut components: Vec<String> = Vec::new();
        if !symbolic.starts_with('/') {
            Self::walk(working_directory, &mut components)?;
        }
        Self::walk(symbolic, &mut components)?;

        let target = components.pop().unwrap_or_default();
        let mut parents = Vec::with_capacity(components.len() + 1);
        parents.push("root".to_string());
        parents.extend(components);

        Ok(PathName { symbolic: symbolic.to_string(), parents, target })
    }

    fn walk(s: &str, stack: &mut Vec<String>) -> OpResult<()> {
        for segment in s.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                if stack.pop().is_none() {
                    return Err(Failure::invalid_argument(format!(
                        "Path '{s}' attempts to look up directory above root"
                    )));
                }
                continue;
            }
            stack.push(segment.to_string());
        }
        Ok(())
    }

    /// `true` if this path names the tree root (no target, empty parent list
    /// beyond the synthetic `"root"`).
    pub fn is_root(&self) -> bool {
        self.parents.len() == 1 && self.target.is_empty()
    }

    /// The full canonical parent chain plus target, excluding the synthetic
    /// `"root"` prefix — what [`crate::tree::Tree`] actually walks.
    pub fn components(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.parents.iter().skip(1).map(String::as_str).collect();
        if !self.target.is_empty() {
            out.push(&self.target);
        }
        out
    }

    /// Renders the canonical form as a `/`-joined absolute string, e.g.
    /// `/a/b/c`. Used in error messages and as the wire form sent to the
    /// cluster.
    pub fn canonical(&self) -> String {
        let parts = self.components();
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    /// `"Parent /a/b of /a/b/c does not exist"`-style message, used by
    /// [`crate::tree::Tree`] lookup failures that need to name the specific
    /// prefix where the walk failed.
    pub fn parents_through(&self, depth: usize) -> String {
        let parts = self.components();
        let prefix = &parts[..depth.min(parts.len())];
        if prefix.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", prefix.join("/"))
        }
    }
}

impl fmt::Display for PathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_ignores_working_directory() {
        let p = PathName::parse("/a/b", "/ignored").unwrap();
        assert_eq!(p.canonical(), "/a/b");
        assert_eq!(p.parents, vec!["root".to_string(), "a".to_string()]);
        assert_eq!(p.target, "b");
    }

    #[test]
    fn relative_path_requires_absolute_working_directory() {
        let err = PathName::parse("a", "b").unwrap_err();
        assert_eq!(err.status, crate::error::Status::InvalidArgument);
    }

    #[test]
    fn dot_resolves_to_current_directory() {
        let p = PathName::parse("./x", "/a/b").unwrap();
        assert_eq!(p.canonical(), "/a/b/x");
    }

    #[test]
    fn dot_dot_pops_one_component() {
        let p = PathName::parse("../y", "/a/b").unwrap();
        assert_eq!(p.canonical(), "/a/y");
    }

    #[test]
    fn dot_dot_above_root_fails() {
        let err = PathName::parse("../..", "/a").unwrap_err();
        assert_eq!(err.status, crate::error::Status::InvalidArgument);
    }

    #[test]
    fn multiple_slashes_collapse() {
        let p = PathName::parse("//a///b/", "/").unwrap();
        assert_eq!(p.canonical(), "/a/b");
    }

    #[test]
    fn empty_path_and_working_directory_fails() {
        let err = PathName::parse("", "").unwrap_err();
        assert_eq!(err.status, crate::error::Status::InvalidArgument);
    }

    #[test]
    fn root_has_empty_target() {
        let p = PathName::parse("/", "/").unwrap();
        assert!(p.is_root());
        assert_eq!(p.canonical(), "/");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for (path, wd) in [("/a/b/../c", "/"), ("x/./y", "/a"), ("../../a", "/a/b/c")] {
            if let Ok(first) = PathName::parse(path, wd) {
                let second = PathName::parse(&first.canonical(), "/").unwrap();
                assert_eq!(first.canonical(), second.canonical());
            }
        }
    }
}
