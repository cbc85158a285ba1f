//! The deterministic tree state machine (spec.md §3, §4.2) and its
//! condition-predicate helper (§4.3).
//!
//! Everything here is pure, synchronous, in-memory state: no I/O, no
//! threads. The only collaborators this module is allowed to talk to are
//! [`crate::path::PathName`] for canonicalization and
//! [`crate::error::Failure`] for typed outcomes. Replication, commit
//! ordering and persistence all live above this layer (in
//! [`crate::server`]); `Tree` itself never retries and never leaves
//! partial state behind a failed call.

pub mod snapshot;

use std::collections::BTreeMap;

use crate::error::{Failure, OpResult, Status};
use crate::path::PathName;

/// A file: an opaque byte string. Empty contents are a normal, valid file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    pub contents: Vec<u8>,
}

/// A directory: disjoint name spaces for child directories and child files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub directories: BTreeMap<String, Directory>,
    pub files: BTreeMap<String, File>,
}

/// A client-attached precondition: `path` must read back as `contents`
/// before a mutation is allowed to apply. An empty `path` means "no
/// condition" (spec.md §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    pub path: String,
    pub contents: Vec<u8>,
}

impl Condition {
    pub fn none() -> Condition {
        Condition::default()
    }

    pub fn is_none(&self) -> bool {
        self.path.is_empty()
    }
}

/// Per-operation counters, mirroring `LogCabin::Tree::Tree`'s
/// `numXAttempted`/`numXSucceeded` fields one for one. Monotonic over the
/// life of the state machine; never reset except by constructing a new
/// `Tree` (which happens on `load_snapshot`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeStats {
    pub make_directory_attempted: u64,
    pub make_directory_succeeded: u64,

    pub list_directory_attempted: u64,
    pub list_directory_succeeded: u64,

    pub remove_directory_attempted: u64,
    pub remove_directory_succeeded: u64,

    pub write_attempted: u64,
    pub write_succeeded: u64,

    pub read_attempted: u64,
    pub read_succeeded: u64,

    pub remove_file_attempted: u64,
    pub remove_file_succeeded: u64,

    pub conditions_checked: u64,
    pub conditions_failed: u64,
}

/// Where a path walk stopped, in enough detail to build LogCabin-style
/// error messages ("Parent /a/b of /a/b/c does not exist").
enum Stopped {
    Missing(usize),
    IsFile(usize),
}

/// The tree state machine: a single `super_root` directory that always
/// contains exactly one subdirectory named `root` (spec.md §3, §9). Every
/// public method is synchronous and leaves the tree unchanged on failure.
#[derive(Debug, Clone)]
pub struct Tree {
    super_root: Directory,
    stats: TreeStats,
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

impl Tree {
    pub fn new() -> Tree {
        let mut super_root = Directory::default();
        super_root.directories.insert("root".to_string(), Directory::default());
        Tree { super_root, stats: TreeStats::default() }
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    fn parse(path: &str) -> OpResult<PathName> {
        PathName::parse(path, "/")
    }

    /// The real root directory, nested one level inside `super_root` (spec.md
    /// §3, §9): `super_root` always holds exactly one child named `"root"`,
    /// and that's where every actual path lands. All navigation below starts
    /// here, not at `super_root` itself.
    fn root(&self) -> &Directory {
        self.super_root.directories.get("root").expect("super_root always contains \"root\"")
    }

    fn root_mut(&mut self) -> &mut Directory {
        self.super_root.directories.get_mut("root").expect("super_root always contains \"root\"")
    }

    /// Walks `names` from the real root, creating any missing intermediate
    /// directory. Fails `TYPE_ERROR` if an existing component is a file.
    fn navigate_create<'a>(&'a mut self, names: &[&str]) -> OpResult<&'a mut Directory> {
        let mut dir = self.root_mut();
        for (depth, name) in names.iter().enumerate() {
            if dir.files.contains_key(*name) {
                return Err(Self::is_file_error(names, depth));
            }
            dir = dir.directories.entry((*name).to_string()).or_default();
        }
        Ok(dir)
    }

    /// Walks `names` from `dir` without creating anything. Returns the
    /// stopping point so callers can decide whether a miss is an error or a
    /// tolerated no-op (remove operations tolerate it; reads don't).
    fn navigate<'a>(dir: &'a Directory, names: &[&str]) -> Result<&'a Directory, Stopped> {
        let mut cur = dir;
        for (depth, name) in names.iter().enumerate() {
            if cur.files.contains_key(*name) {
                return Err(Stopped::IsFile(depth));
            }
            match cur.directories.get(*name) {
                Some(d) => cur = d,
                None => return Err(Stopped::Missing(depth)),
            }
        }
        Ok(cur)
    }

    fn navigate_mut<'a>(
        dir: &'a mut Directory,
        names: &[&str],
    ) -> Result<&'a mut Directory, Stopped> {
        let mut cur = dir;
        for (depth, name) in names.iter().enumerate() {
            if cur.files.contains_key(*name) {
                return Err(Stopped::IsFile(depth));
            }
            match cur.directories.get_mut(*name) {
                Some(d) => cur = d,
                None => return Err(Stopped::Missing(depth)),
            }
        }
        Ok(cur)
    }

    fn is_file_error(names: &[&str], depth: usize) -> Failure {
        let full = format!("/{}", names.join("/"));
        let through = format!("/{}", names[..=depth].join("/"));
        Failure::type_error(format!("{through} of {full} is a file"))
    }

    fn lookup_error(names: &[&str], depth: usize) -> Failure {
        let full = if names.is_empty() { "/".to_string() } else { format!("/{}", names.join("/")) };
        let through = if depth == 0 {
            "/".to_string()
        } else {
            format!("/{}", names[..depth].join("/"))
        };
        Failure::lookup_error(format!("Parent {through} of {full} does not exist"))
    }

    fn stopped_error(names: &[&str], stopped: Stopped) -> Failure {
        match stopped {
            Stopped::IsFile(depth) => Self::is_file_error(names, depth),
            Stopped::Missing(depth) => Self::lookup_error(names, depth),
        }
    }

    // ---- condition gate -------------------------------------------------

    /// Applies a mutation's attached condition. Called by every mutator
    /// before it touches the tree; never increments the mutator's own
    /// counters on failure.
    fn gate(&mut self, condition: Option<&Condition>) -> OpResult<()> {
        match condition {
            None => Ok(()),
            Some(c) if c.is_none() => Ok(()),
            Some(c) => self.check_condition(c),
        }
    }

    /// `ConditionEvaluator` (spec.md §4.3): does the tree currently satisfy
    /// `(path, expected contents)`? An empty `expected` is satisfied by a
    /// missing file as well as an empty one.
    pub fn check_condition(&mut self, condition: &Condition) -> OpResult<()> {
        self.stats.conditions_checked += 1;
        if condition.is_none() {
            return Ok(());
        }
        match self.read_raw(&condition.path) {
            Ok(contents) if contents == condition.contents => Ok(()),
            Ok(contents) => {
                self.stats.conditions_failed += 1;
                Err(Failure::condition_not_met(format!(
                    "Expected '{}' to read as '{}' but actual value is '{}'",
                    condition.path,
                    String::from_utf8_lossy(&condition.contents),
                    String::from_utf8_lossy(&contents),
                )))
            }
            Err(e) if e.status == Status::LookupError && condition.contents.is_empty() => Ok(()),
            Err(e) => {
                self.stats.conditions_failed += 1;
                Err(Failure::condition_not_met(format!(
                    "Expected '{}' to read as '{}' but {}",
                    condition.path,
                    String::from_utf8_lossy(&condition.contents),
                    e,
                )))
            }
        }
    }

    // ---- public operations -----------------------------------------------

    /// Creates all missing directories along `path`, including `path`
    /// itself. A no-op if the directory already exists; `TYPE_ERROR` if any
    /// component names an existing file.
    pub fn make_directory(&mut self, path: &str, condition: Option<&Condition>) -> OpResult<()> {
        self.stats.make_directory_attempted += 1;
        self.gate(condition)?;
        let p = Self::parse(path)?;
        let names = p.components();
        self.navigate_create(&names)?;
        self.stats.make_directory_succeeded += 1;
        Ok(())
    }

    /// Lists the children of `path`: directory names first (lexicographic,
    /// suffixed with `/`), then file names (lexicographic).
    pub fn list_directory(&mut self, path: &str) -> OpResult<Vec<String>> {
        self.stats.list_directory_attempted += 1;
        let p = Self::parse(path)?;
        let names = p.components();
        let dir = Self::navigate(self.root(), &names)
            .map_err(|s| Self::stopped_error(&names, s))?;
        let mut out: Vec<String> =
            dir.directories.keys().map(|n| format!("{n}/")).collect();
        out.extend(dir.files.keys().cloned());
        self.stats.list_directory_succeeded += 1;
        Ok(out)
    }

    /// Recursively removes the directory at `path` and everything under it.
    /// A no-op if already missing; `removeDirectory("/")` clears the root's
    /// contents but re-materializes `root` itself rather than deleting it.
    pub fn remove_directory(&mut self, path: &str, condition: Option<&Condition>) -> OpResult<()> {
        self.stats.remove_directory_attempted += 1;
        self.gate(condition)?;
        let p = Self::parse(path)?;
        if p.is_root() {
            self.super_root.directories.insert("root".to_string(), Directory::default());
            self.stats.remove_directory_succeeded += 1;
            return Ok(());
        }
        let parents = &p.parents[1..];
        let parent = match Self::navigate_mut(self.root_mut(), parents) {
            Ok(dir) => dir,
            Err(Stopped::Missing(_)) => {
                // An ancestor is already gone: nothing to remove.
                self.stats.remove_directory_succeeded += 1;
                return Ok(());
            }
            Err(stopped) => return Err(Self::stopped_error(parents, stopped)),
        };
        if parent.files.contains_key(&p.target) {
            let names = p.components();
            return Err(Self::is_file_error(&names, names.len() - 1));
        }
        parent.directories.remove(&p.target);
        self.stats.remove_directory_succeeded += 1;
        Ok(())
    }

    /// Creates or overwrites the file at `path`. Ancestor directories are
    /// *not* auto-created; a missing ancestor is `LOOKUP_ERROR`.
    pub fn write(
        &mut self,
        path: &str,
        contents: Vec<u8>,
        condition: Option<&Condition>,
    ) -> OpResult<()> {
        self.stats.write_attempted += 1;
        self.gate(condition)?;
        let p = Self::parse(path)?;
        let parents = &p.parents[1..];
        let parent = Self::navigate_mut(self.root_mut(), parents)
            .map_err(|s| Self::stopped_error(parents, s))?;
        if parent.directories.contains_key(&p.target) {
            let names = p.components();
            return Err(Self::is_file_error(&names, names.len() - 1));
        }
        parent.files.insert(p.target.clone(), File { contents });
        self.stats.write_succeeded += 1;
        Ok(())
    }

    /// Reads the file at `path`. `LOOKUP_ERROR` if missing, `TYPE_ERROR` if
    /// it names a directory.
    pub fn read(&mut self, path: &str) -> OpResult<Vec<u8>> {
        self.stats.read_attempted += 1;
        let result = self.read_raw(path);
        if result.is_ok() {
            self.stats.read_succeeded += 1;
        }
        result
    }

    /// Like [`Tree::read`] but doesn't touch statistics; used internally by
    /// [`Tree::check_condition`] so condition evaluation doesn't inflate the
    /// read counters for an operation the caller never asked for.
    fn read_raw(&self, path: &str) -> OpResult<Vec<u8>> {
        let p = Self::parse(path)?;
        let parents = &p.parents[1..];
        let parent = Self::navigate(self.root(), parents)
            .map_err(|s| Self::stopped_error(parents, s))?;
        match parent.files.get(&p.target) {
            Some(file) => Ok(file.contents.clone()),
            None => {
                if parent.directories.contains_key(&p.target) {
                    let names = p.components();
                    Err(Self::is_file_error(&names, names.len() - 1))
                } else {
                    let names = p.components();
                    Err(Self::lookup_error(&names, names.len() - 1))
                }
            }
        }
    }

    /// Removes the file at `path`. No-op if the file or any ancestor is
    /// already missing; `TYPE_ERROR` if `path` names a directory.
    pub fn remove_file(&mut self, path: &str, condition: Option<&Condition>) -> OpResult<()> {
        self.stats.remove_file_attempted += 1;
        self.gate(condition)?;
        let p = Self::parse(path)?;
        let parents = &p.parents[1..];
        let parent = match Self::navigate_mut(self.root_mut(), parents) {
            Ok(dir) => dir,
            Err(Stopped::Missing(_)) => {
                self.stats.remove_file_succeeded += 1;
                return Ok(());
            }
            Err(stopped) => return Err(Self::stopped_error(parents, stopped)),
        };
        if parent.directories.contains_key(&p.target) {
            let names = p.components();
            return Err(Self::is_file_error(&names, names.len() - 1));
        }
        parent.files.remove(&p.target);
        self.stats.remove_file_succeeded += 1;
        Ok(())
    }

    /// Serializes the entire tree (see [`snapshot`] for the wire format).
    pub fn dump_snapshot(&self, sink: &mut dyn std::io::Write) -> std::io::Result<()> {
        snapshot::write_directory(sink, &self.super_root)
    }

    /// Resets to a freshly constructed tree, then reads a snapshot directly
    /// into the super-root.
    pub fn load_snapshot(&mut self, source: &mut dyn std::io::Read) -> std::io::Result<()> {
        *self = Tree::new();
        self.super_root = snapshot::read_directory(source)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_basic_tree() {
        let mut t = Tree::new();
        t.make_directory("/foo", None).unwrap();
        assert_eq!(t.list_directory("/").unwrap(), vec!["foo/".to_string()]);
        t.write("/foo/x", b"hi".to_vec(), None).unwrap();
        assert_eq!(t.read("/foo/x").unwrap(), b"hi".to_vec());
        t.remove_file("/foo/x", None).unwrap();
        assert!(t.list_directory("/foo").unwrap().is_empty());
    }

    #[test]
    fn make_directory_is_idempotent() {
        let mut t = Tree::new();
        t.make_directory("/a/b", None).unwrap();
        t.make_directory("/a/b", None).unwrap();
        assert_eq!(t.list_directory("/a").unwrap(), vec!["b/".to_string()]);
    }

    #[test]
    fn make_directory_over_file_is_type_error() {
        let mut t = Tree::new();
        t.write("/a", b"x".to_vec(), None).unwrap();
        let err = t.make_directory("/a/b", None).unwrap_err();
        assert_eq!(err.status, Status::TypeError);
    }

    #[test]
    fn write_requires_existing_ancestor() {
        let mut t = Tree::new();
        let err = t.write("/a/b", vec![], None).unwrap_err();
        assert_eq!(err.status, Status::LookupError);
    }

    #[test]
    fn read_missing_is_lookup_error() {
        let mut t = Tree::new();
        let err = t.read("/nope").unwrap_err();
        assert_eq!(err.status, Status::LookupError);
    }

    #[test]
    fn read_directory_is_type_error() {
        let mut t = Tree::new();
        t.make_directory("/d", None).unwrap();
        let err = t.read("/d").unwrap_err();
        assert_eq!(err.status, Status::TypeError);
    }

    #[test]
    fn s3_root_removal_preserves_root() {
        let mut t = Tree::new();
        t.make_directory("/x/y", None).unwrap();
        t.write("/x/y/z", b"d".to_vec(), None).unwrap();
        t.remove_directory("/", None).unwrap();
        assert!(t.list_directory("/").unwrap().is_empty());
    }

    #[test]
    fn remove_directory_is_idempotent() {
        let mut t = Tree::new();
        t.make_directory("/a", None).unwrap();
        t.remove_directory("/a", None).unwrap();
        t.remove_directory("/a", None).unwrap();
        assert!(t.list_directory("/").unwrap().is_empty());
    }

    #[test]
    fn remove_directory_missing_ancestor_is_noop() {
        let mut t = Tree::new();
        t.remove_directory("/a/b/c", None).unwrap();
    }

    #[test]
    fn s2_condition_gate() {
        let mut t = Tree::new();
        t.write("/a", b"v1".to_vec(), None).unwrap();
        let wrong = Condition { path: "/a".to_string(), contents: b"v2".to_vec() };
        let err = t.write("/b", b"x".to_vec(), Some(&wrong)).unwrap_err();
        assert_eq!(err.status, Status::ConditionNotMet);
        assert!(t.read("/b").is_err());

        let right = Condition { path: "/a".to_string(), contents: b"v1".to_vec() };
        t.write("/b", b"x".to_vec(), Some(&right)).unwrap();
        assert_eq!(t.read("/b").unwrap(), b"x".to_vec());
    }

    #[test]
    fn condition_with_empty_expected_matches_absent_file() {
        let mut t = Tree::new();
        let cond = Condition { path: "/missing".to_string(), contents: vec![] };
        t.write("/a", b"x".to_vec(), Some(&cond)).unwrap();
    }

    #[test]
    fn listing_is_sorted_dirs_then_files() {
        let mut t = Tree::new();
        t.make_directory("/z", None).unwrap();
        t.make_directory("/a", None).unwrap();
        t.write("/m", vec![], None).unwrap();
        t.write("/b", vec![], None).unwrap();
        assert_eq!(
            t.list_directory("/").unwrap(),
            vec!["a/".to_string(), "z/".to_string(), "b".to_string(), "m".to_string()]
        );
    }

    #[test]
    fn snapshot_round_trip() {
        let mut t = Tree::new();
        t.make_directory("/a/b", None).unwrap();
        t.write("/a/b/c", b"hello".to_vec(), None).unwrap();
        t.write("/top", b"x".to_vec(), None).unwrap();

        let mut buf = Vec::new();
        t.dump_snapshot(&mut buf).unwrap();

        let mut loaded = Tree::new();
        loaded.load_snapshot(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.read("/a/b/c").unwrap(), b"hello".to_vec());
        assert_eq!(loaded.read("/top").unwrap(), b"x".to_vec());
        assert_eq!(loaded.list_directory("/a").unwrap(), vec!["b/".to_string()]);
    }
}
