//! Interning of canonical include paths.
//!
//! DESIGN NOTES in the source call out that the include stack compares
//! canonical paths as plain strings; re-architected here as an interner so
//! include-stack entries hold a cheap `Copy` id and cycle detection becomes
//! an O(depth) id comparison instead of a string comparison per stack frame.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An interned canonical path. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedPath(u32);

/// Interns canonical filesystem paths.
///
/// The interner does not canonicalize paths itself; callers pass in an
/// already-canonicalized path (real-path resolved), since canonicalization
/// requires filesystem access the interner shouldn't assume is available in
/// tests.
#[derive(Debug, Default)]
pub struct PathInterner {
    paths: Vec<PathBuf>,
    index: HashMap<PathBuf, InternedPath>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `path`, returning its existing id if already known.
    pub fn intern(&mut self, path: &Path) -> InternedPath {
        if let Some(&id) = self.index.get(path) {
            return id;
        }
        let id = InternedPath(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        self.index.insert(path.to_path_buf(), id);
        id
    }

    /// Resolve an id back to its path.
    pub fn resolve(&self, id: InternedPath) -> &Path {
        &self.paths[id.0 as usize]
    }

    /// True if `path` has already been interned.
    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = PathInterner::new();
        let a = interner.intern(Path::new("/a/b.h"));
        let b = interner.intern(Path::new("/a/b.h"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_paths_get_distinct_ids() {
        let mut interner = PathInterner::new();
        let a = interner.intern(Path::new("/a/b.h"));
        let b = interner.intern(Path::new("/a/c.h"));
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), Path::new("/a/b.h"));
        assert_eq!(interner.resolve(b), Path::new("/a/c.h"));
    }
}
