//! Header search (spec §4.1 "Path resolver").

use std::path::{Path, PathBuf};
use target_lexicon::Triple;

/// Whether an `#include` used quotes or angle brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Quoted,
    Angle,
}

impl IncludeKind {
    pub fn from_delim(endc: char) -> Option<Self> {
        match endc {
            '"' => Some(IncludeKind::Quoted),
            '>' => Some(IncludeKind::Angle),
            _ => None,
        }
    }
}

/// Where a resolved header was found, used to compute `include_next`'s
/// starting index. The spec represents "found via the current directory"
/// with the sentinel `SIZE_MAX`; we use an explicit variant instead so
/// `include_next` arithmetic can't silently wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedIndex {
    /// Found by checking the including file's own directory first (quoted
    /// includes only).
    CurrentDir,
    /// Found at this index into the configured search-directory list.
    SearchDir(usize),
    /// Found in the builtin standard-include list (angle includes, or a
    /// quoted include that fell through to it).
    Builtin,
}

impl MatchedIndex {
    /// The `start_index` an `include_next` from this file should resume
    /// searching at.
    pub fn next_start_index(self) -> usize {
        match self {
            MatchedIndex::CurrentDir => 0,
            MatchedIndex::SearchDir(i) => i + 1,
            MatchedIndex::Builtin => usize::MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: PathBuf,
    pub matched: MatchedIndex,
}

/// Locates header files across ordered search roots.
pub struct Resolver {
    search_dirs: Vec<PathBuf>,
    internal_libc: bool,
    libc_include_dir: PathBuf,
    sysroot: Option<PathBuf>,
    /// Detected target triple, used to adjust the host system include list
    /// by multiarch directory (e.g. `x86_64-linux-gnu`).
    triple: Triple,
}

impl Resolver {
    pub fn new(search_dirs: Vec<PathBuf>, internal_libc: bool, sysroot: Option<PathBuf>) -> Self {
        Self {
            search_dirs,
            internal_libc,
            libc_include_dir: PathBuf::from("/usr/include/vc-libc"),
            sysroot,
            triple: Triple::host(),
        }
    }

    /// The builtin standard-include list: the bundled libc include
    /// directory when `--internal-libc` is set, otherwise the host
    /// system list adjusted by `--sysroot` and the detected multiarch
    /// triple.
    fn builtin_dirs(&self) -> Vec<PathBuf> {
        if self.internal_libc {
            return vec![self.libc_include_dir.clone()];
        }
        let root = self.sysroot.clone().unwrap_or_else(|| PathBuf::from("/"));
        let multiarch = format!(
            "{}-{}-{}",
            self.triple.architecture, self.triple.operating_system, self.triple.environment
        );
        vec![
            root.join("usr/include").join(&multiarch),
            root.join("usr/include"),
            root.join("usr/local/include"),
        ]
    }

    fn readable(path: &Path) -> bool {
        path.is_file()
    }

    /// Resolve a normal `#include`.
    ///
    /// `current_dir` is the directory of the including file (empty for the
    /// root translation unit or when the including context has none).
    pub fn resolve(
        &self,
        fname: &str,
        kind: IncludeKind,
        current_dir: &Path,
        start_index: usize,
    ) -> Option<Resolved> {
        self.resolve_inner(fname, kind, current_dir, start_index, true)
    }

    /// Resolve an `#include_next`: never checks the including file's own
    /// directory, and starts searching after the directory the *current*
    /// file was itself found in.
    pub fn resolve_next(
        &self,
        fname: &str,
        kind: IncludeKind,
        start_index: usize,
    ) -> Option<Resolved> {
        self.resolve_inner(fname, kind, Path::new(""), start_index, false)
    }

    /// `__has_include`/`__has_include_next`: identical search, but the
    /// caller never opens the file, only asks whether resolution would
    /// succeed. Implemented as a thin wrapper so the expression evaluator
    /// never needs its own copy of the search logic (spec §4.5).
    pub fn probe(&self, fname: &str, kind: IncludeKind, start_index: usize) -> bool {
        self.resolve_inner(fname, kind, Path::new(""), start_index, false)
            .is_some()
    }

    fn resolve_inner(
        &self,
        fname: &str,
        kind: IncludeKind,
        current_dir: &Path,
        start_index: usize,
        check_current_dir: bool,
    ) -> Option<Resolved> {
        // 1. quoted + current_dir
        if kind == IncludeKind::Quoted && check_current_dir && !current_dir.as_os_str().is_empty()
        {
            let candidate = current_dir.join(fname);
            if Self::readable(&candidate) {
                return Some(Resolved {
                    path: candidate,
                    matched: MatchedIndex::CurrentDir,
                });
            }
        }

        // 2. configured search dirs from start_index
        if start_index != usize::MAX {
            for (i, dir) in self.search_dirs.iter().enumerate().skip(start_index) {
                let candidate = dir.join(fname);
                if Self::readable(&candidate) {
                    return Some(Resolved {
                        path: candidate,
                        matched: MatchedIndex::SearchDir(i),
                    });
                }
            }
        }

        // 3. angle: builtin standard list
        if kind == IncludeKind::Angle {
            return self.search_builtin(fname);
        }

        // 4. quoted fallthrough: relative to cwd, then builtin list
        let candidate = PathBuf::from(fname);
        if Self::readable(&candidate) {
            return Some(Resolved {
                path: candidate,
                matched: MatchedIndex::Builtin,
            });
        }
        self.search_builtin(fname)
    }

    fn search_builtin(&self, fname: &str) -> Option<Resolved> {
        for dir in self.builtin_dirs() {
            let candidate = dir.join(fname);
            if Self::readable(&candidate) {
                return Some(Resolved {
                    path: candidate,
                    matched: MatchedIndex::Builtin,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn quoted_include_checks_current_dir_first() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("local.h");
        fs::write(&hdr, "").unwrap();

        let resolver = Resolver::new(vec![], false, None);
        let resolved = resolver
            .resolve("local.h", IncludeKind::Quoted, dir.path(), 0)
            .unwrap();
        assert_eq!(resolved.path, hdr);
        assert_eq!(resolved.matched, MatchedIndex::CurrentDir);
    }

    #[test]
    fn angle_include_walks_search_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("val.h");
        fs::write(&hdr, "").unwrap();

        let resolver = Resolver::new(vec![dir.path().to_path_buf()], false, None);
        let resolved = resolver
            .resolve("val.h", IncludeKind::Angle, Path::new(""), 0)
            .unwrap();
        assert_eq!(resolved.path, hdr);
        assert_eq!(resolved.matched, MatchedIndex::SearchDir(0));
    }

    #[test]
    fn include_next_resumes_after_matched_dir() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("val.h"), "a").unwrap();
        fs::write(dir_b.path().join("val.h"), "b").unwrap();

        let resolver = Resolver::new(
            vec![dir_a.path().to_path_buf(), dir_b.path().to_path_buf()],
            false,
            None,
        );
        let first = resolver
            .resolve("val.h", IncludeKind::Angle, Path::new(""), 0)
            .unwrap();
        assert_eq!(first.matched, MatchedIndex::SearchDir(0));

        let next = resolver
            .resolve_next("val.h", IncludeKind::Angle, first.matched.next_start_index())
            .unwrap();
        assert_eq!(next.matched, MatchedIndex::SearchDir(1));
    }

    #[test]
    fn not_found_returns_none() {
        let resolver = Resolver::new(vec![], false, None);
        assert!(resolver
            .resolve("nope.h", IncludeKind::Angle, Path::new(""), 0)
            .is_none());
    }

    #[test]
    fn probe_does_not_require_open() {
        let resolver = Resolver::new(vec![], false, None);
        assert!(!resolver.probe("nope.h", IncludeKind::Angle, 0));
    }
}
