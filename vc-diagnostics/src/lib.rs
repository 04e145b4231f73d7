//! Shared diagnostic model for every `vc` crate.
//!
//! Generalizes the teacher's `cranelift-reader::error` module (`Location`,
//! `ParseError`, `err!`) from "one parse error with a line number" to the
//! full error taxonomy of the preprocessor and code generator: resource
//! failure, preprocessor syntax, resolution failure, cycles/limits,
//! semantic (surfaced from an external collaborator), and non-fatal
//! warnings. Every core entry point in this workspace returns
//! `DiagResult<T>`; nothing is caught and silently dropped below the
//! driver.

use std::fmt;
use std::path::PathBuf;

/// Where a diagnostic originates. Line 0 means "command-line arguments or
/// synthetic input", matching the teacher's convention for `Location`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: Option<usize>,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// A location with no file, used for command-line-argument errors.
    pub fn command_line() -> Self {
        Self::default()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            None => write!(f, "command-line arguments"),
            Some(file) => match self.column {
                Some(col) => write!(f, "{}:{}:{}", file.display(), self.line, col),
                None => write!(f, "{}:{}", file.display(), self.line),
            },
        }
    }
}

/// The category of a diagnostic, matching spec §7's error categories.
/// This is a `thiserror` enum so each variant carries exactly the data its
/// message needs and `Display` is derived rather than hand-formatted.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("out of memory")]
    OutOfMemory,

    #[error("could not read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    PreprocessorSyntax(String),

    #[error("'{name}' file not found, searched: {searched}")]
    IncludeNotFound { name: String, searched: String },

    #[error("include cycle detected: {path}")]
    IncludeCycle { path: PathBuf },

    #[error("include depth exceeded (max {max})")]
    IncludeDepthExceeded { max: usize },

    #[error("macro expansion limit exceeded")]
    MacroExpansionLimitExceeded,

    #[error("macro expansion size limit exceeded")]
    MacroExpansionSizeLimitExceeded,

    #[error("{0}")]
    Semantic(String),

    #[error("broken pipe")]
    BrokenPipe,

    #[error("{0}")]
    Other(String),
}

/// A non-fatal or fatal diagnostic with its source location.
#[derive(Debug, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct Diagnostic {
    pub location: Location,
    pub kind: ErrorKind,
}

impl Diagnostic {
    pub fn new(location: Location, kind: ErrorKind) -> Self {
        Self { location, kind }
    }

    pub fn at_line(line: usize, kind: ErrorKind) -> Self {
        Self {
            location: Location {
                file: None,
                line,
                column: None,
            },
            kind,
        }
    }
}

/// Result alias used by every fallible entry point in the workspace.
pub type DiagResult<T> = Result<T, Diagnostic>;

/// A collector for non-fatal diagnostics (`#warning`, unreachable-code
/// notices) produced while a fatal error may or may not also occur,
/// matching §7's "Warnings ... allow the run to continue".
#[derive(Debug, Default)]
pub struct WarningSink {
    warnings: Vec<Diagnostic>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.warnings.push(diag);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.warnings.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }
}

/// Build an `Err(Diagnostic)` at the given location with a formatted
/// message, mirroring the teacher's `err!` macro but targeting the richer
/// `Diagnostic` type instead of a single `ParseError`.
#[macro_export]
macro_rules! diag {
    ($loc:expr, $kind:expr) => {
        Err($crate::Diagnostic::new($loc.clone(), $kind))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_location_has_no_file() {
        let loc = Location::command_line();
        assert_eq!(loc.to_string(), "command-line arguments");
    }

    #[test]
    fn file_location_formats_file_and_line() {
        let loc = Location::new("main.c", 12);
        assert_eq!(loc.to_string(), "main.c:12");
    }

    #[test]
    fn diagnostic_display_includes_location_and_message() {
        let diag = Diagnostic::new(
            Location::new("main.c", 3),
            ErrorKind::IncludeNotFound {
                name: "foo.h".into(),
                searched: "/a, /b".into(),
            },
        );
        let text = diag.to_string();
        assert!(text.starts_with("main.c:3: "));
        assert!(text.contains("foo.h"));
    }

    #[test]
    fn warning_sink_accumulates() {
        let mut sink = WarningSink::new();
        assert!(sink.is_empty());
        sink.push(Diagnostic::new(
            Location::command_line(),
            ErrorKind::Other("heads up".into()),
        ));
        assert_eq!(sink.len(), 1);
    }
}
