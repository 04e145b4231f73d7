//! Reads a source file and splits it into logical lines (spec §4.2 "File
//! loader").
//!
//! Rust's `String`/`Vec<String>` already own their storage, so unlike the
//! source's NUL-terminated pointer array into one shared buffer, there is no
//! separate "buffer + pointer table" pair to free together; a `LoadedFile`
//! is just an owned vector of already-normalized logical lines.

use std::path::Path;

use vc_diagnostics::{Diagnostic, ErrorKind, Location};

/// One file's logical lines, after CR stripping and backslash-continuation
/// joining.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub lines: Vec<String>,
}

/// Read `path` and normalize it into logical lines.
pub fn load(path: &Path) -> Result<LoadedFile, Diagnostic> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        Diagnostic::new(
            Location::command_line(),
            ErrorKind::FileRead {
                path: path.to_path_buf(),
                source,
            },
        )
    })?;
    Ok(LoadedFile {
        lines: normalize(&raw),
    })
}

/// Strip `\r`, join backslash-newline continuations, split on `\n`, and
/// drop a trailing empty line.
pub fn normalize(raw: &str) -> Vec<String> {
    let stripped: String = raw.chars().filter(|&c| c != '\r').collect();

    let mut joined = String::with_capacity(stripped.len());
    let mut chars = stripped.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'\n') {
            chars.next();
            continue;
        }
        joined.push(c);
    }

    let mut lines: Vec<String> = joined.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_carriage_returns() {
        let lines = normalize("int a;\r\nint b;\r\n");
        assert_eq!(lines, vec!["int a;", "int b;"]);
    }

    #[test]
    fn joins_backslash_continuations() {
        let lines = normalize("int a \\\n  = 1;\nint b;\n");
        assert_eq!(lines, vec!["int a   = 1;", "int b;"]);
    }

    #[test]
    fn elides_trailing_empty_line() {
        let lines = normalize("int a;\n");
        assert_eq!(lines, vec!["int a;"]);
    }

    #[test]
    fn no_trailing_newline_keeps_last_line() {
        let lines = normalize("int a;");
        assert_eq!(lines, vec!["int a;"]);
    }
}
