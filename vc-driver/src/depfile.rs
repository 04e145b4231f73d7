//! Dependency-file formatting (spec §6: `target: source header1 header2
//! ...`, spaces in paths escaped `\<space>`).

use std::path::{Path, PathBuf};

pub fn format_dep_file(target: &Path, dependencies: &[PathBuf]) -> String {
    let mut out = String::new();
    out.push_str(&escape(target));
    out.push(':');
    for dep in dependencies {
        out.push(' ');
        out.push_str(&escape(dep));
    }
    out.push('\n');
    out
}

fn escape(path: &Path) -> String {
    path.display().to_string().replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_target_and_dependencies_in_order() {
        let target = PathBuf::from("main.o");
        let deps = vec![PathBuf::from("main.c"), PathBuf::from("includes/val.h")];
        let text = format_dep_file(&target, &deps);
        assert_eq!(text, "main.o: main.c includes/val.h\n");
    }

    #[test]
    fn escapes_spaces_in_paths() {
        let target = PathBuf::from("a b.o");
        let deps = vec![PathBuf::from("has space.h")];
        let text = format_dep_file(&target, &deps);
        assert_eq!(text, "a\\ b.o: has\\ space.h\n");
    }

    #[test]
    fn target_with_no_dependencies_still_has_trailing_colon() {
        let target = PathBuf::from("x.o");
        let text = format_dep_file(&target, &[]);
        assert_eq!(text, "x.o:\n");
    }
}
