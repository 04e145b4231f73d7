//! Builtin macro computation (spec §4.4, §6 "Builtin macros").
//!
//! `__has_include[_next]` are deliberately absent here: the spec restricts
//! them to `#if` expressions, where [`crate::expr`] handles them directly
//! against the resolver rather than through ordinary text substitution.
//! `_Pragma` is likewise not a value-producing builtin; the expander decodes
//! it as a standalone operator.

use crate::context::PreprocessorContext;

/// Fixed build-time stamps. A real driver would thread these in from the
/// invocation's wall-clock time; the spec only requires them to be "fixed
/// per run", so a constant stamp keeps output reproducible across runs.
const BUILD_DATE: &str = "Jan  1 1970";
const BUILD_TIME: &str = "00:00:00";

const STDC_VERSION: &str = "199901";

/// Returns the expansion text for `name` if it is a builtin macro, `None`
/// if it isn't one at all.
pub fn expand_builtin(name: &str, ctx: &mut PreprocessorContext) -> Option<String> {
    match name {
        "__LINE__" => Some(ctx.reported_line().to_string()),
        "__FILE__" => Some(quote(&ctx.current_file.display().to_string())),
        "__DATE__" => Some(quote(BUILD_DATE)),
        "__TIME__" => Some(quote(BUILD_TIME)),
        "__STDC__" => Some("1".to_string()),
        "__STDC_VERSION__" => Some(STDC_VERSION.to_string()),
        "__COUNTER__" => Some(ctx.next_counter().to_string()),
        "__INCLUDE_LEVEL__" => Some(ctx.include_level().saturating_sub(1).to_string()),
        "__BASE_FILE__" => Some(quote(
            &ctx.base_file
                .clone()
                .unwrap_or_else(|| ctx.current_file.clone())
                .display()
                .to_string(),
        )),
        "__func__" => Some(quote(ctx.current_function.as_deref().unwrap_or("<unknown>"))),
        _ => None,
    }
}

/// True for every builtin name, including `__has_include[_next]` (handled
/// elsewhere) and `defined` (an operator, not a macro), so callers can
/// reject attempts to `#define`/`#undef` them (spec §4.4 treats redefining
/// these as reserved; see [`crate::macro_table::RESERVED_BUILTINS`]).
pub fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "__LINE__"
            | "__FILE__"
            | "__DATE__"
            | "__TIME__"
            | "__STDC__"
            | "__STDC_VERSION__"
            | "__COUNTER__"
            | "__INCLUDE_LEVEL__"
            | "__BASE_FILE__"
            | "__func__"
            | "__has_include"
            | "__has_include_next"
    )
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn line_honors_line_delta() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        ctx.current_line = 4;
        ctx.line_delta = 10;
        assert_eq!(expand_builtin("__LINE__", &mut ctx).unwrap(), "14");
    }

    #[test]
    fn file_is_a_quoted_string() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert_eq!(expand_builtin("__FILE__", &mut ctx).unwrap(), "\"main.c\"");
    }

    #[test]
    fn counter_advances_each_expansion() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert_eq!(expand_builtin("__COUNTER__", &mut ctx).unwrap(), "0");
        assert_eq!(expand_builtin("__COUNTER__", &mut ctx).unwrap(), "1");
    }

    #[test]
    fn stdc_constants_are_fixed() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert_eq!(expand_builtin("__STDC__", &mut ctx).unwrap(), "1");
        assert_eq!(expand_builtin("__STDC_VERSION__", &mut ctx).unwrap(), "199901");
    }

    #[test]
    fn func_falls_back_to_unknown() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert_eq!(expand_builtin("__func__", &mut ctx).unwrap(), "\"<unknown>\"");
        ctx.current_function = Some("main".to_string());
        assert_eq!(expand_builtin("__func__", &mut ctx).unwrap(), "\"main\"");
    }

    #[test]
    fn non_builtin_returns_none() {
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert!(expand_builtin("NOT_A_BUILTIN", &mut ctx).is_none());
    }

    #[test]
    fn has_include_is_reserved_but_not_value_producing() {
        assert!(is_builtin_name("__has_include"));
        let mut ctx = PreprocessorContext::new(PathBuf::from("main.c"));
        assert!(expand_builtin("__has_include", &mut ctx).is_none());
    }
}
