//! Per-line directive routing (spec §4.3 "Directive dispatcher").

use std::path::{Path, PathBuf};

use vc_diagnostics::{Diagnostic, DiagResult, ErrorKind, Location};

use crate::context::PreprocessorContext;
use crate::expander;
use crate::expr;
use crate::loader;
use crate::macro_table::Macro;
use crate::resolver::{IncludeKind, MatchedIndex, Resolver};

/// Preprocess `entry`, returning the expanded output text.
pub fn preprocess(
    entry: &Path,
    resolver: &Resolver,
    ctx: &mut PreprocessorContext,
) -> DiagResult<String> {
    let mut out = String::new();
    process_file(ctx, resolver, entry, MatchedIndex::CurrentDir, &mut out)?;
    Ok(out)
}

fn err_here(ctx: &PreprocessorContext, kind: ErrorKind) -> Diagnostic {
    Diagnostic::new(
        Location::new(ctx.current_file.clone(), ctx.reported_line().max(0) as usize),
        kind,
    )
}

fn process_file(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    path: &Path,
    matched: MatchedIndex,
    out: &mut String,
) -> DiagResult<()> {
    let loaded = loader::load(path)?;
    ctx.push_include(path.to_path_buf(), matched);
    let prev_file = std::mem::replace(&mut ctx.current_file, path.to_path_buf());
    let prev_line = ctx.current_line;
    let prev_delta = ctx.line_delta;
    let depth_at_entry = ctx.conditionals.depth();
    ctx.current_line = 0;
    ctx.line_delta = 0;

    let outcome = process_lines(ctx, resolver, &loaded.lines, out, depth_at_entry);

    ctx.pop_include();
    ctx.current_file = prev_file;
    ctx.current_line = prev_line;
    ctx.line_delta = prev_delta;
    outcome
}

fn process_lines(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    lines: &[String],
    out: &mut String,
    depth_at_entry: usize,
) -> DiagResult<()> {
    let mut idx = 0;
    while idx < lines.len() {
        ctx.current_line = idx + 1;
        process_line(ctx, resolver, &lines[idx], out)?;
        idx += 1;
    }
    if ctx.conditionals.depth() > depth_at_entry {
        let origins = ctx.conditionals.unterminated();
        let origin = origins[depth_at_entry];
        return Err(Diagnostic::new(
            Location::new(ctx.current_file.clone(), origin),
            ErrorKind::PreprocessorSyntax(format!(
                "unterminated conditional directive (opened at line {origin})"
            )),
        ));
    }
    Ok(())
}

fn process_line(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    raw_line: &str,
    out: &mut String,
) -> DiagResult<()> {
    let mut in_comment = ctx.in_comment;
    let stripped = strip_comments_line(raw_line, &mut in_comment);
    ctx.in_comment = in_comment;

    if let Some((word, arg)) = split_directive(&stripped) {
        return dispatch_directive(ctx, resolver, &word, &arg, out);
    }

    if !ctx.conditionals.is_active() {
        return Ok(());
    }
    let expanded = expander::expand_line(ctx, &stripped)?;
    out.push_str(&expanded);
    out.push('\n');
    Ok(())
}

/// Strip `//` and `/* ... */` comments, preserving string/char literal
/// contents and carrying a block comment across lines via `in_comment`.
fn strip_comments_line(line: &str, in_comment: &mut bool) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        if *in_comment {
            while i < chars.len() {
                if chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '/' {
                    *in_comment = false;
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }
        let c = chars[i];
        if c == '"' || c == '\'' {
            let quote = c;
            out.push(c);
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                let done = chars[i] == quote;
                out.push(chars[i]);
                i += 1;
                if done {
                    break;
                }
            }
            continue;
        }
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            break;
        }
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
            i += 2;
            *in_comment = true;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Split a comment-stripped line into `(directive word, rest of line)` if
/// it is a directive line (`#` possibly followed by whitespace).
fn split_directive(stripped: &str) -> Option<(String, String)> {
    let trimmed = stripped.trim_start();
    let rest = trimmed.strip_prefix('#')?;
    let rest = rest.trim_start();
    let word_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let word = rest[..word_end].to_string();
    let arg = rest[word_end..].trim().to_string();
    Some((word, arg))
}

fn dispatch_directive(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    word: &str,
    arg: &str,
    out: &mut String,
) -> DiagResult<()> {
    let origin_line = ctx.current_line;
    match word {
        "ifdef" => {
            handle_ifdef_like(ctx, arg, true, origin_line);
            Ok(())
        }
        "ifndef" => {
            handle_ifdef_like(ctx, arg, false, origin_line);
            Ok(())
        }
        "if" => handle_if(ctx, resolver, arg, origin_line),
        "elif" => handle_elif(ctx, resolver, arg),
        "else" => handle_else(ctx),
        "endif" => handle_endif(ctx),
        _ if !ctx.conditionals.is_active() => Ok(()),
        "define" => handle_define(ctx, arg),
        "undef" => {
            handle_undef(ctx, arg);
            Ok(())
        }
        "include" => handle_include(ctx, resolver, arg, false, out),
        "include_next" => handle_include(ctx, resolver, arg, true, out),
        "line" => handle_line(ctx, arg, out),
        "pragma" => handle_pragma(ctx, arg, out),
        "error" => handle_error(ctx, arg),
        "warning" => handle_warning(ctx, arg),
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_digit()) => {
            handle_line(ctx, &format!("{other} {arg}"), out)
        }
        _ => Ok(()),
    }
}

fn handle_ifdef_like(ctx: &mut PreprocessorContext, arg: &str, want_defined: bool, origin_line: usize) {
    let name = arg.trim().split_whitespace().next().unwrap_or("");
    let is_defined = ctx.macros.is_defined(name);
    let condition = if want_defined { is_defined } else { !is_defined };
    ctx.conditionals.push_if(condition, origin_line);
}

fn handle_if(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    arg: &str,
    origin_line: usize,
) -> DiagResult<()> {
    let parent_active = ctx.conditionals.is_active();
    let condition = if parent_active {
        evaluate_condition(ctx, resolver, arg)?
    } else {
        false
    };
    ctx.conditionals.push_if(condition, origin_line);
    Ok(())
}

fn handle_elif(ctx: &mut PreprocessorContext, resolver: &Resolver, arg: &str) -> DiagResult<()> {
    let need_eval = match ctx.conditionals.top() {
        Some(frame) => frame.parent_active && !frame.taken,
        None => false,
    };
    let condition = if need_eval {
        evaluate_condition(ctx, resolver, arg)?
    } else {
        false
    };
    if !ctx.conditionals.elif(|| condition) {
        return Err(err_here(ctx, ErrorKind::PreprocessorSyntax("stray #elif".into())));
    }
    Ok(())
}

fn handle_else(ctx: &mut PreprocessorContext) -> DiagResult<()> {
    if !ctx.conditionals.else_branch() {
        return Err(err_here(ctx, ErrorKind::PreprocessorSyntax("stray #else".into())));
    }
    Ok(())
}

fn handle_endif(ctx: &mut PreprocessorContext) -> DiagResult<()> {
    if ctx.conditionals.endif().is_none() {
        return Err(err_here(ctx, ErrorKind::PreprocessorSyntax("stray #endif".into())));
    }
    Ok(())
}

/// Resolve `defined`/`__has_include[_next]`, macro-expand the remainder,
/// then evaluate the resulting arithmetic expression (spec §4.5).
fn evaluate_condition(ctx: &mut PreprocessorContext, resolver: &Resolver, arg: &str) -> DiagResult<bool> {
    let after_defined = expr::resolve_defined(arg, &ctx.macros);
    let start_index = ctx
        .include_stack
        .last()
        .map(|f| f.matched.next_start_index())
        .unwrap_or(0);
    let after_has_include = expr::resolve_has_include(&after_defined, resolver, start_index)
        .map_err(|e| err_here(ctx, ErrorKind::PreprocessorSyntax(e.0)))?;
    let expanded = expander::expand_line(ctx, &after_has_include)?;
    let value =
        expr::Evaluator::eval(&expanded).map_err(|e| err_here(ctx, ErrorKind::PreprocessorSyntax(e.0)))?;
    Ok(value != 0)
}

fn handle_define(ctx: &mut PreprocessorContext, arg: &str) -> DiagResult<()> {
    let chars: Vec<char> = arg.chars().collect();
    let mut i = 0;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if i == 0 {
        return Err(err_here(
            ctx,
            ErrorKind::PreprocessorSyntax("#define requires a macro name".into()),
        ));
    }
    let name: String = chars[..i].iter().collect();

    if i < chars.len() && chars[i] == '(' {
        i += 1;
        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i >= chars.len() {
                return Err(err_here(
                    ctx,
                    ErrorKind::PreprocessorSyntax("unterminated macro parameter list".into()),
                ));
            }
            if chars[i] == ')' {
                i += 1;
                break;
            }
            let remaining: String = chars[i..].iter().collect();
            if remaining.starts_with("...") {
                variadic = true;
                i += 3;
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                if i >= chars.len() || chars[i] != ')' {
                    return Err(err_here(
                        ctx,
                        ErrorKind::PreprocessorSyntax("expected ')' after '...'".into()),
                    ));
                }
                i += 1;
                break;
            }
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            if i == start {
                return Err(err_here(
                    ctx,
                    ErrorKind::PreprocessorSyntax("expected parameter name".into()),
                ));
            }
            let pname: String = chars[start..i].iter().collect();
            if params.contains(&pname) {
                return Err(err_here(
                    ctx,
                    ErrorKind::PreprocessorSyntax(format!("duplicate macro parameter '{pname}'")),
                ));
            }
            params.push(pname);
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i < chars.len() && chars[i] == ',' {
                i += 1;
                continue;
            }
            if i < chars.len() && chars[i] == ')' {
                i += 1;
                break;
            }
            return Err(err_here(
                ctx,
                ErrorKind::PreprocessorSyntax("expected ',' or ')' in parameter list".into()),
            ));
        }
        let body_raw: String = chars[i..].iter().collect();
        let body = body_raw.strip_prefix(' ').unwrap_or(&body_raw).to_string();
        ctx.macros.define(Macro::function_like(name, params, variadic, body));
    } else {
        let rest: String = chars[i..].iter().collect();
        ctx.macros.define(Macro::object_like(name, rest.trim_start().to_string()));
    }
    Ok(())
}

fn handle_undef(ctx: &mut PreprocessorContext, arg: &str) {
    if let Some(name) = arg.trim().split_whitespace().next() {
        ctx.macros.undef(name);
    }
}

fn parse_header_token(arg: &str) -> Option<(String, IncludeKind)> {
    let trimmed = arg.trim_start();
    match trimmed.chars().next()? {
        '"' => {
            let rest = &trimmed[1..];
            let end = rest.find('"')?;
            Some((rest[..end].to_string(), IncludeKind::Quoted))
        }
        '<' => {
            let rest = &trimmed[1..];
            let end = rest.find('>')?;
            Some((rest[..end].to_string(), IncludeKind::Angle))
        }
        _ => None,
    }
}

fn handle_include(
    ctx: &mut PreprocessorContext,
    resolver: &Resolver,
    arg: &str,
    is_next: bool,
    out: &mut String,
) -> DiagResult<()> {
    let (fname, kind) = parse_header_token(arg)
        .ok_or_else(|| err_here(ctx, ErrorKind::PreprocessorSyntax("malformed #include".into())))?;
    let current_dir = ctx
        .current_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let resolved = if is_next {
        let start = ctx
            .include_stack
            .last()
            .map(|f| f.matched.next_start_index())
            .unwrap_or(0);
        resolver.resolve_next(&fname, kind, start)
    } else {
        resolver.resolve(&fname, kind, &current_dir, 0)
    };
    let resolved = resolved.ok_or_else(|| {
        err_here(
            ctx,
            ErrorKind::IncludeNotFound {
                name: fname.clone(),
                searched: "configured search directories".to_string(),
            },
        )
    })?;

    let canonical = std::fs::canonicalize(&resolved.path).unwrap_or(resolved.path.clone());
    let id = ctx.interner.intern(&canonical);
    if ctx.is_on_stack(id) {
        return Err(err_here(ctx, ErrorKind::IncludeCycle { path: canonical }));
    }
    if ctx.is_pragma_once(id) {
        return Ok(());
    }
    if ctx.include_stack.len() >= ctx.max_include_depth {
        return Err(err_here(
            ctx,
            ErrorKind::IncludeDepthExceeded {
                max: ctx.max_include_depth,
            },
        ));
    }
    process_file(ctx, resolver, &canonical, resolved.matched, out)
}

fn handle_line(ctx: &mut PreprocessorContext, arg: &str, out: &mut String) -> DiagResult<()> {
    let trimmed = arg.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let num_str = parts.next().unwrap_or("");
    let n: i64 = num_str
        .parse()
        .map_err(|_| err_here(ctx, ErrorKind::PreprocessorSyntax(format!("invalid #line number '{num_str}'"))))?;
    let rest = parts.next().unwrap_or("").trim();

    ctx.line_delta = n - (ctx.current_line as i64 + 1);
    if let Some((file, _)) = parse_header_token(rest) {
        ctx.current_file = PathBuf::from(file);
    }
    out.push_str(&format!("# {} \"{}\"\n", n, ctx.current_file.display()));
    Ok(())
}

fn handle_pragma(ctx: &mut PreprocessorContext, arg: &str, out: &mut String) -> DiagResult<()> {
    let trimmed = arg.trim();
    if trimmed == "once" {
        let canonical = std::fs::canonicalize(&ctx.current_file).unwrap_or_else(|_| ctx.current_file.clone());
        let id = ctx.interner.intern(&canonical);
        ctx.mark_pragma_once(id);
        return Ok(());
    }
    if trimmed == "GCC system_header" {
        ctx.system_header = true;
        return Ok(());
    }
    if let Some(rest) = trimmed.strip_prefix("pack") {
        return handle_pragma_pack(ctx, rest.trim());
    }
    let expanded = expander::expand_line(ctx, arg)?;
    out.push_str("#pragma");
    out.push_str(&expanded);
    out.push('\n');
    Ok(())
}

fn handle_pragma_pack(ctx: &mut PreprocessorContext, rest: &str) -> DiagResult<()> {
    let inner = rest.trim_start_matches('(').trim_end_matches(')').trim();
    if inner == "pop" {
        ctx.pop_pack();
        return Ok(());
    }
    if let Some(after_push) = inner.strip_prefix("push") {
        let after_push = after_push.trim_start_matches(',').trim();
        if after_push.is_empty() {
            let current = ctx.current_pack().unwrap_or(0);
            ctx.push_pack(current);
            return Ok(());
        }
        return match after_push.parse::<u32>() {
            Ok(n) if n >= 1 => {
                ctx.push_pack(n);
                Ok(())
            }
            _ => Err(err_here(
                ctx,
                ErrorKind::PreprocessorSyntax(format!("invalid #pragma pack value '{after_push}'")),
            )),
        };
    }
    Err(err_here(
        ctx,
        ErrorKind::PreprocessorSyntax(format!("malformed #pragma pack({inner})")),
    ))
}

fn handle_error(ctx: &mut PreprocessorContext, arg: &str) -> DiagResult<()> {
    let expanded = expander::expand_line(ctx, arg)?;
    Err(err_here(ctx, ErrorKind::PreprocessorSyntax(format!("#error {expanded}"))))
}

fn handle_warning(ctx: &mut PreprocessorContext, arg: &str) -> DiagResult<()> {
    let expanded = expander::expand_line(ctx, arg)?;
    let diag = err_here(ctx, ErrorKind::Other(format!("#warning {expanded}")));
    ctx.push_warning(diag);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn resolver_with_dir(dir: &Path) -> Resolver {
        Resolver::new(vec![dir.to_path_buf()], false, None)
    }

    #[test]
    fn strip_comments_preserves_string_contents() {
        let mut in_comment = false;
        let out = strip_comments_line(r#"char *s = "// not a comment"; // real"#, &mut in_comment);
        assert_eq!(out, r#"char *s = "// not a comment"; "#);
    }

    #[test]
    fn block_comment_spans_lines() {
        let mut in_comment = false;
        let first = strip_comments_line("int a; /* start", &mut in_comment);
        assert!(in_comment);
        assert_eq!(first, "int a; ");
        let second = strip_comments_line("still comment */ int b;", &mut in_comment);
        assert!(!in_comment);
        assert_eq!(second, " int b;");
    }

    #[test]
    fn constant_folding_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        fs::write(&main, "int main(void){return 3+4;}\n").unwrap();
        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert!(out.contains("return 3+4;"));
    }

    #[test]
    fn include_search_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let includes = dir.path().join("includes");
        fs::create_dir(&includes).unwrap();
        fs::write(includes.join("val.h"), "#define VAL 42\n").unwrap();
        let main = dir.path().join("main.c");
        fs::write(&main, "#include \"val.h\"\nint v = VAL;\n").unwrap();

        let resolver = Resolver::new(vec![includes.clone()], false, None);
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert!(out.contains("int v = 42;"));
    }

    #[test]
    fn pragma_once_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hdr.h"), "#pragma once\nint a;\n").unwrap();
        let main = dir.path().join("main.c");
        fs::write(&main, "#include \"hdr.h\"\n#include \"hdr.h\"\n").unwrap();

        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert_eq!(out.matches("int a;").count(), 1);
    }

    #[test]
    fn counter_builtin_is_monotonic_across_includes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hdr.h"), "int mid = __COUNTER__;\n").unwrap();
        let main = dir.path().join("main.c");
        fs::write(
            &main,
            "int a = __COUNTER__;\n#include \"hdr.h\"\nint b = __COUNTER__;\n",
        )
        .unwrap();

        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert!(out.contains("int a = 0;"));
        assert!(out.contains("int mid = 1;"));
        assert!(out.contains("int b = 2;"));
    }

    #[test]
    fn conditional_with_defined_and_and() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        fs::write(
            &main,
            "#define X 1\n#define Y 1\n#if defined(X) && Y\nint yes;\n#endif\n#undef X\n#if defined(X) && Y\nint no;\n#endif\n",
        )
        .unwrap();
        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert!(out.contains("int yes;"));
        assert!(!out.contains("int no;"));
    }

    #[test]
    fn variadic_macro_and_stringize_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        fs::write(
            &main,
            "#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)\nLOG(\"%d\", 1)\n",
        )
        .unwrap();
        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        let out = preprocess(&main, &resolver, &mut ctx).unwrap();
        assert!(out.contains("printf(\"%d\", 1)"));
    }

    #[test]
    fn unterminated_conditional_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.c");
        fs::write(&main, "#if 1\nint a;\n").unwrap();
        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        assert!(preprocess(&main, &resolver, &mut ctx).is_err());
    }

    #[test]
    fn include_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.h"), "#include \"b.h\"\n").unwrap();
        fs::write(dir.path().join("b.h"), "#include \"a.h\"\n").unwrap();
        let main = dir.path().join("main.c");
        fs::write(&main, "#include \"a.h\"\n").unwrap();
        let resolver = resolver_with_dir(dir.path());
        let mut ctx = PreprocessorContext::new(main.clone());
        assert!(preprocess(&main, &resolver, &mut ctx).is_err());
    }
}
