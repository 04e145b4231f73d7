//! Recursive macro expansion (spec §4.4 "Macro expander").
//!
//! Self-recursion is broken by [`ExpandingSet`], an explicit auxiliary
//! structure threaded through the recursive calls rather than a mutable
//! flag on the [`crate::macro_table::Macro`] entry itself (see the note on
//! `Macro` and spec §9's "Reentrancy flag on macro table entries"). This
//! keeps the macro table read-only during expansion.

use vc_diagnostics::{Diagnostic, DiagResult, ErrorKind};

use crate::builtins;
use crate::context::PreprocessorContext;
use crate::macro_table::Macro;

/// The set of macro names whose expansion is currently in progress on the
/// call stack, used to make self-reference inert (spec §4.4, §8).
#[derive(Debug, Default)]
pub struct ExpandingSet {
    active: Vec<String>,
}

impl ExpandingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }

    fn push(&mut self, name: String) {
        self.active.push(name);
    }

    fn pop(&mut self) {
        self.active.pop();
    }
}

/// Macro-expand one already comment-stripped, continuation-joined line.
pub fn expand_line(ctx: &mut PreprocessorContext, line: &str) -> DiagResult<String> {
    let mut expanding = ExpandingSet::new();
    let mut out = String::new();
    expand_into(ctx, line, &mut expanding, 0, &mut out)?;
    Ok(out)
}

fn expand_into(
    ctx: &mut PreprocessorContext,
    text: &str,
    expanding: &mut ExpandingSet,
    depth: usize,
    out: &mut String,
) -> DiagResult<()> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' {
            copy_literal(&chars, &mut i, out);
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();

            if name == "_Pragma" {
                if try_expand_pragma(&chars, &mut i, out)? {
                    check_size(ctx, out)?;
                    continue;
                }
                out.push_str(&name);
                check_size(ctx, out)?;
                continue;
            }

            if let Some(value) = builtins::expand_builtin(&name, ctx) {
                out.push_str(&value);
                check_size(ctx, out)?;
                continue;
            }

            let is_self_expanding = expanding.contains(&name);
            let macro_def = ctx.macros.lookup(&name).cloned();
            match macro_def {
                None => {
                    out.push_str(&name);
                }
                Some(m) if is_self_expanding => {
                    out.push_str(&name);
                    if m.is_function_like() {
                        copy_inert_call_through(&chars, &mut i, out);
                    }
                }
                Some(m) if m.is_function_like() => {
                    expand_function_like(ctx, &chars, &mut i, &name, &m, expanding, depth, out)?;
                }
                Some(m) => {
                    if depth + 1 > ctx.max_recursion_depth {
                        return Err(Diagnostic::at_line(
                            ctx.current_line,
                            ErrorKind::MacroExpansionLimitExceeded,
                        ));
                    }
                    expanding.push(name.clone());
                    expand_into(ctx, &m.body, expanding, depth + 1, out)?;
                    expanding.pop();
                }
            }
            check_size(ctx, out)?;
            continue;
        }

        out.push(c);
        i += 1;
    }
    Ok(())
}

fn expand_function_like(
    ctx: &mut PreprocessorContext,
    chars: &[char],
    i: &mut usize,
    name: &str,
    m: &Macro,
    expanding: &mut ExpandingSet,
    depth: usize,
    out: &mut String,
) -> DiagResult<()> {
    let mut j = *i;
    skip_ws(chars, &mut j);
    if j >= chars.len() || chars[j] != '(' {
        out.push_str(name);
        return Ok(());
    }
    let Some((mut args, end)) = parse_call_args(chars, j) else {
        return Err(Diagnostic::at_line(
            ctx.current_line,
            ErrorKind::PreprocessorSyntax("unterminated macro argument list".into()),
        ));
    };
    if m.params.is_empty() && !m.variadic && args.len() == 1 && args[0].is_empty() {
        args.clear();
    }
    let too_few = args.len() < m.params.len();
    let too_many = !m.variadic && args.len() > m.params.len();
    if too_few || too_many {
        out.push_str(name);
        return Ok(());
    }
    if depth + 1 > ctx.max_recursion_depth {
        return Err(Diagnostic::at_line(
            ctx.current_line,
            ErrorKind::MacroExpansionLimitExceeded,
        ));
    }
    let substituted = substitute(&m.body, m, &args);
    expanding.push(name.to_string());
    expand_into(ctx, &substituted, expanding, depth + 1, out)?;
    expanding.pop();
    *i = end;
    Ok(())
}

/// When a function-like macro's name appears while it is already
/// expanding, copy its call (including the matched closing paren) through
/// verbatim so self-reference stays inert rather than leaving a dangling
/// `(` for the caller to misinterpret.
fn copy_inert_call_through(chars: &[char], i: &mut usize, out: &mut String) {
    let save = *i;
    let mut j = *i;
    skip_ws(chars, &mut j);
    if j < chars.len() && chars[j] == '(' {
        if let Some((_, end)) = parse_call_args(chars, j) {
            out.push_str(&chars[save..end].iter().collect::<String>());
            *i = end;
        }
    }
}

fn copy_literal(chars: &[char], i: &mut usize, out: &mut String) {
    let quote = chars[*i];
    out.push(quote);
    *i += 1;
    while *i < chars.len() {
        if chars[*i] == '\\' && *i + 1 < chars.len() {
            out.push(chars[*i]);
            out.push(chars[*i + 1]);
            *i += 2;
            continue;
        }
        let c = chars[*i];
        out.push(c);
        *i += 1;
        if c == quote {
            break;
        }
    }
}

/// Recognize `_Pragma("...")` and emit it as a fresh `#pragma` directive
/// line. Returns `false` (leaving `out`/`i` untouched) if what follows
/// isn't a well-formed `_Pragma` call, so the caller falls back to
/// emitting the bare identifier.
fn try_expand_pragma(chars: &[char], i: &mut usize, out: &mut String) -> DiagResult<bool> {
    let mut j = *i;
    skip_ws(chars, &mut j);
    if j >= chars.len() || chars[j] != '(' {
        return Ok(false);
    }
    j += 1;
    skip_ws(chars, &mut j);
    if j >= chars.len() || chars[j] != '"' {
        return Ok(false);
    }
    let (decoded, after_string) = decode_pragma_string(chars, j)?;
    let mut k = after_string;
    skip_ws(chars, &mut k);
    if k >= chars.len() || chars[k] != ')' {
        return Ok(false);
    }
    k += 1;
    out.push('\n');
    out.push_str("#pragma ");
    out.push_str(&decoded);
    out.push('\n');
    *i = k;
    Ok(true)
}

fn decode_pragma_string(chars: &[char], start: usize) -> DiagResult<(String, usize)> {
    let mut j = start + 1; // skip opening quote
    let mut s = String::new();
    while j < chars.len() && chars[j] != '"' {
        if chars[j] == '\\' && j + 1 < chars.len() {
            j += 1;
            match chars[j] {
                'n' => {
                    s.push('\n');
                    j += 1;
                }
                't' => {
                    s.push('\t');
                    j += 1;
                }
                '"' => {
                    s.push('"');
                    j += 1;
                }
                '\\' => {
                    s.push('\\');
                    j += 1;
                }
                'x' => {
                    j += 1;
                    let hstart = j;
                    while j < chars.len() && chars[j].is_ascii_hexdigit() {
                        j += 1;
                    }
                    let text: String = chars[hstart..j].iter().collect();
                    let v = u32::from_str_radix(&text, 16).unwrap_or(0);
                    s.push(char::from_u32(v).unwrap_or('\u{fffd}'));
                }
                '0'..='7' => {
                    let ostart = j;
                    while j < chars.len() && j < ostart + 3 && chars[j].is_digit(8) {
                        j += 1;
                    }
                    let text: String = chars[ostart..j].iter().collect();
                    let v = u32::from_str_radix(&text, 8).unwrap_or(0);
                    s.push(char::from_u32(v).unwrap_or('\u{fffd}'));
                }
                other => {
                    s.push(other);
                    j += 1;
                }
            }
        } else {
            s.push(chars[j]);
            j += 1;
        }
    }
    if j >= chars.len() {
        return Err(Diagnostic::at_line(
            0,
            ErrorKind::PreprocessorSyntax("unterminated _Pragma string literal".into()),
        ));
    }
    Ok((s, j + 1))
}

/// Parse a parenthesized, comma-separated argument list starting at
/// `chars[start] == '('`. Respects nested parens and quoted literals.
/// Returns the trimmed argument texts and the index just past the matched
/// `)`, or `None` if unterminated.
fn parse_call_args(chars: &[char], start: usize) -> Option<(Vec<String>, usize)> {
    let mut i = start + 1;
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    loop {
        if i >= chars.len() {
            return None;
        }
        match chars[i] {
            '"' | '\'' => {
                let quote = chars[i];
                current.push(chars[i]);
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        current.push(chars[i]);
                        current.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    current.push(chars[i]);
                    let done = chars[i] == quote;
                    i += 1;
                    if done {
                        break;
                    }
                }
            }
            '(' => {
                depth += 1;
                current.push('(');
                i += 1;
            }
            ')' => {
                if depth == 0 {
                    args.push(current.trim().to_string());
                    return Some((args, i + 1));
                }
                depth -= 1;
                current.push(')');
                i += 1;
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current = String::new();
                i += 1;
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    }
}

// --- Parameter substitution (`#`, `##`, plain reference) ------------------

#[derive(Debug, Clone)]
enum BTok {
    Ident(String),
    Str(String),
    Space(String),
    Hash,
    HashHash,
    Other(char),
}

fn tokenize_body(body: &str) -> Vec<BTok> {
    let chars: Vec<char> = body.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            toks.push(BTok::Space(chars[start..i].iter().collect()));
            continue;
        }
        if c == '"' || c == '\'' {
            let start = i;
            let quote = c;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                let done = chars[i] == quote;
                i += 1;
                if done {
                    break;
                }
            }
            toks.push(BTok::Str(chars[start..i].iter().collect()));
            continue;
        }
        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            toks.push(BTok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if c == '#' {
            if i + 1 < chars.len() && chars[i + 1] == '#' {
                toks.push(BTok::HashHash);
                i += 2;
            } else {
                toks.push(BTok::Hash);
                i += 1;
            }
            continue;
        }
        toks.push(BTok::Other(c));
        i += 1;
    }
    toks
}

#[derive(Debug, Clone)]
enum Elem {
    Text(String),
    Space(String),
    Paste,
}

/// Substitute `args` for `macro_def`'s parameters into its replacement
/// text, handling `#param` stringizing and `lhs ## rhs` pasting (spec
/// §4.4). The result is handed back to [`expand_into`] for a full re-scan.
fn substitute(body: &str, macro_def: &Macro, args: &[String]) -> String {
    let toks = tokenize_body(body);

    let param_index = |name: &str| -> Option<usize> {
        if macro_def.variadic && name == "__VA_ARGS__" {
            return Some(macro_def.params.len());
        }
        macro_def.params.iter().position(|p| p == name)
    };
    let arg_text = |idx: usize| -> String {
        if macro_def.variadic && idx == macro_def.params.len() {
            args.get(macro_def.params.len()..)
                .map(|rest| rest.join(", "))
                .unwrap_or_default()
        } else {
            args.get(idx).cloned().unwrap_or_default()
        }
    };

    // Pass 1: `#param` stringizing.
    let mut stage1: Vec<BTok> = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        if let BTok::Hash = toks[i] {
            let mut j = i + 1;
            while matches!(toks.get(j), Some(BTok::Space(_))) {
                j += 1;
            }
            if let Some(BTok::Ident(name)) = toks.get(j) {
                if let Some(idx) = param_index(name) {
                    stage1.push(BTok::Str(stringize(&arg_text(idx))));
                    i = j + 1;
                    continue;
                }
            }
            stage1.push(BTok::Other('#'));
            i += 1;
            continue;
        }
        stage1.push(toks[i].clone());
        i += 1;
    }

    // Pass 2: turn every remaining token into an `Elem`, substituting
    // plain parameter references by their (unexpanded) argument text.
    let mut elems: Vec<Elem> = Vec::with_capacity(stage1.len());
    for tok in stage1 {
        let elem = match tok {
            BTok::Ident(name) => match param_index(&name) {
                Some(idx) => Elem::Text(arg_text(idx)),
                None => Elem::Text(name),
            },
            BTok::Str(s) => Elem::Text(s),
            BTok::Space(s) => Elem::Space(s),
            BTok::HashHash => Elem::Paste,
            BTok::Hash => Elem::Text("#".to_string()),
            BTok::Other(c) => Elem::Text(c.to_string()),
        };
        elems.push(elem);
    }

    // Pass 3: resolve `##` pasting, trimming whitespace on both sides.
    let mut merged: Vec<Elem> = Vec::with_capacity(elems.len());
    let mut i = 0;
    while i < elems.len() {
        if let Elem::Paste = elems[i] {
            while matches!(merged.last(), Some(Elem::Space(_))) {
                merged.pop();
            }
            let left = match merged.pop() {
                Some(Elem::Text(t)) => t,
                _ => String::new(),
            };
            i += 1;
            while i < elems.len() && matches!(elems[i], Elem::Space(_)) {
                i += 1;
            }
            let right = match elems.get(i) {
                Some(Elem::Text(t)) => t.clone(),
                _ => String::new(),
            };
            if i < elems.len() {
                i += 1;
            }
            merged.push(Elem::Text(format!("{left}{right}")));
            continue;
        }
        merged.push(elems[i].clone());
        i += 1;
    }

    let mut out = String::new();
    for elem in merged {
        match elem {
            Elem::Text(t) => out.push_str(&t),
            Elem::Space(s) => out.push_str(&s),
            Elem::Paste => {}
        }
    }
    out
}

fn stringize(raw: &str) -> String {
    let mut s = String::with_capacity(raw.len() + 2);
    s.push('"');
    for c in raw.chars() {
        if c == '\\' || c == '"' {
            s.push('\\');
        }
        s.push(c);
    }
    s.push('"');
    s
}

fn check_size(ctx: &PreprocessorContext, out: &str) -> DiagResult<()> {
    if ctx.max_expansion_size != 0 && out.len() > ctx.max_expansion_size {
        return Err(Diagnostic::at_line(
            ctx.current_line,
            ErrorKind::MacroExpansionSizeLimitExceeded,
        ));
    }
    Ok(())
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_ws(chars: &[char], i: &mut usize) {
    while *i < chars.len() && chars[*i].is_whitespace() {
        *i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> PreprocessorContext {
        PreprocessorContext::new(PathBuf::from("main.c"))
    }

    #[test]
    fn object_like_expands() {
        let mut c = ctx();
        c.macros.define(Macro::object_like("X", "42"));
        assert_eq!(expand_line(&mut c, "int a = X;").unwrap(), "int a = 42;");
    }

    #[test]
    fn self_reference_is_inert() {
        let mut c = ctx();
        c.macros.define(Macro::object_like("X", "X + 1"));
        assert_eq!(expand_line(&mut c, "X").unwrap(), "X + 1");
    }

    #[test]
    fn function_like_call_substitutes_args() {
        let mut c = ctx();
        c.macros.define(Macro::function_like(
            "ADD",
            vec!["a".into(), "b".into()],
            false,
            "(a) + (b)",
        ));
        assert_eq!(expand_line(&mut c, "ADD(1, 2)").unwrap(), "(1) + (2)");
    }

    #[test]
    fn bare_function_like_name_is_untouched() {
        let mut c = ctx();
        c.macros.define(Macro::function_like(
            "ADD",
            vec!["a".into(), "b".into()],
            false,
            "(a)+(b)",
        ));
        assert_eq!(expand_line(&mut c, "ADD").unwrap(), "ADD");
    }

    #[test]
    fn stringize_escapes_quotes_and_backslashes() {
        let mut c = ctx();
        c.macros
            .define(Macro::function_like("STR", vec!["x".into()], false, "#x"));
        let out = expand_line(&mut c, r#"STR("a\"b\\c")"#).unwrap();
        assert_eq!(out, r#""\"a\\\"b\\\\c\"""#);
    }

    #[test]
    fn token_paste_concatenates() {
        let mut c = ctx();
        c.macros.define(Macro::function_like(
            "CAT",
            vec!["a".into(), "b".into()],
            false,
            "a ## b",
        ));
        assert_eq!(expand_line(&mut c, "CAT(foo, bar)").unwrap(), "foobar");
    }

    #[test]
    fn variadic_macro_joins_trailing_args() {
        let mut c = ctx();
        c.macros.define(Macro::function_like(
            "LOG",
            vec!["fmt".into()],
            true,
            "printf(fmt, __VA_ARGS__)",
        ));
        assert_eq!(
            expand_line(&mut c, r#"LOG("%d", 1)"#).unwrap(),
            r#"printf("%d", 1)"#
        );
    }

    #[test]
    fn string_literals_are_not_expanded_inside() {
        let mut c = ctx();
        c.macros.define(Macro::object_like("X", "99"));
        assert_eq!(expand_line(&mut c, r#""X""#).unwrap(), r#""X""#);
    }

    #[test]
    fn pragma_operator_becomes_directive_line() {
        let mut c = ctx();
        let out = expand_line(&mut c, r#"_Pragma("GCC system_header")"#).unwrap();
        assert_eq!(out, "\n#pragma GCC system_header\n");
    }

    #[test]
    fn empty_paren_call_passes_no_arguments() {
        let mut c = ctx();
        c.macros
            .define(Macro::function_like("ZERO", vec![], false, "0"));
        assert_eq!(expand_line(&mut c, "ZERO()").unwrap(), "0");
    }

    #[test]
    fn too_few_arguments_is_malformed_and_left_verbatim() {
        let mut c = ctx();
        c.macros.define(Macro::function_like(
            "ADD",
            vec!["a".into(), "b".into()],
            false,
            "(a)+(b)",
        ));
        assert_eq!(expand_line(&mut c, "ADD(1)").unwrap(), "ADD(1)");
    }
}
