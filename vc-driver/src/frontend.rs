//! The seam to the out-of-scope C front end (spec §1 "Out of scope": "the C
//! front-end (lexer and parser producing the AST), semantic analysis").
//!
//! The driver only needs *something* that turns preprocessed text into one
//! [`IrBuilder`] per function; a real project plugs in a full recursive-
//! descent parser plus semantic checker here. [`MinimalFrontend`] is a
//! stand-in just capable enough to drive this crate's own pipeline tests
//! and spec §8 scenario 1 end-to-end — it is not a C parser.

use vc_diagnostics::{Diagnostic, DiagResult, ErrorKind, Location};
use vc_ir::{IrBuilder, Type};

/// Turns one translation unit's preprocessed text into per-function IR.
pub trait Frontend {
    fn compile(&self, source: &str, source_name: &str) -> DiagResult<Vec<IrBuilder>>;
}

/// Recognizes `int NAME(void) { return EXPR; }` where `EXPR` is a chain of
/// integer literals joined by `+ - * /`, one function per match. Good
/// enough to exercise constant propagation and the rest of the pipeline on
/// real input without pulling in a parser.
#[derive(Debug, Default)]
pub struct MinimalFrontend;

impl Frontend for MinimalFrontend {
    fn compile(&self, source: &str, source_name: &str) -> DiagResult<Vec<IrBuilder>> {
        let mut out = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("int ") {
            rest = &rest[start + 4..];
            let Some(paren) = rest.find('(') else { break };
            let name = rest[..paren].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                continue;
            }
            let Some(body_open) = rest.find('{') else { break };
            let Some(body_close) = rest.find('}') else { break };
            if body_close < body_open {
                continue;
            }
            let body = &rest[body_open + 1..body_close];
            out.push(build_function(name, body, source_name)?);
            rest = &rest[body_close + 1..];
        }
        if out.is_empty() {
            return Err(Diagnostic::new(
                Location::new(source_name, 1),
                ErrorKind::Semantic("no recognizable function definition".into()),
            ));
        }
        Ok(out)
    }
}

fn build_function(name: &str, body: &str, source_name: &str) -> DiagResult<IrBuilder> {
    let mut b = IrBuilder::new();
    b.func_begin(name);
    let Some(ret_pos) = body.find("return") else {
        return Err(Diagnostic::new(
            Location::new(source_name, 1),
            ErrorKind::Semantic(format!("function '{name}' has no return statement")),
        ));
    };
    let tail = &body[ret_pos + "return".len()..];
    let expr = tail.trim_end().trim_end_matches(';').trim();
    let value = build_int_expr(&mut b, expr, name, source_name)?;
    b.ret(Some(value));
    b.func_end();
    Ok(b)
}

/// Left-to-right evaluation of a `NUM (op NUM)*` chain (no precedence
/// needed: the frontend's only job is to hand the optimizer something to
/// fold, not to implement C's expression grammar).
fn build_int_expr(
    b: &mut IrBuilder,
    expr: &str,
    func: &str,
    source_name: &str,
) -> DiagResult<vc_ir::Value> {
    let mut tokens = tokenize(expr);
    let bad_expr = || {
        Diagnostic::new(
            Location::new(source_name, 1),
            ErrorKind::Semantic(format!("function '{func}': unparsable return expression '{expr}'")),
        )
    };
    let Some(Token::Num(first)) = tokens.first().cloned() else {
        return Err(bad_expr());
    };
    let mut acc = b.const_int(Type::I32, first);
    let mut i = 1;
    while i + 1 < tokens.len() {
        let (Token::Op(op), Token::Num(n)) = (tokens[i].clone(), tokens[i + 1].clone()) else {
            return Err(bad_expr());
        };
        let rhs = b.const_int(Type::I32, n);
        acc = match op {
            '+' => b.add(Type::I32, acc, rhs),
            '-' => b.sub(Type::I32, acc, rhs),
            '*' => b.mul(Type::I32, acc, rhs),
            '/' => b.div(Type::I32, acc, rhs),
            _ => return Err(bad_expr()),
        };
        i += 2;
    }
    if i != tokens.len() {
        // A trailing operator with no right-hand side: malformed.
        return Err(bad_expr());
    }
    Ok(acc)
}

#[derive(Debug, Clone)]
enum Token {
    Num(i64),
    Op(char),
}

fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            if let Ok(n) = text.parse::<i64>() {
                tokens.push(Token::Num(n));
            }
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push(Token::Op(c));
            i += 1;
        } else {
            i += 1;
        }
    }
    tokens
}
