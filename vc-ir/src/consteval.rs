//! Constant-expression evaluator (spec §4.8). Used by array-bound checking
//! and initializer processing; this layer never sees a symbol table, only
//! an [`ConstExpr`] tree with enum constants already resolved.

use crate::ast::{BinaryOp, ConstExpr, SizeOfOperand, UnaryOp};

/// Mirrors the `#if` evaluator's arithmetic rules (spec §4.5): 64-bit
/// signed wraparound, division/modulus by zero yields 0, shift counts
/// clamp to 0..63.
pub struct ConstEvaluator {
    pub pointer_width: u64,
}

impl ConstEvaluator {
    pub fn new(pointer_width: u64) -> Self {
        Self { pointer_width }
    }

    /// Returns `None` when the expression is "not constant" (spec §4.8);
    /// this AST has no non-constant nodes, so in practice this always
    /// succeeds, but the `Option` return keeps the contract explicit for
    /// a caller that may someday feed in a richer AST with runtime nodes.
    pub fn eval(&self, expr: &ConstExpr) -> Option<i64> {
        match expr {
            ConstExpr::IntLiteral(v) | ConstExpr::CharLiteral(v) | ConstExpr::EnumConstant(v) => {
                Some(*v)
            }
            ConstExpr::SizeOf(SizeOfOperand::Fixed(size)) => Some(*size as i64),
            ConstExpr::SizeOf(SizeOfOperand::PointerSized) => Some(self.pointer_width as i64),
            ConstExpr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                Some(match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::BitNot => !v,
                    UnaryOp::LogNot => (v == 0) as i64,
                })
            }
            ConstExpr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                Some(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div => {
                        if b == 0 {
                            0
                        } else {
                            a.wrapping_div(b)
                        }
                    }
                    BinaryOp::Mod => {
                        if b == 0 {
                            0
                        } else {
                            a.wrapping_rem(b)
                        }
                    }
                    BinaryOp::Shl => a.wrapping_shl(clamp_shift(b)),
                    BinaryOp::Shr => a.wrapping_shr(clamp_shift(b)),
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    BinaryOp::BitXor => a ^ b,
                    BinaryOp::Eq => (a == b) as i64,
                    BinaryOp::Ne => (a != b) as i64,
                    BinaryOp::Lt => (a < b) as i64,
                    BinaryOp::Le => (a <= b) as i64,
                    BinaryOp::Gt => (a > b) as i64,
                    BinaryOp::Ge => (a >= b) as i64,
                    BinaryOp::LogAnd => ((a != 0) && (b != 0)) as i64,
                    BinaryOp::LogOr => ((a != 0) || (b != 0)) as i64,
                })
            }
        }
    }
}

fn clamp_shift(count: i64) -> u32 {
    if count < 0 {
        0
    } else if count >= 64 {
        63
    } else {
        count as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> ConstExpr {
        ConstExpr::IntLiteral(v)
    }

    #[test]
    fn folds_arithmetic() {
        let ev = ConstEvaluator::new(8);
        let expr = ConstExpr::Binary(BinaryOp::Add, Box::new(int(3)), Box::new(int(4)));
        assert_eq!(ev.eval(&expr), Some(7));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let ev = ConstEvaluator::new(8);
        let expr = ConstExpr::Binary(BinaryOp::Div, Box::new(int(5)), Box::new(int(0)));
        assert_eq!(ev.eval(&expr), Some(0));
    }

    #[test]
    fn sizeof_pointer_uses_configured_width() {
        let ev = ConstEvaluator::new(4);
        assert_eq!(ev.eval(&ConstExpr::SizeOf(SizeOfOperand::PointerSized)), Some(4));
    }

    #[test]
    fn shift_clamps_negative_and_overlong_counts() {
        let ev = ConstEvaluator::new(8);
        let lhs = Box::new(int(1));
        assert_eq!(
            ev.eval(&ConstExpr::Binary(BinaryOp::Shl, lhs.clone(), Box::new(int(-1)))),
            Some(1)
        );
        assert_eq!(
            ev.eval(&ConstExpr::Binary(BinaryOp::Shl, lhs, Box::new(int(100)))),
            Some(1i64.wrapping_shl(63))
        );
    }

    #[test]
    fn unary_not_and_bitnot() {
        let ev = ConstEvaluator::new(8);
        assert_eq!(ev.eval(&ConstExpr::Unary(UnaryOp::LogNot, Box::new(int(0)))), Some(1));
        assert_eq!(ev.eval(&ConstExpr::Unary(UnaryOp::BitNot, Box::new(int(0)))), Some(-1));
    }

    #[test]
    fn enum_constant_and_char_literal_are_plain_values() {
        let ev = ConstEvaluator::new(8);
        assert_eq!(ev.eval(&ConstExpr::EnumConstant(42)), Some(42));
        assert_eq!(ev.eval(&ConstExpr::CharLiteral(b'A' as i64)), Some(65));
    }
}
