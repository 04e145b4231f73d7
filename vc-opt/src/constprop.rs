//! Constant propagation (spec §4.9, disabled by `--no-cprop`).
//!
//! Two folding rules, applied in one forward walk:
//!
//! - a binary op whose sources are both `IR_CONST` folds to a new
//!   `IR_CONST` carrying the computed value;
//! - a load whose backing variable (alias set) has exactly one prior
//!   store, and that store's value is `IR_CONST`, folds to that constant.

use std::collections::HashMap;

use vc_ir::{Inst, IrBuilder, Opcode, Type, Value};

/// One constant binding: either a fixed 64-bit value from a fold, or a
/// known-constant store to a variable's alias set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Known {
    ty: Type,
    imm: i64,
}

/// Runs constant propagation over `builder`'s instruction list in place.
/// Returns the number of instructions folded.
pub fn run(builder: &mut IrBuilder) -> usize {
    let mut const_values: HashMap<Value, Known> = HashMap::new();
    // alias_set -> (single known store value, ambiguous-if-more-than-one)
    let mut single_store: HashMap<u32, Option<Known>> = HashMap::new();
    let mut folded = 0usize;

    let order: Vec<Inst> = builder.iter().map(|(id, _)| id).collect();

    for id in order {
        let opcode = builder.inst(id).opcode;
        let dest = builder.inst(id).dest;

        if opcode == Opcode::Const {
            if let Some(dest) = dest {
                let inst = builder.inst(id);
                const_values.insert(dest, Known { ty: inst.ty, imm: inst.imm });
            }
            continue;
        }

        if matches!(opcode, Opcode::Store | Opcode::StoreVol) {
            let inst = builder.inst(id);
            let alias = inst.alias_set;
            let value = inst.src2;
            let known = value.and_then(|v| const_values.get(&v)).copied();
            single_store
                .entry(alias)
                .and_modify(|slot| *slot = None)
                .or_insert(known);
            continue;
        }

        if matches!(opcode, Opcode::Load | Opcode::LoadVol) {
            let inst = builder.inst(id);
            let alias = inst.alias_set;
            if let (Some(dest), Some(Some(known))) = (dest, single_store.get(&alias).copied()) {
                builder.inst_mut(id).opcode = Opcode::Const;
                builder.inst_mut(id).imm = known.imm;
                builder.inst_mut(id).ty = known.ty;
                builder.inst_mut(id).src1 = None;
                const_values.insert(dest, known);
                folded += 1;
            }
            continue;
        }

        if is_foldable_binary(opcode) {
            let inst = builder.inst(id);
            let (a, b) = (inst.src1, inst.src2);
            let ty = inst.ty;
            if let (Some(a), Some(b)) = (a, b) {
                if let (Some(ka), Some(kb)) = (const_values.get(&a), const_values.get(&b)) {
                    if let Some(folded_imm) = fold(opcode, ka.imm, kb.imm) {
                        builder.inst_mut(id).opcode = Opcode::Const;
                        builder.inst_mut(id).imm = folded_imm;
                        builder.inst_mut(id).src1 = None;
                        builder.inst_mut(id).src2 = None;
                        if let Some(dest) = dest {
                            const_values.insert(dest, Known { ty, imm: folded_imm });
                        }
                        folded += 1;
                    }
                }
            }
        }
    }

    folded
}

fn is_foldable_binary(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
    )
}

/// Folds integer-only binary ops. Matches the `#if` evaluator's arithmetic
/// rules: wraparound on overflow, division/modulus by zero yields 0, shift
/// counts clamp to 0..63.
fn fold(opcode: Opcode, a: i64, b: i64) -> Option<i64> {
    Some(match opcode {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                0
            } else {
                a.wrapping_div(b)
            }
        }
        Opcode::Mod => {
            if b == 0 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        Opcode::Shl => a.wrapping_shl(clamp_shift(b)),
        Opcode::Shr => a.wrapping_shr(clamp_shift(b)),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        _ => return None,
    })
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

    #[test]
    fn folds_add_of_two_consts() {
        let mut b = IrBuilder::new();
        let a = b.const_int(Type::I32, 3);
        let c = b.const_int(Type::I32, 4);
        let sum = b.add(Type::I32, a, c);
        b.ret(Some(sum));

        let folded = run(&mut b);
        assert_eq!(folded, 1);
        let sum_inst = b.inst(b.iter().nth(2).unwrap().0);
        assert_eq!(sum_inst.opcode, Opcode::Const);
        assert_eq!(sum_inst.imm, 7);
    }

    #[test]
    fn load_of_single_constant_store_folds() {
        let mut b = IrBuilder::new();
        let slot = b.alloca(4, 1);
        let c = b.const_int(Type::I32, 9);
        b.store_var(slot, c, 1);
        let loaded = b.load_var(Type::I32, slot, 1);
        b.ret(Some(loaded));

        let folded = run(&mut b);
        assert_eq!(folded, 1);
        let load_id = b.iter().nth(3).unwrap().0;
        assert_eq!(b.inst(load_id).opcode, Opcode::Const);
        assert_eq!(b.inst(load_id).imm, 9);
    }

    #[test]
    fn load_with_two_stores_is_left_alone() {
        let mut b = IrBuilder::new();
        let slot = b.alloca(4, 1);
        let c1 = b.const_int(Type::I32, 1);
        let c2 = b.const_int(Type::I32, 2);
        b.store_var(slot, c1, 1);
        b.store_var(slot, c2, 1);
        let loaded = b.load_var(Type::I32, slot, 1);
        b.ret(Some(loaded));

        let folded = run(&mut b);
        assert_eq!(folded, 0);
        let load_id = b.iter().nth(5).unwrap().0;
        assert_eq!(b.inst(load_id).opcode, Opcode::Load);
    }

    #[test]
    fn division_by_zero_folds_to_zero() {
        let mut b = IrBuilder::new();
        let a = b.const_int(Type::I32, 5);
        let z = b.const_int(Type::I32, 0);
        let q = b.div(Type::I32, a, z);
        b.ret(Some(q));

        run(&mut b);
        let q_id = b.iter().nth(2).unwrap().0;
        assert_eq!(b.inst(q_id).imm, 0);
    }
}
