//! Call-site inlining (spec §4.9, disabled by `--no-inline`).
//!
//! For each call to a function flagged `inline` and below a size
//! threshold, splices the callee's instruction list into the caller with
//! fresh value ids and a parameter remap. `vc-ir::IrBuilder` does not track
//! a whole-program call graph, so the caller supplies callee bodies as
//! plain instruction slices gathered elsewhere in the driver.

use std::collections::HashMap;

use vc_ir::{Inst, Instruction, IrBuilder, Opcode, Type, Value};

/// A candidate inlining target: its body (already flattened to a plain
/// `Vec`, excluding the `IR_FUNC_BEGIN`/`IR_FUNC_END` bracket) and whether
/// it is eligible at all.
pub struct InlineCandidate {
    pub name: String,
    pub marked_inline: bool,
    pub body: Vec<Instruction>,
}

impl InlineCandidate {
    /// Below-threshold check from spec §4.9 ("small (below a size
    /// threshold)").
    pub fn is_small(&self, size_threshold: usize) -> bool {
        self.body.len() <= size_threshold
    }
}

/// Splices every eligible call in `builder` with the matching candidate in
/// `candidates`, keyed by callee name. Returns the number of call sites
/// inlined. Calls to names absent from `candidates`, or present but not
/// `marked_inline`/not small enough, are left untouched.
pub fn run(
    builder: &mut IrBuilder,
    candidates: &HashMap<String, InlineCandidate>,
    size_threshold: usize,
) -> usize {
    let mut inlined = 0usize;
    let call_sites: Vec<_> = builder
        .iter()
        .filter(|(_, inst)| inst.opcode == Opcode::Call)
        .map(|(id, inst)| (id, inst.name.clone(), inst.dest, inst.ty))
        .collect();

    for (call_id, name, dest, ty) in call_sites {
        let Some(name) = name else { continue };
        let Some(candidate) = candidates.get(&name) else {
            continue;
        };
        if !candidate.marked_inline || !candidate.is_small(size_threshold) {
            continue;
        }

        // Collect the IR_ARG instructions immediately preceding this call
        // (the driver emits them directly before IR_CALL, reverse-order
        // per spec §4.11). Once the call is gone these pushes would only
        // corrupt the emitter's running stack-byte total, so their ids
        // are removed along with the call itself.
        let arg_sites: Vec<Inst> = builder
            .iter()
            .take_while(|(id, _)| *id != call_id)
            .filter(|(_, inst)| inst.opcode == Opcode::Arg)
            .map(|(id, _)| id)
            .collect();
        let args: Vec<Value> = arg_sites
            .iter()
            .filter_map(|id| builder.inst(*id).src1)
            .collect();

        let mut remap: HashMap<Value, Value> = HashMap::new();
        let mut param_index = 0usize;
        let mut insertion_point = call_id;

        for inst in &candidate.body {
            // IR_LOAD_PARAM never gets spliced in: it becomes a direct
            // alias for the matching IR_ARG value at the call site.
            if inst.opcode == Opcode::LoadParam {
                if let Some(&actual) = args.get(param_index) {
                    remap.insert(
                        inst.dest.expect("IR_LOAD_PARAM always produces a value"),
                        actual,
                    );
                }
                param_index += 1;
                continue;
            }

            // IR_RETURN never gets spliced in either: emitting it would
            // exit the caller early. Its value just becomes the call
            // site's replacement value.
            if inst.opcode == Opcode::Return {
                if let Some(dest) = dest {
                    let ret_val = inst.src1.map(|v| *remap.get(&v).unwrap_or(&v));
                    if let Some(ret_val) = ret_val {
                        remap.insert(dest, ret_val);
                    }
                }
                continue;
            }

            let mut cloned = inst.clone();
            cloned.src1 = cloned.src1.map(|v| *remap.get(&v).unwrap_or(&v));
            cloned.src2 = cloned.src2.map(|v| *remap.get(&v).unwrap_or(&v));

            insertion_point = builder.insert_after(insertion_point);
            let fresh = cloned.dest.map(|_| builder.alloc_value());
            if let (Some(old), Some(new)) = (inst.dest, fresh) {
                remap.insert(old, new);
            }
            copy_fields(builder, insertion_point, &cloned, fresh);
        }

        if let Some(dest) = dest {
            if let Some(&replacement) = remap.get(&dest) {
                rewrite_uses(builder, dest, replacement);
            }
        }
        let _ = ty;
        builder.remove(call_id);
        for arg_id in arg_sites {
            builder.remove(arg_id);
        }
        inlined += 1;
    }

    inlined
}

/// Fills in the blank slot `insert_after` produced with `from`'s fields,
/// pointing its destination (if any) at the freshly allocated `dest`.
fn copy_fields(builder: &mut IrBuilder, at: Inst, from: &Instruction, dest: Option<Value>) {
    let slot = builder.inst_mut(at);
    slot.opcode = from.opcode;
    slot.dest = dest;
    slot.src1 = from.src1;
    slot.src2 = from.src2;
    slot.imm = from.imm;
    slot.payload = from.payload.clone();
    slot.name = from.name.clone();
    slot.ty = from.ty;
    slot.alias_set = from.alias_set;
}

fn rewrite_uses(builder: &mut IrBuilder, old: Value, new: Value) {
    let ids: Vec<_> = builder.iter().map(|(id, _)| id).collect();
    for id in ids {
        let inst = builder.inst_mut(id);
        if inst.src1 == Some(old) {
            inst.src1 = Some(new);
        }
        if inst.src2 == Some(old) {
            inst.src2 = Some(new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_inline_candidate_is_eligible() {
        let candidate = InlineCandidate {
            name: "add_one".into(),
            marked_inline: true,
            body: vec![],
        };
        assert!(candidate.is_small(4));
    }

    #[test]
    fn call_to_unknown_name_is_left_untouched() {
        let mut b = IrBuilder::new();
        let dest = b.call("mystery", Type::I32);
        b.ret(Some(dest));
        let candidates = HashMap::new();
        let n = run(&mut b, &candidates, 8);
        assert_eq!(n, 0);
        assert!(b.iter().any(|(_, i)| i.opcode == Opcode::Call));
    }

    #[test]
    fn inlines_a_small_marked_function() {
        let mut b = IrBuilder::new();
        let arg_val = b.const_int(Type::I32, 41);
        b.arg(arg_val, Type::I32);
        let dest = b.call("add_one", Type::I32);
        b.ret(Some(dest));

        let mut callee_builder = IrBuilder::new();
        let p0 = callee_builder.load_param(Type::I32, 0);
        let one = callee_builder.const_int(Type::I32, 1);
        let sum = callee_builder.add(Type::I32, p0, one);
        callee_builder.ret(Some(sum));
        let body: Vec<_> = callee_builder.iter().map(|(_, i)| i.clone()).collect();

        let mut candidates = HashMap::new();
        candidates.insert(
            "add_one".to_string(),
            InlineCandidate { name: "add_one".into(), marked_inline: true, body },
        );

        let n = run(&mut b, &candidates, 8);
        assert_eq!(n, 1);
        assert!(!b.iter().any(|(_, i)| i.opcode == Opcode::Call));
    }
}
