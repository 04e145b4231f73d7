//! Unreachable-code elimination (spec §4.9).
//!
//! Starting at `IR_FUNC_BEGIN`, a reachability flag goes false after an
//! unconditional `IR_BR`/`IR_RETURN`/`IR_RETURN_AGG` and true again at the
//! next `IR_LABEL`. Instructions encountered while unreachable are
//! dropped, except `IR_FUNC_END`, labels, and the leading `IR_FUNC_BEGIN`
//! itself (those always survive to keep the function well-formed).

use vc_diagnostics::{Diagnostic, ErrorKind, Location, WarningSink};
use vc_ir::{Inst, IrBuilder, Opcode};

/// Runs the pass over `builder` in place, pushing one warning into `sink`
/// for the first dropped source-originated statement in each unreachable
/// run (spec §4.9: "A warning is produced for the first dropped
/// source-originated statement").
pub fn run(builder: &mut IrBuilder, sink: &mut WarningSink) -> usize {
    let order: Vec<Inst> = builder.iter().map(|(id, _)| id).collect();
    let mut reachable = true;
    let mut warned_this_run = false;
    let mut dropped = Vec::new();

    for id in order {
        let opcode = builder.inst(id).opcode;

        if matches!(opcode, Opcode::Label) {
            reachable = true;
            warned_this_run = false;
        }

        let always_kept = matches!(opcode, Opcode::FuncEnd | Opcode::Label | Opcode::FuncBegin);

        if !reachable && !always_kept {
            if !warned_this_run {
                let inst = builder.inst(id);
                sink.push(Diagnostic::new(
                    Location::new(
                        inst.file.clone().unwrap_or_default(),
                        inst.line,
                    )
                    .with_column(inst.column),
                    ErrorKind::Other("unreachable code eliminated".to_string()),
                ));
                warned_this_run = true;
            }
            dropped.push(id);
        }

        if opcode.is_unconditional_exit() {
            reachable = false;
        }
    }

    for id in &dropped {
        builder.remove(*id);
    }
    dropped.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_ir::Type;

    #[test]
    fn drops_code_after_unconditional_return() {
        let mut b = IrBuilder::new();
        b.func_begin("f");
        let v = b.const_int(Type::I32, 1);
        b.ret(Some(v));
        b.const_int(Type::I32, 2); // unreachable
        b.func_end();

        let mut sink = WarningSink::new();
        let dropped = run(&mut b, &mut sink);
        assert_eq!(dropped, 1);
        assert_eq!(sink.len(), 1);
        let ops: Vec<_> = b.iter().map(|(_, i)| i.opcode).collect();
        assert_eq!(
            ops,
            vec![Opcode::FuncBegin, Opcode::Const, Opcode::Return, Opcode::FuncEnd]
        );
    }

    #[test]
    fn label_restores_reachability() {
        let mut b = IrBuilder::new();
        b.func_begin("f");
        b.br("L0_end");
        b.const_int(Type::I32, 9); // unreachable, dropped
        b.label("L0_end");
        b.const_int(Type::I32, 10); // reachable again, kept
        b.func_end();

        let mut sink = WarningSink::new();
        let dropped = run(&mut b, &mut sink);
        assert_eq!(dropped, 1);
        let ops: Vec<_> = b.iter().map(|(_, i)| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::FuncBegin,
                Opcode::Br,
                Opcode::Label,
                Opcode::Const,
                Opcode::FuncEnd,
            ]
        );
    }

    #[test]
    fn only_first_dropped_statement_in_a_run_warns() {
        let mut b = IrBuilder::new();
        b.func_begin("f");
        let v = b.const_int(Type::I32, 1);
        b.ret(Some(v));
        b.const_int(Type::I32, 2);
        b.const_int(Type::I32, 3);
        b.func_end();

        let mut sink = WarningSink::new();
        run(&mut b, &mut sink);
        assert_eq!(sink.len(), 1);
    }
}
