//! IR-level optimizer (spec §4.9): three independent passes over one
//! function's instruction list, run in sequence by the driver between IR
//! construction and register allocation.

mod constprop;
mod inline;
mod unreachable;

pub use constprop::run as constant_propagation;
pub use inline::{run as inline_calls, InlineCandidate};
pub use unreachable::run as remove_unreachable;

use vc_diagnostics::WarningSink;
use vc_ir::IrBuilder;

/// CLI-style toggles mirroring `--no-cprop`/`--no-inline` (spec §4.9).
#[derive(Debug, Clone, Copy)]
pub struct OptOptions {
    pub cprop: bool,
    pub inline: bool,
    pub inline_size_threshold: usize,
}

impl Default for OptOptions {
    fn default() -> Self {
        Self { cprop: true, inline: true, inline_size_threshold: 16 }
    }
}

/// Runs the enabled passes over `builder`, in the fixed order constant
/// propagation, inlining, unreachable-code removal. Unreachable removal
/// always runs: nothing in spec §4.9 gates it behind a flag.
pub fn optimize(
    builder: &mut IrBuilder,
    options: &OptOptions,
    candidates: &std::collections::HashMap<String, InlineCandidate>,
    warnings: &mut WarningSink,
) {
    if options.cprop {
        let folded = constant_propagation(builder);
        log::debug!("constant propagation folded {folded} instructions");
    }
    if options.inline {
        let inlined = inline_calls(builder, candidates, options.inline_size_threshold);
        log::debug!("inlined {inlined} call sites");
    }
    let dropped = remove_unreachable(builder, warnings);
    log::debug!("removed {dropped} unreachable instructions");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_ir::Type;

    #[test]
    fn optimize_runs_all_enabled_passes_in_order() {
        let mut b = IrBuilder::new();
        let a = b.const_int(Type::I32, 3);
        let c = b.const_int(Type::I32, 4);
        let sum = b.add(Type::I32, a, c);
        b.ret(Some(sum));
        b.const_int(Type::I32, 99); // unreachable after the return

        let mut warnings = WarningSink::new();
        let candidates = std::collections::HashMap::new();
        optimize(&mut b, &OptOptions::default(), &candidates, &mut warnings);

        assert_eq!(warnings.len(), 1);
        let sum_inst = b.iter().nth(2).unwrap().1;
        assert_eq!(sum_inst.imm, 7);
    }
}
