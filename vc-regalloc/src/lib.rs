//! Single-pass linear-scan register allocator (spec §1 component 3, §3
//! "Register-allocation result", §4.10).
//!
//! Grounded on the shape of the teacher's `cranelift-codegen::regalloc`
//! module (a persistent `Context` reused across functions, a `RegisterSet`
//! bit-vector of availability) but collapsed to the much simpler algorithm
//! this system specifies: one forward last-use pass, one forward
//! assignment pass, no SSA coloring or live-range splitting.

use cranelift_entity::EntityRef;
use vc_ir::{IrBuilder, Opcode, Value};

/// Number of general-purpose registers in the allocatable bank (spec §3:
/// "N = 6"). The highest index is reserved as the emitter's scratch
/// register and is never handed out by the allocator (spec §4.10
/// guarantees).
pub const NUM_REGISTERS: u32 = 6;

/// Index of the configured return register (spec §4.10 step 2).
pub const RETURN_REGISTER: u32 = 0;

/// A value's assigned location: a physical register index, or a stack
/// slot (1-based, spec §3 "negative entries encode a stack slot as
/// `-(slot_number)`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(u32),
    Stack(u32),
}

impl Location {
    /// The signed encoding spec §3 describes: non-negative register
    /// index, or `-(slot_number)` for a spill.
    pub fn encode(self) -> i32 {
        match self {
            Location::Register(r) => r as i32,
            Location::Stack(slot) => -(slot as i32),
        }
    }
}

/// Output of one allocation run: a dense array indexed by value id, plus
/// the total stack-slot count (spec §3 "Register-allocation result").
#[derive(Debug, Clone)]
pub struct AllocationResult {
    loc: Vec<Option<Location>>,
    pub stack_slots: u32,
}

impl AllocationResult {
    pub fn location_of(&self, value: Value) -> Location {
        self.loc[value_index(value)].expect("every value receives a location")
    }
}

/// Value ids start at 1 (0 means "no value", spec §3); index 0 of the
/// dense array backs value id 1.
fn value_index(value: Value) -> usize {
    value.index() - 1
}

/// Allocates registers for one function's IR list (spec §4.10).
pub fn allocate(builder: &IrBuilder) -> AllocationResult {
    let max_value = builder.max_value() as usize;
    let mut last = vec![-1i64; max_value + 1];
    let insts: Vec<_> = builder.iter().collect();

    // 1. Last-use pass.
    for (idx, (_, inst)) in insts.iter().enumerate() {
        for src in inst.sources() {
            last[value_index(src)] = idx as i64;
        }
    }

    // 2. Pre-scan for IR_RETURN_AGG.
    let reserve_return_register = insts.iter().any(|(_, inst)| inst.opcode == Opcode::ReturnAgg);

    // 3. Free stack, descending index so low-index registers are
    // preferred (spec §4.10 step 3). The scratch register (highest index)
    // is never placed in the pool.
    let pool_top = NUM_REGISTERS - 1; // exclusive of the scratch register
    let mut free_stack: Vec<u32> = if reserve_return_register {
        (RETURN_REGISTER + 1..pool_top).rev().collect()
    } else {
        (0..pool_top).rev().collect()
    };

    let mut loc: Vec<Option<Location>> = vec![None; max_value + 1];
    let mut stack_slots = 0u32;

    // 4. Assignment pass.
    for (idx, (_, inst)) in insts.iter().enumerate() {
        if let Some(dest) = inst.dest {
            let slot = value_index(dest);
            if loc[slot].is_none() {
                let assigned = if reserve_return_register
                    && inst.opcode == Opcode::LoadParam
                    && inst.imm == 0
                {
                    Location::Register(RETURN_REGISTER)
                } else if let Some(reg) = free_stack.pop() {
                    Location::Register(reg)
                } else {
                    stack_slots += 1;
                    Location::Stack(stack_slots)
                };
                loc[slot] = Some(assigned);
            }
        }

        for value in [inst.dest, inst.src1, inst.src2].into_iter().flatten() {
            let slot = value_index(value);
            if last[slot] == idx as i64 {
                if let Some(Location::Register(reg)) = loc[slot] {
                    // The reserved return register never re-enters the
                    // pool: it stays pinned for the whole function once
                    // an IR_RETURN_AGG is present (spec §4.10 step 2).
                    let pinned = reserve_return_register && reg == RETURN_REGISTER;
                    if !pinned {
                        free_stack.push(reg);
                    }
                }
            }
        }
    }

    AllocationResult { loc, stack_slots }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_ir::Type;

    #[test]
    fn simple_add_assigns_low_registers() {
        let mut b = IrBuilder::new();
        let a = b.const_int(Type::I32, 1);
        let c = b.const_int(Type::I32, 2);
        let sum = b.add(Type::I32, a, c);
        b.ret(Some(sum));

        let result = allocate(&b);
        assert!(matches!(result.location_of(a), Location::Register(_)));
        assert!(matches!(result.location_of(sum), Location::Register(_)));
        assert_eq!(result.stack_slots, 0);
    }

    #[test]
    fn exhausting_registers_spills_to_stack() {
        let mut b = IrBuilder::new();
        // One more live-simultaneously value than the allocatable bank
        // (5 usable slots once the scratch register is excluded) forces a
        // spill.
        let mut values = Vec::new();
        for i in 0..6 {
            values.push(b.const_int(Type::I32, i));
        }
        let mut acc = values[0];
        for &v in &values[1..] {
            acc = b.add(Type::I32, acc, v);
        }
        b.ret(Some(acc));

        let result = allocate(&b);
        assert!(result.stack_slots >= 1, "expected at least one spill");
    }

    #[test]
    fn return_agg_reserves_register_zero_for_load_param() {
        let mut b = IrBuilder::new();
        let p0 = b.load_param(Type::Ptr, 0);
        let size = b.const_int(Type::I64, 16);
        b.ret_agg(p0, 16);
        let _ = size;

        let result = allocate(&b);
        assert_eq!(result.location_of(p0), Location::Register(RETURN_REGISTER));
    }

    #[test]
    fn encode_matches_spec_sign_convention() {
        assert_eq!(Location::Register(2).encode(), 2);
        assert_eq!(Location::Stack(1).encode(), -1);
    }
}
