//! IR value and instruction entities (spec §3 "IR value", "IR instruction").

use std::path::PathBuf;

use cranelift_entity::entity_impl;

use crate::opcode::Opcode;
use crate::types::Type;

/// An opaque reference to a produced value. Value id 0 is reserved by the
/// builder to mean "no value" (spec §3); callers never see a `Value` for
/// that case, they see `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction's position in the builder's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// String/wide-string/complex-constant data too large to fit in the 64-bit
/// immediate, referenced by instructions that need it (spec §3 "a payload
/// pointer").
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Bytes(Vec<u8>),
    Wide(Vec<u32>),
    ComplexConst { re: f64, im: f64 },
}

impl Default for Payload {
    fn default() -> Self {
        Payload::None
    }
}

/// One IR instruction. Forms a singly linked list per builder via `next`;
/// `Inst` is the stable "append index" the spec refers to.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    /// `None` when the opcode produces no value (e.g. `IR_STORE`,
    /// `IR_LABEL`).
    pub dest: Option<Value>,
    pub src1: Option<Value>,
    pub src2: Option<Value>,
    pub imm: i64,
    pub payload: Payload,
    /// Labels, global/function names, and variable names for alias lookup.
    pub name: Option<String>,
    pub ty: Type,
    /// Id from [`crate::builder::AliasTable::get_alias`], 0 when the
    /// instruction has no associated variable (most arithmetic ops).
    pub alias_set: u32,
    pub line: usize,
    pub column: usize,
    pub file: Option<PathBuf>,
    pub next: Option<Inst>,
}

impl Instruction {
    /// A blank instruction at a given source location, used by
    /// `insert_after` (spec §4.7) for the optimizer to fill in place.
    pub fn blank(line: usize, column: usize, file: Option<PathBuf>) -> Self {
        Self {
            opcode: Opcode::Label,
            dest: None,
            src1: None,
            src2: None,
            imm: 0,
            payload: Payload::None,
            name: None,
            ty: Type::Void,
            alias_set: 0,
            line,
            column,
            file,
            next: None,
        }
    }

    /// Every source-value reference this instruction makes, for the
    /// register allocator's last-use pass (spec §4.10 step 1). Opcodes
    /// flagged [`Opcode::has_no_source_operands`] never contribute here
    /// even if `src1`/`src2` happen to be set (they are not, in practice).
    pub fn sources(&self) -> impl Iterator<Item = Value> {
        let (a, b) = if self.opcode.has_no_source_operands() {
            (None, None)
        } else {
            (self.src1, self.src2)
        };
        a.into_iter().chain(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn blank_instruction_has_no_value() {
        let inst = Instruction::blank(3, 1, None);
        assert!(inst.dest.is_none());
        assert_eq!(inst.opcode, Opcode::Label);
    }

    #[test]
    fn sources_skips_operand_free_opcodes() {
        let mut inst = Instruction::blank(1, 1, None);
        inst.opcode = Opcode::Const;
        inst.src1 = Some(Value::new(0));
        assert_eq!(inst.sources().count(), 0);

        inst.opcode = Opcode::Add;
        assert_eq!(inst.sources().count(), 1);
    }
}
