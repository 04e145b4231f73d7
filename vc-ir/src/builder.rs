//! IR builder: one per function (spec §3 "IR builder", §4.7).

use std::collections::HashMap;
use std::path::PathBuf;

use cranelift_entity::{EntityRef, PrimaryMap};

use crate::inst::{Inst, Instruction, Payload, Value};
use crate::opcode::Opcode;
use crate::types::Type;

/// `get_alias(name)` returns an integer id per distinct variable name,
/// creating a new id on first use (spec §4.7). Id 0 is never assigned, so
/// "no alias set" can be encoded as the default `0` on an `Instruction`.
#[derive(Debug, Default)]
pub struct AliasTable {
    by_name: HashMap<String, u32>,
    next: u32,
}

impl AliasTable {
    pub fn new() -> Self {
        Self { by_name: HashMap::new(), next: 1 }
    }

    pub fn get_alias(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Restrict-qualified pointers never share an alias set with anything
    /// else, including another restrict pointer of the same spelling
    /// (spec §4.7): each call mints a fresh id instead of consulting the
    /// name table.
    pub fn fresh_restrict_alias(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Owns one function's instruction list, value-id counter, and alias
/// table; also tracks the source location stamped onto newly appended
/// instructions (spec §3 "IR builder").
pub struct IrBuilder {
    insts: PrimaryMap<Inst, Instruction>,
    head: Option<Inst>,
    tail: Option<Inst>,
    next_value: u32,
    pub aliases: AliasTable,
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            insts: PrimaryMap::new(),
            head: None,
            tail: None,
            // Value id 0 means "no value" (spec §3), so the counter starts
            // at 1.
            next_value: 1,
            aliases: AliasTable::new(),
            file: None,
            line: 0,
            column: 0,
        }
    }

    pub fn set_location(&mut self, file: Option<PathBuf>, line: usize, column: usize) {
        self.file = file;
        self.line = line;
        self.column = column;
    }

    /// Allocates a fresh value id without appending any instruction. Used
    /// by callers (e.g. the inliner) that fill in an `insert_after` slot's
    /// destination themselves instead of going through a constructor.
    pub fn alloc_value(&mut self) -> Value {
        let id = self.next_value;
        self.next_value += 1;
        Value::new(id as usize)
    }

    /// Highest value id allocated so far, used to size the register
    /// allocator's `loc[]` array (spec §4.10).
    pub fn max_value(&self) -> u32 {
        self.next_value.saturating_sub(1)
    }

    fn append(&mut self, opcode: Opcode, ty: Type, produces_value: bool) -> (Inst, Option<Value>) {
        let dest = if produces_value { Some(self.alloc_value()) } else { None };
        let inst = Instruction {
            opcode,
            dest,
            src1: None,
            src2: None,
            imm: 0,
            payload: Payload::None,
            name: None,
            ty,
            alias_set: 0,
            line: self.line,
            column: self.column,
            file: self.file.clone(),
            next: None,
        };
        let id = self.insts.push(inst);
        match self.tail {
            Some(tail) => self.insts[tail].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        (id, dest)
    }

    pub fn inst(&self, id: Inst) -> &Instruction {
        &self.insts[id]
    }

    pub fn inst_mut(&mut self, id: Inst) -> &mut Instruction {
        &mut self.insts[id]
    }

    pub fn head(&self) -> Option<Inst> {
        self.head
    }

    /// Walk the list in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (Inst, &Instruction)> {
        IrIter { builder: self, cur: self.head }
    }

    /// Unlinks a previously appended instruction, used for rollback when a
    /// constructor's secondary allocation fails (spec §4.7). The slot in
    /// the entity map stays allocated (ids are never reused) but the
    /// instruction drops out of the linked traversal.
    pub fn remove(&mut self, id: Inst) {
        if self.head == Some(id) {
            self.head = self.insts[id].next;
        } else if let Some((_, prev)) = self.iter_with_prev().find(|(cur, _)| *cur == id) {
            if let Some(prev) = prev {
                let next = self.insts[id].next;
                self.insts[prev].next = next;
            }
        }
        if self.tail == Some(id) {
            self.tail = self.iter().map(|(i, _)| i).last();
        }
    }

    fn iter_with_prev(&self) -> impl Iterator<Item = (Inst, Option<Inst>)> + '_ {
        let mut prev = None;
        self.iter().map(move |(id, _)| {
            let out = (id, prev);
            prev = Some(id);
            out
        })
    }

    /// Insert a blank instruction right after `position`, returning it for
    /// the optimizer to fill (spec §4.7 "insert_after").
    pub fn insert_after(&mut self, position: Inst) -> Inst {
        let blank = Instruction::blank(self.line, self.column, self.file.clone());
        let id = self.insts.push(blank);
        let old_next = self.insts[position].next;
        self.insts[position].next = Some(id);
        self.insts[id].next = old_next;
        if self.tail == Some(position) {
            self.tail = Some(id);
        }
        id
    }

    // One constructor per opcode (spec §4.7). Each fills operand fields,
    // allocates a destination when the opcode produces one, and returns
    // the value id (or nothing for effect-only opcodes).

    pub fn const_int(&mut self, ty: Type, imm: i64) -> Value {
        let (id, dest) = self.append(Opcode::Const, ty, true);
        self.insts[id].imm = imm;
        dest.unwrap()
    }

    pub fn cplx_const(&mut self, ty: Type, re: f64, im: f64) -> Value {
        let (id, dest) = self.append(Opcode::CplxConst, ty, true);
        self.insts[id].payload = Payload::ComplexConst { re, im };
        dest.unwrap()
    }

    pub fn glob_string(&mut self, name: &str, bytes: Vec<u8>) -> Value {
        let (id, dest) = self.append(Opcode::GlobString, Type::Ptr, true);
        self.insts[id].name = Some(name.to_string());
        self.insts[id].payload = Payload::Bytes(bytes);
        dest.unwrap()
    }

    pub fn glob_wstring(&mut self, name: &str, chars: Vec<u32>) -> Value {
        let (id, dest) = self.append(Opcode::GlobWstring, Type::Ptr, true);
        self.insts[id].name = Some(name.to_string());
        self.insts[id].payload = Payload::Wide(chars);
        dest.unwrap()
    }

    fn binary(&mut self, opcode: Opcode, ty: Type, a: Value, b: Value) -> Value {
        let (id, dest) = self.append(opcode, ty, true);
        self.insts[id].src1 = Some(a);
        self.insts[id].src2 = Some(b);
        dest.unwrap()
    }

    pub fn add(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Add, ty, a, b)
    }
    pub fn sub(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Sub, ty, a, b)
    }
    pub fn mul(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Mul, ty, a, b)
    }
    pub fn div(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Div, ty, a, b)
    }
    pub fn modulo(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Mod, ty, a, b)
    }
    pub fn shl(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Shl, ty, a, b)
    }
    pub fn shr(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Shr, ty, a, b)
    }
    pub fn bit_and(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::And, ty, a, b)
    }
    pub fn bit_or(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Or, ty, a, b)
    }
    pub fn bit_xor(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::Xor, ty, a, b)
    }

    pub fn fadd(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::FAdd, Type::F32, a, b)
    }
    pub fn fsub(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::FSub, Type::F32, a, b)
    }
    pub fn fmul(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::FMul, Type::F32, a, b)
    }
    pub fn fdiv(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::FDiv, Type::F32, a, b)
    }

    pub fn lfadd(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LfAdd, Type::F80, a, b)
    }
    pub fn lfsub(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LfSub, Type::F80, a, b)
    }
    pub fn lfmul(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LfMul, Type::F80, a, b)
    }
    pub fn lfdiv(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LfDiv, Type::F80, a, b)
    }

    pub fn cplx_add(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::CplxAdd, ty, a, b)
    }
    pub fn cplx_sub(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::CplxSub, ty, a, b)
    }
    pub fn cplx_mul(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::CplxMul, ty, a, b)
    }
    pub fn cplx_div(&mut self, ty: Type, a: Value, b: Value) -> Value {
        self.binary(Opcode::CplxDiv, ty, a, b)
    }

    /// `elem_size` rides in `imm`; the emitter elides the multiply when it
    /// is 0 (spec §4.11).
    pub fn ptr_add(&mut self, ptr: Value, index: Value, elem_size: i64) -> Value {
        let (id, dest) = self.append(Opcode::PtrAdd, Type::Ptr, true);
        self.insts[id].src1 = Some(ptr);
        self.insts[id].src2 = Some(index);
        self.insts[id].imm = elem_size;
        dest.unwrap()
    }

    pub fn ptr_diff(&mut self, a: Value, b: Value, elem_size: i64) -> Value {
        let (id, dest) = self.append(Opcode::PtrDiff, Type::I64, true);
        self.insts[id].src1 = Some(a);
        self.insts[id].src2 = Some(b);
        self.insts[id].imm = elem_size;
        dest.unwrap()
    }

    pub fn cast(&mut self, src: Value, from: Type, to: Type) -> Value {
        let (id, dest) = self.append(Opcode::Cast, to, true);
        self.insts[id].src1 = Some(src);
        self.insts[id].imm = Type::pack_cast(from, to);
        dest.unwrap()
    }

    fn compare(&mut self, opcode: Opcode, a: Value, b: Value) -> Value {
        self.binary(opcode, Type::I32, a, b)
    }
    pub fn cmp_eq(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpEq, a, b)
    }
    pub fn cmp_ne(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpNe, a, b)
    }
    pub fn cmp_lt(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpLt, a, b)
    }
    pub fn cmp_gt(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpGt, a, b)
    }
    pub fn cmp_le(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpLe, a, b)
    }
    pub fn cmp_ge(&mut self, a: Value, b: Value) -> Value {
        self.compare(Opcode::CmpGe, a, b)
    }

    pub fn log_and(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LogAnd, Type::I32, a, b)
    }
    pub fn log_or(&mut self, a: Value, b: Value) -> Value {
        self.binary(Opcode::LogOr, Type::I32, a, b)
    }

    fn load(&mut self, opcode: Opcode, ty: Type, addr: Value, alias_set: u32) -> Value {
        let (id, dest) = self.append(opcode, ty, true);
        self.insts[id].src1 = Some(addr);
        self.insts[id].alias_set = alias_set;
        dest.unwrap()
    }

    pub fn load_var(&mut self, ty: Type, addr: Value, alias_set: u32) -> Value {
        self.load(Opcode::Load, ty, addr, alias_set)
    }
    pub fn load_vol(&mut self, ty: Type, addr: Value, alias_set: u32) -> Value {
        self.load(Opcode::LoadVol, ty, addr, alias_set)
    }
    pub fn load_ptr(&mut self, ty: Type, addr: Value) -> Value {
        self.load(Opcode::LoadPtr, ty, addr, 0)
    }
    pub fn load_idx(&mut self, ty: Type, base: Value, index: Value, alias_set: u32) -> Value {
        let (id, dest) = self.append(Opcode::LoadIdx, ty, true);
        self.insts[id].src1 = Some(base);
        self.insts[id].src2 = Some(index);
        self.insts[id].alias_set = alias_set;
        dest.unwrap()
    }
    pub fn load_idx_vol(&mut self, ty: Type, base: Value, index: Value, alias_set: u32) -> Value {
        let (id, dest) = self.append(Opcode::LoadIdxVol, ty, true);
        self.insts[id].src1 = Some(base);
        self.insts[id].src2 = Some(index);
        self.insts[id].alias_set = alias_set;
        dest.unwrap()
    }

    /// `imm` is the parameter index; the register allocator special-cases
    /// index 0 when a function returns an aggregate (spec §4.10 step 4).
    pub fn load_param(&mut self, ty: Type, index: i64) -> Value {
        let (id, dest) = self.append(Opcode::LoadParam, ty, true);
        self.insts[id].imm = index;
        dest.unwrap()
    }

    fn store(&mut self, opcode: Opcode, addr: Value, value: Value, alias_set: u32) {
        let (id, _) = self.append(opcode, Type::Void, false);
        self.insts[id].src1 = Some(addr);
        self.insts[id].src2 = Some(value);
        self.insts[id].alias_set = alias_set;
    }

    pub fn store_var(&mut self, addr: Value, value: Value, alias_set: u32) {
        self.store(Opcode::Store, addr, value, alias_set)
    }
    pub fn store_vol(&mut self, addr: Value, value: Value, alias_set: u32) {
        self.store(Opcode::StoreVol, addr, value, alias_set)
    }
    pub fn store_ptr(&mut self, addr: Value, value: Value) {
        self.store(Opcode::StorePtr, addr, value, 0)
    }
    pub fn store_idx(&mut self, base: Value, index: Value, value: Value, alias_set: u32) {
        let (id, _) = self.append(Opcode::StoreIdx, Type::Void, false);
        self.insts[id].src1 = Some(base);
        self.insts[id].src2 = Some(index);
        self.insts[id].imm = value.index() as i64;
        self.insts[id].alias_set = alias_set;
    }
    pub fn store_idx_vol(&mut self, base: Value, index: Value, value: Value, alias_set: u32) {
        let (id, _) = self.append(Opcode::StoreIdxVol, Type::Void, false);
        self.insts[id].src1 = Some(base);
        self.insts[id].src2 = Some(index);
        self.insts[id].imm = value.index() as i64;
        self.insts[id].alias_set = alias_set;
    }
    pub fn store_param(&mut self, index: i64, value: Value) {
        let (id, _) = self.append(Opcode::StoreParam, Type::Void, false);
        self.insts[id].src1 = Some(value);
        self.insts[id].imm = index;
    }

    pub fn addr(&mut self, alias_set: u32) -> Value {
        let (id, dest) = self.append(Opcode::Addr, Type::Ptr, true);
        self.insts[id].alias_set = alias_set;
        dest.unwrap()
    }

    pub fn alloca(&mut self, size: i64, alias_set: u32) -> Value {
        let (id, dest) = self.append(Opcode::Alloca, Type::Ptr, true);
        self.insts[id].imm = size;
        self.insts[id].alias_set = alias_set;
        dest.unwrap()
    }

    pub fn label(&mut self, name: &str) -> Inst {
        let (id, _) = self.append(Opcode::Label, Type::Void, false);
        self.insts[id].name = Some(name.to_string());
        id
    }

    pub fn br(&mut self, target: &str) -> Inst {
        let (id, _) = self.append(Opcode::Br, Type::Void, false);
        self.insts[id].name = Some(target.to_string());
        id
    }

    /// Branch if `cond` is false (spec §4.11 "compares src1 to 0 and
    /// emits `je name`").
    pub fn bcond(&mut self, cond: Value, target: &str) -> Inst {
        let (id, _) = self.append(Opcode::Bcond, Type::Void, false);
        self.insts[id].src1 = Some(cond);
        self.insts[id].name = Some(target.to_string());
        id
    }

    pub fn ret(&mut self, value: Option<Value>) -> Inst {
        let (id, _) = self.append(Opcode::Return, Type::Void, false);
        self.insts[id].src1 = value;
        id
    }

    pub fn ret_agg(&mut self, addr: Value, size: i64) -> Inst {
        let (id, _) = self.append(Opcode::ReturnAgg, Type::Void, false);
        self.insts[id].src1 = Some(addr);
        self.insts[id].imm = size;
        id
    }

    pub fn func_begin(&mut self, name: &str) -> Inst {
        let (id, _) = self.append(Opcode::FuncBegin, Type::Void, false);
        self.insts[id].name = Some(name.to_string());
        id
    }

    pub fn func_end(&mut self) -> Inst {
        let (id, _) = self.append(Opcode::FuncEnd, Type::Void, false);
        id
    }

    pub fn arg(&mut self, value: Value, ty: Type) -> Inst {
        let (id, _) = self.append(Opcode::Arg, ty, false);
        self.insts[id].src1 = Some(value);
        id
    }

    pub fn call(&mut self, name: &str, ty: Type) -> Value {
        let (id, dest) = self.append(Opcode::Call, ty, true);
        self.insts[id].name = Some(name.to_string());
        dest.unwrap()
    }

    pub fn call_ptr(&mut self, target: Value, ty: Type) -> Value {
        let (id, dest) = self.append(Opcode::CallPtr, ty, true);
        self.insts[id].src1 = Some(target);
        dest.unwrap()
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct IrIter<'a> {
    builder: &'a IrBuilder,
    cur: Option<Inst>,
}

impl<'a> Iterator for IrIter<'a> {
    type Item = (Inst, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        let inst = &self.builder.insts[id];
        self.cur = inst.next;
        Some((id, inst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ids_start_at_one_and_increment() {
        let mut b = IrBuilder::new();
        let v1 = b.const_int(Type::I32, 3);
        let v2 = b.const_int(Type::I32, 4);
        assert_eq!(v1.index(), 1);
        assert_eq!(v2.index(), 2);
    }

    #[test]
    fn add_records_both_sources() {
        let mut b = IrBuilder::new();
        let a = b.const_int(Type::I32, 3);
        let c = b.const_int(Type::I32, 4);
        let sum = b.add(Type::I32, a, c);
        let insts: Vec<_> = b.iter().collect();
        let add_inst = insts.iter().find(|(_, i)| i.opcode == Opcode::Add).unwrap().1;
        assert_eq!(add_inst.src1, Some(a));
        assert_eq!(add_inst.src2, Some(c));
        assert_eq!(add_inst.dest, Some(sum));
    }

    #[test]
    fn alias_table_is_stable_per_name_but_restrict_is_always_fresh() {
        let mut aliases = AliasTable::new();
        let a = aliases.get_alias("x");
        let b = aliases.get_alias("x");
        assert_eq!(a, b);
        let r1 = aliases.fresh_restrict_alias();
        let r2 = aliases.fresh_restrict_alias();
        assert_ne!(r1, r2);
    }

    #[test]
    fn remove_unlinks_from_traversal() {
        let mut b = IrBuilder::new();
        b.const_int(Type::I32, 1);
        b.const_int(Type::I32, 2);
        let mid = b.iter().nth(1).unwrap().0;
        b.const_int(Type::I32, 3);
        b.remove(mid);
        let remaining: Vec<_> = b.iter().map(|(_, i)| i.imm).collect();
        assert_eq!(remaining, vec![1, 3]);
    }

    #[test]
    fn insert_after_splices_blank_instruction() {
        let mut b = IrBuilder::new();
        b.const_int(Type::I32, 1);
        let first = b.iter().next().unwrap().0;
        let blank = b.insert_after(first);
        b.const_int(Type::I32, 2);
        let order: Vec<_> = b.iter().map(|(id, _)| id).collect();
        assert_eq!(order[1], blank);
    }

    #[test]
    fn func_begin_end_bracket_a_label() {
        let mut b = IrBuilder::new();
        b.func_begin("main");
        b.label("L0_entry");
        b.func_end();
        let ops: Vec<_> = b.iter().map(|(_, i)| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::FuncBegin, Opcode::Label, Opcode::FuncEnd]);
    }
}
