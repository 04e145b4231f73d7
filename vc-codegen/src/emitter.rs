//! Per-instruction x86 text emission (spec §4.11).
//!
//! One `Emitter` covers one function's already-allocated instruction list.
//! `vc-regalloc`'s slot assignment is reused for both the GP bank and the
//! XMM bank (picking a name table by the value's type at format time); long
//! doubles and complex values never go through either bank — the x87 stack
//! and componentwise SSE sequences spec §4.11 describes both need the
//! operand resident in memory, so those values get a dedicated backing
//! slot from a small pre-scan, appended past the allocator's own spill
//! area.

use std::collections::HashMap;

use cranelift_entity::EntityRef;
use vc_ir::{Instruction, IrBuilder, Opcode, Payload, Type, Value};
use vc_regalloc::{AllocationResult, Location};
use vc_support::LabelGenerator;

use crate::operand::{EmitOptions, RAX_SLOT, RCX_SLOT, RDX_SLOT, SCRATCH_SLOT};

/// Emits one function's assembly body. `name` is only used for the
/// generated rodata labels' prefix, keeping string literals from distinct
/// functions from colliding.
pub fn emit_function(
    builder: &IrBuilder,
    alloc: &AllocationResult,
    opts: EmitOptions,
) -> String {
    let mut emitter = Emitter::new(builder, alloc, opts);
    emitter.run();
    emitter.finish()
}

struct Emitter<'a> {
    builder: &'a IrBuilder,
    alloc: &'a AllocationResult,
    opts: EmitOptions,
    labels: LabelGenerator,
    buf: String,
    rodata: String,
    epilogue_label: String,
    pending_args: Vec<(String, u32)>,
    pushed_bytes: u32,
    value_types: HashMap<Value, Type>,
    /// Backing memory for long-double and complex values, keyed by value.
    extra_offsets: HashMap<Value, u32>,
    extra_used: u32,
    /// Backing memory for `IR_ALLOCA` targets, keyed by alias set so
    /// `IR_ADDR` (which only carries an alias set, not a value) can find
    /// the same slot.
    alias_offsets: HashMap<u32, u32>,
    /// One reserved doubleword used as complex-division's denominator and
    /// as a general register-to-memory spill for x87 operand loads.
    denom_offset: u32,
    scratch_mem_offset: u32,
    string_counter: u64,
}

impl<'a> Emitter<'a> {
    fn new(builder: &'a IrBuilder, alloc: &'a AllocationResult, opts: EmitOptions) -> Self {
        let value_types = prescan_types(builder);
        let scan = prescan_memory(builder, alloc, &opts);
        Emitter {
            builder,
            alloc,
            opts,
            labels: LabelGenerator::new(),
            buf: String::new(),
            rodata: String::new(),
            epilogue_label: String::new(),
            pending_args: Vec::new(),
            pushed_bytes: 0,
            value_types,
            extra_offsets: scan.extra_offsets,
            extra_used: scan.extra_used,
            alias_offsets: scan.alias_offsets,
            denom_offset: scan.denom_offset,
            scratch_mem_offset: scan.scratch_mem_offset,
            string_counter: 0,
        }
    }

    fn run(&mut self) {
        let insts: Vec<Instruction> = self.builder.iter().map(|(_, i)| i.clone()).collect();
        for inst in &insts {
            self.emit(inst);
        }
    }

    fn finish(self) -> String {
        let mut out = self.buf;
        if !self.rodata.is_empty() {
            out.push_str("    .section .rodata\n");
            out.push_str(&self.rodata);
        }
        out
    }

    fn push_line(&mut self, line: String) {
        self.buf.push_str(&line);
        self.buf.push('\n');
    }

    fn frame_size(&self) -> u32 {
        self.alloc.stack_slots * self.opts.stride() + self.extra_used
    }

    // -- operand helpers --------------------------------------------------

    fn ty_of(&self, value: Value) -> Type {
        self.value_types.get(&value).copied().unwrap_or(Type::I32)
    }

    fn is_memory_backed(&self, value: Value) -> bool {
        self.extra_offsets.contains_key(&value)
    }

    fn operand(&self, value: Value) -> String {
        if let Some(&off) = self.extra_offsets.get(&value) {
            return self.opts.stack_at(off);
        }
        let loc = self.alloc.location_of(value);
        if self.ty_of(value).is_float() {
            self.opts.xmm_location(loc)
        } else {
            self.opts.gp_location(loc)
        }
    }

    fn is_stack(&self, value: Value) -> bool {
        !self.is_memory_backed(value) && matches!(self.alloc.location_of(value), Location::Stack(_))
    }

    fn gp_scratch(&self) -> &'static str {
        self.opts.gp_name(SCRATCH_SLOT)
    }

    fn xmm_scratch(&self) -> String {
        self.opts.xmm_name(SCRATCH_SLOT)
    }

    fn incoming_param_operand(&self, index: i64) -> String {
        // Two slots (saved rbp + return address) sit between the frame
        // base and the first incoming parameter (spec §4.11's IR_ARG
        // convention pushes arguments in reverse order before `call`, so
        // the callee walks them back off in the mirror order).
        let offset = 2 * self.opts.stride() + (index as u32) * self.opts.stride();
        self.opts.stack_at_positive(offset)
    }

    // -- dispatch -----------------------------------------------------------

    fn emit(&mut self, inst: &Instruction) {
        use Opcode::*;
        match inst.opcode {
            Const => self.emit_const(inst),
            CplxConst => self.emit_cplx_const(inst),
            GlobString => self.emit_glob_string(inst, false),
            GlobWstring => self.emit_glob_string(inst, true),

            Add | Sub | And | Or | Xor | Mul => self.emit_binary(inst),
            Div => self.emit_divmod(inst, false),
            Mod => self.emit_divmod(inst, true),
            Shl => self.emit_shift(inst, "shl"),
            Shr => self.emit_shift(inst, "sar"),

            FAdd | FSub | FMul | FDiv => self.emit_float_binary(inst),
            LfAdd | LfSub | LfMul | LfDiv => self.emit_long_double_binary(inst),
            CplxAdd | CplxSub | CplxMul | CplxDiv => self.emit_complex_binary(inst),

            PtrAdd => self.emit_ptr_add(inst),
            PtrDiff => self.emit_ptr_diff(inst),

            Cast => self.emit_cast(inst),

            CmpEq | CmpNe | CmpLt | CmpGt | CmpLe | CmpGe => self.emit_compare(inst),

            LogAnd => self.emit_logand(inst),
            LogOr => self.emit_logor(inst),

            Load | LoadVol | LoadPtr => self.emit_load(inst),
            LoadIdx | LoadIdxVol => self.emit_load_idx(inst),
            LoadParam => self.emit_load_param(inst),
            Store | StoreVol | StorePtr => self.emit_store(inst),
            StoreIdx | StoreIdxVol => self.emit_store_idx(inst),
            StoreParam => self.emit_store_param(inst),
            Addr => self.emit_addr(inst),
            Alloca => self.emit_alloca(inst),

            Label => self.push_line(format!("{}:", inst.name.as_deref().unwrap_or("L"))),
            Br => self.push_line(self.opts.line1("jmp", inst.name.as_deref().unwrap_or("?"))),
            Bcond => self.emit_bcond(inst),
            Return => self.emit_return(inst),
            ReturnAgg => self.emit_return_agg(inst),
            FuncBegin => self.emit_func_begin(inst),
            FuncEnd => self.emit_func_end(),

            Arg => self.emit_arg(inst),
            Call => self.emit_call(inst),
            CallPtr => self.emit_call_ptr(inst),
        }
    }

    // -- constants ----------------------------------------------------------

    fn emit_const(&mut self, inst: &Instruction) {
        let Some(dest) = inst.dest else { return };
        if inst.ty == Type::F80 {
            self.emit_f80_const(inst, dest);
            return;
        }
        if inst.ty.is_float() {
            // Bit-identical: the immediate already holds the IEEE bits.
            // `movd` always takes a 32-bit GP source even in x64 mode.
            let wide = inst.ty == Type::F64;
            let scratch = if wide {
                self.gp_scratch().to_string()
            } else {
                self.opts.gp_name32(SCRATCH_SLOT).to_string()
            };
            self.push_line(self.opts.line2("mov", &self.opts.immediate(inst.imm), &scratch));
            let dst = self.operand(dest);
            let mnemonic = if wide { "movq" } else { "movd" };
            self.push_line(self.opts.line2(mnemonic, &scratch, &dst));
            return;
        }
        let dst = self.operand(dest);
        self.push_line(self.opts.line2("mov", &self.opts.immediate(inst.imm), &dst));
    }

    fn emit_f80_const(&mut self, inst: &Instruction, dest: Value) {
        let off = *self.extra_offsets.get(&dest).unwrap_or(&0);
        if let Payload::Bytes(bytes) = &inst.payload {
            for (i, byte) in bytes.iter().enumerate().take(10) {
                let at = self.opts.stack_at(off + i as u32);
                self.push_line(self.opts.line2("movb", &self.opts.immediate(*byte as i64), &at));
            }
        } else {
            let scratch = self.gp_scratch().to_string();
            let at = self.opts.stack_at(off);
            self.push_line(self.opts.line2("mov", &self.opts.immediate(inst.imm), &scratch));
            self.push_line(self.opts.line2("movq", &scratch, &at));
        }
    }

    fn emit_cplx_const(&mut self, inst: &Instruction) {
        let Some(dest) = inst.dest else { return };
        let off = *self.extra_offsets.get(&dest).unwrap_or(&0);
        let component = if inst.ty == Type::CplxF64 { 8 } else { 4 };
        if let Payload::ComplexConst { re, im } = inst.payload {
            let (re_bits, im_bits, mnemonic) = if component == 8 {
                (re.to_bits() as i64, im.to_bits() as i64, "movq")
            } else {
                ((re as f32).to_bits() as i64, (im as f32).to_bits() as i64, "movl")
            };
            // `movl` into a 32-bit memory slot wants a 32-bit scratch name
            // even in x64 mode; `movq` wants the full-width one.
            let scratch = if component == 8 {
                self.gp_scratch().to_string()
            } else {
                self.opts.gp_name32(SCRATCH_SLOT).to_string()
            };
            let re_at = self.opts.stack_at(off);
            let im_at = self.opts.stack_at(off + component);
            self.push_line(self.opts.line2("mov", &self.opts.immediate(re_bits), &scratch));
            self.push_line(self.opts.line2(mnemonic, &scratch, &re_at));
            self.push_line(self.opts.line2("mov", &self.opts.immediate(im_bits), &scratch));
            self.push_line(self.opts.line2(mnemonic, &scratch, &im_at));
        }
    }

    fn emit_glob_string(&mut self, inst: &Instruction, wide: bool) {
        let Some(dest) = inst.dest else { return };
        let label = format!("LC{}", self.string_counter);
        self.string_counter += 1;
        self.rodata.push_str(&format!("{label}:\n"));
        match (&inst.payload, wide) {
            (Payload::Bytes(bytes), false) => {
                self.rodata.push_str("    .asciz \"");
                for &b in bytes {
                    self.rodata.push_str(&format!("\\x{b:02x}"));
                }
                self.rodata.push_str("\"\n");
            }
            (Payload::Wide(words), true) => {
                for &w in words {
                    self.rodata.push_str(&format!("    .long {w}\n"));
                }
                self.rodata.push_str("    .long 0\n");
            }
            _ => {}
        }
        let dst = self.operand(dest);
        match self.opts.syntax {
            crate::operand::Syntax::AttT => {
                self.push_line(format!("    lea {label}(%rip), {dst}"));
            }
            crate::operand::Syntax::Intel => {
                self.push_line(format!("    lea {dst}, [rip + {label}]"));
            }
        }
    }

    // -- integer binary ops ---------------------------------------------

    fn mnemonic_of(op: Opcode) -> &'static str {
        match op {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Mul => "imul",
            _ => unreachable!("not an integer binary opcode"),
        }
    }

    fn emit_binary(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let mnemonic = Self::mnemonic_of(inst.opcode);
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dest_spilled = self.is_stack(dest);
        let work = if dest_spilled { self.gp_scratch().to_string() } else { self.operand(dest) };
        self.push_line(self.opts.line2("mov", &src1_op, &work));
        self.push_line(self.opts.line2(mnemonic, &src2_op, &work));
        if dest_spilled {
            let dst = self.operand(dest);
            self.push_line(self.opts.line2("mov", &work, &dst));
        }
    }

    fn emit_divmod(&mut self, inst: &Instruction, want_mod: bool) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let rax = self.opts.gp_name(RAX_SLOT).to_string();
        let rdx = self.opts.gp_name(RDX_SLOT).to_string();
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        self.push_line(self.opts.line2("mov", &src1_op, &rax));
        self.push_line(self.opts.line0(if self.opts.x64 { "cqto" } else { "cltd" }));
        self.push_line(self.opts.line1("idiv", &src2_op));
        let result = if want_mod { &rdx } else { &rax };
        let dst = self.operand(dest);
        if dst != *result {
            self.push_line(self.opts.line2("mov", result, &dst));
        }
    }

    fn emit_shift(&mut self, inst: &Instruction, mnemonic: &str) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let rcx = self.opts.gp_name(RCX_SLOT).to_string();
        let src1_op = self.operand(src1);
        let count_op = self.operand(src2);
        let dest_spilled = self.is_stack(dest);
        let work = if dest_spilled { self.gp_scratch().to_string() } else { self.operand(dest) };
        self.push_line(self.opts.line2("mov", &src1_op, &work));
        self.push_line(self.opts.line2("mov", &count_op, &rcx));
        self.push_line(self.opts.line2(mnemonic, self.opts.cl(), &work));
        if dest_spilled {
            let dst = self.operand(dest);
            self.push_line(self.opts.line2("mov", &work, &dst));
        }
    }

    // -- float / long double / complex ------------------------------------

    fn float_mnemonic(op: Opcode, ty: Type) -> String {
        let base = match op {
            Opcode::FAdd => "add",
            Opcode::FSub => "sub",
            Opcode::FMul => "mul",
            Opcode::FDiv => "div",
            _ => unreachable!(),
        };
        let suffix = if ty == Type::F64 { "sd" } else { "ss" };
        format!("{base}{suffix}")
    }

    fn emit_float_binary(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let mnemonic = Self::float_mnemonic(inst.opcode, inst.ty);
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dest_spilled = self.is_stack(dest);
        let work = if dest_spilled { self.xmm_scratch() } else { self.operand(dest) };
        let move_mnemonic = if inst.ty == Type::F64 { "movsd" } else { "movss" };
        self.push_line(self.opts.line2(move_mnemonic, &src1_op, &work));
        self.push_line(self.opts.line2(&mnemonic, &src2_op, &work));
        if dest_spilled {
            let dst = self.operand(dest);
            self.push_line(self.opts.line2(move_mnemonic, &work, &dst));
        }
    }

    fn emit_long_double_binary(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let op = match inst.opcode {
            Opcode::LfAdd => "faddp",
            Opcode::LfSub => "fsubp",
            Opcode::LfMul => "fmulp",
            Opcode::LfDiv => "fdivp",
            _ => unreachable!(),
        };
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dst = self.operand(dest);
        self.push_line(self.opts.line1("fldt", &src1_op));
        self.push_line(self.opts.line1("fldt", &src2_op));
        self.push_line(self.opts.line0(op));
        self.push_line(self.opts.line1("fstpt", &dst));
    }

    fn complex_component_size(ty: Type) -> u32 {
        if ty == Type::CplxF64 {
            8
        } else {
            4
        }
    }

    fn emit_complex_binary(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let component = Self::complex_component_size(inst.ty);
        let move_mnemonic = if component == 8 { "movsd" } else { "movss" };
        let op_suffix = if component == 8 { "sd" } else { "ss" };
        let a_re = self.opts.stack_at(*self.extra_offsets.get(&src1).unwrap_or(&0));
        let a_im = self.opts.stack_at(*self.extra_offsets.get(&src1).unwrap_or(&0) + component);
        let b_re = self.opts.stack_at(*self.extra_offsets.get(&src2).unwrap_or(&0));
        let b_im = self.opts.stack_at(*self.extra_offsets.get(&src2).unwrap_or(&0) + component);
        let d_re = self.opts.stack_at(*self.extra_offsets.get(&dest).unwrap_or(&0));
        let d_im = self.opts.stack_at(*self.extra_offsets.get(&dest).unwrap_or(&0) + component);
        // Both temporaries below come straight out of the allocator's bank
        // rather than a separate complex-only pool; no other value may be
        // live in the top two slots across one of these sequences.
        let x0 = self.xmm_scratch();
        let x1 = self.opts.xmm_name(SCRATCH_SLOT.saturating_sub(1));

        match inst.opcode {
            Opcode::CplxAdd | Opcode::CplxSub => {
                let op = if inst.opcode == Opcode::CplxAdd { "add" } else { "sub" };
                self.push_line(self.opts.line2(move_mnemonic, &a_re, &x0));
                self.push_line(self.opts.line2(&format!("{op}{op_suffix}"), &b_re, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_re));
                self.push_line(self.opts.line2(move_mnemonic, &a_im, &x0));
                self.push_line(self.opts.line2(&format!("{op}{op_suffix}"), &b_im, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_im));
            }
            Opcode::CplxMul => {
                // (a_re*b_re - a_im*b_im) + (a_re*b_im + a_im*b_re)i
                self.push_line(self.opts.line2(move_mnemonic, &a_re, &x0));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_re, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &a_im, &x1));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_im, &x1));
                self.push_line(self.opts.line2(&format!("sub{op_suffix}"), &x1, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_re));

                self.push_line(self.opts.line2(move_mnemonic, &a_re, &x0));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_im, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &a_im, &x1));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_re, &x1));
                self.push_line(self.opts.line2(&format!("add{op_suffix}"), &x1, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_im));
            }
            Opcode::CplxDiv => {
                // denom = b_re^2 + b_im^2; re = (a_re*b_re + a_im*b_im)/denom
                // im = (a_im*b_re - a_re*b_im)/denom
                let denom = self.opts.stack_at(self.denom_offset);
                self.push_line(self.opts.line2(move_mnemonic, &b_re, &x0));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_re, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &b_im, &x1));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_im, &x1));
                self.push_line(self.opts.line2(&format!("add{op_suffix}"), &x1, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &denom));

                self.push_line(self.opts.line2(move_mnemonic, &a_re, &x0));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_re, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &a_im, &x1));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_im, &x1));
                self.push_line(self.opts.line2(&format!("add{op_suffix}"), &x1, &x0));
                self.push_line(self.opts.line2(&format!("div{op_suffix}"), &denom, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_re));

                self.push_line(self.opts.line2(move_mnemonic, &a_im, &x0));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_re, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &a_re, &x1));
                self.push_line(self.opts.line2(&format!("mul{op_suffix}"), &b_im, &x1));
                self.push_line(self.opts.line2(&format!("sub{op_suffix}"), &x1, &x0));
                self.push_line(self.opts.line2(&format!("div{op_suffix}"), &denom, &x0));
                self.push_line(self.opts.line2(move_mnemonic, &x0, &d_im));
            }
            _ => unreachable!(),
        }
    }

    // -- pointers / casts --------------------------------------------------

    fn emit_ptr_add(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dest_spilled = self.is_stack(dest);
        let work = if dest_spilled { self.gp_scratch().to_string() } else { self.operand(dest) };
        self.push_line(self.opts.line2("mov", &src2_op, &work));
        if inst.imm == 0 {
            self.push_line(self.opts.line2("xor", &work, &work));
        } else {
            self.push_line(self.opts.line2("imul", &self.opts.immediate(inst.imm), &work));
        }
        self.push_line(self.opts.line2("add", &src1_op, &work));
        if dest_spilled {
            let dst = self.operand(dest);
            self.push_line(self.opts.line2("mov", &work, &dst));
        }
    }

    fn emit_ptr_diff(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dest_spilled = self.is_stack(dest);
        let work = if dest_spilled { self.gp_scratch().to_string() } else { self.operand(dest) };
        self.push_line(self.opts.line2("mov", &src1_op, &work));
        self.push_line(self.opts.line2("sub", &src2_op, &work));
        let shift = (inst.imm.max(1) as u32).trailing_zeros();
        if shift > 0 {
            self.push_line(self.opts.line2("sar", &self.opts.immediate(shift as i64), &work));
        }
        if dest_spilled {
            let dst = self.operand(dest);
            self.push_line(self.opts.line2("mov", &work, &dst));
        }
    }

    fn emit_cast(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1)) = (inst.dest, inst.src1) else {
            return;
        };
        let (_, dst_tag) = Type::unpack_cast(inst.imm);
        let src_ty = self.ty_of(src1);
        let src_op = self.operand(src1);
        let dst = self.operand(dest);

        let f32_tag = Type::F32.tag();
        let f64_tag = Type::F64.tag();
        let f80_tag = Type::F80.tag();

        // Long double only exists in memory (x87 stack operands); both
        // directions spill the GP/XMM-resident operand to a scratch word
        // first since `fild`/`flds`/`fldl` never take a register operand.
        if dst_tag == f80_tag && src_ty != Type::F80 {
            let mem = self.ensure_memory(src1, src_ty, &src_op);
            let mnemonic = if src_ty.is_float() {
                if src_ty == Type::F64 {
                    "fldl"
                } else {
                    "flds"
                }
            } else {
                "fild"
            };
            self.push_line(self.opts.line1(mnemonic, &mem));
            self.push_line(self.opts.line1("fstpt", &dst));
            return;
        }
        if src_ty == Type::F80 && dst_tag != f80_tag {
            self.push_line(self.opts.line1("fldt", &src_op));
            let direct = self.is_stack(dest) || self.is_memory_backed(dest);
            let dest_mem = if direct { dst.clone() } else { self.opts.stack_at(self.scratch_mem_offset) };
            if dst_tag == f32_tag {
                self.push_line(self.opts.line1("fstps", &dest_mem));
            } else if dst_tag == f64_tag {
                self.push_line(self.opts.line1("fstpl", &dest_mem));
            } else {
                self.push_line(self.opts.line1("fistp", &dest_mem));
            }
            if !direct {
                let mnemonic = if dst_tag == f32_tag {
                    "movss"
                } else if dst_tag == f64_tag {
                    "movsd"
                } else {
                    "mov"
                };
                self.push_line(self.opts.line2(mnemonic, &dest_mem, &dst));
            }
            return;
        }

        let dst_is_float = dst_tag == f32_tag || dst_tag == f64_tag;
        let src_is_float = src_ty.is_float();

        if src_is_float && !dst_is_float {
            let mnemonic = if src_ty == Type::F64 { "cvttsd2si" } else { "cvttss2si" };
            self.push_line(self.opts.line2(mnemonic, &src_op, &dst));
        } else if !src_is_float && dst_is_float {
            let mnemonic = if dst_tag == f64_tag { "cvtsi2sd" } else { "cvtsi2ss" };
            self.push_line(self.opts.line2(mnemonic, &src_op, &dst));
        } else if src_is_float && dst_is_float {
            let mnemonic = if dst_tag == f64_tag { "cvtss2sd" } else { "cvtsd2ss" };
            self.push_line(self.opts.line2(mnemonic, &src_op, &dst));
        } else {
            self.push_line(self.opts.line2("mov", &src_op, &dst));
        }
    }

    /// Returns a memory operand for `value`: its own location if already
    /// memory-resident, otherwise a spill through the scratch word.
    fn ensure_memory(&mut self, value: Value, ty: Type, operand: &str) -> String {
        if self.is_stack(value) || self.is_memory_backed(value) {
            return operand.to_string();
        }
        let mem = self.opts.stack_at(self.scratch_mem_offset);
        if ty.is_float() {
            let mnemonic = if ty == Type::F64 { "movsd" } else { "movss" };
            self.push_line(self.opts.line2(mnemonic, operand, &mem));
        } else {
            self.push_line(self.opts.line2("mov", operand, &mem));
        }
        mem
    }

    // -- comparisons / logical ----------------------------------------------

    fn condition_code(op: Opcode, signed: bool) -> &'static str {
        match (op, signed) {
            (Opcode::CmpEq, _) => "e",
            (Opcode::CmpNe, _) => "ne",
            (Opcode::CmpLt, true) => "l",
            (Opcode::CmpLt, false) => "b",
            (Opcode::CmpGt, true) => "g",
            (Opcode::CmpGt, false) => "a",
            (Opcode::CmpLe, true) => "le",
            (Opcode::CmpLe, false) => "be",
            (Opcode::CmpGe, true) => "ge",
            (Opcode::CmpGe, false) => "ae",
            _ => unreachable!("not a comparison opcode"),
        }
    }

    fn emit_compare(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let signed = self.ty_of(src1).is_signed();
        let cc = Self::condition_code(inst.opcode, signed);
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dst = self.operand(dest);
        let al = self.opts.al().to_string();
        self.push_line(self.opts.line2("mov", &src1_op, &dst));
        self.push_line(self.opts.line2("cmp", &src2_op, &dst));
        self.push_line(self.opts.line1(&format!("set{cc}"), &al));
        self.push_line(self.opts.line2(self.opts.movzb(), &al, &dst));
    }

    fn emit_logand(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let (false_label, end_label) = self.labels.fresh_pair("false", "end");
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dst = self.operand(dest);
        self.push_line(self.opts.line2("cmp", &self.opts.immediate(0), &src1_op));
        self.push_line(self.opts.line1("je", &false_label));
        self.push_line(self.opts.line2("cmp", &self.opts.immediate(0), &src2_op));
        self.push_line(self.opts.line1("je", &false_label));
        self.push_line(self.opts.line2("mov", &self.opts.immediate(1), &dst));
        self.push_line(self.opts.line1("jmp", &end_label));
        self.push_line(format!("{false_label}:"));
        self.push_line(self.opts.line2("mov", &self.opts.immediate(0), &dst));
        self.push_line(format!("{end_label}:"));
    }

    fn emit_logor(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1), Some(src2)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let (true_label, end_label) = self.labels.fresh_pair("true", "end");
        let src1_op = self.operand(src1);
        let src2_op = self.operand(src2);
        let dst = self.operand(dest);
        self.push_line(self.opts.line2("cmp", &self.opts.immediate(0), &src1_op));
        self.push_line(self.opts.line1("jne", &true_label));
        self.push_line(self.opts.line2("cmp", &self.opts.immediate(0), &src2_op));
        self.push_line(self.opts.line1("jne", &true_label));
        self.push_line(self.opts.line2("mov", &self.opts.immediate(0), &dst));
        self.push_line(self.opts.line1("jmp", &end_label));
        self.push_line(format!("{true_label}:"));
        self.push_line(self.opts.line2("mov", &self.opts.immediate(1), &dst));
        self.push_line(format!("{end_label}:"));
    }

    // -- memory -------------------------------------------------------------

    fn emit_load(&mut self, inst: &Instruction) {
        let (Some(dest), Some(src1)) = (inst.dest, inst.src1) else {
            return;
        };
        let addr_reg = self.materialize_address(src1);
        let dst = self.operand(dest);
        self.push_line(self.opts.line2("mov", &self.opts.deref(&addr_reg), &dst));
    }

    fn emit_load_idx(&mut self, inst: &Instruction) {
        let (Some(dest), Some(base), Some(index)) = (inst.dest, inst.src1, inst.src2) else {
            return;
        };
        let addr_reg = self.effective_index_address(base, index, inst.ty);
        let dst = self.operand(dest);
        self.push_line(self.opts.line2("mov", &self.opts.deref(&addr_reg), &dst));
    }

    fn emit_load_param(&mut self, inst: &Instruction) {
        let Some(dest) = inst.dest else { return };
        let src = self.incoming_param_operand(inst.imm);
        let dst = self.operand(dest);
        if self.is_stack(dest) || self.is_memory_backed(dest) {
            let scratch = self.gp_scratch().to_string();
            self.push_line(self.opts.line2("mov", &src, &scratch));
            self.push_line(self.opts.line2("mov", &scratch, &dst));
        } else {
            self.push_line(self.opts.line2("mov", &src, &dst));
        }
    }

    fn emit_store(&mut self, inst: &Instruction) {
        let (Some(addr), Some(value)) = (inst.src1, inst.src2) else {
            return;
        };
        let addr_reg = self.materialize_address(addr);
        let value_op = self.operand(value);
        self.push_line(self.opts.line2("mov", &value_op, &self.opts.deref(&addr_reg)));
    }

    fn emit_store_idx(&mut self, inst: &Instruction) {
        let (Some(base), Some(index)) = (inst.src1, inst.src2) else {
            return;
        };
        let stored = Value::new(inst.imm as usize);
        // `IR_STORE_IDX` itself carries no element type (it produces no
        // value), so the stride comes from the stored value's own type.
        let elem_ty = self.ty_of(stored);
        let addr_reg = self.effective_index_address(base, index, elem_ty);
        let value_op = self.operand(stored);
        self.push_line(self.opts.line2("mov", &value_op, &self.opts.deref(&addr_reg)));
    }

    fn emit_store_param(&mut self, inst: &Instruction) {
        let Some(value) = inst.src1 else { return };
        let dst = self.incoming_param_operand(inst.imm);
        let value_op = self.operand(value);
        if self.is_stack(value) || self.is_memory_backed(value) {
            let scratch = self.gp_scratch().to_string();
            self.push_line(self.opts.line2("mov", &value_op, &scratch));
            self.push_line(self.opts.line2("mov", &scratch, &dst));
        } else {
            self.push_line(self.opts.line2("mov", &value_op, &dst));
        }
    }

    fn emit_addr(&mut self, inst: &Instruction) {
        let Some(dest) = inst.dest else { return };
        let off = *self.alias_offsets.get(&inst.alias_set).unwrap_or(&0);
        let src = self.opts.stack_at(off);
        let dst = self.operand(dest);
        match self.opts.syntax {
            crate::operand::Syntax::AttT => self.push_line(format!("    lea {src}, {dst}")),
            crate::operand::Syntax::Intel => self.push_line(format!("    lea {dst}, {src}")),
        }
    }

    fn emit_alloca(&mut self, inst: &Instruction) {
        let Some(dest) = inst.dest else { return };
        let off = *self.alias_offsets.get(&inst.alias_set).unwrap_or(&0);
        let src = self.opts.stack_at(off);
        let dst = self.operand(dest);
        match self.opts.syntax {
            crate::operand::Syntax::AttT => self.push_line(format!("    lea {src}, {dst}")),
            crate::operand::Syntax::Intel => self.push_line(format!("    lea {dst}, {src}")),
        }
    }

    fn materialize_address(&mut self, value: Value) -> String {
        if self.is_stack(value) || self.is_memory_backed(value) {
            let op = self.operand(value);
            let scratch = self.gp_scratch().to_string();
            self.push_line(self.opts.line2("mov", &op, &scratch));
            scratch
        } else {
            self.operand(value)
        }
    }

    fn effective_index_address(&mut self, base: Value, index: Value, elem_ty: Type) -> String {
        let base_op = self.operand(base);
        let index_op = self.operand(index);
        let scratch = self.gp_scratch().to_string();
        self.push_line(self.opts.line2("mov", &index_op, &scratch));
        let elem_size = elem_ty.size_of(self.opts.pointer_width());
        if elem_size > 1 {
            self.push_line(self.opts.line2("imul", &self.opts.immediate(elem_size as i64), &scratch));
        }
        self.push_line(self.opts.line2("add", &base_op, &scratch));
        scratch
    }

    // -- control flow --------------------------------------------------------

    fn emit_bcond(&mut self, inst: &Instruction) {
        let Some(src1) = inst.src1 else { return };
        let target = inst.name.as_deref().unwrap_or("?");
        let src1_op = self.operand(src1);
        self.push_line(self.opts.line2("cmp", &self.opts.immediate(0), &src1_op));
        self.push_line(self.opts.line1("je", target));
    }

    fn emit_return(&mut self, inst: &Instruction) {
        if let Some(value) = inst.src1 {
            let value_op = self.operand(value);
            if self.ty_of(value).is_float() && self.ty_of(value) != Type::F80 {
                let xmm0 = self.opts.xmm_name(0);
                if value_op != xmm0 {
                    let mnemonic = if self.ty_of(value) == Type::F64 { "movsd" } else { "movss" };
                    self.push_line(self.opts.line2(mnemonic, &value_op, &xmm0));
                }
            } else {
                let rax = self.opts.gp_name(RAX_SLOT).to_string();
                if value_op != rax {
                    self.push_line(self.opts.line2("mov", &value_op, &rax));
                }
            }
        }
        self.push_line(self.opts.line1("jmp", &self.epilogue_label.clone()));
    }

    fn emit_return_agg(&mut self, inst: &Instruction) {
        let Some(src1) = inst.src1 else { return };
        let src_reg = self.materialize_address(src1);
        let dest_reg = self.opts.gp_name(vc_regalloc::RETURN_REGISTER).to_string();
        let size = inst.imm.max(0) as u32;
        let width = self.opts.pointer_width();
        let scratch_slot = SCRATCH_SLOT.saturating_sub(1);
        let scratch2 = self.opts.gp_name(scratch_slot).to_string();
        let scratch2_byte = self.opts.gp_name8(scratch_slot).to_string();
        let mut copied = 0u32;
        while copied + width <= size {
            let src_at = self.opts.deref_offset(&src_reg, copied);
            let dst_at = self.opts.deref_offset(&dest_reg, copied);
            self.push_line(self.opts.line2("mov", &src_at, &scratch2));
            self.push_line(self.opts.line2("mov", &scratch2, &dst_at));
            copied += width;
        }
        while copied < size {
            let src_at = self.opts.deref_offset(&src_reg, copied);
            let dst_at = self.opts.deref_offset(&dest_reg, copied);
            self.push_line(self.opts.line2("movb", &src_at, &scratch2_byte));
            self.push_line(self.opts.line2("movb", &scratch2_byte, &dst_at));
            copied += 1;
        }
        self.push_line(self.opts.line1("jmp", &self.epilogue_label.clone()));
    }

    fn emit_func_begin(&mut self, inst: &Instruction) {
        let name = inst.name.clone().unwrap_or_default();
        self.labels = LabelGenerator::new();
        self.epilogue_label = format!("{name}_epilogue");
        self.push_line(format!("    .globl {name}"));
        self.push_line(format!("{name}:"));
        self.push_line(self.opts.line1("push", self.opts.base_pointer()));
        let (sp, bp) = (self.opts.stack_pointer().to_string(), self.opts.base_pointer().to_string());
        self.push_line(self.opts.line2("mov", &sp, &bp));
        let frame = self.frame_size();
        if frame > 0 {
            self.push_line(self.opts.line2("sub", &self.opts.immediate(frame as i64), &sp));
        }
    }

    fn emit_func_end(&mut self) {
        self.push_line(format!("{}:", self.epilogue_label.clone()));
        self.push_line(self.opts.line0("leave"));
        self.push_line(self.opts.line0("ret"));
    }

    // -- calls ----------------------------------------------------------------

    fn emit_arg(&mut self, inst: &Instruction) {
        let Some(value) = inst.src1 else { return };
        let op = self.operand(value);
        let size = self.ty_of(value).size_of(self.opts.pointer_width()).max(self.opts.stride());
        self.pending_args.push((op, size));
    }

    fn flush_args(&mut self) {
        for (op, size) in std::mem::take(&mut self.pending_args).into_iter().rev() {
            self.push_line(self.opts.line1("push", &op));
            self.pushed_bytes += size;
        }
    }

    fn rewind_args(&mut self) {
        if self.pushed_bytes > 0 {
            let sp = self.opts.stack_pointer().to_string();
            self.push_line(self.opts.line2("add", &self.opts.immediate(self.pushed_bytes as i64), &sp));
            self.pushed_bytes = 0;
        }
    }

    fn emit_call(&mut self, inst: &Instruction) {
        self.flush_args();
        let name = inst.name.as_deref().unwrap_or("?");
        self.push_line(self.opts.line1("call", name));
        self.rewind_args();
        if let Some(dest) = inst.dest {
            self.move_call_result(dest, inst.ty);
        }
    }

    fn emit_call_ptr(&mut self, inst: &Instruction) {
        self.flush_args();
        let Some(target) = inst.src1 else { return };
        let target_op = self.operand(target);
        let operand = match self.opts.syntax {
            crate::operand::Syntax::AttT => format!("*{target_op}"),
            crate::operand::Syntax::Intel => target_op,
        };
        self.push_line(self.opts.line1("call", &operand));
        self.rewind_args();
        if let Some(dest) = inst.dest {
            self.move_call_result(dest, inst.ty);
        }
    }

    fn move_call_result(&mut self, dest: Value, ty: Type) {
        let dst = self.operand(dest);
        if ty.is_float() && ty != Type::F80 {
            let xmm0 = self.opts.xmm_name(0);
            if dst != xmm0 {
                let mnemonic = if ty == Type::F64 { "movsd" } else { "movss" };
                self.push_line(self.opts.line2(mnemonic, &xmm0, &dst));
            }
        } else {
            let rax = self.opts.gp_name(RAX_SLOT).to_string();
            if dst != rax {
                self.push_line(self.opts.line2("mov", &rax, &dst));
            }
        }
    }
}

fn prescan_types(builder: &IrBuilder) -> HashMap<Value, Type> {
    let mut types = HashMap::new();
    for (_, inst) in builder.iter() {
        if let Some(dest) = inst.dest {
            types.insert(dest, inst.ty);
        }
    }
    types
}

struct MemoryScan {
    extra_offsets: HashMap<Value, u32>,
    extra_used: u32,
    alias_offsets: HashMap<u32, u32>,
    denom_offset: u32,
    scratch_mem_offset: u32,
}

/// Assigns backing memory for long-double/complex values (spec §4.11's x87
/// stack and componentwise SSE both need memory operands) and for
/// `IR_ALLOCA` targets, keyed by alias set so `IR_ADDR` can find the same
/// slot without holding the `Value` that produced it.
fn prescan_memory(builder: &IrBuilder, alloc: &AllocationResult, opts: &EmitOptions) -> MemoryScan {
    let mut extra_offsets = HashMap::new();
    let mut alias_offsets = HashMap::new();
    let mut used = 0u32;
    let base = alloc.stack_slots * opts.stride();

    for (_, inst) in builder.iter() {
        if inst.opcode == Opcode::Alloca {
            let size = inst.imm.max(0) as u32;
            let off = base + used;
            alias_offsets.entry(inst.alias_set).or_insert(off);
            used += size.max(opts.stride());
            continue;
        }
        if let Some(dest) = inst.dest {
            let memory_backed = inst.ty == Type::F80 || inst.ty.is_complex();
            if memory_backed && !extra_offsets.contains_key(&dest) {
                let size = inst.ty.size_of(opts.pointer_width()).max(16);
                extra_offsets.insert(dest, base + used);
                used += size;
            }
        }
    }
    let denom_offset = base + used;
    used += 8;
    let scratch_mem_offset = base + used;
    used += 8;
    MemoryScan {
        extra_offsets,
        extra_used: used,
        alias_offsets,
        denom_offset,
        scratch_mem_offset,
    }
}
