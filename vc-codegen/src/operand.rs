//! Register-name tables and operand formatting for the two syntaxes the
//! emitter supports (spec §4.11: "AT&T or Intel").
//!
//! The allocatable bank is the same six slots `vc-regalloc` hands out;
//! which physical name a slot renders as depends only on the value's type
//! (spec §4.11 "a counted XMM pool mirrors the GP free-list" — here it
//! literally is the GP free-list, read back with float names).

use vc_regalloc::{Location, RETURN_REGISTER};

/// AT&T 64-bit GP register names, indexed by allocator slot.
pub const GP64_ATT: [&str; 6] = ["%rax", "%rbx", "%rcx", "%rdx", "%rsi", "%rdi"];
/// AT&T 32-bit GP register names, indexed by allocator slot.
pub const GP32_ATT: [&str; 6] = ["%eax", "%ebx", "%ecx", "%edx", "%esi", "%edi"];
/// Intel 64-bit GP register names, indexed by allocator slot.
pub const GP64_INTEL: [&str; 6] = ["rax", "rbx", "rcx", "rdx", "rsi", "rdi"];
/// Intel 32-bit GP register names, indexed by allocator slot.
pub const GP32_INTEL: [&str; 6] = ["eax", "ebx", "ecx", "edx", "esi", "edi"];
/// AT&T byte-width GP register names, indexed by allocator slot (requires
/// the x64 `sil`/`dil` forms; there is no legacy byte encoding for esi/edi).
pub const GP8_ATT: [&str; 6] = ["%al", "%bl", "%cl", "%dl", "%sil", "%dil"];
/// Intel byte-width GP register names, indexed by allocator slot.
pub const GP8_INTEL: [&str; 6] = ["al", "bl", "cl", "dl", "sil", "dil"];

/// Slot that doubles as RCX, the only register shifts may source their
/// count from (spec §4.11 "move the count into RCX/ECX").
pub const RCX_SLOT: u32 = 2;
/// Slot that doubles as RDX, the div/mod high half (spec §4.11).
pub const RDX_SLOT: u32 = 3;
/// Slot that doubles as RAX, the div/mod dividend and the return register
/// (`vc_regalloc::RETURN_REGISTER` already names this slot 0).
pub const RAX_SLOT: u32 = RETURN_REGISTER;
/// The highest-index slot the allocator never hands out (spec §4.10); the
/// emitter's scratch register for spilled destinations and spilled XMMs.
pub const SCRATCH_SLOT: u32 = vc_regalloc::NUM_REGISTERS - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    AttT,
    Intel,
}

/// Emitter configuration (spec §4.11: "parameterized by `x64` ... and
/// `syntax`").
#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    pub x64: bool,
    pub syntax: Syntax,
}

impl EmitOptions {
    pub fn new(x64: bool, syntax: Syntax) -> Self {
        Self { x64, syntax }
    }

    /// Stack-slot stride in bytes (spec §4.11 "stack offset stride 8/4").
    pub fn stride(&self) -> u32 {
        if self.x64 {
            8
        } else {
            4
        }
    }

    pub fn pointer_width(&self) -> u32 {
        self.stride()
    }

    pub fn gp_name(&self, slot: u32) -> &'static str {
        let i = slot as usize;
        match (self.x64, self.syntax) {
            (true, Syntax::AttT) => GP64_ATT[i],
            (false, Syntax::AttT) => GP32_ATT[i],
            (true, Syntax::Intel) => GP64_INTEL[i],
            (false, Syntax::Intel) => GP32_INTEL[i],
        }
    }

    /// Always the 32-bit name regardless of `x64`: `movd`/`movl` into an
    /// XMM register take a 32-bit GP source no matter the target width.
    pub fn gp_name32(&self, slot: u32) -> &'static str {
        let i = slot as usize;
        match self.syntax {
            Syntax::AttT => GP32_ATT[i],
            Syntax::Intel => GP32_INTEL[i],
        }
    }

    /// 32-bit suffix for `movzb`, picked by operand width rather than stack
    /// stride: the widened destination is always a GP value, never a float.
    pub fn movzb(&self) -> &'static str {
        if self.x64 {
            "movzbq"
        } else {
            "movzbl"
        }
    }

    /// Byte-width name for a `movb` operand (the aggregate-copy tail loop).
    pub fn gp_name8(&self, slot: u32) -> &'static str {
        let i = slot as usize;
        match self.syntax {
            Syntax::AttT => GP8_ATT[i],
            Syntax::Intel => GP8_INTEL[i],
        }
    }

    pub fn xmm_name(&self, slot: u32) -> String {
        match self.syntax {
            Syntax::AttT => format!("%xmm{slot}"),
            Syntax::Intel => format!("xmm{slot}"),
        }
    }

    pub fn cl(&self) -> &'static str {
        match self.syntax {
            Syntax::AttT => "%cl",
            Syntax::Intel => "cl",
        }
    }

    pub fn al(&self) -> &'static str {
        match self.syntax {
            Syntax::AttT => "%al",
            Syntax::Intel => "al",
        }
    }

    pub fn base_pointer(&self) -> &'static str {
        match (self.syntax, self.x64) {
            (Syntax::AttT, true) => "%rbp",
            (Syntax::AttT, false) => "%ebp",
            (Syntax::Intel, true) => "rbp",
            (Syntax::Intel, false) => "ebp",
        }
    }

    pub fn stack_pointer(&self) -> &'static str {
        match (self.syntax, self.x64) {
            (Syntax::AttT, true) => "%rsp",
            (Syntax::AttT, false) => "%esp",
            (Syntax::Intel, true) => "rsp",
            (Syntax::Intel, false) => "esp",
        }
    }

    /// Immediate prefix: `$` for AT&T, none for Intel (spec §4.11).
    pub fn immediate(&self, value: i64) -> String {
        match self.syntax {
            Syntax::AttT => format!("${value}"),
            Syntax::Intel => format!("{value}"),
        }
    }

    /// `-(slot*stride)(%rbp)` / `[rbp - slot*stride]` (spec §4.11).
    pub fn stack_at(&self, byte_offset: u32) -> String {
        match self.syntax {
            Syntax::AttT => format!("-{byte_offset}({})", self.base_pointer()),
            Syntax::Intel => format!("[{} - {byte_offset}]", self.base_pointer()),
        }
    }

    pub fn stack_slot(&self, slot: u32) -> String {
        self.stack_at(slot * self.stride())
    }

    /// Positive-offset frame operand, used for incoming parameters that
    /// live above the saved base pointer rather than in the local area.
    pub fn stack_at_positive(&self, byte_offset: u32) -> String {
        match self.syntax {
            Syntax::AttT => format!("{byte_offset}({})", self.base_pointer()),
            Syntax::Intel => format!("[{} + {byte_offset}]", self.base_pointer()),
        }
    }

    /// Dereferences a register holding an address: `(%reg)` / `[reg]`.
    pub fn deref(&self, reg: &str) -> String {
        match self.syntax {
            Syntax::AttT => format!("({reg})"),
            Syntax::Intel => format!("[{reg}]"),
        }
    }

    /// Dereferences a register holding an address plus a byte offset.
    pub fn deref_offset(&self, reg: &str, offset: u32) -> String {
        if offset == 0 {
            return self.deref(reg);
        }
        match self.syntax {
            Syntax::AttT => format!("{offset}({reg})"),
            Syntax::Intel => format!("[{reg} + {offset}]"),
        }
    }

    pub fn gp_location(&self, loc: Location) -> String {
        match loc {
            Location::Register(r) => self.gp_name(r).to_string(),
            Location::Stack(slot) => self.stack_slot(slot),
        }
    }

    /// Same allocator slot, read back as an XMM name when the value backing
    /// it is a float rather than an integer.
    pub fn xmm_location(&self, loc: Location) -> String {
        match loc {
            Location::Register(r) => self.xmm_name(r),
            Location::Stack(slot) => self.stack_slot(slot),
        }
    }

    /// Two-operand instruction line honoring each syntax's operand order
    /// (spec §4.11 "selects operand order").
    pub fn line2(&self, mnemonic: &str, src: &str, dst: &str) -> String {
        match self.syntax {
            Syntax::AttT => format!("    {mnemonic} {src}, {dst}"),
            Syntax::Intel => format!("    {mnemonic} {dst}, {src}"),
        }
    }

    pub fn line1(&self, mnemonic: &str, operand: &str) -> String {
        format!("    {mnemonic} {operand}")
    }

    pub fn line0(&self, mnemonic: &str) -> String {
        format!("    {mnemonic}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gp_names_pick_width_and_syntax() {
        let att64 = EmitOptions::new(true, Syntax::AttT);
        let intel32 = EmitOptions::new(false, Syntax::Intel);
        assert_eq!(att64.gp_name(0), "%rax");
        assert_eq!(intel32.gp_name(0), "eax");
    }

    #[test]
    fn stack_operand_matches_syntax() {
        let att = EmitOptions::new(true, Syntax::AttT);
        let intel = EmitOptions::new(true, Syntax::Intel);
        assert_eq!(att.stack_slot(2), "-16(%rbp)");
        assert_eq!(intel.stack_slot(2), "[rbp - 16]");
    }

    #[test]
    fn line2_flips_operand_order_for_intel() {
        let att = EmitOptions::new(true, Syntax::AttT);
        let intel = EmitOptions::new(true, Syntax::Intel);
        assert_eq!(att.line2("mov", "%rax", "%rbx"), "    mov %rax, %rbx");
        assert_eq!(intel.line2("mov", "rax", "rbx"), "    mov rbx, rax");
    }
}
