//! Opcode set (spec §6).

use std::fmt;

/// One IR instruction kind. Names track the `IR_*` vocabulary the rest of
/// the pipeline (optimizer, register allocator, emitter) matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Const,
    CplxConst,
    GlobString,
    GlobWstring,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,

    FAdd,
    FSub,
    FMul,
    FDiv,

    LfAdd,
    LfSub,
    LfMul,
    LfDiv,

    CplxAdd,
    CplxSub,
    CplxMul,
    CplxDiv,

    PtrAdd,
    PtrDiff,

    Cast,

    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLe,
    CmpGe,

    LogAnd,
    LogOr,

    Load,
    LoadVol,
    LoadPtr,
    LoadIdx,
    LoadIdxVol,
    LoadParam,
    Store,
    StoreVol,
    StorePtr,
    StoreIdx,
    StoreIdxVol,
    StoreParam,
    Addr,
    Alloca,

    Label,
    Br,
    Bcond,
    Return,
    ReturnAgg,
    FuncBegin,
    FuncEnd,

    Arg,
    Call,
    CallPtr,
}

impl Opcode {
    /// True for the three opcodes the register allocator's last-use pass
    /// and the emitter both special-case as "no source operands, never
    /// updates `last[]`" (spec §4.10 step 1).
    pub fn has_no_source_operands(self) -> bool {
        matches!(
            self,
            Opcode::Const
                | Opcode::CplxConst
                | Opcode::GlobString
                | Opcode::GlobWstring
                | Opcode::Label
                | Opcode::FuncBegin
                | Opcode::FuncEnd
                | Opcode::LoadParam
        )
    }

    /// Opcodes that end a basic block for the purposes of the unreachable
    /// pass (spec §4.9): after one of these, code is unreachable until the
    /// next `IR_LABEL`. `Bcond` does not count: control can fall through.
    pub fn is_unconditional_exit(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Return | Opcode::ReturnAgg)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Const => "IR_CONST",
            Opcode::CplxConst => "IR_CPLX_CONST",
            Opcode::GlobString => "IR_GLOB_STRING",
            Opcode::GlobWstring => "IR_GLOB_WSTRING",
            Opcode::Add => "IR_ADD",
            Opcode::Sub => "IR_SUB",
            Opcode::Mul => "IR_MUL",
            Opcode::Div => "IR_DIV",
            Opcode::Mod => "IR_MOD",
            Opcode::Shl => "IR_SHL",
            Opcode::Shr => "IR_SHR",
            Opcode::And => "IR_AND",
            Opcode::Or => "IR_OR",
            Opcode::Xor => "IR_XOR",
            Opcode::FAdd => "IR_FADD",
            Opcode::FSub => "IR_FSUB",
            Opcode::FMul => "IR_FMUL",
            Opcode::FDiv => "IR_FDIV",
            Opcode::LfAdd => "IR_LFADD",
            Opcode::LfSub => "IR_LFSUB",
            Opcode::LfMul => "IR_LFMUL",
            Opcode::LfDiv => "IR_LFDIV",
            Opcode::CplxAdd => "IR_CPLX_ADD",
            Opcode::CplxSub => "IR_CPLX_SUB",
            Opcode::CplxMul => "IR_CPLX_MUL",
            Opcode::CplxDiv => "IR_CPLX_DIV",
            Opcode::PtrAdd => "IR_PTR_ADD",
            Opcode::PtrDiff => "IR_PTR_DIFF",
            Opcode::Cast => "IR_CAST",
            Opcode::CmpEq => "IR_CMPEQ",
            Opcode::CmpNe => "IR_CMPNE",
            Opcode::CmpLt => "IR_CMPLT",
            Opcode::CmpGt => "IR_CMPGT",
            Opcode::CmpLe => "IR_CMPLE",
            Opcode::CmpGe => "IR_CMPGE",
            Opcode::LogAnd => "IR_LOGAND",
            Opcode::LogOr => "IR_LOGOR",
            Opcode::Load => "IR_LOAD",
            Opcode::LoadVol => "IR_LOAD_VOL",
            Opcode::LoadPtr => "IR_LOAD_PTR",
            Opcode::LoadIdx => "IR_LOAD_IDX",
            Opcode::LoadIdxVol => "IR_LOAD_IDX_VOL",
            Opcode::LoadParam => "IR_LOAD_PARAM",
            Opcode::Store => "IR_STORE",
            Opcode::StoreVol => "IR_STORE_VOL",
            Opcode::StorePtr => "IR_STORE_PTR",
            Opcode::StoreIdx => "IR_STORE_IDX",
            Opcode::StoreIdxVol => "IR_STORE_IDX_VOL",
            Opcode::StoreParam => "IR_STORE_PARAM",
            Opcode::Addr => "IR_ADDR",
            Opcode::Alloca => "IR_ALLOCA",
            Opcode::Label => "IR_LABEL",
            Opcode::Br => "IR_BR",
            Opcode::Bcond => "IR_BCOND",
            Opcode::Return => "IR_RETURN",
            Opcode::ReturnAgg => "IR_RETURN_AGG",
            Opcode::FuncBegin => "IR_FUNC_BEGIN",
            Opcode::FuncEnd => "IR_FUNC_END",
            Opcode::Arg => "IR_ARG",
            Opcode::Call => "IR_CALL",
            Opcode::CallPtr => "IR_CALL_PTR",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_ir_vocabulary() {
        assert_eq!(Opcode::PtrAdd.to_string(), "IR_PTR_ADD");
        assert_eq!(Opcode::CmpGe.to_string(), "IR_CMPGE");
    }

    #[test]
    fn const_has_no_source_operands() {
        assert!(Opcode::Const.has_no_source_operands());
        assert!(!Opcode::Add.has_no_source_operands());
    }

    #[test]
    fn branch_and_return_are_unconditional_exits() {
        assert!(Opcode::Br.is_unconditional_exit());
        assert!(Opcode::Return.is_unconditional_exit());
        assert!(!Opcode::Bcond.is_unconditional_exit());
    }
}
