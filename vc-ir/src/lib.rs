//! Typed linear intermediate representation (spec §1 component 2, §3, §4.7
//! through §4.9): instruction list, per-function builder, alias sets, and
//! the constant evaluator used by array-bound checking and initializers.
//!
//! Generalizes the teacher's `cranelift-codegen::ir` module (entity-keyed
//! values and instructions, one arena per function) down to a single flat
//! opcode set with no basic-block graph: control flow here is just labels
//! and branches in one linear list, matching this system's simpler target.

mod ast;
mod builder;
mod consteval;
mod inst;
mod opcode;
mod types;

pub use ast::{BinaryOp, ConstExpr, SizeOfOperand, UnaryOp};
pub use builder::{AliasTable, IrBuilder};
pub use consteval::ConstEvaluator;
pub use inst::{Inst, Instruction, Payload, Value};
pub use opcode::Opcode;
pub use types::Type;
