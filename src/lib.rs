//! `vc`: a compiler for a subset of C, emitting x86 assembly (spec §1).
//!
//! This crate is a thin re-export over [`vc_driver`]; the actual
//! preprocessor, IR, optimizer, register allocator, and code emitter live
//! in their own workspace members so they can be exercised without the
//! CLI surface.

pub use vc_driver::*;
