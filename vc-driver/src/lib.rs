//! Pipeline orchestration (spec §1 component 15, §4.12): preprocess →
//! parse/semantic (external) → IR → optimize → allocate → emit → assemble
//! → link.
//!
//! Grounded on the shape of the teacher's top-level `wasmtime-cli-flags`/
//! compile-session crates: a plain configuration struct threaded through a
//! sequence of library calls, with argv parsing and process-exit handling
//! left to the binary crate. This crate never touches `std::env::args`.

mod depfile;
mod frontend;
mod options;
mod pipeline;
mod toolchain;

pub use depfile::format_dep_file;
pub use frontend::{Frontend, MinimalFrontend};
pub use options::{DepMode, Options, StopAfter};
pub use pipeline::{compile_translation_unit, CompiledUnit};
pub use toolchain::{assemble, link};

pub use vc_codegen::Syntax;
