//! Driver-wide configuration (spec §4.12, §6 "CLI surface (informative)").
//!
//! This struct is the seam between the core and the out-of-scope option
//! parser: the `vc` binary's `clap::Parser` builds one of these and hands
//! it to [`crate::compile_translation_unit`]; nothing in this crate parses
//! argv itself.

use std::path::PathBuf;

use vc_codegen::Syntax;
use vc_opt::OptOptions;

/// What the driver stops at, mirroring `-E`/`-S`/`-c` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAfter {
    /// `-E`: emit preprocessed text only.
    Preprocess,
    /// `-S`: emit assembly text only.
    Assemble,
    /// `-c`: assemble to an object file, do not link.
    Object,
    /// Full pipeline: assemble and link an executable.
    Link,
}

/// Dependency-file emission mode (`-M` vs `-MD`, spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepMode {
    /// No dependency file.
    None,
    /// `-M`: print the dependency file instead of compiling.
    Only,
    /// `-MD`: compile normally and also write a dependency file.
    AlongsideCompile,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `-I`.
    pub search_dirs: Vec<PathBuf>,
    /// `-D NAME` / `-D NAME=VALUE`.
    pub defines: Vec<(String, Option<String>)>,
    /// `-U`.
    pub undefines: Vec<String>,

    /// `--x86-64` (default 64-bit; false selects 32-bit).
    pub x64: bool,
    /// `--intel-syntax` (default AT&T).
    pub syntax: Syntax,

    /// `--internal-libc`.
    pub internal_libc: bool,
    /// `--sysroot`.
    pub sysroot: Option<PathBuf>,
    /// `-l`.
    pub link_libs: Vec<String>,
    /// `-L`.
    pub link_dirs: Vec<PathBuf>,

    pub stop_after: StopAfter,
    pub output: Option<PathBuf>,

    pub dep_mode: DepMode,

    pub opt: OptOptions,

    /// `-fmax-include-depth=N`.
    pub max_include_depth: usize,

    pub debug: bool,
    pub emit_dwarf: bool,
    pub dump_ir: bool,
    pub dump_asm: bool,
    pub verbose_includes: bool,
    pub std: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            defines: Vec::new(),
            undefines: Vec::new(),
            x64: true,
            syntax: Syntax::AttT,
            internal_libc: false,
            sysroot: None,
            link_libs: Vec::new(),
            link_dirs: Vec::new(),
            stop_after: StopAfter::Link,
            output: None,
            dep_mode: DepMode::None,
            opt: OptOptions::default(),
            max_include_depth: vc_pp::DEFAULT_MAX_INCLUDE_DEPTH,
            debug: false,
            emit_dwarf: false,
            dump_ir: false,
            dump_asm: false,
            verbose_includes: false,
            std: None,
        }
    }
}

impl Options {
    /// `-O0` disables both optimizer passes; `-O1` and above enable both
    /// (spec §4.9 gives no finer granularity than the `--no-cprop`/
    /// `--no-inline` toggles this maps onto).
    pub fn set_opt_level(&mut self, level: u8) {
        self.opt.cprop = level > 0;
        self.opt.inline = level > 0;
    }
}
