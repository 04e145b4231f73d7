//! Per-translation-unit orchestration (spec §4.12): preprocess → frontend
//! → optimize → allocate → emit. Assembling and linking are the driver's
//! job too but operate over whole builds rather than one unit, so they
//! live in [`crate::toolchain`] and are invoked by the caller once every
//! unit has produced its assembly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vc_codegen::{emit_function, EmitOptions};
use vc_diagnostics::DiagResult;
use vc_opt::optimize;
use vc_pp::{preprocess, Macro, PreprocessorContext, Resolver};
use vc_regalloc::allocate;

use crate::frontend::Frontend;
use crate::options::{Options, StopAfter};

/// What one translation unit produced. Exactly one of `preprocessed` /
/// `assembly` is set, depending on `Options::stop_after`.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub preprocessed: Option<String>,
    pub assembly: Option<String>,
    pub dependencies: Vec<PathBuf>,
    pub warning_count: usize,
}

/// Runs one source file through the full pipeline up to `options.stop_after`.
pub fn compile_translation_unit(
    source: &Path,
    options: &Options,
    frontend: &dyn Frontend,
) -> DiagResult<CompiledUnit> {
    let resolver = Resolver::new(
        options.search_dirs.clone(),
        options.internal_libc,
        options.sysroot.clone(),
    );
    let mut ctx = PreprocessorContext::new(source.to_path_buf());
    ctx.max_include_depth = options.max_include_depth;
    apply_command_line_macros(&mut ctx, options);

    let preprocessed = preprocess(source, &resolver, &mut ctx)?;
    log::debug!(
        "preprocessed {} ({} dependencies)",
        source.display(),
        ctx.dependencies.len()
    );

    if options.stop_after == StopAfter::Preprocess {
        return Ok(CompiledUnit {
            preprocessed: Some(preprocessed),
            assembly: None,
            dependencies: ctx.dependencies,
            warning_count: ctx.warnings.len(),
        });
    }

    let source_name = source.display().to_string();
    let mut builders = frontend.compile(&preprocessed, &source_name)?;

    // A multi-function inliner would populate this from a prior pass over
    // every builder in the unit; this driver has nothing to offer it yet
    // (spec §4.9's inlining is specified per-call, not per-unit).
    let candidates = HashMap::new();

    let mut assembly = String::new();
    for builder in &mut builders {
        optimize(builder, &options.opt, &candidates, &mut ctx.warnings);
        if options.dump_ir {
            log::debug!("IR after optimization:\n{}", dump_ir(builder));
        }
        let alloc = allocate(builder);
        let emit_opts = EmitOptions::new(options.x64, options.syntax);
        let asm = emit_function(builder, &alloc, emit_opts);
        if options.dump_asm {
            log::debug!("assembly:\n{asm}");
        }
        assembly.push_str(&asm);
        assembly.push('\n');
    }

    Ok(CompiledUnit {
        preprocessed: None,
        assembly: Some(assembly),
        dependencies: ctx.dependencies,
        warning_count: ctx.warnings.len(),
    })
}

fn apply_command_line_macros(ctx: &mut PreprocessorContext, options: &Options) {
    for (name, value) in &options.defines {
        let body = value.clone().unwrap_or_else(|| "1".to_string());
        ctx.macros.define(Macro::object_like(name.clone(), body));
    }
    for name in &options.undefines {
        ctx.macros.undef(name);
    }
}

fn dump_ir(builder: &vc_ir::IrBuilder) -> String {
    let mut out = String::new();
    for (_, inst) in builder.iter() {
        out.push_str(&format!("{:?}\n", inst.opcode));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::MinimalFrontend;
    use std::io::Write;

    #[test]
    fn scenario_one_folds_and_emits_expected_fragment() {
        let dir = std::env::temp_dir().join(format!(
            "vc-driver-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let main_c = dir.join("main.c");
        let mut f = std::fs::File::create(&main_c).unwrap();
        writeln!(f, "int main(void){{return 3+4;}}").unwrap();

        let options = Options::default();
        let frontend = MinimalFrontend;
        let unit = compile_translation_unit(&main_c, &options, &frontend).unwrap();
        let asm = unit.assembly.expect("assembly stage requested");
        assert!(asm.contains(".globl main"));
        assert!(asm.contains("ret"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_after_preprocess_returns_text_only() {
        let dir = std::env::temp_dir().join(format!(
            "vc-driver-test-pp-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let main_c = dir.join("main.c");
        let mut f = std::fs::File::create(&main_c).unwrap();
        writeln!(f, "#define VAL 42\nint v = VAL;").unwrap();

        let mut options = Options::default();
        options.stop_after = StopAfter::Preprocess;
        let frontend = MinimalFrontend;
        let unit = compile_translation_unit(&main_c, &options, &frontend).unwrap();
        assert!(unit.preprocessed.unwrap().contains("int v = 42;"));
        assert!(unit.assembly.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
