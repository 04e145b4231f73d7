//! Spawns the external assembler and linker (spec §4.12's last two steps).
//! Their internal behavior is explicitly out of scope (spec §1); this
//! module's only job is building the right argv and checking exit status.

use std::path::{Path, PathBuf};
use std::process::Command;

use vc_diagnostics::{Diagnostic, DiagResult, ErrorKind, Location};

fn run(mut cmd: Command, what: &'static str) -> DiagResult<()> {
    let status = cmd.status().map_err(|e| {
        Diagnostic::new(
            Location::command_line(),
            ErrorKind::Other(format!("failed to spawn {what}: {e}")),
        )
    })?;
    if !status.success() {
        return Err(Diagnostic::new(
            Location::command_line(),
            ErrorKind::Other(format!("{what} exited with {status}")),
        ));
    }
    Ok(())
}

/// Assembles one `.s` file into an object file.
pub fn assemble(asm_path: &Path, object_path: &Path) -> DiagResult<()> {
    let mut cmd = Command::new("as");
    cmd.arg(asm_path).arg("-o").arg(object_path);
    run(cmd, "assembler")
}

/// Links one or more object files into the final artifact, optionally
/// against the internally bundled libc archive (spec §1 "optionally
/// against an internally bundled standard library archive").
pub fn link(
    objects: &[PathBuf],
    output: &Path,
    link_dirs: &[PathBuf],
    link_libs: &[String],
    internal_libc: bool,
) -> DiagResult<()> {
    let mut cmd = Command::new("cc");
    cmd.args(objects).arg("-o").arg(output);
    for dir in link_dirs {
        cmd.arg("-L").arg(dir);
    }
    for lib in link_libs {
        cmd.arg(format!("-l{lib}"));
    }
    if internal_libc {
        cmd.arg("-L").arg("/usr/lib/vc-libc").arg("-lvc-libc").arg("-nostdlib");
    }
    run(cmd, "linker")
}
