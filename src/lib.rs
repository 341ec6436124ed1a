//! hostpatch rewrites host-side LLVM IR that was compiled against a
//! CUDA-style kernel-launch runtime so that the same module drives an
//! OpenCL-backed runtime with a different argument-marshalling ABI.
//!
//! # Pipeline
//!
//! 1. **Parse**: read the host IR module (LLVM 14 dialect, `.ll` or `.bc`)
//! 2. **Install**: embed the companion kernel source text as a module
//!    global the runtime's configure call reads at execution time
//! 3. **Patch**: scan every function, replacing each recognized launch
//!    sequence with configure/setter/trigger calls against the new runtime
//! 4. **Verify & write**: verification problems are reported but the
//!    patched module is still printed to the output path

pub mod diagnostics;
pub mod inspect;
pub mod launch;
pub mod layout;
pub mod rewrite;
pub mod runtime;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;

use crate::rewrite::HostPatcher;

/// Options for one patch run.
///
/// Separated from CLI argument parsing so the transformation can be driven
/// programmatically (and from tests) with explicit options.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Host-side IR module to rewrite.
    pub input_ir: PathBuf,
    /// Companion kernel source file embedded into the patched module.
    pub kernel_source: PathBuf,
    /// Where the patched module is written.
    pub output_ir: PathBuf,
    /// Log recognized launches and skipped arguments to stderr.
    pub verbose: bool,
}

impl PatchOptions {
    pub fn new(input_ir: PathBuf, kernel_source: PathBuf, output_ir: PathBuf) -> Self {
        PatchOptions {
            input_ir,
            kernel_source,
            output_ir,
            verbose: false,
        }
    }
}

/// Run the whole-file transformation described by `options`.
///
/// Any core failure aborts before the output file is written; a partially
/// rewritten module is never persisted.
pub fn patch(options: &PatchOptions) -> Result<()> {
    let kernel_source = std::fs::read_to_string(&options.kernel_source).with_context(|| {
        format!(
            "reading kernel source file {}",
            options.kernel_source.display()
        )
    })?;

    let context = Context::create();
    let buffer = MemoryBuffer::create_from_file(&options.input_ir)
        .map_err(|e| anyhow::anyhow!("reading host IR file {}: {}", options.input_ir.display(), e))?;
    let module = context
        .create_module_from_ir(buffer)
        .map_err(|e| anyhow::anyhow!("parsing host IR file {}: {}", options.input_ir.display(), e))?;

    let patcher = HostPatcher::new(&context, module, options.verbose);
    patcher.install_kernel_source(&kernel_source);
    patcher.patch_module()?;

    // Diagnosed, not fatal: the rewrite itself is already committed, and
    // pre-existing verifier complaints in the input would otherwise block
    // the output entirely.
    if let Err(message) = patcher.module.verify() {
        diagnostics::report_error(
            &format!("patched module failed verification: {}", message),
            Some("the output file is still written"),
        );
    }

    patcher
        .module
        .print_to_file(&options.output_ir)
        .map_err(|e| {
            anyhow::anyhow!("writing patched IR to {}: {}", options.output_ir.display(), e)
        })?;
    Ok(())
}
