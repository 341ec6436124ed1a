//! Command-line entry point for hostpatch.
//!
//! ```bash
//! hostpatch infile-rawhost.ll infile-device.cl outfile-patchedhost.ll
//! ```
//!
//! Exit code 0 on success after writing the output file; 1 on a wrong
//! argument shape (with usage printed) or on any parse/rewrite failure.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use hostpatch::{patch, PatchOptions};

#[derive(Parser)]
#[command(
    name = "hostpatch",
    about = "Patch kernel launches in host-side LLVM IR to target an OpenCL runtime",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Host-side IR module to rewrite (.ll or .bc, LLVM 14 dialect)
    input_ir: PathBuf,

    /// Kernel source file to embed into the patched module
    kernel_source: PathBuf,

    /// Path for the patched IR module
    output_ir: PathBuf,

    /// Log each recognized launch and every skipped argument
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    // A wrong argument shape exits 1 with the usage text rather than
    // clap's default exit code.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    };

    let mut options = PatchOptions::new(cli.input_ir, cli.kernel_source, cli.output_ir);
    options.verbose = cli.verbose;
    patch(&options)
}
