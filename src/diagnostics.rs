use std::fmt;

/// Failure modes of the launch rewrite.
///
/// All of these are fatal: by the time one is raised the module may already
/// be partially edited, so the only safe response is to abort the whole run
/// without writing an output file.
#[derive(Debug)]
pub enum PatchError {
    /// The launch call's first operand is not a (cast of a) named kernel
    /// function known to the module.
    MalformedLaunch(String),
    /// The staging call's first operand does not have the expected
    /// cast-of-storage-slot shape.
    MalformedStageArgument(String),
    /// A staged integer has a width with no matching argument setter.
    UnsupportedArgumentWidth(u32),
    /// A staged value has a kind with no marshalling strategy at all.
    UnsupportedArgumentType(String),
    /// A launch was rewritten before the kernel-source global was installed.
    MissingKernelSource,
    /// The underlying instruction builder refused an emission.
    Emit(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::MalformedLaunch(detail) => {
                write!(f, "malformed launch call: {}", detail)
            }
            PatchError::MalformedStageArgument(detail) => {
                write!(f, "malformed stage-argument call: {}", detail)
            }
            PatchError::UnsupportedArgumentWidth(width) => {
                write!(f, "no argument setter for {}-bit integers", width)
            }
            PatchError::UnsupportedArgumentType(type_name) => {
                write!(f, "no marshalling strategy for argument type {}", type_name)
            }
            PatchError::MissingKernelSource => {
                write!(f, "kernel source global has not been installed in this module")
            }
            PatchError::Emit(detail) => {
                write!(f, "failed to emit replacement instruction: {}", detail)
            }
        }
    }
}

impl std::error::Error for PatchError {}

impl From<inkwell::builder::BuilderError> for PatchError {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        PatchError::Emit(err.to_string())
    }
}

// Print a compact, rustc-like diagnostic to stderr. An "error:" header in
// red, then the message, then an optional note.
pub fn report_error(message: &str, note: Option<&str>) {
    let red = "\x1b[31m";
    let reset = "\x1b[0m";
    eprintln!("{}error{}: {}", red, reset, message);
    if let Some(note) = note {
        let blue = "\x1b[34m";
        eprintln!("{}note{}: {}", blue, reset, note);
    }
}

// Progress/limitation notes emitted in verbose mode.
pub fn note(message: &str) {
    let blue = "\x1b[34m";
    let reset = "\x1b[0m";
    eprintln!("{}note{}: {}", blue, reset, message);
}
