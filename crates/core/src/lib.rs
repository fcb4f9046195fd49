//! Tapejit internals.
//!
//! Every back end shares one front end:
//!
//!  - the source is [scanned](scanner::scan) into [Command]s, skipping everything else
//!  - each command becomes an [Op], and runs of `+`/`-` or `>`/`<` are
//!    [coalesced](optimize::coalesce) into single ops with a net count
//!  - the ops are handed to a back end, each of which matches `[` with `]` with the same
//!    loop stack and backpatches the jumps once the `]` turns up
//!
//! There are three back ends: [bytecode](InterpretedProgram) for the built-in virtual machine,
//! AArch64 machine code that is [mapped into this process](CompiledProgram) and called directly,
//! and [C source](translate_to_c).

extern crate mmap_jit;

use std::io::{Read, Write};

use crate::codegen::CodeGenerator;

pub mod bytecode;
pub mod errors;
pub mod ir;
pub mod optimize;
pub mod scanner;
pub mod tape;
pub mod translate;

mod asm;
mod code_buffer;
mod codegen;
mod jit;
mod loops;
mod program;
#[cfg(target_arch = "aarch64")]
mod trampoline;

pub use crate::bytecode::{Bytecode, InterpretedProgram, Opcode};
pub use crate::code_buffer::{CodeBuffer, WordOffset};
pub use crate::errors::{CompilationError, Error, Reason};
pub use crate::ir::Op;
pub use crate::jit::CompiledProgram;
pub use crate::program::Program;
pub use crate::scanner::{strip_shebang, Command};
pub use crate::tape::{Tape, TAPE_SIZE};

/// Bounds on what the compilers will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// The most words (bytecode words or instructions) a compiled program may take up.
    pub max_program_words: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_program_words: 1 << 20,
        }
    }
}

/// Runs the front end: scans the source and coalesces runs.
pub fn aggregate(source_text: &[u8]) -> impl Iterator<Item = Op> + '_ {
    optimize::coalesce(scanner::scan(source_text).map(Op::from))
}

/// Compile the source down to bytecode, that can then be interpreted.
pub fn compile_to_bytecode(
    source_text: &[u8],
    limits: &Limits,
) -> Result<InterpretedProgram, CompilationError> {
    InterpretedProgram::compile(aggregate(source_text), limits)
}

/// Compile the source to AArch64 machine code, without mapping it anywhere.
pub fn generate_native_code(
    source_text: &[u8],
    limits: &Limits,
) -> Result<CodeBuffer, CompilationError> {
    CodeGenerator::new(limits).compile(aggregate(source_text))
}

/// Compile the source to native code, injected into the current process's image.
pub fn jit_compile(source_text: &[u8], limits: &Limits) -> Result<CompiledProgram, Error> {
    let code = generate_native_code(source_text, limits)?;
    CompiledProgram::from_code(&code)
}

/// Translate the source into a C program.
pub fn translate_to_c(source_text: &[u8]) -> Result<String, CompilationError> {
    translate::translate(aggregate(source_text))
}

/// Compiles, runs and releases native code.
///
/// The code is released even when running it fails; the first failure wins.
pub fn run_jit(
    source_text: &[u8],
    limits: &Limits,
    universe: &mut Tape,
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> Result<(), Error> {
    let program = jit_compile(source_text, limits)?;
    let outcome = program.run_with_io(universe, input, output);
    let released = program.release();

    outcome.and(released)
}
