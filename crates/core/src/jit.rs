//! Runs native code generated by [crate::codegen] in the current process.

use std::io::{Read, Write};

use mmap_jit::ExecutableRegion;
use tracing::debug;

use crate::code_buffer::CodeBuffer;
use crate::errors::Error;
use crate::program::Program;
use crate::tape::Tape;

#[cfg(target_arch = "aarch64")]
use crate::program::ByteIo;
#[cfg(target_arch = "aarch64")]
use crate::trampoline::{self, IoContext, Trampoline};
#[cfg(target_arch = "aarch64")]
use mmap_jit::as_function;
#[cfg(target_arch = "aarch64")]
use std::ffi::c_void;

/// The generated function: token, tape pointer, putchar trampoline, getchar trampoline.
#[cfg(target_arch = "aarch64")]
type Entry = unsafe extern "C" fn(*mut c_void, *mut u8, Trampoline, Trampoline);

/// A [Program] compiled to machine code and mapped into this process.
///
/// The mapping is given back exactly once: by [CompiledProgram::release], or on drop.
pub struct CompiledProgram {
    code: ExecutableRegion,
}

impl CompiledProgram {
    /// Maps the code and makes it executable.
    pub fn from_code(code: &CodeBuffer) -> Result<Self, Error> {
        if !cfg!(target_arch = "aarch64") {
            return Err(Error::UnsupportedArchitecture);
        }

        let code = code.finalize_executable()?;
        debug!(bytes = code.len(), "mapped native code");

        Ok(CompiledProgram { code })
    }

    /// Unmaps the code, reporting whether that worked.
    pub fn release(self) -> Result<(), Error> {
        let bytes = self.code.len();
        self.code.release()?;
        debug!(bytes, "released native code");

        Ok(())
    }

    /// Calls the generated code with `token` in `x0`.
    #[cfg(target_arch = "aarch64")]
    pub(crate) fn enter(&self, token: *mut c_void, universe: &mut Tape) {
        unsafe {
            let program = as_function!(self.code, Entry);
            program(
                token,
                universe.as_mut_ptr(),
                trampoline::output_trampoline,
                trampoline::input_trampoline,
            );
        }
    }
}

impl Program for CompiledProgram {
    #[cfg(target_arch = "aarch64")]
    fn run_with_io(
        &self,
        universe: &mut Tape,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), Error> {
        let mut context = IoContext::new(ByteIo::new(input, output));
        self.enter(context.as_token(), universe);
        context.finish()?;

        Ok(())
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn run_with_io(
        &self,
        _universe: &mut Tape,
        _input: &mut dyn Read,
        _output: &mut dyn Write,
    ) -> Result<(), Error> {
        Err(Error::UnsupportedArchitecture)
    }
}

#[cfg(all(test, not(target_arch = "aarch64")))]
mod tests {
    use super::*;
    use crate::{generate_native_code, Limits};

    #[test]
    fn refuses_to_map_on_other_hosts() {
        let code = generate_native_code(b"+.", &Limits::default()).unwrap();
        assert!(matches!(
            CompiledProgram::from_code(&code),
            Err(Error::UnsupportedArchitecture)
        ));
    }
}
