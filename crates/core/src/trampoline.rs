//! The runtime side of native I/O.
//!
//! Generated code keeps four values in argument registers for its whole life and never spills
//! them:
//!
//! | register | value                                   |
//! |----------|-----------------------------------------|
//! | `x0`     | opaque token: the address of an [IoContext] |
//! | `x1`     | pointer to the current cell             |
//! | `x2`     | [output_trampoline]                     |
//! | `x3`     | [input_trampoline]                      |
//!
//! The calling convention lets any callee clobber all four. So generated code only ever calls
//! the two trampolines, and the contract is: a trampoline returns with `x0`-`x3` holding exactly
//! what they held on entry. Each trampoline saves them, calls into Rust with `(token, cell)`
//! (which are already in the argument registers), then loads all four back right before `ret`.

use std::ffi::c_void;
use std::io;

use crate::program::ByteIo;

/// What generated code sees of a trampoline: something to `blr` to.
pub(crate) type Trampoline = extern "C" fn();

/// The I/O state reachable from generated code through the token in `x0`.
///
/// Rust code called from a trampoline cannot unwind through generated code, so the first I/O
/// error is parked here, further I/O is skipped, and the error surfaces after the program
/// returns.
pub(crate) struct IoContext<'a> {
    io: ByteIo<'a>,
    error: Option<io::Error>,
}

impl<'a> IoContext<'a> {
    pub fn new(io: ByteIo<'a>) -> Self {
        IoContext { io, error: None }
    }

    /// The value to hand to generated code in `x0`.
    pub fn as_token(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }

    fn put(&mut self, byte: u8) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.io.put(byte) {
            self.error = Some(e);
        }
    }

    fn get(&mut self) -> u8 {
        if self.error.is_some() {
            return 0;
        }
        match self.io.get() {
            Ok(byte) => byte,
            Err(e) => {
                self.error = Some(e);
                0
            }
        }
    }

    /// Reports the first I/O error, if any.
    pub fn finish(self) -> io::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

unsafe extern "C" fn put_cell(token: *mut c_void, cell: *const u8) {
    let context = &mut *(token as *mut IoContext<'_>);
    context.put(*cell);
}

unsafe extern "C" fn get_cell(token: *mut c_void, cell: *mut u8) {
    let context = &mut *(token as *mut IoContext<'_>);
    *cell = context.get();
}

macro_rules! trampoline {
    ($(#[$meta: meta])* $name: ident => $target: path) => {
        $(#[$meta])*
        #[unsafe(naked)]
        pub(crate) extern "C" fn $name() {
            std::arch::naked_asm!(
                // frame record at [sp], x0-x3 above it; sp stays 16-byte aligned
                "stp x29, x30, [sp, #-48]!",
                "mov x29, sp",
                "stp x0, x1, [sp, #16]",
                "stp x2, x3, [sp, #32]",
                // x0 and x1 are already (token, cell)
                "bl {target}",
                "ldp x2, x3, [sp, #32]",
                "ldp x0, x1, [sp, #16]",
                "ldp x29, x30, [sp], #48",
                "ret",
                target = sym $target,
            )
        }
    };
}

trampoline! {
    /// Writes the current cell, then restores `x0`-`x3`.
    output_trampoline => put_cell
}

trampoline! {
    /// Reads into the current cell (0 at end of input), then restores `x0`-`x3`.
    input_trampoline => get_cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_is_kept_and_later_io_skipped() {
        struct Broken;
        impl io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut input: &[u8] = b"xyz";
        let mut output = Broken;
        let mut context = IoContext::new(ByteIo::new(&mut input, &mut output));

        context.put(b'a');
        assert_eq!(0, context.get());

        let error = context.finish().unwrap_err();
        assert_eq!(io::ErrorKind::BrokenPipe, error.kind());
        assert_eq!(b"xyz", input);
    }

    #[test]
    fn rust_side_reads_and_writes_through_the_token() {
        let mut input: &[u8] = b"Q";
        let mut output = Vec::new();
        let mut context = IoContext::new(ByteIo::new(&mut input, &mut output));
        let token = context.as_token();

        let mut cell = 0u8;
        unsafe {
            get_cell(token, &mut cell);
            put_cell(token, &cell);
        }
        context.finish().unwrap();

        assert_eq!(b'Q', cell);
        assert_eq!(b"Q".to_vec(), output);
    }
}
