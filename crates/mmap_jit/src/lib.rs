//! Allocate pages with `mmap(2)`, write machine code into them, and run it.
//!
//! A region moves through three states, each a distinct type so that memory is never writable
//! and executable at the same time:
//!
//!  - [MappedRegion]: mapped, but inaccessible
//!  - [WritableRegion]: read/write, fill it with code
//!  - [ExecutableRegion]: read/execute, call it with [as_function!]

extern crate errno;
extern crate libc;

mod cache;
mod error;
mod executable_region;
mod mapped_region;
mod writable_region;

pub use crate::error::{MappingError, Result};
pub use crate::executable_region::ExecutableRegion;
pub use crate::mapped_region::MappedRegion;
pub use crate::writable_region::WritableRegion;

/// Reinterprets the start of an [ExecutableRegion] as a function pointer of the given type.
///
/// This is wildly unsafe: the caller promises the region holds a function with exactly that
/// signature, and that the region outlives every call through the pointer.
#[macro_export]
macro_rules! as_function {
    ($region: expr, $fn_type: ty) => {
        std::mem::transmute::<*const u8, $fn_type>($region.addr())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes a program equivalent to `fn(x: u64) -> u64 { x * x }` to the given buffer.
    fn write_square_function(buffer: &mut [u8]) {
        let instructions: &[u8] = if cfg!(target_arch = "x86_64") {
            &[
                // mov rax, rdi
                0x48, 0x89, 0xF8, //
                // imul rax, rdi
                0x48, 0x0F, 0xAF, 0xC7, //
                // ret
                0xC3,
            ]
        } else if cfg!(target_arch = "aarch64") {
            &[
                // mul x0, x0, x0
                0x00, 0x7c, 0x00, 0x9b, //
                // ret
                0xc0, 0x03, 0x5f, 0xd6,
            ]
        } else {
            panic!("no program for arch")
        };

        buffer[0..instructions.len()].copy_from_slice(instructions);
    }

    #[test]
    fn allocation_is_rounded_up_to_a_page() {
        let region = MappedRegion::allocate(10).unwrap();
        assert!(region.len() >= 10);
        assert_eq!(0, region.len() % 4096);
        region.release().unwrap();
    }

    #[test]
    fn writable_region_starts_zeroed_and_accepts_writes() {
        let mut mem = WritableRegion::allocate(64).unwrap();
        assert!(mem[..].iter().all(|&b| b == 0));

        mem[0..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&[1, 2, 3, 4], &mem[0..4]);
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn run_a_square_function() {
        let mut mem = WritableRegion::allocate(4096).unwrap();
        write_square_function(&mut mem[..]);
        let code = mem.into_executable().unwrap();

        let square = unsafe { as_function!(code, extern "C" fn(u64) -> u64) };
        assert_eq!(16, square(4));
        assert_eq!(1764, square(42));

        code.release().unwrap();
    }

    #[test]
    fn dropping_without_release_is_fine() {
        let mem = WritableRegion::allocate(4096).unwrap();
        let code = mem.into_executable().unwrap();
        drop(code);
    }
}
