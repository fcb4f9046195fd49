//! Instruction cache maintenance after writing code.
//!
//! x86_64 keeps its instruction cache coherent by itself; AArch64 does not.

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub(crate) fn flush_instruction_cache(start: *mut u8, len: usize) {
    extern "C" {
        fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
    }

    unsafe {
        __clear_cache(
            start as *mut libc::c_char,
            start.add(len) as *mut libc::c_char,
        );
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "macos"))]
pub(crate) fn flush_instruction_cache(start: *mut u8, len: usize) {
    extern "C" {
        fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
    }

    unsafe {
        sys_icache_invalidate(start as *mut libc::c_void, len);
    }
}

#[cfg(not(all(target_arch = "aarch64", any(target_os = "linux", target_os = "macos"))))]
pub(crate) fn flush_instruction_cache(_start: *mut u8, _len: usize) {}
