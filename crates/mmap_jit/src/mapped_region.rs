use std::ops::{Drop, Index};
use std::ptr;

use errno::errno;
use libc::{c_void, size_t};

use crate::error::MappingError;
use crate::WritableRegion;

/// A region of memory mapped by `mmap(2)`.
///
/// The region is given back with `munmap(2)` exactly once: either by an explicit
/// [MappedRegion::release], which reports failure, or when the value is dropped.
pub struct MappedRegion {
    addr: *mut c_void,
    len: size_t,
}

impl MappedRegion {
    /// Allocate a region of at least the given size (in bytes), rounded up to whole pages.
    ///
    /// The pages start out inaccessible; convert into a [WritableRegion] to fill them.
    pub fn allocate(size: usize) -> crate::Result<Self> {
        use libc::{MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE};

        let len = round_up_to_page(size.max(1));
        let memory = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };

        if memory == MAP_FAILED {
            return Err(MappingError::Map(errno()));
        }

        Ok(MappedRegion { addr: memory, len })
    }

    /// Returns a pointer to mapped memory.
    pub fn addr(&self) -> *const u8 {
        self.addr as *const u8
    }

    /// Returns a mutable pointer to this region.
    ///
    /// Note: to write to this memory, first you must convert into a WritableRegion.
    pub fn addr_mut(&self) -> *mut u8 {
        self.addr as *mut u8
    }

    /// Return the length of region.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the region and returns a writable region.
    pub fn into_writable(self) -> crate::Result<WritableRegion> {
        WritableRegion::from(self)
    }

    /// Unmaps the region now, reporting failure instead of ignoring it.
    pub fn release(mut self) -> crate::Result<()> {
        self.unmap()
    }

    pub(crate) fn protect(&self, protection: libc::c_int) -> crate::Result<()> {
        let status = unsafe { libc::mprotect(self.addr, self.len, protection) };
        if status < 0 {
            return Err(MappingError::Protect(errno()));
        }

        Ok(())
    }

    fn unmap(&mut self) -> crate::Result<()> {
        if self.addr.is_null() {
            return Ok(());
        }

        let status = unsafe { libc::munmap(self.addr, self.len) };
        // Whatever munmap said, never hand this address to munmap again.
        self.addr = ptr::null_mut();
        self.len = 0;

        if status < 0 {
            return Err(MappingError::Unmap(errno()));
        }

        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let _ = self.unmap();
    }
}

impl<I> Index<I> for MappedRegion
where
    I: std::slice::SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        unsafe { &std::slice::from_raw_parts(self.addr as *const u8, self.len)[index] }
    }
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

fn round_up_to_page(size: usize) -> usize {
    let page = page_size();
    (size + (page - 1)) & !(page - 1)
}
