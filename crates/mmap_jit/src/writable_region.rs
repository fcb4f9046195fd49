use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

use crate::ExecutableRegion;
use crate::MappedRegion;

/// A mapped region that may be written to, but not executed.
pub struct WritableRegion {
    region: MappedRegion,
}

impl WritableRegion {
    /// Maps a fresh region of at least `size` bytes and makes it writable.
    pub fn allocate(size: usize) -> crate::Result<Self> {
        MappedRegion::allocate(size)?.into_writable()
    }

    /// Consumes the [MappedRegion] and marks its memory as read/write.
    pub fn from(region: MappedRegion) -> crate::Result<Self> {
        use libc::{PROT_READ, PROT_WRITE};

        region.protect(PROT_READ | PROT_WRITE)?;

        Ok(Self { region })
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Consumes the region and returns an executable region. That means you can run it!
    ///
    /// The instruction cache is synchronized with what was written before the permissions
    /// change, so freshly written code is what actually runs.
    pub fn into_executable(self) -> crate::Result<ExecutableRegion> {
        crate::cache::flush_instruction_cache(self.region.addr_mut(), self.region.len());
        ExecutableRegion::from(self.region)
    }
}

impl<I> Index<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.region[index]
    }
}

impl<I> IndexMut<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        unsafe {
            &mut std::slice::from_raw_parts_mut(self.region.addr_mut(), self.region.len())[index]
        }
    }
}
