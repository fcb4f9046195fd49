//! The tape: a fixed number of byte cells that every back end runs on.

use std::alloc::{self, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// log2 of the number of cells.
pub const TAPE_BITS: u32 = 16;
/// Number of cells on the tape. The cell pointer wraps around at this size in every back end.
pub const TAPE_SIZE: usize = 1 << TAPE_BITS;
/// Keeps the low [TAPE_BITS] bits of a cell index.
pub const TAPE_MASK: usize = TAPE_SIZE - 1;

/// [TAPE_SIZE] zero-initialized cells, aligned to [TAPE_SIZE] bytes.
///
/// The alignment means that the address of cell `i` is the tape's address with its low
/// [TAPE_BITS] bits replaced by `i`. Native code uses that to wrap the cell pointer without
/// keeping the tape's base address around.
pub struct Tape {
    cells: NonNull<u8>,
}

impl Tape {
    pub fn new() -> Self {
        let cells = unsafe { alloc::alloc_zeroed(Self::layout()) };
        match NonNull::new(cells) {
            Some(cells) => Tape { cells },
            None => alloc::handle_alloc_error(Self::layout()),
        }
    }

    /// Moves a cell index by `delta`, wrapping around the ends of the tape.
    pub fn wrap(index: usize, delta: i32) -> usize {
        index.wrapping_add(delta as isize as usize) & TAPE_MASK
    }

    fn layout() -> Layout {
        // Size and alignment are the same nonzero power of two.
        unsafe { Layout::from_size_align_unchecked(TAPE_SIZE, TAPE_SIZE) }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Tape::new()
    }
}

impl Deref for Tape {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.cells.as_ptr(), TAPE_SIZE) }
    }
}

impl DerefMut for Tape {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.cells.as_ptr(), TAPE_SIZE) }
    }
}

impl Drop for Tape {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.cells.as_ptr(), Self::layout()) }
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let used = self.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
        f.debug_struct("Tape")
            .field("cells", &&self[..used])
            .finish()
    }
}
