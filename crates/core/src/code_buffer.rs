//! A growable buffer of fixed-width machine words, and the only way to turn one into running code.

use mmap_jit::{ExecutableRegion, WritableRegion};

use crate::errors::{CompilationError, Reason};

/// Every AArch64 instruction is one 32-bit word.
pub const INSTRUCTION_WIDTH: usize = 4;

/// Position of an instruction, counted in words from the start of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WordOffset(pub i32);

/// Machine code under construction.
///
/// Words are appended with [CodeBuffer::emit] and may be rewritten later with
/// [CodeBuffer::patch_at] once a branch target is known. Nothing here is executable until
/// [CodeBuffer::finalize_executable] copies it into a fresh mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBuffer {
    words: Vec<u32>,
    capacity: usize,
}

impl CodeBuffer {
    /// A buffer that refuses to grow beyond `capacity` words.
    pub fn new(capacity: usize) -> Self {
        CodeBuffer {
            words: Vec::new(),
            capacity: capacity.min(i32::MAX as usize),
        }
    }

    /// Where the next word will go.
    pub fn position(&self) -> WordOffset {
        WordOffset(self.words.len() as i32)
    }

    /// Appends a word, returning its position.
    pub fn emit(&mut self, word: u32) -> Result<WordOffset, CompilationError> {
        let position = self.position();
        if self.words.len() >= self.capacity {
            return Err(CompilationError::new(
                Reason::ProgramTooLarge,
                self.words.len(),
            ));
        }
        self.words.push(word);

        Ok(position)
    }

    /// Overwrites a word that has already been emitted.
    ///
    /// # Panics
    ///
    /// If `position` has not been emitted yet.
    pub fn patch_at(&mut self, position: WordOffset, word: u32) {
        self.words[position.to_index()] = word;
    }

    pub fn word_at(&self, position: WordOffset) -> u32 {
        self.words[position.to_index()]
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The machine code as the processor sees it (little-endian words).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.words.len() * INSTRUCTION_WIDTH);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Copies the code into a new mapping and makes it executable.
    ///
    /// The mapping is unmapped when the returned region is released or dropped; if any step
    /// fails, whatever was mapped is unmapped before returning.
    pub fn finalize_executable(&self) -> mmap_jit::Result<ExecutableRegion> {
        let bytes = self.to_bytes();
        let mut mem = WritableRegion::allocate(bytes.len())?;
        mem[0..bytes.len()].copy_from_slice(&bytes);

        mem.into_executable()
    }
}

impl WordOffset {
    pub fn to_index(self) -> usize {
        let WordOffset(words) = self;
        assert!(words >= 0);

        words as usize
    }
}

impl std::ops::Sub for WordOffset {
    type Output = i32;

    /// Distance in instructions, as branch instructions encode it.
    fn sub(self, other: WordOffset) -> i32 {
        self.0 - other.0
    }
}

impl std::ops::Add<i32> for WordOffset {
    type Output = WordOffset;

    fn add(self, words: i32) -> WordOffset {
        WordOffset(self.0 + words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_returns_positions_and_patch_rewrites() {
        let mut code = CodeBuffer::new(8);
        assert_eq!(WordOffset(0), code.emit(0xd503201f).unwrap());
        let placeholder = code.emit(0).unwrap();
        assert_eq!(WordOffset(1), placeholder);

        code.patch_at(placeholder, 0xd65f03c0);
        assert_eq!(0xd65f03c0, code.word_at(placeholder));
        assert_eq!(WordOffset(2), code.position());
    }

    #[test]
    fn words_are_little_endian() {
        let mut code = CodeBuffer::new(8);
        code.emit(0xd65f03c0).unwrap();
        assert_eq!(vec![0xc0, 0x03, 0x5f, 0xd6], code.to_bytes());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut code = CodeBuffer::new(1);
        code.emit(0).unwrap();
        let error = code.emit(0).unwrap_err();
        assert_eq!(Reason::ProgramTooLarge, error.reason());
    }

    #[test]
    fn offsets_are_counted_in_instructions() {
        assert_eq!(-2, WordOffset(1) - WordOffset(3));
        assert_eq!(WordOffset(4), WordOffset(3) + 1);
    }

    #[test]
    fn finalized_code_can_be_released() {
        let mut code = CodeBuffer::new(8);
        code.emit(0xd65f03c0).unwrap();
        let region = code.finalize_executable().unwrap();
        assert_eq!(&code.to_bytes()[..], unsafe {
            std::slice::from_raw_parts(region.addr(), 4)
        });
        region.release().unwrap();
    }
}
