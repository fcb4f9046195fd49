//! Matches `[` with `]`.

use crate::errors::{CompilationError, Reason};

/// The positions of loops that have been opened but not yet closed.
///
/// What a position means is up to the back end: a bytecode index, an instruction word, or just
/// the nesting depth.
pub struct LoopStack<P> {
    open: Vec<P>,
}

impl<P> LoopStack<P>
where
    P: Copy,
{
    pub fn new() -> Self {
        LoopStack { open: Vec::new() }
    }

    /// How many loops are open right now.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Records the position of a `[`.
    pub fn push(&mut self, position: P) {
        self.open.push(position);
    }

    /// Returns the position of the `[` that matches a `]` found at `at`.
    pub fn pop(&mut self, at: usize) -> Result<P, CompilationError> {
        self.open
            .pop()
            .ok_or_else(|| CompilationError::new(Reason::UnmatchedClose, at))
    }

    /// Checks that every loop has been closed by the end of the program at `at`.
    pub fn finish(self, at: usize) -> Result<(), CompilationError> {
        match self.open.len() {
            0 => Ok(()),
            n => Err(CompilationError::new(Reason::UnmatchedOpen(n), at)),
        }
    }
}

impl<P> Default for LoopStack<P>
where
    P: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}
