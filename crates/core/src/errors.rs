//! All errors that can be _generated_ by the compiler, and everything else that can go wrong.
use std::fmt;
use std::io;
use std::path::PathBuf;

use mmap_jit::MappingError;
use thiserror::Error;

/// Any error that occurs as a result of compiling the source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    reason: Reason,
    position: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// A `]` with no open loop.
    UnmatchedClose,
    /// End of input with loops still open; carries how many.
    UnmatchedOpen(usize),
    /// The compiled program does not fit in the configured capacity.
    ProgramTooLarge,
    /// A loop body is too long for the branch instruction's offset field.
    BranchOutOfRange,
}

/// Everything that can go wrong, from opening the source to running the compiled program.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    InputUnavailable { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error("unknown op [{word:#010x}] at: {position}")]
    UnknownOpcode { position: usize, word: i32 },

    #[error("I/O error while running the program: {0}")]
    Io(#[from] io::Error),

    #[error("could not map executable memory: {0}")]
    ExecutableMapFailed(MappingError),

    #[error("could not unmap executable memory: {0}")]
    ExecutableUnmapFailed(MappingError),

    #[error("native code can only run on aarch64 hosts")]
    UnsupportedArchitecture,
}

impl CompilationError {
    pub fn new(reason: Reason, position: usize) -> Self {
        CompilationError {
            reason,
            position: Some(position),
        }
    }

    pub fn without_position(reason: Reason) -> Self {
        CompilationError {
            reason,
            position: None,
        }
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Where in the emitted stream (bytecode word or instruction word) the problem was found.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn message(&self) -> String {
        self.reason.message()
    }

    pub fn message_identifier(&self) -> u32 {
        self.reason.message_identifier()
    }
}

impl Reason {
    pub fn message_identifier(&self) -> u32 {
        use Reason::*;
        match self {
            UnmatchedClose => 0x001,
            UnmatchedOpen(_) => 0x002,
            ProgramTooLarge => 0x003,
            BranchOutOfRange => 0x004,
        }
    }

    pub fn message(&self) -> String {
        use Reason::*;
        match self {
            UnmatchedClose => {
                "too many ']' brackets. Check that each '[' has a matching ']'".to_owned()
            }
            UnmatchedOpen(1) => "1 '[' is never closed. Check that each '[' has a matching ']'"
                .to_owned(),
            UnmatchedOpen(n) => format!(
                "{} '[' are never closed. Check that each '[' has a matching ']'",
                n
            ),
            ProgramTooLarge => "file is too large!".to_owned(),
            BranchOutOfRange => "loop body is too long to branch over".to_owned(),
        }
    }
}

impl std::error::Error for CompilationError {}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let position = self
            .position
            .map(|p| format!(" at {}:", p))
            .unwrap_or_else(|| String::from(""));

        write!(
            f,
            "error[{:04x}]:{} {}",
            self.message_identifier(),
            position,
            self.message()
        )
    }
}

impl From<MappingError> for Error {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::Unmap(_) => Error::ExecutableUnmapFailed(e),
            MappingError::Map(_) | MappingError::Protect(_) => Error::ExecutableMapFailed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identifier_and_position() {
        let e = CompilationError::new(Reason::UnmatchedClose, 12);
        assert_eq!(
            "error[0001]: at 12: too many ']' brackets. Check that each '[' has a matching ']'",
            e.to_string()
        );
    }

    #[test]
    fn unmatched_open_counts_loops() {
        let e = CompilationError::without_position(Reason::UnmatchedOpen(3));
        assert_eq!(
            "error[0002]: 3 '[' are never closed. Check that each '[' has a matching ']'",
            e.to_string()
        );
    }

    #[test]
    fn unmap_failures_are_told_apart() {
        let unmap: Error = MappingError::Unmap(errno::Errno(22)).into();
        assert!(matches!(unmap, Error::ExecutableUnmapFailed(_)));

        let map: Error = MappingError::Map(errno::Errno(12)).into();
        assert!(matches!(map, Error::ExecutableMapFailed(_)));
    }
}
