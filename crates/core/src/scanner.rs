//! Turns raw source bytes into [Command]s.
//!
//! Every byte outside the eight-character command alphabet is a comment, so scanning never fails.

use std::iter::{Copied, FusedIterator};
use std::slice;

/// One of the eight commands of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Increment,
    Decrement,
    ShiftRight,
    ShiftLeft,
    Input,
    Output,
    LoopOpen,
    LoopClose,
}

/// Lazily filters a byte stream down to [Command]s. `None` marks the end of the stream.
pub struct Scanner<I> {
    bytes: I,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Command> {
        use Command::*;
        match byte {
            b'+' => Some(Increment),
            b'-' => Some(Decrement),
            b'>' => Some(ShiftRight),
            b'<' => Some(ShiftLeft),
            b',' => Some(Input),
            b'.' => Some(Output),
            b'[' => Some(LoopOpen),
            b']' => Some(LoopClose),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        use Command::*;
        match self {
            Increment => b'+',
            Decrement => b'-',
            ShiftRight => b'>',
            ShiftLeft => b'<',
            Input => b',',
            Output => b'.',
            LoopOpen => b'[',
            LoopClose => b']',
        }
    }
}

impl<I> Scanner<I>
where
    I: Iterator<Item = u8>,
{
    pub fn new(bytes: I) -> Self {
        Scanner { bytes }
    }
}

impl<I> Iterator for Scanner<I>
where
    I: Iterator<Item = u8>,
{
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        self.bytes.by_ref().find_map(Command::from_byte)
    }
}

impl<I> FusedIterator for Scanner<I> where I: FusedIterator<Item = u8> {}

/// Scans source text already in memory.
pub fn scan(source_text: &[u8]) -> Scanner<Copied<slice::Iter<'_, u8>>> {
    Scanner::new(source_text.iter().copied())
}

/// Skips a leading `#!` line, up to and including its newline, so scripts can be run directly.
///
/// Anything else is returned untouched.
pub fn strip_shebang(source_text: &[u8]) -> &[u8] {
    if !source_text.starts_with(b"#!") {
        return source_text;
    }

    match source_text.iter().position(|&b| b == b'\n') {
        Some(newline) => &source_text[newline + 1..],
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Command::*;

    #[test]
    fn everything_else_is_a_comment() {
        let commands: Vec<_> = scan(b"add two: ++ then print .\n[loop]").collect();
        assert_eq!(
            vec![Increment, Increment, Output, LoopOpen, LoopClose],
            commands
        );
    }

    #[test]
    fn every_command_byte_is_recognized() {
        let source = b"+-><,.[]";
        let commands: Vec<_> = scan(source).collect();
        assert_eq!(8, commands.len());

        let bytes: Vec<u8> = commands.into_iter().map(Command::to_byte).collect();
        assert_eq!(&source[..], &bytes[..]);
    }

    #[test]
    fn empty_and_comment_only_sources_end_immediately() {
        assert_eq!(None, scan(b"").next());
        assert_eq!(None, scan(b"hello world").next());
    }

    #[test]
    fn shebang_line_is_skipped() {
        assert_eq!(b"+.", strip_shebang(b"#!/usr/bin/env tapejit\n+."));
        assert_eq!(b"", strip_shebang(b"#!/usr/bin/env tapejit"));
    }

    #[test]
    fn source_without_shebang_is_untouched() {
        assert_eq!(b"#+.", strip_shebang(b"#+."));
        assert_eq!(b"+.", strip_shebang(b"+."));
    }
}
