//! Defines [Program] that allows you to run a program, regardless of how it's implemented.

use std::io::{self, BufWriter, ErrorKind, Read, Write};

use crate::errors::Error;
use crate::tape::Tape;

/// A [Program] is ready to be executed. Just give it a tape!
pub trait Program {
    /// Run the program on a tape, reading input from `input` and writing output to `output`.
    ///
    /// Input reads one byte at a time; the end of input reads as 0.
    fn run_with_io(
        &self,
        tape: &mut Tape,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), Error>;

    /// Runs the program with the default IO (prints to `stdout`; accepts input from `stdin`)
    fn run(&self, tape: &mut Tape) -> Result<(), Error> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut input = stdin.lock();
        let mut output = BufWriter::new(stdout.lock());

        self.run_with_io(tape, &mut input, &mut output)?;
        output.flush()?;

        Ok(())
    }
}

/// Byte-at-a-time I/O with the language's conventions, shared by every back end.
pub(crate) struct ByteIo<'a> {
    input: &'a mut dyn Read,
    output: &'a mut dyn Write,
}

impl<'a> ByteIo<'a> {
    pub fn new(input: &'a mut dyn Read, output: &'a mut dyn Write) -> Self {
        ByteIo { input, output }
    }

    pub fn put(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    /// Reads one byte, or 0 at the end of input.
    ///
    /// Pending output is flushed first, so a prompt is visible before the program blocks.
    pub fn get(&mut self) -> io::Result<u8> {
        self.output.flush()?;

        let mut one_byte = [0u8];
        loop {
            return match self.input.read(&mut one_byte) {
                Ok(0) => Ok(0),
                Ok(_) => Ok(one_byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
        }
    }
}
