//! Defines and implements a bytecode interpreter.
//!
//! A program is a flat array of 32-bit words. Each instruction is one opcode word, and some
//! opcodes are followed by one operand word. The program ends with a [Opcode::Stop] word.
//!
//! Since this is platform-independent code, it will run on any platform, unlike the JIT compiler!

use std::convert::TryFrom;
use std::fmt;
use std::io::{Read, Write};

use tracing::{debug, trace};

use crate::errors::{CompilationError, Error, Reason};
use crate::ir::Op;
use crate::loops::LoopStack;
use crate::program::{ByteIo, Program};
use crate::tape::Tape;
use crate::Limits;

/// The tag word of every instruction. Zero is reserved for [Opcode::Stop].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Stop = 0,
    /// Operand: absolute position to continue at when the cell is zero.
    JumpForward,
    /// Operand: offset from the next instruction back to the loop body, taken when the cell is
    /// nonzero.
    JumpBack,
    GetChar,
    PutChar,
    /// Operand: amount to add to the cell.
    ValAdd,
    ValInc,
    ValDec,
    /// Operand: amount to move the cell pointer.
    PosAdd,
    PosInc,
    PosDec,
}

/// One decoded instruction, for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bytecode {
    Stop,
    JumpForward(usize),
    JumpBack(i32),
    GetChar,
    PutChar,
    ValAdd(i32),
    ValInc,
    ValDec,
    PosAdd(i32),
    PosInc,
    PosDec,
}

/// A [Program] that is dynamically interpreted from bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretedProgram {
    bytecode: Vec<i32>,
}

impl Opcode {
    /// Whether an operand word follows this opcode.
    pub fn has_operand(self) -> bool {
        use Opcode::*;
        matches!(self, JumpForward | JumpBack | ValAdd | PosAdd)
    }

    /// Number of words the whole instruction takes.
    pub fn width(self) -> usize {
        if self.has_operand() {
            2
        } else {
            1
        }
    }
}

impl TryFrom<i32> for Opcode {
    type Error = i32;

    fn try_from(word: i32) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match word {
            0 => Stop,
            1 => JumpForward,
            2 => JumpBack,
            3 => GetChar,
            4 => PutChar,
            5 => ValAdd,
            6 => ValInc,
            7 => ValDec,
            8 => PosAdd,
            9 => PosInc,
            10 => PosDec,
            _ => return Err(word),
        })
    }
}

impl InterpretedProgram {
    /// Compiles aggregated ops to bytecode.
    pub fn compile<I>(ops: I, limits: &Limits) -> Result<Self, CompilationError>
    where
        I: IntoIterator<Item = Op>,
    {
        let mut compiler = BytecodeCompiler::new(limits);
        for op in ops {
            compiler.compile_op(op)?;
        }
        let bytecode = compiler.finish()?;
        debug!(words = bytecode.len(), "compiled bytecode");

        Ok(InterpretedProgram { bytecode })
    }

    /// Wraps words that did not necessarily come from the compiler.
    pub fn from_words(bytecode: Vec<i32>) -> Self {
        InterpretedProgram { bytecode }
    }

    pub fn words(&self) -> &[i32] {
        &self.bytecode
    }

    /// Decodes the instruction at `position`.
    pub fn decode(&self, position: usize) -> Result<Bytecode, Error> {
        let word = self.word_at(position)?;
        let opcode =
            Opcode::try_from(word).map_err(|word| Error::UnknownOpcode { position, word })?;

        Ok(match opcode {
            Opcode::Stop => Bytecode::Stop,
            Opcode::JumpForward => Bytecode::JumpForward(self.operand(position)? as usize),
            Opcode::JumpBack => Bytecode::JumpBack(self.operand(position)?),
            Opcode::GetChar => Bytecode::GetChar,
            Opcode::PutChar => Bytecode::PutChar,
            Opcode::ValAdd => Bytecode::ValAdd(self.operand(position)?),
            Opcode::ValInc => Bytecode::ValInc,
            Opcode::ValDec => Bytecode::ValDec,
            Opcode::PosAdd => Bytecode::PosAdd(self.operand(position)?),
            Opcode::PosInc => Bytecode::PosInc,
            Opcode::PosDec => Bytecode::PosDec,
        })
    }

    fn word_at(&self, position: usize) -> Result<i32, Error> {
        self.bytecode
            .get(position)
            .copied()
            .ok_or(Error::UnknownOpcode {
                position,
                word: Opcode::Stop as i32,
            })
    }

    /// The operand of the instruction at `position`. A missing operand means the stream is
    /// corrupt, and is blamed on the instruction that needed it.
    fn operand(&self, position: usize) -> Result<i32, Error> {
        match self.bytecode.get(position + 1) {
            Some(&operand) => Ok(operand),
            None => Err(Error::UnknownOpcode {
                position,
                word: self.bytecode[position],
            }),
        }
    }
}

impl Program for InterpretedProgram {
    fn run_with_io(
        &self,
        universe: &mut Tape,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), Error> {
        use Opcode::*;

        let mut io = ByteIo::new(input, output);
        let mut current_address = 0;
        let mut program_counter = 0;

        // Running off the end is as good as a Stop.
        while let Some(&word) = self.bytecode.get(program_counter) {
            let opcode = Opcode::try_from(word).map_err(|word| Error::UnknownOpcode {
                position: program_counter,
                word,
            })?;

            program_counter = match opcode {
                Stop => return Ok(()),
                JumpForward => {
                    if universe[current_address] == 0 {
                        self.operand(program_counter)? as usize
                    } else {
                        program_counter + 2
                    }
                }
                JumpBack => {
                    let next = program_counter + 2;
                    if universe[current_address] != 0 {
                        let offset = self.operand(program_counter)?;
                        next.wrapping_add(offset as isize as usize)
                    } else {
                        next
                    }
                }
                GetChar => {
                    universe[current_address] = io.get()?;
                    program_counter + 1
                }
                PutChar => {
                    io.put(universe[current_address])?;
                    program_counter + 1
                }
                ValAdd => {
                    let amount = self.operand(program_counter)?;
                    universe[current_address] = universe[current_address].wrapping_add(amount as u8);
                    program_counter + 2
                }
                ValInc => {
                    universe[current_address] = universe[current_address].wrapping_add(1);
                    program_counter + 1
                }
                ValDec => {
                    universe[current_address] = universe[current_address].wrapping_sub(1);
                    program_counter + 1
                }
                PosAdd => {
                    let amount = self.operand(program_counter)?;
                    current_address = Tape::wrap(current_address, amount);
                    program_counter + 2
                }
                PosInc => {
                    current_address = Tape::wrap(current_address, 1);
                    program_counter + 1
                }
                PosDec => {
                    current_address = Tape::wrap(current_address, -1);
                    program_counter + 1
                }
            };
        }

        Ok(())
    }
}

/// Emits bytecode for one op at a time, backpatching forward jumps when their loop closes.
struct BytecodeCompiler {
    code: Vec<i32>,
    loops: LoopStack<usize>,
    capacity: usize,
}

impl BytecodeCompiler {
    fn new(limits: &Limits) -> Self {
        BytecodeCompiler {
            code: Vec::new(),
            loops: LoopStack::new(),
            // Positions are stored in operand words, so they must fit in one.
            capacity: limits.max_program_words.min(i32::MAX as usize),
        }
    }

    fn position(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, word: i32) -> Result<usize, CompilationError> {
        let position = self.position();
        if position >= self.capacity {
            return Err(CompilationError::new(Reason::ProgramTooLarge, position));
        }
        self.code.push(word);

        Ok(position)
    }

    fn emit_op(&mut self, opcode: Opcode) -> Result<usize, CompilationError> {
        self.emit(opcode as i32)
    }

    /// Emits `one` or `minus_one` for unit steps, and `add` with an operand for anything else.
    fn emit_additive(
        &mut self,
        amount: i32,
        add: Opcode,
        one: Opcode,
        minus_one: Opcode,
    ) -> Result<(), CompilationError> {
        match amount {
            0 => (),
            1 => {
                self.emit_op(one)?;
            }
            -1 => {
                self.emit_op(minus_one)?;
            }
            _ => {
                self.emit_op(add)?;
                self.emit(amount)?;
            }
        }

        Ok(())
    }

    fn compile_op(&mut self, op: Op) -> Result<(), CompilationError> {
        use Opcode::*;

        match op {
            Op::ChangeVal(amount) => self.emit_additive(amount, ValAdd, ValInc, ValDec)?,
            Op::ChangeAddr(amount) => self.emit_additive(amount, PosAdd, PosInc, PosDec)?,
            Op::PutChar => {
                self.emit_op(PutChar)?;
            }
            Op::GetChar => {
                self.emit_op(GetChar)?;
            }
            Op::StartLoop => {
                let start = self.emit_op(JumpForward)?;
                // placeholder, patched when the loop closes
                self.emit(0)?;
                self.loops.push(start);
            }
            Op::EndLoop => {
                let start = self.loops.pop(self.position())?;
                let end = self.emit_op(JumpBack)?;
                // Both jumps are two words wide: land just past the forward jump.
                self.emit(start as i32 - end as i32)?;

                let after_loop = self.position();
                self.code[start + 1] = after_loop as i32;
                trace!(start, end, after_loop, "patched loop");
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Result<Vec<i32>, CompilationError> {
        let end = self.position();
        std::mem::take(&mut self.loops).finish(end)?;
        self.emit_op(Opcode::Stop)?;

        Ok(self.code)
    }
}

/// Prints [InterpretedProgram] in a pseudo-assembly format.
impl fmt::Display for InterpretedProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut position = 0;
        while position < self.bytecode.len() {
            match self.decode(position) {
                Ok(instr) => {
                    writeln!(f, "{:4}: {}", position, instr)?;
                    position += instr.opcode().width();
                }
                Err(_) => {
                    writeln!(f, "{:4}: .word {:#010x}", position, self.bytecode[position])?;
                    position += 1;
                }
            }
        }

        Ok(())
    }
}

impl Bytecode {
    pub fn opcode(&self) -> Opcode {
        match self {
            Bytecode::Stop => Opcode::Stop,
            Bytecode::JumpForward(_) => Opcode::JumpForward,
            Bytecode::JumpBack(_) => Opcode::JumpBack,
            Bytecode::GetChar => Opcode::GetChar,
            Bytecode::PutChar => Opcode::PutChar,
            Bytecode::ValAdd(_) => Opcode::ValAdd,
            Bytecode::ValInc => Opcode::ValInc,
            Bytecode::ValDec => Opcode::ValDec,
            Bytecode::PosAdd(_) => Opcode::PosAdd,
            Bytecode::PosInc => Opcode::PosInc,
            Bytecode::PosDec => Opcode::PosDec,
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Bytecode::*;
        match self {
            Stop => write!(f, "stop"),
            JumpForward(target) => write!(f, "beq {}", target),
            JumpBack(offset) => write!(f, "bne {:+}", offset),
            GetChar => write!(f, "getchar [bp]"),
            PutChar => write!(f, "putchar [bp]"),
            ValAdd(amount) => write!(f, "[bp] <- [bp] + #{}", amount),
            ValInc => write!(f, "inc [bp]"),
            ValDec => write!(f, "dec [bp]"),
            PosAdd(amount) => write!(f, "bp <- bp + #{}", amount),
            PosInc => write!(f, "inc bp"),
            PosDec => write!(f, "dec bp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate, Reason};
    use Opcode::*;

    fn compile(source: &[u8]) -> Result<InterpretedProgram, CompilationError> {
        InterpretedProgram::compile(aggregate(source), &Limits::default())
    }

    fn run(source: &[u8], input: &[u8]) -> (Vec<u8>, Tape) {
        let program = compile(source).unwrap();
        let mut tape = Tape::new();
        let mut input = input;
        let mut output = Vec::new();
        program
            .run_with_io(&mut tape, &mut input, &mut output)
            .unwrap();
        (output, tape)
    }

    #[test]
    fn unit_steps_take_one_word_and_others_two() {
        let program = compile(b"+>-<++>>>").unwrap();
        assert_eq!(
            vec![
                ValInc as i32,
                PosInc as i32,
                ValDec as i32,
                PosDec as i32,
                ValAdd as i32,
                2,
                PosAdd as i32,
                3,
                Stop as i32
            ],
            program.words()
        );
    }

    #[test]
    fn loop_jumps_are_backpatched() {
        let program = compile(b"+[-]").unwrap();
        // 0: inc; 1: jf 6; 3: dec; 4: jb -3; 6: stop
        assert_eq!(
            vec![
                ValInc as i32,
                JumpForward as i32,
                6,
                ValDec as i32,
                JumpBack as i32,
                -3,
                Stop as i32
            ],
            program.words()
        );
    }

    #[test]
    fn jump_targets_land_after_the_matching_jump() {
        let program = compile(b"[>[-]<[+]]").unwrap();
        let words = program.words();

        let mut position = 0;
        while position < words.len() {
            match program.decode(position).unwrap() {
                Bytecode::JumpForward(target) => {
                    // the word just before the target is the matching backward jump's operand
                    assert_eq!(JumpBack as i32, words[target - 2]);
                    let back = target - 2;
                    let reentry = (back + 2) as i32 + words[back + 1];
                    assert_eq!(position as i32 + 2, reentry);
                }
                Bytecode::Stop => break,
                _ => (),
            }
            position += program.decode(position).unwrap().opcode().width();
        }
    }

    #[test]
    fn counting_loop_runs_to_zero() {
        let (output, tape) = run(b"++++[-]", b"");
        assert!(output.is_empty());
        assert_eq!(0, tape[0]);
    }

    #[test]
    fn echo_one_byte() {
        let (output, _) = run(b",.", b"A");
        assert_eq!(b"A".to_vec(), output);
    }

    #[test]
    fn nested_multiplication() {
        let (output, tape) = run(b"++++[>++++<-]>.", b"");
        assert_eq!(vec![16], output);
        assert_eq!(0, tape[0]);
        assert_eq!(16, tape[1]);
    }

    #[test]
    fn long_runs_wrap_the_cell() {
        let source = vec![b'+'; 5000];
        let (_, tape) = run(&source, b"");
        assert_eq!((5000 % 256) as u8, tape[0]);
    }

    #[test]
    fn end_of_input_reads_as_zero() {
        let (_, tape) = run(b"+,", b"");
        assert_eq!(0, tape[0]);
    }

    #[test]
    fn empty_loop_is_skipped_on_zero() {
        let (output, _) = run(b"[.]+.", b"");
        assert_eq!(vec![1], output);
    }

    #[test]
    fn loop_body_runs_once_before_retesting() {
        // The body clears the cell, so it must run exactly once.
        let (output, _) = run(b"+[.-]", b"");
        assert_eq!(vec![1], output);
    }

    #[test]
    fn pointer_wraps_around_the_tape() {
        let (_, tape) = run(b"<+++", b"");
        assert_eq!(3, tape[crate::TAPE_SIZE - 1]);

        let (_, tape) = run(b"<>>+", b"");
        assert_eq!(1, tape[1]);
    }

    #[test]
    fn unmatched_brackets_produce_no_program() {
        assert_eq!(Reason::UnmatchedClose, compile(b"+]").unwrap_err().reason());
        assert_eq!(Reason::UnmatchedOpen(2), compile(b"[[]+[").unwrap_err().reason());
    }

    #[test]
    fn finishing_checks_loops_then_appends_the_stop_word() {
        let program = compile(b"[[-]]").unwrap();
        assert_eq!(Some(&(Stop as i32)), program.words().last());

        let error = compile(b"[[-]").unwrap_err();
        assert_eq!(Reason::UnmatchedOpen(1), error.reason());
    }

    #[test]
    fn capacity_counts_the_stop_word() {
        let limits = Limits {
            max_program_words: 3,
        };
        assert!(InterpretedProgram::compile(aggregate(b"+>+"), &limits).is_err());
        assert!(InterpretedProgram::compile(aggregate(b"+>"), &limits).is_ok());

        let error = InterpretedProgram::compile(aggregate(b"[+]"), &limits).unwrap_err();
        assert_eq!(Reason::ProgramTooLarge, error.reason());
    }

    #[test]
    fn unknown_opcode_reports_its_position() {
        let program = InterpretedProgram::from_words(vec![ValInc as i32, 42, Stop as i32]);
        let mut tape = Tape::new();
        let error = program
            .run_with_io(&mut tape, &mut &b""[..], &mut Vec::<u8>::new())
            .unwrap_err();

        assert!(matches!(
            error,
            Error::UnknownOpcode {
                position: 1,
                word: 42
            }
        ));
        assert_eq!(1, tape[0]);
    }

    #[test]
    fn truncated_operand_is_reported() {
        let program = InterpretedProgram::from_words(vec![ValAdd as i32]);
        let error = program
            .run_with_io(&mut Tape::new(), &mut &b""[..], &mut Vec::<u8>::new())
            .unwrap_err();
        assert!(matches!(error, Error::UnknownOpcode { position: 0, .. }));
    }

    #[test]
    fn disassembly_lists_every_instruction() {
        let listing = compile(b"++[>+<-]").unwrap().to_string();
        let expected = "   0: [bp] <- [bp] + #2\n\
                        \x20  2: beq 10\n\
                        \x20  4: inc bp\n\
                        \x20  5: inc [bp]\n\
                        \x20  6: dec bp\n\
                        \x20  7: dec [bp]\n\
                        \x20  8: bne -6\n\
                        \x20 10: stop\n";
        assert_eq!(expected, listing);
    }
}
