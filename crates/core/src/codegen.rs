//! Generates AArch64 machine code for a given program.

use tracing::{debug, trace};

use crate::asm::aarch64::{AArch64Assembly, IMM12_MAX, W, X};
use crate::code_buffer::{CodeBuffer, WordOffset};
use crate::errors::CompilationError;
use crate::ir::Op;
use crate::loops::LoopStack;
use crate::tape::TAPE_BITS;
use crate::Limits;

// REGISTERS:
//
// x0                 - opaque token: the I/O context (never touched by generated code)
// x1                 - current pointer on the "tape"
const ADDR: X = X(1);
// x2                 - putchar trampoline
const PUTCHAR: X = X(2);
// x3                 - getchar trampoline
const GETCHAR: X = X(3);
//
// None of x0-x3 is saved by the callee according to the calling convention, yet all four stay
// live for the whole program. The trampolines in `crate::trampoline` load all four back before
// returning, so a `blr` to either one leaves them exactly as they were.
//
// x4                 - working byte
const VAL: W = W(4);
// x9                 - next value of the tape pointer, before wrapping
const NEXT_ADDR: X = X(9);
//
// x29                - frame pointer
const FP: X = X(29);
// x30                - link register
const LR: X = X(30);
//
// x31                - stack pointer or zero, depending on context
const SP: X = X(31);
// see: https://en.wikipedia.org/wiki/Calling_convention#ARM_(A64)

/// Takes aggregated ops and compiles them to a function with the signature:
///
/// ```text
/// extern "C" fn(token: *mut c_void, tape: *mut u8, putchar: Trampoline, getchar: Trampoline)
/// ```
pub struct CodeGenerator {
    asm: AArch64Assembly,
    loops: LoopStack<WordOffset>,
}

impl CodeGenerator {
    pub fn new(limits: &Limits) -> Self {
        CodeGenerator {
            asm: AArch64Assembly::new(limits.max_program_words),
            loops: LoopStack::new(),
        }
    }

    pub fn compile<I>(mut self, ops: I) -> Result<CodeBuffer, CompilationError>
    where
        I: IntoIterator<Item = Op>,
    {
        self.setup_frame()?;

        for op in ops {
            self.generate_instructions(op)?;
        }

        let end = self.asm.position().to_index();
        std::mem::take(&mut self.loops).finish(end)?;
        self.restore_frame_and_return()?;

        let code = self.asm.finish();
        debug!(instructions = code.len(), "generated native code");

        Ok(code)
    }

    // STACK
    //
    // $fp == $sp + 0x00 [previous  fp] | Frame record
    //        $sp + 0x08 [previous  lr] |

    fn setup_frame(&mut self) -> Result<(), CompilationError> {
        // stp x29, x30, [sp, #-0x10]!
        self.asm.stp_preindex(FP, LR, SP, -0x10)?;
        // Let the frame pointer point to the current frame record
        // -- this allows backtraces to work, since the frame pointer,
        //    and all the frame records is a linked-list of stack frames
        // mov x29, sp
        self.asm.add64(FP, SP, 0)?;

        Ok(())
    }

    fn restore_frame_and_return(&mut self) -> Result<(), CompilationError> {
        // ldp x29, x30, [sp], #0x10
        self.asm.ldp_postindex(FP, LR, SP, 0x10)?;
        self.asm.ret()?;

        Ok(())
    }

    fn generate_instructions(&mut self, op: Op) -> Result<(), CompilationError> {
        match op {
            Op::ChangeVal(x) => {
                // w4 <- *p
                self.asm.ldrb(VAL, ADDR, 0)?;
                for chunk in split_immediate(x.unsigned_abs()) {
                    if x > 0 {
                        self.asm.add(VAL, VAL, chunk)?;
                    } else {
                        self.asm.sub(VAL, VAL, chunk)?;
                    }
                }
                // *p <- w4
                self.asm.strb(VAL, ADDR, 0)?;
            }
            Op::ChangeAddr(x) => {
                self.asm.mov(NEXT_ADDR, ADDR)?;
                for chunk in split_immediate(x.unsigned_abs()) {
                    if x > 0 {
                        self.asm.add64(NEXT_ADDR, NEXT_ADDR, chunk)?;
                    } else {
                        self.asm.sub64(NEXT_ADDR, NEXT_ADDR, chunk)?;
                    }
                }
                // The tape is aligned to its size, so the low bits are the cell index and the
                // high bits are the tape itself. Only the index may change.
                self.asm.bfxil(ADDR, NEXT_ADDR, TAPE_BITS as u8)?;
            }
            Op::PutChar => {
                self.asm.blr(PUTCHAR)?;
            }
            Op::GetChar => {
                self.asm.blr(GETCHAR)?;
            }
            Op::StartLoop => {
                // ldrb     w4, [x1]
                self.asm.ldrb(VAL, ADDR, 0)?;
                // cbz      w4, <after the loop>
                let branch = self.asm.placeholder()?;
                self.loops.push(branch);
            }
            Op::EndLoop => {
                let branch = self.loops.pop(self.asm.position().to_index())?;
                // Back to the ldrb, so the cell is loaded again before it is tested.
                let load = WordOffset(branch.0 - 1);
                self.asm.b(load)?;

                let after_loop = self.asm.position();
                self.asm.patch_cbz(branch, VAL, after_loop)?;
                trace!(?branch, ?after_loop, "patched loop");
            }
        }

        Ok(())
    }
}

/// Splits an amount into chunks that fit an `add`/`sub` immediate: as many [IMM12_MAX] as
/// needed, then whatever is left over (unless nothing is).
pub fn split_immediate(magnitude: u32) -> impl Iterator<Item = u16> {
    let max = IMM12_MAX as u32;
    let full = (magnitude / max) as usize;
    let rest = (magnitude % max) as u16;

    std::iter::repeat(IMM12_MAX)
        .take(full)
        .chain(Some(rest).filter(|&rest| rest != 0))
}
