//! Assembler for ARM AArch64

use std::fmt;

use tracing::trace;

use crate::code_buffer::{CodeBuffer, WordOffset};
use crate::errors::{CompilationError, Reason};

// Every emitted instruction is traced in assembly syntax.
macro_rules! asm {
    ($($fmt: expr),+) => {{
        trace!(target: "tapejit::asm", $($fmt),+);
    }};
}

/// Reference to 64-bit register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X(pub u8);

/// Reference to low 32-bits of the register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct W(pub u8);

/// An immediate value in the instruction.
#[derive(Clone, Copy)]
pub struct Imm(pub u8, pub i32);

/// An unsigned immediate value in the instruction.
#[derive(Clone, Copy)]
pub struct Umm(pub u8, pub u32);

/// The largest value an `add`/`sub` immediate can hold.
pub const IMM12_MAX: u16 = 0xfff;

/// Generates ARM AArch64 machine code.
pub struct AArch64Assembly {
    code: CodeBuffer,
}

impl AArch64Assembly {
    // I'm using bit groupings used in the ARM binary encoding spec, which are NOT 4 bit aligned!
    #![allow(clippy::unusual_byte_groupings)]

    pub fn new(capacity: usize) -> Self {
        AArch64Assembly {
            code: CodeBuffer::new(capacity),
        }
    }

    /// Where the next instruction will go.
    pub fn position(&self) -> WordOffset {
        self.code.position()
    }

    /// Returns machine code.
    pub fn finish(self) -> CodeBuffer {
        self.code
    }

    /// Reserves one word to be patched later. Until then it holds `udf #0`, which traps.
    pub fn placeholder(&mut self) -> Result<WordOffset, CompilationError> {
        asm!("udf #0 ; placeholder");
        self.emit(0)
    }

    // Instructions
    //
    // The following instructions are in the order given by
    // Chapter C3 - A64 Instruction Set Encoding

    // Branch, exception generation, and system instructions //////////////////////////////////////

    /// Turns the placeholder at `at` into "Compare register and Branch if Zero" to `target`.
    pub fn patch_cbz(
        &mut self,
        at: WordOffset,
        rt: W,
        target: WordOffset,
    ) -> Result<(), CompilationError> {
        asm!("{}: cbz {}, {}", at.0, rt, target.0);
        //          sf ______ op              imm19    rt
        //                      23                5 4   0
        let base = 0b0_011010_0_0000000000000000000_00000;
        let offset = Self::branch_offset(19, at, target)?;
        self.code
            .patch_at(at, base | Imm(19, offset).at(5..=23) | rt.at(0..=4));

        Ok(())
    }

    /// Unconditional branch
    pub fn b(&mut self, target: WordOffset) -> Result<WordOffset, CompilationError> {
        asm!("b {}", target.0);
        //          op                            imm26
        let base = 0b0_00101_00000000000000000000000000;
        let offset = Self::branch_offset(26, self.position(), target)?;
        self.emit(base | Imm(26, offset).at(0..=25))
    }

    /// Branch and Link to Register
    pub fn blr(&mut self, rn: X) -> Result<WordOffset, CompilationError> {
        asm!("blr {}", rn);
        //                   opc    op2    op3    rn   op4;
        let base = 0b1101011_0001_11111_000000_00000_00000;
        self.emit(base | rn.at(5..=9))
    }

    /// ret (return from subroutine)
    pub fn ret(&mut self) -> Result<WordOffset, CompilationError> {
        asm!("ret x30");
        let base = 0b1101011_0010_11111_000000_00000_00000;
        self.emit(base | X(30).at(5..=9))
    }

    // Load and stores ////////////////////////////////////////////////////////////////////////////

    // Load/store register (unsigned immediate)

    /// Store Register Byte (immediate)
    /// https://developer.arm.com/documentation/100076/0100/a64-instruction-set-reference/a64-data-transfer-instructions/strb--immediate-?lang=en
    pub fn strb(&mut self, wt: W, xn: X, offset: u16) -> Result<WordOffset, CompilationError> {
        asm!("strb {}, [{}, #{}]", wt, xn, offset);
        // Byte accesses are not scaled: the offset is the byte offset.
        //         size     V   opc        imm12    rn    rt
        let base = 0b00_111_0_01_00_000000000000_00000_00000;
        self.emit(base | wt.at(0..=4) | xn.at(5..=9) | Umm(12, offset as u32).at(10..=21))
    }

    /// Load Register Byte (immediate)
    pub fn ldrb(&mut self, wt: W, xn: X, offset: u16) -> Result<WordOffset, CompilationError> {
        asm!("ldrb {}, [{}, #{}]", wt, xn, offset);
        //         size     V   opc        imm12    rn    rt
        let base = 0b00_111_0_01_01_000000000000_00000_00000;
        self.emit(base | wt.at(0..=4) | xn.at(5..=9) | Umm(12, offset as u32).at(10..=21))
    }

    /// Store dword register with immediate offset
    /// https://developer.arm.com/documentation/dui0802/a/CIHGJHED
    #[cfg(test)]
    pub fn str_imm(&mut self, rt: X, rn: X, offset: u16) -> Result<WordOffset, CompilationError> {
        asm!("str {}, [{}, #{}]", rt, rn, offset);
        // Offset is described in bytes, but must be 8-byte aligned (lower 3 bits are implied 0)
        let dword_aligned_offset = (offset >> 3) as u32;
        //         size     V   opc        imm12    rn    rt
        let base = 0b11_111_0_01_00_000000000000_00000_00000;
        self.emit(base | rt.at(0..=4) | rn.at(5..=9) | Umm(12, dword_aligned_offset).at(10..=21))
    }

    // Load/store register pair (post-index)
    // post-index means that the dword-aligned offset will be added
    // AFTER indexing (e.g., like *p++ in C).

    /// Load pair of registers (post-index)
    pub fn ldp_postindex(
        &mut self,
        rt1: X,
        rt2: X,
        rn: X,
        imm: i16,
    ) -> Result<WordOffset, CompilationError> {
        asm!("ldp {}, {}, [{}], #{}", rt1, rt2, rn, imm);
        //          opc     V     L    imm7   rt2    rn    rt
        let base = 0b10_101_0_001_1_0000000_00000_00000_00000;
        // Offset is described in bytes, but must be 8-byte aligned (lower 3 bits are implied 0)
        let dword_aligned_offset = (imm >> 3) as i32;
        self.emit(
            base | rt1.at(0..=4)
                | rn.at(5..=9)
                | rt2.at(10..=14)
                | Imm(7, dword_aligned_offset).at(15..=21),
        )
    }

    // Load/store register pair (pre-indexed)
    // The dword-aligned offset index is added

    /// Store Pair of registers (pre-indexed)
    pub fn stp_preindex(
        &mut self,
        rt1: X,
        rt2: X,
        rn: X,
        imm: i16,
    ) -> Result<WordOffset, CompilationError> {
        // https://developer.arm.com/documentation/102374/0101/Loads-and-stores---addressing
        asm!("stp {}, {}, [{}, #{}]!", rt1, rt2, rn, imm);
        //          opc     V     L    imm7   rt2    rn    rt
        let base = 0b10_101_0_011_0_0000000_00000_00000_00000;
        // Offset is described in bytes, but must be 8-byte aligned (lower 3 bits are implied 0)
        let dword_aligned_offset = (imm >> 3) as i32;
        self.emit(
            base | rt1.at(0..=4)
                | rn.at(5..=9)
                | rt2.at(10..=14)
                | Imm(7, dword_aligned_offset).at(15..=21),
        )
    }

    // Data processing -- immediate ///////////////////////////////////////////////////////////////

    pub fn add(&mut self, wd: W, wn: W, imm: u16) -> Result<WordOffset, CompilationError> {
        asm!("add {}, {}, #{}", wd, wn, imm);
        //          sfop S       <<        imm12 Rn    Rd
        let base = 0b0_0_0_10001_00_000000000000_00000_00000;
        self.emit(base | Self::imm12(imm).at(10..=21) | wn.at(5..=9) | wd.at(0..=4))
    }

    pub fn add64(&mut self, xd: X, xn: X, imm: u16) -> Result<WordOffset, CompilationError> {
        asm!("add {}, {}, #{}", xd, xn, imm);
        //          sfop S       <<        imm12 Rn    Rd
        let base = 0b1_0_0_10001_00_000000000000_00000_00000;
        self.emit(base | Self::imm12(imm).at(10..=21) | xn.at(5..=9) | xd.at(0..=4))
    }

    /// Subract (immediate)
    /// https://developer.arm.com/documentation/100076/0100/a64-instruction-set-reference/a64-general-instructions/sub--immediate-?lang=en
    pub fn sub(&mut self, wd: W, wn: W, imm: u16) -> Result<WordOffset, CompilationError> {
        asm!("sub {}, {}, #{}", wd, wn, imm);
        //          sfop S       <<        imm12 Rn    Rd
        let base = 0b0_1_0_10001_00_000000000000_00000_00000;
        self.emit(base | Self::imm12(imm).at(10..=21) | wn.at(5..=9) | wd.at(0..=4))
    }

    pub fn sub64(&mut self, xd: X, xn: X, imm: u16) -> Result<WordOffset, CompilationError> {
        asm!("sub {}, {}, #{}", xd, xn, imm);
        //          sfop S       <<        imm12 Rn    Rd
        let base = 0b1_1_0_10001_00_000000000000_00000_00000;
        self.emit(base | Self::imm12(imm).at(10..=21) | xn.at(5..=9) | xd.at(0..=4))
    }

    /// Bitfield extract and insert low: copies bits `0..width` of `xn` into `xd`, keeping the
    /// rest of `xd`. (Secretly BFM.)
    pub fn bfxil(&mut self, xd: X, xn: X, width: u8) -> Result<WordOffset, CompilationError> {
        asm!("bfxil {}, {}, #0, #{}", xd, xn, width);
        assert!((1..=64).contains(&width), "bitfield width out of range");
        //          sfopc        N  immr   imms   rn    rd
        let base = 0b1_01_100110_1_000000_000000_00000_00000;
        self.emit(base | Umm(6, (width - 1) as u32).at(10..=15) | xn.at(5..=9) | xd.at(0..=4))
    }

    // Data processing -- register ////////////////////////////////////////////////////////////////

    /// Move register (shh! this is secretly ORR)
    pub fn mov(&mut self, rd: X, rm: X) -> Result<WordOffset, CompilationError> {
        asm!("mov {0}, {1} ; orr {0}, xzr, {1}", rd, rm);
        //          sf op       << N    rm   imm6    rn    rd
        let base = 0b1_01_01010_00_0_00000_000000_00000_00000;
        self.emit(base | rm.at(16..=20) | X(31).at(5..=9) | rd.at(0..=4))
    }

    // Private methods ////////////////////////////////////////////////////////////////////////////

    fn emit(&mut self, instruction: u32) -> Result<WordOffset, CompilationError> {
        self.code.emit(instruction)
    }

    fn imm12(imm: u16) -> Umm {
        assert!(imm <= IMM12_MAX, "immediate does not fit in 12 bits");
        Umm(12, imm as u32)
    }

    /// The signed instruction count from `from` to `to`, if it fits in `bits`.
    fn branch_offset(bits: u8, from: WordOffset, to: WordOffset) -> Result<i32, CompilationError> {
        let offset = to - from;
        let limit = 1i32 << (bits - 1);
        if offset < -limit || offset >= limit {
            return Err(CompilationError::new(
                Reason::BranchOutOfRange,
                from.to_index(),
            ));
        }

        Ok(offset)
    }
}

/////////////////////////////////// Traits and implementations ////////////////////////////////////

trait BitPack: Copy {
    fn to_u32(self) -> u32;
    fn expected_size(self) -> u8;
    fn at(self, bits: std::ops::RangeInclusive<u8>) -> u32 {
        assert_eq!(
            1 + bits.end() - bits.start(),
            self.expected_size(),
            "unexpected size of bits for type"
        );
        self.to_u32() << bits.start()
    }
}

impl BitPack for X {
    fn to_u32(self) -> u32 {
        self.0 as u32
    }
    fn expected_size(self) -> u8 {
        5
    }
}

impl BitPack for W {
    fn to_u32(self) -> u32 {
        self.0 as u32
    }
    fn expected_size(self) -> u8 {
        5
    }
}

impl BitPack for Imm {
    fn to_u32(self) -> u32 {
        let raw_bits = self.1 as u32;
        // Keep only the bits that contribute to the immediate value:
        let mask = 2u32.pow(self.expected_size() as u32) - 1;
        mask & raw_bits
    }
    fn expected_size(self) -> u8 {
        self.0
    }
}

impl BitPack for Umm {
    fn to_u32(self) -> u32 {
        self.1
    }
    fn expected_size(self) -> u8 {
        self.0
    }
}

impl fmt::Display for W {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

impl fmt::Display for X {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 == 31 {
            write!(f, "sp")
        } else {
            write!(f, "x{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP: X = X(31);

    /// Assembles one instruction and returns its encoding.
    fn encode(f: impl FnOnce(&mut AArch64Assembly) -> Result<WordOffset, CompilationError>) -> u32 {
        let mut asm = AArch64Assembly::new(16);
        f(&mut asm).unwrap();
        asm.finish().words()[0]
    }

    #[test]
    fn frame_setup_and_teardown() {
        assert_eq!(0xa9bf7bfd, encode(|a| a.stp_preindex(X(29), X(30), SP, -16)));
        assert_eq!(0x910003fd, encode(|a| a.add64(X(29), SP, 0)));
        assert_eq!(0xa8c17bfd, encode(|a| a.ldp_postindex(X(29), X(30), SP, 16)));
        assert_eq!(0xd65f03c0, encode(|a| a.ret()));
    }

    #[test]
    fn byte_loads_and_stores() {
        assert_eq!(0x39400024, encode(|a| a.ldrb(W(4), X(1), 0)));
        assert_eq!(0x39000024, encode(|a| a.strb(W(4), X(1), 0)));
        assert_eq!(0xf9000421, encode(|a| a.str_imm(X(1), X(1), 8)));
    }

    #[test]
    fn immediate_arithmetic() {
        assert_eq!(0x11000484, encode(|a| a.add(W(4), W(4), 1)));
        assert_eq!(0x51000484, encode(|a| a.sub(W(4), W(4), 1)));
        assert_eq!(0x913ffd29, encode(|a| a.add64(X(9), X(9), IMM12_MAX)));
        assert_eq!(0xd1000529, encode(|a| a.sub64(X(9), X(9), 1)));
    }

    #[test]
    fn register_moves() {
        assert_eq!(0xaa0103e9, encode(|a| a.mov(X(9), X(1))));
        assert_eq!(0xb3403d21, encode(|a| a.bfxil(X(1), X(9), 16)));
    }

    #[test]
    fn calls() {
        assert_eq!(0xd63f0040, encode(|a| a.blr(X(2))));
        assert_eq!(0xd63f0060, encode(|a| a.blr(X(3))));
    }

    #[test]
    fn branches_are_relative_to_themselves() {
        let mut asm = AArch64Assembly::new(16);
        let hole = asm.placeholder().unwrap();
        asm.ret().unwrap();
        asm.b(WordOffset(0)).unwrap();
        let after = asm.position();
        asm.patch_cbz(hole, W(4), after).unwrap();

        let code = asm.finish();
        // cbz w4, +3
        assert_eq!(0x34000064, code.words()[0]);
        // b -2
        assert_eq!(0x17fffffe, code.words()[2]);
    }

    #[test]
    fn branches_that_do_not_fit_are_rejected() {
        let mut asm = AArch64Assembly::new(16);
        let hole = asm.placeholder().unwrap();
        let error = asm
            .patch_cbz(hole, W(4), WordOffset(1 << 18))
            .unwrap_err();
        assert_eq!(Reason::BranchOutOfRange, error.reason());

        assert!(asm.patch_cbz(hole, W(4), WordOffset((1 << 18) - 1)).is_ok());
    }
}
