//! ARM64 instruction encoding.
//!
//! Pure functions from (mnemonic, operands) to semantically-tagged 32-bit
//! instruction records, immediate legality queries (ADD/SUB 12-bit and the
//! logical bitmask encoding), and the instruction stream the rest of the
//! backend operates on. Nothing here allocates registers or resolves
//! addresses; relocations are left for the linker.

pub mod encode;
pub mod imm;
pub mod instruction;
pub mod stream;

pub use imm::{can_encode_as_immediate, encode_logical_immediate};
pub use instruction::{
    Arrangement, Cond, FP_REG_BASE, Instruction, JitAttribute, NO_REG, Opcode, Relocation,
    Segment, ZR, decode_branch_offset, is_fp_reg,
};
pub use stream::{InstructionStream, LabelAllocator};
