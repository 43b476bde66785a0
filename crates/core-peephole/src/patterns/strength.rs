//! Strength reduction where a constant source is observable through MOVZ.
//!
//! The register-only multiply/divide variants that would need real constant
//! propagation stay out of the registry; these two only fire when the
//! constant producer is adjacent in the window.

use super::{code_window, power_of_two};
use crate::{MatchResult, Pattern};
use core_encoder::encode;
use core_encoder::instruction::{Instruction, Opcode};

fn movz_feeding(instrs: &[Instruction], pos: usize, op: Opcode) -> Option<u32> {
    let w = code_window(instrs, pos, 2)?;
    let (mz, arith) = (&w[0], &w[1]);
    if mz.opcode != Opcode::Movz || arith.opcode != op {
        return None;
    }
    // The constant must be the multiplier/divisor operand.
    if !Instruction::same_register(arith.src_reg2, mz.dest_reg) {
        return None;
    }
    // A reused multiplier register would change the later reader's value.
    if Instruction::same_register(arith.dest_reg, mz.dest_reg) {
        return None;
    }
    power_of_two(mz.immediate)
}

/// MOVZ Rm,#2^k; MUL Rd,Rn,Rm  →  MOVZ Rm,#2^k; LSL Rd,Rn,#k.
pub fn multiply_by_power_of_two() -> Pattern {
    Pattern::new(
        2,
        Box::new(|instrs, pos| match movz_feeding(instrs, pos, Opcode::Mul) {
            Some(_) => MatchResult::hit(2),
            None => MatchResult::NO,
        }),
        Box::new(|instrs, pos| {
            let k = movz_feeding(instrs, pos, Opcode::Mul).expect("matcher ran first");
            let arith = &instrs[pos + 1];
            vec![
                instrs[pos].clone(),
                encode::lsl_imm(arith.dest_reg, arith.src_reg1, k),
            ]
        }),
        "multiply by power of two",
    )
}

/// MOVZ Rm,#2^k; SDIV Rd,Rn,Rm  →  MOVZ Rm,#2^k; ASR Rd,Rn,#k.
pub fn divide_by_power_of_two() -> Pattern {
    Pattern::new(
        2,
        Box::new(|instrs, pos| match movz_feeding(instrs, pos, Opcode::Sdiv) {
            Some(_) => MatchResult::hit(2),
            None => MatchResult::NO,
        }),
        Box::new(|instrs, pos| {
            let k = movz_feeding(instrs, pos, Opcode::Sdiv).expect("matcher ran first");
            let arith = &instrs[pos + 1];
            vec![
                instrs[pos].clone(),
                encode::asr_imm(arith.dest_reg, arith.src_reg1, k),
            ]
        }),
        "divide by power of two",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_by_eight_becomes_shift() {
        let p = multiply_by_power_of_two();
        let instrs = vec![encode::movz(9, 8, 0), encode::mul(0, 1, 9)];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out[1].opcode, Opcode::Lsl);
        assert_eq!(out[1].immediate, 3);
    }

    #[test]
    fn mul_by_non_power_does_not_match() {
        let p = multiply_by_power_of_two();
        let instrs = vec![encode::movz(9, 6, 0), encode::mul(0, 1, 9)];
        assert!(!p.matches(&instrs, 0).matched);
    }

    #[test]
    fn multiplier_register_reuse_blocks_the_rewrite() {
        let p = multiply_by_power_of_two();
        let instrs = vec![encode::movz(9, 8, 0), encode::mul(9, 1, 9)];
        assert!(!p.matches(&instrs, 0).matched);
    }
}
