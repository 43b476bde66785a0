//! Simplification and constant-folding patterns.

use super::{code_window, reg_dead_after, retarget_dest};
use crate::{MatchResult, Pattern};
use core_encoder::encode;
use core_encoder::instruction::{Instruction, Opcode};

/// MOVZ a,#x; MOVZ b,#y; OP c,a,b with a foldable OP and a 16-bit result
/// becomes the two MOVZs plus MOVZ c,#result.
pub fn constant_folding() -> Pattern {
    fn fold(op: Opcode, a: i64, b: i64) -> Option<i64> {
        Some(match op {
            Opcode::Add => a.checked_add(b)?,
            Opcode::Sub => a.checked_sub(b)?,
            Opcode::Mul => a.checked_mul(b)?,
            Opcode::And => a & b,
            Opcode::Orr => a | b,
            Opcode::Eor => a ^ b,
            _ => return None,
        })
    }
    fn match_window(instrs: &[Instruction], pos: usize) -> Option<i64> {
        let w = code_window(instrs, pos, 3)?;
        let (mz1, mz2, op) = (&w[0], &w[1], &w[2]);
        if mz1.opcode != Opcode::Movz || mz2.opcode != Opcode::Movz {
            return None;
        }
        if op.uses_immediate || op.is_mem_op {
            return None;
        }
        if !(Instruction::same_register(op.src_reg1, mz1.dest_reg)
            && Instruction::same_register(op.src_reg2, mz2.dest_reg))
        {
            return None;
        }
        let result = fold(op.opcode, mz1.immediate, mz2.immediate)?;
        // Only a single-MOVZ result keeps the window from growing.
        (0..=0xFFFF).contains(&result).then_some(result)
    }
    Pattern::new(
        3,
        Box::new(|instrs, pos| match match_window(instrs, pos) {
            Some(_) => MatchResult::hit(3),
            None => MatchResult::NO,
        }),
        Box::new(|instrs, pos| {
            let result = match_window(instrs, pos).expect("matcher ran first");
            vec![
                instrs[pos].clone(),
                instrs[pos + 1].clone(),
                encode::movz(instrs[pos + 2].dest_reg, result as u16, 0),
            ]
        }),
        "constant folding of register arithmetic",
    )
}

/// ADD/SUB Rd,Rn,#0 becomes MOV (or disappears when Rd == Rn), and
/// SUB Rd,Rn,Rn becomes MOVZ Rd,#0.
pub fn identity_elimination() -> Pattern {
    fn classify(i: &Instruction) -> Option<Vec<Instruction>> {
        // Register 31 is SP in the ADD/SUB immediate forms; a MOV rewrite
        // would read XZR instead.
        if i.dest_reg == 31 || i.src_reg1 == 31 {
            return None;
        }
        match i.opcode {
            Opcode::Add | Opcode::Sub if i.uses_immediate && i.immediate == 0 => {
                if i.dest_reg == i.src_reg1 {
                    Some(vec![])
                } else {
                    Some(vec![encode::mov_reg(i.dest_reg, i.src_reg1)])
                }
            }
            Opcode::Sub
                if !i.uses_immediate
                    && Instruction::same_register(i.src_reg1, i.src_reg2) =>
            {
                Some(vec![encode::movz(i.dest_reg, 0, 0)])
            }
            _ => None,
        }
    }
    Pattern::new(
        1,
        Box::new(|instrs, pos| {
            match code_window(instrs, pos, 1).and_then(|w| classify(&w[0])) {
                Some(_) => MatchResult::hit(1),
                None => MatchResult::NO,
            }
        }),
        Box::new(|instrs, pos| classify(&instrs[pos]).expect("matcher ran first")),
        "identity operation elimination",
    )
}

/// Producer + MOV fusion: `op Rs, ...; mov Rd, Rs` retargets the producer
/// straight at Rd when the scratch is dead afterwards.
pub fn redundant_move() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (producer, mv) = (&w[0], &w[1]);
        if mv.opcode != Opcode::Mov || producer.opcode.is_branch() {
            return false;
        }
        if producer.opcode.is_store() || producer.dest_reg < 0 || producer.dest_reg == 31 {
            return false;
        }
        if !Instruction::same_register(mv.src_reg1, producer.dest_reg) {
            return false;
        }
        // The producer must not read its own destination (MOVK does).
        if producer.reads(producer.dest_reg) {
            return false;
        }
        if mv.dest_reg == producer.dest_reg {
            return false;
        }
        // The producer must not read the MOV's destination either, and the
        // scratch must be provably dead past the pair.
        !producer.reads(mv.dest_reg) && reg_dead_after(instrs, pos + 2, producer.dest_reg, 10)
    }
    Pattern::new(
        2,
        Box::new(|instrs, pos| {
            if applies(instrs, pos) {
                MatchResult::hit(2)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| vec![retarget_dest(&instrs[pos], instrs[pos + 1].dest_reg)]),
        "redundant move after producer",
    )
}

/// MOV Rd,Rd does nothing.
pub fn self_move_elimination() -> Pattern {
    Pattern::new(
        1,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 1) else {
                return MatchResult::NO;
            };
            let i = &w[0];
            if i.opcode == Opcode::Mov
                && Instruction::same_register(i.dest_reg, i.src_reg1)
            {
                MatchResult::hit(1)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|_, _| vec![]),
        "self-move elimination",
    )
}

/// Two identical adjacent MOVs: the second is dead.
pub fn identical_move_elimination() -> Pattern {
    Pattern::new(
        2,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 2) else {
                return MatchResult::NO;
            };
            let (a, b) = (&w[0], &w[1]);
            if a.opcode == Opcode::Mov
                && b.opcode == Opcode::Mov
                && a.dest_reg == b.dest_reg
                && a.src_reg1 == b.src_reg1
            {
                MatchResult::hit(2)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| vec![instrs[pos].clone()]),
        "identical move elimination",
    )
}

fn is_adrp_add_pair(a: &Instruction, b: &Instruction) -> bool {
    a.opcode == Opcode::Adrp
        && b.opcode == Opcode::Add
        && b.relocation == core_encoder::Relocation::Add12BitUnsignedOffset
        && a.target_label == b.target_label
        && Instruction::same_register(b.src_reg1, a.dest_reg)
        && Instruction::same_register(b.dest_reg, a.dest_reg)
}

/// ADRP Rd,L; ADD Rd,Rd,:lo12:L fuses to ADR Rd,L for labels inside the
/// JIT buffer (always within ADR range there; the linker still range
/// checks).
pub fn adr_fusion() -> Pattern {
    Pattern::new(
        2,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 2) else {
                return MatchResult::NO;
            };
            if is_adrp_add_pair(&w[0], &w[1]) {
                MatchResult::hit(2)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| {
            vec![encode::adr(
                instrs[pos].dest_reg,
                instrs[pos].target_label.clone(),
            )]
        }),
        "ADRP/ADD fusion into ADR",
    )
}

/// ADRP; ADD lo12; ADD #imm collapses to ADR; ADD #imm.
pub fn adrp_add_add_fusion() -> Pattern {
    Pattern::new(
        3,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 3) else {
                return MatchResult::NO;
            };
            let third = &w[2];
            if is_adrp_add_pair(&w[0], &w[1])
                && third.opcode == Opcode::Add
                && third.uses_immediate
                && third.relocation == core_encoder::Relocation::None
                && Instruction::same_register(third.src_reg1, w[1].dest_reg)
                && Instruction::same_register(third.dest_reg, w[1].dest_reg)
            {
                MatchResult::hit(3)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| {
            vec![
                encode::adr(instrs[pos].dest_reg, instrs[pos].target_label.clone()),
                instrs[pos + 2].clone(),
            ]
        }),
        "ADRP/ADD/ADD fusion",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_zero_becomes_mov() {
        let p = identity_elimination();
        let instrs = vec![encode::add_imm(0, 1, 0)];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].opcode, Opcode::Mov);
        assert_eq!(out[0].src_reg1, 1);
    }

    #[test]
    fn add_zero_to_self_disappears() {
        let p = identity_elimination();
        let instrs = vec![encode::add_imm(4, 4, 0)];
        assert!(p.matches(&instrs, 0).matched);
        assert!(p.transform(&instrs, 0).is_empty());
    }

    #[test]
    fn constant_fold_of_two_movz_feeds() {
        let p = constant_folding();
        let instrs = vec![
            encode::movz(1, 6, 0),
            encode::movz(2, 7, 0),
            encode::mul(0, 1, 2),
        ];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out[2].opcode, Opcode::Movz);
        assert_eq!(out[2].immediate, 42);
        assert_eq!(out[2].dest_reg, 0);
    }

    #[test]
    fn producer_mov_fusion_retargets() {
        let p = redundant_move();
        let instrs = vec![
            encode::add_reg(9, 1, 2),
            encode::mov_reg(0, 9),
            encode::ret(),
        ];
        // x9 read by nothing afterwards but RET stops the scan -> live.
        assert!(!p.matches(&instrs, 0).matched);
        let instrs = vec![
            encode::add_reg(9, 1, 2),
            encode::mov_reg(0, 9),
            encode::movz(9, 0, 0), // redefinition proves death
            encode::ret(),
        ];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dest_reg, 0);
        assert_eq!(out[0].encoding & 0x1F, 0);
    }
}
