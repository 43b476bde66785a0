//! Memory access patterns.

use super::{code_window, reg_dead_after};
use crate::{MatchResult, Pattern};
use core_encoder::encode;
use core_encoder::instruction::{Instruction, Opcode};

/// STR Rs,[b,#o]; LDR Rd,[b,#o]  →  STR Rs,[b,#o]; MOV Rd,Rs.
pub fn load_after_store() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (st, ld) = (&w[0], &w[1]);
        st.opcode == Opcode::Str && ld.opcode == Opcode::Ldr && st.same_address(ld)
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
        Box::new(|instrs, pos| {
            let (st, ld) = (&instrs[pos], &instrs[pos + 1]);
            if ld.dest_reg == st.dest_reg {
                vec![st.clone()]
            } else {
                vec![st.clone(), encode::mov_reg(ld.dest_reg, st.dest_reg)]
            }
        }),
        "load-after-store forwarding",
    )
}

/// Two adjacent LDRs of the same address into the same register: the
/// second is redundant. The first load's destination must not feed the
/// second load's addressing (pointer chase).
pub fn redundant_load_elimination() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (a, b) = (&w[0], &w[1]);
        if a.opcode != Opcode::Ldr || b.opcode != Opcode::Ldr {
            return false;
        }
        if !a.same_address(b) || a.dest_reg != b.dest_reg {
            return false;
        }
        // A load whose destination is the base of the next load is a
        // dereference chain, not a repeat.
        !Instruction::same_register(a.dest_reg, b.base_reg)
            && !Instruction::same_register(a.dest_reg, b.src_reg2)
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
        Box::new(|instrs, pos| vec![instrs[pos].clone()]),
        "redundant load elimination",
    )
}

/// STR a,[b,#o]; STR c,[b,#o]: the first store is dead.
pub fn dead_store_elimination() -> Pattern {
    Pattern::new(
        2,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 2) else {
                return MatchResult::NO;
            };
            let (a, b) = (&w[0], &w[1]);
            if a.opcode == Opcode::Str && b.opcode == Opcode::Str && a.same_address(b) {
                MatchResult::hit(2)
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| vec![instrs[pos + 1].clone()]),
        "dead store elimination",
    )
}

/// LDR Rs,[b,#o]; MOV Rd,Rs with a dead scratch loads straight into Rd.
pub fn load_through_scratch() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (ld, mv) = (&w[0], &w[1]);
        ld.opcode == Opcode::Ldr
            && mv.opcode == Opcode::Mov
            && Instruction::same_register(mv.src_reg1, ld.dest_reg)
            && mv.dest_reg != ld.dest_reg
            && reg_dead_after(instrs, pos + 2, ld.dest_reg, 10)
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
        Box::new(|instrs, pos| {
            let (ld, mv) = (&instrs[pos], &instrs[pos + 1]);
            vec![encode::ldr_imm(mv.dest_reg, ld.base_reg, ld.immediate)]
        }),
        "load through scratch register",
    )
}

/// MOVZ Rs,#c; MOV Rd,Rs with a dead scratch materializes directly.
/// The forward liveness check is bounded by ten instructions or the
/// scratch register's redefinition.
pub fn movz_scratch_fusion() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (mz, mv) = (&w[0], &w[1]);
        mz.opcode == Opcode::Movz
            && mv.opcode == Opcode::Mov
            && Instruction::same_register(mv.src_reg1, mz.dest_reg)
            && mv.dest_reg != mz.dest_reg
            && reg_dead_after(instrs, pos + 2, mz.dest_reg, 10)
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
        Box::new(|instrs, pos| {
            let (mz, mv) = (&instrs[pos], &instrs[pos + 1]);
            vec![encode::movz(mv.dest_reg, mz.immediate as u16, 0)]
        }),
        "MOVZ scratch fusion",
    )
}

fn pair_offset_ok(offset: i64) -> bool {
    offset % 8 == 0 && (-512..=504).contains(&offset)
}

/// STR R1,[b,#o]; STR R2,[b,#o+8]  →  STP R1,R2,[b,#o].
pub fn str_pair_fusion() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (a, b) = (&w[0], &w[1]);
        a.opcode == Opcode::Str
            && b.opcode == Opcode::Str
            && Instruction::same_register(a.base_reg, b.base_reg)
            && b.immediate == a.immediate + 8
            && pair_offset_ok(a.immediate)
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
        Box::new(|instrs, pos| {
            let (a, b) = (&instrs[pos], &instrs[pos + 1]);
            vec![encode::stp(a.dest_reg, b.dest_reg, a.base_reg, a.immediate)]
        }),
        "STR/STR fusion into STP",
    )
}

/// LDR R1,[b,#o]; LDR R2,[b,#o+8]  →  LDP R1,R2,[b,#o].
pub fn ldr_pair_fusion() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> bool {
        let Some(w) = code_window(instrs, pos, 2) else {
            return false;
        };
        let (a, b) = (&w[0], &w[1]);
        a.opcode == Opcode::Ldr
            && b.opcode == Opcode::Ldr
            && Instruction::same_register(a.base_reg, b.base_reg)
            && b.immediate == a.immediate + 8
            && pair_offset_ok(a.immediate)
            && a.dest_reg != b.dest_reg
            // The first destination must not be the shared base.
            && !Instruction::same_register(a.dest_reg, a.base_reg)
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
        Box::new(|instrs, pos| {
            let (a, b) = (&instrs[pos], &instrs[pos + 1]);
            vec![encode::ldp(a.dest_reg, b.dest_reg, a.base_reg, a.immediate)]
        }),
        "LDR/LDR fusion into LDP",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_forwards_through_register() {
        let p = load_after_store();
        let instrs = vec![encode::str_imm(1, 29, 16), encode::ldr_imm(0, 29, 16)];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].opcode, Opcode::Mov);
        assert_eq!(out[1].src_reg1, 1);
    }

    #[test]
    fn pointer_chase_is_not_a_redundant_load() {
        let p = redundant_load_elimination();
        // ldr x1,[x2,#0]; ldr x1,[x1,#0]
        let instrs = vec![encode::ldr_imm(1, 2, 0), encode::ldr_imm(1, 1, 0)];
        assert!(!p.matches(&instrs, 0).matched);
    }

    #[test]
    fn repeated_load_is_eliminated() {
        let p = redundant_load_elimination();
        let instrs = vec![encode::ldr_imm(3, 29, 8), encode::ldr_imm(3, 29, 8)];
        assert!(p.matches(&instrs, 0).matched);
        assert_eq!(p.transform(&instrs, 0).len(), 1);
    }

    #[test]
    fn adjacent_stores_fuse_to_stp() {
        let p = str_pair_fusion();
        let instrs = vec![encode::str_imm(0, 31, 0), encode::str_imm(1, 31, 8)];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].opcode, Opcode::Stp);
    }

    #[test]
    fn intervening_load_blocks_dead_store() {
        let p = dead_store_elimination();
        let instrs = vec![
            encode::str_imm(0, 29, 0),
            encode::ldr_imm(5, 29, 0),
            encode::str_imm(1, 29, 0),
        ];
        assert!(!p.matches(&instrs, 0).matched);
    }
}
