//! Control-flow patterns.

use super::code_window;
use crate::{MatchResult, Pattern};
use core_encoder::encode;
use core_encoder::instruction::{Cond, Instruction, Opcode};

/// CMP Rn,#0 (or against XZR) followed by B.EQ/B.NE becomes CBZ/CBNZ.
pub fn compare_zero_branch() -> Pattern {
    fn applies(instrs: &[Instruction], pos: usize) -> Option<(i32, Cond, String)> {
        let w = code_window(instrs, pos, 2)?;
        let (cmp, br) = (&w[0], &w[1]);
        if cmp.opcode != Opcode::Cmp {
            return None;
        }
        let against_zero = (cmp.uses_immediate && cmp.immediate == 0)
            || (!cmp.uses_immediate && cmp.src_reg2 == core_encoder::ZR);
        if !against_zero || br.opcode != Opcode::BCond {
            return None;
        }
        match br.cond {
            Some(cond @ (Cond::Eq | Cond::Ne)) => {
                Some((cmp.src_reg1, cond, br.branch_target.clone()))
            }
            _ => None,
        }
    }
    Pattern::new(
        2,
        Box::new(|instrs, pos| match applies(instrs, pos) {
            Some(_) => MatchResult::hit(2),
            None => MatchResult::NO,
        }),
        Box::new(|instrs, pos| {
            let (reg, cond, target) = applies(instrs, pos).expect("matcher ran first");
            vec![match cond {
                Cond::Eq => encode::cbz(reg, target),
                _ => encode::cbnz(reg, target),
            }]
        }),
        "compare-zero branch to CBZ/CBNZ",
    )
}

/// B L1 where L1's first real instruction is B L2 rewrites to B L2.
pub fn branch_chaining() -> Pattern {
    fn final_target(instrs: &[Instruction], label: &str) -> Option<String> {
        let def = instrs
            .iter()
            .position(|i| i.is_label_definition && i.label == label)?;
        for i in &instrs[def + 1..] {
            if i.is_label_definition {
                continue;
            }
            if i.is_special() {
                continue;
            }
            if i.opcode == Opcode::B && i.branch_target != label {
                return Some(i.branch_target.clone());
            }
            break;
        }
        None
    }
    Pattern::new(
        1,
        Box::new(|instrs, pos| {
            let Some(w) = code_window(instrs, pos, 1) else {
                return MatchResult::NO;
            };
            let i = &w[0];
            if i.opcode == Opcode::B && !i.branch_target.is_empty() {
                match final_target(instrs, &i.branch_target) {
                    Some(_) => MatchResult::hit(1),
                    None => MatchResult::NO,
                }
            } else {
                MatchResult::NO
            }
        }),
        Box::new(|instrs, pos| {
            let target = final_target(instrs, &instrs[pos].branch_target)
                .expect("matcher ran first");
            vec![encode::b(target)]
        }),
        "branch chaining",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_zero_beq_becomes_cbz() {
        let p = compare_zero_branch();
        let instrs = vec![encode::cmp_imm(3, 0), encode::b_cond(Cond::Eq, "L_done")];
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].opcode, Opcode::Cbz);
        assert_eq!(out[0].src_reg1, 3);
        assert_eq!(out[0].branch_target, "L_done");
    }

    #[test]
    fn cmp_nonzero_is_untouched() {
        let p = compare_zero_branch();
        let instrs = vec![encode::cmp_imm(3, 5), encode::b_cond(Cond::Eq, "L")];
        assert!(!p.matches(&instrs, 0).matched);
    }

    #[test]
    fn chained_branch_skips_the_middle_hop() {
        let p = branch_chaining();
        let mut instrs = vec![encode::b("L1")];
        instrs.push(Instruction::label_def("L1"));
        instrs.push(encode::b("L2"));
        instrs.push(Instruction::label_def("L2"));
        instrs.push(encode::ret());
        assert!(p.matches(&instrs, 0).matched);
        let out = p.transform(&instrs, 0);
        assert_eq!(out[0].branch_target, "L2");
    }

    #[test]
    fn self_loop_is_not_chained() {
        let p = branch_chaining();
        let mut instrs = vec![encode::b("L1")];
        instrs.push(Instruction::label_def("L1"));
        instrs.push(encode::b("L1"));
        assert!(!p.matches(&instrs, 0).matched);
    }
}
