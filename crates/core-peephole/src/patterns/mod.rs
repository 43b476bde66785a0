//! The pattern catalog, organized by pipeline stage.

pub mod control;
pub mod memory;
pub mod simplify;
pub mod strength;

use core_encoder::instruction::{Instruction, Opcode, Segment};

/// Fetch `n` consecutive plain code instructions at `pos`, or nothing if
/// the window crosses a label, data word, directive, or segment change.
pub(crate) fn code_window(
    instructions: &[Instruction],
    pos: usize,
    n: usize,
) -> Option<&[Instruction]> {
    let window = instructions.get(pos..pos + n)?;
    window
        .iter()
        .all(|i| i.segment == Segment::Code && !i.is_special())
        .then_some(window)
}

/// Forward scan deciding whether `reg` is dead after `from` (exclusive).
/// Bounded to `limit` instructions; any label, branch, or end of scan is
/// treated as "still live" so the answer is conservative.
pub(crate) fn reg_dead_after(
    instructions: &[Instruction],
    from: usize,
    reg: i32,
    limit: usize,
) -> bool {
    for ins in instructions.iter().skip(from).take(limit) {
        if ins.is_label_definition {
            return false; // control flow can join here
        }
        if ins.is_special() {
            continue;
        }
        if ins.opcode.is_branch() {
            return false;
        }
        if ins.reads(reg) {
            return false;
        }
        if ins.writes(reg) {
            return true;
        }
    }
    false
}

/// Rewrite the destination register of a data-processing or load
/// instruction. Rd occupies bits 0..4 in every form the backend emits.
pub(crate) fn retarget_dest(ins: &Instruction, new_dest: i32) -> Instruction {
    debug_assert!(!ins.opcode.is_store() && ins.opcode != Opcode::Unknown);
    let mut out = ins.clone();
    out.encoding = (out.encoding & !0x1F) | ((new_dest as u32) & 0x1F);
    let old_name = reg_display(ins.dest_reg);
    let new_name = reg_display(new_dest);
    out.assembly_text = out.assembly_text.replacen(&old_name, &new_name, 1);
    out.dest_reg = new_dest;
    out
}

fn reg_display(reg: i32) -> String {
    if core_encoder::is_fp_reg(reg) {
        format!("d{}", reg - core_encoder::FP_REG_BASE)
    } else {
        format!("x{reg}")
    }
}

/// Power-of-two exponent for positive values.
pub(crate) fn power_of_two(v: i64) -> Option<u32> {
    (v > 0 && (v & (v - 1)) == 0).then(|| v.trailing_zeros())
}
