//! Window-based peephole optimizer over the instruction stream.
//!
//! A pattern is a `(window_size, matcher, transformer, description)` tuple.
//! Patterns register once at construction and are tried largest-window
//! first. Each optimization pass scans the stream left to right; on a match
//! the replacement is spliced in unless it would delete an instruction that
//! carries a symbol reference (`target_label`), which the linker still needs
//! to patch. Labels, data words, directives, and `nopeep`-marked records are
//! never touched. Passes repeat until the stream is stable or the
//! configured maximum is reached.

pub mod patterns;

use core_encoder::instruction::{Instruction, Segment};
use core_encoder::stream::InstructionStream;
use std::collections::HashMap;
use tracing::{debug, trace};

pub struct MatchResult {
    pub matched: bool,
    pub length: usize,
}

impl MatchResult {
    pub const NO: MatchResult = MatchResult {
        matched: false,
        length: 0,
    };

    pub fn hit(length: usize) -> MatchResult {
        MatchResult {
            matched: true,
            length,
        }
    }
}

pub type Matcher = Box<dyn Fn(&[Instruction], usize) -> MatchResult>;
pub type Transformer = Box<dyn Fn(&[Instruction], usize) -> Vec<Instruction>>;

pub struct Pattern {
    window_size: usize,
    matcher: Matcher,
    transformer: Transformer,
    description: &'static str,
}

impl Pattern {
    pub fn new(
        window_size: usize,
        matcher: Matcher,
        transformer: Transformer,
        description: &'static str,
    ) -> Pattern {
        Pattern {
            window_size,
            matcher,
            transformer,
            description,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn matches(&self, instructions: &[Instruction], pos: usize) -> MatchResult {
        (self.matcher)(instructions, pos)
    }

    pub fn transform(&self, instructions: &[Instruction], pos: usize) -> Vec<Instruction> {
        (self.transformer)(instructions, pos)
    }
}

#[derive(Debug, Default, Clone)]
pub struct OptimizerStats {
    pub instructions_before: usize,
    pub instructions_after: usize,
    pub optimizations_applied: u64,
    pub passes_run: u32,
    pub pattern_matches: HashMap<&'static str, u64>,
}

pub struct PeepholeOptimizer {
    patterns: Vec<Pattern>,
    stats: OptimizerStats,
}

impl Default for PeepholeOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PeepholeOptimizer {
    pub fn new() -> PeepholeOptimizer {
        let mut patterns = Vec::new();

        // 1. Simplification and constant folding
        patterns.push(patterns::simplify::constant_folding());
        patterns.push(patterns::simplify::identity_elimination());
        patterns.push(patterns::simplify::redundant_move());
        patterns.push(patterns::simplify::self_move_elimination());
        patterns.push(patterns::simplify::identical_move_elimination());
        patterns.push(patterns::simplify::adr_fusion());
        patterns.push(patterns::simplify::adrp_add_add_fusion());

        // 2. Strength reduction on immediates
        patterns.push(patterns::strength::multiply_by_power_of_two());
        patterns.push(patterns::strength::divide_by_power_of_two());

        // 3. Memory
        patterns.push(patterns::memory::load_after_store());
        patterns.push(patterns::memory::redundant_load_elimination());
        patterns.push(patterns::memory::dead_store_elimination());
        patterns.push(patterns::memory::load_through_scratch());
        patterns.push(patterns::memory::movz_scratch_fusion());
        patterns.push(patterns::memory::str_pair_fusion());
        patterns.push(patterns::memory::ldr_pair_fusion());

        // 4. Control flow
        patterns.push(patterns::control::compare_zero_branch());
        patterns.push(patterns::control::branch_chaining());

        // Largest windows first so bigger rewrites win over their prefixes.
        patterns.sort_by(|a, b| b.window_size.cmp(&a.window_size));

        PeepholeOptimizer {
            patterns,
            stats: OptimizerStats::default(),
        }
    }

    pub fn stats(&self) -> &OptimizerStats {
        &self.stats
    }

    pub fn optimize(&mut self, stream: &mut InstructionStream, max_passes: u32) {
        self.stats = OptimizerStats::default();
        let mut instructions = std::mem::take(stream.instructions_mut());
        self.stats.instructions_before = instructions.len();

        while self.stats.passes_run < max_passes {
            let changed = self.apply_pass(&mut instructions);
            self.stats.passes_run += 1;
            if !changed {
                break;
            }
        }

        self.stats.instructions_after = instructions.len();
        debug!(
            target: "peephole",
            before = self.stats.instructions_before,
            after = self.stats.instructions_after,
            passes = self.stats.passes_run,
            applied = self.stats.optimizations_applied,
            "peephole_done"
        );
        for (pattern, count) in &self.stats.pattern_matches {
            trace!(target: "peephole", pattern, count, "pattern_matches");
        }
        stream.replace_instructions(instructions);
    }

    fn apply_pass(&mut self, instructions: &mut Vec<Instruction>) -> bool {
        let mut any_changes = false;
        let mut pos = 0usize;

        while pos < instructions.len() {
            if instructions[pos].segment != Segment::Code
                || instructions[pos].is_special()
            {
                pos += 1;
                continue;
            }

            let mut applied = false;
            for pattern in &self.patterns {
                let result = pattern.matches(instructions, pos);
                if !result.matched {
                    continue;
                }
                let replacement = pattern.transform(instructions, pos);
                if would_break_label_references(
                    &instructions[pos..pos + result.length],
                    &replacement,
                ) {
                    continue;
                }
                trace!(
                    target: "peephole",
                    pattern = pattern.description,
                    pos,
                    removed = result.length,
                    inserted = replacement.len(),
                    "pattern_applied"
                );
                instructions.splice(pos..pos + result.length, replacement);
                *self
                    .stats
                    .pattern_matches
                    .entry(pattern.description)
                    .or_default() += 1;
                self.stats.optimizations_applied += 1;
                applied = true;
                any_changes = true;
                break;
            }
            if !applied {
                pos += 1;
            }
        }
        any_changes
    }
}

/// A matched instruction that carries a symbol reference may not disappear:
/// the linker patches it in place. The replacement must retain an
/// instruction referencing the same symbol.
fn would_break_label_references(window: &[Instruction], replacement: &[Instruction]) -> bool {
    window.iter().any(|i| {
        !i.target_label.is_empty()
            && !replacement
                .iter()
                .any(|r| r.target_label == i.target_label)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_encoder::encode;

    fn optimize(instructions: Vec<Instruction>, passes: u32) -> Vec<Instruction> {
        let mut stream = InstructionStream::new();
        stream.extend(instructions);
        let mut opt = PeepholeOptimizer::new();
        opt.optimize(&mut stream, passes);
        stream.into_instructions()
    }

    #[test]
    fn self_move_is_deleted() {
        let out = optimize(vec![encode::mov_reg(3, 3), encode::ret()], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].opcode, core_encoder::Opcode::Ret);
    }

    #[test]
    fn optimizer_is_stable_at_fixpoint() {
        let program = vec![
            encode::movz(0, 1, 0),
            encode::add_reg(0, 0, 1),
            encode::ret(),
        ];
        let once = optimize(program.clone(), 1);
        let many = optimize(program, 10);
        assert_eq!(once, many);
    }

    #[test]
    fn address_load_sequences_survive() {
        // An ADRP+ADD pair fuses to ADR, which must keep the symbol alive.
        let out = optimize(
            vec![
                encode::adrp(0, "str_0"),
                encode::add_lo12(0, 0, "str_0"),
                encode::ret(),
            ],
            5,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].opcode, core_encoder::Opcode::Adr);
        assert_eq!(out[0].target_label, "str_0");
    }
}
