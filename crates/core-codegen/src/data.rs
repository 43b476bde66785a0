//! Read-only data generation: string literals, float constants, packed
//! literal images, table contents, and vtables.
//!
//! Layouts persisted into rodata:
//! * string: 64-bit length word, `length` 32-bit character cells, padding
//!   to 16 bytes; the label points at the length word.
//! * float constant: one IEEE-754 double.
//! * packed literal: its 64-bit bit-identical image (OCT shapes span four
//!   words).
//! * table: element count word, then the elements; the label points at the
//!   first element so indexing and `LEN` match vector semantics.
//! * vtable: one 64-bit code address per slot, patched by the linker.

use core_analysis::ClassInfo;
use core_ast::{Expression, PackedShape, packed_layout};
use core_encoder::instruction::{Instruction, Segment};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default)]
pub struct DataGenerator {
    records: Vec<Instruction>,
    interned_strings: HashMap<String, String>,
    interned_floats: HashMap<u64, String>,
    next_id: u32,
}

impl DataGenerator {
    pub fn new() -> DataGenerator {
        DataGenerator::default()
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let n = self.next_id;
        self.next_id += 1;
        format!("{prefix}_{n}")
    }

    fn push_label(&mut self, label: &str) {
        let mut def = Instruction::label_def(label);
        def.segment = Segment::Rodata;
        self.records.push(def);
    }

    fn push_word(&mut self, value: u64) {
        for mut rec in Instruction::data64(value, Segment::Rodata) {
            rec.nopeep = true;
            self.records.push(rec);
        }
    }

    /// Intern a string literal; identical strings share one image.
    pub fn string_literal(&mut self, text: &str) -> String {
        if let Some(label) = self.interned_strings.get(text) {
            return label.clone();
        }
        let label = self.fresh("str");
        self.push_label(&label);
        let cells: Vec<u32> = text.chars().map(|c| c as u32).collect();
        self.push_word(cells.len() as u64);
        for pair in cells.chunks(2) {
            let low = pair[0] as u64;
            let high = pair.get(1).copied().unwrap_or(0) as u64;
            self.push_word(low | (high << 32));
        }
        // Pad the image to 16 bytes: length word plus cell words.
        let bytes = 8 + cells.len().div_ceil(2) * 8;
        if bytes % 16 != 0 {
            self.push_word(0);
        }
        trace!(target: "codegen.data", label = %label, chars = cells.len(), "string_literal");
        self.interned_strings.insert(text.to_string(), label.clone());
        label
    }

    /// Intern a float constant by bit pattern.
    pub fn float_literal(&mut self, value: f64) -> String {
        let bits = value.to_bits();
        if let Some(label) = self.interned_floats.get(&bits) {
            return label.clone();
        }
        let label = self.fresh("flt");
        self.push_label(&label);
        self.push_word(bits);
        self.interned_floats.insert(bits, label.clone());
        label
    }

    /// A packed literal whose operands are all literals: encode the image
    /// once and load it with ADRP/ADD/LDR at the use site.
    pub fn packed_literal(&mut self, shape: PackedShape, operands: &[Expression]) -> Option<String> {
        let words = packed_literal_image(shape, operands)?;
        let label = self.fresh("packed");
        self.push_label(&label);
        for w in words {
            self.push_word(w);
        }
        Some(label)
    }

    /// TABLE literal: count word below the base label, then the entries.
    pub fn table_literal(&mut self, entries: &[Expression], is_float: bool) -> Option<String> {
        let mut words = Vec::with_capacity(entries.len());
        for e in entries {
            words.push(match e {
                Expression::Float(v) => v.to_bits(),
                _ => e.literal_int()? as u64,
            });
        }
        let _ = is_float;
        let count_label = self.fresh("tbl");
        self.push_word(words.len() as u64);
        self.push_label(&count_label);
        for w in words {
            self.push_word(w);
        }
        Some(count_label)
    }

    /// Vtable image: slot-indexed method addresses filled by the linker.
    pub fn vtable(&mut self, class: &ClassInfo) {
        let label = class.vtable_label();
        self.push_label(&label);
        for method in &class.vtable {
            for mut rec in Instruction::data64_addr(method.clone(), Segment::Rodata) {
                rec.nopeep = true;
                self.records.push(rec);
            }
        }
        trace!(target: "codegen.data", class = %class.name, slots = class.vtable.len(), "vtable");
    }

    pub fn into_records(self) -> Vec<Instruction> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Bit-identical image of a packed literal; `None` when any operand is not
/// a literal (those construct at runtime through BFI).
pub fn packed_literal_image(shape: PackedShape, operands: &[Expression]) -> Option<Vec<u64>> {
    let layout = packed_layout(shape);
    if operands.len() != layout.lanes as usize {
        return None;
    }
    let mut lane_bits = Vec::with_capacity(operands.len());
    for op in operands {
        let bits = match (layout.is_float, op) {
            (true, Expression::Float(v)) => {
                if layout.lane_bits == 32 {
                    (*v as f32).to_bits() as u64
                } else {
                    f32_to_f16_bits(*v as f32) as u64
                }
            }
            (true, Expression::Number(n)) => {
                if layout.lane_bits == 32 {
                    (*n as f32).to_bits() as u64
                } else {
                    f32_to_f16_bits(*n as f32) as u64
                }
            }
            (false, _) => {
                let v = op.literal_int()?;
                (v as u64) & ((1u64 << layout.lane_bits) - 1)
            }
            _ => return None,
        };
        lane_bits.push(bits);
    }
    let lanes_per_word = 64 / layout.lane_bits as usize;
    let mut words = vec![0u64; operands.len().div_ceil(lanes_per_word)];
    for (i, bits) in lane_bits.iter().enumerate() {
        let word = i / lanes_per_word;
        let shift = (i % lanes_per_word) as u32 * layout.lane_bits as u32;
        words[word] |= bits << shift;
    }
    Some(words)
}

/// Round-to-nearest-even conversion to IEEE half, enough for FQUAD images.
fn f32_to_f16_bits(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let frac = bits & 0x7F_FFFF;
    if exp == 0xFF {
        // Inf/NaN
        return sign | 0x7C00 | if frac != 0 { 0x200 } else { 0 };
    }
    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7C00; // overflow to infinity
    }
    if unbiased < -24 {
        return sign; // underflow to zero
    }
    if unbiased < -14 {
        // Subnormal half
        let shift = -14 - unbiased;
        let mant = (frac | 0x80_0000) >> (13 + shift);
        return sign | mant as u16;
    }
    let half_exp = ((unbiased + 15) as u32) << 10;
    let half_frac = frac >> 13;
    let rounded = if frac & 0x1000 != 0 { 1 } else { 0 };
    sign | (half_exp | half_frac | rounded) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_literal_packs_first_low_second_high() {
        let words = packed_literal_image(
            PackedShape::Pair,
            &[Expression::Number(7), Expression::Number(42)],
        )
        .unwrap();
        assert_eq!(words, vec![7 | (42u64 << 32)]);
    }

    #[test]
    fn quad_literal_packs_four_sixteen_bit_lanes() {
        let words = packed_literal_image(
            PackedShape::Quad,
            &[
                Expression::Number(1),
                Expression::Number(2),
                Expression::Number(3),
                Expression::Number(4),
            ],
        )
        .unwrap();
        assert_eq!(words, vec![1 | (2 << 16) | (3 << 32) | (4u64 << 48)]);
    }

    #[test]
    fn oct_literal_spans_four_words() {
        let ops: Vec<Expression> = (0..8).map(Expression::Number).collect();
        let words = packed_literal_image(PackedShape::Oct, &ops).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], 0 | (1u64 << 32));
        assert_eq!(words[3], 6 | (7u64 << 32));
    }

    #[test]
    fn non_literal_operand_returns_none() {
        assert!(
            packed_literal_image(
                PackedShape::Pair,
                &[Expression::Number(1), Expression::variable("x")]
            )
            .is_none()
        );
    }

    #[test]
    fn strings_are_interned_and_padded() {
        let mut data = DataGenerator::new();
        let a = data.string_literal("hi");
        let b = data.string_literal("hi");
        assert_eq!(a, b);
        let records = data.into_records();
        // label + length word (2 recs) + one cell word (2 recs) + pad (2).
        let emitted: usize = records.iter().filter(|r| !r.is_label_definition).count();
        assert_eq!(emitted * 4 % 16, 0);
    }

    #[test]
    fn half_conversion_of_common_values() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3C00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xC000);
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
    }
}
