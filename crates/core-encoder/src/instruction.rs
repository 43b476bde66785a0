//! The instruction record: a semantically-annotated ARM64 instruction.
//!
//! Every emitted unit is one of these. The 32-bit `encoding` is the machine
//! word; the rest of the fields describe it well enough that the peephole
//! optimizer and linker never parse `assembly_text` (which exists for
//! listings only). Register numbers: 0–31 general, 32–63 FP/NEON, `NO_REG`
//! absent.

/// Absent register marker.
pub const NO_REG: i32 = -1;
/// Zero register / stack pointer number in the general file.
pub const ZR: i32 = 31;
/// FP/NEON register numbers are offset by this in the record fields.
pub const FP_REG_BASE: i32 = 32;

pub fn is_fp_reg(r: i32) -> bool {
    (FP_REG_BASE..FP_REG_BASE + 32).contains(&r)
}

/// Physical register number as encoded in the instruction word.
pub fn encoded_reg(r: i32) -> u32 {
    debug_assert!(r >= 0, "absent register reached the encoder");
    (r as u32) & 31
}

/// Semantic opcode covering every ARM64 family the backend emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Opcode {
    #[default]
    Unknown,
    Mov,
    Movz,
    Movk,
    Movn,
    Fmov,
    Add,
    Sub,
    Subs,
    Mul,
    Madd,
    Msub,
    Sdiv,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fmadd,
    Fmsub,
    Fsqrt,
    Fneg,
    Fabs,
    Frintm,
    Frintz,
    And,
    Orr,
    Eor,
    Bic,
    Cmp,
    Fcmp,
    Lsl,
    Lsr,
    Asr,
    Ubfx,
    Sbfx,
    Bfi,
    Bfxil,
    Cset,
    Csetm,
    Csinv,
    Scvtf,
    Fcvtzs,
    Fcvtms,
    Fcvt,
    Ldr,
    Str,
    Ldur,
    Stur,
    Ldrb,
    LdrWord,
    StrWord,
    LdrScaled,
    LdrFp,
    StrFp,
    LdrQ,
    StrQ,
    Ldp,
    Stp,
    B,
    Bl,
    Br,
    Blr,
    Ret,
    BCond,
    Cbz,
    Cbnz,
    Adr,
    Adrp,
    Nop,
    Dmb,
    Isb,
    Brk,
    Svc,
    Faddp,
    Fmaxp,
    Fminp,
    Addp,
    Sminp,
    Umov,
    Directive,
}

impl Opcode {
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::B
                | Opcode::Bl
                | Opcode::Br
                | Opcode::Blr
                | Opcode::Ret
                | Opcode::BCond
                | Opcode::Cbz
                | Opcode::Cbnz
        )
    }

    pub fn is_load(self) -> bool {
        matches!(
            self,
            Opcode::Ldr
                | Opcode::Ldur
                | Opcode::Ldrb
                | Opcode::LdrWord
                | Opcode::LdrScaled
                | Opcode::LdrFp
                | Opcode::LdrQ
                | Opcode::Ldp
        )
    }

    pub fn is_store(self) -> bool {
        matches!(
            self,
            Opcode::Str | Opcode::Stur | Opcode::StrWord | Opcode::StrFp | Opcode::StrQ | Opcode::Stp
        )
    }
}

/// Condition codes for `B.cond` and `CSET`-family instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq = 0b0000,
    Ne = 0b0001,
    Hs = 0b0010,
    Lo = 0b0011,
    Mi = 0b0100,
    Pl = 0b0101,
    Vs = 0b0110,
    Vc = 0b0111,
    Hi = 0b1000,
    Ls = 0b1001,
    Ge = 0b1010,
    Lt = 0b1011,
    Gt = 0b1100,
    Le = 0b1101,
    Al = 0b1110,
}

impl Cond {
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Al,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Hs => "hs",
            Cond::Lo => "lo",
            Cond::Mi => "mi",
            Cond::Pl => "pl",
            Cond::Vs => "vs",
            Cond::Vc => "vc",
            Cond::Hi => "hi",
            Cond::Ls => "ls",
            Cond::Ge => "ge",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
            Cond::Al => "al",
        }
    }

    /// Condition for a source-level comparison operator.
    pub fn from_comparison(name: &str) -> Option<Cond> {
        Some(match name {
            "EQ" => Cond::Eq,
            "NE" => Cond::Ne,
            "LT" => Cond::Lt,
            "LE" => Cond::Le,
            "GT" => Cond::Gt,
            "GE" => Cond::Ge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Segment {
    #[default]
    Code,
    Data,
    Rodata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Relocation {
    #[default]
    None,
    PcRelative19BitOffset,
    PcRelative26BitOffset,
    AdrpHigh21,
    Add12BitUnsignedOffset,
    PageOffset12Scaled,
    MovzMovkAbs64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JitAttribute {
    #[default]
    None,
    /// Part of an address-materialization sequence; the linker patches it.
    AddressLoad,
}

/// NEON arrangement for the pairwise reduction family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arrangement {
    TwoS,
    FourS,
    FourH,
}

impl Arrangement {
    pub fn name(self) -> &'static str {
        match self {
            Arrangement::TwoS => "2s",
            Arrangement::FourS => "4s",
            Arrangement::FourH => "4h",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// 32-bit little-endian machine word (0 for pseudo-instructions).
    pub encoding: u32,
    /// Assigned by the linker.
    pub address: u64,
    /// Listing text only; never parsed.
    pub assembly_text: String,
    pub opcode: Opcode,
    pub dest_reg: i32,
    pub src_reg1: i32,
    pub src_reg2: i32,
    pub base_reg: i32,
    pub ra_reg: i32,
    pub immediate: i64,
    pub uses_immediate: bool,
    pub is_mem_op: bool,
    pub segment: Segment,
    pub relocation: Relocation,
    /// Symbol this instruction references (for relocated instructions).
    pub target_label: String,
    /// Branch destination label.
    pub branch_target: String,
    pub resolved_symbol_name: String,
    pub resolved_target_address: u64,
    pub relocation_applied: bool,
    /// Pseudo-instruction defining `label`.
    pub is_label_definition: bool,
    pub label: String,
    /// 64-bit data word spread across two records.
    pub is_data_value: bool,
    /// Exempt from peephole optimization.
    pub nopeep: bool,
    pub jit_attribute: JitAttribute,
    pub cond: Option<Cond>,
}

impl Default for Instruction {
    /// Registers default to absent, not x0.
    fn default() -> Instruction {
        Instruction {
            encoding: 0,
            address: 0,
            assembly_text: String::new(),
            opcode: Opcode::Unknown,
            dest_reg: NO_REG,
            src_reg1: NO_REG,
            src_reg2: NO_REG,
            base_reg: NO_REG,
            ra_reg: NO_REG,
            immediate: 0,
            uses_immediate: false,
            is_mem_op: false,
            segment: Segment::Code,
            relocation: Relocation::None,
            target_label: String::new(),
            branch_target: String::new(),
            resolved_symbol_name: String::new(),
            resolved_target_address: 0,
            relocation_applied: false,
            is_label_definition: false,
            label: String::new(),
            is_data_value: false,
            nopeep: false,
            jit_attribute: JitAttribute::None,
            cond: None,
        }
    }
}

impl Instruction {
    pub fn new(encoding: u32, assembly_text: impl Into<String>, opcode: Opcode) -> Instruction {
        Instruction {
            encoding,
            assembly_text: assembly_text.into(),
            opcode,
            ..Instruction::default()
        }
    }

    pub fn label_def(name: impl Into<String>) -> Instruction {
        let name = name.into();
        Instruction {
            assembly_text: format!("{name}:"),
            is_label_definition: true,
            label: name,
            ..Instruction::default()
        }
    }

    /// One 64-bit data word, emitted as two adjacent 4-byte records. The
    /// first carries the full value in `immediate` and the low half in
    /// `encoding`; the second carries the high half.
    pub fn data64(value: u64, segment: Segment) -> [Instruction; 2] {
        let low = Instruction {
            encoding: (value & 0xFFFF_FFFF) as u32,
            assembly_text: format!(".quad 0x{value:016x}"),
            immediate: value as i64,
            uses_immediate: true,
            is_data_value: true,
            segment,
            ..Instruction::default()
        };
        let mut high = low.clone();
        high.encoding = (value >> 32) as u32;
        high.assembly_text = String::from("; .quad high half");
        high.uses_immediate = false;
        high.immediate = 0;
        [low, high]
    }

    /// A 64-bit data word holding the absolute address of `label` once the
    /// linker has resolved it (vtable slots, veneer address words).
    pub fn data64_addr(label: impl Into<String>, segment: Segment) -> [Instruction; 2] {
        let label = label.into();
        let [mut low, high] = Instruction::data64(0, segment);
        low.assembly_text = format!(".quad {label}");
        low.relocation = Relocation::MovzMovkAbs64;
        low.target_label = label;
        [low, high]
    }

    /// A special record the optimizer must skip: label definitions, data
    /// words, directives, and anything explicitly marked `nopeep`.
    pub fn is_special(&self) -> bool {
        self.is_label_definition
            || self.is_data_value
            || self.nopeep
            || self.opcode == Opcode::Directive
            || self.assembly_text.is_empty()
            || self.assembly_text.starts_with('.')
            || self.assembly_text.starts_with(';')
    }

    pub fn with_reloc(mut self, relocation: Relocation, target: impl Into<String>) -> Instruction {
        self.relocation = relocation;
        self.target_label = target.into();
        self
    }

    pub fn with_nopeep(mut self) -> Instruction {
        self.nopeep = true;
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Instruction {
        self.segment = segment;
        self
    }

    /// Register equality across views: the record stores one number per
    /// register regardless of X/W naming, so plain equality suffices, but
    /// absent registers never compare equal.
    pub fn same_register(a: i32, b: i32) -> bool {
        a != NO_REG && a == b
    }

    /// Same base register and byte offset.
    pub fn same_address(&self, other: &Instruction) -> bool {
        Instruction::same_register(self.base_reg, other.base_reg)
            && self.immediate == other.immediate
    }

    /// Registers this instruction reads.
    pub fn sources(&self) -> impl Iterator<Item = i32> {
        [self.src_reg1, self.src_reg2, self.base_reg, self.ra_reg]
            .into_iter()
            .filter(|&r| r != NO_REG)
    }

    /// Whether `reg` is read by this instruction. Stores read their "dest"
    /// field (the stored value).
    pub fn reads(&self, reg: i32) -> bool {
        if reg == NO_REG {
            return false;
        }
        self.sources().any(|r| r == reg)
            || (self.opcode.is_store() && Instruction::same_register(self.dest_reg, reg))
    }

    /// Whether `reg` is written by this instruction.
    pub fn writes(&self, reg: i32) -> bool {
        reg != NO_REG && !self.opcode.is_store() && Instruction::same_register(self.dest_reg, reg)
    }
}

/// Decode the PC-relative byte offset out of a branch encoding. Used by the
/// linker round-trip check and the listing formatter.
pub fn decode_branch_offset(opcode: Opcode, encoding: u32) -> Option<i64> {
    match opcode {
        Opcode::B | Opcode::Bl => {
            let imm26 = encoding & 0x03FF_FFFF;
            let ext = ((imm26 as i64) << 38) >> 38; // sign-extend 26 bits
            Some(ext * 4)
        }
        Opcode::BCond | Opcode::Cbz | Opcode::Cbnz => {
            let imm19 = (encoding >> 5) & 0x7FFFF;
            let ext = ((imm19 as i64) << 45) >> 45;
            Some(ext * 4)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_offset_roundtrip_sign_extension() {
        // B with imm26 = -2 (0x3FFFFFE): branches back 8 bytes.
        let enc = 0x1400_0000u32 | 0x03FF_FFFE;
        assert_eq!(decode_branch_offset(Opcode::B, enc), Some(-8));
        // B.cond with imm19 = 3: forward 12 bytes.
        let enc = 0x5400_0000u32 | (3 << 5);
        assert_eq!(decode_branch_offset(Opcode::BCond, enc), Some(12));
    }

    #[test]
    fn store_reads_its_value_register() {
        let mut i = Instruction::new(0, "str x1, [x2]", Opcode::Str);
        i.dest_reg = 1;
        i.base_reg = 2;
        i.is_mem_op = true;
        assert!(i.reads(1));
        assert!(i.reads(2));
        assert!(!i.writes(1));
    }
}
