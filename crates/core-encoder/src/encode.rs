//! Pure encoders: (mnemonic, operands) → `Instruction`.
//!
//! Every function returns a structurally complete record; instructions that
//! reference labels carry a zero immediate field plus a `Relocation` and the
//! symbol in `target_label`, and only the linker patches them. Register
//! arguments use record numbering (0–31 general, 32–63 FP/NEON).
//!
//! Encodings follow the A64 instruction set; 64-bit operand size throughout
//! except the explicit word/byte and NEON forms.

use crate::imm::{add_sub_imm_fields, encode_logical_immediate};
use crate::instruction::{
    Arrangement, Cond, FP_REG_BASE, Instruction, Opcode, Relocation, encoded_reg, is_fp_reg,
};

pub fn xn(r: i32) -> String {
    if r == 31 {
        "xzr".to_string()
    } else {
        format!("x{r}")
    }
}

fn xsp(r: i32) -> String {
    if r == 31 {
        "sp".to_string()
    } else {
        format!("x{r}")
    }
}

pub fn wn(r: i32) -> String {
    if r == 31 {
        "wzr".to_string()
    } else {
        format!("w{r}")
    }
}

pub fn dn(r: i32) -> String {
    format!("d{}", r - FP_REG_BASE)
}

pub fn sn(r: i32) -> String {
    format!("s{}", r - FP_REG_BASE)
}

pub fn vn(r: i32) -> String {
    format!("v{}", r - FP_REG_BASE)
}

fn ins(encoding: u32, text: String, opcode: Opcode) -> Instruction {
    Instruction::new(encoding, text, opcode)
}

// --- Moves ---------------------------------------------------------------

/// MOV Xd, Xm (ORR Xd, XZR, Xm).
pub fn mov_reg(dst: i32, src: i32) -> Instruction {
    if is_fp_reg(dst) || is_fp_reg(src) {
        return fmov_reg(dst, src);
    }
    let enc = 0xAA00_03E0 | (encoded_reg(src) << 16) | encoded_reg(dst);
    let mut i = ins(enc, format!("mov {}, {}", xn(dst), xn(src)), Opcode::Mov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// MOV between SP and a general register (ADD #0 form).
pub fn mov_sp(dst: i32, src: i32) -> Instruction {
    let enc = 0x9100_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("mov {}, {}", xsp(dst), xsp(src)), Opcode::Mov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

pub fn movz(dst: i32, imm16: u16, shift: u32) -> Instruction {
    debug_assert!(shift % 16 == 0 && shift < 64);
    let hw = shift / 16;
    let enc = 0xD280_0000 | (hw << 21) | ((imm16 as u32) << 5) | encoded_reg(dst);
    let text = if shift == 0 {
        format!("movz {}, #{imm16}", xn(dst))
    } else {
        format!("movz {}, #{imm16}, lsl #{shift}", xn(dst))
    };
    let mut i = ins(enc, text, Opcode::Movz);
    i.dest_reg = dst;
    i.immediate = (imm16 as i64) << shift;
    i.uses_immediate = true;
    i
}

pub fn movk(dst: i32, imm16: u16, shift: u32) -> Instruction {
    debug_assert!(shift % 16 == 0 && shift < 64);
    let hw = shift / 16;
    let enc = 0xF280_0000 | (hw << 21) | ((imm16 as u32) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("movk {}, #{imm16}, lsl #{shift}", xn(dst)),
        Opcode::Movk,
    );
    i.dest_reg = dst;
    i.src_reg1 = dst; // movk reads its destination
    i.immediate = (imm16 as i64) << shift;
    i.uses_immediate = true;
    i
}

pub fn movn(dst: i32, imm16: u16, shift: u32) -> Instruction {
    let hw = shift / 16;
    let enc = 0x9280_0000 | (hw << 21) | ((imm16 as u32) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("movn {}, #{imm16}, lsl #{shift}", xn(dst)),
        Opcode::Movn,
    );
    i.dest_reg = dst;
    i.immediate = !((imm16 as i64) << shift);
    i.uses_immediate = true;
    i
}

/// Materialize an arbitrary 64-bit constant via MOVZ + up to three MOVKs.
pub fn load_immediate(dst: i32, value: i64) -> Vec<Instruction> {
    let v = value as u64;
    if v == 0 {
        return vec![movz(dst, 0, 0)];
    }
    // A negative value with few clear half-words goes through MOVN.
    let inverted = !v;
    if inverted.count_ones() < 16 && (inverted & 0xFFFF_FFFF_FFFF_0000) == 0 {
        return vec![movn(dst, inverted as u16, 0)];
    }
    let mut out = Vec::new();
    let mut first = true;
    for hw in 0..4 {
        let chunk = ((v >> (hw * 16)) & 0xFFFF) as u16;
        if chunk == 0 {
            continue;
        }
        if first {
            out.push(movz(dst, chunk, hw * 16));
            first = false;
        } else {
            out.push(movk(dst, chunk, hw * 16));
        }
    }
    if out.is_empty() {
        out.push(movz(dst, 0, 0));
    }
    out
}

// --- Integer data processing --------------------------------------------

fn add_sub_imm(op: Opcode, base: u32, dst: i32, src: i32, imm: i64, name: &str) -> Instruction {
    let (imm12, shifted) =
        add_sub_imm_fields(imm).expect("immediate legality checked by the caller");
    let sh = if shifted { 1 << 22 } else { 0 };
    let enc = base | sh | (imm12 << 10) | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("{name} {}, {}, #{imm}", xsp(dst), xsp(src)), op);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i.immediate = imm;
    i.uses_immediate = true;
    i
}

pub fn add_imm(dst: i32, src: i32, imm: i64) -> Instruction {
    add_sub_imm(Opcode::Add, 0x9100_0000, dst, src, imm, "add")
}

pub fn sub_imm(dst: i32, src: i32, imm: i64) -> Instruction {
    add_sub_imm(Opcode::Sub, 0xD100_0000, dst, src, imm, "sub")
}

pub fn cmp_imm(src: i32, imm: i64) -> Instruction {
    let mut i = add_sub_imm(Opcode::Cmp, 0xF100_0000, 31, src, imm, "subs");
    i.assembly_text = format!("cmp {}, #{imm}", xn(src));
    i.dest_reg = crate::instruction::NO_REG;
    i.src_reg1 = src;
    i
}

fn three_reg(op: Opcode, base: u32, dst: i32, a: i32, b: i32, name: &str) -> Instruction {
    let enc = base | (encoded_reg(b) << 16) | (encoded_reg(a) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("{name} {}, {}, {}", xn(dst), xn(a), xn(b)),
        op,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

pub fn add_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Add, 0x8B00_0000, dst, a, b, "add")
}

pub fn sub_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Sub, 0xCB00_0000, dst, a, b, "sub")
}

pub fn cmp_reg(a: i32, b: i32) -> Instruction {
    let mut i = three_reg(Opcode::Cmp, 0xEB00_0000, 31, a, b, "subs");
    i.assembly_text = format!("cmp {}, {}", xn(a), xn(b));
    i.dest_reg = crate::instruction::NO_REG;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

/// MUL (MADD with XZR accumulator).
pub fn mul(dst: i32, a: i32, b: i32) -> Instruction {
    let enc = 0x9B00_7C00 | (encoded_reg(b) << 16) | (encoded_reg(a) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("mul {}, {}, {}", xn(dst), xn(a), xn(b)), Opcode::Mul);
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

pub fn madd(dst: i32, a: i32, b: i32, acc: i32) -> Instruction {
    let enc = 0x9B00_0000
        | (encoded_reg(b) << 16)
        | (encoded_reg(acc) << 10)
        | (encoded_reg(a) << 5)
        | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("madd {}, {}, {}, {}", xn(dst), xn(a), xn(b), xn(acc)),
        Opcode::Madd,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i.ra_reg = acc;
    i
}

pub fn msub(dst: i32, a: i32, b: i32, acc: i32) -> Instruction {
    let enc = 0x9B00_8000
        | (encoded_reg(b) << 16)
        | (encoded_reg(acc) << 10)
        | (encoded_reg(a) << 5)
        | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("msub {}, {}, {}, {}", xn(dst), xn(a), xn(b), xn(acc)),
        Opcode::Msub,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i.ra_reg = acc;
    i
}

pub fn sdiv(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Sdiv, 0x9AC0_0C00, dst, a, b, "sdiv")
}

pub fn and_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::And, 0x8A00_0000, dst, a, b, "and")
}

pub fn orr_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Orr, 0xAA00_0000, dst, a, b, "orr")
}

pub fn eor_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Eor, 0xCA00_0000, dst, a, b, "eor")
}

pub fn bic_reg(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Bic, 0x8A20_0000, dst, a, b, "bic")
}

/// MVN Xd, Xm (ORN with XZR).
pub fn mvn(dst: i32, src: i32) -> Instruction {
    let enc = 0xAA20_03E0 | (encoded_reg(src) << 16) | encoded_reg(dst);
    let mut i = ins(enc, format!("mvn {}, {}", xn(dst), xn(src)), Opcode::Orr);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

fn logical_imm(op: Opcode, base: u32, dst: i32, src: i32, imm: i64, name: &str) -> Instruction {
    let field = encode_logical_immediate(imm as u64, 64)
        .expect("immediate legality checked by the caller");
    let enc = base | (field << 10) | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("{name} {}, {}, #{imm:#x}", xn(dst), xn(src)), op);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i.immediate = imm;
    i.uses_immediate = true;
    i
}

pub fn and_imm(dst: i32, src: i32, imm: i64) -> Instruction {
    logical_imm(Opcode::And, 0x9200_0000, dst, src, imm, "and")
}

pub fn orr_imm(dst: i32, src: i32, imm: i64) -> Instruction {
    logical_imm(Opcode::Orr, 0xB200_0000, dst, src, imm, "orr")
}

pub fn eor_imm(dst: i32, src: i32, imm: i64) -> Instruction {
    logical_imm(Opcode::Eor, 0xD200_0000, dst, src, imm, "eor")
}

// --- Shifts and bitfields -----------------------------------------------

fn bitfield(op: Opcode, base: u32, dst: i32, src: i32, immr: u32, imms: u32, text: String) -> Instruction {
    let enc = base | (immr << 16) | (imms << 10) | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, text, op);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i.uses_immediate = true;
    i
}

/// LSL #shift (UBFM alias).
pub fn lsl_imm(dst: i32, src: i32, shift: u32) -> Instruction {
    debug_assert!(shift < 64);
    let mut i = bitfield(
        Opcode::Lsl,
        0xD340_0000,
        dst,
        src,
        (64 - shift) % 64,
        63 - shift,
        format!("lsl {}, {}, #{shift}", xn(dst), xn(src)),
    );
    i.immediate = shift as i64;
    i
}

/// LSR #shift (UBFM alias).
pub fn lsr_imm(dst: i32, src: i32, shift: u32) -> Instruction {
    debug_assert!(shift < 64);
    let mut i = bitfield(
        Opcode::Lsr,
        0xD340_0000,
        dst,
        src,
        shift,
        63,
        format!("lsr {}, {}, #{shift}", xn(dst), xn(src)),
    );
    i.immediate = shift as i64;
    i
}

/// ASR #shift (SBFM alias).
pub fn asr_imm(dst: i32, src: i32, shift: u32) -> Instruction {
    debug_assert!(shift < 64);
    let mut i = bitfield(
        Opcode::Asr,
        0x9340_0000,
        dst,
        src,
        shift,
        63,
        format!("asr {}, {}, #{shift}", xn(dst), xn(src)),
    );
    i.immediate = shift as i64;
    i
}

pub fn lslv(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Lsl, 0x9AC0_2000, dst, a, b, "lsl")
}

pub fn lsrv(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Lsr, 0x9AC0_2400, dst, a, b, "lsr")
}

pub fn asrv(dst: i32, a: i32, b: i32) -> Instruction {
    three_reg(Opcode::Asr, 0x9AC0_2800, dst, a, b, "asr")
}

/// UBFX dst, src, #lsb, #width.
pub fn ubfx(dst: i32, src: i32, lsb: u32, width: u32) -> Instruction {
    debug_assert!(width >= 1 && lsb + width <= 64);
    bitfield(
        Opcode::Ubfx,
        0xD340_0000,
        dst,
        src,
        lsb,
        lsb + width - 1,
        format!("ubfx {}, {}, #{lsb}, #{width}", xn(dst), xn(src)),
    )
}

/// SBFX dst, src, #lsb, #width.
pub fn sbfx(dst: i32, src: i32, lsb: u32, width: u32) -> Instruction {
    debug_assert!(width >= 1 && lsb + width <= 64);
    bitfield(
        Opcode::Sbfx,
        0x9340_0000,
        dst,
        src,
        lsb,
        lsb + width - 1,
        format!("sbfx {}, {}, #{lsb}, #{width}", xn(dst), xn(src)),
    )
}

/// BFI dst, src, #lsb, #width (BFM alias). Reads and writes `dst`.
pub fn bfi(dst: i32, src: i32, lsb: u32, width: u32) -> Instruction {
    debug_assert!(width >= 1 && lsb + width <= 64);
    let mut i = bitfield(
        Opcode::Bfi,
        0xB340_0000,
        dst,
        src,
        (64 - lsb) % 64,
        width - 1,
        format!("bfi {}, {}, #{lsb}, #{width}", xn(dst), xn(src)),
    );
    i.src_reg2 = dst; // insertion merges with the old destination bits
    i
}

/// BFXIL dst, src, #lsb, #width (BFM alias). Reads and writes `dst`.
pub fn bfxil(dst: i32, src: i32, lsb: u32, width: u32) -> Instruction {
    debug_assert!(width >= 1 && lsb + width <= 64);
    let mut i = bitfield(
        Opcode::Bfxil,
        0xB340_0000,
        dst,
        src,
        lsb,
        lsb + width - 1,
        format!("bfxil {}, {}, #{lsb}, #{width}", xn(dst), xn(src)),
    );
    i.src_reg2 = dst;
    i
}

// --- Conditional select --------------------------------------------------

/// CSET (CSINC Rd, XZR, XZR, invert(cond)).
pub fn cset(dst: i32, cond: Cond) -> Instruction {
    let inv = cond.invert() as u32;
    let enc = 0x9A9F_07E0 | (inv << 12) | encoded_reg(dst);
    let mut i = ins(enc, format!("cset {}, {}", xn(dst), cond.name()), Opcode::Cset);
    i.dest_reg = dst;
    i.cond = Some(cond);
    i
}

/// CSETM (CSINV Rd, XZR, XZR, invert(cond)): all-ones on true, BCPL truth.
pub fn csetm(dst: i32, cond: Cond) -> Instruction {
    let inv = cond.invert() as u32;
    let enc = 0xDA9F_03E0 | (inv << 12) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("csetm {}, {}", xn(dst), cond.name()),
        Opcode::Csetm,
    );
    i.dest_reg = dst;
    i.cond = Some(cond);
    i
}

// --- Floating point ------------------------------------------------------

fn fp_two(op: Opcode, base: u32, dst: i32, src: i32, name: &str) -> Instruction {
    let enc = base | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("{name} {}, {}", dn(dst), dn(src)), op);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

fn fp_three(op: Opcode, base: u32, dst: i32, a: i32, b: i32, name: &str) -> Instruction {
    let enc = base | (encoded_reg(b) << 16) | (encoded_reg(a) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("{name} {}, {}, {}", dn(dst), dn(a), dn(b)), op);
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

pub fn fadd(dst: i32, a: i32, b: i32) -> Instruction {
    fp_three(Opcode::Fadd, 0x1E60_2800, dst, a, b, "fadd")
}

pub fn fsub(dst: i32, a: i32, b: i32) -> Instruction {
    fp_three(Opcode::Fsub, 0x1E60_3800, dst, a, b, "fsub")
}

pub fn fmul(dst: i32, a: i32, b: i32) -> Instruction {
    fp_three(Opcode::Fmul, 0x1E60_0800, dst, a, b, "fmul")
}

pub fn fdiv(dst: i32, a: i32, b: i32) -> Instruction {
    fp_three(Opcode::Fdiv, 0x1E60_1800, dst, a, b, "fdiv")
}

pub fn fsqrt(dst: i32, src: i32) -> Instruction {
    fp_two(Opcode::Fsqrt, 0x1E61_C000, dst, src, "fsqrt")
}

pub fn fneg(dst: i32, src: i32) -> Instruction {
    fp_two(Opcode::Fneg, 0x1E61_4000, dst, src, "fneg")
}

pub fn fabs(dst: i32, src: i32) -> Instruction {
    fp_two(Opcode::Fabs, 0x1E60_C000, dst, src, "fabs")
}

/// Round toward minus infinity (FLOOR).
pub fn frintm(dst: i32, src: i32) -> Instruction {
    fp_two(Opcode::Frintm, 0x1E65_4000, dst, src, "frintm")
}

/// Round toward zero (TRUNCATE).
pub fn frintz(dst: i32, src: i32) -> Instruction {
    fp_two(Opcode::Frintz, 0x1E65_C000, dst, src, "frintz")
}

pub fn fcmp(a: i32, b: i32) -> Instruction {
    let enc = 0x1E60_2000 | (encoded_reg(b) << 16) | (encoded_reg(a) << 5);
    let mut i = ins(enc, format!("fcmp {}, {}", dn(a), dn(b)), Opcode::Fcmp);
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

pub fn fmadd(dst: i32, a: i32, b: i32, acc: i32) -> Instruction {
    let enc = 0x1F40_0000
        | (encoded_reg(b) << 16)
        | (encoded_reg(acc) << 10)
        | (encoded_reg(a) << 5)
        | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("fmadd {}, {}, {}, {}", dn(dst), dn(a), dn(b), dn(acc)),
        Opcode::Fmadd,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i.ra_reg = acc;
    i
}

pub fn fmsub(dst: i32, a: i32, b: i32, acc: i32) -> Instruction {
    let enc = 0x1F40_8000
        | (encoded_reg(b) << 16)
        | (encoded_reg(acc) << 10)
        | (encoded_reg(a) << 5)
        | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("fmsub {}, {}, {}, {}", dn(dst), dn(a), dn(b), dn(acc)),
        Opcode::Fmsub,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i.ra_reg = acc;
    i
}

/// FMOV Dd, Dn.
pub fn fmov_reg(dst: i32, src: i32) -> Instruction {
    if is_fp_reg(dst) && is_fp_reg(src) {
        return fp_two(Opcode::Fmov, 0x1E60_4000, dst, src, "fmov");
    }
    if is_fp_reg(dst) {
        return fmov_x_to_d(dst, src);
    }
    fmov_d_to_x(dst, src)
}

/// FMOV Dd, Xn — integer bit pattern into an FP register.
pub fn fmov_x_to_d(dst: i32, src: i32) -> Instruction {
    let enc = 0x9E67_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fmov {}, {}", dn(dst), xn(src)), Opcode::Fmov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FMOV Xd, Dn — FP bit pattern into an integer register.
pub fn fmov_d_to_x(dst: i32, src: i32) -> Instruction {
    let enc = 0x9E66_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fmov {}, {}", xn(dst), dn(src)), Opcode::Fmov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FMOV Sd, Wn — 32-bit pattern into the low lane of an FP register.
pub fn fmov_w_to_s(dst: i32, src: i32) -> Instruction {
    let enc = 0x1E27_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fmov {}, {}", sn(dst), wn(src)), Opcode::Fmov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FMOV Wd, Sn.
pub fn fmov_s_to_w(dst: i32, src: i32) -> Instruction {
    let enc = 0x1E26_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fmov {}, {}", wn(dst), sn(src)), Opcode::Fmov);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// SCVTF Dd, Xn.
pub fn scvtf(dst: i32, src: i32) -> Instruction {
    let enc = 0x9E62_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("scvtf {}, {}", dn(dst), xn(src)), Opcode::Scvtf);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVTZS Xd, Dn (truncate toward zero).
pub fn fcvtzs(dst: i32, src: i32) -> Instruction {
    let enc = 0x9E78_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fcvtzs {}, {}", xn(dst), dn(src)), Opcode::Fcvtzs);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVTMS Xd, Dn (round toward minus infinity).
pub fn fcvtms(dst: i32, src: i32) -> Instruction {
    let enc = 0x9E70_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fcvtms {}, {}", xn(dst), dn(src)), Opcode::Fcvtms);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVT Sd, Dn (narrow to single).
pub fn fcvt_d_to_s(dst: i32, src: i32) -> Instruction {
    let enc = 0x1E62_4000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fcvt {}, {}", sn(dst), dn(src)), Opcode::Fcvt);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVT Dd, Sn (widen to double).
pub fn fcvt_s_to_d(dst: i32, src: i32) -> Instruction {
    let enc = 0x1E22_C000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(enc, format!("fcvt {}, {}", dn(dst), sn(src)), Opcode::Fcvt);
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVT Hd, Sn (narrow to half; the pattern lands in the low 16 bits).
pub fn fcvt_s_to_h(dst: i32, src: i32) -> Instruction {
    let enc = 0x1E23_C000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("fcvt h{}, {}", dst - FP_REG_BASE, sn(src)),
        Opcode::Fcvt,
    );
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

/// FCVT Dd, Hn (widen from half).
pub fn fcvt_h_to_d(dst: i32, src: i32) -> Instruction {
    let enc = 0x1EE2_C000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("fcvt {}, h{}", dn(dst), src - FP_REG_BASE),
        Opcode::Fcvt,
    );
    i.dest_reg = dst;
    i.src_reg1 = src;
    i
}

// --- Loads and stores ----------------------------------------------------

fn mem(
    op: Opcode,
    enc: u32,
    text: String,
    value_reg: i32,
    base: i32,
    offset: i64,
) -> Instruction {
    let mut i = ins(enc, text, op);
    i.dest_reg = value_reg;
    i.base_reg = base;
    i.immediate = offset;
    i.uses_immediate = true;
    i.is_mem_op = true;
    i
}

/// LDR Xt, [Xn, #offset] — unsigned scaled offset, 8-byte.
pub fn ldr_imm(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 8 == 0 && offset / 8 <= 0xFFF);
    let enc = 0xF940_0000
        | (((offset / 8) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(dst);
    mem(
        Opcode::Ldr,
        enc,
        format!("ldr {}, [{}, #{offset}]", xn(dst), xsp(base)),
        dst,
        base,
        offset,
    )
}

/// STR Xt, [Xn, #offset].
pub fn str_imm(src: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 8 == 0 && offset / 8 <= 0xFFF);
    let enc = 0xF900_0000
        | (((offset / 8) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(src);
    mem(
        Opcode::Str,
        enc,
        format!("str {}, [{}, #{offset}]", xn(src), xsp(base)),
        src,
        base,
        offset,
    )
}

/// LDUR Xt, [Xn, #offset] — signed 9-bit unscaled offset.
pub fn ldur(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!((-256..256).contains(&offset));
    let imm9 = (offset as u32) & 0x1FF;
    let enc = 0xF840_0000 | (imm9 << 12) | (encoded_reg(base) << 5) | encoded_reg(dst);
    mem(
        Opcode::Ldur,
        enc,
        format!("ldur {}, [{}, #{offset}]", xn(dst), xsp(base)),
        dst,
        base,
        offset,
    )
}

pub fn stur(src: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!((-256..256).contains(&offset));
    let imm9 = (offset as u32) & 0x1FF;
    let enc = 0xF800_0000 | (imm9 << 12) | (encoded_reg(base) << 5) | encoded_reg(src);
    mem(
        Opcode::Stur,
        enc,
        format!("stur {}, [{}, #{offset}]", xn(src), xsp(base)),
        src,
        base,
        offset,
    )
}

/// LDR Wt, [Xn, #offset] — 32-bit load, zero-extending.
pub fn ldr_word(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 4 == 0 && offset / 4 <= 0xFFF);
    let enc = 0xB940_0000
        | (((offset / 4) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(dst);
    mem(
        Opcode::LdrWord,
        enc,
        format!("ldr {}, [{}, #{offset}]", wn(dst), xsp(base)),
        dst,
        base,
        offset,
    )
}

/// STR Wt, [Xn, #offset].
pub fn str_word(src: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 4 == 0 && offset / 4 <= 0xFFF);
    let enc = 0xB900_0000
        | (((offset / 4) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(src);
    mem(
        Opcode::StrWord,
        enc,
        format!("str {}, [{}, #{offset}]", wn(src), xsp(base)),
        src,
        base,
        offset,
    )
}

pub fn ldrb(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!((0..=0xFFF).contains(&offset));
    let enc =
        0x3940_0000 | ((offset as u32) << 10) | (encoded_reg(base) << 5) | encoded_reg(dst);
    mem(
        Opcode::Ldrb,
        enc,
        format!("ldrb {}, [{}, #{offset}]", wn(dst), xsp(base)),
        dst,
        base,
        offset,
    )
}

/// LDR Xt, [Xn, Xm, LSL #3] — scaled register offset.
pub fn ldr_scaled(dst: i32, base: i32, index: i32) -> Instruction {
    let enc = 0xF860_7800 | (encoded_reg(index) << 16) | (encoded_reg(base) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("ldr {}, [{}, {}, lsl #3]", xn(dst), xsp(base), xn(index)),
        Opcode::LdrScaled,
    );
    i.dest_reg = dst;
    i.base_reg = base;
    i.src_reg2 = index;
    i.is_mem_op = true;
    i
}

/// STR Xt, [Xn, Xm, LSL #3].
pub fn str_scaled(src: i32, base: i32, index: i32) -> Instruction {
    let enc = 0xF820_7800 | (encoded_reg(index) << 16) | (encoded_reg(base) << 5) | encoded_reg(src);
    let mut i = ins(
        enc,
        format!("str {}, [{}, {}, lsl #3]", xn(src), xsp(base), xn(index)),
        Opcode::Str,
    );
    i.dest_reg = src;
    i.base_reg = base;
    i.src_reg2 = index;
    i.is_mem_op = true;
    i
}

/// LDR Dt, [Xn, #offset].
pub fn ldr_fp(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 8 == 0 && offset / 8 <= 0xFFF);
    let enc = 0xFD40_0000
        | (((offset / 8) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(dst);
    mem(
        Opcode::LdrFp,
        enc,
        format!("ldr {}, [{}, #{offset}]", dn(dst), xsp(base)),
        dst,
        base,
        offset,
    )
}

/// STR Dt, [Xn, #offset].
pub fn str_fp(src: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 8 == 0 && offset / 8 <= 0xFFF);
    let enc = 0xFD00_0000
        | (((offset / 8) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(src);
    mem(
        Opcode::StrFp,
        enc,
        format!("str {}, [{}, #{offset}]", dn(src), xsp(base)),
        src,
        base,
        offset,
    )
}

/// LDR Qt, [Xn, #offset] — 128-bit NEON load.
pub fn ldr_q(dst: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 16 == 0 && offset / 16 <= 0xFFF);
    let enc = 0x3DC0_0000
        | (((offset / 16) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(dst);
    mem(
        Opcode::LdrQ,
        enc,
        format!("ldr q{}, [{}, #{offset}]", dst - FP_REG_BASE, xsp(base)),
        dst,
        base,
        offset,
    )
}

pub fn str_q(src: i32, base: i32, offset: i64) -> Instruction {
    debug_assert!(offset >= 0 && offset % 16 == 0 && offset / 16 <= 0xFFF);
    let enc = 0x3D80_0000
        | (((offset / 16) as u32) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(src);
    mem(
        Opcode::StrQ,
        enc,
        format!("str q{}, [{}, #{offset}]", src - FP_REG_BASE, xsp(base)),
        src,
        base,
        offset,
    )
}

fn pair_mem(
    op: Opcode,
    base_enc: u32,
    t1: i32,
    t2: i32,
    base: i32,
    offset: i64,
    text: String,
) -> Instruction {
    debug_assert!(offset % 8 == 0 && (-512..=504).contains(&offset));
    let imm7 = ((offset / 8) as u32) & 0x7F;
    let enc = base_enc
        | (imm7 << 15)
        | (encoded_reg(t2) << 10)
        | (encoded_reg(base) << 5)
        | encoded_reg(t1);
    let mut i = ins(enc, text, op);
    i.dest_reg = t1;
    i.src_reg1 = t2;
    i.base_reg = base;
    i.immediate = offset;
    i.uses_immediate = true;
    i.is_mem_op = true;
    i
}

/// LDP Xt1, Xt2, [Xn, #offset].
pub fn ldp(t1: i32, t2: i32, base: i32, offset: i64) -> Instruction {
    pair_mem(
        Opcode::Ldp,
        0xA940_0000,
        t1,
        t2,
        base,
        offset,
        format!("ldp {}, {}, [{}, #{offset}]", xn(t1), xn(t2), xsp(base)),
    )
}

/// STP Xt1, Xt2, [Xn, #offset].
pub fn stp(t1: i32, t2: i32, base: i32, offset: i64) -> Instruction {
    pair_mem(
        Opcode::Stp,
        0xA900_0000,
        t1,
        t2,
        base,
        offset,
        format!("stp {}, {}, [{}, #{offset}]", xn(t1), xn(t2), xsp(base)),
    )
}

/// STP Xt1, Xt2, [Xn, #offset]! — pre-indexed, for prologue pushes.
pub fn stp_pre(t1: i32, t2: i32, base: i32, offset: i64) -> Instruction {
    pair_mem(
        Opcode::Stp,
        0xA980_0000,
        t1,
        t2,
        base,
        offset,
        format!("stp {}, {}, [{}, #{offset}]!", xn(t1), xn(t2), xsp(base)),
    )
}

/// LDP Xt1, Xt2, [Xn], #offset — post-indexed, for epilogue pops.
pub fn ldp_post(t1: i32, t2: i32, base: i32, offset: i64) -> Instruction {
    pair_mem(
        Opcode::Ldp,
        0xA8C0_0000,
        t1,
        t2,
        base,
        offset,
        format!("ldp {}, {}, [{}], #{offset}", xn(t1), xn(t2), xsp(base)),
    )
}

// --- Branches ------------------------------------------------------------

pub fn b(label: impl Into<String>) -> Instruction {
    let label = label.into();
    let mut i = ins(0x1400_0000, format!("b {label}"), Opcode::B);
    i.branch_target = label;
    i.relocation = Relocation::PcRelative26BitOffset;
    i
}

pub fn bl(label: impl Into<String>) -> Instruction {
    let label = label.into();
    let mut i = ins(0x9400_0000, format!("bl {label}"), Opcode::Bl);
    i.branch_target = label;
    i.relocation = Relocation::PcRelative26BitOffset;
    i
}

pub fn b_cond(cond: Cond, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0x5400_0000 | (cond as u32);
    let mut i = ins(enc, format!("b.{} {label}", cond.name()), Opcode::BCond);
    i.cond = Some(cond);
    i.branch_target = label;
    i.relocation = Relocation::PcRelative19BitOffset;
    i
}

pub fn cbz(reg: i32, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0xB400_0000 | encoded_reg(reg);
    let mut i = ins(enc, format!("cbz {}, {label}", xn(reg)), Opcode::Cbz);
    i.src_reg1 = reg;
    i.branch_target = label;
    i.relocation = Relocation::PcRelative19BitOffset;
    i
}

pub fn cbnz(reg: i32, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0xB500_0000 | encoded_reg(reg);
    let mut i = ins(enc, format!("cbnz {}, {label}", xn(reg)), Opcode::Cbnz);
    i.src_reg1 = reg;
    i.branch_target = label;
    i.relocation = Relocation::PcRelative19BitOffset;
    i
}

pub fn br(reg: i32) -> Instruction {
    let enc = 0xD61F_0000 | (encoded_reg(reg) << 5);
    let mut i = ins(enc, format!("br {}", xn(reg)), Opcode::Br);
    i.src_reg1 = reg;
    i
}

pub fn blr(reg: i32) -> Instruction {
    let enc = 0xD63F_0000 | (encoded_reg(reg) << 5);
    let mut i = ins(enc, format!("blr {}", xn(reg)), Opcode::Blr);
    i.src_reg1 = reg;
    i
}

pub fn ret() -> Instruction {
    ins(0xD65F_03C0, "ret".to_string(), Opcode::Ret)
}

// --- PC-relative addresses -----------------------------------------------

/// ADR Xd, label (±1 MiB byte-precise).
pub fn adr(dst: i32, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0x1000_0000 | encoded_reg(dst);
    let mut i = ins(enc, format!("adr {}, {label}", xn(dst)), Opcode::Adr);
    i.dest_reg = dst;
    i.jit_attribute = crate::instruction::JitAttribute::AddressLoad;
    i = i.with_reloc(Relocation::PcRelative19BitOffset, label);
    i
}

/// ADRP Xd, label (page-aligned, ±4 GiB).
pub fn adrp(dst: i32, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0x9000_0000 | encoded_reg(dst);
    let mut i = ins(enc, format!("adrp {}, {label}", xn(dst)), Opcode::Adrp);
    i.dest_reg = dst;
    i.jit_attribute = crate::instruction::JitAttribute::AddressLoad;
    i = i.with_reloc(Relocation::AdrpHigh21, label);
    i
}

/// ADD Xd, Xn, #:lo12:label.
pub fn add_lo12(dst: i32, src: i32, label: impl Into<String>) -> Instruction {
    let label = label.into();
    let enc = 0x9100_0000 | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("add {}, {}, #:lo12:{label}", xn(dst), xn(src)),
        Opcode::Add,
    );
    i.dest_reg = dst;
    i.src_reg1 = src;
    i.jit_attribute = crate::instruction::JitAttribute::AddressLoad;
    i = i.with_reloc(Relocation::Add12BitUnsignedOffset, label);
    i
}

// --- System --------------------------------------------------------------

pub fn nop() -> Instruction {
    ins(0xD503_201F, "nop".to_string(), Opcode::Nop)
}

/// DMB ISH — data memory barrier, inner shareable.
pub fn dmb_ish() -> Instruction {
    ins(0xD503_3BBF, "dmb ish".to_string(), Opcode::Dmb)
}

pub fn isb() -> Instruction {
    ins(0xD503_3FDF, "isb".to_string(), Opcode::Isb)
}

pub fn brk(imm: u16) -> Instruction {
    let enc = 0xD420_0000 | ((imm as u32) << 5);
    let mut i = ins(enc, format!("brk #{imm}"), Opcode::Brk);
    i.immediate = imm as i64;
    i.uses_immediate = true;
    i
}

pub fn svc(imm: u16) -> Instruction {
    let enc = 0xD400_0001 | ((imm as u32) << 5);
    let mut i = ins(enc, format!("svc #{imm}"), Opcode::Svc);
    i.immediate = imm as i64;
    i.uses_immediate = true;
    i
}

// --- NEON pairwise reductions -------------------------------------------

fn neon_pairwise(
    op: Opcode,
    enc_base: u32,
    dst: i32,
    a: i32,
    b: i32,
    arr: Arrangement,
    name: &str,
) -> Instruction {
    let enc = enc_base | (encoded_reg(b) << 16) | (encoded_reg(a) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!(
            "{name} {}.{arrn}, {}.{arrn}, {}.{arrn}",
            vn(dst),
            vn(a),
            vn(b),
            arrn = arr.name()
        ),
        op,
    );
    i.dest_reg = dst;
    i.src_reg1 = a;
    i.src_reg2 = b;
    i
}

pub fn faddp(dst: i32, a: i32, b: i32, arr: Arrangement) -> Instruction {
    let base = match arr {
        Arrangement::FourS => 0x6E20_D400,
        Arrangement::TwoS => 0x2E20_D400,
        Arrangement::FourH => 0x2E40_1400,
    };
    neon_pairwise(Opcode::Faddp, base, dst, a, b, arr, "faddp")
}

pub fn fmaxp(dst: i32, a: i32, b: i32, arr: Arrangement) -> Instruction {
    let base = match arr {
        Arrangement::FourS => 0x6E20_F400,
        Arrangement::TwoS => 0x2E20_F400,
        Arrangement::FourH => 0x2E40_3400,
    };
    neon_pairwise(Opcode::Fmaxp, base, dst, a, b, arr, "fmaxp")
}

pub fn fminp(dst: i32, a: i32, b: i32, arr: Arrangement) -> Instruction {
    let base = match arr {
        Arrangement::FourS => 0x6EA0_F400,
        Arrangement::TwoS => 0x2EA0_F400,
        Arrangement::FourH => 0x2EC0_3400,
    };
    neon_pairwise(Opcode::Fminp, base, dst, a, b, arr, "fminp")
}

pub fn addp(dst: i32, a: i32, b: i32, arr: Arrangement) -> Instruction {
    let base = match arr {
        Arrangement::FourS => 0x4EA0_BC00,
        Arrangement::TwoS => 0x0EA0_BC00,
        Arrangement::FourH => 0x0E60_BC00,
    };
    neon_pairwise(Opcode::Addp, base, dst, a, b, arr, "addp")
}

pub fn sminp(dst: i32, a: i32, b: i32, arr: Arrangement) -> Instruction {
    let base = match arr {
        Arrangement::FourS => 0x4EA0_AC00,
        Arrangement::TwoS => 0x0EA0_AC00,
        Arrangement::FourH => 0x0E60_AC00,
    };
    neon_pairwise(Opcode::Sminp, base, dst, a, b, arr, "sminp")
}

/// UMOV Wd, Vn.S[lane].
pub fn umov_ws(dst: i32, src: i32, lane: u32) -> Instruction {
    debug_assert!(lane < 4);
    let imm5 = 0b00100 | (lane << 3);
    let enc = 0x0E00_3C00 | (imm5 << 16) | (encoded_reg(src) << 5) | encoded_reg(dst);
    let mut i = ins(
        enc,
        format!("umov {}, {}.s[{lane}]", wn(dst), vn(src)),
        Opcode::Umov,
    );
    i.dest_reg = dst;
    i.src_reg1 = src;
    i.immediate = lane as i64;
    i.uses_immediate = true;
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movz_encoding_matches_reference() {
        // movz x0, #42  ->  0xD2800540
        assert_eq!(movz(0, 42, 0).encoding, 0xD280_0540);
        // movk x3, #0xBEEF, lsl #16
        assert_eq!(movk(3, 0xBEEF, 16).encoding, 0xF2B7_DDE3);
    }

    #[test]
    fn add_sub_encodings() {
        // add x0, x1, #16  ->  0x91004020
        assert_eq!(add_imm(0, 1, 16).encoding, 0x9100_4020);
        // sub sp, sp, #32
        assert_eq!(sub_imm(31, 31, 32).encoding, 0xD100_83FF);
        // add x2, x3, x4
        assert_eq!(add_reg(2, 3, 4).encoding, 0x8B04_0062);
    }

    #[test]
    fn mul_is_madd_with_zero_accumulator() {
        // mul x0, x1, x2  ->  madd x0, x1, x2, xzr
        assert_eq!(mul(0, 1, 2).encoding, 0x9B02_7C20);
    }

    #[test]
    fn memory_encodings() {
        // ldr x0, [x1, #8]
        assert_eq!(ldr_imm(0, 1, 8).encoding, 0xF940_0420);
        // str x0, [sp, #16]
        assert_eq!(str_imm(0, 31, 16).encoding, 0xF900_0BE0);
        // stp x29, x30, [sp, #-16]!
        assert_eq!(stp_pre(29, 30, 31, -16).encoding, 0xA9BF_7BFD);
        // ldp x29, x30, [sp], #16
        assert_eq!(ldp_post(29, 30, 31, 16).encoding, 0xA8C1_7BFD);
    }

    #[test]
    fn bitfield_aliases() {
        // lsl x0, x1, #3 == ubfm x0, x1, #61, #60
        assert_eq!(lsl_imm(0, 1, 3).encoding, 0xD37D_F020);
        // ubfx x0, x1, #0, #32
        assert_eq!(ubfx(0, 1, 0, 32).encoding, 0xD340_7C20);
        // bfi x0, x1, #32, #32
        assert_eq!(bfi(0, 1, 32, 32).encoding, 0xB360_7C20);
        // sbfx x2, x3, #32, #32
        assert_eq!(sbfx(2, 3, 32, 32).encoding, 0x9360_FC62);
    }

    #[test]
    fn branch_and_system() {
        assert_eq!(ret().encoding, 0xD65F_03C0);
        assert_eq!(nop().encoding, 0xD503_201F);
        assert_eq!(dmb_ish().encoding, 0xD503_3BBF);
        assert_eq!(br(10).encoding, 0xD61F_0140);
        // blr x9
        assert_eq!(blr(9).encoding, 0xD63F_0120);
    }

    #[test]
    fn label_instructions_carry_relocations_not_offsets() {
        let i = bl("veneer_WRITEF");
        assert_eq!(i.encoding, 0x9400_0000, "immediate field left zero");
        assert_eq!(i.relocation, Relocation::PcRelative26BitOffset);
        assert_eq!(i.branch_target, "veneer_WRITEF");
        let j = b_cond(Cond::Eq, "L1");
        assert_eq!(j.relocation, Relocation::PcRelative19BitOffset);
        // Address loads carry the symbol where the optimizer's deletion
        // guard looks for it.
        let k = adrp(0, "str_3");
        assert_eq!(k.target_label, "str_3");
        assert_eq!(k.relocation, Relocation::AdrpHigh21);
    }

    #[test]
    fn fp_encodings() {
        // fadd d0, d1, d2
        assert_eq!(fadd(32, 33, 34).encoding, 0x1E62_2820);
        // fmov d0, x1
        assert_eq!(fmov_x_to_d(32, 1).encoding, 0x9E67_0020);
        // scvtf d0, x0
        assert_eq!(scvtf(32, 0).encoding, 0x9E62_0000);
        // fcvtzs x0, d0
        assert_eq!(fcvtzs(0, 32).encoding, 0x9E78_0000);
    }

    #[test]
    fn neon_pairwise_encodings() {
        // faddp v0.4s, v1.4s, v2.4s
        assert_eq!(
            faddp(32, 33, 34, Arrangement::FourS).encoding,
            0x6E22_D420
        );
        // fminp v0.2s, v1.2s, v2.2s
        assert_eq!(fminp(32, 33, 34, Arrangement::TwoS).encoding, 0x2EA2_F420);
        // addp v3.4s, v4.4s, v5.4s
        assert_eq!(addp(35, 36, 37, Arrangement::FourS).encoding, 0x4EA5_BC83);
    }

    #[test]
    fn load_immediate_splits_into_half_words() {
        let seq = load_immediate(0, 0x1_0000_002A);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].opcode, Opcode::Movz);
        assert_eq!(seq[1].opcode, Opcode::Movk);
        let zero = load_immediate(5, 0);
        assert_eq!(zero.len(), 1);
    }
}
