//! Label resolution, relocation patching, and veneer synthesis.
//!
//! One pass per module: veneers for external runtime symbols sit at the
//! head of the code section, followed by the generated code and then the
//! read-only data, 16-byte aligned. Every non-label record occupies exactly
//! 4 bytes (a 64-bit data word is two records), so address assignment is a
//! single walk. Relocations are then patched through the bit patcher;
//! an undefined label or an out-of-range branch after veneer emission is
//! fatal.

use crate::patch;
use core_encoder::instruction::{Instruction, Opcode, Relocation, Segment};
use core_runtime::RuntimeManager;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),
    #[error("runtime symbol '{0}' not in the registry")]
    UnknownRuntimeSymbol(String),
    #[error(transparent)]
    Patch(#[from] patch::PatchError),
}

/// Register holding the veneer's loaded target. x10 is caller-saved and
/// never carries arguments.
const VENEER_SCRATCH: i32 = 10;
/// LDR (literal) of the quadword two instructions ahead.
const VENEER_LDR: u32 = 0x5800_0000 | (2 << 5) | VENEER_SCRATCH as u32;

pub fn veneer_label(symbol: &str) -> String {
    format!("veneer_{symbol}")
}

#[derive(Debug)]
pub struct LinkedModule {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, u64>,
    pub base_address: u64,
    pub total_size: usize,
    /// Writable data segment laid out at its own base.
    pub data_base: u64,
    pub data_size: usize,
}

impl LinkedModule {
    pub fn address_of(&self, label: &str) -> Option<u64> {
        self.labels.get(label).copied()
    }

    /// Raw code+rodata bytes in layout order, ready to copy into the JIT
    /// buffer.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size);
        for ins in &self.instructions {
            if ins.is_label_definition
                || ins.opcode == Opcode::Directive
                || ins.segment == Segment::Data
            {
                continue;
            }
            out.extend_from_slice(&ins.encoding.to_le_bytes());
        }
        out
    }

    /// Initial image of the writable data segment.
    pub fn data_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_size);
        for ins in &self.instructions {
            if ins.segment != Segment::Data || ins.is_label_definition {
                continue;
            }
            out.extend_from_slice(&ins.encoding.to_le_bytes());
        }
        out
    }
}

pub struct Linker<'a> {
    runtime: &'a RuntimeManager,
}

impl<'a> Linker<'a> {
    pub fn new(runtime: &'a RuntimeManager) -> Linker<'a> {
        Linker { runtime }
    }

    pub fn link(
        &self,
        code: Vec<Instruction>,
        rodata: Vec<Instruction>,
        externals: &BTreeSet<String>,
        base_address: u64,
    ) -> Result<LinkedModule, LinkError> {
        self.link_with_data(code, rodata, Vec::new(), externals, base_address, 0)
    }

    /// Full layout: `[veneers][code][rodata]` at `base_address` plus a
    /// writable data segment at `data_base`.
    pub fn link_with_data(
        &self,
        code: Vec<Instruction>,
        rodata: Vec<Instruction>,
        data: Vec<Instruction>,
        externals: &BTreeSet<String>,
        base_address: u64,
        data_base: u64,
    ) -> Result<LinkedModule, LinkError> {
        let mut instructions = self.emit_veneers(externals)?;
        instructions.extend(code);

        // Align the read-only data to 16 bytes with NOP padding records.
        if !rodata.is_empty() {
            let code_bytes = emitted_bytes(&instructions);
            let mut pad = (16 - (base_address as usize + code_bytes) % 16) % 16;
            while pad > 0 {
                instructions.push(core_encoder::encode::nop().with_nopeep());
                pad -= 4;
            }
            instructions.extend(rodata);
        }

        // 1. Address assignment: 4 bytes per emitted record. The data
        // segment counts from its own base.
        let mut address = base_address;
        for ins in &mut instructions {
            ins.address = address;
            if !ins.is_label_definition && ins.opcode != Opcode::Directive {
                address += 4;
            }
        }
        let total_size = (address - base_address) as usize;
        let mut data = data;
        let mut data_address = data_base;
        for ins in &mut data {
            ins.address = data_address;
            if !ins.is_label_definition {
                data_address += 4;
            }
        }
        let data_size = (data_address - data_base) as usize;
        instructions.extend(data);

        // 2. Label collection.
        let mut labels: HashMap<String, u64> = HashMap::new();
        for ins in &instructions {
            if ins.is_label_definition {
                labels.insert(ins.label.clone(), ins.address);
            }
        }

        // 3. Relocation patching.
        // Split borrow: data continuation records are patched alongside
        // their primaries, so walk by index.
        for idx in 0..instructions.len() {
            if instructions[idx].relocation == Relocation::None {
                continue;
            }
            let target = self.resolve_target(&instructions[idx], &labels)?;
            let ins = &mut instructions[idx];
            ins.resolved_target_address = target;

            if ins.is_data_value {
                // Absolute address spread across the two data records.
                ins.encoding = (target & 0xFFFF_FFFF) as u32;
                ins.relocation_applied = true;
                if let Some(high) = instructions.get_mut(idx + 1) {
                    high.encoding = (target >> 32) as u32;
                }
                continue;
            }

            let pc = instructions[idx].address;
            let ins = &mut instructions[idx];
            let offset = target as i64 - pc as i64;
            let symbol = if ins.branch_target.is_empty() {
                ins.target_label.clone()
            } else {
                ins.branch_target.clone()
            };
            ins.encoding = match ins.relocation {
                Relocation::PcRelative26BitOffset => {
                    patch::patch_branch26(ins.encoding, offset, &symbol)?
                }
                Relocation::PcRelative19BitOffset => {
                    if ins.opcode == Opcode::Adr {
                        patch::patch_adr(ins.encoding, offset, &symbol)?
                    } else {
                        patch::patch_branch19(ins.encoding, offset, &symbol)?
                    }
                }
                Relocation::AdrpHigh21 => {
                    patch::patch_adrp(ins.encoding, pc, target, &symbol)?
                }
                Relocation::Add12BitUnsignedOffset => {
                    patch::patch_add_lo12(ins.encoding, target)
                }
                Relocation::PageOffset12Scaled => {
                    patch::patch_page_off12(ins.encoding, target, 8)
                }
                Relocation::MovzMovkAbs64 => patch::patch_movz_movk_abs(ins.encoding, target),
                Relocation::None => unreachable!(),
            };
            ins.resolved_symbol_name = symbol;
            ins.relocation_applied = true;
            trace!(
                target: "linker",
                pc,
                target,
                symbol = %ins.resolved_symbol_name,
                "relocation_patched"
            );
        }

        debug!(
            target: "linker",
            base = base_address,
            size = total_size,
            labels = labels.len(),
            veneers = externals.len(),
            "module_linked"
        );
        Ok(LinkedModule {
            instructions,
            labels,
            base_address,
            total_size,
            data_base,
            data_size,
        })
    }

    /// 16-byte veneer per external symbol: LDR x10,#8; BR x10; .quad addr.
    /// The address quadword lives in the code section so one cache
    /// maintenance sweep covers it.
    fn emit_veneers(&self, externals: &BTreeSet<String>) -> Result<Vec<Instruction>, LinkError> {
        let mut out = Vec::new();
        for symbol in externals {
            let address = self
                .runtime
                .address_of(symbol)
                .map_err(|_| LinkError::UnknownRuntimeSymbol(symbol.clone()))?;
            out.push(Instruction::label_def(veneer_label(symbol)));
            let mut ldr = Instruction::new(
                VENEER_LDR,
                format!("ldr x{VENEER_SCRATCH}, #8"),
                Opcode::Ldr,
            );
            ldr.dest_reg = VENEER_SCRATCH;
            out.push(ldr.with_nopeep());
            out.push(core_encoder::encode::br(VENEER_SCRATCH).with_nopeep());
            for mut word in Instruction::data64(address, Segment::Code) {
                word.nopeep = true;
                word.resolved_symbol_name = symbol.clone();
                out.push(word);
            }
        }
        Ok(out)
    }

    fn resolve_target(
        &self,
        ins: &Instruction,
        labels: &HashMap<String, u64>,
    ) -> Result<u64, LinkError> {
        let name = if !ins.branch_target.is_empty() {
            &ins.branch_target
        } else {
            &ins.target_label
        };
        if let Some(addr) = labels.get(name) {
            return Ok(*addr);
        }
        // Not a defined label: a runtime symbol, reached directly when the
        // code generator assumed it was in range.
        self.runtime
            .address_of(name)
            .map_err(|_| LinkError::UndefinedLabel(name.clone()))
    }
}

fn emitted_bytes(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .filter(|i| !i.is_label_definition && i.opcode != Opcode::Directive)
        .count()
        * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_encoder::encode;
    use core_encoder::instruction::Cond;

    fn runtime() -> RuntimeManager {
        RuntimeManager::new()
    }

    #[test]
    fn forward_branch_resolves_to_label_delta() {
        let rt = runtime();
        let linker = Linker::new(&rt);
        let code = vec![
            encode::b("L_end"),
            encode::nop(),
            Instruction::label_def("L_end"),
            encode::ret(),
        ];
        let module = linker
            .link(code, vec![], &BTreeSet::new(), 0x10000)
            .unwrap();
        let b = &module.instructions[0];
        let decoded = core_encoder::decode_branch_offset(Opcode::B, b.encoding).unwrap();
        assert_eq!(
            decoded,
            module.address_of("L_end").unwrap() as i64 - b.address as i64
        );
    }

    #[test]
    fn undefined_label_is_fatal() {
        let rt = runtime();
        let linker = Linker::new(&rt);
        let code = vec![encode::b_cond(Cond::Eq, "nowhere")];
        let err = linker.link(code, vec![], &BTreeSet::new(), 0).unwrap_err();
        assert!(matches!(err, LinkError::UndefinedLabel(_)));
    }

    #[test]
    fn veneers_sit_at_the_head_of_the_module() {
        let rt = runtime();
        let linker = Linker::new(&rt);
        let mut externals = BTreeSet::new();
        externals.insert("WRITEN".to_string());
        let code = vec![encode::bl(veneer_label("WRITEN")), encode::ret()];
        let module = linker.link(code, vec![], &externals, 0x4000).unwrap();
        // Veneer label is the base address; its quadword holds the native
        // function pointer.
        assert_eq!(module.address_of("veneer_WRITEN"), Some(0x4000));
        let expected = rt.address_of("WRITEN").unwrap();
        let low = module.instructions[3].encoding as u64;
        let high = module.instructions[4].encoding as u64;
        assert_eq!(low | (high << 32), expected);
        // The BL patches to the veneer, 16 bytes of veneer before it.
        let bl = module
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::Bl)
            .unwrap();
        let decoded = core_encoder::decode_branch_offset(Opcode::Bl, bl.encoding).unwrap();
        assert_eq!(bl.address as i64 + decoded, 0x4000);
    }

    #[test]
    fn rodata_is_aligned_and_data_words_count_eight_bytes() {
        let rt = runtime();
        let linker = Linker::new(&rt);
        let code = vec![encode::ret()];
        let mut rodata = vec![Instruction::label_def("str_0")];
        rodata.extend(Instruction::data64(5, Segment::Rodata));
        let module = linker.link(code, rodata, &BTreeSet::new(), 0).unwrap();
        let addr = module.address_of("str_0").unwrap();
        assert_eq!(addr % 16, 0);
        assert_eq!(module.total_size % 4, 0);
        let bytes = module.bytes();
        assert_eq!(bytes.len(), module.total_size);
        // The length word is in the image at the label's offset.
        let off = addr as usize;
        assert_eq!(
            u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap()),
            5
        );
    }
}
