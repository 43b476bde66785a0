//! Code listings: address, hex word, assembly text, relocation annotation.
//!
//! Produced after linking when listing output is enabled; purely a
//! formatting concern, nothing here feeds back into the pipeline.

use crate::linker::LinkedModule;
use core_encoder::instruction::Relocation;
use std::fmt::Write;

pub fn format_listing(module: &LinkedModule) -> String {
    let mut out = String::new();
    for ins in &module.instructions {
        if ins.is_label_definition {
            let _ = writeln!(out, "{}:", ins.label);
            continue;
        }
        let _ = write!(
            out,
            "  {:#010x}  {:08x}  {}",
            ins.address, ins.encoding, ins.assembly_text
        );
        if ins.relocation != Relocation::None && ins.relocation_applied {
            let symbol = if ins.resolved_symbol_name.is_empty() {
                if ins.branch_target.is_empty() {
                    ins.target_label.as_str()
                } else {
                    ins.branch_target.as_str()
                }
            } else {
                ins.resolved_symbol_name.as_str()
            };
            let _ = write!(
                out,
                "    ; {:?} -> {} @ {:#x}",
                ins.relocation, symbol, ins.resolved_target_address
            );
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::Linker;
    use core_encoder::encode;
    use core_encoder::instruction::Instruction;
    use core_runtime::RuntimeManager;
    use std::collections::BTreeSet;

    #[test]
    fn listing_shows_addresses_and_relocations() {
        let rt = RuntimeManager::new();
        let linker = Linker::new(&rt);
        let code = vec![
            encode::b("L"),
            Instruction::label_def("L"),
            encode::ret(),
        ];
        let module = linker.link(code, vec![], &BTreeSet::new(), 0x1000).unwrap();
        let listing = format_listing(&module);
        assert!(listing.contains("0x00001000"));
        assert!(listing.contains("L:"));
        assert!(listing.contains("PcRelative26BitOffset -> L"));
        assert!(listing.contains("ret"));
    }
}
