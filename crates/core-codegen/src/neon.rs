//! NEON pairwise-reduction registry.
//!
//! Lowered reduction loops carry an LLVM-style intrinsic token
//! (`llvm.arm.neon.vpmin.v4f32` and friends). The registry maps
//! `intrinsic:value-type:arrangement` to the pairwise encoder plus its
//! arrangement; when no encoder matches, the code generator falls back to
//! a scalar loop expansion.

use core_ast::VarType;
use core_encoder::encode;
use core_encoder::instruction::{Arrangement, Instruction};
use std::collections::HashMap;
use tracing::{debug, warn};

pub type PairwiseEncoder = fn(i32, i32, i32, Arrangement) -> Instruction;

#[derive(Clone)]
pub struct NeonReducer {
    pub encoder: PairwiseEncoder,
    pub arrangement: Arrangement,
    pub info: &'static str,
}

pub struct NeonReducerRegistry {
    encoders: HashMap<String, NeonReducer>,
}

impl NeonReducerRegistry {
    pub fn new() -> NeonReducerRegistry {
        let mut r = NeonReducerRegistry {
            encoders: HashMap::new(),
        };
        // Float pairwise minimum
        r.register("llvm.arm.neon.vpmin.v4f32", "FVEC8", encode::fminp, Arrangement::FourS, "FMINP.4S for 8-element float vectors");
        r.register("llvm.arm.neon.vpmin.v2f32", "FPAIR", encode::fminp, Arrangement::TwoS, "FMINP.2S for float pairs");
        r.register("llvm.arm.neon.vpmin.v4f16", "FQUAD", encode::fminp, Arrangement::FourH, "FMINP.4H for 16-bit float quads");
        // Integer pairwise minimum
        r.register("llvm.arm.neon.vpmin.v4i32", "VEC8", encode::sminp, Arrangement::FourS, "SMINP.4S for 8-element integer vectors");
        r.register("llvm.arm.neon.vpmin.v2i32", "PAIR", encode::sminp, Arrangement::TwoS, "SMINP.2S for integer pairs");
        // Float pairwise maximum
        r.register("llvm.arm.neon.vpmax.v4f32", "FVEC8", encode::fmaxp, Arrangement::FourS, "FMAXP.4S for 8-element float vectors");
        r.register("llvm.arm.neon.vpmax.v2f32", "FPAIR", encode::fmaxp, Arrangement::TwoS, "FMAXP.2S for float pairs");
        r.register("llvm.arm.neon.vpmax.v4f16", "FQUAD", encode::fmaxp, Arrangement::FourH, "FMAXP.4H for 16-bit float quads");
        // Float pairwise addition
        r.register("llvm.arm.neon.vpadd.v4f32", "FVEC8", encode::faddp, Arrangement::FourS, "FADDP.4S for 8-element float vectors");
        r.register("llvm.arm.neon.vpadd.v2f32", "FPAIR", encode::faddp, Arrangement::TwoS, "FADDP.2S for float pairs");
        r.register("llvm.arm.neon.vpadd.v4f16", "FQUAD", encode::faddp, Arrangement::FourH, "FADDP.4H for 16-bit float quads");
        // Integer pairwise addition
        r.register("llvm.arm.neon.vpadd.v4i32", "VEC8", encode::addp, Arrangement::FourS, "ADDP.4S for 8-element integer vectors");
        r.register("llvm.arm.neon.vpadd.v2i32", "PAIR", encode::addp, Arrangement::TwoS, "ADDP.2S for integer pairs");
        debug!(target: "codegen.neon", count = r.encoders.len(), "neon_reducers_registered");
        r
    }

    fn register(
        &mut self,
        intrinsic: &str,
        value_type: &str,
        encoder: PairwiseEncoder,
        arrangement: Arrangement,
        info: &'static str,
    ) {
        self.encoders.insert(
            make_key(intrinsic, value_type),
            NeonReducer {
                encoder,
                arrangement,
                info,
            },
        );
    }

    pub fn find(&self, intrinsic: &str, value_type: &str) -> Option<&NeonReducer> {
        self.encoders.get(&make_key(intrinsic, value_type))
    }

    /// Exact lookup; a miss reports `used_fallback` so the caller expands
    /// a scalar loop instead.
    pub fn find_with_fallback(
        &self,
        intrinsic: &str,
        value_type: &str,
        used_fallback: &mut bool,
    ) -> Option<&NeonReducer> {
        match self.find(intrinsic, value_type) {
            Some(r) => {
                *used_fallback = false;
                Some(r)
            }
            None => {
                *used_fallback = true;
                warn!(
                    target: "codegen.neon",
                    key = %make_key(intrinsic, value_type),
                    "no_neon_encoder_falling_back_to_scalar"
                );
                None
            }
        }
    }

    pub fn registered_keys(&self) -> Vec<&str> {
        self.encoders.keys().map(String::as_str).collect()
    }
}

impl Default for NeonReducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn make_key(intrinsic: &str, value_type: &str) -> String {
    format!("{intrinsic}:{value_type}:{}", arrangement_of(value_type))
}

/// Map source value types to ARM64 arrangement specifiers.
pub fn arrangement_of(value_type: &str) -> &'static str {
    match value_type {
        "FQUAD" => "4H",
        "FPAIR" | "PAIR" => "2S",
        _ => "4S", // QUAD, OCT, FOCT, VEC8, FVEC8 process in 4S chunks
    }
}

/// Value-type token for a symbol's type, matching the registry keys.
pub fn value_type_token(ty: VarType) -> &'static str {
    if ty == VarType::PAIR {
        "PAIR"
    } else if ty == VarType::FPAIR {
        "FPAIR"
    } else if ty == VarType::QUAD {
        "QUAD"
    } else if ty == VarType::FQUAD {
        "FQUAD"
    } else if ty == VarType::OCT {
        "OCT"
    } else if ty == VarType::FOCT {
        "FOCT"
    } else if ty == VarType::POINTER_TO_FLOAT_VEC {
        "FVEC8"
    } else {
        "VEC8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_encoder::Opcode;

    #[test]
    fn registry_finds_validated_encoders() {
        let reg = NeonReducerRegistry::new();
        let r = reg.find("llvm.arm.neon.vpmin.v2f32", "FPAIR").unwrap();
        assert_eq!(r.arrangement, Arrangement::TwoS);
        let ins = (r.encoder)(32, 33, 34, r.arrangement);
        assert_eq!(ins.opcode, Opcode::Fminp);
    }

    #[test]
    fn unknown_key_reports_fallback() {
        let reg = NeonReducerRegistry::new();
        let mut fallback = false;
        assert!(
            reg.find_with_fallback("llvm.arm.neon.vpmin.v4f64", "FVEC8", &mut fallback)
                .is_none()
        );
        assert!(fallback);
    }

    #[test]
    fn arrangements_follow_value_types() {
        assert_eq!(arrangement_of("FQUAD"), "4H");
        assert_eq!(arrangement_of("FPAIR"), "2S");
        assert_eq!(arrangement_of("OCT"), "4S");
    }
}
