//! Value types as a bitset over base kinds.
//!
//! A value type is either a single base kind (`INTEGER`, `FLOAT`, ...) or a
//! pointer flavor built by OR-ing `POINTER` with the pointee kinds, e.g.
//! `POINTER | VEC | INTEGER` for the result of `GETVEC`. The bitset form lets
//! the analyzer refine types monotonically without a lattice structure.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VarType: u32 {
        const INTEGER = 1 << 0;
        const FLOAT   = 1 << 1;
        const STRING  = 1 << 2;
        const PAIR    = 1 << 3;
        const FPAIR   = 1 << 4;
        const QUAD    = 1 << 5;
        const FQUAD   = 1 << 6;
        const OCT     = 1 << 7;
        const FOCT    = 1 << 8;
        const VEC     = 1 << 9;
        const FVEC    = 1 << 10;
        const PAIRS   = 1 << 11;
        const FPAIRS  = 1 << 12;
        const LIST    = 1 << 13;
        const OBJECT  = 1 << 14;
        const POINTER = 1 << 15;
        const ANY     = 1 << 16;
    }
}

impl VarType {
    /// Not yet inferred. Distinct from `ANY`, which is a deliberate wildcard
    /// (the four anonymous function temporaries are `ANY`).
    pub const UNKNOWN: VarType = VarType::empty();

    pub const POINTER_TO_INT_VEC: VarType =
        VarType::POINTER.union(VarType::VEC).union(VarType::INTEGER);
    pub const POINTER_TO_FLOAT_VEC: VarType =
        VarType::POINTER.union(VarType::FVEC).union(VarType::FLOAT);
    pub const POINTER_TO_STRING_LIST: VarType =
        VarType::POINTER.union(VarType::LIST).union(VarType::STRING);
    pub const POINTER_TO_OBJECT: VarType = VarType::POINTER.union(VarType::OBJECT);

    pub fn is_unknown(self) -> bool {
        self.is_empty()
    }

    /// True when values of this type live in FP registers.
    pub fn is_float_like(self) -> bool {
        self.intersects(VarType::FLOAT | VarType::FPAIR | VarType::FQUAD | VarType::FOCT)
            && !self.contains(VarType::POINTER)
    }

    pub fn is_packed(self) -> bool {
        self.intersects(
            VarType::PAIR
                | VarType::FPAIR
                | VarType::QUAD
                | VarType::FQUAD
                | VarType::OCT
                | VarType::FOCT,
        )
    }

    /// Short name used in trace output and NEON registry keys. (Bitset
    /// constants are not patterns, hence the equality chain.)
    pub fn display_name(self) -> &'static str {
        const NAMES: &[(VarType, &str)] = &[
            (VarType::INTEGER, "INTEGER"),
            (VarType::FLOAT, "FLOAT"),
            (VarType::STRING, "STRING"),
            (VarType::PAIR, "PAIR"),
            (VarType::FPAIR, "FPAIR"),
            (VarType::QUAD, "QUAD"),
            (VarType::FQUAD, "FQUAD"),
            (VarType::OCT, "OCT"),
            (VarType::FOCT, "FOCT"),
            (VarType::VEC, "VEC"),
            (VarType::FVEC, "FVEC"),
            (VarType::PAIRS, "PAIRS"),
            (VarType::FPAIRS, "FPAIRS"),
            (VarType::ANY, "ANY"),
            (VarType::POINTER_TO_INT_VEC, "VEC8"),
            (VarType::POINTER_TO_FLOAT_VEC, "FVEC8"),
            (VarType::POINTER_TO_STRING_LIST, "STRINGLIST"),
            (VarType::POINTER_TO_OBJECT, "OBJECT"),
        ];
        for (ty, name) in NAMES {
            if self == *ty {
                return name;
            }
        }
        if self.is_unknown() { "UNKNOWN" } else { "MIXED" }
    }
}

impl Default for VarType {
    fn default() -> Self {
        VarType::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_flavors_compose() {
        let t = VarType::POINTER_TO_FLOAT_VEC;
        assert!(t.contains(VarType::POINTER));
        assert!(t.contains(VarType::FLOAT));
        assert!(!t.is_float_like(), "pointers live in integer registers");
    }

    #[test]
    fn unknown_is_empty() {
        assert!(VarType::UNKNOWN.is_unknown());
        assert!(!VarType::ANY.is_unknown());
    }
}
