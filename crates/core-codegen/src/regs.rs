//! Physical register allocation for one function at a time.
//!
//! Three pools: caller-saved integers (x9–x15), callee-saved integers
//! (x19–x28), and floats (d0–d7 and d16–d31 caller-saved, d8–d15
//! callee-saved). Variables flagged by liveness as live across a call
//! prefer callee-saved registers; exhaustion falls back to the other pool
//! and finally to a numbered spill slot claimed contiguously in the frame.

use core_encoder::FP_REG_BASE;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

pub const CALLER_SAVED_INT: [i32; 7] = [9, 10, 11, 12, 13, 14, 15];
pub const CALLEE_SAVED_INT: [i32; 10] = [19, 20, 21, 22, 23, 24, 25, 26, 27, 28];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegClass {
    Int,
    Float,
}

fn caller_saved_fp() -> Vec<i32> {
    // d0–d7 carry arguments, so scratch allocation starts at d16.
    (16..32).chain(0..8).map(|d| FP_REG_BASE + d).collect()
}

fn callee_saved_fp() -> Vec<i32> {
    (8..16).map(|d| FP_REG_BASE + d).collect()
}

#[derive(Debug)]
pub struct RegisterManager {
    free_caller_int: Vec<i32>,
    free_callee_int: Vec<i32>,
    free_caller_fp: Vec<i32>,
    free_callee_fp: Vec<i32>,
    /// Callee-saved registers handed out at least once; the prologue must
    /// preserve exactly these.
    used_callee: BTreeSet<i32>,
    /// Durable variable → register bindings (callee-saved promotions).
    bindings: HashMap<String, i32>,
    next_spill_slot: u32,
}

impl RegisterManager {
    pub fn new() -> RegisterManager {
        RegisterManager {
            free_caller_int: CALLER_SAVED_INT.to_vec(),
            free_callee_int: CALLEE_SAVED_INT.to_vec(),
            free_caller_fp: caller_saved_fp(),
            free_callee_fp: callee_saved_fp(),
            used_callee: BTreeSet::new(),
            bindings: HashMap::new(),
            next_spill_slot: 0,
        }
    }

    /// Acquire a scratch register. `prefer_callee_saved` biases allocation
    /// for values that must survive a call.
    pub fn acquire(&mut self, class: RegClass, prefer_callee_saved: bool) -> Option<i32> {
        let (first, second): (&mut Vec<i32>, &mut Vec<i32>) = match (class, prefer_callee_saved) {
            (RegClass::Int, true) => (&mut self.free_callee_int, &mut self.free_caller_int),
            (RegClass::Int, false) => (&mut self.free_caller_int, &mut self.free_callee_int),
            (RegClass::Float, true) => (&mut self.free_callee_fp, &mut self.free_caller_fp),
            (RegClass::Float, false) => (&mut self.free_caller_fp, &mut self.free_callee_fp),
        };
        let reg = if let Some(r) = first.first().copied() {
            first.remove(0);
            r
        } else if let Some(r) = second.first().copied() {
            second.remove(0);
            r
        } else {
            return None;
        };
        if is_callee_saved(reg) {
            self.used_callee.insert(reg);
        }
        Some(reg)
    }

    pub fn release(&mut self, reg: i32) {
        if reg < 0 || self.bindings.values().any(|&r| r == reg) {
            return; // bound registers stay allocated for the function
        }
        let pool = if reg >= FP_REG_BASE {
            let d = reg - FP_REG_BASE;
            if (8..16).contains(&d) {
                &mut self.free_callee_fp
            } else {
                &mut self.free_caller_fp
            }
        } else if CALLEE_SAVED_INT.contains(&reg) {
            &mut self.free_callee_int
        } else if CALLER_SAVED_INT.contains(&reg) {
            &mut self.free_caller_int
        } else {
            return; // argument/special registers are not pooled
        };
        if !pool.contains(&reg) {
            pool.push(reg);
        }
    }

    /// Bind `name` to a register for the whole function (callee-saved
    /// promotion). Returns the register, or `None` when the pool is dry
    /// and the variable stays frame-resident.
    pub fn bind_variable(&mut self, name: &str, class: RegClass) -> Option<i32> {
        if let Some(r) = self.bindings.get(name) {
            return Some(*r);
        }
        let reg = self.acquire(class, true)?;
        if !is_callee_saved(reg) {
            // A caller-saved binding would die at the first call, which is
            // exactly what promotion exists to avoid.
            self.release(reg);
            return None;
        }
        trace!(target: "codegen.regs", name, reg, "variable_promoted");
        self.bindings.insert(name.to_string(), reg);
        Some(reg)
    }

    pub fn binding(&self, name: &str) -> Option<i32> {
        self.bindings.get(name).copied()
    }

    /// Callee-saved registers the prologue must save, in order.
    pub fn used_callee_saved(&self) -> Vec<i32> {
        self.used_callee.iter().copied().collect()
    }

    /// Claim the next contiguous spill slot.
    pub fn claim_spill_slot(&mut self) -> u32 {
        let slot = self.next_spill_slot;
        self.next_spill_slot += 1;
        slot
    }

    pub fn spill_slot_count(&self) -> u32 {
        self.next_spill_slot
    }
}

pub fn is_callee_saved(reg: i32) -> bool {
    CALLEE_SAVED_INT.contains(&reg)
        || (reg >= FP_REG_BASE && (8..16).contains(&(reg - FP_REG_BASE)))
}

impl Default for RegisterManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biased_acquire_prefers_callee_saved() {
        let mut rm = RegisterManager::new();
        let r = rm.acquire(RegClass::Int, true).unwrap();
        assert!(CALLEE_SAVED_INT.contains(&r));
        let s = rm.acquire(RegClass::Int, false).unwrap();
        assert!(CALLER_SAVED_INT.contains(&s));
    }

    #[test]
    fn exhaustion_falls_over_to_other_pool() {
        let mut rm = RegisterManager::new();
        for _ in 0..CALLER_SAVED_INT.len() {
            rm.acquire(RegClass::Int, false).unwrap();
        }
        let r = rm.acquire(RegClass::Int, false).unwrap();
        assert!(CALLEE_SAVED_INT.contains(&r));
    }

    #[test]
    fn bound_registers_survive_release() {
        let mut rm = RegisterManager::new();
        let r = rm.bind_variable("N", RegClass::Int).unwrap();
        rm.release(r);
        assert_eq!(rm.binding("N"), Some(r));
        assert!(rm.used_callee_saved().contains(&r));
    }

    #[test]
    fn spill_slots_are_contiguous() {
        let mut rm = RegisterManager::new();
        assert_eq!(rm.claim_spill_slot(), 0);
        assert_eq!(rm.claim_spill_slot(), 1);
        assert_eq!(rm.spill_slot_count(), 2);
    }
}
