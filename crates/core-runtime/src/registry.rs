//! The runtime registry: single source of truth for runtime-callable
//! symbols.
//!
//! Every function BCPL code can call has exactly one entry binding its name
//! to the native pointer, the external label used by a standalone object
//! file, its arity, family, return type, and symbol kind. Initialization
//! populates both the manager (consulted by the external-function scanner
//! and the linker) and the symbol table (consulted by the analyzer and code
//! generator); a verification step asserts afterwards that every entry is
//! retrievable, and a miss is a fatal startup error.

use crate::natives;
use core_ast::VarType;
use core_symbols::{ParameterInfo, Symbol, SymbolError, SymbolKind, SymbolTable};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime symbol '{0}' is not registered")]
    UnknownSymbol(String),
    #[error("registry verification failed: '{0}' missing from the symbol table")]
    VerificationFailed(String),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionFamily {
    Standard,
    Float,
}

#[derive(Debug, Clone)]
pub struct RuntimeEntry {
    pub name: &'static str,
    pub address: usize,
    /// Label form used by the standalone object-file path.
    pub external_label: &'static str,
    pub arity: u8,
    pub family: FunctionFamily,
    pub return_type: VarType,
    pub kind: SymbolKind,
    pub description: &'static str,
}

macro_rules! entry {
    ($name:literal, $func:expr, $label:literal, $arity:literal, $family:ident, $ret:expr, $kind:ident, $desc:literal) => {
        RuntimeEntry {
            name: $name,
            address: $func as usize,
            external_label: $label,
            arity: $arity,
            family: FunctionFamily::$family,
            return_type: $ret,
            kind: SymbolKind::$kind,
            description: $desc,
        }
    };
}

/// The master table. Every runtime function callable from compiled code
/// must appear here.
pub fn standard_registry() -> Vec<RuntimeEntry> {
    vec![
        // Core I/O
        entry!("WRITES", natives::bcpl_writes, "_WRITES", 1, Standard, VarType::INTEGER, RuntimeRoutine, "Write a string to output"),
        entry!("WRITEN", natives::bcpl_writen, "_WRITEN", 1, Standard, VarType::INTEGER, RuntimeRoutine, "Write an integer to output"),
        entry!("FWRITE", natives::bcpl_fwrite, "_FWRITE", 1, Float, VarType::FLOAT, RuntimeFloatRoutine, "Write a float to output"),
        entry!("WRITEF", natives::bcpl_writef, "_WRITEF", 8, Standard, VarType::INTEGER, RuntimeRoutine, "Write formatted output"),
        entry!("WRITEC", natives::bcpl_writec, "_WRITEC", 1, Standard, VarType::INTEGER, RuntimeRoutine, "Write a character to output"),
        entry!("RDCH", natives::bcpl_rdch, "_RDCH", 0, Standard, VarType::INTEGER, RuntimeFunction, "Read a character from input"),
        entry!("NEWLINE", natives::bcpl_newline, "_NEWLINE", 0, Standard, VarType::INTEGER, RuntimeRoutine, "Output a newline character"),
        // String/list operations
        entry!("SPLIT", natives::bcpl_split, "_SPLIT", 2, Standard, VarType::POINTER_TO_STRING_LIST, RuntimeListFunction, "Split a string into a list using delimiter"),
        entry!("JOIN", natives::bcpl_join, "_JOIN", 2, Standard, VarType::INTEGER, RuntimeFunction, "Join a list of strings using delimiter"),
        // Memory management
        entry!("GETVEC", natives::bcpl_getvec, "_GETVEC", 1, Standard, VarType::POINTER_TO_INT_VEC, RuntimeFunction, "Allocate integer vector"),
        entry!("FGETVEC", natives::bcpl_fgetvec, "_FGETVEC", 1, Standard, VarType::POINTER_TO_FLOAT_VEC, RuntimeFunction, "Allocate float vector"),
        entry!("FREEVEC", natives::bcpl_freevec, "_FREEVEC", 1, Standard, VarType::INTEGER, RuntimeRoutine, "Free allocated vector"),
        entry!("BCPL_ALLOC", natives::bcpl_alloc, "_BCPL_ALLOC", 1, Standard, VarType::POINTER_TO_OBJECT, RuntimeFunction, "Allocate object storage"),
        // Math
        entry!("RAND", natives::bcpl_rand, "_RAND", 1, Standard, VarType::INTEGER, RuntimeFunction, "Random integer in [0, max)"),
        entry!("RND", natives::bcpl_rnd, "_RND", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Random float in [0, max]"),
        entry!("FRND", natives::bcpl_frnd, "_FRND", 0, Float, VarType::FLOAT, RuntimeFloatFunction, "Random float in [0, 1]"),
        entry!("FSIN", natives::bcpl_fsin, "_FSIN", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Sine (radians)"),
        entry!("FCOS", natives::bcpl_fcos, "_FCOS", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Cosine (radians)"),
        entry!("FTAN", natives::bcpl_ftan, "_FTAN", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Tangent (radians)"),
        entry!("FABS", natives::bcpl_fabs, "_FABS", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Absolute value"),
        entry!("FLOG", natives::bcpl_flog, "_FLOG", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Natural logarithm"),
        entry!("FEXP", natives::bcpl_fexp, "_FEXP", 1, Float, VarType::FLOAT, RuntimeFloatFunction, "Exponential"),
        entry!("FIX", natives::bcpl_fix, "_FIX", 1, Standard, VarType::INTEGER, RuntimeFunction, "Convert float to integer"),
        // File I/O
        entry!("FILE_OPEN_READ", natives::bcpl_file_open_read, "_FILE_OPEN_READ", 1, Standard, VarType::INTEGER, RuntimeFunction, "Open file for reading"),
        entry!("FILE_OPEN_WRITE", natives::bcpl_file_open_write, "_FILE_OPEN_WRITE", 1, Standard, VarType::INTEGER, RuntimeFunction, "Open file for writing"),
        entry!("FILE_OPEN_APPEND", natives::bcpl_file_open_append, "_FILE_OPEN_APPEND", 1, Standard, VarType::INTEGER, RuntimeFunction, "Open file for appending"),
        entry!("FILE_CLOSE", natives::bcpl_file_close, "_FILE_CLOSE", 1, Standard, VarType::INTEGER, RuntimeFunction, "Close file handle"),
        entry!("FILE_WRITES", natives::bcpl_file_writes, "_FILE_WRITES", 2, Standard, VarType::INTEGER, RuntimeFunction, "Write string to file"),
        entry!("FILE_READS", natives::bcpl_file_reads, "_FILE_READS", 1, Standard, VarType::INTEGER, RuntimeFunction, "Read string from file"),
        // System
        entry!("FINISH", natives::bcpl_finish, "_FINISH", 0, Standard, VarType::INTEGER, RuntimeRoutine, "Terminate program execution"),
    ]
}

/// Name → entry lookup used by the external-function scanner and linker.
#[derive(Debug, Default)]
pub struct RuntimeManager {
    entries: HashMap<&'static str, RuntimeEntry>,
}

impl RuntimeManager {
    pub fn new() -> Self {
        let mut m = RuntimeManager {
            entries: HashMap::new(),
        };
        for e in standard_registry() {
            m.entries.insert(e.name, e);
        }
        m
    }

    pub fn lookup(&self, name: &str) -> Option<&RuntimeEntry> {
        self.entries.get(name)
    }

    pub fn address_of(&self, name: &str) -> Result<u64, RuntimeError> {
        self.lookup(name)
            .map(|e| e.address as u64)
            .ok_or_else(|| RuntimeError::UnknownSymbol(name.to_string()))
    }

    pub fn is_runtime_symbol(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register every entry into the symbol table, then verify each one is
    /// retrievable. A missing entry is a fatal startup error.
    pub fn register_into(&self, symbols: &mut SymbolTable) -> Result<(), RuntimeError> {
        for e in self.entries.values() {
            let mut sym = Symbol::new(e.name, e.kind, e.return_type);
            sym.location = core_symbols::SymbolLocation::Label;
            sym.parameters = (0..e.arity)
                .map(|_| ParameterInfo {
                    ty: if e.family == FunctionFamily::Float {
                        VarType::FLOAT
                    } else {
                        VarType::INTEGER
                    },
                    is_optional: false,
                })
                .collect();
            symbols.declare(sym)?;
        }
        for e in self.entries.values() {
            if symbols.lookup_in_function(e.name, "").is_none() {
                error!(target: "runtime", symbol = e.name, "registry_verification_miss");
                return Err(RuntimeError::VerificationFailed(e.name.to_string()));
            }
        }
        debug!(target: "runtime", count = self.entries.len(), "registry_initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_registers_and_verifies() {
        let manager = RuntimeManager::new();
        let mut symbols = SymbolTable::new();
        manager.register_into(&mut symbols).unwrap();
        for e in manager.iter() {
            let sym = symbols.lookup_in_function(e.name, "").unwrap();
            assert!(sym.kind.is_runtime(), "{}", e.name);
        }
    }

    #[test]
    fn addresses_are_distinct_and_nonzero() {
        let manager = RuntimeManager::new();
        let mut seen = std::collections::HashSet::new();
        for e in manager.iter() {
            assert_ne!(e.address, 0, "{}", e.name);
            // FGETVEC intentionally shares GETVEC's implementation.
            if e.name != "FGETVEC" {
                assert!(seen.insert(e.address), "duplicate address for {}", e.name);
            }
        }
    }

    #[test]
    fn external_labels_use_underscore_prefix() {
        for e in standard_registry() {
            assert_eq!(e.external_label, format!("_{}", e.name));
        }
    }
}
