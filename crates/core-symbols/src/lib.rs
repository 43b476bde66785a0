//! Scoped symbol table: name → symbol mapping with lifecycle, kind, type,
//! and storage location.
//!
//! Scoping is lexical with explicit `enter_scope`/`exit_scope`. Symbols are
//! never discarded on scope exit — codegen and liveness consult them after
//! the builder pass has finished — so each symbol records the scope level,
//! block id, and owning function under which it was declared, and lookup
//! filters on visibility from the current position.

use core_ast::VarType;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("duplicate declaration of '{name}' in {function}")]
    Duplicate { name: String, function: String },
    #[error("unknown symbol '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    LocalVar,
    StaticVar,
    GlobalVar,
    MemberVar,
    Parameter,
    Function,
    FloatFunction,
    Routine,
    Label,
    Manifest,
    RuntimeFunction,
    RuntimeFloatFunction,
    RuntimeListFunction,
    RuntimeRoutine,
    RuntimeFloatRoutine,
}

impl SymbolKind {
    pub fn is_runtime(self) -> bool {
        matches!(
            self,
            SymbolKind::RuntimeFunction
                | SymbolKind::RuntimeFloatFunction
                | SymbolKind::RuntimeListFunction
                | SymbolKind::RuntimeRoutine
                | SymbolKind::RuntimeFloatRoutine
        )
    }

    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::FloatFunction | SymbolKind::Routine
        ) || self.is_runtime()
    }

    pub fn is_float_function(self) -> bool {
        matches!(
            self,
            SymbolKind::FloatFunction
                | SymbolKind::RuntimeFloatFunction
                | SymbolKind::RuntimeFloatRoutine
        )
    }
}

/// Where a symbol's value lives once storage has been assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolLocation {
    #[default]
    Unknown,
    /// Offset from the frame pointer, in bytes.
    Stack(i32),
    /// Offset into the data segment, in bytes.
    Data(usize),
    /// Manifest constants: the value itself.
    Absolute(i64),
    /// Code address named by the symbol's label.
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterInfo {
    pub ty: VarType,
    pub is_optional: bool,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: VarType,
    /// Lexical depth: global = 0, function = 1, nested blocks deeper.
    pub scope_level: u32,
    /// Unique id of the specific block where the symbol was declared.
    pub block_id: u32,
    pub function_name: String,
    /// Owning class for member variables and methods.
    pub class_name: Option<String>,
    /// Drives `DEFER` release synthesis; cleared by retain analysis.
    pub owns_heap_memory: bool,
    pub contains_literals: bool,
    pub location: SymbolLocation,
    /// Element count for sized vectors, when statically known.
    pub size: Option<u64>,
    pub parameters: Vec<ParameterInfo>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: VarType) -> Self {
        Symbol {
            name: name.into(),
            kind,
            ty,
            scope_level: 0,
            block_id: 0,
            function_name: String::new(),
            class_name: None,
            owns_heap_memory: false,
            contains_literals: false,
            location: SymbolLocation::Unknown,
            size: None,
            parameters: Vec::new(),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::LocalVar
                | SymbolKind::StaticVar
                | SymbolKind::GlobalVar
                | SymbolKind::Parameter
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, SymbolKind::LocalVar | SymbolKind::Parameter)
    }

    pub fn is_manifest(&self) -> bool {
        self.kind == SymbolKind::Manifest
    }
}

/// Number of anonymous `ANY`-typed temporaries pre-allocated per function
/// scope; passes that need a scratch variable (LICM, inlining) claim them.
pub const FUNCTION_TEMP_COUNT: usize = 4;

#[derive(Debug, Clone)]
struct Scope {
    level: u32,
    block_id: u32,
    function_name: String,
    names: Vec<String>,
}

/// The table itself. Symbols are stored qualified by `(function, name)` so a
/// name declared in two functions never collides; globals qualify under the
/// empty function name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    scopes: Vec<Scope>,
    next_block_id: u32,
    next_temp: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut t = SymbolTable {
            symbols: HashMap::new(),
            scopes: Vec::new(),
            next_block_id: 0,
            next_temp: 0,
        };
        t.enter_scope(""); // global scope, level 0
        t
    }

    fn qualify(function: &str, name: &str) -> String {
        if function.is_empty() {
            name.to_string()
        } else {
            format!("{function}::{name}")
        }
    }

    pub fn current_function(&self) -> &str {
        self.scopes
            .last()
            .map(|s| s.function_name.as_str())
            .unwrap_or("")
    }

    pub fn current_level(&self) -> u32 {
        self.scopes.last().map(|s| s.level).unwrap_or(0)
    }

    pub fn current_block_id(&self) -> u32 {
        self.scopes.last().map(|s| s.block_id).unwrap_or(0)
    }

    /// Enter a nested lexical scope. Passing a non-empty `function_name`
    /// starts a function scope and pre-allocates the anonymous temporaries.
    pub fn enter_scope(&mut self, function_name: &str) {
        let level = self.scopes.len() as u32;
        let block_id = self.next_block_id;
        self.next_block_id += 1;
        let function_name = if function_name.is_empty() {
            self.current_function().to_string()
        } else {
            function_name.to_string()
        };
        let is_function_scope = self
            .scopes
            .last()
            .map(|s| s.function_name != function_name)
            .unwrap_or(false);
        self.scopes.push(Scope {
            level,
            block_id,
            function_name: function_name.clone(),
            names: Vec::new(),
        });
        if is_function_scope {
            for _ in 0..FUNCTION_TEMP_COUNT {
                let name = format!("_temp{}", self.next_temp);
                self.next_temp += 1;
                let mut sym = Symbol::new(&name, SymbolKind::LocalVar, VarType::ANY);
                sym.scope_level = level;
                sym.block_id = block_id;
                sym.function_name = function_name.clone();
                let _ = self.declare(sym);
            }
        }
        trace!(target: "symbols", level, block_id, function = %function_name, "enter_scope");
    }

    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1
            && let Some(s) = self.scopes.pop()
        {
            trace!(target: "symbols", level = s.level, function = %s.function_name, "exit_scope");
        }
    }

    /// Declare a symbol in the current scope. Scope context fields are
    /// stamped from the scope stack; the caller fills the rest.
    pub fn declare(&mut self, mut sym: Symbol) -> Result<(), SymbolError> {
        sym.scope_level = self.current_level();
        sym.block_id = self.current_block_id();
        if sym.function_name.is_empty() {
            sym.function_name = self.current_function().to_string();
        }
        let key = Self::qualify(&sym.function_name, &sym.name);
        if let Some(existing) = self.symbols.get(&key)
            && existing.block_id == sym.block_id
        {
            return Err(SymbolError::Duplicate {
                name: sym.name,
                function: sym.function_name,
            });
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.push(sym.name.clone());
        }
        self.symbols.insert(key, sym);
        Ok(())
    }

    /// Innermost-enclosing lookup: the current function's qualified name
    /// first, then the global scope.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.lookup_in_function(name, self.current_function())
    }

    /// Function-context-aware lookup used by passes that walk the tree
    /// outside the builder's scope stack: consult `function`'s scope first,
    /// then fall back to globals.
    pub fn lookup_in_function(&self, name: &str, function: &str) -> Option<&Symbol> {
        if !function.is_empty()
            && let Some(sym) = self.symbols.get(&Self::qualify(function, name))
        {
            return Some(sym);
        }
        self.symbols.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str, function: &str) -> Option<&mut Symbol> {
        let key = Self::qualify(function, name);
        if !function.is_empty() && self.symbols.contains_key(&key) {
            return self.symbols.get_mut(&key);
        }
        self.symbols.get_mut(name)
    }

    /// All symbols belonging to one function (parameters, locals, temps).
    pub fn function_symbols(&self, function: &str) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .values()
            .filter(move |s| s.function_name == function)
    }

    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_scope_allocates_temps() {
        let mut t = SymbolTable::new();
        t.enter_scope("F");
        let temps: Vec<_> = t
            .function_symbols("F")
            .filter(|s| s.name.starts_with("_temp"))
            .collect();
        assert_eq!(temps.len(), FUNCTION_TEMP_COUNT);
        assert!(temps.iter().all(|s| s.ty == VarType::ANY));
    }

    #[test]
    fn duplicate_in_same_block_rejected() {
        let mut t = SymbolTable::new();
        t.enter_scope("F");
        t.declare(Symbol::new("X", SymbolKind::LocalVar, VarType::INTEGER))
            .unwrap();
        let err = t
            .declare(Symbol::new("X", SymbolKind::LocalVar, VarType::INTEGER))
            .unwrap_err();
        assert!(matches!(err, SymbolError::Duplicate { .. }));
    }

    #[test]
    fn shadowing_across_blocks_allowed() {
        let mut t = SymbolTable::new();
        t.enter_scope("F");
        t.declare(Symbol::new("X", SymbolKind::LocalVar, VarType::INTEGER))
            .unwrap();
        t.enter_scope("");
        // Same function, new block id: redeclaration shadows.
        t.declare(Symbol::new("X", SymbolKind::LocalVar, VarType::FLOAT))
            .unwrap();
        assert_eq!(t.lookup("X").unwrap().ty, VarType::FLOAT);
    }

    #[test]
    fn function_context_lookup_prefers_function_scope() {
        let mut t = SymbolTable::new();
        t.declare(Symbol::new("V", SymbolKind::GlobalVar, VarType::INTEGER))
            .unwrap();
        t.enter_scope("G");
        t.declare(Symbol::new("V", SymbolKind::LocalVar, VarType::FLOAT))
            .unwrap();
        t.exit_scope();
        assert_eq!(t.lookup_in_function("V", "G").unwrap().ty, VarType::FLOAT);
        assert_eq!(
            t.lookup_in_function("V", "").unwrap().kind,
            SymbolKind::GlobalVar
        );
    }
}
