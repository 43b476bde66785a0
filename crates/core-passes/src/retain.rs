//! Retain analysis.
//!
//! Per function, collect the variables named in `RETAIN` statements and the
//! variables escaping through `RESULTIS`; clear `owns_heap_memory` on their
//! symbols so cleanup insertion will not synthesize a `DEFER` release for
//! them. `REMANAGE` re-establishes ownership explicitly.

use core_ast::{visit, Declaration, Expression, Program, Statement};
use core_symbols::SymbolTable;
use std::collections::BTreeSet;
use tracing::debug;

pub struct RetainAnalysis;

impl RetainAnalysis {
    pub fn apply(program: &Program, symbols: &mut SymbolTable) {
        for decl in &program.declarations {
            match decl {
                Declaration::Routine { name, body, .. } => {
                    analyze_function(name, body, symbols);
                }
                Declaration::Function { name, body, .. } => {
                    let mut retained = BTreeSet::new();
                    let mut remanaged = BTreeSet::new();
                    // A function body expression can still contain VALOF
                    // blocks with RETAIN statements.
                    visit::visit_expr(body, &mut |e| {
                        if let Expression::Valof { body } | Expression::FloatValof { body } = e {
                            collect(body, &mut retained, &mut remanaged);
                        }
                    });
                    apply_sets(name, &retained, &remanaged, symbols);
                }
                _ => {}
            }
        }
    }
}

fn analyze_function(name: &str, body: &Statement, symbols: &mut SymbolTable) {
    let mut retained = BTreeSet::new();
    let mut remanaged = BTreeSet::new();
    collect(body, &mut retained, &mut remanaged);
    apply_sets(name, &retained, &remanaged, symbols);
}

fn collect(body: &Statement, retained: &mut BTreeSet<String>, remanaged: &mut BTreeSet<String>) {
    visit::visit_stmt(body, &mut |s| match s {
        Statement::Retain { names } => retained.extend(names.iter().cloned()),
        Statement::Remanage { names } => remanaged.extend(names.iter().cloned()),
        // Escaping values must not be released by the function that made
        // them; the caller observes the pointer.
        Statement::Resultis { value, .. } => {
            if let Expression::Variable(v) = value {
                retained.insert(v.name.clone());
            }
        }
        _ => {}
    });
}

fn apply_sets(
    function: &str,
    retained: &BTreeSet<String>,
    remanaged: &BTreeSet<String>,
    symbols: &mut SymbolTable,
) {
    for name in retained {
        if let Some(sym) = symbols.lookup_mut(name, function) {
            sym.owns_heap_memory = false;
        }
    }
    for name in remanaged {
        if let Some(sym) = symbols.lookup_mut(name, function) {
            sym.owns_heap_memory = true;
        }
    }
    if !retained.is_empty() || !remanaged.is_empty() {
        debug!(
            target: "passes.retain",
            function = %function,
            retained = retained.len(),
            remanaged = remanaged.len(),
            "ownership_flags_updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::VarType;
    use core_symbols::{Symbol, SymbolKind};

    fn owned_symbol(table: &mut SymbolTable, function: &str, name: &str) {
        table.enter_scope(function);
        let mut sym = Symbol::new(name, SymbolKind::LocalVar, VarType::POINTER_TO_INT_VEC);
        sym.owns_heap_memory = true;
        table.declare(sym).unwrap();
        table.exit_scope();
    }

    #[test]
    fn retain_clears_ownership() {
        let mut symbols = SymbolTable::new();
        owned_symbol(&mut symbols, "F", "V");
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "F".into(),
            parameters: vec![],
            body: Statement::Retain {
                names: vec!["V".into()],
            },
            flags: Default::default(),
        });
        RetainAnalysis::apply(&p, &mut symbols);
        assert!(!symbols.lookup_in_function("V", "F").unwrap().owns_heap_memory);
    }

    #[test]
    fn resultis_escape_clears_ownership() {
        let mut symbols = SymbolTable::new();
        owned_symbol(&mut symbols, "G", "V");
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "G".into(),
            parameters: vec![],
            body: Statement::Resultis {
                value: Expression::variable("V"),
                from_send: false,
            },
            flags: Default::default(),
        });
        RetainAnalysis::apply(&p, &mut symbols);
        assert!(!symbols.lookup_in_function("V", "G").unwrap().owns_heap_memory);
    }

    #[test]
    fn remanage_restores_ownership() {
        let mut symbols = SymbolTable::new();
        owned_symbol(&mut symbols, "H", "V");
        symbols.lookup_mut("V", "H").unwrap().owns_heap_memory = false;
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "H".into(),
            parameters: vec![],
            body: Statement::Remanage {
                names: vec!["V".into()],
            },
            flags: Default::default(),
        });
        RetainAnalysis::apply(&p, &mut symbols);
        assert!(symbols.lookup_in_function("V", "H").unwrap().owns_heap_memory);
    }
}
