//! Manifest resolution.
//!
//! `MANIFEST` declarations record their (name, value) in the scope stack and
//! are removed from the tree; a `VariableAccess` resolving to an in-scope
//! manifest becomes an integer literal. Scopes match lexical scopes
//! (function, routine, block) and shadowing is permitted. After this pass no
//! variable access in the tree resolves to a manifest constant.

use core_ast::rewrite::{Rewrite, rewrite_decl_children, rewrite_expr_children};
use core_ast::{Declaration, Expression, Program, Statement};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ManifestResolution {
    scopes: Vec<HashMap<String, i64>>,
    /// Manifests declared at the global scope, retained for the driver's
    /// registry listing and for diagnostics.
    pub global_manifests: HashMap<String, i64>,
}

impl ManifestResolution {
    pub fn new() -> Self {
        ManifestResolution {
            scopes: vec![HashMap::new()],
            global_manifests: HashMap::new(),
        }
    }

    pub fn apply(mut self, program: Program) -> (Program, HashMap<String, i64>) {
        let program = self.rewrite_program(program);
        (program, self.global_manifests)
    }

    fn resolve(&self, name: &str) -> Option<i64> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn at_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }
}

impl Rewrite for ManifestResolution {
    fn rewrite_decl(&mut self, d: Declaration) -> Option<Declaration> {
        match d {
            Declaration::Manifest { name, value } => {
                trace!(target: "passes.manifest", name = %name, value, "manifest_recorded");
                if self.at_global_scope() {
                    self.global_manifests.insert(name.clone(), value);
                }
                self.scopes
                    .last_mut()
                    .expect("scope stack never empty")
                    .insert(name, value);
                None // declaration removed from the tree
            }
            Declaration::Function { .. } | Declaration::Routine { .. } => {
                self.scopes.push(HashMap::new());
                let out = rewrite_decl_children(self, d);
                self.scopes.pop();
                Some(out)
            }
            other => Some(rewrite_decl_children(self, other)),
        }
    }

    fn rewrite_stmt(&mut self, s: Statement) -> Statement {
        match s {
            s @ Statement::Block { .. } => {
                self.scopes.push(HashMap::new());
                let out = core_ast::rewrite::rewrite_stmt_children(self, s);
                self.scopes.pop();
                out
            }
            other => core_ast::rewrite::rewrite_stmt_children(self, other),
        }
    }

    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        let e = rewrite_expr_children(self, e);
        match e {
            Expression::Variable(v) => match self.resolve(&v.name) {
                Some(value) => Expression::Number(value),
                None => Expression::Variable(v),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::visit;

    #[test]
    fn manifest_access_becomes_literal_and_declaration_disappears() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Manifest {
            name: "MAX".into(),
            value: 100,
        });
        p.statements.push(Statement::Assignment {
            lhs: vec![Expression::variable("S")],
            rhs: vec![Expression::variable("MAX")],
        });
        let (out, globals) = ManifestResolution::new().apply(p);
        assert!(out.declarations.is_empty());
        assert_eq!(globals.get("MAX"), Some(&100));
        let mut saw_manifest_access = false;
        for s in &out.statements {
            visit::visit_stmt_exprs(s, &mut |e| {
                if matches!(e, Expression::Variable(v) if v.name == "MAX") {
                    saw_manifest_access = true;
                }
            });
        }
        assert!(!saw_manifest_access);
        assert_eq!(
            out.statements[0],
            Statement::Assignment {
                lhs: vec![Expression::variable("S")],
                rhs: vec![Expression::Number(100)],
            }
        );
    }

    #[test]
    fn block_scoped_manifest_shadows_global() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Manifest {
            name: "K".into(),
            value: 1,
        });
        p.statements.push(Statement::Block {
            declarations: vec![Declaration::Manifest {
                name: "K".into(),
                value: 2,
            }],
            statements: vec![Statement::Resultis {
                value: Expression::variable("K"),
                from_send: false,
            }],
        });
        p.statements.push(Statement::Resultis {
            value: Expression::variable("K"),
            from_send: false,
        });
        let (out, _) = ManifestResolution::new().apply(p);
        let Statement::Block { statements, .. } = &out.statements[0] else {
            panic!("block survived");
        };
        assert_eq!(
            statements[0],
            Statement::Resultis {
                value: Expression::Number(2),
                from_send: false
            }
        );
        assert_eq!(
            out.statements[1],
            Statement::Resultis {
                value: Expression::Number(1),
                from_send: false
            }
        );
    }
}
