//! External-function scanner.
//!
//! One pre-pass over the AST computing the set of runtime symbols the
//! program references, directly (calls by name) or implicitly (allocation
//! forms, `NEW`, cleanup releases, `FINISH`). The linker reserves one
//! veneer per symbol at the head of the code section.

use core_ast::{visit, Declaration, Expression, Program, Statement};
use core_runtime::RuntimeManager;
use std::collections::BTreeSet;
use tracing::debug;

pub fn scan_external_functions(program: &Program, runtime: &RuntimeManager) -> BTreeSet<String> {
    let mut externals = BTreeSet::new();

    let mut note_expr = |e: &Expression, externals: &mut BTreeSet<String>| match e {
        Expression::Call { callee, .. } => {
            if let Expression::Variable(v) = callee.as_ref()
                && runtime.is_runtime_symbol(&v.name)
            {
                externals.insert(v.name.clone());
            }
        }
        Expression::VecAllocation { .. }
        | Expression::Table { .. }
        | Expression::VecInitializer { .. } => {
            externals.insert("GETVEC".to_string());
        }
        Expression::FVecAllocation { .. } => {
            externals.insert("FGETVEC".to_string());
        }
        Expression::PairsAllocation { .. } | Expression::FPairsAllocation { .. } => {
            externals.insert("GETVEC".to_string());
        }
        Expression::StringAllocation { .. } | Expression::List { .. } => {
            externals.insert("BCPL_ALLOC".to_string());
        }
        Expression::New { .. } => {
            externals.insert("BCPL_ALLOC".to_string());
        }
        _ => {}
    };

    let mut note_stmt = |s: &Statement, externals: &mut BTreeSet<String>| match s {
        Statement::Free(_) | Statement::Defer(_) => {
            externals.insert("FREEVEC".to_string());
        }
        Statement::Finish { .. } => {
            externals.insert("FINISH".to_string());
        }
        Statement::Block { declarations, .. } => {
            // Owned locals get a synthesized release at scope exit.
            for d in declarations {
                if let Declaration::Let { initializers, .. } = d
                    && initializers.iter().any(is_owning_initializer)
                {
                    externals.insert("FREEVEC".to_string());
                }
            }
        }
        Statement::StringDecl { .. } => {
            externals.insert("BCPL_ALLOC".to_string());
        }
        _ => {}
    };

    let mut scan_stmt = |s: &Statement, externals: &mut BTreeSet<String>| {
        visit::visit_stmt(s, &mut |s| note_stmt(s, externals));
        visit::visit_stmt_exprs(s, &mut |e| note_expr(e, externals));
    };

    for decl in &program.declarations {
        match decl {
            Declaration::Routine { body, .. } => scan_stmt(body, &mut externals),
            Declaration::Function { body, .. } => {
                visit::visit_expr(body, &mut |e| note_expr(e, &mut externals));
                visit::visit_expr(body, &mut |e| {
                    if let Expression::Valof { body } | Expression::FloatValof { body } = e {
                        visit::visit_stmt(body, &mut |s| note_stmt(s, &mut externals));
                    }
                });
            }
            Declaration::Class(class) => {
                for member in &class.members {
                    match &member.declaration {
                        Declaration::Routine { body, .. } => scan_stmt(body, &mut externals),
                        Declaration::Function { body, .. } => {
                            visit::visit_expr(body, &mut |e| note_expr(e, &mut externals));
                        }
                        _ => {}
                    }
                }
            }
            Declaration::GlobalVariable { initializers, .. } => {
                for init in initializers {
                    visit::visit_expr(init, &mut |e| note_expr(e, &mut externals));
                }
            }
            _ => {}
        }
    }
    for stmt in &program.statements {
        scan_stmt(stmt, &mut externals);
    }

    debug!(target: "codegen.scanner", count = externals.len(), "external_symbols");
    externals
}

fn is_owning_initializer(e: &Expression) -> bool {
    matches!(
        e,
        Expression::VecAllocation { .. }
            | Expression::FVecAllocation { .. }
            | Expression::PairsAllocation { .. }
            | Expression::FPairsAllocation { .. }
            | Expression::StringAllocation { .. }
            | Expression::New { .. }
            | Expression::List { .. }
    ) || matches!(e, Expression::Call { callee, .. }
        if matches!(callee.as_ref(), Expression::Variable(v)
            if matches!(v.name.as_str(), "GETVEC" | "FGETVEC" | "SPLIT")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_implicit_references_are_found() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::Compound(vec![
                Statement::RoutineCall(Expression::call(
                    "WRITEN",
                    vec![Expression::Number(1)],
                )),
                Statement::Block {
                    declarations: vec![Declaration::Let {
                        names: vec!["V".into()],
                        initializers: vec![Expression::VecAllocation {
                            size: Box::new(Expression::Number(8)),
                        }],
                        is_float: false,
                        is_retained: false,
                        explicit_type: None,
                    }],
                    statements: vec![],
                },
            ]),
            flags: Default::default(),
        });
        let rt = RuntimeManager::new();
        let ext = scan_external_functions(&p, &rt);
        assert!(ext.contains("WRITEN"));
        assert!(ext.contains("GETVEC"), "allocation implies GETVEC");
        assert!(ext.contains("FREEVEC"), "owned local implies release");
    }

    #[test]
    fn user_functions_are_not_externals() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::RoutineCall(Expression::call("F", vec![])),
            flags: Default::default(),
        });
        let rt = RuntimeManager::new();
        let ext = scan_external_functions(&p, &rt);
        assert!(ext.is_empty());
    }
}
