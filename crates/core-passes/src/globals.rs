//! Global-initializer hoisting.
//!
//! Top-level `LET`/`FLET` initializers cannot run before `START` exists, so
//! they are extracted into a synthetic routine and a call to it is injected
//! at the front of `START`'s body. The declarations keep their names; the
//! moved initializers are replaced by zero so the data generator reserves
//! plain cells.

use core_ast::{Declaration, Expression, Program, Statement};
use tracing::debug;

/// Name of the synthesized initializer routine.
pub const GLOBAL_INIT_ROUTINE: &str = "GLOBAL_INIT";

pub struct GlobalInitializerHoisting;

impl GlobalInitializerHoisting {
    pub fn apply(mut program: Program) -> Program {
        let mut assignments = Vec::new();

        for decl in &mut program.declarations {
            if let Declaration::GlobalVariable {
                names,
                initializers,
                ..
            } = decl
            {
                for (name, init) in names.iter().zip(initializers.iter_mut()) {
                    if matches!(init, Expression::Number(0)) {
                        continue;
                    }
                    let moved = std::mem::replace(init, Expression::Number(0));
                    assignments.push(Statement::Assignment {
                        lhs: vec![Expression::variable(name.clone())],
                        rhs: vec![moved],
                    });
                }
            }
        }

        if assignments.is_empty() {
            return program;
        }
        debug!(
            target: "passes.globals",
            initializers = assignments.len(),
            "global_initializers_hoisted"
        );

        program.declarations.push(Declaration::Routine {
            name: GLOBAL_INIT_ROUTINE.into(),
            parameters: vec![],
            body: Statement::Compound(assignments),
            flags: Default::default(),
        });

        // Inject the call at the start of START.
        for decl in &mut program.declarations {
            if let Declaration::Routine { name, body, .. } = decl
                && name == "START"
            {
                let call = Statement::RoutineCall(Expression::call(GLOBAL_INIT_ROUTINE, vec![]));
                let old = std::mem::replace(body, Statement::Compound(vec![]));
                let mut stmts = vec![call];
                stmts.extend(old.into_compound());
                *body = Statement::Compound(stmts);
            }
        }
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializers_move_into_synthetic_routine() {
        let mut p = Program::new();
        p.declarations.push(Declaration::GlobalVariable {
            names: vec!["G".into()],
            initializers: vec![Expression::Number(42)],
            is_float: false,
        });
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::RoutineCall(Expression::call("WRITEN", vec![Expression::variable("G")])),
            flags: Default::default(),
        });

        let out = GlobalInitializerHoisting::apply(p);

        let Declaration::GlobalVariable { initializers, .. } = &out.declarations[0] else {
            panic!()
        };
        assert_eq!(initializers[0], Expression::Number(0));

        let init = out
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Routine { name, body, .. } if name == GLOBAL_INIT_ROUTINE => {
                    Some(body)
                }
                _ => None,
            })
            .expect("synthetic routine present");
        let Statement::Compound(stmts) = init else {
            panic!()
        };
        assert_eq!(stmts.len(), 1);

        let start_body = out
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Routine { name, body, .. } if name == "START" => Some(body),
                _ => None,
            })
            .unwrap();
        let Statement::Compound(stmts) = start_body else {
            panic!()
        };
        assert!(
            matches!(&stmts[0], Statement::RoutineCall(Expression::Call { callee, .. })
                if matches!(callee.as_ref(), Expression::Variable(v) if v.name == GLOBAL_INIT_ROUTINE))
        );
    }

    #[test]
    fn no_initializers_means_no_synthetic_routine() {
        let mut p = Program::new();
        p.declarations.push(Declaration::GlobalVariable {
            names: vec!["G".into()],
            initializers: vec![Expression::Number(0)],
            is_float: false,
        });
        let out = GlobalInitializerHoisting::apply(p);
        assert_eq!(out.declarations.len(), 1);
    }
}
