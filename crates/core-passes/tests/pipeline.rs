//! Whole-pipeline behavior over built trees.

use core_ast::{
    BinaryOperator, Declaration, Expression, Program, Statement, visit,
};
use core_passes::{PipelineOptions, run_pipeline};
use core_runtime::RuntimeManager;
use core_symbols::SymbolTable;

fn run(program: Program) -> (core_passes::PipelineOutput, SymbolTable) {
    let runtime = RuntimeManager::new();
    let mut symbols = SymbolTable::new();
    runtime.register_into(&mut symbols).unwrap();
    let out = run_pipeline(program, &mut symbols, PipelineOptions::default()).unwrap();
    (out, symbols)
}

#[test]
fn manifests_vanish_and_fold_through_expressions() {
    let mut p = Program::new();
    p.declarations.push(Declaration::Manifest {
        name: "MAX".into(),
        value: 100,
    });
    p.declarations.push(Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body: Statement::RoutineCall(Expression::call(
            "WRITEN",
            vec![Expression::binary(
                BinaryOperator::Add,
                Expression::variable("MAX"),
                Expression::Number(1),
            )],
        )),
        flags: Default::default(),
    });
    let (out, _) = run(p);
    // No manifest declarations survive.
    assert!(
        !out.program
            .declarations
            .iter()
            .any(|d| matches!(d, Declaration::Manifest { .. }))
    );
    assert_eq!(out.global_manifests.get("MAX"), Some(&100));
    // MAX + 1 folded to 101 after resolution.
    let mut folded = false;
    for d in &out.program.declarations {
        if let Declaration::Routine { body, .. } = d {
            visit::visit_stmt_exprs(body, &mut |e| {
                if matches!(e, Expression::Number(101)) {
                    folded = true;
                }
            });
        }
    }
    assert!(folded);
}

#[test]
fn short_circuit_and_lowers_before_codegen_sees_it() {
    let mut p = Program::new();
    p.declarations.push(Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body: Statement::If {
            condition: Expression::binary(
                BinaryOperator::LogicalAnd,
                Expression::call("RDCH", vec![]),
                Expression::call("RDCH", vec![]),
            ),
            then_branch: Box::new(Statement::Return),
        },
        flags: Default::default(),
    });
    let (out, _) = run(p);
    let mut saw_logical_and = false;
    let mut saw_conditional = false;
    for d in &out.program.declarations {
        if let Declaration::Routine { body, .. } = d {
            visit::visit_stmt_exprs(body, &mut |e| match e {
                Expression::Binary {
                    op: BinaryOperator::LogicalAnd,
                    ..
                } => saw_logical_and = true,
                Expression::Conditional { .. } => saw_conditional = true,
                _ => {}
            });
        }
    }
    assert!(!saw_logical_and, "& must lower to a conditional");
    assert!(saw_conditional);
}

#[test]
fn liveness_results_cover_every_function() {
    let mut p = Program::new();
    p.declarations.push(Declaration::Function {
        name: "TWICE".into(),
        parameters: vec!["X".into()],
        body: Expression::binary(
            BinaryOperator::Mul,
            Expression::variable("X"),
            Expression::Number(2),
        ),
        flags: Default::default(),
    });
    p.declarations.push(Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body: Statement::RoutineCall(Expression::call(
            "WRITEN",
            vec![Expression::call("TWICE", vec![Expression::Number(21)])],
        )),
        flags: Default::default(),
    });
    let (out, _) = run(p);
    assert!(out.liveness.contains_key("TWICE"));
    assert!(out.liveness.contains_key("START"));
}

#[test]
fn retained_let_is_not_heap_owned() {
    let mut p = Program::new();
    p.declarations.push(Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body: Statement::Block {
            declarations: vec![Declaration::Let {
                names: vec!["V".into()],
                initializers: vec![Expression::VecAllocation {
                    size: Box::new(Expression::Number(4)),
                }],
                is_float: false,
                is_retained: false,
                explicit_type: None,
            }],
            statements: vec![
                Statement::Retain {
                    names: vec!["V".into()],
                },
                Statement::Resultis {
                    value: Expression::variable("V"),
                    from_send: false,
                },
            ],
        },
        flags: Default::default(),
    });
    let (_, symbols) = run(p);
    let v = symbols.lookup_in_function("V", "START").unwrap();
    assert!(!v.owns_heap_memory, "RETAIN clears ownership");
}
