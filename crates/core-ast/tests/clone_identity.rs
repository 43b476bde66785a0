//! Clone identity: for every node shape, the printed form of a clone
//! equals the printed form of the original, and resolved analysis data
//! rides along.

use core_ast::{
    BinaryOperator, ClassDeclaration, ClassMember, Declaration, Expression, ForConstants,
    FunctionFlags, PackedShape, Program, Reducer, RepeatMode, Statement, UnaryOperator, VarType,
    Visibility, print,
};

fn representative_program() -> Program {
    let mut p = Program::new();
    p.declarations.push(Declaration::Manifest {
        name: "LIMIT".into(),
        value: 64,
    });
    p.declarations.push(Declaration::Class(ClassDeclaration {
        name: "Point".into(),
        parent: None,
        members: vec![ClassMember {
            visibility: Visibility::Private,
            declaration: Declaration::Let {
                names: vec!["x".into()],
                initializers: vec![Expression::Number(0)],
                is_float: false,
                is_retained: false,
                explicit_type: Some(VarType::INTEGER),
            },
        }],
    }));
    p.declarations.push(Declaration::Function {
        name: "F".into(),
        parameters: vec!["N".into()],
        body: Expression::Valof {
            body: Box::new(Statement::Compound(vec![
                Statement::Switchon {
                    subject: Expression::variable("N"),
                    body: Box::new(Statement::Compound(vec![
                        Statement::Case {
                            constant: Expression::Number(1),
                            resolved_value: Some(1),
                            body: Box::new(Statement::Endcase),
                        },
                        Statement::Default {
                            body: Box::new(Statement::Endcase),
                        },
                    ])),
                },
                Statement::Repeat {
                    body: Box::new(Statement::Loop),
                    mode: RepeatMode::Until(Expression::Boolean(true)),
                },
                Statement::Defer(Box::new(Statement::Free(Expression::variable("N")))),
                Statement::Reduction {
                    reducer: Reducer::Max,
                    result_var: "M".into(),
                    source: Expression::variable("N"),
                },
                Statement::PairwiseReductionLoop {
                    intrinsic: "llvm.arm.neon.vpmin.v2f32".into(),
                    result_var: "R".into(),
                    vector_a: "A".into(),
                    vector_b: "B".into(),
                },
                Statement::Resultis {
                    value: Expression::PackedAccess {
                        shape: PackedShape::FQuad,
                        base: Box::new(Expression::PackedConstruct {
                            shape: PackedShape::FQuad,
                            operands: vec![
                                Expression::Float(1.0),
                                Expression::Float(2.0),
                                Expression::Float(3.0),
                                Expression::Float(4.0),
                            ],
                        }),
                        lane: 2,
                    },
                    from_send: true,
                },
            ])),
        },
        flags: FunctionFlags {
            is_float: false,
            is_virtual: false,
            is_final: true,
        },
    });
    p.statements.push(Statement::For {
        var: "I".into(),
        start: Expression::Number(0),
        end: Expression::Unary {
            op: UnaryOperator::LengthOf,
            operand: Box::new(Expression::variable("V")),
        },
        step: Some(Expression::Number(2)),
        body: Box::new(Statement::Assignment {
            lhs: vec![Expression::VectorAccess {
                base: Box::new(Expression::variable("V")),
                index: Box::new(Expression::variable("I")),
            }],
            rhs: vec![Expression::binary(
                BinaryOperator::LeftShift,
                Expression::variable("I"),
                Expression::Number(1),
            )],
        }),
        // Resolved analysis data must survive cloning.
        constants: ForConstants {
            end: Some(64),
            step: Some(2),
        },
    });
    p
}

#[test]
fn serialized_clone_equals_serialized_original() {
    let original = representative_program();
    let clone = original.clone();
    assert_eq!(
        print::print_program(&original),
        print::print_program(&clone)
    );
}

#[test]
fn clone_carries_resolved_fields() {
    let original = representative_program();
    let clone = original.clone();
    let Statement::For { constants, .. } = &clone.statements[0] else {
        panic!("for statement expected");
    };
    assert_eq!(constants.end, Some(64));
    assert_eq!(constants.step, Some(2));
    let printed = print::print_program(&clone);
    assert!(printed.contains(":resolved 1"), "case resolution survives");
}

#[test]
fn clone_is_exclusive_ownership() {
    let original = representative_program();
    let mut clone = original.clone();
    clone.declarations.clear();
    clone.statements.clear();
    // Original tree unaffected: children are owned, never shared.
    assert_eq!(original.declarations.len(), 3);
    assert_eq!(original.statements.len(), 1);
}
