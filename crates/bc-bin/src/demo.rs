//! Built-in demonstration programs.
//!
//! Parsing is a separate concern; until a front end is wired in, the driver
//! compiles these hand-built trees. Each mirrors a classic exercise:
//! recursion, manifests with loops, vectors, packed pairs, and virtual
//! dispatch.

use core_ast::{
    BinaryOperator, ClassDeclaration, ClassMember, Declaration, Expression, ForConstants,
    FunctionFlags, PackedShape, Program, Statement, Visibility,
};

pub fn demo_names() -> &'static [&'static str] {
    &["factorial", "sum", "vector", "pair", "classes"]
}

pub fn demo_program(name: &str) -> Option<Program> {
    match name {
        "factorial" => Some(factorial()),
        "sum" => Some(manifest_sum()),
        "vector" => Some(vector_squares()),
        "pair" => Some(packed_pair()),
        "classes" => Some(classes()),
        _ => None,
    }
}

fn start(body: Statement) -> Declaration {
    Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body,
        flags: FunctionFlags::default(),
    }
}

fn writen(e: Expression) -> Statement {
    Statement::RoutineCall(Expression::call("WRITEN", vec![e]))
}

/// LET F(N) = N EQ 0 -> 1, N * F(N - 1); WRITEN(F(10))
fn factorial() -> Program {
    let mut p = Program::new();
    p.declarations.push(Declaration::Function {
        name: "F".into(),
        parameters: vec!["N".into()],
        body: Expression::Conditional {
            condition: Box::new(Expression::binary(
                BinaryOperator::Eq,
                Expression::variable("N"),
                Expression::Number(0),
            )),
            then_expr: Box::new(Expression::Number(1)),
            else_expr: Box::new(Expression::binary(
                BinaryOperator::Mul,
                Expression::variable("N"),
                Expression::call(
                    "F",
                    vec![Expression::binary(
                        BinaryOperator::Sub,
                        Expression::variable("N"),
                        Expression::Number(1),
                    )],
                ),
            )),
        },
        flags: FunctionFlags::default(),
    });
    p.declarations.push(start(Statement::Compound(vec![
        writen(Expression::call("F", vec![Expression::Number(10)])),
        Statement::RoutineCall(Expression::call("NEWLINE", vec![])),
    ])));
    p
}

/// MANIFEST MAX = 100; FOR I = 1 TO MAX DO S := S + I; WRITEN(S)
fn manifest_sum() -> Program {
    let mut p = Program::new();
    p.declarations.push(Declaration::Manifest {
        name: "MAX".into(),
        value: 100,
    });
    p.declarations.push(start(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["S".into()],
            initializers: vec![Expression::Number(0)],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![
            Statement::For {
                var: "I".into(),
                start: Expression::Number(1),
                end: Expression::variable("MAX"),
                step: None,
                body: Box::new(Statement::Assignment {
                    lhs: vec![Expression::variable("S")],
                    rhs: vec![Expression::binary(
                        BinaryOperator::Add,
                        Expression::variable("S"),
                        Expression::variable("I"),
                    )],
                }),
                constants: ForConstants::default(),
            },
            writen(Expression::variable("S")),
            Statement::RoutineCall(Expression::call("NEWLINE", vec![])),
        ],
    }));
    p
}

/// LET V = VEC 8; FOR I = 0 TO 7 DO V!I := I*I; WRITEN(V!3)
fn vector_squares() -> Program {
    let mut p = Program::new();
    p.declarations.push(start(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["V".into()],
            initializers: vec![Expression::VecAllocation {
                size: Box::new(Expression::Number(8)),
            }],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![
            Statement::For {
                var: "I".into(),
                start: Expression::Number(0),
                end: Expression::Number(7),
                step: None,
                body: Box::new(Statement::Assignment {
                    lhs: vec![Expression::VectorAccess {
                        base: Box::new(Expression::variable("V")),
                        index: Box::new(Expression::variable("I")),
                    }],
                    rhs: vec![Expression::binary(
                        BinaryOperator::Mul,
                        Expression::variable("I"),
                        Expression::variable("I"),
                    )],
                }),
                constants: ForConstants::default(),
            },
            writen(Expression::VectorAccess {
                base: Box::new(Expression::variable("V")),
                index: Box::new(Expression::Number(3)),
            }),
            Statement::RoutineCall(Expression::call("NEWLINE", vec![])),
        ],
    }));
    p
}

/// LET P = PAIR(7, 42); WRITEN(P.first); WRITEN(P.second)
fn packed_pair() -> Program {
    let access = |lane| Expression::PackedAccess {
        shape: PackedShape::Pair,
        base: Box::new(Expression::variable("P")),
        lane,
    };
    let mut p = Program::new();
    p.declarations.push(start(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["P".into()],
            initializers: vec![Expression::PackedConstruct {
                shape: PackedShape::Pair,
                operands: vec![Expression::Number(7), Expression::Number(42)],
            }],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![
            writen(access(0)),
            Statement::RoutineCall(Expression::call(
                "WRITES",
                vec![Expression::StringLit(" ".into())],
            )),
            writen(access(1)),
            Statement::RoutineCall(Expression::call("NEWLINE", vec![])),
        ],
    }));
    p
}

/// Animal with virtual speak, Dog overriding; NEW Dog then A.speak().
fn classes() -> Program {
    let speak = |value: i64| Declaration::Routine {
        name: "speak".into(),
        parameters: vec![],
        body: writen(Expression::Number(value)),
        flags: FunctionFlags {
            is_virtual: true,
            ..Default::default()
        },
    };
    let mut p = Program::new();
    p.declarations.push(Declaration::Class(ClassDeclaration {
        name: "Animal".into(),
        parent: None,
        members: vec![ClassMember {
            visibility: Visibility::Public,
            declaration: speak(1),
        }],
    }));
    p.declarations.push(Declaration::Class(ClassDeclaration {
        name: "Dog".into(),
        parent: Some("Animal".into()),
        members: vec![ClassMember {
            visibility: Visibility::Public,
            declaration: speak(2),
        }],
    }));
    p.declarations.push(start(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["A".into()],
            initializers: vec![Expression::New {
                class_name: "Dog".into(),
                args: vec![],
                binding: None,
            }],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![
            Statement::RoutineCall(Expression::Call {
                callee: Box::new(Expression::MemberAccess {
                    object: Box::new(Expression::variable("A")),
                    member: "speak".into(),
                }),
                args: vec![],
            }),
            Statement::RoutineCall(Expression::call("NEWLINE", vec![])),
        ],
    }));
    p
}
