//! `CREATE`-method reordering.
//!
//! Inside a class constructor, every assignment to a member of the class
//! must precede any `SUPER.CREATE(...)` call; otherwise member stores and
//! the super call's register needs interfere during allocation. The pass
//! stably moves late member assignments ahead of the super call.

use core_analysis::ClassTable;
use core_ast::{ClassDeclaration, Declaration, Expression, Program, Statement};
use tracing::debug;

pub struct CreateMethodReorder;

impl CreateMethodReorder {
    pub fn apply(mut program: Program, classes: &ClassTable) -> Program {
        for decl in &mut program.declarations {
            if let Declaration::Class(class) = decl {
                reorder_class(class, classes);
            }
        }
        program
    }
}

fn reorder_class(class: &mut ClassDeclaration, classes: &ClassTable) {
    let class_name = class.name.clone();
    for member in &mut class.members {
        if let Declaration::Routine { name, body, .. } = &mut member.declaration
            && name == "CREATE"
        {
            reorder_body(body, &class_name, classes);
        }
    }
}

fn is_super_create(s: &Statement) -> bool {
    matches!(
        s,
        Statement::RoutineCall(Expression::SuperMethodCall { member, .. }) if member == "CREATE"
    )
}

fn is_member_assignment(s: &Statement, class: &str, classes: &ClassTable) -> bool {
    let Statement::Assignment { lhs, .. } = s else {
        return false;
    };
    let Some(info) = classes.get(class) else {
        return false;
    };
    lhs.iter().all(|e| match e {
        Expression::Variable(v) => info.member(&v.name).is_some(),
        Expression::MemberAccess { member, .. } => info.member(member).is_some(),
        _ => false,
    })
}

fn reorder_body(body: &mut Statement, class: &str, classes: &ClassTable) {
    match body {
        Statement::Compound(stmts) => reorder_sequence(stmts, class, classes),
        Statement::Block { statements, .. } => reorder_sequence(statements, class, classes),
        _ => {}
    }
}

fn reorder_sequence(stmts: &mut Vec<Statement>, class: &str, classes: &ClassTable) {
    let Some(super_pos) = stmts.iter().position(is_super_create) else {
        return;
    };
    // Stable partition of the tail: member assignments move ahead of the
    // super call, everything else keeps its order after it.
    let tail: Vec<Statement> = stmts.split_off(super_pos);
    let mut moved = Vec::new();
    let mut rest = Vec::new();
    for s in tail {
        if is_member_assignment(&s, class, classes) {
            moved.push(s);
        } else {
            rest.push(s);
        }
    }
    if !moved.is_empty() {
        debug!(
            target: "passes.reorder",
            class = %class,
            moved = moved.len(),
            "member_assignments_moved_before_super_create"
        );
    }
    stmts.extend(moved);
    stmts.extend(rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::{ClassMember, FunctionFlags, Visibility};

    fn program() -> Program {
        let create_body = Statement::Compound(vec![
            Statement::RoutineCall(Expression::SuperMethodCall {
                member: "CREATE".into(),
                args: vec![],
            }),
            Statement::Assignment {
                lhs: vec![Expression::variable("tail")],
                rhs: vec![Expression::Number(1)],
            },
        ]);
        let mut p = Program::new();
        p.declarations.push(Declaration::Class(ClassDeclaration {
            name: "Animal".into(),
            parent: None,
            members: vec![ClassMember {
                visibility: Visibility::Public,
                declaration: Declaration::Let {
                    names: vec!["legs".into()],
                    initializers: vec![Expression::Number(0)],
                    is_float: false,
                    is_retained: false,
                    explicit_type: None,
                },
            }],
        }));
        p.declarations.push(Declaration::Class(ClassDeclaration {
            name: "Dog".into(),
            parent: Some("Animal".into()),
            members: vec![
                ClassMember {
                    visibility: Visibility::Public,
                    declaration: Declaration::Let {
                        names: vec!["tail".into()],
                        initializers: vec![Expression::Number(0)],
                        is_float: false,
                        is_retained: false,
                        explicit_type: None,
                    },
                },
                ClassMember {
                    visibility: Visibility::Public,
                    declaration: Declaration::Routine {
                        name: "CREATE".into(),
                        parameters: vec![],
                        body: create_body,
                        flags: FunctionFlags::default(),
                    },
                },
            ],
        }));
        p
    }

    #[test]
    fn member_assignment_moves_before_super_create() {
        let p = program();
        let classes = ClassTable::build(&p).unwrap();
        let out = CreateMethodReorder::apply(p, &classes);

        let Declaration::Class(dog) = &out.declarations[1] else {
            panic!()
        };
        let Declaration::Routine { body, .. } = &dog.members[1].declaration else {
            panic!()
        };
        let Statement::Compound(stmts) = body else {
            panic!()
        };
        assert!(matches!(stmts[0], Statement::Assignment { .. }));
        assert!(is_super_create(&stmts[1]));
    }
}
