//! Owned tree rewriting.
//!
//! Passes implement [`Rewrite`] and override the hooks they care about. The
//! free `*_children` functions perform the structural recursion, so an
//! override that wants bottom-up behavior first recurses via the children
//! function and then transforms the rebuilt node:
//!
//! ```ignore
//! fn rewrite_expr(&mut self, e: Expression) -> Expression {
//!     let e = rewrite_expr_children(self, e);
//!     self.fold(e)
//! }
//! ```
//!
//! `rewrite_decl` returns `Option` so a pass can delete a declaration (the
//! manifest resolver consumes `MANIFEST` blocks this way).

use crate::Program;
use crate::decl::{ClassDeclaration, ClassMember, Declaration};
use crate::expr::Expression;
use crate::stmt::{RepeatMode, Statement};

pub trait Rewrite {
    fn rewrite_program(&mut self, mut p: Program) -> Program {
        p.declarations = p
            .declarations
            .into_iter()
            .filter_map(|d| self.rewrite_decl(d))
            .collect();
        p.statements = p
            .statements
            .into_iter()
            .map(|s| self.rewrite_stmt(s))
            .collect();
        p
    }

    fn rewrite_decl(&mut self, d: Declaration) -> Option<Declaration> {
        Some(rewrite_decl_children(self, d))
    }

    fn rewrite_stmt(&mut self, s: Statement) -> Statement {
        rewrite_stmt_children(self, s)
    }

    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        rewrite_expr_children(self, e)
    }
}

pub fn rewrite_decl_children<R: Rewrite + ?Sized>(r: &mut R, d: Declaration) -> Declaration {
    match d {
        Declaration::Let {
            names,
            initializers,
            is_float,
            is_retained,
            explicit_type,
        } => Declaration::Let {
            names,
            initializers: initializers.into_iter().map(|e| r.rewrite_expr(e)).collect(),
            is_float,
            is_retained,
            explicit_type,
        },
        Declaration::Static { name, initializer } => Declaration::Static {
            name,
            initializer: r.rewrite_expr(initializer),
        },
        Declaration::GlobalVariable {
            names,
            initializers,
            is_float,
        } => Declaration::GlobalVariable {
            names,
            initializers: initializers.into_iter().map(|e| r.rewrite_expr(e)).collect(),
            is_float,
        },
        Declaration::Function {
            name,
            parameters,
            body,
            flags,
        } => Declaration::Function {
            name,
            parameters,
            body: r.rewrite_expr(body),
            flags,
        },
        Declaration::Routine {
            name,
            parameters,
            body,
            flags,
        } => Declaration::Routine {
            name,
            parameters,
            body: r.rewrite_stmt(body),
            flags,
        },
        Declaration::Label { name, statement } => Declaration::Label {
            name,
            statement: Box::new(r.rewrite_stmt(*statement)),
        },
        Declaration::Class(c) => Declaration::Class(ClassDeclaration {
            name: c.name,
            parent: c.parent,
            members: c
                .members
                .into_iter()
                .filter_map(|m| {
                    r.rewrite_decl(m.declaration).map(|declaration| ClassMember {
                        visibility: m.visibility,
                        declaration,
                    })
                })
                .collect(),
        }),
        d @ (Declaration::Manifest { .. } | Declaration::Global { .. }) => d,
    }
}

pub fn rewrite_stmt_children<R: Rewrite + ?Sized>(r: &mut R, s: Statement) -> Statement {
    let rw_box = |r: &mut R, s: Box<Statement>| Box::new(r.rewrite_stmt(*s));
    match s {
        Statement::Assignment { lhs, rhs } => Statement::Assignment {
            lhs: lhs.into_iter().map(|e| r.rewrite_expr(e)).collect(),
            rhs: rhs.into_iter().map(|e| r.rewrite_expr(e)).collect(),
        },
        Statement::RoutineCall(e) => Statement::RoutineCall(r.rewrite_expr(e)),
        Statement::If {
            condition,
            then_branch,
        } => Statement::If {
            condition: r.rewrite_expr(condition),
            then_branch: rw_box(r, then_branch),
        },
        Statement::Unless {
            condition,
            then_branch,
        } => Statement::Unless {
            condition: r.rewrite_expr(condition),
            then_branch: rw_box(r, then_branch),
        },
        Statement::Test {
            condition,
            then_branch,
            else_branch,
        } => Statement::Test {
            condition: r.rewrite_expr(condition),
            then_branch: rw_box(r, then_branch),
            else_branch: rw_box(r, else_branch),
        },
        Statement::While { condition, body } => Statement::While {
            condition: r.rewrite_expr(condition),
            body: rw_box(r, body),
        },
        Statement::Until { condition, body } => Statement::Until {
            condition: r.rewrite_expr(condition),
            body: rw_box(r, body),
        },
        Statement::Repeat { body, mode } => Statement::Repeat {
            body: rw_box(r, body),
            mode: match mode {
                RepeatMode::Forever => RepeatMode::Forever,
                RepeatMode::While(c) => RepeatMode::While(r.rewrite_expr(c)),
                RepeatMode::Until(c) => RepeatMode::Until(r.rewrite_expr(c)),
            },
        },
        Statement::For {
            var,
            start,
            end,
            step,
            body,
            constants,
        } => Statement::For {
            var,
            start: r.rewrite_expr(start),
            end: r.rewrite_expr(end),
            step: step.map(|e| r.rewrite_expr(e)),
            body: rw_box(r, body),
            constants,
        },
        Statement::ForEach {
            value_var,
            tag_var,
            collection,
            body,
            element_filter,
        } => Statement::ForEach {
            value_var,
            tag_var,
            collection: r.rewrite_expr(collection),
            body: rw_box(r, body),
            element_filter,
        },
        Statement::Switchon { subject, body } => Statement::Switchon {
            subject: r.rewrite_expr(subject),
            body: rw_box(r, body),
        },
        Statement::Case {
            constant,
            resolved_value,
            body,
        } => Statement::Case {
            constant: r.rewrite_expr(constant),
            resolved_value,
            body: rw_box(r, body),
        },
        Statement::Default { body } => Statement::Default {
            body: rw_box(r, body),
        },
        Statement::Goto(e) => Statement::Goto(r.rewrite_expr(e)),
        Statement::Finish { syscall, args } => Statement::Finish {
            syscall: syscall.map(|e| r.rewrite_expr(e)),
            args: args.into_iter().map(|e| r.rewrite_expr(e)).collect(),
        },
        Statement::Resultis { value, from_send } => Statement::Resultis {
            value: r.rewrite_expr(value),
            from_send,
        },
        Statement::Compound(stmts) => {
            Statement::Compound(stmts.into_iter().map(|s| r.rewrite_stmt(s)).collect())
        }
        Statement::Block {
            declarations,
            statements,
        } => Statement::Block {
            declarations: declarations
                .into_iter()
                .filter_map(|d| r.rewrite_decl(d))
                .collect(),
            statements: statements.into_iter().map(|s| r.rewrite_stmt(s)).collect(),
        },
        Statement::StringDecl { name, size } => Statement::StringDecl {
            name,
            size: r.rewrite_expr(size),
        },
        Statement::ConditionalBranch {
            condition,
            value,
            target,
        } => Statement::ConditionalBranch {
            condition,
            value: r.rewrite_expr(value),
            target,
        },
        Statement::Free(e) => Statement::Free(r.rewrite_expr(e)),
        Statement::Defer(inner) => Statement::Defer(rw_box(r, inner)),
        Statement::Reduction {
            reducer,
            result_var,
            source,
        } => Statement::Reduction {
            reducer,
            result_var,
            source: r.rewrite_expr(source),
        },
        s @ (Statement::Return
        | Statement::Break
        | Statement::Loop
        | Statement::Endcase
        | Statement::LabelTarget { .. }
        | Statement::Brk
        | Statement::Retain { .. }
        | Statement::Remanage { .. }
        | Statement::ReductionLoop { .. }
        | Statement::PairwiseReductionLoop { .. }) => s,
    }
}

pub fn rewrite_expr_children<R: Rewrite + ?Sized>(r: &mut R, e: Expression) -> Expression {
    let rw = |r: &mut R, e: Box<Expression>| Box::new(r.rewrite_expr(*e));
    match e {
        e @ (Expression::Number(_)
        | Expression::Float(_)
        | Expression::StringLit(_)
        | Expression::CharLit(_)
        | Expression::Boolean(_)
        | Expression::Null
        | Expression::Variable(_)
        | Expression::SuperMethodAccess { .. }) => e,
        Expression::Binary { op, lhs, rhs } => Expression::Binary {
            op,
            lhs: rw(r, lhs),
            rhs: rw(r, rhs),
        },
        Expression::Unary { op, operand } => Expression::Unary {
            op,
            operand: rw(r, operand),
        },
        Expression::VectorAccess { base, index } => Expression::VectorAccess {
            base: rw(r, base),
            index: rw(r, index),
        },
        Expression::CharIndirection { base, index } => Expression::CharIndirection {
            base: rw(r, base),
            index: rw(r, index),
        },
        Expression::FloatVectorIndirection { base, index } => Expression::FloatVectorIndirection {
            base: rw(r, base),
            index: rw(r, index),
        },
        Expression::BitfieldAccess {
            base,
            start_bit,
            width,
        } => Expression::BitfieldAccess {
            base: rw(r, base),
            start_bit: rw(r, start_bit),
            width: rw(r, width),
        },
        Expression::Call { callee, args } => Expression::Call {
            callee: rw(r, callee),
            args: args.into_iter().map(|a| r.rewrite_expr(a)).collect(),
        },
        Expression::SysCall { number, args } => Expression::SysCall {
            number: rw(r, number),
            args: args.into_iter().map(|a| r.rewrite_expr(a)).collect(),
        },
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => Expression::Conditional {
            condition: rw(r, condition),
            then_expr: rw(r, then_expr),
            else_expr: rw(r, else_expr),
        },
        Expression::Valof { body } => Expression::Valof {
            body: Box::new(r.rewrite_stmt(*body)),
        },
        Expression::FloatValof { body } => Expression::FloatValof {
            body: Box::new(r.rewrite_stmt(*body)),
        },
        Expression::VecAllocation { size } => Expression::VecAllocation { size: rw(r, size) },
        Expression::FVecAllocation { size } => Expression::FVecAllocation { size: rw(r, size) },
        Expression::PairsAllocation { size } => Expression::PairsAllocation { size: rw(r, size) },
        Expression::FPairsAllocation { size } => {
            Expression::FPairsAllocation { size: rw(r, size) }
        }
        Expression::StringAllocation { size } => {
            Expression::StringAllocation { size: rw(r, size) }
        }
        Expression::Table { entries, is_float } => Expression::Table {
            entries: entries.into_iter().map(|e| r.rewrite_expr(e)).collect(),
            is_float,
        },
        Expression::List { entries } => Expression::List {
            entries: entries.into_iter().map(|e| r.rewrite_expr(e)).collect(),
        },
        Expression::VecInitializer { entries, is_float } => Expression::VecInitializer {
            entries: entries.into_iter().map(|e| r.rewrite_expr(e)).collect(),
            is_float,
        },
        Expression::New {
            class_name,
            args,
            binding,
        } => Expression::New {
            class_name,
            args: args.into_iter().map(|a| r.rewrite_expr(a)).collect(),
            binding,
        },
        Expression::MemberAccess { object, member } => Expression::MemberAccess {
            object: rw(r, object),
            member,
        },
        Expression::SuperMethodCall { member, args } => Expression::SuperMethodCall {
            member,
            args: args.into_iter().map(|a| r.rewrite_expr(a)).collect(),
        },
        Expression::PackedConstruct { shape, operands } => Expression::PackedConstruct {
            shape,
            operands: operands.into_iter().map(|e| r.rewrite_expr(e)).collect(),
        },
        Expression::PackedAccess { shape, base, lane } => Expression::PackedAccess {
            shape,
            base: rw(r, base),
            lane,
        },
        Expression::LaneAccess { base, lane } => Expression::LaneAccess {
            base: rw(r, base),
            lane: rw(r, lane),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOperator;

    struct NegateNumbers;
    impl Rewrite for NegateNumbers {
        fn rewrite_expr(&mut self, e: Expression) -> Expression {
            let e = rewrite_expr_children(self, e);
            match e {
                Expression::Number(n) => Expression::Number(-n),
                other => other,
            }
        }
    }

    #[test]
    fn bottom_up_rewrite_reaches_leaves() {
        let e = Expression::binary(
            BinaryOperator::Add,
            Expression::Number(1),
            Expression::binary(
                BinaryOperator::Mul,
                Expression::Number(2),
                Expression::variable("x"),
            ),
        );
        let out = NegateNumbers.rewrite_expr(e);
        let mut nums = Vec::new();
        crate::visit::visit_expr(&out, &mut |e| {
            if let Expression::Number(n) = e {
                nums.push(*n);
            }
        });
        assert_eq!(nums, vec![-1, -2]);
    }
}
