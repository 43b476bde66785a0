//! Read-only traversal helpers.
//!
//! Analyzers that only need to observe nodes use these walkers instead of
//! hand-rolling the recursion per pass. Walks are pre-order; expressions
//! nested inside `VALOF` bodies are reached through the statement walk.

use crate::decl::Declaration;
use crate::expr::Expression;
use crate::stmt::{RepeatMode, Statement};

/// Visit `e` and every expression beneath it, including those inside
/// `VALOF`/`FLOATVALOF` statement bodies.
pub fn visit_expr(e: &Expression, f: &mut dyn FnMut(&Expression)) {
    f(e);
    match e {
        Expression::Number(_)
        | Expression::Float(_)
        | Expression::StringLit(_)
        | Expression::CharLit(_)
        | Expression::Boolean(_)
        | Expression::Null
        | Expression::Variable(_)
        | Expression::SuperMethodAccess { .. } => {}
        Expression::Binary { lhs, rhs, .. } => {
            visit_expr(lhs, f);
            visit_expr(rhs, f);
        }
        Expression::Unary { operand, .. } => visit_expr(operand, f),
        Expression::VectorAccess { base, index }
        | Expression::CharIndirection { base, index }
        | Expression::FloatVectorIndirection { base, index } => {
            visit_expr(base, f);
            visit_expr(index, f);
        }
        Expression::BitfieldAccess {
            base,
            start_bit,
            width,
        } => {
            visit_expr(base, f);
            visit_expr(start_bit, f);
            visit_expr(width, f);
        }
        Expression::Call { callee, args } => {
            visit_expr(callee, f);
            for a in args {
                visit_expr(a, f);
            }
        }
        Expression::SysCall { number, args } => {
            visit_expr(number, f);
            for a in args {
                visit_expr(a, f);
            }
        }
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            visit_expr(condition, f);
            visit_expr(then_expr, f);
            visit_expr(else_expr, f);
        }
        Expression::Valof { body } | Expression::FloatValof { body } => {
            visit_stmt_exprs(body, f);
        }
        Expression::VecAllocation { size }
        | Expression::FVecAllocation { size }
        | Expression::PairsAllocation { size }
        | Expression::FPairsAllocation { size }
        | Expression::StringAllocation { size } => visit_expr(size, f),
        Expression::Table { entries, .. }
        | Expression::List { entries }
        | Expression::VecInitializer { entries, .. } => {
            for e in entries {
                visit_expr(e, f);
            }
        }
        Expression::New { args, .. } | Expression::SuperMethodCall { args, .. } => {
            for a in args {
                visit_expr(a, f);
            }
        }
        Expression::MemberAccess { object, .. } => visit_expr(object, f),
        Expression::PackedConstruct { operands, .. } => {
            for o in operands {
                visit_expr(o, f);
            }
        }
        Expression::PackedAccess { base, .. } => visit_expr(base, f),
        Expression::LaneAccess { base, lane } => {
            visit_expr(base, f);
            visit_expr(lane, f);
        }
    }
}

/// Apply `f` to the immediate expression children of `e` only — no deep
/// recursion, and `VALOF` bodies are not entered. Callers that track scope
/// state build their own recursion on top of this.
pub fn each_child_expr(e: &Expression, f: &mut dyn FnMut(&Expression)) {
    match e {
        Expression::Number(_)
        | Expression::Float(_)
        | Expression::StringLit(_)
        | Expression::CharLit(_)
        | Expression::Boolean(_)
        | Expression::Null
        | Expression::Variable(_)
        | Expression::SuperMethodAccess { .. }
        | Expression::Valof { .. }
        | Expression::FloatValof { .. } => {}
        Expression::Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        Expression::Unary { operand, .. } => f(operand),
        Expression::VectorAccess { base, index }
        | Expression::CharIndirection { base, index }
        | Expression::FloatVectorIndirection { base, index }
        | Expression::LaneAccess { base, lane: index } => {
            f(base);
            f(index);
        }
        Expression::BitfieldAccess {
            base,
            start_bit,
            width,
        } => {
            f(base);
            f(start_bit);
            f(width);
        }
        Expression::Call { callee, args } => {
            f(callee);
            for a in args {
                f(a);
            }
        }
        Expression::SysCall { number, args } => {
            f(number);
            for a in args {
                f(a);
            }
        }
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            f(condition);
            f(then_expr);
            f(else_expr);
        }
        Expression::VecAllocation { size }
        | Expression::FVecAllocation { size }
        | Expression::PairsAllocation { size }
        | Expression::FPairsAllocation { size }
        | Expression::StringAllocation { size } => f(size),
        Expression::Table { entries, .. }
        | Expression::List { entries }
        | Expression::VecInitializer { entries, .. }
        | Expression::PackedConstruct {
            operands: entries, ..
        } => {
            for e in entries {
                f(e);
            }
        }
        Expression::New { args, .. } | Expression::SuperMethodCall { args, .. } => {
            for a in args {
                f(a);
            }
        }
        Expression::MemberAccess { object, .. } => f(object),
        Expression::PackedAccess { base, .. } => f(base),
    }
}

/// Visit every expression appearing in `s` or any nested statement.
pub fn visit_stmt_exprs(s: &Statement, f: &mut dyn FnMut(&Expression)) {
    visit_stmt(s, &mut |stmt| {
        each_direct_expr(stmt, &mut |e| visit_expr(e, f));
    });
}

/// Visit `s` and every statement beneath it (pre-order). Does not descend
/// into expressions, so `VALOF` bodies are *not* reached; callers that need
/// them use `visit_stmt_exprs` or walk declarations separately.
pub fn visit_stmt(s: &Statement, f: &mut dyn FnMut(&Statement)) {
    f(s);
    match s {
        Statement::Assignment { .. }
        | Statement::RoutineCall(_)
        | Statement::Goto(_)
        | Statement::Return
        | Statement::Finish { .. }
        | Statement::Break
        | Statement::Loop
        | Statement::Endcase
        | Statement::Resultis { .. }
        | Statement::StringDecl { .. }
        | Statement::LabelTarget { .. }
        | Statement::ConditionalBranch { .. }
        | Statement::Brk
        | Statement::Free(_)
        | Statement::Retain { .. }
        | Statement::Remanage { .. }
        | Statement::Reduction { .. }
        | Statement::ReductionLoop { .. }
        | Statement::PairwiseReductionLoop { .. } => {}
        Statement::If { then_branch, .. } | Statement::Unless { then_branch, .. } => {
            visit_stmt(then_branch, f)
        }
        Statement::Test {
            then_branch,
            else_branch,
            ..
        } => {
            visit_stmt(then_branch, f);
            visit_stmt(else_branch, f);
        }
        Statement::While { body, .. }
        | Statement::Until { body, .. }
        | Statement::Repeat { body, .. }
        | Statement::For { body, .. }
        | Statement::ForEach { body, .. }
        | Statement::Switchon { body, .. }
        | Statement::Case { body, .. }
        | Statement::Default { body } => visit_stmt(body, f),
        Statement::Compound(stmts) => {
            for st in stmts {
                visit_stmt(st, f);
            }
        }
        Statement::Block { statements, .. } => {
            for st in statements {
                visit_stmt(st, f);
            }
        }
        Statement::Defer(inner) => visit_stmt(inner, f),
    }
}

/// Apply `f` to each expression directly owned by `s` (not nested statements).
pub fn each_direct_expr(s: &Statement, f: &mut dyn FnMut(&Expression)) {
    match s {
        Statement::Assignment { lhs, rhs } => {
            for e in lhs {
                f(e);
            }
            for e in rhs {
                f(e);
            }
        }
        Statement::RoutineCall(e) | Statement::Goto(e) | Statement::Free(e) => f(e),
        Statement::If { condition, .. }
        | Statement::Unless { condition, .. }
        | Statement::Test { condition, .. }
        | Statement::While { condition, .. }
        | Statement::Until { condition, .. } => f(condition),
        Statement::Repeat { mode, .. } => match mode {
            RepeatMode::Forever => {}
            RepeatMode::While(c) | RepeatMode::Until(c) => f(c),
        },
        Statement::For {
            start, end, step, ..
        } => {
            f(start);
            f(end);
            if let Some(st) = step {
                f(st);
            }
        }
        Statement::ForEach { collection, .. } => f(collection),
        Statement::Switchon { subject, .. } => f(subject),
        Statement::Case { constant, .. } => f(constant),
        Statement::Finish { syscall, args } => {
            if let Some(n) = syscall {
                f(n);
            }
            for a in args {
                f(a);
            }
        }
        Statement::Resultis { value, .. } => f(value),
        Statement::StringDecl { size, .. } => f(size),
        Statement::ConditionalBranch { value, .. } => f(value),
        Statement::Reduction { source, .. } => f(source),
        Statement::Block { declarations, .. } => {
            for d in declarations {
                each_decl_expr(d, f);
            }
        }
        Statement::Default { .. }
        | Statement::Compound(_)
        | Statement::Defer(_)
        | Statement::Return
        | Statement::Break
        | Statement::Loop
        | Statement::Endcase
        | Statement::LabelTarget { .. }
        | Statement::Brk
        | Statement::Retain { .. }
        | Statement::Remanage { .. }
        | Statement::ReductionLoop { .. }
        | Statement::PairwiseReductionLoop { .. } => {}
    }
}

/// Apply `f` to each expression directly owned by a declaration.
pub fn each_decl_expr(d: &Declaration, f: &mut dyn FnMut(&Expression)) {
    match d {
        Declaration::Let { initializers, .. }
        | Declaration::GlobalVariable { initializers, .. } => {
            for e in initializers {
                f(e);
            }
        }
        Declaration::Static { initializer, .. } => f(initializer),
        Declaration::Function { body, .. } => f(body),
        Declaration::Routine { .. }
        | Declaration::Manifest { .. }
        | Declaration::Global { .. }
        | Declaration::Label { .. }
        | Declaration::Class(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOperator;

    #[test]
    fn walks_into_valof_bodies() {
        let e = Expression::Valof {
            body: Box::new(Statement::Resultis {
                value: Expression::binary(
                    BinaryOperator::Mul,
                    Expression::variable("N"),
                    Expression::Number(2),
                ),
                from_send: false,
            }),
        };
        let mut names = Vec::new();
        visit_expr(&e, &mut |e| {
            if let Expression::Variable(v) = e {
                names.push(v.name.clone());
            }
        });
        assert_eq!(names, vec!["N"]);
    }
}
