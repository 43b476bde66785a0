//! Short-circuit lowering.
//!
//! `a & b` becomes `a -> b, false` and `a | b` becomes `a -> true, b`,
//! establishing the evaluation order the language requires before codegen
//! sees the tree. Bitwise operators are untouched.

use core_ast::rewrite::{Rewrite, rewrite_expr_children};
use core_ast::{BinaryOperator, Expression, Program};

#[derive(Debug, Default)]
pub struct ShortCircuitLowering;

impl ShortCircuitLowering {
    pub fn apply(program: Program) -> Program {
        ShortCircuitLowering.rewrite_program(program)
    }
}

impl Rewrite for ShortCircuitLowering {
    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        let e = rewrite_expr_children(self, e);
        match e {
            Expression::Binary {
                op: BinaryOperator::LogicalAnd,
                lhs,
                rhs,
            } => Expression::Conditional {
                condition: lhs,
                then_expr: rhs,
                else_expr: Box::new(Expression::Boolean(false)),
            },
            Expression::Binary {
                op: BinaryOperator::LogicalOr,
                lhs,
                rhs,
            } => Expression::Conditional {
                condition: lhs,
                then_expr: Box::new(Expression::Boolean(true)),
                else_expr: rhs,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_and_lowers_to_conditional() {
        let e = ShortCircuitLowering.rewrite_expr(Expression::binary(
            BinaryOperator::LogicalAnd,
            Expression::variable("a"),
            Expression::variable("b"),
        ));
        assert_eq!(
            e,
            Expression::Conditional {
                condition: Box::new(Expression::variable("a")),
                then_expr: Box::new(Expression::variable("b")),
                else_expr: Box::new(Expression::Boolean(false)),
            }
        );
    }

    #[test]
    fn logical_or_lowers_to_conditional() {
        let e = ShortCircuitLowering.rewrite_expr(Expression::binary(
            BinaryOperator::LogicalOr,
            Expression::variable("a"),
            Expression::variable("b"),
        ));
        assert_eq!(
            e,
            Expression::Conditional {
                condition: Box::new(Expression::variable("a")),
                then_expr: Box::new(Expression::Boolean(true)),
                else_expr: Box::new(Expression::variable("b")),
            }
        );
    }

    #[test]
    fn nested_operands_lower_too() {
        let e = ShortCircuitLowering.rewrite_expr(Expression::binary(
            BinaryOperator::LogicalAnd,
            Expression::binary(
                BinaryOperator::LogicalOr,
                Expression::variable("a"),
                Expression::variable("b"),
            ),
            Expression::variable("c"),
        ));
        let Expression::Conditional { condition, .. } = e else {
            panic!()
        };
        assert!(matches!(*condition, Expression::Conditional { .. }));
    }
}
