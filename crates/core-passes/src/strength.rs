//! Strength reduction.
//!
//! Integer multiplies and divides by powers of two become shifts, float
//! doubling becomes an add, and float division by a constant becomes a
//! multiply by the reciprocal. Division keeps its operand order; only a
//! positive power-of-two divisor is rewritten.

use core_ast::rewrite::{Rewrite, rewrite_expr_children};
use core_ast::{BinaryOperator, Expression, Program};
use tracing::trace;

#[derive(Debug, Default)]
pub struct StrengthReduction {
    pub rewrites_applied: u64,
}

impl StrengthReduction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(mut self, program: Program) -> Program {
        let out = self.rewrite_program(program);
        trace!(target: "passes.strength", rewrites = self.rewrites_applied, "strength_reduction_done");
        out
    }
}

fn power_of_two_exponent(n: i64) -> Option<u32> {
    (n > 0 && (n & (n - 1)) == 0).then(|| n.trailing_zeros())
}

impl Rewrite for StrengthReduction {
    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        let e = rewrite_expr_children(self, e);
        let Expression::Binary { op, lhs, rhs } = e else {
            return e;
        };
        match (op, lhs, rhs) {
            // x * 2^k  and  2^k * x  ->  x << k
            (BinaryOperator::Mul, x, rhs) if matches!(*rhs, Expression::Number(n) if power_of_two_exponent(n).is_some()) => {
                let Expression::Number(n) = *rhs else {
                    unreachable!()
                };
                self.rewrites_applied += 1;
                Expression::Binary {
                    op: BinaryOperator::LeftShift,
                    lhs: x,
                    rhs: Box::new(Expression::Number(
                        power_of_two_exponent(n).expect("guard checked") as i64,
                    )),
                }
            }
            (BinaryOperator::Mul, lhs, x) if matches!(*lhs, Expression::Number(n) if power_of_two_exponent(n).is_some()) => {
                let Expression::Number(n) = *lhs else {
                    unreachable!()
                };
                self.rewrites_applied += 1;
                Expression::Binary {
                    op: BinaryOperator::LeftShift,
                    lhs: x,
                    rhs: Box::new(Expression::Number(
                        power_of_two_exponent(n).expect("guard checked") as i64,
                    )),
                }
            }
            // x / 2^k  ->  x >> k (positive divisor only, order preserved)
            (BinaryOperator::Div, x, rhs) if matches!(*rhs, Expression::Number(n) if power_of_two_exponent(n).is_some()) => {
                let Expression::Number(n) = *rhs else {
                    unreachable!()
                };
                self.rewrites_applied += 1;
                Expression::Binary {
                    op: BinaryOperator::RightShift,
                    lhs: x,
                    rhs: Box::new(Expression::Number(
                        power_of_two_exponent(n).expect("guard checked") as i64,
                    )),
                }
            }
            // x * 2.0  ->  x + x (only when x is cheap to duplicate)
            (BinaryOperator::Mul, x, rhs)
                if matches!(*rhs, Expression::Float(v) if v == 2.0)
                    && matches!(*x, Expression::Variable(_)) =>
            {
                self.rewrites_applied += 1;
                Expression::Binary {
                    op: BinaryOperator::Add,
                    lhs: x.clone(),
                    rhs: x,
                }
            }
            // x / c  ->  x * (1/c) for a nonzero float constant
            (BinaryOperator::Div, x, rhs)
                if matches!(*rhs, Expression::Float(v) if v != 0.0) =>
            {
                let Expression::Float(c) = *rhs else {
                    unreachable!()
                };
                self.rewrites_applied += 1;
                Expression::Binary {
                    op: BinaryOperator::Mul,
                    lhs: x,
                    rhs: Box::new(Expression::Float(1.0 / c)),
                }
            }
            (op, lhs, rhs) => Expression::Binary { op, lhs, rhs },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(e: Expression) -> Expression {
        StrengthReduction::new().rewrite_expr(e)
    }

    #[test]
    fn multiply_by_power_of_two_becomes_shift() {
        let e = reduce(Expression::binary(
            BinaryOperator::Mul,
            Expression::variable("x"),
            Expression::Number(8),
        ));
        assert_eq!(
            e,
            Expression::binary(
                BinaryOperator::LeftShift,
                Expression::variable("x"),
                Expression::Number(3)
            )
        );
    }

    #[test]
    fn divide_by_power_of_two_becomes_shift() {
        let e = reduce(Expression::binary(
            BinaryOperator::Div,
            Expression::variable("x"),
            Expression::Number(4),
        ));
        assert_eq!(
            e,
            Expression::binary(
                BinaryOperator::RightShift,
                Expression::variable("x"),
                Expression::Number(2)
            )
        );
    }

    #[test]
    fn negative_divisor_is_untouched() {
        let e = Expression::binary(
            BinaryOperator::Div,
            Expression::variable("x"),
            Expression::Number(-4),
        );
        assert_eq!(reduce(e.clone()), e);
    }

    #[test]
    fn float_doubling_becomes_add() {
        let e = reduce(Expression::binary(
            BinaryOperator::Mul,
            Expression::variable("f"),
            Expression::Float(2.0),
        ));
        assert_eq!(
            e,
            Expression::binary(
                BinaryOperator::Add,
                Expression::variable("f"),
                Expression::variable("f")
            )
        );
    }

    #[test]
    fn float_division_becomes_reciprocal_multiply() {
        let e = reduce(Expression::binary(
            BinaryOperator::Div,
            Expression::variable("f"),
            Expression::Float(4.0),
        ));
        assert_eq!(
            e,
            Expression::binary(
                BinaryOperator::Mul,
                Expression::variable("f"),
                Expression::Float(0.25)
            )
        );
    }

    #[test]
    fn multiply_by_non_power_is_untouched() {
        let e = Expression::binary(
            BinaryOperator::Mul,
            Expression::variable("x"),
            Expression::Number(6),
        );
        assert_eq!(reduce(e.clone()), e);
    }
}
