//! Constant folding with dead-branch elimination.
//!
//! Literal operands fold under the language's semantics: truth is -1,
//! integer division by zero is left intact, and mixed int/float arithmetic
//! promotes to float. Branches on known conditions are elided (`IF true`
//! keeps the body, `TEST` collapses to the live arm, `WHILE false`
//! disappears). A local-constants map propagates literal assignments along
//! straight-line code within a function; any control flow or loop entry
//! invalidates it. `LEN(v)` folds to the symbol's size when statically
//! known, and `FOR` loops cache constant bounds for codegen.

use core_ast::rewrite::{Rewrite, rewrite_expr_children, rewrite_stmt_children};
use core_ast::{
    BinaryOperator, Declaration, Expression, ForConstants, Program, Statement, UnaryOperator,
};
use core_symbols::SymbolTable;
use std::collections::HashMap;
use tracing::trace;

pub struct ConstantFolding<'a> {
    symbols: &'a SymbolTable,
    current_function: String,
    local_constants: HashMap<String, i64>,
    pub folds_applied: u64,
}

impl<'a> ConstantFolding<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        ConstantFolding {
            symbols,
            current_function: String::new(),
            local_constants: HashMap::new(),
            folds_applied: 0,
        }
    }

    pub fn apply(mut self, program: Program) -> Program {
        let out = self.rewrite_program(program);
        trace!(target: "passes.fold", folds = self.folds_applied, "constant_folding_done");
        out
    }
}

/// Truth as the source language defines it.
pub fn bool_to_word(b: bool) -> i64 {
    if b { -1 } else { 0 }
}

/// Is this literal a known truth value? Any nonzero integer is true.
fn literal_truth(e: &Expression) -> Option<bool> {
    e.literal_int().map(|v| v != 0)
}

fn no_op() -> Statement {
    Statement::Compound(Vec::new())
}

pub fn fold_integer_binary(op: BinaryOperator, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinaryOperator::Add => a.checked_add(b)?,
        BinaryOperator::Sub => a.checked_sub(b)?,
        BinaryOperator::Mul => a.checked_mul(b)?,
        BinaryOperator::Div => {
            if b == 0 {
                return None; // left intact, surfaces at runtime
            }
            a.checked_div(b)?
        }
        BinaryOperator::Rem => {
            if b == 0 {
                return None;
            }
            a.checked_rem(b)?
        }
        BinaryOperator::Eq => bool_to_word(a == b),
        BinaryOperator::Ne => bool_to_word(a != b),
        BinaryOperator::Lt => bool_to_word(a < b),
        BinaryOperator::Le => bool_to_word(a <= b),
        BinaryOperator::Gt => bool_to_word(a > b),
        BinaryOperator::Ge => bool_to_word(a >= b),
        BinaryOperator::LogicalAnd | BinaryOperator::BitwiseAnd => a & b,
        BinaryOperator::LogicalOr | BinaryOperator::BitwiseOr => a | b,
        BinaryOperator::Equivalence => !(a ^ b),
        BinaryOperator::NotEquivalence => a ^ b,
        BinaryOperator::LeftShift => {
            if !(0..64).contains(&b) {
                return None;
            }
            a.checked_shl(b as u32)?
        }
        BinaryOperator::RightShift => {
            if !(0..64).contains(&b) {
                return None;
            }
            a >> b
        }
    })
}

pub fn fold_float_binary(op: BinaryOperator, a: f64, b: f64) -> Option<Expression> {
    Some(match op {
        BinaryOperator::Add => Expression::Float(a + b),
        BinaryOperator::Sub => Expression::Float(a - b),
        BinaryOperator::Mul => Expression::Float(a * b),
        BinaryOperator::Div => Expression::Float(a / b),
        BinaryOperator::Eq => Expression::Number(bool_to_word(a == b)),
        BinaryOperator::Ne => Expression::Number(bool_to_word(a != b)),
        BinaryOperator::Lt => Expression::Number(bool_to_word(a < b)),
        BinaryOperator::Le => Expression::Number(bool_to_word(a <= b)),
        BinaryOperator::Gt => Expression::Number(bool_to_word(a > b)),
        BinaryOperator::Ge => Expression::Number(bool_to_word(a >= b)),
        _ => return None,
    })
}

impl<'a> ConstantFolding<'a> {
    fn fold_binary(&mut self, op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        // Mixed int/float follows BCPL promotion.
        let folded = match (&lhs, &rhs) {
            (Expression::Float(a), Expression::Float(b)) => fold_float_binary(op, *a, *b),
            (Expression::Float(a), Expression::Number(b)) => {
                fold_float_binary(op, *a, *b as f64)
            }
            (Expression::Number(a), Expression::Float(b)) => {
                fold_float_binary(op, *a as f64, *b)
            }
            _ => match (lhs.literal_int(), rhs.literal_int()) {
                (Some(a), Some(b)) => fold_integer_binary(op, a, b).map(Expression::Number),
                _ => None,
            },
        };
        match folded {
            Some(result) => {
                self.folds_applied += 1;
                result
            }
            None => Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    fn fold_unary(&mut self, op: UnaryOperator, operand: Expression) -> Expression {
        let folded = match (&op, &operand) {
            (UnaryOperator::Negate, Expression::Number(n)) => {
                n.checked_neg().map(Expression::Number)
            }
            (UnaryOperator::Negate, Expression::Float(v)) => Some(Expression::Float(-v)),
            (UnaryOperator::BitwiseNot, Expression::Number(n)) => Some(Expression::Number(!n)),
            (UnaryOperator::LogicalNot, e) => {
                literal_truth(e).map(|b| Expression::Number(bool_to_word(!b)))
            }
            (UnaryOperator::FloatConvert, Expression::Number(n)) => {
                Some(Expression::Float(*n as f64))
            }
            (UnaryOperator::IntegerConvert | UnaryOperator::FloatTruncate, Expression::Float(v)) => {
                Some(Expression::Number(*v as i64))
            }
            (UnaryOperator::FloatSqrt, Expression::Float(v)) if *v >= 0.0 => {
                Some(Expression::Float(v.sqrt()))
            }
            (UnaryOperator::FloatFloor, Expression::Float(v)) => {
                Some(Expression::Float(v.floor()))
            }
            (UnaryOperator::LengthOf, Expression::Variable(v)) => self
                .symbols
                .lookup_in_function(&v.name, &self.current_function)
                .and_then(|s| s.size)
                .map(|size| Expression::Number(size as i64)),
            _ => None,
        };
        match folded {
            Some(result) => {
                self.folds_applied += 1;
                result
            }
            None => Expression::Unary {
                op,
                operand: Box::new(operand),
            },
        }
    }

    /// Record or invalidate the local constant bound to an assignment.
    fn note_assignment(&mut self, lhs: &[Expression], rhs: &[Expression]) {
        for (l, r) in lhs.iter().zip(rhs) {
            if let Expression::Variable(v) = l {
                match r.literal_int() {
                    Some(value) if matches!(r, Expression::Number(_)) => {
                        self.local_constants.insert(v.name.clone(), value);
                    }
                    _ => {
                        self.local_constants.remove(&v.name);
                    }
                }
            }
        }
    }
}

impl<'a> Rewrite for ConstantFolding<'a> {
    fn rewrite_decl(&mut self, d: Declaration) -> Option<Declaration> {
        match d {
            Declaration::Function { ref name, .. } | Declaration::Routine { ref name, .. } => {
                // Entering a function invalidates the map.
                self.local_constants.clear();
                self.current_function = name.clone();
                let out = core_ast::rewrite::rewrite_decl_children(self, d);
                self.local_constants.clear();
                self.current_function.clear();
                Some(out)
            }
            other => Some(core_ast::rewrite::rewrite_decl_children(self, other)),
        }
    }

    fn rewrite_stmt(&mut self, s: Statement) -> Statement {
        match s {
            Statement::Assignment { lhs, rhs } => {
                let rhs: Vec<Expression> =
                    rhs.into_iter().map(|e| self.rewrite_expr(e)).collect();
                // Left-hand variables stay; their subscripts still fold.
                let lhs: Vec<Expression> = lhs
                    .into_iter()
                    .map(|e| match e {
                        e @ Expression::Variable(_) => e,
                        other => self.rewrite_expr(other),
                    })
                    .collect();
                self.note_assignment(&lhs, &rhs);
                Statement::Assignment { lhs, rhs }
            }
            Statement::If {
                condition,
                then_branch,
            } => {
                let condition = self.rewrite_expr(condition);
                match literal_truth(&condition) {
                    Some(true) => self.rewrite_stmt(*then_branch),
                    Some(false) => no_op(),
                    None => {
                        let out = Statement::If {
                            condition,
                            then_branch: Box::new(self.rewrite_stmt(*then_branch)),
                        };
                        self.local_constants.clear();
                        out
                    }
                }
            }
            Statement::Unless {
                condition,
                then_branch,
            } => {
                let condition = self.rewrite_expr(condition);
                match literal_truth(&condition) {
                    Some(false) => self.rewrite_stmt(*then_branch),
                    Some(true) => no_op(),
                    None => {
                        let out = Statement::Unless {
                            condition,
                            then_branch: Box::new(self.rewrite_stmt(*then_branch)),
                        };
                        self.local_constants.clear();
                        out
                    }
                }
            }
            Statement::Test {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.rewrite_expr(condition);
                match literal_truth(&condition) {
                    Some(true) => self.rewrite_stmt(*then_branch),
                    Some(false) => self.rewrite_stmt(*else_branch),
                    None => {
                        let out = Statement::Test {
                            condition,
                            then_branch: Box::new(self.rewrite_stmt(*then_branch)),
                            else_branch: Box::new(self.rewrite_stmt(*else_branch)),
                        };
                        self.local_constants.clear();
                        out
                    }
                }
            }
            Statement::While { condition, body } => {
                let condition = self.rewrite_expr(condition);
                if literal_truth(&condition) == Some(false) {
                    return no_op();
                }
                // Entering a loop body invalidates the map.
                self.local_constants.clear();
                let body = Box::new(self.rewrite_stmt(*body));
                self.local_constants.clear();
                Statement::While { condition, body }
            }
            Statement::For {
                var,
                start,
                end,
                step,
                body,
                mut constants,
            } => {
                let start = self.rewrite_expr(start);
                let end = self.rewrite_expr(end);
                let step = step.map(|e| self.rewrite_expr(e));
                constants = ForConstants {
                    end: match &end {
                        Expression::Number(n) => Some(*n),
                        _ => None,
                    },
                    step: match &step {
                        Some(Expression::Number(n)) => Some(*n),
                        None => Some(1),
                        _ => None,
                    },
                };
                self.local_constants.clear();
                let body = Box::new(self.rewrite_stmt(*body));
                self.local_constants.clear();
                Statement::For {
                    var,
                    start,
                    end,
                    step,
                    body,
                    constants,
                }
            }
            s @ (Statement::Until { .. }
            | Statement::Repeat { .. }
            | Statement::ForEach { .. }
            | Statement::Switchon { .. }) => {
                self.local_constants.clear();
                let out = rewrite_stmt_children(self, s);
                self.local_constants.clear();
                out
            }
            other => rewrite_stmt_children(self, other),
        }
    }

    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        // Constant propagation happens before structural folding so a
        // substituted variable can participate in the fold below it.
        let e = match e {
            Expression::Variable(v) => match self.local_constants.get(&v.name) {
                Some(value) => Expression::Number(*value),
                None => Expression::Variable(v),
            },
            other => other,
        };
        let e = rewrite_expr_children(self, e);
        match e {
            Expression::Binary { op, lhs, rhs } => self.fold_binary(op, *lhs, *rhs),
            Expression::Unary { op, operand } => self.fold_unary(op, *operand),
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => match literal_truth(&condition) {
                Some(true) => {
                    self.folds_applied += 1;
                    *then_expr
                }
                Some(false) => {
                    self.folds_applied += 1;
                    *else_expr
                }
                None => Expression::Conditional {
                    condition,
                    then_expr,
                    else_expr,
                },
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_expr(e: Expression) -> Expression {
        let symbols = SymbolTable::new();
        let mut pass = ConstantFolding::new(&symbols);
        pass.rewrite_expr(e)
    }

    #[test]
    fn integer_arithmetic_folds_with_bcpl_truth() {
        assert_eq!(
            fold_expr(Expression::binary(
                BinaryOperator::Add,
                Expression::Number(2),
                Expression::Number(3)
            )),
            Expression::Number(5)
        );
        assert_eq!(
            fold_expr(Expression::binary(
                BinaryOperator::Lt,
                Expression::Number(1),
                Expression::Number(2)
            )),
            Expression::Number(-1)
        );
    }

    #[test]
    fn division_by_zero_is_left_intact() {
        let e = Expression::binary(
            BinaryOperator::Div,
            Expression::Number(10),
            Expression::Number(0),
        );
        assert_eq!(fold_expr(e.clone()), e);
    }

    #[test]
    fn mixed_int_float_promotes() {
        assert_eq!(
            fold_expr(Expression::binary(
                BinaryOperator::Mul,
                Expression::Number(2),
                Expression::Float(1.5)
            )),
            Expression::Float(3.0)
        );
    }

    #[test]
    fn overflow_is_left_intact() {
        let e = Expression::binary(
            BinaryOperator::Mul,
            Expression::Number(i64::MAX),
            Expression::Number(2),
        );
        assert_eq!(fold_expr(e.clone()), e);
    }

    #[test]
    fn dead_branches_are_elided() {
        let symbols = SymbolTable::new();
        let mut pass = ConstantFolding::new(&symbols);
        let body = Statement::RoutineCall(Expression::call("F", vec![]));
        // IF true THEN S -> S
        let s = pass.rewrite_stmt(Statement::If {
            condition: Expression::Boolean(true),
            then_branch: Box::new(body.clone()),
        });
        assert_eq!(s, body);
        // IF false THEN S -> no-op
        let s = pass.rewrite_stmt(Statement::If {
            condition: Expression::Boolean(false),
            then_branch: Box::new(body.clone()),
        });
        assert_eq!(s, Statement::Compound(vec![]));
        // WHILE false -> no-op
        let s = pass.rewrite_stmt(Statement::While {
            condition: Expression::Boolean(false),
            body: Box::new(body.clone()),
        });
        assert_eq!(s, Statement::Compound(vec![]));
        // TEST collapses to the live arm
        let other = Statement::RoutineCall(Expression::call("G", vec![]));
        let s = pass.rewrite_stmt(Statement::Test {
            condition: Expression::Boolean(false),
            then_branch: Box::new(body),
            else_branch: Box::new(other.clone()),
        });
        assert_eq!(s, other);
    }

    #[test]
    fn local_constants_propagate_in_straight_line_code() {
        let symbols = SymbolTable::new();
        let mut pass = ConstantFolding::new(&symbols);
        let assign = pass.rewrite_stmt(Statement::Assignment {
            lhs: vec![Expression::variable("X")],
            rhs: vec![Expression::Number(7)],
        });
        let use_site = pass.rewrite_stmt(Statement::Assignment {
            lhs: vec![Expression::variable("Y")],
            rhs: vec![Expression::binary(
                BinaryOperator::Add,
                Expression::variable("X"),
                Expression::Number(1),
            )],
        });
        assert!(matches!(assign, Statement::Assignment { .. }));
        assert_eq!(
            use_site,
            Statement::Assignment {
                lhs: vec![Expression::variable("Y")],
                rhs: vec![Expression::Number(8)],
            }
        );
    }

    #[test]
    fn loop_entry_invalidates_the_constant_map() {
        let symbols = SymbolTable::new();
        let mut pass = ConstantFolding::new(&symbols);
        pass.rewrite_stmt(Statement::Assignment {
            lhs: vec![Expression::variable("X")],
            rhs: vec![Expression::Number(7)],
        });
        let lifted = pass.rewrite_stmt(Statement::While {
            condition: Expression::variable("C"),
            body: Box::new(Statement::Assignment {
                lhs: vec![Expression::variable("Y")],
                rhs: vec![Expression::variable("X")],
            }),
        });
        let Statement::While { body, .. } = lifted else {
            panic!()
        };
        assert_eq!(
            *body,
            Statement::Assignment {
                lhs: vec![Expression::variable("Y")],
                rhs: vec![Expression::variable("X")],
            }
        );
    }

    #[test]
    fn for_loop_caches_constant_bounds() {
        let symbols = SymbolTable::new();
        let mut pass = ConstantFolding::new(&symbols);
        let s = pass.rewrite_stmt(Statement::For {
            var: "I".into(),
            start: Expression::Number(1),
            end: Expression::Number(100),
            step: None,
            body: Box::new(Statement::Compound(vec![])),
            constants: ForConstants::default(),
        });
        let Statement::For { constants, .. } = s else {
            panic!()
        };
        assert_eq!(constants.end, Some(100));
        assert_eq!(constants.step, Some(1));
    }
}
