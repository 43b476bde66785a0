//! Loop-invariant code motion.
//!
//! For each loop, a variable-usage walk over the body computes the set of
//! variables the loop modifies. A pure arithmetic expression inside the body
//! whose free variables all lie outside that set is hoisted into a fresh
//! temporary declared in a synthesized preheader block. The temporary is
//! registered in the symbol table as it is created; if registration fails
//! the hoist is cancelled with a warning rather than corrupting the tree.

use core_ast::rewrite::{Rewrite, rewrite_expr_children, rewrite_stmt_children};
use core_ast::{visit, BinaryOperator, Declaration, Expression, Program, Statement, VarType};
use core_symbols::{Symbol, SymbolKind, SymbolTable};
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub struct LoopInvariantCodeMotion<'a> {
    symbols: &'a mut SymbolTable,
    current_function: String,
    next_temp: u32,
    pub hoisted: u64,
}

impl<'a> LoopInvariantCodeMotion<'a> {
    pub fn new(symbols: &'a mut SymbolTable) -> Self {
        LoopInvariantCodeMotion {
            symbols,
            current_function: String::new(),
            next_temp: 0,
            hoisted: 0,
        }
    }

    pub fn apply(mut self, program: Program) -> Program {
        let out = self.rewrite_program(program);
        if self.hoisted > 0 {
            debug!(target: "passes.licm", hoisted = self.hoisted, "loop_invariants_hoisted");
        }
        out
    }

    fn hoist_loop(&mut self, loop_stmt: Statement) -> Statement {
        let modified = modified_vars(&loop_stmt);
        let mut candidates = Vec::new();
        body_of(&loop_stmt, &mut |s| {
            visit::each_direct_expr(s, &mut |e| {
                collect_invariants(e, &modified, &mut candidates);
            });
        });
        candidates.dedup();
        if candidates.is_empty() {
            return loop_stmt;
        }

        let mut declarations = Vec::new();
        let mut replacements = Vec::new();
        for expr in candidates {
            let name = format!("_licm{}", self.next_temp);
            self.next_temp += 1;
            let mut sym = Symbol::new(&name, SymbolKind::LocalVar, VarType::ANY);
            sym.function_name = self.current_function.clone();
            if let Err(err) = self.symbols.declare(sym) {
                // Never corrupt the tree over a bookkeeping failure.
                warn!(target: "passes.licm", error = %err, "hoist_cancelled");
                continue;
            }
            declarations.push(Declaration::Let {
                names: vec![name.clone()],
                initializers: vec![expr.clone()],
                is_float: false,
                is_retained: false,
                explicit_type: None,
            });
            replacements.push((expr, name));
            self.hoisted += 1;
        }
        if declarations.is_empty() {
            return loop_stmt;
        }

        let mut rewritten = loop_stmt;
        replace_in_body(&mut rewritten, &replacements);
        Statement::Block {
            declarations,
            statements: vec![rewritten],
        }
    }
}

/// Variables the loop assigns, including induction variables.
fn modified_vars(loop_stmt: &Statement) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    visit::visit_stmt(loop_stmt, &mut |s| match s {
        Statement::Assignment { lhs, .. } => {
            for e in lhs {
                if let Expression::Variable(v) = e {
                    set.insert(v.name.clone());
                }
            }
        }
        Statement::For { var, .. } => {
            set.insert(var.clone());
        }
        Statement::ForEach {
            value_var, tag_var, ..
        } => {
            set.insert(value_var.clone());
            if let Some(t) = tag_var {
                set.insert(t.clone());
            }
        }
        Statement::Reduction { result_var, .. }
        | Statement::ReductionLoop { result_var, .. }
        | Statement::PairwiseReductionLoop { result_var, .. } => {
            set.insert(result_var.clone());
        }
        _ => {}
    });
    set
}

fn body_of(loop_stmt: &Statement, f: &mut dyn FnMut(&Statement)) {
    match loop_stmt {
        Statement::While { body, .. }
        | Statement::Until { body, .. }
        | Statement::Repeat { body, .. }
        | Statement::For { body, .. }
        | Statement::ForEach { body, .. } => visit::visit_stmt(body, f),
        _ => {}
    }
}

/// A hoist candidate: pure arithmetic (no calls, no memory), contains at
/// least one operator and one variable, and none of its variables are
/// modified by the loop.
fn collect_invariants(
    e: &Expression,
    modified: &BTreeSet<String>,
    out: &mut Vec<Expression>,
) {
    if is_invariant_candidate(e, modified) {
        if !out.contains(e) {
            out.push(e.clone());
        }
        return; // largest invariant subtree wins
    }
    match e {
        Expression::Binary { lhs, rhs, .. } => {
            collect_invariants(lhs, modified, out);
            collect_invariants(rhs, modified, out);
        }
        Expression::Unary { operand, .. } => collect_invariants(operand, modified, out),
        _ => {}
    }
}

fn is_invariant_candidate(e: &Expression, modified: &BTreeSet<String>) -> bool {
    let Expression::Binary { .. } = e else {
        return false;
    };
    let mut pure = true;
    let mut var_count = 0usize;
    visit::visit_expr(e, &mut |e| match e {
        Expression::Number(_)
        | Expression::Float(_)
        | Expression::CharLit(_)
        | Expression::Boolean(_) => {}
        Expression::Binary { op, .. } => {
            // Division can trap; hoisting it out of a possibly-zero-trip
            // loop would introduce the trap on a path that never ran it.
            if matches!(op, BinaryOperator::Div | BinaryOperator::Rem) {
                pure = false;
            }
        }
        Expression::Unary { .. } => {}
        Expression::Variable(v) => {
            var_count += 1;
            if modified.contains(&v.name) {
                pure = false;
            }
        }
        _ => pure = false, // calls, memory, allocation: not hoistable
    });
    pure && var_count > 0
}

fn replace_in_body(loop_stmt: &mut Statement, replacements: &[(Expression, String)]) {
    struct Replacer<'r> {
        replacements: &'r [(Expression, String)],
    }
    impl Rewrite for Replacer<'_> {
        fn rewrite_expr(&mut self, e: Expression) -> Expression {
            for (pattern, name) in self.replacements {
                if &e == pattern {
                    return Expression::variable(name.clone());
                }
            }
            rewrite_expr_children(self, e)
        }
    }
    let body = match loop_stmt {
        Statement::While { body, .. }
        | Statement::Until { body, .. }
        | Statement::Repeat { body, .. }
        | Statement::For { body, .. }
        | Statement::ForEach { body, .. } => body,
        _ => return,
    };
    let owned = std::mem::replace(body.as_mut(), Statement::Compound(vec![]));
    **body = Replacer { replacements }.rewrite_stmt(owned);
}

impl<'a> Rewrite for LoopInvariantCodeMotion<'a> {
    fn rewrite_decl(&mut self, d: Declaration) -> Option<Declaration> {
        match d {
            Declaration::Function { ref name, .. } | Declaration::Routine { ref name, .. } => {
                let saved = std::mem::replace(&mut self.current_function, name.clone());
                let out = core_ast::rewrite::rewrite_decl_children(self, d);
                self.current_function = saved;
                Some(out)
            }
            other => Some(core_ast::rewrite::rewrite_decl_children(self, other)),
        }
    }

    fn rewrite_stmt(&mut self, s: Statement) -> Statement {
        // Inner loops first so invariants bubble outward one level per pass.
        let s = rewrite_stmt_children(self, s);
        match s {
            s @ (Statement::While { .. }
            | Statement::Until { .. }
            | Statement::Repeat { .. }
            | Statement::For { .. }
            | Statement::ForEach { .. }) => self.hoist_loop(s),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_expression_moves_to_preheader() {
        // WHILE c DO s := s + (a * b)   with a, b unmodified
        let loop_stmt = Statement::While {
            condition: Expression::variable("c"),
            body: Box::new(Statement::Assignment {
                lhs: vec![Expression::variable("s")],
                rhs: vec![Expression::binary(
                    BinaryOperator::Add,
                    Expression::variable("s"),
                    Expression::binary(
                        BinaryOperator::Mul,
                        Expression::variable("a"),
                        Expression::variable("b"),
                    ),
                )],
            }),
        };
        let mut symbols = SymbolTable::new();
        symbols.enter_scope("F");
        let mut pass = LoopInvariantCodeMotion::new(&mut symbols);
        pass.current_function = "F".into();
        let out = pass.rewrite_stmt(loop_stmt);

        let Statement::Block {
            declarations,
            statements,
        } = out
        else {
            panic!("expected preheader block");
        };
        assert_eq!(declarations.len(), 1);
        let Declaration::Let { names, initializers, .. } = &declarations[0] else {
            panic!()
        };
        assert!(names[0].starts_with("_licm"));
        assert_eq!(
            initializers[0],
            Expression::binary(
                BinaryOperator::Mul,
                Expression::variable("a"),
                Expression::variable("b")
            )
        );
        // The loop body now reads the temporary.
        let Statement::While { body, .. } = &statements[0] else {
            panic!()
        };
        let Statement::Assignment { rhs, .. } = body.as_ref() else {
            panic!()
        };
        let Expression::Binary { rhs: inner, .. } = &rhs[0] else {
            panic!()
        };
        assert_eq!(**inner, Expression::variable(names[0].clone()));
    }

    #[test]
    fn expression_over_modified_variable_stays() {
        let loop_stmt = Statement::While {
            condition: Expression::variable("c"),
            body: Box::new(Statement::Assignment {
                lhs: vec![Expression::variable("s")],
                rhs: vec![Expression::binary(
                    BinaryOperator::Mul,
                    Expression::variable("s"),
                    Expression::Number(3),
                )],
            }),
        };
        let mut symbols = SymbolTable::new();
        let mut pass = LoopInvariantCodeMotion::new(&mut symbols);
        let out = pass.rewrite_stmt(loop_stmt.clone());
        assert_eq!(out, loop_stmt);
    }
}
