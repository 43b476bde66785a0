//! Per-block liveness and call-interval detection.
//!
//! `use`/`def` are computed per block from the statements the CFG builder
//! placed there (structured statements contribute only their header
//! expressions; their bodies live in other blocks). The dataflow fixpoint is
//! the classic backward formulation:
//!
//! ```text
//! live_out(b) = U live_in(s)  over successors s
//! live_in(b)  = use(b) | (live_out(b) \ def(b))
//! ```
//!
//! Call-interval detection marks every variable referenced after (or across)
//! a call inside the block; the register manager biases those variables
//! toward callee-saved registers so they survive the call.

use crate::cfg::Cfg;
use core_ast::{Expression, RepeatMode, Statement, visit};
use core_symbols::SymbolTable;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

pub type VarSet = BTreeSet<String>;

#[derive(Debug, Default, Clone)]
pub struct BlockLiveness {
    pub use_set: VarSet,
    pub def_set: VarSet,
    pub live_in: VarSet,
    pub live_out: VarSet,
    pub vars_used_across_calls: VarSet,
}

#[derive(Debug, Default)]
pub struct LivenessAnalysis {
    pub blocks: HashMap<String, BlockLiveness>,
}

impl LivenessAnalysis {
    pub fn run(cfg: &Cfg<'_>, symbols: &SymbolTable) -> LivenessAnalysis {
        let mut analysis = LivenessAnalysis::default();
        for block in &cfg.blocks {
            let mut lv = analyze_block(block.statements.as_slice(), &cfg.function, symbols);
            // Variables live across a call must reach the allocator via the
            // use set even if the block also defines them.
            lv.use_set.extend(lv.vars_used_across_calls.iter().cloned());
            analysis.blocks.insert(block.id.clone(), lv);
        }

        // Backward dataflow to a fixpoint.
        let mut changed = true;
        while changed {
            changed = false;
            for block in cfg.blocks.iter().rev() {
                let mut out = VarSet::new();
                for succ in &block.successors {
                    if let Some(s) = analysis.blocks.get(succ) {
                        out.extend(s.live_in.iter().cloned());
                    }
                }
                let entry = analysis.blocks.get_mut(&block.id).expect("block exists");
                let mut inn = entry.use_set.clone();
                for v in &out {
                    if !entry.def_set.contains(v) {
                        inn.insert(v.clone());
                    }
                }
                if out != entry.live_out || inn != entry.live_in {
                    entry.live_out = out;
                    entry.live_in = inn;
                    changed = true;
                }
            }
        }

        for (id, lv) in &analysis.blocks {
            if !lv.vars_used_across_calls.is_empty() {
                trace!(
                    target: "analysis.liveness",
                    block = %id,
                    vars = ?lv.vars_used_across_calls,
                    "call_interval"
                );
            }
        }
        analysis
    }

    /// Union of `vars_used_across_calls` over every block of the function.
    pub fn callee_saved_candidates(&self) -> VarSet {
        let mut set = VarSet::new();
        for lv in self.blocks.values() {
            set.extend(lv.vars_used_across_calls.iter().cloned());
        }
        set
    }
}

fn analyze_block(statements: &[&Statement], function: &str, symbols: &SymbolTable) -> BlockLiveness {
    let mut lv = BlockLiveness::default();

    // Reverse scan: anything used after a call is live across it. A single
    // statement can embed a call interval too (`N * F(N - 1)`).
    let mut found_call = false;
    for stmt in statements.iter().rev() {
        let uses = stmt_uses(stmt, function, symbols);
        if stmt_contains_call(stmt) {
            let mut across = VarSet::new();
            each_stmt_value_expr(stmt, &mut |e| {
                collect_vars_across_calls(e, function, symbols, &mut across)
            });
            lv.vars_used_across_calls.extend(across);
        }
        if found_call {
            lv.vars_used_across_calls.extend(uses.iter().cloned());
        }
        if stmt_contains_call(stmt) {
            found_call = true;
        }
    }

    // Forward pass for use/def.
    for stmt in statements {
        lv.use_set
            .extend(stmt_uses(stmt, function, symbols).into_iter());
        lv.def_set
            .extend(stmt_defs(stmt, function, symbols).into_iter());
    }
    lv
}

fn is_variable(name: &str, function: &str, symbols: &SymbolTable) -> bool {
    symbols
        .lookup_in_function(name, function)
        .map(|s| s.is_variable())
        .unwrap_or(false)
}

fn collect_uses(e: &Expression, function: &str, symbols: &SymbolTable, out: &mut VarSet) {
    visit::visit_expr(e, &mut |e| {
        if let Expression::Variable(v) = e
            && is_variable(&v.name, function, symbols)
        {
            out.insert(v.name.clone());
        }
    });
}

/// Expressions whose values a statement consumes (assignment left-hand
/// variables are defs, but index and base computations on the left are
/// still uses).
fn each_stmt_value_expr(s: &Statement, f: &mut dyn FnMut(&Expression)) {
    match s {
        Statement::Assignment { lhs, rhs } => {
            for e in rhs {
                f(e);
            }
            for e in lhs {
                match e {
                    Expression::Variable(_) => {}
                    Expression::VectorAccess { base, index }
                    | Expression::CharIndirection { base, index }
                    | Expression::FloatVectorIndirection { base, index } => {
                        f(base);
                        f(index);
                    }
                    other => f(other),
                }
            }
        }
        other => visit::each_direct_expr(other, f),
    }
}

fn stmt_uses(s: &Statement, function: &str, symbols: &SymbolTable) -> VarSet {
    let mut out = VarSet::new();
    each_stmt_value_expr(s, &mut |e| collect_uses(e, function, symbols, &mut out));
    match s {
        // Loop induction variables count as both use and def.
        Statement::For { var, .. } => {
            if is_variable(var, function, symbols) {
                out.insert(var.clone());
            }
        }
        Statement::ReductionLoop { vector_name, .. } => {
            if is_variable(vector_name, function, symbols) {
                out.insert(vector_name.clone());
            }
        }
        Statement::PairwiseReductionLoop {
            vector_a, vector_b, ..
        } => {
            for v in [vector_a, vector_b] {
                if is_variable(v, function, symbols) {
                    out.insert(v.clone());
                }
            }
        }
        _ => {}
    }
    out
}

fn stmt_defs(s: &Statement, function: &str, symbols: &SymbolTable) -> VarSet {
    let mut out = VarSet::new();
    match s {
        Statement::Assignment { lhs, .. } => {
            for e in lhs {
                if let Expression::Variable(v) = e
                    && is_variable(&v.name, function, symbols)
                {
                    out.insert(v.name.clone());
                }
            }
        }
        Statement::For { var, .. } => {
            out.insert(var.clone());
        }
        Statement::ForEach {
            value_var, tag_var, ..
        } => {
            out.insert(value_var.clone());
            if let Some(t) = tag_var {
                out.insert(t.clone());
            }
        }
        Statement::Reduction { result_var, .. }
        | Statement::ReductionLoop { result_var, .. }
        | Statement::PairwiseReductionLoop { result_var, .. } => {
            out.insert(result_var.clone());
        }
        Statement::Block { declarations, .. } => {
            for d in declarations {
                if let core_ast::Declaration::Let { names, .. } = d {
                    out.extend(names.iter().cloned());
                }
            }
        }
        _ => {}
    }
    out
}

fn expr_contains_call(e: &Expression) -> bool {
    let mut found = false;
    visit::visit_expr(e, &mut |e| {
        if matches!(
            e,
            Expression::Call { .. }
                | Expression::SysCall { .. }
                | Expression::New { .. }
                | Expression::SuperMethodCall { .. }
        ) {
            found = true;
        }
    });
    found
}

fn stmt_contains_call(s: &Statement) -> bool {
    let mut found = matches!(s, Statement::RoutineCall(_));
    each_stmt_value_expr(s, &mut |e| {
        if expr_contains_call(e) {
            found = true;
        }
    });
    found
}

/// Intra-expression call intervals: in a binary operation where one side
/// contains a call, the variables the other side reads are live across that
/// call. Recurses so nested shapes like `(N * F(N-1)) + M` mark both N and M.
fn collect_vars_across_calls(
    e: &Expression,
    function: &str,
    symbols: &SymbolTable,
    out: &mut VarSet,
) {
    match e {
        Expression::Binary { lhs, rhs, .. } => {
            if expr_contains_call(rhs) {
                collect_uses(lhs, function, symbols, out);
            }
            if expr_contains_call(lhs) {
                collect_uses(rhs, function, symbols, out);
            }
            collect_vars_across_calls(lhs, function, symbols, out);
            collect_vars_across_calls(rhs, function, symbols, out);
        }
        Expression::Unary { operand, .. } => {
            collect_vars_across_calls(operand, function, symbols, out)
        }
        Expression::Call { args, .. } | Expression::SuperMethodCall { args, .. } => {
            for a in args {
                collect_vars_across_calls(a, function, symbols, out);
            }
        }
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            for part in [condition, then_expr, else_expr] {
                collect_vars_across_calls(part, function, symbols, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::BinaryOperator;
    use core_symbols::{Symbol, SymbolKind};
    use core_ast::VarType;

    fn table_with(function: &str, vars: &[&str]) -> SymbolTable {
        let mut t = SymbolTable::new();
        t.enter_scope(function);
        for v in vars {
            t.declare(Symbol::new(*v, SymbolKind::LocalVar, VarType::INTEGER))
                .unwrap();
        }
        t
    }

    #[test]
    fn factorial_argument_is_live_across_recursive_call() {
        // RESULTIS N * F(N - 1)
        let body = Statement::Resultis {
            value: Expression::binary(
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
            ),
            from_send: false,
        };
        let symbols = table_with("F", &["N"]);
        let cfg = Cfg::build("F", &body);
        let lv = LivenessAnalysis::run(&cfg, &symbols);
        assert!(lv.callee_saved_candidates().contains("N"));
    }

    #[test]
    fn fixpoint_is_monotone_on_converged_graph() {
        let body = Statement::While {
            condition: Expression::variable("C"),
            body: Box::new(Statement::Assignment {
                lhs: vec![Expression::variable("S")],
                rhs: vec![Expression::binary(
                    BinaryOperator::Add,
                    Expression::variable("S"),
                    Expression::Number(1),
                )],
            }),
        };
        let symbols = table_with("G", &["C", "S"]);
        let cfg = Cfg::build("G", &body);
        let first = LivenessAnalysis::run(&cfg, &symbols);
        let second = LivenessAnalysis::run(&cfg, &symbols);
        for (id, lv) in &first.blocks {
            let other = &second.blocks[id];
            assert_eq!(lv.live_in, other.live_in, "block {id}");
            assert_eq!(lv.live_out, other.live_out, "block {id}");
        }
    }

    #[test]
    fn use_after_call_in_block_is_marked() {
        let body = Statement::Compound(vec![
            Statement::RoutineCall(Expression::call("WRITES", vec![Expression::Number(0)])),
            Statement::Assignment {
                lhs: vec![Expression::variable("X")],
                rhs: vec![Expression::variable("Y")],
            },
        ]);
        let symbols = table_with("H", &["X", "Y"]);
        let cfg = Cfg::build("H", &body);
        let lv = LivenessAnalysis::run(&cfg, &symbols);
        assert!(lv.callee_saved_candidates().contains("Y"));
    }
}
