//! Method inlining for trivial accessors.
//!
//! `obj.getter()` becomes `obj.field` and `obj.setter(v)` becomes
//! `obj.field := v` when the analyzer marked the method trivial. Dispatch
//! cost for one-field accessors dwarfs the access itself, and the rewritten
//! member access then participates in later folding.

use core_analysis::{AnalysisInfo, TrivialAccessor};
use core_ast::rewrite::{Rewrite, rewrite_expr_children, rewrite_stmt_children};
use core_ast::{Declaration, Expression, Program, Statement};
use core_symbols::SymbolTable;
use tracing::debug;

pub struct MethodInlining<'a> {
    analysis: &'a AnalysisInfo,
    symbols: &'a SymbolTable,
    current_function: String,
    pub inlined: u64,
}

impl<'a> MethodInlining<'a> {
    pub fn new(analysis: &'a AnalysisInfo, symbols: &'a SymbolTable) -> Self {
        MethodInlining {
            analysis,
            symbols,
            current_function: String::new(),
            inlined: 0,
        }
    }

    pub fn apply(mut self, program: Program) -> Program {
        let out = self.rewrite_program(program);
        if self.inlined > 0 {
            debug!(target: "passes.inline", count = self.inlined, "trivial_accessors_inlined");
        }
        out
    }

    fn class_of(&self, object: &Expression) -> Option<String> {
        match object {
            Expression::New { class_name, .. } => Some(class_name.clone()),
            Expression::Variable(v) => self
                .symbols
                .lookup_in_function(&v.name, &self.current_function)
                .and_then(|s| s.class_name.clone()),
            _ => None,
        }
    }

    fn trivial_method(&self, object: &Expression, method: &str) -> Option<&TrivialAccessor> {
        let class = self.class_of(object)?;
        // The accessor may be defined anywhere up the parent chain.
        let mut cursor = self.analysis.classes.get(&class);
        while let Some(info) = cursor {
            let qualified = info
                .method(method)
                .map(|m| m.qualified_name.clone())
                .unwrap_or_else(|| format!("{}::{}", info.name, method));
            if let Some(metrics) = self.analysis.metrics_for(&qualified)
                && let Some(trivial) = &metrics.trivial
            {
                return Some(trivial);
            }
            cursor = self.analysis.classes.parent_of(&info.name);
        }
        None
    }
}

impl<'a> Rewrite for MethodInlining<'a> {
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
        let s = rewrite_stmt_children(self, s);
        // obj.setter(v)  ->  obj.field := v
        if let Statement::RoutineCall(Expression::Call { callee, args }) = &s
            && let Expression::MemberAccess { object, member } = callee.as_ref()
            && args.len() == 1
            && let Some(TrivialAccessor::Setter { member: field, .. }) =
                self.trivial_method(object, member)
        {
            let field = field.clone();
            self.inlined += 1;
            let Statement::RoutineCall(Expression::Call { callee, mut args }) = s else {
                unreachable!()
            };
            let Expression::MemberAccess { object, .. } = *callee else {
                unreachable!()
            };
            return Statement::Assignment {
                lhs: vec![Expression::MemberAccess {
                    object,
                    member: field,
                }],
                rhs: vec![args.remove(0)],
            };
        }
        s
    }

    fn rewrite_expr(&mut self, e: Expression) -> Expression {
        let e = rewrite_expr_children(self, e);
        // obj.getter()  ->  obj.field
        if let Expression::Call { callee, args } = &e
            && args.is_empty()
            && let Expression::MemberAccess { object, member } = callee.as_ref()
            && let Some(TrivialAccessor::Getter { member: field }) =
                self.trivial_method(object, member)
        {
            let field = field.clone();
            self.inlined += 1;
            let Expression::Call { callee, .. } = e else {
                unreachable!()
            };
            let Expression::MemberAccess { object, .. } = *callee else {
                unreachable!()
            };
            return Expression::MemberAccess {
                object,
                member: field,
            };
        }
        e
    }
}
