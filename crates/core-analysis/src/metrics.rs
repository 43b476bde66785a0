//! Per-function metrics gathered in one AST traversal.
//!
//! Records what the later phases need without re-walking the tree: call-site
//! counts (inlining heuristics), recursion and leaf-function status (frame
//! layout), inferred return types, trivial accessor/setter detection
//! (method inlining), and parameter type refinements from literal call
//! arguments.

use crate::classes::{ClassTable, ClassTableError};
use crate::infer::{InferCtx, infer_expr_type};
use core_ast::{
    Declaration, Expression, Program, Statement, VarType, visit,
};
use core_symbols::SymbolTable;
use std::collections::HashMap;
use tracing::debug;

/// A method the inliner may rewrite at call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrivialAccessor {
    Getter { member: String },
    Setter { member: String, parameter: String },
}

#[derive(Debug, Clone, Default)]
pub struct FunctionMetrics {
    pub call_site_count: u32,
    pub is_recursive: bool,
    /// False means leaf function: LR/FP save can be skipped.
    pub has_calls: bool,
    pub return_type: VarType,
    pub trivial: Option<TrivialAccessor>,
    /// Parameter types refined from literal arguments at call sites.
    pub parameter_types: HashMap<String, VarType>,
}

#[derive(Debug, Default)]
pub struct AnalysisInfo {
    pub metrics: HashMap<String, FunctionMetrics>,
    pub classes: ClassTable,
}

impl AnalysisInfo {
    pub fn metrics_for(&self, function: &str) -> Option<&FunctionMetrics> {
        self.metrics.get(function)
    }

    pub fn is_leaf(&self, function: &str) -> bool {
        self.metrics
            .get(function)
            .map(|m| !m.has_calls)
            .unwrap_or(false)
    }
}

pub struct Analyzer;

impl Analyzer {
    pub fn analyze(
        program: &Program,
        symbols: &SymbolTable,
    ) -> Result<AnalysisInfo, ClassTableError> {
        let classes = ClassTable::build(program)?;
        let mut metrics: HashMap<String, FunctionMetrics> = HashMap::new();

        for decl in &program.declarations {
            match decl {
                Declaration::Function {
                    name,
                    parameters,
                    body,
                    flags,
                } => {
                    let entry = metrics.entry(name.clone()).or_default();
                    entry.return_type = if flags.is_float {
                        VarType::FLOAT
                    } else {
                        VarType::INTEGER
                    };
                    Self::scan_body_exprs(name, body, &mut metrics);
                    let _ = parameters;
                }
                Declaration::Routine { name, body, .. } => {
                    Self::scan_routine(name, body, &mut metrics);
                }
                Declaration::Class(c) => {
                    for member in &c.members {
                        match &member.declaration {
                            Declaration::Function { name, body, flags, .. } => {
                                let qualified = format!("{}::{}", c.name, name);
                                let entry = metrics.entry(qualified.clone()).or_default();
                                entry.return_type = if flags.is_float {
                                    VarType::FLOAT
                                } else {
                                    VarType::INTEGER
                                };
                                entry.trivial =
                                    detect_trivial_getter_in(&c.name, body, &classes);
                                Self::scan_body_exprs(&qualified, body, &mut metrics);
                            }
                            Declaration::Routine {
                                name,
                                parameters,
                                body,
                                ..
                            } => {
                                let qualified = format!("{}::{}", c.name, name);
                                metrics.entry(qualified.clone()).or_default().trivial =
                                    detect_trivial_setter_in(&c.name, parameters, body, &classes);
                                Self::scan_routine(&qualified, body, &mut metrics);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Self::refine_parameter_types(program, symbols, &classes, &mut metrics);

        debug!(
            target: "analysis",
            functions = metrics.len(),
            classes = classes.iter().count(),
            "analysis_complete"
        );
        Ok(AnalysisInfo { metrics, classes })
    }

    fn scan_body_exprs(
        current: &str,
        body: &Expression,
        metrics: &mut HashMap<String, FunctionMetrics>,
    ) {
        visit::visit_expr(body, &mut |e| Self::note_expr(current, e, metrics));
    }

    fn scan_routine(
        current: &str,
        body: &Statement,
        metrics: &mut HashMap<String, FunctionMetrics>,
    ) {
        visit::visit_stmt_exprs(body, &mut |e| Self::note_expr(current, e, metrics));
    }

    fn note_expr(current: &str, e: &Expression, metrics: &mut HashMap<String, FunctionMetrics>) {
        match e {
            Expression::Call { callee, .. } => {
                metrics.entry(current.to_string()).or_default().has_calls = true;
                if let Expression::Variable(v) = callee.as_ref() {
                    let target = metrics.entry(v.name.clone()).or_default();
                    target.call_site_count += 1;
                    if v.name == current {
                        target.is_recursive = true;
                    }
                }
            }
            Expression::SuperMethodCall { .. }
            | Expression::New { .. }
            | Expression::SysCall { .. } => {
                metrics.entry(current.to_string()).or_default().has_calls = true;
            }
            _ => {}
        }
    }

    /// Walk call sites once more; when every call passes a literal of one
    /// type for a parameter, record the refinement.
    fn refine_parameter_types(
        program: &Program,
        symbols: &SymbolTable,
        classes: &ClassTable,
        metrics: &mut HashMap<String, FunctionMetrics>,
    ) {
        let params_of: HashMap<String, Vec<String>> = program
            .declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Function {
                    name, parameters, ..
                }
                | Declaration::Routine {
                    name, parameters, ..
                } => Some((name.clone(), parameters.clone())),
                _ => None,
            })
            .collect();

        let mut observed: HashMap<(String, String), VarType> = HashMap::new();
        let mut record = |e: &Expression| {
            if let Expression::Call { callee, args } = e
                && let Expression::Variable(v) = callee.as_ref()
                && let Some(params) = params_of.get(&v.name)
            {
                let ctx = InferCtx {
                    symbols,
                    classes,
                    function: "",
                };
                for (param, arg) in params.iter().zip(args) {
                    let ty = infer_expr_type(arg, &ctx);
                    let key = (v.name.clone(), param.clone());
                    observed
                        .entry(key)
                        .and_modify(|t| {
                            if *t != ty {
                                *t = VarType::ANY; // conflicting evidence
                            }
                        })
                        .or_insert(ty);
                }
            }
        };
        for d in &program.declarations {
            visit::each_decl_expr(d, &mut |e| visit::visit_expr(e, &mut record));
            if let Declaration::Routine { body, .. } = d {
                visit::visit_stmt_exprs(body, &mut record);
            }
        }
        for s in &program.statements {
            visit::visit_stmt_exprs(s, &mut record);
        }

        for ((func, param), ty) in observed {
            if ty != VarType::ANY && !ty.is_unknown() {
                metrics
                    .entry(func)
                    .or_default()
                    .parameter_types
                    .insert(param, ty);
            }
        }
    }
}

/// A trivial getter is a method whose whole body is a single member read.
fn detect_trivial_getter_in(
    class: &str,
    body: &Expression,
    classes: &ClassTable,
) -> Option<TrivialAccessor> {
    let info = classes.get(class)?;
    match body {
        Expression::Variable(v) if info.member(&v.name).is_some() => {
            Some(TrivialAccessor::Getter {
                member: v.name.clone(),
            })
        }
        _ => None,
    }
}

/// A trivial setter is a one-parameter method whose whole body assigns that
/// parameter to a single member.
fn detect_trivial_setter_in(
    class: &str,
    parameters: &[String],
    body: &Statement,
    classes: &ClassTable,
) -> Option<TrivialAccessor> {
    let info = classes.get(class)?;
    if parameters.len() != 1 {
        return None;
    }
    single_assignment(body).and_then(|(lhs, rhs)| match (lhs, rhs) {
        (Expression::Variable(member), Expression::Variable(value))
            if value.name == parameters[0] && info.member(&member.name).is_some() =>
        {
            Some(TrivialAccessor::Setter {
                member: member.name.clone(),
                parameter: value.name.clone(),
            })
        }
        _ => None,
    })
}

fn single_assignment(body: &Statement) -> Option<(&Expression, &Expression)> {
    match body {
        Statement::Assignment { lhs, rhs } if lhs.len() == 1 && rhs.len() == 1 => {
            Some((&lhs[0], &rhs[0]))
        }
        Statement::Compound(stmts) if stmts.len() == 1 => single_assignment(&stmts[0]),
        Statement::Block {
            declarations,
            statements,
        } if declarations.is_empty() && statements.len() == 1 => {
            single_assignment(&statements[0])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::{BinaryOperator, FunctionFlags};

    fn factorial_program() -> Program {
        // LET F(N) = N EQ 0 -> 1, N * F(N - 1)
        let body = Expression::Conditional {
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
        };
        let mut p = Program::new();
        p.declarations.push(Declaration::Function {
            name: "F".into(),
            parameters: vec!["N".into()],
            body,
            flags: FunctionFlags::default(),
        });
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::RoutineCall(Expression::call(
                "F",
                vec![Expression::Number(10)],
            )),
            flags: FunctionFlags::default(),
        });
        p
    }

    #[test]
    fn recursion_and_call_counts() {
        let p = factorial_program();
        let symbols = SymbolTable::new();
        let info = Analyzer::analyze(&p, &symbols).unwrap();
        let f = info.metrics_for("F").unwrap();
        assert!(f.is_recursive);
        assert!(f.has_calls);
        assert_eq!(f.call_site_count, 2); // recursive site + START site
        assert!(!info.is_leaf("START"));
    }

    #[test]
    fn literal_arguments_refine_parameter_types() {
        let p = factorial_program();
        let symbols = SymbolTable::new();
        let info = Analyzer::analyze(&p, &symbols).unwrap();
        let f = info.metrics_for("F").unwrap();
        assert_eq!(f.parameter_types.get("N"), Some(&VarType::INTEGER));
    }
}
