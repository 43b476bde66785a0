//! Symbol table construction.
//!
//! One walk over the tree declaring every name: globals, statics, functions
//! and their parameters, block locals, loop variables, class members and
//! methods. Heap-ownership and literal-content flags are stamped from the
//! initializer shapes so later phases (retain analysis, cleanup insertion,
//! the data generator) need no re-inspection. Duplicate declarations are
//! accumulated so one run reports every collision in the program.

use core_ast::{
    visit, ClassDeclaration, Declaration, Expression, Program, Statement, VarType,
};
use core_symbols::{ParameterInfo, Symbol, SymbolError, SymbolKind, SymbolTable};
use tracing::debug;

pub struct SymbolTableBuilder<'a> {
    table: &'a mut SymbolTable,
    errors: Vec<SymbolError>,
}

impl<'a> SymbolTableBuilder<'a> {
    pub fn build(program: &Program, table: &'a mut SymbolTable) -> Result<(), Vec<SymbolError>> {
        let mut builder = SymbolTableBuilder {
            table,
            errors: Vec::new(),
        };
        for decl in &program.declarations {
            builder.visit_top_decl(decl);
        }
        for stmt in &program.statements {
            builder.visit_stmt(stmt);
        }
        debug!(
            target: "passes.symbols",
            symbols = builder.table.len(),
            errors = builder.errors.len(),
            "symbol_table_built"
        );
        if builder.errors.is_empty() {
            Ok(())
        } else {
            Err(builder.errors)
        }
    }

    fn declare(&mut self, sym: Symbol) {
        if let Err(e) = self.table.declare(sym) {
            self.errors.push(e);
        }
    }

    fn visit_top_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::GlobalVariable {
                names,
                initializers,
                is_float,
            } => {
                for (name, init) in names.iter().zip(initializers) {
                    let mut sym = Symbol::new(
                        name,
                        SymbolKind::GlobalVar,
                        var_type_for(init, *is_float),
                    );
                    stamp_initializer_flags(&mut sym, init);
                    self.declare(sym);
                }
            }
            Declaration::Static { name, initializer } => {
                let mut sym =
                    Symbol::new(name, SymbolKind::StaticVar, var_type_for(initializer, false));
                stamp_initializer_flags(&mut sym, initializer);
                self.declare(sym);
            }
            Declaration::Global { slots } => {
                for (name, _slot) in slots {
                    self.declare(Symbol::new(name, SymbolKind::GlobalVar, VarType::INTEGER));
                }
            }
            Declaration::Manifest { name, value } => {
                // Normally consumed by manifest resolution; tolerated here
                // so the builder can run standalone in tests.
                let mut sym = Symbol::new(name, SymbolKind::Manifest, VarType::INTEGER);
                sym.location = core_symbols::SymbolLocation::Absolute(*value);
                self.declare(sym);
            }
            Declaration::Function {
                name,
                parameters,
                body,
                flags,
            } => {
                self.declare_function(name, parameters, flags.is_float, false, None);
                self.enter_function(name, parameters, None);
                self.visit_expr(body);
                self.table.exit_scope();
            }
            Declaration::Routine {
                name,
                parameters,
                body,
                ..
            } => {
                self.declare_function(name, parameters, false, true, None);
                self.enter_function(name, parameters, None);
                self.visit_stmt(body);
                self.table.exit_scope();
            }
            Declaration::Label { name, statement } => {
                let mut sym = Symbol::new(name, SymbolKind::Label, VarType::INTEGER);
                sym.location = core_symbols::SymbolLocation::Label;
                self.declare(sym);
                self.visit_stmt(statement);
            }
            Declaration::Class(class) => self.visit_class(class),
            Declaration::Let { .. } => {
                // Top-level LET arrives as GlobalVariable from the parser;
                // a bare Let at top level is treated the same way.
                if let Declaration::Let {
                    names,
                    initializers,
                    is_float,
                    ..
                } = decl
                {
                    for (name, init) in names.iter().zip(initializers) {
                        let mut sym = Symbol::new(
                            name,
                            SymbolKind::GlobalVar,
                            var_type_for(init, *is_float),
                        );
                        stamp_initializer_flags(&mut sym, init);
                        self.declare(sym);
                    }
                }
            }
        }
    }

    fn declare_function(
        &mut self,
        name: &str,
        parameters: &[String],
        is_float: bool,
        is_routine: bool,
        class_name: Option<&str>,
    ) {
        let kind = if is_routine {
            SymbolKind::Routine
        } else if is_float {
            SymbolKind::FloatFunction
        } else {
            SymbolKind::Function
        };
        let mut sym = Symbol::new(
            name,
            kind,
            if is_float {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            },
        );
        sym.class_name = class_name.map(Into::into);
        sym.location = core_symbols::SymbolLocation::Label;
        sym.parameters = parameters
            .iter()
            .map(|_| ParameterInfo {
                ty: VarType::UNKNOWN,
                is_optional: false,
            })
            .collect();
        self.declare(sym);
    }

    fn enter_function(&mut self, name: &str, parameters: &[String], class_name: Option<&str>) {
        self.table.enter_scope(name);
        for p in parameters {
            let mut sym = Symbol::new(p, SymbolKind::Parameter, VarType::UNKNOWN);
            sym.class_name = class_name.map(Into::into);
            self.declare(sym);
        }
    }

    fn visit_class(&mut self, class: &ClassDeclaration) {
        for member in &class.members {
            match &member.declaration {
                Declaration::Let {
                    names,
                    is_float,
                    explicit_type,
                    ..
                } => {
                    for n in names {
                        let ty = explicit_type.unwrap_or(if *is_float {
                            VarType::FLOAT
                        } else {
                            VarType::INTEGER
                        });
                        let mut sym = Symbol::new(n, SymbolKind::MemberVar, ty);
                        sym.class_name = Some(class.name.clone());
                        self.declare(sym);
                    }
                }
                Declaration::Function {
                    name,
                    parameters,
                    body,
                    flags,
                } => {
                    let qualified = format!("{}::{}", class.name, name);
                    self.declare_function(
                        &qualified,
                        parameters,
                        flags.is_float,
                        false,
                        Some(&class.name),
                    );
                    self.enter_function(&qualified, parameters, Some(&class.name));
                    self.visit_expr(body);
                    self.table.exit_scope();
                }
                Declaration::Routine {
                    name,
                    parameters,
                    body,
                    ..
                } => {
                    let qualified = format!("{}::{}", class.name, name);
                    self.declare_function(&qualified, parameters, false, true, Some(&class.name));
                    self.enter_function(&qualified, parameters, Some(&class.name));
                    self.visit_stmt(body);
                    self.table.exit_scope();
                }
                _ => {}
            }
        }
    }

    fn visit_block_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Let {
                names,
                initializers,
                is_float,
                is_retained,
                explicit_type,
            } => {
                for (name, init) in names.iter().zip(initializers) {
                    let ty =
                        explicit_type.unwrap_or_else(|| var_type_for(init, *is_float));
                    let mut sym = Symbol::new(name, SymbolKind::LocalVar, ty);
                    stamp_initializer_flags(&mut sym, init);
                    if *is_retained {
                        sym.owns_heap_memory = false;
                    }
                    self.declare(sym);
                    self.visit_expr(init);
                }
            }
            other => self.visit_top_decl(other),
        }
    }

    fn visit_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block {
                declarations,
                statements,
            } => {
                self.table.enter_scope("");
                for d in declarations {
                    self.visit_block_decl(d);
                }
                for s in statements {
                    self.visit_stmt(s);
                }
                self.table.exit_scope();
            }
            Statement::For { var, body, .. } => {
                self.table.enter_scope("");
                self.declare(Symbol::new(var, SymbolKind::LocalVar, VarType::INTEGER));
                self.visit_direct_exprs(stmt);
                self.visit_stmt(body);
                self.table.exit_scope();
            }
            Statement::ForEach {
                value_var,
                tag_var,
                body,
                element_filter,
                ..
            } => {
                self.table.enter_scope("");
                let ty = if element_filter.is_unknown() {
                    VarType::ANY
                } else {
                    *element_filter
                };
                self.declare(Symbol::new(value_var, SymbolKind::LocalVar, ty));
                if let Some(t) = tag_var {
                    self.declare(Symbol::new(t, SymbolKind::LocalVar, VarType::INTEGER));
                }
                self.visit_direct_exprs(stmt);
                self.visit_stmt(body);
                self.table.exit_scope();
            }
            Statement::StringDecl { name, size } => {
                let mut sym =
                    Symbol::new(name, SymbolKind::LocalVar, VarType::POINTER | VarType::STRING);
                sym.owns_heap_memory = true;
                if let Expression::Number(n) = size {
                    sym.size = Some(*n as u64);
                }
                self.declare(sym);
            }
            Statement::LabelTarget { name } => {
                let mut sym = Symbol::new(name, SymbolKind::Label, VarType::INTEGER);
                sym.location = core_symbols::SymbolLocation::Label;
                self.declare(sym);
            }
            other => {
                self.visit_direct_exprs(other);
                // Recurse into nested statements only (expressions already
                // handled above).
                match other {
                    Statement::If { then_branch, .. }
                    | Statement::Unless { then_branch, .. } => self.visit_stmt(then_branch),
                    Statement::Test {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        self.visit_stmt(then_branch);
                        self.visit_stmt(else_branch);
                    }
                    Statement::While { body, .. }
                    | Statement::Until { body, .. }
                    | Statement::Repeat { body, .. }
                    | Statement::Switchon { body, .. }
                    | Statement::Case { body, .. }
                    | Statement::Default { body } => self.visit_stmt(body),
                    Statement::Compound(stmts) => {
                        for s in stmts {
                            self.visit_stmt(s);
                        }
                    }
                    Statement::Defer(inner) => self.visit_stmt(inner),
                    _ => {}
                }
            }
        }
    }

    fn visit_direct_exprs(&mut self, stmt: &Statement) {
        visit::each_direct_expr(stmt, &mut |e| self.visit_expr_inner(e));
    }

    fn visit_expr(&mut self, e: &Expression) {
        self.visit_expr_inner(e);
    }

    fn visit_expr_inner(&mut self, e: &Expression) {
        match e {
            // VALOF bodies open statement context inside expressions.
            Expression::Valof { body } | Expression::FloatValof { body } => {
                self.visit_stmt(body)
            }
            Expression::New {
                binding: Some(name),
                class_name,
                args,
                ..
            } => {
                let mut sym = Symbol::new(name, SymbolKind::LocalVar, VarType::POINTER_TO_OBJECT);
                sym.class_name = Some(class_name.clone());
                sym.owns_heap_memory = true;
                self.declare(sym);
                for a in args {
                    self.visit_expr_inner(a);
                }
            }
            other => visit::each_child_expr(other, &mut |c| self.visit_expr_inner(c)),
        }
    }
}

fn var_type_for(init: &Expression, is_float: bool) -> VarType {
    match init {
        Expression::Float(_) => VarType::FLOAT,
        Expression::VecAllocation { .. } => VarType::POINTER_TO_INT_VEC,
        Expression::FVecAllocation { .. } => VarType::POINTER_TO_FLOAT_VEC,
        Expression::PairsAllocation { .. } => VarType::POINTER | VarType::PAIRS,
        Expression::FPairsAllocation { .. } => VarType::POINTER | VarType::FPAIRS,
        Expression::StringAllocation { .. } | Expression::StringLit(_) => {
            VarType::POINTER | VarType::STRING
        }
        Expression::Table { is_float: true, .. } => VarType::POINTER_TO_FLOAT_VEC,
        Expression::Table { is_float: false, .. } => VarType::POINTER_TO_INT_VEC,
        Expression::List { .. } => VarType::POINTER | VarType::LIST,
        Expression::New { .. } => VarType::POINTER_TO_OBJECT,
        Expression::PackedConstruct { shape, .. } => shape.value_type(),
        _ if is_float => VarType::FLOAT,
        _ => VarType::INTEGER,
    }
}

/// Stamp ownership/literal flags and static sizes from an initializer.
fn stamp_initializer_flags(sym: &mut Symbol, init: &Expression) {
    match init {
        Expression::VecAllocation { size }
        | Expression::FVecAllocation { size }
        | Expression::PairsAllocation { size }
        | Expression::FPairsAllocation { size }
        | Expression::StringAllocation { size } => {
            sym.owns_heap_memory = true;
            if let Expression::Number(n) = size.as_ref() {
                sym.size = Some(*n as u64);
            }
        }
        Expression::Call { callee, .. } => {
            if let Expression::Variable(v) = callee.as_ref()
                && matches!(v.name.as_str(), "GETVEC" | "FGETVEC" | "SPLIT" | "BCPL_ALLOC")
            {
                sym.owns_heap_memory = true;
            }
        }
        Expression::New { .. } | Expression::List { .. } => sym.owns_heap_memory = true,
        Expression::StringLit(_) | Expression::Table { .. } | Expression::VecInitializer { .. } => {
            sym.contains_literals = true;
            if let Expression::Table { entries, .. }
            | Expression::VecInitializer { entries, .. } = init
            {
                sym.size = Some(entries.len() as u64);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::FunctionFlags;

    #[test]
    fn vector_let_records_size_and_ownership() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::Block {
                declarations: vec![Declaration::Let {
                    names: vec!["V".into()],
                    initializers: vec![Expression::VecAllocation {
                        size: Box::new(Expression::Number(8)),
                    }],
                    is_float: false,
                    is_retained: false,
                    explicit_type: None,
                }],
                statements: vec![],
            },
            flags: FunctionFlags::default(),
        });
        let mut table = SymbolTable::new();
        SymbolTableBuilder::build(&p, &mut table).unwrap();
        let v = table.lookup_in_function("V", "START").unwrap();
        assert_eq!(v.size, Some(8));
        assert!(v.owns_heap_memory);
        assert_eq!(v.ty, VarType::POINTER_TO_INT_VEC);
    }

    #[test]
    fn duplicate_declarations_are_accumulated() {
        let mut p = Program::new();
        p.declarations.push(Declaration::GlobalVariable {
            names: vec!["A".into(), "A".into(), "B".into(), "B".into()],
            initializers: vec![
                Expression::Number(0),
                Expression::Number(0),
                Expression::Number(0),
                Expression::Number(0),
            ],
            is_float: false,
        });
        let mut table = SymbolTable::new();
        let errs = SymbolTableBuilder::build(&p, &mut table).unwrap_err();
        assert_eq!(errs.len(), 2, "one error per duplicate, all reported");
    }

    #[test]
    fn parameters_and_temps_live_in_function_scope() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Function {
            name: "F".into(),
            parameters: vec!["N".into()],
            body: Expression::variable("N"),
            flags: FunctionFlags::default(),
        });
        let mut table = SymbolTable::new();
        SymbolTableBuilder::build(&p, &mut table).unwrap();
        assert_eq!(
            table.lookup_in_function("N", "F").unwrap().kind,
            SymbolKind::Parameter
        );
        assert_eq!(
            table
                .function_symbols("F")
                .filter(|s| s.name.starts_with("_temp"))
                .count(),
            core_symbols::FUNCTION_TEMP_COUNT
        );
    }
}
