//! Structural pretty-printer.
//!
//! Produces a stable s-expression rendering of the tree. Used for trace
//! dumps and as the serializer in the clone-identity property: two trees are
//! structurally equal iff their printed forms are equal.

use crate::Program;
use crate::decl::Declaration;
use crate::expr::Expression;
use crate::stmt::{RepeatMode, Statement};
use std::fmt::Write;

pub fn print_program(p: &Program) -> String {
    let mut out = String::new();
    out.push_str("(program");
    for d in &p.declarations {
        out.push(' ');
        print_decl(d, &mut out);
    }
    for s in &p.statements {
        out.push(' ');
        print_stmt(s, &mut out);
    }
    out.push(')');
    out
}

pub fn print_decl(d: &Declaration, out: &mut String) {
    match d {
        Declaration::Let {
            names,
            initializers,
            is_float,
            is_retained,
            ..
        } => {
            let _ = write!(out, "(let{}{}", flag(*is_float, " float"), flag(*is_retained, " retained"));
            for (n, e) in names.iter().zip(initializers) {
                let _ = write!(out, " ({n} ");
                print_expr(e, out);
                out.push(')');
            }
            out.push(')');
        }
        Declaration::Manifest { name, value } => {
            let _ = write!(out, "(manifest {name} {value})");
        }
        Declaration::Static { name, initializer } => {
            let _ = write!(out, "(static {name} ");
            print_expr(initializer, out);
            out.push(')');
        }
        Declaration::Global { slots } => {
            out.push_str("(global");
            for (n, slot) in slots {
                let _ = write!(out, " ({n} {slot})");
            }
            out.push(')');
        }
        Declaration::GlobalVariable {
            names,
            initializers,
            is_float,
        } => {
            let _ = write!(out, "(gvar{}", flag(*is_float, " float"));
            for (n, e) in names.iter().zip(initializers) {
                let _ = write!(out, " ({n} ");
                print_expr(e, out);
                out.push(')');
            }
            out.push(')');
        }
        Declaration::Function {
            name,
            parameters,
            body,
            flags,
        } => {
            let _ = write!(
                out,
                "(fn {name} ({}){}{}{} ",
                parameters.join(" "),
                flag(flags.is_virtual, " virtual"),
                flag(flags.is_final, " final"),
                flag(flags.is_float, " float"),
            );
            print_expr(body, out);
            out.push(')');
        }
        Declaration::Routine {
            name,
            parameters,
            body,
            flags,
        } => {
            let _ = write!(
                out,
                "(routine {name} ({}){}{} ",
                parameters.join(" "),
                flag(flags.is_virtual, " virtual"),
                flag(flags.is_final, " final"),
            );
            print_stmt(body, out);
            out.push(')');
        }
        Declaration::Label { name, statement } => {
            let _ = write!(out, "(label {name} ");
            print_stmt(statement, out);
            out.push(')');
        }
        Declaration::Class(c) => {
            let _ = write!(out, "(class {name}", name = c.name);
            if let Some(p) = &c.parent {
                let _ = write!(out, " :parent {p}");
            }
            for m in &c.members {
                let _ = write!(out, " ({:?} ", m.visibility);
                print_decl(&m.declaration, out);
                out.push(')');
            }
            out.push(')');
        }
    }
}

pub fn print_stmt(s: &Statement, out: &mut String) {
    match s {
        Statement::Assignment { lhs, rhs } => {
            out.push_str("(:=");
            for e in lhs {
                out.push(' ');
                print_expr(e, out);
            }
            out.push_str(" <-");
            for e in rhs {
                out.push(' ');
                print_expr(e, out);
            }
            out.push(')');
        }
        Statement::RoutineCall(e) => {
            out.push_str("(call-stmt ");
            print_expr(e, out);
            out.push(')');
        }
        Statement::If {
            condition,
            then_branch,
        } => {
            out.push_str("(if ");
            print_expr(condition, out);
            out.push(' ');
            print_stmt(then_branch, out);
            out.push(')');
        }
        Statement::Unless {
            condition,
            then_branch,
        } => {
            out.push_str("(unless ");
            print_expr(condition, out);
            out.push(' ');
            print_stmt(then_branch, out);
            out.push(')');
        }
        Statement::Test {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push_str("(test ");
            print_expr(condition, out);
            out.push(' ');
            print_stmt(then_branch, out);
            out.push(' ');
            print_stmt(else_branch, out);
            out.push(')');
        }
        Statement::While { condition, body } => {
            out.push_str("(while ");
            print_expr(condition, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Until { condition, body } => {
            out.push_str("(until ");
            print_expr(condition, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Repeat { body, mode } => {
            out.push_str("(repeat ");
            print_stmt(body, out);
            match mode {
                RepeatMode::Forever => {}
                RepeatMode::While(c) => {
                    out.push_str(" :while ");
                    print_expr(c, out);
                }
                RepeatMode::Until(c) => {
                    out.push_str(" :until ");
                    print_expr(c, out);
                }
            }
            out.push(')');
        }
        Statement::For {
            var,
            start,
            end,
            step,
            body,
            constants,
        } => {
            let _ = write!(out, "(for {var} ");
            print_expr(start, out);
            out.push(' ');
            print_expr(end, out);
            if let Some(st) = step {
                out.push_str(" :step ");
                print_expr(st, out);
            }
            if let Some(e) = constants.end {
                let _ = write!(out, " :const-end {e}");
            }
            if let Some(st) = constants.step {
                let _ = write!(out, " :const-step {st}");
            }
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::ForEach {
            value_var,
            tag_var,
            collection,
            body,
            element_filter,
        } => {
            let _ = write!(out, "(foreach {value_var}");
            if let Some(t) = tag_var {
                let _ = write!(out, " {t}");
            }
            let _ = write!(out, " :filter {} ", element_filter.display_name());
            print_expr(collection, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Switchon { subject, body } => {
            out.push_str("(switchon ");
            print_expr(subject, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Case {
            constant,
            resolved_value,
            body,
        } => {
            out.push_str("(case ");
            print_expr(constant, out);
            if let Some(v) = resolved_value {
                let _ = write!(out, " :resolved {v}");
            }
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Default { body } => {
            out.push_str("(default ");
            print_stmt(body, out);
            out.push(')');
        }
        Statement::Goto(e) => {
            out.push_str("(goto ");
            print_expr(e, out);
            out.push(')');
        }
        Statement::Return => out.push_str("(return)"),
        Statement::Finish { syscall, args } => {
            out.push_str("(finish");
            if let Some(n) = syscall {
                out.push(' ');
                print_expr(n, out);
            }
            for a in args {
                out.push(' ');
                print_expr(a, out);
            }
            out.push(')');
        }
        Statement::Break => out.push_str("(break)"),
        Statement::Loop => out.push_str("(loop)"),
        Statement::Endcase => out.push_str("(endcase)"),
        Statement::Resultis { value, from_send } => {
            let _ = write!(out, "(resultis{} ", flag(*from_send, " send"));
            print_expr(value, out);
            out.push(')');
        }
        Statement::Compound(stmts) => {
            out.push_str("(seq");
            for s in stmts {
                out.push(' ');
                print_stmt(s, out);
            }
            out.push(')');
        }
        Statement::Block {
            declarations,
            statements,
        } => {
            out.push_str("(block");
            for d in declarations {
                out.push(' ');
                print_decl(d, out);
            }
            for s in statements {
                out.push(' ');
                print_stmt(s, out);
            }
            out.push(')');
        }
        Statement::StringDecl { name, size } => {
            let _ = write!(out, "(string-decl {name} ");
            print_expr(size, out);
            out.push(')');
        }
        Statement::LabelTarget { name } => {
            let _ = write!(out, "(label-target {name})");
        }
        Statement::ConditionalBranch {
            condition,
            value,
            target,
        } => {
            let _ = write!(out, "(cond-branch {condition} ");
            print_expr(value, out);
            let _ = write!(out, " {target})");
        }
        Statement::Brk => out.push_str("(brk)"),
        Statement::Free(e) => {
            out.push_str("(free ");
            print_expr(e, out);
            out.push(')');
        }
        Statement::Defer(inner) => {
            out.push_str("(defer ");
            print_stmt(inner, out);
            out.push(')');
        }
        Statement::Retain { names } => {
            let _ = write!(out, "(retain {})", names.join(" "));
        }
        Statement::Remanage { names } => {
            let _ = write!(out, "(remanage {})", names.join(" "));
        }
        Statement::Reduction {
            reducer,
            result_var,
            source,
        } => {
            let _ = write!(out, "(reduction {reducer:?} {result_var} ");
            print_expr(source, out);
            out.push(')');
        }
        Statement::ReductionLoop {
            intrinsic,
            result_var,
            vector_name,
            reducer,
        } => {
            let _ = write!(
                out,
                "(reduction-loop {intrinsic} {result_var} {vector_name} {reducer:?})"
            );
        }
        Statement::PairwiseReductionLoop {
            intrinsic,
            result_var,
            vector_a,
            vector_b,
        } => {
            let _ = write!(
                out,
                "(pairwise-reduction-loop {intrinsic} {result_var} {vector_a} {vector_b})"
            );
        }
    }
}

pub fn print_expr(e: &Expression, out: &mut String) {
    match e {
        Expression::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Expression::Float(v) => {
            let _ = write!(out, "{v:?}");
        }
        Expression::StringLit(s) => {
            let _ = write!(out, "{s:?}");
        }
        Expression::CharLit(c) => {
            let _ = write!(out, "(char {c})");
        }
        Expression::Boolean(b) => {
            let _ = write!(out, "{b}");
        }
        Expression::Null => out.push_str("null"),
        Expression::Variable(v) => {
            let _ = write!(out, "{}", v.name);
        }
        Expression::Binary { op, lhs, rhs } => {
            let _ = write!(out, "({op:?} ");
            print_expr(lhs, out);
            out.push(' ');
            print_expr(rhs, out);
            out.push(')');
        }
        Expression::Unary { op, operand } => {
            let _ = write!(out, "({op:?} ");
            print_expr(operand, out);
            out.push(')');
        }
        Expression::VectorAccess { base, index } => print_pair("ix", base, index, out),
        Expression::CharIndirection { base, index } => print_pair("char-ix", base, index, out),
        Expression::FloatVectorIndirection { base, index } => {
            print_pair("fix", base, index, out)
        }
        Expression::BitfieldAccess {
            base,
            start_bit,
            width,
        } => {
            out.push_str("(bits ");
            print_expr(base, out);
            out.push(' ');
            print_expr(start_bit, out);
            out.push(' ');
            print_expr(width, out);
            out.push(')');
        }
        Expression::Call { callee, args } => {
            out.push_str("(call ");
            print_expr(callee, out);
            for a in args {
                out.push(' ');
                print_expr(a, out);
            }
            out.push(')');
        }
        Expression::SysCall { number, args } => {
            out.push_str("(syscall ");
            print_expr(number, out);
            for a in args {
                out.push(' ');
                print_expr(a, out);
            }
            out.push(')');
        }
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            out.push_str("(cond ");
            print_expr(condition, out);
            out.push(' ');
            print_expr(then_expr, out);
            out.push(' ');
            print_expr(else_expr, out);
            out.push(')');
        }
        Expression::Valof { body } => {
            out.push_str("(valof ");
            print_stmt(body, out);
            out.push(')');
        }
        Expression::FloatValof { body } => {
            out.push_str("(fvalof ");
            print_stmt(body, out);
            out.push(')');
        }
        Expression::VecAllocation { size } => print_alloc("vec", size, out),
        Expression::FVecAllocation { size } => print_alloc("fvec", size, out),
        Expression::PairsAllocation { size } => print_alloc("pairs", size, out),
        Expression::FPairsAllocation { size } => print_alloc("fpairs", size, out),
        Expression::StringAllocation { size } => print_alloc("string", size, out),
        Expression::Table { entries, is_float } => {
            let _ = write!(out, "(table{}", flag(*is_float, " float"));
            for e in entries {
                out.push(' ');
                print_expr(e, out);
            }
            out.push(')');
        }
        Expression::List { entries } => {
            out.push_str("(list");
            for e in entries {
                out.push(' ');
                print_expr(e, out);
            }
            out.push(')');
        }
        Expression::VecInitializer { entries, is_float } => {
            let _ = write!(out, "(vec-init{}", flag(*is_float, " float"));
            for e in entries {
                out.push(' ');
                print_expr(e, out);
            }
            out.push(')');
        }
        Expression::New {
            class_name,
            args,
            binding,
        } => {
            let _ = write!(out, "(new {class_name}");
            if let Some(b) = binding {
                let _ = write!(out, " :as {b}");
            }
            for a in args {
                out.push(' ');
                print_expr(a, out);
            }
            out.push(')');
        }
        Expression::MemberAccess { object, member } => {
            out.push_str("(member ");
            print_expr(object, out);
            let _ = write!(out, " {member})");
        }
        Expression::SuperMethodCall { member, args } => {
            let _ = write!(out, "(super-call {member}");
            for a in args {
                out.push(' ');
                print_expr(a, out);
            }
            out.push(')');
        }
        Expression::SuperMethodAccess { member } => {
            let _ = write!(out, "(super-access {member})");
        }
        Expression::PackedConstruct { shape, operands } => {
            let _ = write!(out, "({}", shape.name().to_lowercase());
            for o in operands {
                out.push(' ');
                print_expr(o, out);
            }
            out.push(')');
        }
        Expression::PackedAccess { shape, base, lane } => {
            let _ = write!(out, "({}.{lane} ", shape.name().to_lowercase());
            print_expr(base, out);
            out.push(')');
        }
        Expression::LaneAccess { base, lane } => print_pair("lane", base, lane, out),
    }
}

fn print_pair(tag: &str, a: &Expression, b: &Expression, out: &mut String) {
    let _ = write!(out, "({tag} ");
    print_expr(a, out);
    out.push(' ');
    print_expr(b, out);
    out.push(')');
}

fn print_alloc(tag: &str, size: &Expression, out: &mut String) {
    let _ = write!(out, "({tag}-alloc ");
    print_expr(size, out);
    out.push(')');
}

fn flag(on: bool, text: &str) -> &str {
    if on { text } else { "" }
}
