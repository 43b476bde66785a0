//! Expression type inference.
//!
//! Deliberately simple: a single bottom-up synthesis over the expression with
//! BCPL promotion rules (mixed int/float arithmetic is float, comparisons
//! are integer truth values). Used by the analyzer to stamp variable
//! accesses and by codegen to pick integer vs FP register classes.

use crate::classes::ClassTable;
use core_ast::{Expression, UnaryOperator, VarType};
use core_symbols::SymbolTable;

pub struct InferCtx<'a> {
    pub symbols: &'a SymbolTable,
    pub classes: &'a ClassTable,
    pub function: &'a str,
}

pub fn infer_expr_type(e: &Expression, ctx: &InferCtx<'_>) -> VarType {
    match e {
        Expression::Number(_) | Expression::CharLit(_) | Expression::Boolean(_) => {
            VarType::INTEGER
        }
        Expression::Float(_) => VarType::FLOAT,
        Expression::StringLit(_) | Expression::StringAllocation { .. } => {
            VarType::POINTER | VarType::STRING
        }
        Expression::Null => VarType::POINTER,
        Expression::Variable(v) => {
            if !v.ty.is_unknown() {
                return v.ty;
            }
            ctx.symbols
                .lookup_in_function(&v.name, ctx.function)
                .map(|s| s.ty)
                .unwrap_or(VarType::UNKNOWN)
        }
        Expression::Binary { op, lhs, rhs } => {
            if op.is_comparison() {
                return VarType::INTEGER;
            }
            let lt = infer_expr_type(lhs, ctx);
            let rt = infer_expr_type(rhs, ctx);
            if lt.contains(VarType::FLOAT) || rt.contains(VarType::FLOAT) {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            }
        }
        Expression::Unary { op, operand } => match op {
            UnaryOperator::FloatConvert
            | UnaryOperator::FloatSqrt
            | UnaryOperator::FloatFloor
            | UnaryOperator::HeadOfAsFloat => VarType::FLOAT,
            UnaryOperator::IntegerConvert
            | UnaryOperator::FloatTruncate
            | UnaryOperator::LengthOf
            | UnaryOperator::TypeOf => VarType::INTEGER,
            UnaryOperator::TypeAsString => VarType::POINTER | VarType::STRING,
            UnaryOperator::AddressOf => VarType::POINTER,
            UnaryOperator::HeadOf | UnaryOperator::Indirection => VarType::INTEGER,
            UnaryOperator::TailOf | UnaryOperator::TailOfNonDestructive => {
                infer_expr_type(operand, ctx)
            }
            UnaryOperator::LogicalNot | UnaryOperator::BitwiseNot | UnaryOperator::Negate => {
                infer_expr_type(operand, ctx)
            }
        },
        Expression::VectorAccess { .. } | Expression::CharIndirection { .. } => VarType::INTEGER,
        Expression::FloatVectorIndirection { .. } => VarType::FLOAT,
        Expression::BitfieldAccess { .. } => VarType::INTEGER,
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Variable(v) => ctx
                .symbols
                .lookup_in_function(&v.name, ctx.function)
                .map(|s| {
                    if s.kind.is_float_function() {
                        VarType::FLOAT
                    } else if !s.ty.is_unknown() {
                        s.ty
                    } else {
                        VarType::INTEGER
                    }
                })
                .unwrap_or(VarType::INTEGER),
            Expression::MemberAccess { object, member } => {
                method_return_type(object, member, ctx)
            }
            _ => VarType::INTEGER,
        },
        Expression::SysCall { .. } => VarType::INTEGER,
        Expression::Conditional { then_expr, .. } => infer_expr_type(then_expr, ctx),
        Expression::Valof { .. } => VarType::INTEGER,
        Expression::FloatValof { .. } => VarType::FLOAT,
        Expression::VecAllocation { .. } | Expression::Table { is_float: false, .. } => {
            VarType::POINTER_TO_INT_VEC
        }
        Expression::FVecAllocation { .. } | Expression::Table { is_float: true, .. } => {
            VarType::POINTER_TO_FLOAT_VEC
        }
        Expression::PairsAllocation { .. } => VarType::POINTER | VarType::PAIRS,
        Expression::FPairsAllocation { .. } => VarType::POINTER | VarType::FPAIRS,
        Expression::List { .. } => VarType::POINTER | VarType::LIST,
        Expression::VecInitializer { is_float, .. } => {
            if *is_float {
                VarType::POINTER_TO_FLOAT_VEC
            } else {
                VarType::POINTER_TO_INT_VEC
            }
        }
        Expression::New { .. } => VarType::POINTER_TO_OBJECT,
        Expression::MemberAccess { object, member } => {
            member_type(object, member, ctx).unwrap_or(VarType::INTEGER)
        }
        Expression::SuperMethodCall { member, .. } => {
            super_method_return_type(member, ctx)
        }
        Expression::SuperMethodAccess { .. } => VarType::POINTER,
        Expression::PackedConstruct { shape, .. } => shape.value_type(),
        Expression::PackedAccess { shape, .. } => {
            if shape.layout().is_float {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            }
        }
        Expression::LaneAccess { base, .. } => {
            if infer_expr_type(base, ctx).intersects(VarType::FOCT | VarType::FVEC) {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            }
        }
    }
}

fn object_class<'a>(object: &'a Expression, ctx: &'a InferCtx<'_>) -> Option<&'a str> {
    match object {
        Expression::New { class_name, .. } => Some(class_name.as_str()),
        Expression::Variable(v) => ctx
            .symbols
            .lookup_in_function(&v.name, ctx.function)
            .and_then(|s| s.class_name.as_deref()),
        _ => None,
    }
}

fn member_type(object: &Expression, member: &str, ctx: &InferCtx<'_>) -> Option<VarType> {
    let class = object_class(object, ctx)?;
    ctx.classes
        .get(class)
        .and_then(|c| c.member(member))
        .map(|m| m.ty)
}

fn method_return_type(object: &Expression, member: &str, ctx: &InferCtx<'_>) -> VarType {
    let Some(class) = object_class(object, ctx) else {
        return VarType::INTEGER;
    };
    ctx.classes
        .get(class)
        .and_then(|c| c.method(member))
        .map(|m| {
            if m.is_float {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            }
        })
        .unwrap_or(VarType::INTEGER)
}

fn super_method_return_type(member: &str, ctx: &InferCtx<'_>) -> VarType {
    // The enclosing method's class is recorded on the function symbol.
    let class = ctx
        .symbols
        .lookup_in_function(ctx.function, "")
        .and_then(|s| s.class_name.clone());
    class
        .and_then(|c| ctx.classes.parent_of(&c).and_then(|p| p.method(member).cloned()))
        .map(|m| {
            if m.is_float {
                VarType::FLOAT
            } else {
                VarType::INTEGER
            }
        })
        .unwrap_or(VarType::INTEGER)
}
