//! Expression nodes.

use crate::stmt::Statement;
use crate::types::VarType;

/// The closed binary operator set. `LogicalAnd`/`LogicalOr` survive only
/// until the short-circuit lowering pass rewrites them into conditionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    Equivalence,
    NotEquivalence,
    LeftShift,
    RightShift,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    AddressOf,
    Indirection,
    LogicalNot,
    BitwiseNot,
    Negate,
    FloatConvert,
    IntegerConvert,
    FloatSqrt,
    FloatFloor,
    FloatTruncate,
    LengthOf,
    HeadOf,
    TailOf,
    TailOfNonDestructive,
    HeadOfAsFloat,
    TypeOf,
    TypeAsString,
}

/// The packed aggregate shapes share one layout table so construction and
/// lane access generate through a single path instead of per-shape code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedShape {
    Pair,
    FPair,
    Quad,
    FQuad,
    Oct,
    FOct,
}

/// Bit layout of one packed shape: `lanes` fields of `lane_bits` bits each,
/// packed little-endian into one or more 64-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLayout {
    pub lanes: u8,
    pub lane_bits: u8,
    pub is_float: bool,
    /// Lane values are sign-extended on extraction (SBFX vs UBFX).
    pub signed: bool,
}

pub const fn packed_layout(shape: PackedShape) -> PackedLayout {
    match shape {
        PackedShape::Pair => PackedLayout {
            lanes: 2,
            lane_bits: 32,
            is_float: false,
            signed: true,
        },
        PackedShape::FPair => PackedLayout {
            lanes: 2,
            lane_bits: 32,
            is_float: true,
            signed: false,
        },
        PackedShape::Quad => PackedLayout {
            lanes: 4,
            lane_bits: 16,
            is_float: false,
            signed: true,
        },
        PackedShape::FQuad => PackedLayout {
            lanes: 4,
            lane_bits: 16,
            is_float: true,
            signed: false,
        },
        PackedShape::Oct => PackedLayout {
            lanes: 8,
            lane_bits: 32,
            is_float: false,
            signed: true,
        },
        PackedShape::FOct => PackedLayout {
            lanes: 8,
            lane_bits: 32,
            is_float: true,
            signed: false,
        },
    }
}

impl PackedShape {
    pub fn layout(self) -> PackedLayout {
        packed_layout(self)
    }

    pub fn value_type(self) -> VarType {
        match self {
            PackedShape::Pair => VarType::PAIR,
            PackedShape::FPair => VarType::FPAIR,
            PackedShape::Quad => VarType::QUAD,
            PackedShape::FQuad => VarType::FQUAD,
            PackedShape::Oct => VarType::OCT,
            PackedShape::FOct => VarType::FOCT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PackedShape::Pair => "PAIR",
            PackedShape::FPair => "FPAIR",
            PackedShape::Quad => "QUAD",
            PackedShape::FQuad => "FQUAD",
            PackedShape::Oct => "OCT",
            PackedShape::FOct => "FOCT",
        }
    }
}

/// Reducers bindable by a `Reduction` statement before lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reducer {
    Min,
    Max,
    Sum,
}

impl Reducer {
    /// The LLVM-style intrinsic token attached to the lowered loop node.
    pub fn intrinsic_token(self, is_float: bool, lanes: u8, lane_bits: u8) -> String {
        let family = match self {
            Reducer::Min => "vpmin",
            Reducer::Max => "vpmax",
            Reducer::Sum => "vpadd",
        };
        let elem = if is_float { 'f' } else { 'i' };
        format!("llvm.arm.neon.{family}.v{lanes}{elem}{lane_bits}")
    }
}

/// A variable reference, carrying the inferred type once the analyzer has
/// run. The name may be a unique renaming produced by inlining.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAccess {
    pub name: String,
    pub ty: VarType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(i64),
    Float(f64),
    StringLit(String),
    CharLit(i64),
    Boolean(bool),
    Null,
    Variable(VariableAccess),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    /// `v!i` word indexing.
    VectorAccess {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    /// `s%i` 32-bit character cell indexing into a string.
    CharIndirection {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    /// `v.!i` float element indexing.
    FloatVectorIndirection {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    /// Extract `width` bits at `start_bit` from `base`.
    BitfieldAccess {
        base: Box<Expression>,
        start_bit: Box<Expression>,
        width: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    SysCall {
        number: Box<Expression>,
        args: Vec<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
    Valof {
        body: Box<Statement>,
    },
    FloatValof {
        body: Box<Statement>,
    },
    VecAllocation {
        size: Box<Expression>,
    },
    FVecAllocation {
        size: Box<Expression>,
    },
    PairsAllocation {
        size: Box<Expression>,
    },
    FPairsAllocation {
        size: Box<Expression>,
    },
    StringAllocation {
        size: Box<Expression>,
    },
    Table {
        entries: Vec<Expression>,
        is_float: bool,
    },
    List {
        entries: Vec<Expression>,
    },
    VecInitializer {
        entries: Vec<Expression>,
        is_float: bool,
    },
    New {
        class_name: String,
        args: Vec<Expression>,
        binding: Option<String>,
    },
    MemberAccess {
        object: Box<Expression>,
        member: String,
    },
    SuperMethodCall {
        member: String,
        args: Vec<Expression>,
    },
    /// Reached only by certain syntactic patterns; code generation treats it
    /// as the parent method's code address without dispatch.
    SuperMethodAccess {
        member: String,
    },
    /// `PAIR(a,b)`, `QUAD(a,b,c,d)`, `OCT(...)` and float variants. The
    /// operand count always equals the shape's lane count.
    PackedConstruct {
        shape: PackedShape,
        operands: Vec<Expression>,
    },
    /// `.first` / `.second` / `.third` / `.fourth` on a packed value.
    PackedAccess {
        shape: PackedShape,
        base: Box<Expression>,
        lane: u8,
    },
    /// `v.|i|` lane access on an 8-lane vector.
    LaneAccess {
        base: Box<Expression>,
        lane: Box<Expression>,
    },
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Expression {
        Expression::Variable(VariableAccess {
            name: name.into(),
            ty: VarType::UNKNOWN,
        })
    }

    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Expression {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Expression {
        Expression::Call {
            callee: Box::new(Expression::variable(name)),
            args,
        }
    }

    /// True for literal leaves the constant folder can consume.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::Number(_)
                | Expression::Float(_)
                | Expression::CharLit(_)
                | Expression::Boolean(_)
                | Expression::Null
        )
    }

    /// Integer value of a literal under BCPL semantics (true is -1).
    pub fn literal_int(&self) -> Option<i64> {
        match self {
            Expression::Number(n) | Expression::CharLit(n) => Some(*n),
            Expression::Boolean(b) => Some(if *b { -1 } else { 0 }),
            Expression::Null => Some(0),
            _ => None,
        }
    }
}
