//! Statement nodes.

use crate::decl::Declaration;
use crate::expr::{Expression, Reducer};
use crate::types::VarType;

/// Sub-mode of `REPEAT`: bare, `REPEATWHILE`, or `REPEATUNTIL`.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatMode {
    Forever,
    While(Expression),
    Until(Expression),
}

/// Constant loop bounds cached by the folding pass so codegen can emit
/// immediate compares instead of reloading the bound each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForConstants {
    pub end: Option<i64>,
    pub step: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Parallel assignment; `lhs.len() == rhs.len()`.
    Assignment {
        lhs: Vec<Expression>,
        rhs: Vec<Expression>,
    },
    /// A call in statement position (routine call or discarded function call).
    RoutineCall(Expression),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
    },
    Unless {
        condition: Expression,
        then_branch: Box<Statement>,
    },
    Test {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Box<Statement>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Until {
        condition: Expression,
        body: Box<Statement>,
    },
    Repeat {
        body: Box<Statement>,
        mode: RepeatMode,
    },
    For {
        var: String,
        start: Expression,
        end: Expression,
        step: Option<Expression>,
        body: Box<Statement>,
        constants: ForConstants,
    },
    ForEach {
        value_var: String,
        /// Optional tag or destructured-second variable.
        tag_var: Option<String>,
        collection: Expression,
        body: Box<Statement>,
        /// Element-type filter; `UNKNOWN` means every element.
        element_filter: VarType,
    },
    Switchon {
        subject: Expression,
        body: Box<Statement>,
    },
    /// A case arm inside a `SWITCHON` body. `resolved_value` is filled by the
    /// analyzer once the constant expression has been evaluated.
    Case {
        constant: Expression,
        resolved_value: Option<i64>,
        body: Box<Statement>,
    },
    Default {
        body: Box<Statement>,
    },
    Goto(Expression),
    Return,
    Finish {
        syscall: Option<Expression>,
        args: Vec<Expression>,
    },
    Break,
    Loop,
    Endcase,
    Resultis {
        value: Expression,
        /// Whether this came from `SEND` syntax rather than `RESULTIS`.
        from_send: bool,
    },
    Compound(Vec<Statement>),
    Block {
        declarations: Vec<Declaration>,
        statements: Vec<Statement>,
    },
    /// `STRING name SIZE n` allocation statement.
    StringDecl {
        name: String,
        size: Expression,
    },
    LabelTarget {
        name: String,
    },
    /// Lowered form: branch to `target` when `condition` holds for `value`.
    ConditionalBranch {
        condition: String,
        value: Expression,
        target: String,
    },
    /// Debugger breakpoint (`BRK` instruction).
    Brk,
    Free(Expression),
    /// Scoped release; the wrapped action runs at scope exit on every path.
    Defer(Box<Statement>),
    Retain {
        names: Vec<String>,
    },
    Remanage {
        names: Vec<String>,
    },
    /// Generic reduction over a collection with a bound reducer; lowered into
    /// `ReductionLoop`/`PairwiseReductionLoop` before codegen.
    Reduction {
        reducer: Reducer,
        result_var: String,
        source: Expression,
    },
    /// Scalar reduction loop over a vector, lowered form.
    ReductionLoop {
        intrinsic: String,
        result_var: String,
        vector_name: String,
        reducer: Reducer,
    },
    /// NEON pairwise reduction over two source vectors, lowered form.
    PairwiseReductionLoop {
        intrinsic: String,
        result_var: String,
        vector_a: String,
        vector_b: String,
    },
}

impl Statement {
    /// Wrap in a compound unless already one. Used when a pass must prepend
    /// synthesized statements (e.g. a loop preheader).
    pub fn into_compound(self) -> Vec<Statement> {
        match self {
            Statement::Compound(stmts) => stmts,
            other => vec![other],
        }
    }
}
