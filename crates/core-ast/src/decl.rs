//! Declaration nodes.

use crate::expr::Expression;
use crate::stmt::Statement;
use crate::types::VarType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub is_virtual: bool,
    pub is_final: bool,
    pub is_float: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub visibility: Visibility,
    pub declaration: Declaration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub name: String,
    pub parent: Option<String>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `LET a, b = e1, e2` — names with parallel initializers.
    Let {
        names: Vec<String>,
        initializers: Vec<Expression>,
        is_float: bool,
        is_retained: bool,
        explicit_type: Option<VarType>,
    },
    Manifest {
        name: String,
        value: i64,
    },
    Static {
        name: String,
        initializer: Expression,
    },
    /// `GLOBAL $( name: slot; ... $)`
    Global {
        slots: Vec<(String, u32)>,
    },
    /// Top-level `LET`/`FLET` outside any function.
    GlobalVariable {
        names: Vec<String>,
        initializers: Vec<Expression>,
        is_float: bool,
    },
    Function {
        name: String,
        parameters: Vec<String>,
        body: Expression,
        flags: FunctionFlags,
    },
    Routine {
        name: String,
        parameters: Vec<String>,
        body: Statement,
        flags: FunctionFlags,
    },
    Label {
        name: String,
        statement: Box<Statement>,
    },
    Class(ClassDeclaration),
}

impl Declaration {
    /// Name used in diagnostics; multi-name declarations report the first.
    pub fn primary_name(&self) -> &str {
        match self {
            Declaration::Let { names, .. } | Declaration::GlobalVariable { names, .. } => {
                names.first().map(String::as_str).unwrap_or("")
            }
            Declaration::Manifest { name, .. }
            | Declaration::Static { name, .. }
            | Declaration::Function { name, .. }
            | Declaration::Routine { name, .. }
            | Declaration::Label { name, .. } => name,
            Declaration::Global { slots } => {
                slots.first().map(|(n, _)| n.as_str()).unwrap_or("")
            }
            Declaration::Class(c) => &c.name,
        }
    }
}
