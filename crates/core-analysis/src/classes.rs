//! Class table: object layout and vtable slot assignment.
//!
//! Layout follows single-inheritance C++ semantics. Word 0 of every object
//! is the vtable pointer; member variables inherited from the parent keep
//! their offsets and new members append, 8 bytes each. Virtual method slots
//! inherited from the parent keep their indices; an override occupies the
//! parent's slot, a new virtual method appends.

use core_ast::{ClassDeclaration, Declaration, Program, VarType};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassTableError {
    #[error("class '{child}' names unknown parent '{parent}'")]
    UnknownParent { child: String, parent: String },
    #[error("duplicate class '{0}'")]
    DuplicateClass(String),
    #[error("class hierarchy cycle involving '{0}'")]
    Cycle(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub name: String,
    pub ty: VarType,
    /// Byte offset within the object; the vtable pointer occupies offset 0.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    /// Code label: `Class::method`.
    pub qualified_name: String,
    pub is_virtual: bool,
    pub is_final: bool,
    pub is_float: bool,
    pub vtable_slot: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,
    pub members: Vec<MemberInfo>,
    pub methods: Vec<MethodInfo>,
    /// Qualified method name per vtable slot.
    pub vtable: Vec<String>,
    /// Total object size in bytes including the vtable pointer word.
    pub total_size: usize,
}

impl ClassInfo {
    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Label emitted for this class's vtable in rodata.
    pub fn vtable_label(&self) -> String {
        format!("{}_vtable", self.name)
    }
}

#[derive(Debug, Default)]
pub struct ClassTable {
    classes: HashMap<String, ClassInfo>,
}

impl ClassTable {
    pub fn build(program: &Program) -> Result<ClassTable, ClassTableError> {
        let decls: Vec<&ClassDeclaration> = program
            .declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Class(c) => Some(c),
                _ => None,
            })
            .collect();

        let mut table = ClassTable::default();
        // Parents must be laid out before children; iterate until no
        // progress, which also detects cycles and unknown parents.
        let mut pending: Vec<&ClassDeclaration> = decls;
        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::new();
            for decl in pending {
                let parent_ready = decl
                    .parent
                    .as_ref()
                    .is_none_or(|p| table.classes.contains_key(p));
                if parent_ready {
                    table.add_class(decl)?;
                } else {
                    still_pending.push(decl);
                }
            }
            if still_pending.len() == before {
                let child = still_pending[0].name.clone();
                let parent = still_pending[0].parent.clone().unwrap_or_default();
                // Unknown parent and cycles are indistinguishable here when
                // the parent never appears in the program.
                let exists_somewhere = still_pending.iter().any(|c| c.name == parent);
                return Err(if exists_somewhere {
                    ClassTableError::Cycle(child)
                } else {
                    ClassTableError::UnknownParent { child, parent }
                });
            }
            pending = still_pending;
        }
        Ok(table)
    }

    fn add_class(&mut self, decl: &ClassDeclaration) -> Result<(), ClassTableError> {
        if self.classes.contains_key(&decl.name) {
            return Err(ClassTableError::DuplicateClass(decl.name.clone()));
        }
        let mut info = match &decl.parent {
            Some(p) => {
                let parent = &self.classes[p];
                ClassInfo {
                    name: decl.name.clone(),
                    parent: Some(p.clone()),
                    members: parent.members.clone(),
                    methods: parent.methods.clone(),
                    vtable: parent.vtable.clone(),
                    total_size: parent.total_size,
                }
            }
            None => ClassInfo {
                name: decl.name.clone(),
                total_size: 8, // vtable pointer
                ..ClassInfo::default()
            },
        };

        for member in &decl.members {
            match &member.declaration {
                Declaration::Let {
                    names,
                    is_float,
                    explicit_type,
                    ..
                } => {
                    for n in names {
                        if info.member(n).is_some() {
                            continue; // inherited member keeps its offset
                        }
                        let ty = explicit_type.unwrap_or(if *is_float {
                            VarType::FLOAT
                        } else {
                            VarType::INTEGER
                        });
                        info.members.push(MemberInfo {
                            name: n.clone(),
                            ty,
                            offset: info.total_size,
                        });
                        info.total_size += 8;
                    }
                }
                Declaration::Function { name, flags, .. }
                | Declaration::Routine { name, flags, .. } => {
                    let qualified = format!("{}::{}", decl.name, name);
                    if let Some(existing) = info.methods.iter_mut().find(|m| m.name == *name) {
                        // Override: same slot, new code label.
                        existing.qualified_name = qualified.clone();
                        existing.is_final = flags.is_final;
                        existing.is_float = flags.is_float;
                        if let Some(slot) = existing.vtable_slot {
                            info.vtable[slot] = qualified;
                        }
                    } else {
                        let vtable_slot = if flags.is_virtual {
                            info.vtable.push(qualified.clone());
                            Some(info.vtable.len() - 1)
                        } else {
                            None
                        };
                        info.methods.push(MethodInfo {
                            name: name.clone(),
                            qualified_name: qualified,
                            is_virtual: flags.is_virtual,
                            is_final: flags.is_final,
                            is_float: flags.is_float,
                            vtable_slot,
                        });
                    }
                }
                _ => {}
            }
        }

        debug!(
            target: "analysis.classes",
            class = %info.name,
            members = info.members.len(),
            vtable_slots = info.vtable.len(),
            size = info.total_size,
            "class_layout"
        );
        self.classes.insert(decl.name.clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn parent_of(&self, name: &str) -> Option<&ClassInfo> {
        self.get(name)
            .and_then(|c| c.parent.as_deref())
            .and_then(|p| self.get(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::{ClassMember, Expression, FunctionFlags, Statement, Visibility};

    fn class(name: &str, parent: Option<&str>, members: Vec<Declaration>) -> Declaration {
        Declaration::Class(ClassDeclaration {
            name: name.into(),
            parent: parent.map(Into::into),
            members: members
                .into_iter()
                .map(|declaration| ClassMember {
                    visibility: Visibility::Public,
                    declaration,
                })
                .collect(),
        })
    }

    fn virtual_routine(name: &str) -> Declaration {
        Declaration::Routine {
            name: name.into(),
            parameters: vec![],
            body: Statement::Return,
            flags: FunctionFlags {
                is_virtual: true,
                ..Default::default()
            },
        }
    }

    fn field(name: &str) -> Declaration {
        Declaration::Let {
            names: vec![name.into()],
            initializers: vec![Expression::Number(0)],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }
    }

    #[test]
    fn override_keeps_vtable_slot() {
        let mut p = Program::new();
        p.declarations.push(class(
            "Animal",
            None,
            vec![field("legs"), virtual_routine("speak"), virtual_routine("eat")],
        ));
        p.declarations
            .push(class("Dog", Some("Animal"), vec![virtual_routine("speak")]));
        let table = ClassTable::build(&p).unwrap();

        let animal = table.get("Animal").unwrap();
        let dog = table.get("Dog").unwrap();
        assert_eq!(animal.method("speak").unwrap().vtable_slot, Some(0));
        assert_eq!(dog.method("speak").unwrap().vtable_slot, Some(0));
        assert_eq!(dog.vtable[0], "Dog::speak");
        assert_eq!(dog.vtable[1], "Animal::eat");
        // Inherited member keeps its offset after the vtable pointer word.
        assert_eq!(dog.member("legs").unwrap().offset, 8);
        assert_eq!(dog.total_size, 16);
    }

    #[test]
    fn parent_declared_after_child_still_resolves() {
        let mut p = Program::new();
        p.declarations
            .push(class("Dog", Some("Animal"), vec![field("tail")]));
        p.declarations.push(class("Animal", None, vec![field("legs")]));
        let table = ClassTable::build(&p).unwrap();
        assert_eq!(table.get("Dog").unwrap().member("tail").unwrap().offset, 16);
    }

    #[test]
    fn unknown_parent_is_an_error() {
        let mut p = Program::new();
        p.declarations.push(class("Dog", Some("Ghost"), vec![]));
        assert!(matches!(
            ClassTable::build(&p),
            Err(ClassTableError::UnknownParent { .. })
        ));
    }
}
