//! Code generation: AST → semantically-annotated ARM64 instruction stream.
//!
//! The generator walks each function consulting the symbol table, analyzer
//! results, and liveness, allocating physical registers as it goes and
//! emitting through `core-encoder`. Literals and vtables go to the data
//! generator; runtime calls are recorded for veneer reservation.

pub mod data;
mod exprs;
pub mod generator;
pub mod neon;
pub mod regs;
pub mod scanner;

pub use data::DataGenerator;
pub use generator::{CodeGenerator, CodegenError, GeneratedModule};
pub use neon::NeonReducerRegistry;
pub use regs::{RegClass, RegisterManager};
pub use scanner::scan_external_functions;

#[cfg(test)]
mod tests {
    use super::*;
    use core_ast::{BinaryOperator, Declaration, Expression, Program, Statement};
    use core_encoder::Opcode;
    use core_passes::{PipelineOptions, run_pipeline};
    use core_runtime::RuntimeManager;
    use core_symbols::SymbolTable;

    fn compile(program: Program) -> GeneratedModule {
        let runtime = RuntimeManager::new();
        let mut symbols = SymbolTable::new();
        runtime.register_into(&mut symbols).unwrap();
        let out = run_pipeline(program, &mut symbols, PipelineOptions::default()).unwrap();
        let generator = CodeGenerator::new(&mut symbols, &out.analysis, &out.liveness, &runtime);
        generator.generate(&out.program).unwrap()
    }

    fn factorial_program() -> Program {
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
            flags: Default::default(),
        });
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::RoutineCall(Expression::call(
                "WRITEN",
                vec![Expression::call("F", vec![Expression::Number(10)])],
            )),
            flags: Default::default(),
        });
        p
    }

    #[test]
    fn factorial_places_argument_in_callee_saved_register() {
        let module = compile(factorial_program());
        // N is live across the recursive call, so a callee-saved register
        // must be saved in F's prologue.
        let f_start = module
            .code
            .iter()
            .position(|i| i.is_label_definition && i.label == "F")
            .expect("F label");
        let window = &module.code[f_start..f_start + 12];
        assert!(
            window.iter().any(|i| {
                (i.opcode == Opcode::Str || i.opcode == Opcode::Stp)
                    && (19..=28).contains(&i.dest_reg)
            }),
            "expected a callee-saved register save near F's prologue"
        );
        assert!(module.externals.contains("WRITEN"));
    }

    #[test]
    fn recursive_call_targets_own_label_and_runtime_goes_through_veneer() {
        let module = compile(factorial_program());
        let bl_targets: Vec<&str> = module
            .code
            .iter()
            .filter(|i| i.opcode == Opcode::Bl)
            .map(|i| i.branch_target.as_str())
            .collect();
        assert!(bl_targets.contains(&"F"));
        assert!(bl_targets.contains(&"veneer_WRITEN"));
    }

    #[test]
    fn pair_constructor_lowers_to_rodata_or_bfi() {
        // LET P = PAIR(7, 42) with literal operands routes through rodata.
        let mut p = Program::new();
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::Block {
                declarations: vec![Declaration::Let {
                    names: vec!["P".into()],
                    initializers: vec![Expression::PackedConstruct {
                        shape: core_ast::PackedShape::Pair,
                        operands: vec![Expression::Number(7), Expression::Number(42)],
                    }],
                    is_float: false,
                    is_retained: false,
                    explicit_type: None,
                }],
                statements: vec![Statement::RoutineCall(Expression::call(
                    "WRITEN",
                    vec![Expression::PackedAccess {
                        shape: core_ast::PackedShape::Pair,
                        base: Box::new(Expression::variable("P")),
                        lane: 0,
                    }],
                ))],
            },
            flags: Default::default(),
        });
        let module = compile(p);
        // The packed image lands in rodata; the access extracts via SBFX.
        let image = module
            .rodata
            .iter()
            .find(|r| r.is_data_value && r.immediate == (7 | (42i64 << 32)));
        assert!(image.is_some(), "packed literal image in rodata");
        assert!(
            module.code.iter().any(|i| i.opcode == Opcode::Sbfx),
            "signed lane extraction uses SBFX"
        );
    }

    #[test]
    fn vtable_dispatch_loads_slot_and_branches_indirect() {
        use core_ast::{ClassDeclaration, ClassMember, FunctionFlags, Visibility};
        let mut p = Program::new();
        p.declarations.push(Declaration::Class(ClassDeclaration {
            name: "Animal".into(),
            parent: None,
            members: vec![ClassMember {
                visibility: Visibility::Public,
                declaration: Declaration::Routine {
                    name: "speak".into(),
                    parameters: vec![],
                    body: Statement::RoutineCall(Expression::call(
                        "WRITEN",
                        vec![Expression::Number(1)],
                    )),
                    flags: FunctionFlags {
                        is_virtual: true,
                        ..Default::default()
                    },
                },
            }],
        }));
        p.declarations.push(Declaration::Class(ClassDeclaration {
            name: "Dog".into(),
            parent: Some("Animal".into()),
            members: vec![ClassMember {
                visibility: Visibility::Public,
                declaration: Declaration::Routine {
                    name: "speak".into(),
                    parameters: vec![],
                    body: Statement::RoutineCall(Expression::call(
                        "WRITEN",
                        vec![Expression::Number(2)],
                    )),
                    flags: FunctionFlags {
                        is_virtual: true,
                        ..Default::default()
                    },
                },
            }],
        }));
        p.declarations.push(Declaration::Routine {
            name: "START".into(),
            parameters: vec![],
            body: Statement::Block {
                declarations: vec![Declaration::Let {
                    names: vec!["A".into()],
                    initializers: vec![Expression::New {
                        class_name: "Dog".into(),
                        args: vec![],
                        binding: None,
                    }],
                    is_float: false,
                    is_retained: false,
                    explicit_type: None,
                }],
                statements: vec![Statement::RoutineCall(Expression::Call {
                    callee: Box::new(Expression::MemberAccess {
                        object: Box::new(Expression::variable("A")),
                        member: "speak".into(),
                    }),
                    args: vec![],
                })],
            },
            flags: Default::default(),
        });
        let module = compile(p);
        assert!(
            module.code.iter().any(|i| i.opcode == Opcode::Blr),
            "virtual dispatch branches through a register"
        );
        // Dog's vtable exists in rodata and points at Dog::speak.
        assert!(
            module
                .rodata
                .iter()
                .any(|r| r.is_label_definition && r.label == "Dog_vtable")
        );
        assert!(
            module
                .rodata
                .iter()
                .any(|r| r.target_label == "Dog::speak")
        );
    }
}
