//! End-to-end scenarios through the full pipeline.
//!
//! Instruction-stream assertions run on any host; actually executing the
//! committed code requires an AArch64 machine and is gated accordingly.
//! Output routines print to stdout, so the executable checks assert on
//! computed values (vector cells, returned words) rather than captured
//! text.

use core_ast::{
    BinaryOperator, Declaration, Expression, ForConstants, Program, Statement,
};
use core_codegen::CodeGenerator;
use core_encoder::{InstructionStream, Opcode};
use core_passes::{PipelineOptions, run_pipeline};
use core_peephole::PeepholeOptimizer;
use core_runtime::RuntimeManager;
use core_symbols::SymbolTable;

fn lowered_stream(program: Program, peephole_passes: u32) -> Vec<core_encoder::Instruction> {
    let runtime = RuntimeManager::new();
    let mut symbols = SymbolTable::new();
    runtime.register_into(&mut symbols).unwrap();
    let out = run_pipeline(program, &mut symbols, PipelineOptions::default()).unwrap();
    let generator = CodeGenerator::new(&mut symbols, &out.analysis, &out.liveness, &runtime);
    let module = generator.generate(&out.program).unwrap();
    let mut stream = InstructionStream::new();
    stream.extend(module.code);
    let mut opt = PeepholeOptimizer::new();
    opt.optimize(&mut stream, peephole_passes);
    stream.into_instructions()
}

fn start_routine(body: Statement) -> Declaration {
    Declaration::Routine {
        name: "START".into(),
        parameters: vec![],
        body,
        flags: Default::default(),
    }
}

/// FOR I = 1 TO 1024 DO R := R + I, compiled at peephole-pass 5: the sum
/// folds no further, and no multiply survives anywhere in the stream.
#[test]
fn strength_reduced_loop_contains_no_mul() {
    let mut p = Program::new();
    p.declarations.push(start_routine(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["R".into()],
            initializers: vec![Expression::Number(0)],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![
            Statement::For {
                var: "I".into(),
                start: Expression::Number(1),
                end: Expression::Number(1024),
                step: None,
                body: Box::new(Statement::Assignment {
                    lhs: vec![Expression::variable("R")],
                    rhs: vec![Expression::binary(
                        BinaryOperator::Add,
                        Expression::variable("R"),
                        // I*1 is strength-reduction fodder; it must not
                        // reach the encoder as a MUL.
                        Expression::binary(
                            BinaryOperator::Mul,
                            Expression::variable("I"),
                            Expression::Number(1),
                        ),
                    )],
                }),
                constants: ForConstants::default(),
            },
            Statement::RoutineCall(Expression::call(
                "WRITEN",
                vec![Expression::variable("R")],
            )),
        ],
    }));
    let stream = lowered_stream(p, 5);
    assert!(
        !stream.iter().any(|i| i.opcode == Opcode::Mul),
        "strength reduction must eliminate the multiply"
    );
}

/// Peephole stability: a second optimization run changes nothing.
#[test]
fn peephole_output_is_stable() {
    let mut p = Program::new();
    p.declarations.push(start_routine(Statement::RoutineCall(
        Expression::call("WRITEN", vec![Expression::Number(5050)]),
    )));
    let once = lowered_stream(p.clone(), 5);
    let mut stream = InstructionStream::new();
    stream.extend(once.clone());
    let mut opt = PeepholeOptimizer::new();
    opt.optimize(&mut stream, 5);
    assert_eq!(stream.into_instructions(), once);
}

/// Manifest bounds fold before codegen: the loop compare uses an
/// immediate, and MAX leaves no variable access behind.
#[test]
fn manifest_loop_bound_becomes_immediate_compare() {
    let mut p = Program::new();
    p.declarations.push(Declaration::Manifest {
        name: "MAX".into(),
        value: 100,
    });
    p.declarations.push(start_routine(Statement::Block {
        declarations: vec![Declaration::Let {
            names: vec!["S".into()],
            initializers: vec![Expression::Number(0)],
            is_float: false,
            is_retained: false,
            explicit_type: None,
        }],
        statements: vec![Statement::For {
            var: "I".into(),
            start: Expression::Number(1),
            end: Expression::variable("MAX"),
            step: None,
            body: Box::new(Statement::Assignment {
                lhs: vec![Expression::variable("S")],
                rhs: vec![Expression::binary(
                    BinaryOperator::Add,
                    Expression::variable("S"),
                    Expression::variable("I"),
                )],
            }),
            constants: ForConstants::default(),
        }],
    }));
    let stream = lowered_stream(p, 5);
    assert!(
        stream
            .iter()
            .any(|i| i.opcode == Opcode::Cmp && i.uses_immediate && i.immediate == 100),
        "constant-folded bound compares as an immediate"
    );
}

#[cfg(target_arch = "aarch64")]
mod execution {
    use super::*;
    use core_ast::PackedShape;

    fn run(program: Program) -> i64 {
        // The binary crate's driver is not a library; re-drive the phases
        // through the public crates.
        let compiled = harness::compile(program);
        unsafe { compiled.run() }
    }

    mod harness {
        use core_ast::Program;
        use core_codegen::CodeGenerator;
        use core_encoder::InstructionStream;
        use core_jit::JitMemoryManager;
        use core_link::Linker;
        use core_passes::{PipelineOptions, run_pipeline};
        use core_peephole::PeepholeOptimizer;
        use core_runtime::RuntimeManager;
        use core_symbols::SymbolTable;

        pub struct Compiled {
            jit: JitMemoryManager,
            _data: Box<[u8]>,
            entry_offset: usize,
        }

        impl Compiled {
            pub unsafe fn run(&self) -> i64 {
                let entry = unsafe { self.jit.entry_at(self.entry_offset) };
                unsafe { entry() }
            }
        }

        pub fn compile(program: Program) -> Compiled {
            let runtime = RuntimeManager::new();
            let mut symbols = SymbolTable::new();
            runtime.register_into(&mut symbols).unwrap();
            let out = run_pipeline(program, &mut symbols, PipelineOptions::default()).unwrap();
            let generator =
                CodeGenerator::new(&mut symbols, &out.analysis, &out.liveness, &runtime);
            let module = generator.generate(&out.program).unwrap();
            let mut stream = InstructionStream::new();
            stream.extend(module.code);
            PeepholeOptimizer::new().optimize(&mut stream, 5);
            let code = stream.into_instructions();

            let estimate = (code.len() + module.rodata.len()) * 4
                + module.externals.len() * 16
                + 64;
            let mut jit = JitMemoryManager::allocate(estimate.max(64)).unwrap();
            let data_len = module
                .data
                .iter()
                .filter(|r| !r.is_label_definition)
                .count()
                * 4;
            let mut data_block: Box<[u8]> = vec![0u8; data_len.max(8)].into_boxed_slice();
            let linker = Linker::new(&runtime);
            let linked = linker
                .link_with_data(
                    code,
                    module.rodata,
                    module.data,
                    &module.externals,
                    jit.base_address(),
                    data_block.as_ptr() as u64,
                )
                .unwrap();
            let bytes = linked.bytes();
            jit.write(0, &bytes).unwrap();
            let image = linked.data_bytes();
            data_block[..image.len()].copy_from_slice(&image);
            jit.make_executable().unwrap();
            let entry = linked.address_of("START").unwrap();
            Compiled {
                jit,
                _data: data_block,
                entry_offset: (entry - linked.base_address) as usize,
            }
        }
    }

    /// Recursion with the argument surviving the call in a callee-saved
    /// register: F(10) = 3628800.
    #[test]
    fn factorial_of_ten() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Function {
            name: "F".into(),
            parameters: vec!["N".into()],
            body: Expression::Conditional {
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
            },
            flags: Default::default(),
        });
        // START returns F(10) so the value is observable without stdout.
        p.declarations.push(start_routine(Statement::Resultis {
            value: Expression::call("F", vec![Expression::Number(10)]),
            from_send: false,
        }));
        assert_eq!(run(p), 3628800);
    }

    /// Manifest + folded loop bound: sum of 1..=100.
    #[test]
    fn manifest_sum_is_5050() {
        let mut p = Program::new();
        p.declarations.push(Declaration::Manifest {
            name: "MAX".into(),
            value: 100,
        });
        p.declarations.push(start_routine(Statement::Block {
            declarations: vec![Declaration::Let {
                names: vec!["S".into()],
                initializers: vec![Expression::Number(0)],
                is_float: false,
                is_retained: false,
                explicit_type: None,
            }],
            statements: vec![
                Statement::For {
                    var: "I".into(),
                    start: Expression::Number(1),
                    end: Expression::variable("MAX"),
                    step: None,
                    body: Box::new(Statement::Assignment {
                        lhs: vec![Expression::variable("S")],
                        rhs: vec![Expression::binary(
                            BinaryOperator::Add,
                            Expression::variable("S"),
                            Expression::variable("I"),
                        )],
                    }),
                    constants: ForConstants::default(),
                },
                Statement::Resultis {
                    value: Expression::variable("S"),
                    from_send: false,
                },
            ],
        }));
        assert_eq!(run(p), 5050);
    }

    /// Vector allocation, index stores, index load: V!3 = 9.
    #[test]
    fn vector_squares() {
        let mut p = Program::new();
        p.declarations.push(start_routine(Statement::Block {
            declarations: vec![Declaration::Let {
                names: vec!["V".into()],
                initializers: vec![Expression::VecAllocation {
                    size: Box::new(Expression::Number(8)),
                }],
                is_float: false,
                is_retained: false,
                explicit_type: None,
            }],
            statements: vec![
                Statement::For {
                    var: "I".into(),
                    start: Expression::Number(0),
                    end: Expression::Number(7),
                    step: None,
                    body: Box::new(Statement::Assignment {
                        lhs: vec![Expression::VectorAccess {
                            base: Box::new(Expression::variable("V")),
                            index: Box::new(Expression::variable("I")),
                        }],
                        rhs: vec![Expression::binary(
                            BinaryOperator::Mul,
                            Expression::variable("I"),
                            Expression::variable("I"),
                        )],
                    }),
                    constants: ForConstants::default(),
                },
                Statement::Resultis {
                    value: Expression::VectorAccess {
                        base: Box::new(Expression::variable("V")),
                        index: Box::new(Expression::Number(3)),
                    },
                    from_send: false,
                },
            ],
        }));
        assert_eq!(run(p), 9);
    }

    /// Packed constructor and accessors: PAIR(7, 42).
    #[test]
    fn pair_lanes_roundtrip() {
        let access = |lane| Expression::PackedAccess {
            shape: PackedShape::Pair,
            base: Box::new(Expression::variable("P")),
            lane,
        };
        let mut p = Program::new();
        p.declarations.push(start_routine(Statement::Block {
            declarations: vec![Declaration::Let {
                names: vec!["P".into()],
                initializers: vec![Expression::PackedConstruct {
                    shape: PackedShape::Pair,
                    operands: vec![Expression::Number(7), Expression::Number(42)],
                }],
                is_float: false,
                is_retained: false,
                explicit_type: None,
            }],
            statements: vec![Statement::Resultis {
                // first + second * 100 observes both lanes in one word.
                value: Expression::binary(
                    BinaryOperator::Add,
                    access(0),
                    Expression::binary(
                        BinaryOperator::Mul,
                        access(1),
                        Expression::Number(100),
                    ),
                ),
                from_send: false,
            }],
        }));
        assert_eq!(run(p), 7 + 42 * 100);
    }
}
