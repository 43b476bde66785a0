//! The fixed-order pass pipeline.
//!
//! Order is part of the compiler's contract:
//! manifest resolution → global-initializer hoisting → symbol table
//! construction → analyzer → CREATE reorder → short-circuit lowering →
//! method inlining → constant folding → strength reduction → LICM →
//! retain analysis → liveness. Each pass consumes an owned `Program` and
//! returns an owned one; no shared mutable state crosses a phase boundary.

use crate::fold::ConstantFolding;
use crate::globals::GlobalInitializerHoisting;
use crate::inline::MethodInlining;
use crate::licm::LoopInvariantCodeMotion;
use crate::manifest::ManifestResolution;
use crate::reorder::CreateMethodReorder;
use crate::retain::RetainAnalysis;
use crate::shortcircuit::ShortCircuitLowering;
use crate::strength::StrengthReduction;
use crate::symbols_builder::SymbolTableBuilder;
use core_analysis::{Analyzer, AnalysisInfo, Cfg, ClassTableError, LivenessAnalysis};
use core_ast::{Declaration, Program, print};
use core_symbols::{SymbolError, SymbolTable};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info_span, trace};

#[derive(Debug, Error)]
pub enum PassError {
    #[error("{} symbol error(s); first: {}", .0.len(), .0[0])]
    Symbols(Vec<SymbolError>),
    #[error(transparent)]
    Classes(#[from] ClassTableError),
}

/// Everything the code generator needs from the front half of the pipeline.
pub struct PipelineOutput {
    pub program: Program,
    pub analysis: AnalysisInfo,
    pub global_manifests: HashMap<String, i64>,
    /// Per-function liveness results keyed by function name.
    pub liveness: HashMap<String, LivenessAnalysis>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Dump the printed tree after each pass at trace level.
    pub trace_passes: bool,
}

pub fn run_pipeline(
    program: Program,
    symbols: &mut SymbolTable,
    options: PipelineOptions,
) -> Result<PipelineOutput, PassError> {
    let trace_tree = |pass: &str, p: &Program| {
        if options.trace_passes {
            trace!(target: "passes", pass, tree = %print::print_program(p), "after_pass");
        }
    };

    let (program, global_manifests) = {
        let _span = info_span!("pass", name = "manifest").entered();
        ManifestResolution::new().apply(program)
    };
    trace_tree("manifest", &program);

    let program = {
        let _span = info_span!("pass", name = "global_init").entered();
        GlobalInitializerHoisting::apply(program)
    };
    trace_tree("global_init", &program);

    {
        let _span = info_span!("pass", name = "symbols").entered();
        SymbolTableBuilder::build(&program, symbols).map_err(PassError::Symbols)?;
    }

    let analysis = {
        let _span = info_span!("pass", name = "analyzer").entered();
        Analyzer::analyze(&program, symbols)?
    };

    let program = {
        let _span = info_span!("pass", name = "create_reorder").entered();
        CreateMethodReorder::apply(program, &analysis.classes)
    };
    trace_tree("create_reorder", &program);

    let program = {
        let _span = info_span!("pass", name = "shortcircuit").entered();
        ShortCircuitLowering::apply(program)
    };
    trace_tree("shortcircuit", &program);

    let program = {
        let _span = info_span!("pass", name = "inline").entered();
        MethodInlining::new(&analysis, symbols).apply(program)
    };
    trace_tree("inline", &program);

    let program = {
        let _span = info_span!("pass", name = "fold").entered();
        ConstantFolding::new(symbols).apply(program)
    };
    trace_tree("fold", &program);

    let program = {
        let _span = info_span!("pass", name = "strength").entered();
        StrengthReduction::new().apply(program)
    };
    trace_tree("strength", &program);

    let program = {
        let _span = info_span!("pass", name = "licm").entered();
        LoopInvariantCodeMotion::new(symbols).apply(program)
    };
    trace_tree("licm", &program);

    {
        let _span = info_span!("pass", name = "retain").entered();
        RetainAnalysis::apply(&program, symbols);
    }

    let liveness = {
        let _span = info_span!("pass", name = "liveness").entered();
        let mut map = HashMap::new();
        let mut analyze = |name: &str, body: core_ast::Statement| {
            let cfg = Cfg::build(name, &body);
            map.insert(name.to_string(), LivenessAnalysis::run(&cfg, symbols));
        };
        for decl in &program.declarations {
            match decl {
                Declaration::Routine { name, body, .. } => analyze(name, body.clone()),
                // A function body is an expression; liveness sees it as the
                // value returned from a single-statement body.
                Declaration::Function { name, body, .. } => analyze(
                    name,
                    core_ast::Statement::Resultis {
                        value: body.clone(),
                        from_send: false,
                    },
                ),
                Declaration::Class(class) => {
                    for member in &class.members {
                        match &member.declaration {
                            Declaration::Routine { name, body, .. } => {
                                analyze(&format!("{}::{}", class.name, name), body.clone())
                            }
                            Declaration::Function { name, body, .. } => analyze(
                                &format!("{}::{}", class.name, name),
                                core_ast::Statement::Resultis {
                                    value: body.clone(),
                                    from_send: false,
                                },
                            ),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        map
    };

    debug!(
        target: "passes",
        functions = liveness.len(),
        symbols = symbols.len(),
        "pipeline_complete"
    );

    Ok(PipelineOutput {
        program,
        analysis,
        global_manifests,
        liveness,
    })
}
