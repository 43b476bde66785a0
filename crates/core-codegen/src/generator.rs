//! Code generation: one ordered instruction stream per function plus the
//! data-section records for literals and vtables.
//!
//! Calling convention is AAPCS: integer arguments in x0–x7, floats in
//! d0–d7, result in x0/d0. Frames are laid out `[locals][callee saves]`
//! below a `stp x29, x30` frame record, and the stack pointer stays
//! 16-byte aligned at every call boundary. Variables that liveness marked
//! as live across calls are promoted to callee-saved registers; everything
//! else lives in frame slots addressed off SP.

use crate::data::DataGenerator;
use crate::neon::NeonReducerRegistry;
use crate::regs::{RegClass, RegisterManager};
use crate::scanner::scan_external_functions;
use core_analysis::infer::{InferCtx, infer_expr_type};
use core_analysis::{AnalysisInfo, LivenessAnalysis};
use core_ast::{
    Declaration, Expression, Program, RepeatMode, Statement, VarType,
};
use core_encoder::encode;
use core_encoder::instruction::{Cond, Instruction, Opcode, Segment};
use core_encoder::stream::{InstructionStream, LabelAllocator};
use core_encoder::is_fp_reg;
use core_runtime::RuntimeManager;
use core_symbols::{Symbol, SymbolKind, SymbolLocation, SymbolTable};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// List cell tags used by `FOREACH` filters and `TYPEOF`.
pub const TAG_INT: i64 = 1;
pub const TAG_STRING: i64 = 2;
pub const TAG_FLOAT: i64 = 3;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("unknown variable '{name}' in {function}")]
    UnknownVariable { name: String, function: String },
    #[error("invalid .{lane} access on {shape}")]
    InvalidLaneAccess { shape: &'static str, lane: u8 },
    #[error("register pool exhausted in {0}")]
    RegisterExhausted(String),
    #[error("'{0}' used outside a loop")]
    MisplacedLoopControl(&'static str),
    #[error("case constant does not fold to an integer")]
    UnresolvedCaseConstant,
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("unknown member '{member}' on class {class}")]
    UnknownMember { class: String, member: String },
    #[error("internal: {0}")]
    Internal(String),
}

pub struct GeneratedModule {
    pub code: Vec<Instruction>,
    pub rodata: Vec<Instruction>,
    pub data: Vec<Instruction>,
    pub externals: BTreeSet<String>,
}

pub struct CodeGenerator<'c> {
    pub(crate) symbols: &'c mut SymbolTable,
    pub(crate) analysis: &'c AnalysisInfo,
    liveness: &'c HashMap<String, LivenessAnalysis>,
    pub(crate) runtime: &'c RuntimeManager,
    pub(crate) labels: LabelAllocator,
    neon: NeonReducerRegistry,
    pub(crate) data: DataGenerator,
    data_segment: Vec<Instruction>,
    global_labels: HashMap<String, String>,
    pub(crate) code: InstructionStream,
    pub(crate) externals: BTreeSet<String>,

    // Per-function state
    pub(crate) regs: RegisterManager,
    pub(crate) function: String,
    frame_total: i64,
    locals_size: i64,
    epilogue: String,
    has_frame_record: bool,
    pub(crate) valof_stack: Vec<(i32, String)>,
    break_stack: Vec<String>,
    loop_stack: Vec<String>,
    endcase_stack: Vec<String>,
    defer_scopes: Vec<Vec<Statement>>,
    float_return: bool,
}

impl<'c> CodeGenerator<'c> {
    pub fn new(
        symbols: &'c mut SymbolTable,
        analysis: &'c AnalysisInfo,
        liveness: &'c HashMap<String, LivenessAnalysis>,
        runtime: &'c RuntimeManager,
    ) -> CodeGenerator<'c> {
        CodeGenerator {
            symbols,
            analysis,
            liveness,
            runtime,
            labels: LabelAllocator::new(),
            neon: NeonReducerRegistry::new(),
            data: DataGenerator::new(),
            data_segment: Vec::new(),
            global_labels: HashMap::new(),
            code: InstructionStream::new(),
            externals: BTreeSet::new(),
            regs: RegisterManager::new(),
            function: String::new(),
            frame_total: 0,
            locals_size: 0,
            epilogue: String::new(),
            has_frame_record: true,
            valof_stack: Vec::new(),
            break_stack: Vec::new(),
            loop_stack: Vec::new(),
            endcase_stack: Vec::new(),
            defer_scopes: Vec::new(),
            float_return: false,
        }
    }

    pub fn generate(mut self, program: &Program) -> Result<GeneratedModule, CodegenError> {
        self.externals = scan_external_functions(program, self.runtime);

        // Vtables and global/static cells first so every label exists.
        for class in self.analysis.classes.iter().collect::<Vec<_>>() {
            self.data.vtable(class);
        }
        for decl in &program.declarations {
            match decl {
                Declaration::GlobalVariable { names, .. } => {
                    for name in names {
                        self.emit_global_cell(name, 0);
                    }
                }
                Declaration::Static { name, initializer } => {
                    let value = initializer.literal_int().unwrap_or(0) as u64;
                    self.emit_global_cell(name, value);
                }
                Declaration::Global { slots } => {
                    for (name, _) in slots {
                        self.emit_global_cell(name, 0);
                    }
                }
                _ => {}
            }
        }

        let mut saw_start = false;
        for decl in &program.declarations {
            match decl {
                Declaration::Function {
                    name,
                    parameters,
                    body,
                    flags,
                } => {
                    self.gen_function(name, parameters, Body::Expr(body), None, flags.is_float)?;
                }
                Declaration::Routine {
                    name,
                    parameters,
                    body,
                    ..
                } => {
                    saw_start |= name == "START";
                    self.gen_function(name, parameters, Body::Stmt(body), None, false)?;
                }
                Declaration::Class(class) => {
                    for member in &class.members {
                        match &member.declaration {
                            Declaration::Function {
                                name,
                                parameters,
                                body,
                                flags,
                            } => self.gen_function(
                                &format!("{}::{}", class.name, name),
                                parameters,
                                Body::Expr(body),
                                Some(&class.name),
                                flags.is_float,
                            )?,
                            Declaration::Routine {
                                name,
                                parameters,
                                body,
                                ..
                            } => self.gen_function(
                                &format!("{}::{}", class.name, name),
                                parameters,
                                Body::Stmt(body),
                                Some(&class.name),
                                false,
                            )?,
                            _ => {}
                        }
                    }
                }
                Declaration::Label { name, statement } => {
                    self.code.define_label(name.clone());
                    self.gen_stmt(statement)?;
                }
                _ => {}
            }
        }

        // Top-level statements become START when the program has none.
        if !program.statements.is_empty() && !saw_start {
            let body = Statement::Compound(program.statements.clone());
            self.gen_function("START", &[], Body::Stmt(&body), None, false)?;
        }

        debug!(
            target: "codegen",
            instructions = self.code.len(),
            externals = self.externals.len(),
            "module_generated"
        );
        Ok(GeneratedModule {
            code: self.code.into_instructions(),
            rodata: self.data.into_records(),
            data: self.data_segment,
            externals: self.externals,
        })
    }

    fn emit_global_cell(&mut self, name: &str, initial: u64) {
        let label = format!("glob_{name}");
        let mut def = Instruction::label_def(label.clone());
        def.segment = Segment::Data;
        self.data_segment.push(def);
        for mut rec in Instruction::data64(initial, Segment::Data) {
            rec.nopeep = true;
            self.data_segment.push(rec);
        }
        self.global_labels.insert(name.to_string(), label);
        if let Some(sym) = self.symbols.lookup_mut(name, "") {
            sym.location = SymbolLocation::Data(self.data_segment.len() * 4);
        }
    }

    // --- Function-level generation ---------------------------------------

    fn gen_function(
        &mut self,
        name: &str,
        parameters: &[String],
        body: Body<'_>,
        class: Option<&str>,
        is_float: bool,
    ) -> Result<(), CodegenError> {
        trace!(target: "codegen", function = name, "gen_function_start");
        self.regs = RegisterManager::new();
        self.function = name.to_string();
        self.epilogue = self.labels.fresh(&format!("{}_epilogue", sanitize(name)));
        self.valof_stack.clear();
        self.break_stack.clear();
        self.loop_stack.clear();
        self.endcase_stack.clear();
        self.defer_scopes.clear();
        self.defer_scopes.push(Vec::new());
        self.float_return = is_float;

        // Methods receive the object as a hidden first parameter.
        let mut all_params: Vec<String> = Vec::new();
        if class.is_some() {
            all_params.push("SELF".to_string());
            if self.symbols.lookup_in_function("SELF", name).is_none() {
                let mut sym = Symbol::new("SELF", SymbolKind::Parameter, VarType::POINTER_TO_OBJECT);
                sym.function_name = name.to_string();
                sym.class_name = class.map(Into::into);
                let _ = self.symbols.declare(sym);
            }
        }
        all_params.extend(parameters.iter().cloned());

        // Promote call-crossing variables to callee-saved registers.
        let candidates = self
            .liveness
            .get(name)
            .map(|lv| lv.callee_saved_candidates())
            .unwrap_or_default();
        let metrics = self.analysis.metrics_for(name);
        let is_leaf = metrics.map(|m| !m.has_calls).unwrap_or(false);
        if class.is_some() && !is_leaf {
            // Member access needs SELF after any call inside the method.
            self.regs.bind_variable("SELF", RegClass::Int);
        }
        for candidate in &candidates {
            let class_of = self
                .symbols
                .lookup_in_function(candidate, name)
                .map(|s| {
                    if s.ty.is_float_like() {
                        RegClass::Float
                    } else {
                        RegClass::Int
                    }
                })
                .unwrap_or(RegClass::Int);
            if self.regs.bind_variable(candidate, class_of).is_none() {
                // Pool dry: the variable stays frame-resident, which is the
                // spill fallback.
                warn!(target: "codegen.regs", var = %candidate, "promotion_spilled");
            }
        }

        // Frame slots for every non-promoted symbol of this function.
        let mut local_names: Vec<String> = self
            .symbols
            .function_symbols(name)
            .filter(|s| s.is_local())
            .map(|s| s.name.clone())
            .collect();
        local_names.sort();
        let mut offset: i64 = 0;
        for var in &local_names {
            if self.regs.binding(var).is_some() {
                continue;
            }
            if let Some(sym) = self.symbols.lookup_mut(var, name) {
                sym.location = SymbolLocation::Stack(offset as i32);
                offset += 8;
            }
        }
        // Spill slots claimed during generation live above the locals;
        // reserve a fixed belt for them.
        let spill_belt = 4 * 8;
        self.locals_size = (offset + spill_belt + 15) & !15;

        // The body is generated into a detached stream first: registers
        // acquired mid-body still land in the callee-saved set the
        // prologue must preserve.
        let outer = std::mem::take(&mut self.code);

        // Park incoming arguments.
        let mut int_arg = 0i32;
        let mut fp_arg = 0i32;
        for param in &all_params {
            let ty = self
                .symbols
                .lookup_in_function(param, name)
                .map(|s| s.ty)
                .unwrap_or(VarType::UNKNOWN);
            let incoming = if ty.is_float_like() {
                let r = core_encoder::FP_REG_BASE + fp_arg;
                fp_arg += 1;
                r
            } else {
                let r = int_arg;
                int_arg += 1;
                r
            };
            if let Some(bound) = self.regs.binding(param) {
                self.code.push(encode::mov_reg(bound, incoming));
            } else if let Some(off) = self.stack_offset(param) {
                if is_fp_reg(incoming) {
                    self.code.push(encode::str_fp(incoming, 31, off));
                } else {
                    self.code.push(encode::str_imm(incoming, 31, off));
                }
            }
        }

        // Body, then function-scope cleanups, then the default return
        // value (cleanups call into the runtime and clobber x0).
        match body {
            Body::Expr(e) => {
                let r = self.gen_expr(e)?;
                let r = self.protect_value(r)?;
                let cleanups = self.defer_scopes.pop().unwrap_or_default();
                self.emit_cleanups(&cleanups)?;
                self.move_to_return(r);
                self.regs.release(r);
            }
            Body::Stmt(s) => {
                self.gen_stmt(s)?;
                let cleanups = self.defer_scopes.pop().unwrap_or_default();
                self.emit_cleanups(&cleanups)?;
                // Routines return 0 by default.
                self.code.push(encode::movz(0, 0, 0));
            }
        }

        let body = std::mem::replace(&mut self.code, outer);

        // Now the callee-saved set is final; size the frame and wrap the
        // body with prologue and epilogue.
        let callee_saves = self.regs.used_callee_saved();
        let callee_area = ((callee_saves.len() as i64 * 8) + 15) & !15;
        self.frame_total = self.locals_size + callee_area;
        self.has_frame_record = !is_leaf || self.frame_total > 0;

        self.code.define_label(name.to_string());
        if self.has_frame_record {
            self.code.push(encode::stp_pre(29, 30, 31, -16));
            self.code.push(encode::mov_sp(29, 31));
        }
        if self.frame_total > 0 {
            self.code.push(encode::sub_imm(31, 31, self.frame_total));
        }
        for (i, reg) in callee_saves.iter().enumerate() {
            let slot = self.locals_size + (i as i64) * 8;
            if is_fp_reg(*reg) {
                self.code.push(encode::str_fp(*reg, 31, slot));
            } else {
                self.code.push(encode::str_imm(*reg, 31, slot));
            }
        }
        self.code.extend(body.into_instructions());
        self.code.define_label(self.epilogue.clone());
        for (i, reg) in callee_saves.iter().enumerate() {
            let slot = self.locals_size + (i as i64) * 8;
            if is_fp_reg(*reg) {
                self.code.push(encode::ldr_fp(*reg, 31, slot));
            } else {
                self.code.push(encode::ldr_imm(*reg, 31, slot));
            }
        }
        if self.frame_total > 0 {
            self.code.push(encode::add_imm(31, 31, self.frame_total));
        }
        if self.has_frame_record {
            self.code.push(encode::ldp_post(29, 30, 31, 16));
        }
        self.code.push(encode::ret());
        trace!(target: "codegen", function = name, "gen_function_done");
        Ok(())
    }

    fn move_to_return(&mut self, reg: i32) {
        if self.float_return {
            let target = core_encoder::FP_REG_BASE; // d0
            if is_fp_reg(reg) {
                if reg != target {
                    self.code.push(encode::fmov_reg(target, reg));
                }
            } else {
                self.code.push(encode::scvtf(target, reg));
            }
        } else if is_fp_reg(reg) {
            self.code.push(encode::fmov_d_to_x(0, reg));
        } else if reg != 0 {
            self.code.push(encode::mov_reg(0, reg));
        }
    }

    // --- Shared helpers ---------------------------------------------------

    pub(crate) fn infer_ctx(&self) -> InferCtx<'_> {
        InferCtx {
            symbols: &*self.symbols,
            classes: &self.analysis.classes,
            function: &self.function,
        }
    }

    pub(crate) fn expr_class(&self, e: &Expression) -> RegClass {
        if infer_expr_type(e, &self.infer_ctx()).is_float_like() {
            RegClass::Float
        } else {
            RegClass::Int
        }
    }

    pub(crate) fn acquire(&mut self, class: RegClass) -> Result<i32, CodegenError> {
        self.acquire_biased(class, false)
    }

    pub(crate) fn acquire_biased(
        &mut self,
        class: RegClass,
        callee_saved: bool,
    ) -> Result<i32, CodegenError> {
        self.regs
            .acquire(class, callee_saved)
            .ok_or_else(|| CodegenError::RegisterExhausted(self.function.clone()))
    }

    pub(crate) fn stack_offset(&self, name: &str) -> Option<i64> {
        match self
            .symbols
            .lookup_in_function(name, &self.function)
            .map(|s| s.location)
        {
            Some(SymbolLocation::Stack(off)) => Some(off as i64),
            _ => None,
        }
    }

    pub(crate) fn global_label(&self, name: &str) -> Option<&String> {
        self.global_labels.get(name)
    }

    /// Load a PC-relative address into `dst` via ADRP + ADD; the peephole
    /// fuses the pair to ADR when the target is near. Data-segment labels
    /// live in a separate allocation outside ADR range, so those pairs are
    /// exempted from fusion.
    pub(crate) fn load_address(&mut self, dst: i32, label: &str) {
        let far = label.starts_with("glob_");
        let mut page = encode::adrp(dst, label.to_string());
        let mut low = encode::add_lo12(dst, dst, label.to_string());
        if far {
            page.nopeep = true;
            low.nopeep = true;
        }
        self.code.push(page);
        self.code.push(low);
    }

    /// Call a runtime routine through its veneer.
    pub(crate) fn call_runtime(&mut self, name: &str) {
        self.externals.insert(name.to_string());
        self.code
            .push(encode::bl(core_link_veneer_label(name)));
    }

    // --- Statements -------------------------------------------------------

    pub(crate) fn gen_stmt(&mut self, s: &Statement) -> Result<(), CodegenError> {
        match s {
            Statement::Assignment { lhs, rhs } => self.gen_assignment(lhs, rhs),
            Statement::RoutineCall(e) => {
                let r = self.gen_expr(e)?;
                self.regs.release(r);
                Ok(())
            }
            Statement::If {
                condition,
                then_branch,
            } => {
                let end = self.labels.fresh("if_end");
                self.branch_if_false(condition, &end)?;
                self.gen_stmt(then_branch)?;
                self.code.define_label(end);
                Ok(())
            }
            Statement::Unless {
                condition,
                then_branch,
            } => {
                let end = self.labels.fresh("unless_end");
                self.branch_if_true(condition, &end)?;
                self.gen_stmt(then_branch)?;
                self.code.define_label(end);
                Ok(())
            }
            Statement::Test {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_l = self.labels.fresh("test_else");
                let end = self.labels.fresh("test_end");
                self.branch_if_false(condition, &else_l)?;
                self.gen_stmt(then_branch)?;
                self.code.push(encode::b(end.clone()));
                self.code.define_label(else_l);
                self.gen_stmt(else_branch)?;
                self.code.define_label(end);
                Ok(())
            }
            Statement::While { condition, body } => {
                let head = self.labels.fresh("while_head");
                let exit = self.labels.fresh("while_exit");
                self.code.define_label(head.clone());
                self.branch_if_false(condition, &exit)?;
                self.enter_loop(exit.clone(), head.clone());
                self.gen_stmt(body)?;
                self.exit_loop();
                self.code.push(encode::b(head));
                self.code.define_label(exit);
                Ok(())
            }
            Statement::Until { condition, body } => {
                let head = self.labels.fresh("until_head");
                let exit = self.labels.fresh("until_exit");
                self.code.define_label(head.clone());
                self.branch_if_true(condition, &exit)?;
                self.enter_loop(exit.clone(), head.clone());
                self.gen_stmt(body)?;
                self.exit_loop();
                self.code.push(encode::b(head));
                self.code.define_label(exit);
                Ok(())
            }
            Statement::Repeat { body, mode } => {
                let head = self.labels.fresh("repeat_head");
                let exit = self.labels.fresh("repeat_exit");
                self.code.define_label(head.clone());
                self.enter_loop(exit.clone(), head.clone());
                self.gen_stmt(body)?;
                self.exit_loop();
                match mode {
                    RepeatMode::Forever => self.code.push(encode::b(head)),
                    RepeatMode::While(c) => self.branch_if_true(c, &head)?,
                    RepeatMode::Until(c) => self.branch_if_false(c, &head)?,
                }
                self.code.define_label(exit);
                Ok(())
            }
            Statement::For {
                var,
                start,
                end,
                step,
                body,
                constants,
            } => self.gen_for(var, start, end, step.as_ref(), body, *constants),
            Statement::ForEach {
                value_var,
                tag_var,
                collection,
                body,
                element_filter,
            } => self.gen_foreach(value_var, tag_var.as_deref(), collection, body, *element_filter),
            Statement::Switchon { subject, body } => self.gen_switchon(subject, body),
            Statement::Case { body, .. } | Statement::Default { body } => {
                // Labels were placed by the enclosing SWITCHON scan; only
                // the body is generated here, falling through like the
                // source semantics require.
                self.gen_stmt(body)
            }
            Statement::Goto(e) => {
                if let Expression::Variable(v) = e {
                    self.code.push(encode::b(v.name.clone()));
                    Ok(())
                } else {
                    let r = self.gen_expr(e)?;
                    self.code.push(encode::br(r));
                    self.regs.release(r);
                    Ok(())
                }
            }
            Statement::Return => {
                self.emit_all_scope_cleanups()?;
                self.code.push(encode::movz(0, 0, 0));
                self.code.push(encode::b(self.epilogue.clone()));
                Ok(())
            }
            Statement::Finish { syscall, args } => {
                if let Some(number) = syscall {
                    for (i, a) in args.iter().enumerate().take(8) {
                        let r = self.gen_expr(a)?;
                        self.code.push(encode::mov_reg(i as i32, r));
                        self.regs.release(r);
                    }
                    let n = self.gen_expr(number)?;
                    self.code.push(encode::mov_reg(8, n));
                    self.regs.release(n);
                    self.code.push(encode::svc(0));
                } else {
                    self.call_runtime("FINISH");
                }
                Ok(())
            }
            Statement::Break => {
                let target = self
                    .break_stack
                    .last()
                    .cloned()
                    .ok_or(CodegenError::MisplacedLoopControl("BREAK"))?;
                self.code.push(encode::b(target));
                Ok(())
            }
            Statement::Loop => {
                let target = self
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or(CodegenError::MisplacedLoopControl("LOOP"))?;
                self.code.push(encode::b(target));
                Ok(())
            }
            Statement::Endcase => {
                let target = self
                    .endcase_stack
                    .last()
                    .cloned()
                    .ok_or(CodegenError::MisplacedLoopControl("ENDCASE"))?;
                self.code.push(encode::b(target));
                Ok(())
            }
            Statement::Resultis { value, .. } => {
                if let Some((result_reg, end_label)) = self.valof_stack.last().cloned() {
                    let r = self.gen_expr(value)?;
                    if is_fp_reg(result_reg) {
                        if is_fp_reg(r) {
                            self.code.push(encode::fmov_reg(result_reg, r));
                        } else {
                            self.code.push(encode::scvtf(result_reg, r));
                        }
                    } else if is_fp_reg(r) {
                        self.code.push(encode::fmov_d_to_x(result_reg, r));
                    } else if r != result_reg {
                        self.code.push(encode::mov_reg(result_reg, r));
                    }
                    self.regs.release(r);
                    self.code.push(encode::b(end_label));
                } else {
                    // Cleanups call into the runtime and would clobber x0,
                    // so the result rides out in a callee-saved register.
                    let r = self.gen_expr(value)?;
                    let r = self.protect_value(r)?;
                    self.emit_all_scope_cleanups()?;
                    self.move_to_return(r);
                    self.regs.release(r);
                    self.code.push(encode::b(self.epilogue.clone()));
                }
                Ok(())
            }
            Statement::Compound(stmts) => {
                for st in stmts {
                    self.gen_stmt(st)?;
                }
                Ok(())
            }
            Statement::Block {
                declarations,
                statements,
            } => self.gen_block(declarations, statements),
            Statement::StringDecl { name, size } => {
                // 8-byte length word plus 32-bit cells, padded.
                let sz = self.gen_expr(size)?;
                let bytes = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(bytes, sz, 2));
                self.code.push(encode::add_imm(bytes, bytes, 24));
                self.code.push(encode::mov_reg(0, bytes));
                self.regs.release(bytes);
                self.regs.release(sz);
                self.call_runtime("BCPL_ALLOC");
                let result = self.acquire(RegClass::Int)?;
                self.code.push(encode::mov_reg(result, 0));
                self.store_to_variable(name, result)?;
                self.regs.release(result);
                Ok(())
            }
            Statement::LabelTarget { name } => {
                self.code.define_label(name.clone());
                Ok(())
            }
            Statement::ConditionalBranch {
                condition,
                value,
                target,
            } => {
                let r = self.gen_expr(value)?;
                self.code.push(encode::cmp_imm(r, 0));
                self.regs.release(r);
                let cond = Cond::from_comparison(condition)
                    .ok_or_else(|| CodegenError::Internal(format!("bad condition '{condition}'")))?;
                self.code.push(encode::b_cond(cond, target.clone()));
                Ok(())
            }
            Statement::Brk => {
                self.code.push(encode::brk(0));
                Ok(())
            }
            Statement::Free(e) => {
                let r = self.gen_expr(e)?;
                self.code.push(encode::mov_reg(0, r));
                self.regs.release(r);
                self.call_runtime("FREEVEC");
                Ok(())
            }
            Statement::Defer(inner) => {
                if let Some(scope) = self.defer_scopes.last_mut() {
                    scope.push((**inner).clone());
                }
                Ok(())
            }
            // Ownership annotations generate no code; retain analysis has
            // already adjusted the symbols.
            Statement::Retain { .. } | Statement::Remanage { .. } => Ok(()),
            Statement::Reduction {
                reducer,
                result_var,
                source,
            } => self.gen_scalar_reduction(*reducer, result_var, source),
            Statement::ReductionLoop {
                result_var,
                vector_name,
                reducer,
                ..
            } => {
                let source = Expression::variable(vector_name.clone());
                self.gen_scalar_reduction(*reducer, result_var, &source)
            }
            Statement::PairwiseReductionLoop {
                intrinsic,
                result_var,
                vector_a,
                vector_b,
            } => self.gen_pairwise_reduction(intrinsic, result_var, vector_a, vector_b),
        }
    }

    fn enter_loop(&mut self, break_target: String, loop_target: String) {
        self.break_stack.push(break_target);
        self.loop_stack.push(loop_target);
    }

    fn exit_loop(&mut self) {
        self.break_stack.pop();
        self.loop_stack.pop();
    }

    fn gen_block(
        &mut self,
        declarations: &[Declaration],
        statements: &[Statement],
    ) -> Result<(), CodegenError> {
        self.defer_scopes.push(Vec::new());
        for decl in declarations {
            if let Declaration::Let {
                names,
                initializers,
                ..
            } = decl
            {
                for (name, init) in names.iter().zip(initializers) {
                    let r = self.gen_expr(init)?;
                    self.store_to_variable(name, r)?;
                    self.regs.release(r);
                    let owns = self
                        .symbols
                        .lookup_in_function(name, &self.function)
                        .map(|s| s.owns_heap_memory)
                        .unwrap_or(false);
                    if owns
                        && let Some(scope) = self.defer_scopes.last_mut()
                    {
                        scope.push(Statement::Free(Expression::variable(name.clone())));
                    }
                }
            }
        }
        for s in statements {
            self.gen_stmt(s)?;
        }
        let cleanups = self.defer_scopes.pop().unwrap_or_default();
        self.emit_cleanups(&cleanups)
    }

    /// Deferred actions run in reverse declaration order.
    fn emit_cleanups(&mut self, cleanups: &[Statement]) -> Result<(), CodegenError> {
        for s in cleanups.iter().rev() {
            self.gen_stmt(s)?;
        }
        Ok(())
    }

    /// Early function exits run every open scope's cleanups, innermost
    /// first, without popping them (the scopes remain active for the
    /// fallthrough path).
    fn emit_all_scope_cleanups(&mut self) -> Result<(), CodegenError> {
        let scopes: Vec<Vec<Statement>> = self.defer_scopes.iter().rev().cloned().collect();
        for scope in scopes {
            self.emit_cleanups(&scope)?;
        }
        Ok(())
    }

    fn gen_assignment(
        &mut self,
        lhs: &[Expression],
        rhs: &[Expression],
    ) -> Result<(), CodegenError> {
        // Parallel semantics: all sources evaluate before any store.
        let mut values = Vec::with_capacity(rhs.len());
        for (i, r) in rhs.iter().enumerate() {
            let mut reg = self.gen_expr(r)?;
            let later_call = rhs[i + 1..].iter().any(expr_contains_call);
            if later_call && !crate::regs::is_callee_saved(reg) {
                let safe = self.acquire_biased(self.expr_class(r), true)?;
                if is_fp_reg(safe) != is_fp_reg(reg) {
                    return Err(CodegenError::Internal("register class mismatch".into()));
                }
                self.code.push(encode::mov_reg(safe, reg));
                self.regs.release(reg);
                reg = safe;
            }
            values.push(reg);
        }
        for (l, value) in lhs.iter().zip(values.iter()) {
            self.store_to_lhs(l, *value)?;
        }
        for v in values {
            self.regs.release(v);
        }
        Ok(())
    }

    fn gen_for(
        &mut self,
        var: &str,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
        body: &Statement,
        constants: core_ast::ForConstants,
    ) -> Result<(), CodegenError> {
        let head = self.labels.fresh("for_head");
        let exit = self.labels.fresh("for_exit");
        let step_l = self.labels.fresh("for_step");

        let s = self.gen_expr(start)?;
        self.store_to_variable(var, s)?;
        self.regs.release(s);

        // A non-constant bound is evaluated once into a callee-saved
        // register; a constant bound compares as an immediate.
        let end_reg = if constants.end.is_none() {
            let r = self.gen_expr(end)?;
            let safe = self.acquire_biased(RegClass::Int, true)?;
            self.code.push(encode::mov_reg(safe, r));
            self.regs.release(r);
            Some(safe)
        } else {
            None
        };

        let descending = constants.step.is_some_and(|s| s < 0);
        self.code.define_label(head.clone());
        let v = self.load_variable(var)?;
        match (constants.end, end_reg) {
            (Some(e), _) if core_encoder::can_encode_as_immediate(Opcode::Cmp, e) => {
                self.code.push(encode::cmp_imm(v, e));
            }
            (Some(e), _) => {
                let tmp = self.acquire(RegClass::Int)?;
                self.code.extend(encode::load_immediate(tmp, e));
                self.code.push(encode::cmp_reg(v, tmp));
                self.regs.release(tmp);
            }
            (None, Some(r)) => self.code.push(encode::cmp_reg(v, r)),
            (None, None) => unreachable!("non-constant end always caches a register"),
        }
        self.regs.release(v);
        self.code.push(encode::b_cond(
            if descending { Cond::Lt } else { Cond::Gt },
            exit.clone(),
        ));

        self.enter_loop(exit.clone(), step_l.clone());
        self.gen_stmt(body)?;
        self.exit_loop();

        self.code.define_label(step_l);
        let v = self.load_variable(var)?;
        match constants.step {
            Some(k) if (0..=0xFFF).contains(&k) => {
                self.code.push(encode::add_imm(v, v, k));
            }
            Some(k) if (-0xFFF..0).contains(&k) => {
                self.code.push(encode::sub_imm(v, v, -k));
            }
            _ => {
                let st = match step {
                    Some(e) => self.gen_expr(e)?,
                    None => {
                        let r = self.acquire(RegClass::Int)?;
                        self.code.push(encode::movz(r, 1, 0));
                        r
                    }
                };
                self.code.push(encode::add_reg(v, v, st));
                self.regs.release(st);
            }
        }
        self.store_to_variable(var, v)?;
        self.regs.release(v);
        self.code.push(encode::b(head));
        self.code.define_label(exit);
        if let Some(r) = end_reg {
            self.regs.release(r);
        }
        Ok(())
    }

    fn gen_foreach(
        &mut self,
        value_var: &str,
        tag_var: Option<&str>,
        collection: &Expression,
        body: &Statement,
        element_filter: VarType,
    ) -> Result<(), CodegenError> {
        let col_ty = infer_expr_type(collection, &self.infer_ctx());
        if col_ty.contains(VarType::LIST) {
            self.gen_foreach_list(value_var, tag_var, collection, body, element_filter)
        } else {
            self.gen_foreach_vector(value_var, collection, body)
        }
    }

    fn gen_foreach_list(
        &mut self,
        value_var: &str,
        tag_var: Option<&str>,
        collection: &Expression,
        body: &Statement,
        element_filter: VarType,
    ) -> Result<(), CodegenError> {
        let head = self.labels.fresh("foreach_head");
        let skip = self.labels.fresh("foreach_skip");
        let exit = self.labels.fresh("foreach_exit");

        let first = self.gen_expr(collection)?;
        let cursor = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(cursor, first));
        self.regs.release(first);

        self.code.define_label(head.clone());
        self.code.push(encode::cbz(cursor, exit.clone()));

        // Cell layout: [tag][head][tail].
        let tag = self.acquire(RegClass::Int)?;
        self.code.push(encode::ldr_imm(tag, cursor, 0));
        if let Some(t) = tag_var {
            self.store_to_variable(t, tag)?;
        }
        if !element_filter.is_unknown() {
            let expected = element_tag(element_filter);
            self.code.push(encode::cmp_imm(tag, expected));
            self.code.push(encode::b_cond(Cond::Ne, skip.clone()));
        }
        self.regs.release(tag);

        let value = self.acquire(RegClass::Int)?;
        self.code.push(encode::ldr_imm(value, cursor, 8));
        self.store_to_variable(value_var, value)?;
        self.regs.release(value);

        self.enter_loop(exit.clone(), skip.clone());
        self.gen_stmt(body)?;
        self.exit_loop();

        self.code.define_label(skip);
        self.code.push(encode::ldr_imm(cursor, cursor, 16));
        self.code.push(encode::b(head));
        self.code.define_label(exit);
        self.regs.release(cursor);
        Ok(())
    }

    fn gen_foreach_vector(
        &mut self,
        value_var: &str,
        collection: &Expression,
        body: &Statement,
    ) -> Result<(), CodegenError> {
        let head = self.labels.fresh("foreach_head");
        let step = self.labels.fresh("foreach_step");
        let exit = self.labels.fresh("foreach_exit");

        let base_raw = self.gen_expr(collection)?;
        let base = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(base, base_raw));
        self.regs.release(base_raw);

        // Element count sits below the base pointer.
        let len = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::ldur(len, base, -8));
        let idx = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::movz(idx, 0, 0));

        self.code.define_label(head.clone());
        self.code.push(encode::cmp_reg(idx, len));
        self.code.push(encode::b_cond(Cond::Ge, exit.clone()));

        let value = self.acquire(RegClass::Int)?;
        self.code.push(encode::ldr_scaled(value, base, idx));
        self.store_to_variable(value_var, value)?;
        self.regs.release(value);

        self.enter_loop(exit.clone(), step.clone());
        self.gen_stmt(body)?;
        self.exit_loop();

        self.code.define_label(step);
        self.code.push(encode::add_imm(idx, idx, 1));
        self.code.push(encode::b(head));
        self.code.define_label(exit);
        self.regs.release(idx);
        self.regs.release(len);
        self.regs.release(base);
        Ok(())
    }

    fn gen_switchon(
        &mut self,
        subject: &Expression,
        body: &Statement,
    ) -> Result<(), CodegenError> {
        let exit = self.labels.fresh("switch_exit");

        // Collect the arms up front to build the dispatch sequence.
        let mut arms: Vec<(Option<i64>, String)> = Vec::new();
        let mut default_label: Option<String> = None;
        let mut case_labels: Vec<String> = Vec::new();
        collect_cases(body, &mut |case| {
            let label = self.labels.fresh("case");
            case_labels.push(label.clone());
            match case {
                CaseArm::Case(value) => arms.push((value, label)),
                CaseArm::Default => default_label = Some(label),
            }
        });

        let subj = self.gen_expr(subject)?;
        for (value, label) in &arms {
            let value = value.ok_or(CodegenError::UnresolvedCaseConstant)?;
            if core_encoder::can_encode_as_immediate(Opcode::Cmp, value) {
                self.code.push(encode::cmp_imm(subj, value));
            } else {
                let tmp = self.acquire(RegClass::Int)?;
                self.code.extend(encode::load_immediate(tmp, value));
                self.code.push(encode::cmp_reg(subj, tmp));
                self.regs.release(tmp);
            }
            self.code.push(encode::b_cond(Cond::Eq, label.clone()));
        }
        self.regs.release(subj);
        self.code
            .push(encode::b(default_label.unwrap_or_else(|| exit.clone())));

        // Generate the body; each case/default defines its label in order.
        self.endcase_stack.push(exit.clone());
        let mut next_label = case_labels.into_iter();
        self.gen_switch_body(body, &mut next_label)?;
        self.endcase_stack.pop();
        self.code.define_label(exit);
        Ok(())
    }

    fn gen_switch_body(
        &mut self,
        s: &Statement,
        labels: &mut impl Iterator<Item = String>,
    ) -> Result<(), CodegenError> {
        match s {
            Statement::Case { body, .. } | Statement::Default { body } => {
                let label = labels
                    .next()
                    .ok_or_else(|| CodegenError::Internal("case label underflow".into()))?;
                self.code.define_label(label);
                self.gen_switch_body(body, labels)
            }
            Statement::Compound(stmts) => {
                for st in stmts {
                    self.gen_switch_body(st, labels)?;
                }
                Ok(())
            }
            Statement::Block {
                declarations,
                statements,
            } if declarations.is_empty() => {
                for st in statements {
                    self.gen_switch_body(st, labels)?;
                }
                Ok(())
            }
            other => self.gen_stmt(other),
        }
    }

    fn gen_scalar_reduction(
        &mut self,
        reducer: core_ast::Reducer,
        result_var: &str,
        source: &Expression,
    ) -> Result<(), CodegenError> {
        use core_ast::Reducer;
        let head = self.labels.fresh("reduce_head");
        let exit = self.labels.fresh("reduce_exit");

        let base_raw = self.gen_expr(source)?;
        let base = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(base, base_raw));
        self.regs.release(base_raw);

        let len = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::ldur(len, base, -8));
        let acc = self.acquire_biased(RegClass::Int, true)?;
        // Seed with the first element (empty vectors reduce to zero).
        self.code.push(encode::movz(acc, 0, 0));
        self.code.push(encode::cbz(len, exit.clone()));
        self.code.push(encode::ldr_imm(acc, base, 0));
        let idx = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::movz(idx, 1, 0));

        self.code.define_label(head.clone());
        self.code.push(encode::cmp_reg(idx, len));
        self.code.push(encode::b_cond(Cond::Ge, exit.clone()));
        let elem = self.acquire(RegClass::Int)?;
        self.code.push(encode::ldr_scaled(elem, base, idx));
        match reducer {
            Reducer::Sum => self.code.push(encode::add_reg(acc, acc, elem)),
            Reducer::Min | Reducer::Max => {
                let keep = self.labels.fresh("reduce_keep");
                self.code.push(encode::cmp_reg(elem, acc));
                let cond = if reducer == Reducer::Min {
                    Cond::Ge
                } else {
                    Cond::Le
                };
                self.code.push(encode::b_cond(cond, keep.clone()));
                self.code.push(encode::mov_reg(acc, elem));
                self.code.define_label(keep);
            }
        }
        self.regs.release(elem);
        self.code.push(encode::add_imm(idx, idx, 1));
        self.code.push(encode::b(head));
        self.code.define_label(exit);
        self.store_to_variable(result_var, acc)?;
        self.regs.release(idx);
        self.regs.release(acc);
        self.regs.release(len);
        self.regs.release(base);
        Ok(())
    }

    fn gen_pairwise_reduction(
        &mut self,
        intrinsic: &str,
        result_var: &str,
        vector_a: &str,
        vector_b: &str,
    ) -> Result<(), CodegenError> {
        let ty = self
            .symbols
            .lookup_in_function(vector_a, &self.function)
            .map(|s| s.ty)
            .unwrap_or(VarType::UNKNOWN);
        let token = crate::neon::value_type_token(ty);
        let mut used_fallback = false;
        let Some(reducer) = self
            .neon
            .find_with_fallback(intrinsic, token, &mut used_fallback)
            .cloned()
        else {
            // Scalar single-element fallback keeps semantics when no
            // encoder matches the arrangement.
            let reducer = if intrinsic.contains("vpmin") {
                core_ast::Reducer::Min
            } else if intrinsic.contains("vpmax") {
                core_ast::Reducer::Max
            } else {
                core_ast::Reducer::Sum
            };
            let source = Expression::variable(vector_a.to_string());
            return self.gen_scalar_reduction(reducer, result_var, &source);
        };

        let memory_operands = matches!(token, "VEC8" | "FVEC8" | "OCT" | "FOCT");
        let va = self.acquire(RegClass::Float)?;
        let vb = self.acquire(RegClass::Float)?;
        let vd = self.acquire(RegClass::Float)?;
        if memory_operands {
            let pa = self.load_variable(vector_a)?;
            self.code.push(encode::ldr_q(va, pa, 0));
            self.regs.release(pa);
            let pb = self.load_variable(vector_b)?;
            self.code.push(encode::ldr_q(vb, pb, 0));
            self.regs.release(pb);
        } else {
            // PAIR/FPAIR/FQUAD values are packed 64-bit words.
            let ra = self.load_variable(vector_a)?;
            self.code.push(encode::fmov_x_to_d(va, ra));
            self.regs.release(ra);
            let rb = self.load_variable(vector_b)?;
            self.code.push(encode::fmov_x_to_d(vb, rb));
            self.regs.release(rb);
        }
        self.code
            .push((reducer.encoder)(vd, va, vb, reducer.arrangement));
        if memory_operands {
            let pr = self.load_variable(result_var)?;
            self.code.push(encode::str_q(vd, pr, 0));
            self.regs.release(pr);
        } else {
            let out = self.acquire(RegClass::Int)?;
            self.code.push(encode::fmov_d_to_x(out, vd));
            self.store_to_variable(result_var, out)?;
            self.regs.release(out);
        }
        self.regs.release(vd);
        self.regs.release(vb);
        self.regs.release(va);
        Ok(())
    }
}

enum Body<'a> {
    Expr(&'a Expression),
    Stmt(&'a Statement),
}

enum CaseArm {
    Case(Option<i64>),
    Default,
}

fn collect_cases(s: &Statement, f: &mut impl FnMut(CaseArm)) {
    match s {
        Statement::Case {
            constant,
            resolved_value,
            body,
        } => {
            let value = resolved_value.or_else(|| constant.literal_int());
            f(CaseArm::Case(value));
            collect_cases(body, f);
        }
        Statement::Default { body } => {
            f(CaseArm::Default);
            collect_cases(body, f);
        }
        Statement::Compound(stmts) => {
            for st in stmts {
                collect_cases(st, f);
            }
        }
        Statement::Block { statements, .. } => {
            for st in statements {
                collect_cases(st, f);
            }
        }
        _ => {}
    }
}

pub(crate) fn element_tag(filter: VarType) -> i64 {
    if filter.contains(VarType::FLOAT) {
        TAG_FLOAT
    } else if filter.contains(VarType::STRING) {
        TAG_STRING
    } else {
        TAG_INT
    }
}

pub(crate) fn expr_contains_call(e: &Expression) -> bool {
    let mut found = false;
    core_ast::visit::visit_expr(e, &mut |e| {
        if matches!(
            e,
            Expression::Call { .. }
                | Expression::SysCall { .. }
                | Expression::New { .. }
                | Expression::SuperMethodCall { .. }
                | Expression::VecAllocation { .. }
                | Expression::FVecAllocation { .. }
                | Expression::PairsAllocation { .. }
                | Expression::FPairsAllocation { .. }
                | Expression::StringAllocation { .. }
                | Expression::List { .. }
        ) {
            found = true;
        }
    });
    found
}

fn sanitize(name: &str) -> String {
    name.replace("::", "_")
}

/// Veneer naming shared with the linker; duplicated here so the codegen
/// crate does not depend on the linker.
fn core_link_veneer_label(symbol: &str) -> String {
    format!("veneer_{symbol}")
}
