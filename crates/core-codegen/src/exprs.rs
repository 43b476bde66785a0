//! Expression code generation.
//!
//! `gen_expr` returns a register holding the value; the caller owns it and
//! releases it when done. Values whose producers are calls are copied out
//! of x0/d0 immediately. When the right operand of a binary expression
//! contains a call, the left value is parked in a callee-saved register
//! first so the call cannot clobber it — the instruction-level face of the
//! call-interval analysis.

use crate::data::packed_literal_image;
use crate::generator::{CodeGenerator, CodegenError, expr_contains_call};
use crate::regs::{RegClass, is_callee_saved};
use core_analysis::infer::infer_expr_type;
use core_ast::{
    BinaryOperator, Expression, PackedShape, UnaryOperator, VarType,
};
use core_encoder::encode;
use core_encoder::instruction::{Cond, Opcode};
use core_encoder::{FP_REG_BASE, ZR, is_fp_reg};
use core_symbols::{SymbolKind, SymbolLocation};

impl<'c> CodeGenerator<'c> {
    /// Direct access register for a variable: the bound register itself for
    /// promoted variables (no copy), a loaded scratch otherwise. Callers
    /// that mutate the result must store it back through
    /// `store_to_variable`.
    pub(crate) fn load_variable(&mut self, name: &str) -> Result<i32, CodegenError> {
        if let Some(reg) = self.regs.binding(name) {
            return Ok(reg);
        }
        let sym = self
            .symbols
            .lookup_in_function(name, &self.function)
            .cloned()
            .ok_or_else(|| CodegenError::UnknownVariable {
                name: name.to_string(),
                function: self.function.clone(),
            })?;
        let float = sym.ty.is_float_like();
        match sym.location {
            SymbolLocation::Stack(off) => {
                let r = self.acquire(if float { RegClass::Float } else { RegClass::Int })?;
                if float {
                    self.code.push(encode::ldr_fp(r, 31, off as i64));
                } else {
                    self.code.push(encode::ldr_imm(r, 31, off as i64));
                }
                Ok(r)
            }
            SymbolLocation::Absolute(v) => {
                let r = self.acquire(RegClass::Int)?;
                self.code.extend(encode::load_immediate(r, v));
                Ok(r)
            }
            _ if sym.kind == SymbolKind::MemberVar => {
                let class = sym.class_name.clone().ok_or_else(|| {
                    CodegenError::Internal(format!("member '{name}' without class"))
                })?;
                let info = self
                    .analysis
                    .classes
                    .get(&class)
                    .ok_or_else(|| CodegenError::UnknownClass(class.clone()))?;
                let offset = info
                    .member(name)
                    .ok_or_else(|| CodegenError::UnknownMember {
                        class: class.clone(),
                        member: name.to_string(),
                    })?
                    .offset;
                let this = self.load_variable("SELF")?;
                let r = self.acquire(if float { RegClass::Float } else { RegClass::Int })?;
                if float {
                    self.code.push(encode::ldr_fp(r, this, offset as i64));
                } else {
                    self.code.push(encode::ldr_imm(r, this, offset as i64));
                }
                self.regs.release(this);
                Ok(r)
            }
            _ if self.global_label(name).is_some() => {
                let label = self.global_label(name).cloned().unwrap();
                let addr = self.acquire(RegClass::Int)?;
                self.load_address(addr, &label);
                let r = if float {
                    let r = self.acquire(RegClass::Float)?;
                    self.code.push(encode::ldr_fp(r, addr, 0));
                    self.regs.release(addr);
                    r
                } else {
                    self.code.push(encode::ldr_imm(addr, addr, 0));
                    addr
                };
                Ok(r)
            }
            // Function-like symbols evaluate to their code address.
            _ if sym.kind.is_function_like() => {
                let r = self.acquire(RegClass::Int)?;
                self.load_address(r, name);
                Ok(r)
            }
            _ => Err(CodegenError::UnknownVariable {
                name: name.to_string(),
                function: self.function.clone(),
            }),
        }
    }

    pub(crate) fn store_to_variable(&mut self, name: &str, value: i32) -> Result<(), CodegenError> {
        if let Some(bound) = self.regs.binding(name) {
            if bound != value {
                if is_fp_reg(bound) == is_fp_reg(value) {
                    self.code.push(encode::mov_reg(bound, value));
                } else if is_fp_reg(bound) {
                    self.code.push(encode::fmov_x_to_d(bound, value));
                } else {
                    self.code.push(encode::fmov_d_to_x(bound, value));
                }
            }
            return Ok(());
        }
        let sym = self
            .symbols
            .lookup_in_function(name, &self.function)
            .cloned()
            .ok_or_else(|| CodegenError::UnknownVariable {
                name: name.to_string(),
                function: self.function.clone(),
            })?;
        match sym.location {
            SymbolLocation::Stack(off) => {
                if is_fp_reg(value) {
                    self.code.push(encode::str_fp(value, 31, off as i64));
                } else {
                    self.code.push(encode::str_imm(value, 31, off as i64));
                }
                Ok(())
            }
            _ if sym.kind == SymbolKind::MemberVar => {
                let this = self.load_variable("SELF")?;
                let class = sym.class_name.clone().unwrap_or_default();
                let offset = self
                    .analysis
                    .classes
                    .get(&class)
                    .and_then(|c| c.member(name))
                    .ok_or_else(|| CodegenError::UnknownMember {
                        class,
                        member: name.to_string(),
                    })?
                    .offset;
                if is_fp_reg(value) {
                    self.code.push(encode::str_fp(value, this, offset as i64));
                } else {
                    self.code.push(encode::str_imm(value, this, offset as i64));
                }
                self.regs.release(this);
                Ok(())
            }
            _ if self.global_label(name).is_some() => {
                let label = self.global_label(name).cloned().unwrap();
                let addr = self.acquire(RegClass::Int)?;
                self.load_address(addr, &label);
                if is_fp_reg(value) {
                    self.code.push(encode::str_fp(value, addr, 0));
                } else {
                    self.code.push(encode::str_imm(value, addr, 0));
                }
                self.regs.release(addr);
                Ok(())
            }
            _ => Err(CodegenError::UnknownVariable {
                name: name.to_string(),
                function: self.function.clone(),
            }),
        }
    }

    pub(crate) fn store_to_lhs(
        &mut self,
        lhs: &Expression,
        value: i32,
    ) -> Result<(), CodegenError> {
        match lhs {
            Expression::Variable(v) => self.store_to_variable(&v.name, value),
            Expression::VectorAccess { base, index } => {
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                self.code.push(encode::str_scaled(value, b, i));
                self.regs.release(i);
                self.regs.release(b);
                Ok(())
            }
            Expression::CharIndirection { base, index } => {
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                let addr = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(addr, i, 2));
                self.code.push(encode::add_reg(addr, b, addr));
                self.code.push(encode::str_word(value, addr, 8));
                self.regs.release(addr);
                self.regs.release(i);
                self.regs.release(b);
                Ok(())
            }
            Expression::FloatVectorIndirection { base, index } => {
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                let addr = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(addr, i, 3));
                self.code.push(encode::add_reg(addr, b, addr));
                let v = self.to_float(value)?;
                self.code.push(encode::str_fp(v, addr, 0));
                if v != value {
                    self.regs.release(v);
                }
                self.regs.release(addr);
                self.regs.release(i);
                self.regs.release(b);
                Ok(())
            }
            Expression::MemberAccess { object, member } => {
                let obj = self.gen_expr(object)?;
                let offset = self.member_offset(object, member)?;
                if is_fp_reg(value) {
                    self.code.push(encode::str_fp(value, obj, offset));
                } else {
                    self.code.push(encode::str_imm(value, obj, offset));
                }
                self.regs.release(obj);
                Ok(())
            }
            Expression::Unary {
                op: UnaryOperator::Indirection,
                operand,
            } => {
                let addr = self.gen_expr(operand)?;
                self.code.push(encode::str_imm(value, addr, 0));
                self.regs.release(addr);
                Ok(())
            }
            Expression::BitfieldAccess {
                base,
                start_bit,
                width,
            } => {
                // Read-modify-write through a scratch; literal fields use
                // BFI directly.
                if let (Expression::Number(lsb), Expression::Number(w)) =
                    (start_bit.as_ref(), width.as_ref())
                {
                    let Expression::Variable(var) = base.as_ref() else {
                        return Err(CodegenError::Internal(
                            "bitfield store needs a variable base".into(),
                        ));
                    };
                    let current = self.load_variable(&var.name)?;
                    self.code
                        .push(encode::bfi(current, value, *lsb as u32, *w as u32));
                    self.store_to_variable(&var.name, current)?;
                    self.regs.release(current);
                    Ok(())
                } else {
                    Err(CodegenError::Internal(
                        "bitfield store requires constant position and width".into(),
                    ))
                }
            }
            other => Err(CodegenError::Internal(format!(
                "unsupported assignment target: {other:?}"
            ))),
        }
    }

    fn member_offset(&self, object: &Expression, member: &str) -> Result<i64, CodegenError> {
        let class = self
            .resolve_object_class(object)
            .ok_or_else(|| CodegenError::Internal(format!("untyped object for .{member}")))?;
        let info = self
            .analysis
            .classes
            .get(&class)
            .ok_or_else(|| CodegenError::UnknownClass(class.clone()))?;
        Ok(info
            .member(member)
            .ok_or_else(|| CodegenError::UnknownMember {
                class,
                member: member.to_string(),
            })?
            .offset as i64)
    }

    pub(crate) fn resolve_object_class(&self, object: &Expression) -> Option<String> {
        match object {
            Expression::New { class_name, .. } => Some(class_name.clone()),
            Expression::Variable(v) => self
                .symbols
                .lookup_in_function(&v.name, &self.function)
                .and_then(|s| s.class_name.clone()),
            Expression::MemberAccess { .. } => None,
            _ => None,
        }
    }

    // --- Conditions -------------------------------------------------------

    pub(crate) fn branch_if_false(
        &mut self,
        cond: &Expression,
        target: &str,
    ) -> Result<(), CodegenError> {
        self.branch_on(cond, target, false)
    }

    pub(crate) fn branch_if_true(
        &mut self,
        cond: &Expression,
        target: &str,
    ) -> Result<(), CodegenError> {
        self.branch_on(cond, target, true)
    }

    fn branch_on(
        &mut self,
        cond: &Expression,
        target: &str,
        when_true: bool,
    ) -> Result<(), CodegenError> {
        if let Expression::Binary { op, lhs, rhs } = cond
            && op.is_comparison()
        {
            let cc = comparison_cond(*op);
            let cc = if when_true { cc } else { cc.invert() };
            let float = self.expr_class(lhs) == RegClass::Float
                || self.expr_class(rhs) == RegClass::Float;
            let l = self.gen_protected(lhs, rhs)?;
            let r = self.gen_expr(rhs)?;
            if float {
                let lf = self.to_float(l)?;
                let rf = self.to_float(r)?;
                self.code.push(encode::fcmp(lf, rf));
                self.release_if_new(lf, l);
                self.release_if_new(rf, r);
            } else {
                self.code.push(encode::cmp_reg(l, r));
            }
            self.regs.release(r);
            self.regs.release(l);
            self.code.push(encode::b_cond(cc, target.to_string()));
            return Ok(());
        }
        let r = self.gen_expr(cond)?;
        let rr = if is_fp_reg(r) {
            let bits = self.acquire(RegClass::Int)?;
            self.code.push(encode::fmov_d_to_x(bits, r));
            self.regs.release(r);
            bits
        } else {
            r
        };
        if when_true {
            self.code.push(encode::cbnz(rr, target.to_string()));
        } else {
            self.code.push(encode::cbz(rr, target.to_string()));
        }
        self.regs.release(rr);
        Ok(())
    }

    // --- Expressions ------------------------------------------------------

    /// Evaluate `e`, parking the result in a callee-saved register when
    /// `peer` contains a call that would clobber caller-saved scratches.
    fn gen_protected(
        &mut self,
        e: &Expression,
        peer: &Expression,
    ) -> Result<i32, CodegenError> {
        let r = self.gen_expr(e)?;
        if expr_contains_call(peer) && !is_callee_saved(r) {
            let class = if is_fp_reg(r) {
                RegClass::Float
            } else {
                RegClass::Int
            };
            let safe = self.acquire_biased(class, true)?;
            self.code.push(encode::mov_reg(safe, r));
            self.regs.release(r);
            return Ok(safe);
        }
        Ok(r)
    }

    /// Unconditionally park a value in a callee-saved register.
    pub(crate) fn protect_value(&mut self, r: i32) -> Result<i32, CodegenError> {
        if is_callee_saved(r) {
            return Ok(r);
        }
        let class = if is_fp_reg(r) {
            RegClass::Float
        } else {
            RegClass::Int
        };
        let safe = self.acquire_biased(class, true)?;
        self.code.push(encode::mov_reg(safe, r));
        self.regs.release(r);
        Ok(safe)
    }

    fn release_if_new(&mut self, converted: i32, original: i32) {
        if converted != original {
            self.regs.release(converted);
        }
    }

    /// Ensure a value is in an FP register (integers convert).
    pub(crate) fn to_float(&mut self, r: i32) -> Result<i32, CodegenError> {
        if is_fp_reg(r) {
            return Ok(r);
        }
        let f = self.acquire(RegClass::Float)?;
        self.code.push(encode::scvtf(f, r));
        Ok(f)
    }

    pub(crate) fn gen_expr(&mut self, e: &Expression) -> Result<i32, CodegenError> {
        match e {
            Expression::Number(n) => {
                let r = self.acquire(RegClass::Int)?;
                self.code.extend(encode::load_immediate(r, *n));
                Ok(r)
            }
            Expression::CharLit(c) => {
                let r = self.acquire(RegClass::Int)?;
                self.code.extend(encode::load_immediate(r, *c));
                Ok(r)
            }
            Expression::Boolean(b) => {
                let r = self.acquire(RegClass::Int)?;
                self.code
                    .extend(encode::load_immediate(r, if *b { -1 } else { 0 }));
                Ok(r)
            }
            Expression::Null => {
                let r = self.acquire(RegClass::Int)?;
                self.code.push(encode::movz(r, 0, 0));
                Ok(r)
            }
            Expression::Float(v) => {
                let label = self.data.float_literal(*v);
                let addr = self.acquire(RegClass::Int)?;
                self.load_address(addr, &label);
                let f = self.acquire(RegClass::Float)?;
                self.code.push(encode::ldr_fp(f, addr, 0));
                self.regs.release(addr);
                Ok(f)
            }
            Expression::StringLit(s) => {
                let label = self.data.string_literal(s);
                let r = self.acquire(RegClass::Int)?;
                self.load_address(r, &label);
                Ok(r)
            }
            Expression::Variable(v) => {
                // A fresh copy so expression arithmetic can never corrupt a
                // promoted variable's home register.
                let direct = self.load_variable(&v.name)?;
                if self.regs.binding(&v.name) == Some(direct) {
                    let class = if is_fp_reg(direct) {
                        RegClass::Float
                    } else {
                        RegClass::Int
                    };
                    let copy = self.acquire(class)?;
                    self.code.push(encode::mov_reg(copy, direct));
                    Ok(copy)
                } else {
                    Ok(direct)
                }
            }
            Expression::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            Expression::Unary { op, operand } => self.gen_unary(*op, operand),
            Expression::VectorAccess { base, index } => {
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                let r = self.acquire(RegClass::Int)?;
                self.code.push(encode::ldr_scaled(r, b, i));
                self.regs.release(i);
                self.regs.release(b);
                Ok(r)
            }
            Expression::CharIndirection { base, index } => {
                // 32-bit character cells after the 64-bit length word.
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                let addr = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(addr, i, 2));
                self.code.push(encode::add_reg(addr, b, addr));
                self.code.push(encode::ldr_word(addr, addr, 8));
                self.regs.release(i);
                self.regs.release(b);
                Ok(addr)
            }
            Expression::FloatVectorIndirection { base, index } => {
                let b = self.gen_expr(base)?;
                let i = self.gen_expr(index)?;
                let addr = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(addr, i, 3));
                self.code.push(encode::add_reg(addr, b, addr));
                let f = self.acquire(RegClass::Float)?;
                self.code.push(encode::ldr_fp(f, addr, 0));
                self.regs.release(addr);
                self.regs.release(i);
                self.regs.release(b);
                Ok(f)
            }
            Expression::BitfieldAccess {
                base,
                start_bit,
                width,
            } => self.gen_bitfield_read(base, start_bit, width),
            Expression::Call { callee, args } => self.gen_call(callee, args),
            Expression::SysCall { number, args } => {
                for (i, a) in args.iter().enumerate().take(8) {
                    let r = self.gen_expr(a)?;
                    self.code.push(encode::mov_reg(i as i32, r));
                    self.regs.release(r);
                }
                let n = self.gen_expr(number)?;
                self.code.push(encode::mov_reg(8, n));
                self.regs.release(n);
                self.code.push(encode::svc(0));
                let r = self.acquire(RegClass::Int)?;
                self.code.push(encode::mov_reg(r, 0));
                Ok(r)
            }
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let class = self.expr_class(then_expr);
                let result = self.acquire_biased(class, true)?;
                let else_l = self.labels.fresh("cond_else");
                let end = self.labels.fresh("cond_end");
                self.branch_if_false(condition, &else_l)?;
                let t = self.gen_expr(then_expr)?;
                self.move_into(result, t);
                self.regs.release(t);
                self.code.push(encode::b(end.clone()));
                self.code.define_label(else_l);
                let f = self.gen_expr(else_expr)?;
                self.move_into(result, f);
                self.regs.release(f);
                self.code.define_label(end);
                Ok(result)
            }
            Expression::Valof { body } => self.gen_valof(body, RegClass::Int),
            Expression::FloatValof { body } => self.gen_valof(body, RegClass::Float),
            Expression::VecAllocation { size } => self.gen_alloc_call("GETVEC", size),
            Expression::FVecAllocation { size } => self.gen_alloc_call("FGETVEC", size),
            Expression::PairsAllocation { size } | Expression::FPairsAllocation { size } => {
                self.gen_alloc_call("GETVEC", size)
            }
            Expression::StringAllocation { size } => {
                let sz = self.gen_expr(size)?;
                let bytes = self.acquire(RegClass::Int)?;
                self.code.push(encode::lsl_imm(bytes, sz, 2));
                self.code.push(encode::add_imm(bytes, bytes, 24));
                self.code.push(encode::mov_reg(0, bytes));
                self.regs.release(bytes);
                self.regs.release(sz);
                self.call_runtime("BCPL_ALLOC");
                let r = self.acquire(RegClass::Int)?;
                self.code.push(encode::mov_reg(r, 0));
                Ok(r)
            }
            Expression::Table { entries, is_float } => {
                if let Some(label) = self.data.table_literal(entries, *is_float) {
                    let r = self.acquire(RegClass::Int)?;
                    self.load_address(r, &label);
                    Ok(r)
                } else {
                    self.gen_vec_initializer(entries, *is_float)
                }
            }
            Expression::VecInitializer { entries, is_float } => {
                self.gen_vec_initializer(entries, *is_float)
            }
            Expression::List { entries } => self.gen_list(entries),
            Expression::New {
                class_name,
                args,
                binding,
            } => self.gen_new(class_name, args, binding.as_deref()),
            Expression::MemberAccess { object, member } => {
                let offset = self.member_offset(object, member)?;
                let float = infer_expr_type(e, &self.infer_ctx()).is_float_like();
                let obj = self.gen_expr(object)?;
                let r = if float {
                    let r = self.acquire(RegClass::Float)?;
                    self.code.push(encode::ldr_fp(r, obj, offset));
                    r
                } else {
                    let r = self.acquire(RegClass::Int)?;
                    self.code.push(encode::ldr_imm(r, obj, offset));
                    r
                };
                self.regs.release(obj);
                Ok(r)
            }
            Expression::SuperMethodCall { member, args } => {
                self.gen_super_call(member, args)
            }
            Expression::SuperMethodAccess { member } => {
                // Passthrough: the parent method's code address, no
                // dispatch.
                let label = self.super_method_label(member)?;
                let r = self.acquire(RegClass::Int)?;
                self.load_address(r, &label);
                Ok(r)
            }
            Expression::PackedConstruct { shape, operands } => {
                self.gen_packed_construct(*shape, operands)
            }
            Expression::PackedAccess { shape, base, lane } => {
                self.gen_packed_access(*shape, base, *lane)
            }
            Expression::LaneAccess { base, lane } => self.gen_lane_access(base, lane),
        }
    }

    fn move_into(&mut self, dst: i32, src: i32) {
        if dst == src {
            return;
        }
        match (is_fp_reg(dst), is_fp_reg(src)) {
            (true, true) | (false, false) => self.code.push(encode::mov_reg(dst, src)),
            (true, false) => self.code.push(encode::scvtf(dst, src)),
            (false, true) => self.code.push(encode::fmov_d_to_x(dst, src)),
        }
    }

    fn gen_valof(&mut self, body: &core_ast::Statement, class: RegClass) -> Result<i32, CodegenError> {
        let result = self.acquire_biased(class, true)?;
        let end = self.labels.fresh("valof_end");
        self.valof_stack.push((result, end.clone()));
        self.gen_stmt(body)?;
        self.valof_stack.pop();
        self.code.define_label(end);
        Ok(result)
    }

    fn gen_alloc_call(&mut self, symbol: &str, size: &Expression) -> Result<i32, CodegenError> {
        let s = self.gen_expr(size)?;
        self.code.push(encode::mov_reg(0, s));
        self.regs.release(s);
        self.call_runtime(symbol);
        let r = self.acquire(RegClass::Int)?;
        self.code.push(encode::mov_reg(r, 0));
        Ok(r)
    }

    fn gen_vec_initializer(
        &mut self,
        entries: &[Expression],
        is_float: bool,
    ) -> Result<i32, CodegenError> {
        let count = self.acquire(RegClass::Int)?;
        self.code
            .extend(encode::load_immediate(count, entries.len() as i64));
        self.code.push(encode::mov_reg(0, count));
        self.regs.release(count);
        self.call_runtime(if is_float { "FGETVEC" } else { "GETVEC" });
        let base = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(base, 0));
        for (i, entry) in entries.iter().enumerate() {
            let v = self.gen_expr(entry)?;
            let offset = (i as i64) * 8;
            if is_fp_reg(v) {
                self.code.push(encode::str_fp(v, base, offset));
            } else {
                self.code.push(encode::str_imm(v, base, offset));
            }
            self.regs.release(v);
        }
        Ok(base)
    }

    fn gen_list(&mut self, entries: &[Expression]) -> Result<i32, CodegenError> {
        // Build cons cells back to front: [tag][head][tail].
        let tail = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::movz(tail, 0, 0));
        for entry in entries.iter().rev() {
            let tag = match self.expr_class(entry) {
                RegClass::Float => crate::generator::TAG_FLOAT,
                RegClass::Int => match entry {
                    Expression::StringLit(_) => crate::generator::TAG_STRING,
                    _ => crate::generator::TAG_INT,
                },
            };
            let value = self.gen_expr(entry)?;
            let value = self.protect_value(value)?;
            let bits = if is_fp_reg(value) {
                let b = self.acquire_biased(RegClass::Int, true)?;
                self.code.push(encode::fmov_d_to_x(b, value));
                self.regs.release(value);
                b
            } else {
                value
            };
            self.code.push(encode::movz(0, 24, 0));
            self.call_runtime("BCPL_ALLOC");
            let cell = self.acquire(RegClass::Int)?;
            self.code.push(encode::mov_reg(cell, 0));
            let tag_reg = self.acquire(RegClass::Int)?;
            self.code.extend(encode::load_immediate(tag_reg, tag));
            self.code.push(encode::str_imm(tag_reg, cell, 0));
            self.regs.release(tag_reg);
            self.code.push(encode::str_imm(bits, cell, 8));
            self.regs.release(bits);
            self.code.push(encode::str_imm(tail, cell, 16));
            self.code.push(encode::mov_reg(tail, cell));
            self.regs.release(cell);
        }
        Ok(tail)
    }

    fn gen_new(
        &mut self,
        class_name: &str,
        args: &[Expression],
        binding: Option<&str>,
    ) -> Result<i32, CodegenError> {
        let info = self
            .analysis
            .classes
            .get(class_name)
            .ok_or_else(|| CodegenError::UnknownClass(class_name.to_string()))?;
        let size = info.total_size as i64;
        let vtable_label = info.vtable_label();
        let create = info
            .method("CREATE")
            .map(|m| m.qualified_name.clone());

        let sz = self.acquire(RegClass::Int)?;
        self.code.extend(encode::load_immediate(sz, size));
        self.code.push(encode::mov_reg(0, sz));
        self.regs.release(sz);
        self.call_runtime("BCPL_ALLOC");
        let obj = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(obj, 0));

        // Word 0: the vtable pointer.
        let vt = self.acquire(RegClass::Int)?;
        self.load_address(vt, &vtable_label);
        self.code.push(encode::str_imm(vt, obj, 0));
        self.regs.release(vt);

        if let Some(create) = create {
            let mut arg_regs = Vec::new();
            for (i, a) in args.iter().enumerate() {
                let later_call = args[i + 1..].iter().any(expr_contains_call);
                let mut r = self.gen_expr(a)?;
                if later_call {
                    r = self.protect_value(r)?;
                }
                arg_regs.push(r);
            }
            self.code.push(encode::mov_reg(0, obj));
            for (i, r) in arg_regs.iter().enumerate() {
                self.code.push(encode::mov_reg(1 + i as i32, *r));
            }
            for r in arg_regs {
                self.regs.release(r);
            }
            self.code.push(encode::bl(create));
        }

        if let Some(name) = binding {
            self.store_to_variable(name, obj)?;
        }
        Ok(obj)
    }

    fn super_method_label(&self, member: &str) -> Result<String, CodegenError> {
        let class = self
            .symbols
            .lookup_in_function(&self.function, "")
            .and_then(|s| s.class_name.clone())
            .or_else(|| self.function.split("::").next().map(String::from))
            .ok_or_else(|| CodegenError::Internal("SUPER outside a method".into()))?;
        let parent = self
            .analysis
            .classes
            .parent_of(&class)
            .ok_or_else(|| CodegenError::UnknownClass(format!("parent of {class}")))?;
        parent
            .method(member)
            .map(|m| m.qualified_name.clone())
            .ok_or_else(|| CodegenError::UnknownMember {
                class: parent.name.clone(),
                member: member.to_string(),
            })
    }

    fn gen_super_call(
        &mut self,
        member: &str,
        args: &[Expression],
    ) -> Result<i32, CodegenError> {
        let label = self.super_method_label(member)?;
        let this = self.load_variable("SELF")?;
        let safe_this = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(safe_this, this));
        self.regs.release(this);
        let mut arg_regs = Vec::new();
        for (i, a) in args.iter().enumerate() {
            let later_call = args[i + 1..].iter().any(expr_contains_call);
            let mut r = self.gen_expr(a)?;
            if later_call {
                r = self.protect_value(r)?;
            }
            arg_regs.push(r);
        }
        self.code.push(encode::mov_reg(0, safe_this));
        self.regs.release(safe_this);
        for (i, r) in arg_regs.iter().enumerate() {
            self.code.push(encode::mov_reg(1 + i as i32, *r));
        }
        for r in arg_regs {
            self.regs.release(r);
        }
        self.code.push(encode::bl(label));
        let r = self.acquire(RegClass::Int)?;
        self.code.push(encode::mov_reg(r, 0));
        Ok(r)
    }

    fn gen_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
    ) -> Result<i32, CodegenError> {
        // Method call through an object: vtable dispatch unless final.
        if let Expression::MemberAccess { object, member } = callee {
            return self.gen_method_call(object, member, args);
        }

        // Standard-family runtime routines (WRITEF and friends) take every
        // argument in integer registers; float values travel as bit
        // patterns.
        let force_int_args = match callee {
            Expression::Variable(v) => self
                .runtime
                .lookup(&v.name)
                .map(|e| e.family == core_runtime::FunctionFamily::Standard)
                .unwrap_or(false),
            _ => false,
        };

        // Evaluate arguments, protecting earlier values from later calls.
        let mut arg_regs = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let later_call = args[i + 1..].iter().any(expr_contains_call);
            let mut r = self.gen_expr(a)?;
            if later_call {
                r = self.protect_value(r)?;
            }
            arg_regs.push(r);
        }

        // Marshal into the AAPCS argument registers.
        let mut int_slot = 0i32;
        let mut fp_slot = 0i32;
        for r in &arg_regs {
            if is_fp_reg(*r) && force_int_args {
                self.code.push(encode::fmov_d_to_x(int_slot, *r));
                int_slot += 1;
            } else if is_fp_reg(*r) {
                let dst = FP_REG_BASE + fp_slot;
                if *r != dst {
                    self.code.push(encode::fmov_reg(dst, *r));
                }
                fp_slot += 1;
            } else {
                if *r != int_slot {
                    self.code.push(encode::mov_reg(int_slot, *r));
                }
                int_slot += 1;
            }
        }
        for r in arg_regs {
            self.regs.release(r);
        }

        let mut float_result = false;
        match callee {
            Expression::Variable(v) => {
                if self.runtime.is_runtime_symbol(&v.name) {
                    float_result = self
                        .runtime
                        .lookup(&v.name)
                        .map(|e| e.kind.is_float_function())
                        .unwrap_or(false);
                    self.call_runtime(&v.name);
                } else {
                    float_result = self
                        .symbols
                        .lookup_in_function(&v.name, "")
                        .map(|s| s.kind.is_float_function())
                        .unwrap_or(false);
                    self.code.push(encode::bl(v.name.clone()));
                }
            }
            other => {
                let f = self.gen_expr(other)?;
                self.code.push(encode::blr(f));
                self.regs.release(f);
            }
        }

        if float_result {
            let r = self.acquire(RegClass::Float)?;
            self.code.push(encode::fmov_reg(r, FP_REG_BASE));
            Ok(r)
        } else {
            let r = self.acquire(RegClass::Int)?;
            self.code.push(encode::mov_reg(r, 0));
            Ok(r)
        }
    }

    fn gen_method_call(
        &mut self,
        object: &Expression,
        member: &str,
        args: &[Expression],
    ) -> Result<i32, CodegenError> {
        let class = self
            .resolve_object_class(object)
            .ok_or_else(|| CodegenError::Internal(format!("untyped receiver for .{member}()")))?;
        let info = self
            .analysis
            .classes
            .get(&class)
            .ok_or_else(|| CodegenError::UnknownClass(class.clone()))?;
        let method = info
            .method(member)
            .ok_or_else(|| CodegenError::UnknownMember {
                class: class.clone(),
                member: member.to_string(),
            })?
            .clone();

        let obj_raw = self.gen_expr(object)?;
        let obj = self.acquire_biased(RegClass::Int, true)?;
        self.code.push(encode::mov_reg(obj, obj_raw));
        self.regs.release(obj_raw);

        let mut arg_regs = Vec::new();
        for (i, a) in args.iter().enumerate() {
            let later_call = args[i + 1..].iter().any(expr_contains_call);
            let mut r = self.gen_expr(a)?;
            if later_call {
                r = self.protect_value(r)?;
            }
            arg_regs.push(r);
        }
        self.code.push(encode::mov_reg(0, obj));
        for (i, r) in arg_regs.iter().enumerate() {
            self.code.push(encode::mov_reg(1 + i as i32, *r));
        }
        for r in arg_regs {
            self.regs.release(r);
        }

        if method.is_final || !method.is_virtual {
            // Final and non-virtual methods bypass the vtable.
            self.code.push(encode::bl(method.qualified_name.clone()));
        } else {
            let slot = method
                .vtable_slot
                .ok_or_else(|| CodegenError::Internal("virtual method without slot".into()))?;
            let vt = self.acquire(RegClass::Int)?;
            self.code.push(encode::ldr_imm(vt, obj, 0));
            let f = self.acquire(RegClass::Int)?;
            self.code.push(encode::ldr_imm(f, vt, (slot as i64) * 8));
            self.regs.release(vt);
            self.code.push(encode::blr(f));
            self.regs.release(f);
        }
        self.regs.release(obj);

        if method.is_float {
            let r = self.acquire(RegClass::Float)?;
            self.code.push(encode::fmov_reg(r, FP_REG_BASE));
            Ok(r)
        } else {
            let r = self.acquire(RegClass::Int)?;
            self.code.push(encode::mov_reg(r, 0));
            Ok(r)
        }
    }

    fn gen_binary(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<i32, CodegenError> {
        let float = self.expr_class(lhs) == RegClass::Float
            || self.expr_class(rhs) == RegClass::Float;

        if op.is_comparison() {
            let l = self.gen_protected(lhs, rhs)?;
            let r = self.gen_expr(rhs)?;
            if float {
                let lf = self.to_float(l)?;
                let rf = self.to_float(r)?;
                self.code.push(encode::fcmp(lf, rf));
                self.release_if_new(lf, l);
                self.release_if_new(rf, r);
            } else {
                self.code.push(encode::cmp_reg(l, r));
            }
            self.regs.release(r);
            self.regs.release(l);
            let out = self.acquire(RegClass::Int)?;
            self.code.push(encode::csetm(out, comparison_cond(op)));
            return Ok(out);
        }

        if float {
            let l = self.gen_protected(lhs, rhs)?;
            let r = self.gen_expr(rhs)?;
            let lf = self.to_float(l)?;
            let rf = self.to_float(r)?;
            let out = self.acquire(RegClass::Float)?;
            match op {
                BinaryOperator::Add => self.code.push(encode::fadd(out, lf, rf)),
                BinaryOperator::Sub => self.code.push(encode::fsub(out, lf, rf)),
                BinaryOperator::Mul => self.code.push(encode::fmul(out, lf, rf)),
                BinaryOperator::Div => self.code.push(encode::fdiv(out, lf, rf)),
                other => {
                    return Err(CodegenError::Internal(format!(
                        "float operand for integer operator {other:?}"
                    )));
                }
            }
            self.release_if_new(lf, l);
            self.release_if_new(rf, r);
            self.regs.release(r);
            self.regs.release(l);
            return Ok(out);
        }

        // Shift/logical immediates take the short form when they fit.
        if let Expression::Number(n) = rhs {
            match op {
                BinaryOperator::LeftShift if (0..64).contains(n) => {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::lsl_imm(out, l, *n as u32));
                    self.regs.release(l);
                    return Ok(out);
                }
                BinaryOperator::RightShift if (0..64).contains(n) => {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::asr_imm(out, l, *n as u32));
                    self.regs.release(l);
                    return Ok(out);
                }
                BinaryOperator::Add
                    if core_encoder::can_encode_as_immediate(Opcode::Add, *n) =>
                {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::add_imm(out, l, *n));
                    self.regs.release(l);
                    return Ok(out);
                }
                BinaryOperator::Sub
                    if core_encoder::can_encode_as_immediate(Opcode::Sub, *n) =>
                {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::sub_imm(out, l, *n));
                    self.regs.release(l);
                    return Ok(out);
                }
                BinaryOperator::BitwiseAnd
                    if core_encoder::can_encode_as_immediate(Opcode::And, *n) =>
                {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::and_imm(out, l, *n));
                    self.regs.release(l);
                    return Ok(out);
                }
                BinaryOperator::BitwiseOr
                    if core_encoder::can_encode_as_immediate(Opcode::Orr, *n) =>
                {
                    let l = self.gen_expr(lhs)?;
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::orr_imm(out, l, *n));
                    self.regs.release(l);
                    return Ok(out);
                }
                _ => {}
            }
        }

        let l = self.gen_protected(lhs, rhs)?;
        let r = self.gen_expr(rhs)?;
        let out = self.acquire(RegClass::Int)?;
        match op {
            BinaryOperator::Add => self.code.push(encode::add_reg(out, l, r)),
            BinaryOperator::Sub => self.code.push(encode::sub_reg(out, l, r)),
            BinaryOperator::Mul => self.code.push(encode::mul(out, l, r)),
            BinaryOperator::Div => self.code.push(encode::sdiv(out, l, r)),
            BinaryOperator::Rem => {
                // a - (a / b) * b
                let q = self.acquire(RegClass::Int)?;
                self.code.push(encode::sdiv(q, l, r));
                self.code.push(encode::msub(out, q, r, l));
                self.regs.release(q);
            }
            BinaryOperator::LogicalAnd | BinaryOperator::BitwiseAnd => {
                self.code.push(encode::and_reg(out, l, r))
            }
            BinaryOperator::LogicalOr | BinaryOperator::BitwiseOr => {
                self.code.push(encode::orr_reg(out, l, r))
            }
            BinaryOperator::Equivalence => {
                self.code.push(encode::eor_reg(out, l, r));
                self.code.push(encode::mvn(out, out));
            }
            BinaryOperator::NotEquivalence => self.code.push(encode::eor_reg(out, l, r)),
            BinaryOperator::LeftShift => self.code.push(encode::lslv(out, l, r)),
            BinaryOperator::RightShift => self.code.push(encode::asrv(out, l, r)),
            op => {
                return Err(CodegenError::Internal(format!(
                    "operator {op:?} survived lowering"
                )));
            }
        }
        self.regs.release(r);
        self.regs.release(l);
        Ok(out)
    }

    fn gen_unary(
        &mut self,
        op: UnaryOperator,
        operand: &Expression,
    ) -> Result<i32, CodegenError> {
        match op {
            UnaryOperator::Negate => {
                let r = self.gen_expr(operand)?;
                if is_fp_reg(r) {
                    let out = self.acquire(RegClass::Float)?;
                    self.code.push(encode::fneg(out, r));
                    self.regs.release(r);
                    Ok(out)
                } else {
                    let out = self.acquire(RegClass::Int)?;
                    self.code.push(encode::sub_reg(out, ZR, r));
                    self.regs.release(r);
                    Ok(out)
                }
            }
            UnaryOperator::BitwiseNot => {
                let r = self.gen_expr(operand)?;
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::mvn(out, r));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::LogicalNot => {
                let r = self.gen_expr(operand)?;
                self.code.push(encode::cmp_imm(r, 0));
                self.regs.release(r);
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::csetm(out, Cond::Eq));
                Ok(out)
            }
            UnaryOperator::AddressOf => match operand {
                Expression::Variable(v) => {
                    if let Some(off) = self.stack_offset(&v.name) {
                        let out = self.acquire(RegClass::Int)?;
                        self.code.push(encode::add_imm(out, 31, off));
                        Ok(out)
                    } else if let Some(label) = self.global_label(&v.name).cloned() {
                        let out = self.acquire(RegClass::Int)?;
                        self.load_address(out, &label);
                        Ok(out)
                    } else {
                        Err(CodegenError::Internal(format!(
                            "address of register-resident '{}'",
                            v.name
                        )))
                    }
                }
                _ => Err(CodegenError::Internal("address of non-variable".into())),
            },
            UnaryOperator::Indirection => {
                let addr = self.gen_expr(operand)?;
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::ldr_imm(out, addr, 0));
                self.regs.release(addr);
                Ok(out)
            }
            UnaryOperator::FloatConvert => {
                let r = self.gen_expr(operand)?;
                if is_fp_reg(r) {
                    return Ok(r);
                }
                let out = self.acquire(RegClass::Float)?;
                self.code.push(encode::scvtf(out, r));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::IntegerConvert => {
                let r = self.gen_expr(operand)?;
                if !is_fp_reg(r) {
                    return Ok(r);
                }
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::fcvtzs(out, r));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::FloatSqrt => {
                let r = self.gen_expr(operand)?;
                let f = self.to_float(r)?;
                let out = self.acquire(RegClass::Float)?;
                self.code.push(encode::fsqrt(out, f));
                self.release_if_new(f, r);
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::FloatFloor => {
                let r = self.gen_expr(operand)?;
                let f = self.to_float(r)?;
                let out = self.acquire(RegClass::Float)?;
                self.code.push(encode::frintm(out, f));
                self.release_if_new(f, r);
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::FloatTruncate => {
                let r = self.gen_expr(operand)?;
                let f = self.to_float(r)?;
                let out = self.acquire(RegClass::Float)?;
                self.code.push(encode::frintz(out, f));
                self.release_if_new(f, r);
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::LengthOf => {
                let r = self.gen_expr(operand)?;
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::ldur(out, r, -8));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::HeadOf | UnaryOperator::TailOf | UnaryOperator::TailOfNonDestructive => {
                let r = self.gen_expr(operand)?;
                let out = self.acquire(RegClass::Int)?;
                let offset = if op == UnaryOperator::HeadOf { 8 } else { 16 };
                self.code.push(encode::ldr_imm(out, r, offset));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::HeadOfAsFloat => {
                let r = self.gen_expr(operand)?;
                let bits = self.acquire(RegClass::Int)?;
                self.code.push(encode::ldr_imm(bits, r, 8));
                self.regs.release(r);
                let out = self.acquire(RegClass::Float)?;
                self.code.push(encode::fmov_x_to_d(out, bits));
                self.regs.release(bits);
                Ok(out)
            }
            UnaryOperator::TypeOf => {
                let r = self.gen_expr(operand)?;
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::ldr_imm(out, r, 0));
                self.regs.release(r);
                Ok(out)
            }
            UnaryOperator::TypeAsString => {
                let ty = infer_expr_type(operand, &self.infer_ctx());
                let label = self.data.string_literal(ty.display_name());
                let out = self.acquire(RegClass::Int)?;
                self.load_address(out, &label);
                Ok(out)
            }
        }
    }

    fn gen_bitfield_read(
        &mut self,
        base: &Expression,
        start_bit: &Expression,
        width: &Expression,
    ) -> Result<i32, CodegenError> {
        if let (Expression::Number(lsb), Expression::Number(w)) = (start_bit, width)
            && (0..64).contains(lsb)
            && (1..=64 - *lsb).contains(w)
        {
            let b = self.gen_expr(base)?;
            let out = self.acquire(RegClass::Int)?;
            self.code.push(encode::ubfx(out, b, *lsb as u32, *w as u32));
            self.regs.release(b);
            return Ok(out);
        }
        // Runtime field position: (base >> start) & ((1 << width) - 1).
        let b = self.gen_expr(base)?;
        let s = self.gen_expr(start_bit)?;
        let out = self.acquire(RegClass::Int)?;
        self.code.push(encode::lsrv(out, b, s));
        self.regs.release(s);
        self.regs.release(b);
        let w = self.gen_expr(width)?;
        let mask = self.acquire(RegClass::Int)?;
        self.code.push(encode::movz(mask, 1, 0));
        self.code.push(encode::lslv(mask, mask, w));
        self.code.push(encode::sub_imm(mask, mask, 1));
        self.code.push(encode::and_reg(out, out, mask));
        self.regs.release(mask);
        self.regs.release(w);
        Ok(out)
    }

    fn gen_packed_construct(
        &mut self,
        shape: PackedShape,
        operands: &[Expression],
    ) -> Result<i32, CodegenError> {
        let layout = shape.layout();

        // All-literal constructors encode once into rodata and load.
        if packed_literal_image(shape, operands).is_some() {
            let label = self
                .data
                .packed_literal(shape, operands)
                .expect("image checked above");
            let addr = self.acquire(RegClass::Int)?;
            self.load_address(addr, &label);
            if layout.lanes as u32 * layout.lane_bits as u32 > 64 {
                // OCT shapes stay memory-resident; the value is the address.
                return Ok(addr);
            }
            let out = self.acquire(RegClass::Int)?;
            self.code.push(encode::ldr_imm(out, addr, 0));
            self.regs.release(addr);
            return Ok(out);
        }

        if layout.lanes as u32 * layout.lane_bits as u32 > 64 {
            // Runtime OCT/FOCT: a four-word allocation, lanes stored in
            // pairs.
            let alloc = self.acquire(RegClass::Int)?;
            self.code.push(encode::movz(alloc, 4, 0));
            self.code.push(encode::mov_reg(0, alloc));
            self.regs.release(alloc);
            self.call_runtime("GETVEC");
            let base = self.acquire_biased(RegClass::Int, true)?;
            self.code.push(encode::mov_reg(base, 0));
            for (i, lane) in operands.iter().enumerate() {
                let v = self.gen_expr(lane)?;
                let bits = self.lane_bits_of(v, layout.is_float)?;
                let word_off = ((i / 2) * 8) as i64;
                if i % 2 == 0 {
                    self.code.push(encode::str_imm(bits, base, word_off));
                } else {
                    let word = self.acquire(RegClass::Int)?;
                    self.code.push(encode::ldr_imm(word, base, word_off));
                    self.code.push(encode::bfi(word, bits, 32, 32));
                    self.code.push(encode::str_imm(word, base, word_off));
                    self.regs.release(word);
                }
                self.regs.release(bits);
                self.regs.release(v);
            }
            return Ok(base);
        }

        // Register-resident shapes: MOVZ #0 then BFI each lane.
        let out = self.acquire(RegClass::Int)?;
        self.code.push(encode::movz(out, 0, 0));
        for (i, lane) in operands.iter().enumerate() {
            let v = self.gen_expr(lane)?;
            let bits = self.lane_bits_of(v, layout.is_float)?;
            self.code.push(encode::bfi(
                out,
                bits,
                i as u32 * layout.lane_bits as u32,
                layout.lane_bits as u32,
            ));
            self.regs.release(bits);
            self.regs.release(v);
        }
        Ok(out)
    }

    /// Lane bit pattern of a value in an integer register: integers pass
    /// through, floats narrow to single (or half) first.
    fn lane_bits_of(&mut self, v: i32, float_lane: bool) -> Result<i32, CodegenError> {
        if !float_lane {
            if is_fp_reg(v) {
                let out = self.acquire(RegClass::Int)?;
                self.code.push(encode::fcvtzs(out, v));
                return Ok(out);
            }
            let out = self.acquire(RegClass::Int)?;
            self.code.push(encode::mov_reg(out, v));
            return Ok(out);
        }
        let f = if is_fp_reg(v) {
            v
        } else {
            let f = self.acquire(RegClass::Float)?;
            self.code.push(encode::scvtf(f, v));
            f
        };
        let narrowed = self.acquire(RegClass::Float)?;
        self.code.push(encode::fcvt_d_to_s(narrowed, f));
        let out = self.acquire(RegClass::Int)?;
        self.code.push(encode::fmov_s_to_w(out, narrowed));
        self.regs.release(narrowed);
        if f != v {
            self.regs.release(f);
        }
        Ok(out)
    }

    fn gen_packed_access(
        &mut self,
        shape: PackedShape,
        base: &Expression,
        lane: u8,
    ) -> Result<i32, CodegenError> {
        let layout = shape.layout();
        if lane >= layout.lanes {
            return Err(CodegenError::InvalidLaneAccess {
                shape: shape.name(),
                lane,
            });
        }
        let lsb = lane as u32 * layout.lane_bits as u32;
        if layout.lanes as u32 * layout.lane_bits as u32 > 64 {
            // Memory-resident OCT shapes.
            let ptr = self.gen_expr(base)?;
            let out = self.acquire(RegClass::Int)?;
            self.code
                .push(encode::ldr_word(out, ptr, (lane as i64) * 4));
            self.regs.release(ptr);
            if layout.is_float {
                return self.single_bits_to_double(out);
            }
            return Ok(out);
        }
        let packed = self.gen_expr(base)?;
        let word = if is_fp_reg(packed) {
            let w = self.acquire(RegClass::Int)?;
            self.code.push(encode::fmov_d_to_x(w, packed));
            self.regs.release(packed);
            w
        } else {
            packed
        };
        let out = self.acquire(RegClass::Int)?;
        if layout.signed && !layout.is_float {
            self.code
                .push(encode::sbfx(out, word, lsb, layout.lane_bits as u32));
        } else {
            self.code
                .push(encode::ubfx(out, word, lsb, layout.lane_bits as u32));
        }
        self.regs.release(word);
        if layout.is_float {
            if layout.lane_bits == 16 {
                // Half pattern widens through FCVT.
                let h = self.acquire(RegClass::Float)?;
                self.code.push(encode::fmov_w_to_s(h, out));
                self.regs.release(out);
                let d = self.acquire(RegClass::Float)?;
                self.code.push(encode::fcvt_h_to_d(d, h));
                self.regs.release(h);
                return Ok(d);
            }
            return self.single_bits_to_double(out);
        }
        Ok(out)
    }

    fn single_bits_to_double(&mut self, bits: i32) -> Result<i32, CodegenError> {
        let s = self.acquire(RegClass::Float)?;
        self.code.push(encode::fmov_w_to_s(s, bits));
        self.regs.release(bits);
        let d = self.acquire(RegClass::Float)?;
        self.code.push(encode::fcvt_s_to_d(d, s));
        self.regs.release(s);
        Ok(d)
    }

    fn gen_lane_access(
        &mut self,
        base: &Expression,
        lane: &Expression,
    ) -> Result<i32, CodegenError> {
        let float = infer_expr_type(base, &self.infer_ctx())
            .intersects(VarType::FOCT | VarType::FVEC);
        let ptr = self.gen_expr(base)?;
        let idx = self.gen_expr(lane)?;
        let addr = self.acquire(RegClass::Int)?;
        self.code.push(encode::lsl_imm(addr, idx, 2));
        self.code.push(encode::add_reg(addr, ptr, addr));
        self.code.push(encode::ldr_word(addr, addr, 0));
        self.regs.release(idx);
        self.regs.release(ptr);
        if float {
            return self.single_bits_to_double(addr);
        }
        Ok(addr)
    }
}

fn comparison_cond(op: BinaryOperator) -> Cond {
    match op {
        BinaryOperator::Eq => Cond::Eq,
        BinaryOperator::Ne => Cond::Ne,
        BinaryOperator::Lt => Cond::Lt,
        BinaryOperator::Le => Cond::Le,
        BinaryOperator::Gt => Cond::Gt,
        BinaryOperator::Ge => Cond::Ge,
        _ => Cond::Al,
    }
}
