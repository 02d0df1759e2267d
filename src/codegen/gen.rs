//! Instruction generation
//!
//! Walks the annotated tree and emits JVM instructions into a [`Bytecode`]
//! buffer, asking the injected [`ConstPool`] for operand indices. Conditions
//! compile through branch fusion (`&&`/`||`/`!` and comparisons become jump
//! chains, never materialized booleans, unless used as values). `finally`
//! bodies and monitor releases are kept on an exit-hook stack so that
//! `return`, `break` and `continue` replay them before leaving their scope.
//!
//! Private members of lexically related classes compile against synthesized
//! `access$N` accessors; the generator only records the [`BridgeMember`]
//! entries, the embedding container is responsible for materializing them.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::{BinOp, CallTarget, Expr, ExprKind, Location, Stmt, UnOp};
use crate::error::{Error, Result};
use crate::metadata::ClassDesc;
use crate::meta::{MetaForm, MetaResolver};
use crate::resolver::{FieldRef, MethodRef};
use crate::symtab::{DeclId, Declarator};
use crate::types::{unbox_method, wrapper_class, BaseType, TypeDesc};

use super::code::{Bytecode, ExceptionTableEntry};
use super::constpool::ConstPool;
use super::opcodes as op;

const STRING_BUILDER: &str = "java/lang/StringBuilder";

/// Finished compilation of one unit
#[derive(Debug)]
pub struct CompiledBody {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Accessors the container must add to the classes they name
    pub bridges: Vec<BridgeMember>,
    /// Slot of the result placeholder, when the unit referenced it
    pub result_slot: Option<u16>,
}

/// What a synthesized accessor stands in for
#[derive(Debug, Clone)]
pub enum BridgeKind {
    FieldGet(FieldRef),
    FieldSet(FieldRef),
    Method(MethodRef),
    Constructor(MethodRef),
}

/// A static `access$N` member the container must add to `on_class`
#[derive(Debug, Clone)]
pub struct BridgeMember {
    /// Dotted name of the class receiving the accessor
    pub on_class: String,
    pub name: String,
    pub descriptor: String,
    pub kind: BridgeKind,
}

/// Cleanup replayed on every early exit crossing its scope
#[derive(Clone, Copy)]
enum ExitHook<'a> {
    Finally(&'a [Stmt]),
    Monitor(u16),
}

struct LoopCtx {
    label: Option<String>,
    is_loop: bool,
    exit_depth: usize,
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValCat {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

fn category(ty: &TypeDesc) -> ValCat {
    if ty.is_reference() {
        ValCat::Ref
    } else {
        match ty.base {
            BaseType::Long => ValCat::Long,
            BaseType::Float => ValCat::Float,
            BaseType::Double => ValCat::Double,
            _ => ValCat::Int,
        }
    }
}

fn cat_width(cat: ValCat) -> i32 {
    match cat {
        ValCat::Long | ValCat::Double => 2,
        _ => 1,
    }
}

fn cat_index(cat: ValCat) -> u8 {
    match cat {
        ValCat::Int => 0,
        ValCat::Long => 1,
        ValCat::Float => 2,
        ValCat::Double => 3,
        ValCat::Ref => 4,
    }
}

fn expr_ty(e: &Expr) -> Result<&TypeDesc> {
    e.ty
        .as_ref()
        .ok_or_else(|| Error::internal("expression reached the generator untyped"))
}

/// Compiles one annotated unit into instructions
pub struct CodeGen<'a> {
    code: Bytecode,
    pool: &'a mut dyn ConstPool,
    current_class: Arc<ClassDesc>,
    meta: Option<&'a dyn MetaResolver>,
    decls: &'a mut Vec<Declarator>,
    param_ids: Vec<DeclId>,
    return_type: TypeDesc,
    is_static: bool,
    result_used: bool,
    result_slot: Option<u16>,
    ret_tmp: Option<u16>,
    loops: Vec<LoopCtx>,
    exits: Vec<ExitHook<'a>>,
    pending_label: Option<String>,
    alive: bool,
    bridges: Vec<BridgeMember>,
    bridge_index: FxHashMap<(u8, String, String, String), usize>,
}

impl<'a> CodeGen<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: &'a mut dyn ConstPool,
        current_class: Arc<ClassDesc>,
        meta: Option<&'a dyn MetaResolver>,
        decls: &'a mut Vec<Declarator>,
        param_ids: Vec<DeclId>,
        return_type: TypeDesc,
        is_static: bool,
        result_used: bool,
        reserved_locals: u16,
    ) -> Self {
        Self {
            code: Bytecode::new(reserved_locals),
            pool,
            current_class,
            meta,
            decls,
            param_ids,
            return_type,
            is_static,
            result_used,
            result_slot: None,
            ret_tmp: None,
            loops: Vec::new(),
            exits: Vec::new(),
            pending_label: None,
            alive: true,
            bridges: Vec::new(),
            bridge_index: FxHashMap::default(),
        }
    }

    pub fn code(&mut self) -> &mut Bytecode {
        &mut self.code
    }

    pub fn pool(&mut self) -> &mut dyn ConstPool {
        &mut *self.pool
    }

    pub fn param_ids(&self) -> &[DeclId] {
        &self.param_ids
    }

    pub fn return_type(&self) -> &TypeDesc {
        &self.return_type
    }

    /// Load a declared variable, for proceed handlers that push parameters
    pub fn load_variable(&mut self, id: DeclId) -> Result<()> {
        let d = &self.decls[id.0];
        let slot = d
            .slot
            .ok_or_else(|| Error::internal(format!("variable `{}` has no slot", d.name)))?;
        let ty = d.ty.clone();
        self.load_local(slot, &ty)
    }

    pub fn generate(mut self, stmts: &'a [Stmt]) -> Result<CompiledBody> {
        if self.result_used && !self.return_type.is_void() {
            let ret = self.return_type.clone();
            let slot = self.code.alloc_local(&ret)?;
            self.result_slot = Some(slot);
            self.push_default(&ret)?;
            self.store_local(slot, &ret)?;
        }
        for s in stmts {
            self.compile_stmt(s)?;
        }
        if self.alive {
            if !self.return_type.is_void() {
                let ret = self.return_type.clone();
                match self.result_slot {
                    Some(slot) => self.load_local(slot, &ret)?,
                    None => self.push_default(&ret)?,
                }
            }
            self.emit_return_op()?;
        }
        let bridges = std::mem::take(&mut self.bridges);
        let result_slot = self.result_slot;
        let (code, max_stack, max_locals, exception_table) = self.code.into_parts();
        Ok(CompiledBody {
            code,
            max_stack,
            max_locals,
            exception_table,
            bridges,
            result_slot,
        })
    }

    // ==================================================================
    // Statements
    // ==================================================================

    fn compile_stmt(&mut self, s: &'a Stmt) -> Result<()> {
        match s {
            Stmt::Empty => Ok(()),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Expr(e) => self.compile_for_effect(e),
            Stmt::Decl { decls, .. } => {
                for (id, init) in decls {
                    let ty = self.decls[id.0].ty.clone();
                    let slot = self.code.alloc_local(&ty)?;
                    self.decls[id.0].slot = Some(slot);
                    if let Some(init) = init {
                        let vt = expr_ty(init)?.clone();
                        self.compile_expr(init)?;
                        self.assign_convert(&vt, &ty)?;
                        self.store_local(slot, &ty)?;
                    }
                }
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.compile_if(cond, then_branch, else_branch.as_deref())
            }
            Stmt::While { cond, body } => self.compile_while(cond, body),
            Stmt::DoWhile { body, cond } => self.compile_do_while(body, cond),
            Stmt::For { init, cond, update, body } => {
                self.compile_for(init, cond.as_ref(), update, body)
            }
            Stmt::Switch { selector, arms, .. } => self.compile_switch(selector, arms),
            Stmt::Try { body, catches, finally } => {
                self.compile_try(body, catches, finally.as_deref())
            }
            Stmt::Synchronized { monitor, body } => self.compile_synchronized(monitor, body),
            Stmt::Return { value, .. } => self.compile_return(value.as_ref()),
            Stmt::Throw(e) => {
                self.compile_expr(e)?;
                self.code.op(op::ATHROW, -1)?;
                self.code.set_stack(0);
                self.alive = false;
                Ok(())
            }
            Stmt::Break { label, loc } => {
                let idx = self.find_break_target(label.as_deref(), *loc)?;
                let depth = self.loops[idx].exit_depth;
                self.unwind_exits(depth)?;
                let j = self.code.emit_jump(op::GOTO, 0)?;
                self.loops[idx].break_jumps.push(j);
                self.code.set_stack(0);
                self.alive = false;
                Ok(())
            }
            Stmt::Continue { label, loc } => {
                let idx = self.find_continue_target(label.as_deref(), *loc)?;
                let depth = self.loops[idx].exit_depth;
                self.unwind_exits(depth)?;
                let j = self.code.emit_jump(op::GOTO, 0)?;
                self.loops[idx].continue_jumps.push(j);
                self.code.set_stack(0);
                self.alive = false;
                Ok(())
            }
            Stmt::Labeled { label, body } => {
                if matches!(
                    body.as_ref(),
                    Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } | Stmt::Switch { .. }
                ) {
                    self.pending_label = Some(label.clone());
                }
                self.compile_stmt(body)
            }
        }
    }

    fn compile_for_effect(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Assign { .. } => self.compile_assign(e, false),
            ExprKind::IncDec { .. } => self.compile_incdec(e, false),
            _ => {
                self.compile_expr(e)?;
                match expr_ty(e)?.width() {
                    0 => Ok(()),
                    2 => self.code.op(op::POP2, -2),
                    _ => self.code.op(op::POP, -1),
                }
            }
        }
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then_branch: &'a Stmt,
        else_branch: Option<&'a Stmt>,
    ) -> Result<()> {
        let false_jumps = self.branch_if(cond, false)?;
        self.alive = true;
        self.compile_stmt(then_branch)?;
        let then_alive = self.alive;
        match else_branch {
            None => {
                self.patch_all(&false_jumps)?;
                self.code.set_stack(0);
                self.alive = true;
            }
            Some(els) => {
                let end = if then_alive {
                    Some(self.code.emit_jump(op::GOTO, 0)?)
                } else {
                    None
                };
                self.patch_all(&false_jumps)?;
                self.code.set_stack(0);
                self.alive = true;
                self.compile_stmt(els)?;
                let else_alive = self.alive;
                if let Some(j) = end {
                    self.code.patch_jump(j)?;
                }
                self.code.set_stack(0);
                self.alive = then_alive || else_alive;
            }
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &'a Stmt) -> Result<()> {
        let idx = self.push_loop(true);
        let start = self.code.pc();
        let false_jumps = self.branch_if(cond, false)?;
        self.alive = true;
        self.compile_stmt(body)?;
        if self.alive {
            self.code.emit_goto_back(start)?;
        }
        self.patch_continues_to(idx, start)?;
        self.patch_all(&false_jumps)?;
        self.finish_loop(idx)?;
        self.code.set_stack(0);
        self.alive = true;
        Ok(())
    }

    fn compile_do_while(&mut self, body: &'a Stmt, cond: &Expr) -> Result<()> {
        let idx = self.push_loop(true);
        let start = self.code.pc();
        self.alive = true;
        self.compile_stmt(body)?;
        let cond_pc = self.code.pc();
        self.patch_continues_to(idx, cond_pc)?;
        self.code.set_stack(0);
        let true_jumps = self.branch_if(cond, true)?;
        for j in true_jumps {
            self.code.patch_jump_to(j, start)?;
        }
        self.finish_loop(idx)?;
        self.code.set_stack(0);
        self.alive = true;
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: &'a [Stmt],
        cond: Option<&Expr>,
        update: &[Expr],
        body: &'a Stmt,
    ) -> Result<()> {
        for s in init {
            self.compile_stmt(s)?;
        }
        let idx = self.push_loop(true);
        let start = self.code.pc();
        let false_jumps = match cond {
            Some(c) => self.branch_if(c, false)?,
            None => Vec::new(),
        };
        self.alive = true;
        self.compile_stmt(body)?;
        let update_pc = self.code.pc();
        self.patch_continues_to(idx, update_pc)?;
        self.code.set_stack(0);
        for u in update {
            self.compile_for_effect(u)?;
        }
        self.code.emit_goto_back(start)?;
        self.patch_all(&false_jumps)?;
        self.finish_loop(idx)?;
        self.code.set_stack(0);
        self.alive = true;
        Ok(())
    }

    fn compile_switch(&mut self, selector: &Expr, arms: &'a [crate::ast::SwitchArm]) -> Result<()> {
        self.compile_expr(selector)?;
        let idx = self.push_loop(false);
        let base = self.code.pc();
        self.code.op(op::LOOKUPSWITCH, -1)?;
        self.code.align4();
        let default_slot = self.code.pc();
        self.code.emit4(0);
        let mut pairs: Vec<(i32, usize)> = Vec::new();
        for (i, arm) in arms.iter().enumerate() {
            if let Some(v) = &arm.value {
                pairs.push((case_value(v)?, i));
            }
        }
        pairs.sort_by_key(|p| p.0);
        self.code.emit4(pairs.len() as u32);
        let mut value_slots = vec![0usize; arms.len()];
        for (v, arm_idx) in &pairs {
            self.code.emit4(*v as u32);
            value_slots[*arm_idx] = self.code.pc();
            self.code.emit4(0);
        }

        let mut arm_pcs = vec![0usize; arms.len()];
        let mut default_pc = None;
        for (i, arm) in arms.iter().enumerate() {
            arm_pcs[i] = self.code.pc();
            if arm.value.is_none() {
                default_pc = Some(arm_pcs[i]);
            }
            // case bodies fall through into each other
            self.code.set_stack(0);
            self.alive = true;
            for s in &arm.body {
                self.compile_stmt(s)?;
            }
        }

        self.finish_loop(idx)?;
        let end = self.code.pc();
        let default_target = default_pc.unwrap_or(end);
        self.code
            .patch4(default_slot, offset32(base, default_target)?);
        for (_, arm_idx) in &pairs {
            self.code
                .patch4(value_slots[*arm_idx], offset32(base, arm_pcs[*arm_idx])?);
        }
        self.code.set_stack(0);
        self.alive = true;
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &'a [Stmt],
        catches: &'a [crate::ast::CatchClause],
        finally: Option<&'a [Stmt]>,
    ) -> Result<()> {
        let start = self.code.pc();
        if let Some(f) = finally {
            self.exits.push(ExitHook::Finally(f));
        }
        self.alive = true;
        for s in body {
            self.compile_stmt(s)?;
        }
        if finally.is_some() {
            self.exits.pop();
        }
        let body_end = self.code.pc();
        let mut end_jumps = Vec::new();
        if self.alive {
            if let Some(f) = finally {
                self.compile_finally_copy(f)?;
            }
            end_jumps.push(self.code.emit_jump(op::GOTO, 0)?);
        }

        // handler ranges for the catch-all entry exclude the finally copies
        let mut catch_ranges = Vec::new();
        for clause in catches {
            let handler = self.code.pc();
            self.code.set_stack(1);
            self.alive = true;
            // a range with start == end is rejected by the verifier; an
            // empty protected body leaves the handler as plain dead code
            if body_end > start {
                let class_idx = self.pool.class(&clause.class_name.replace('.', "/"));
                self.code
                    .add_exception_handler(start, body_end, handler, class_idx)?;
            }
            let ty = self.decls[clause.decl.0].ty.clone();
            let slot = self.code.alloc_local(&ty)?;
            self.decls[clause.decl.0].slot = Some(slot);
            self.store_local(slot, &ty)?;
            if let Some(f) = finally {
                self.exits.push(ExitHook::Finally(f));
            }
            for s in &clause.body {
                self.compile_stmt(s)?;
            }
            if finally.is_some() {
                self.exits.pop();
            }
            catch_ranges.push((handler, self.code.pc()));
            if self.alive {
                if let Some(f) = finally {
                    self.compile_finally_copy(f)?;
                }
                end_jumps.push(self.code.emit_jump(op::GOTO, 0)?);
            }
        }

        if let Some(f) = finally {
            let handler = self.code.pc();
            self.code.set_stack(1);
            if body_end > start {
                self.code.add_exception_handler(start, body_end, handler, 0)?;
            }
            for (s, e) in &catch_ranges {
                if e > s {
                    self.code.add_exception_handler(*s, *e, handler, 0)?;
                }
            }
            let obj = TypeDesc::object();
            let tmp = self.code.alloc_local(&obj)?;
            self.store_local(tmp, &obj)?;
            self.compile_finally_copy(f)?;
            self.load_local(tmp, &obj)?;
            self.code.op(op::ATHROW, -1)?;
            self.code.set_stack(0);
        }

        self.alive = !end_jumps.is_empty();
        for j in end_jumps {
            self.code.patch_jump(j)?;
        }
        self.code.set_stack(0);
        Ok(())
    }

    fn compile_synchronized(&mut self, monitor: &Expr, body: &'a [Stmt]) -> Result<()> {
        let obj = TypeDesc::object();
        self.compile_expr(monitor)?;
        self.code.op(op::DUP, 1)?;
        let slot = self.code.alloc_local(&obj)?;
        self.store_local(slot, &obj)?;
        self.code.op(op::MONITORENTER, -1)?;
        let start = self.code.pc();
        self.exits.push(ExitHook::Monitor(slot));
        self.alive = true;
        for s in body {
            self.compile_stmt(s)?;
        }
        self.exits.pop();
        let body_end = self.code.pc();
        let mut end_jump = None;
        if self.alive {
            self.load_local(slot, &obj)?;
            self.code.op(op::MONITOREXIT, -1)?;
            end_jump = Some(self.code.emit_jump(op::GOTO, 0)?);
        }
        let handler = self.code.pc();
        self.code.set_stack(1);
        self.load_local(slot, &obj)?;
        self.code.op(op::MONITOREXIT, -1)?;
        let rethrow = self.code.pc();
        self.code.op(op::ATHROW, -1)?;
        if body_end > start {
            self.code.add_exception_handler(start, body_end, handler, 0)?;
        }
        // the release in the handler is itself covered, so a failing exit
        // still rethrows
        self.code.add_exception_handler(handler, rethrow, handler, 0)?;
        self.alive = end_jump.is_some();
        if let Some(j) = end_jump {
            self.code.patch_jump(j)?;
        }
        self.code.set_stack(0);
        Ok(())
    }

    fn compile_return(&mut self, value: Option<&Expr>) -> Result<()> {
        match value {
            None => {
                self.unwind_exits(0)?;
                self.emit_return_op()?;
            }
            Some(v) => {
                let vt = expr_ty(v)?.clone();
                self.compile_expr(v)?;
                let ret = self.return_type.clone();
                self.assign_convert(&vt, &ret)?;
                if self.exits.is_empty() {
                    self.emit_return_op()?;
                } else {
                    // park the value while the pending cleanups run
                    let tmp = match self.ret_tmp {
                        Some(t) => t,
                        None => {
                            let t = self.code.alloc_local(&ret)?;
                            self.ret_tmp = Some(t);
                            t
                        }
                    };
                    self.store_local(tmp, &ret)?;
                    self.unwind_exits(0)?;
                    self.load_local(tmp, &ret)?;
                    self.emit_return_op()?;
                }
            }
        }
        self.code.set_stack(0);
        self.alive = false;
        Ok(())
    }

    fn emit_return_op(&mut self) -> Result<()> {
        if self.return_type.is_void() {
            return self.code.op(op::RETURN, 0);
        }
        let cat = category(&self.return_type);
        let opcode = match cat {
            ValCat::Ref => op::ARETURN,
            _ => op::IRETURN + cat_index(cat),
        };
        self.code.op(opcode, -cat_width(cat))
    }

    // ------------------------------------------------------------------
    // Loop bookkeeping and exit hooks
    // ------------------------------------------------------------------

    fn push_loop(&mut self, is_loop: bool) -> usize {
        self.loops.push(LoopCtx {
            label: self.pending_label.take(),
            is_loop,
            exit_depth: self.exits.len(),
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });
        self.loops.len() - 1
    }

    fn finish_loop(&mut self, idx: usize) -> Result<()> {
        if let Some(ctx) = self.loops.pop() {
            debug_assert_eq!(self.loops.len(), idx);
            for j in ctx.break_jumps {
                self.code.patch_jump(j)?;
            }
        }
        Ok(())
    }

    fn patch_continues_to(&mut self, idx: usize, target: usize) -> Result<()> {
        let jumps = std::mem::take(&mut self.loops[idx].continue_jumps);
        for j in jumps {
            self.code.patch_jump_to(j, target)?;
        }
        Ok(())
    }

    fn find_break_target(&self, label: Option<&str>, loc: Location) -> Result<usize> {
        for (i, ctx) in self.loops.iter().enumerate().rev() {
            match label {
                None => return Ok(i),
                Some(l) if ctx.label.as_deref() == Some(l) => return Ok(i),
                _ => {}
            }
        }
        Err(match label {
            Some(l) => Error::compile(loc, format!("undefined label `{}`", l)),
            None => Error::compile(loc, "break outside of a loop or switch"),
        })
    }

    fn find_continue_target(&self, label: Option<&str>, loc: Location) -> Result<usize> {
        for (i, ctx) in self.loops.iter().enumerate().rev() {
            if !ctx.is_loop {
                continue;
            }
            match label {
                None => return Ok(i),
                Some(l) if ctx.label.as_deref() == Some(l) => return Ok(i),
                _ => {}
            }
        }
        Err(match label {
            Some(l) => Error::compile(loc, format!("undefined label `{}`", l)),
            None => Error::compile(loc, "continue outside of a loop"),
        })
    }

    /// Replay cleanups for every scope being left. Each hook is emitted with
    /// only the hooks outside it still active, so a return inside a copied
    /// `finally` body unwinds outer scopes only.
    fn unwind_exits(&mut self, down_to: usize) -> Result<()> {
        let saved = self.exits.clone();
        while self.exits.len() > down_to {
            if let Some(hook) = self.exits.pop() {
                self.emit_hook(hook)?;
            }
        }
        self.exits = saved;
        Ok(())
    }

    fn emit_hook(&mut self, hook: ExitHook<'a>) -> Result<()> {
        match hook {
            ExitHook::Finally(stmts) => self.compile_finally_copy(stmts),
            ExitHook::Monitor(slot) => {
                let obj = TypeDesc::object();
                self.load_local(slot, &obj)?;
                self.code.op(op::MONITOREXIT, -1)
            }
        }
    }

    fn compile_finally_copy(&mut self, stmts: &'a [Stmt]) -> Result<()> {
        let saved = self.alive;
        self.alive = true;
        for s in stmts {
            self.compile_stmt(s)?;
        }
        self.alive = saved;
        Ok(())
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    pub fn compile_expr(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::IntLit(v) => self.push_int(*v),
            ExprKind::LongLit(v) => self.push_long(*v),
            ExprKind::FloatLit(v) => self.push_float(*v),
            ExprKind::DoubleLit(v) => self.push_double(*v),
            ExprKind::CharLit(c) => self.push_int(*c as i32),
            ExprKind::BoolLit(b) => self.push_int(i32::from(*b)),
            ExprKind::StringLit(s) => {
                let idx = self.pool.string(s);
                self.ldc(idx)
            }
            ExprKind::NullLit => self.code.op(op::ACONST_NULL, 1),
            ExprKind::This => {
                self.code.emit1(op::ALOAD_0);
                self.code.adjust(1)
            }
            ExprKind::Variable(id) => self.load_variable(*id),
            ExprKind::Name(_) => Err(Error::internal("unclassified name reached the generator")),
            ExprKind::FieldAccess { target, resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field access"))?
                    .clone();
                self.compile_expr(target)?;
                if f.is_static() {
                    self.code.op(op::POP, -1)?;
                }
                self.field_get(&f)
            }
            ExprKind::StaticField { resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field access"))?
                    .clone();
                self.field_get(&f)
            }
            ExprKind::ArrayLength(target) => {
                self.compile_expr(target)?;
                self.code.op(op::ARRAYLENGTH, 0)
            }
            ExprKind::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                let elem = expr_ty(e)?.clone();
                let (opcode, w) = array_load_op(&elem)?;
                self.code.op(opcode, -2 + w)
            }
            ExprKind::Call { .. } => self.compile_call(e),
            ExprKind::New { .. } => self.compile_new(e),
            ExprKind::NewArray { .. } => self.compile_new_array(e),
            ExprKind::Unary { op: uop, operand } => self.compile_unary(*uop, operand),
            ExprKind::IncDec { .. } => self.compile_incdec(e, true),
            ExprKind::Binary { .. } => self.compile_binary(e),
            ExprKind::Assign { .. } => self.compile_assign(e, true),
            ExprKind::Conditional { cond, then_val, else_val } => {
                self.compile_conditional(cond, then_val, else_val, expr_ty(e)?.clone())
            }
            ExprKind::Cast { to, expr } => {
                let from = expr_ty(expr)?.clone();
                self.compile_expr(expr)?;
                self.cast_convert(&from, to)
            }
            ExprKind::InstanceOf { expr, ty } => {
                self.compile_expr(expr)?;
                let idx = self.pool.class(&ty.internal_name());
                self.op_idx(op::INSTANCEOF, idx, 0)
            }
            ExprKind::StringConcat { pieces } => self.compile_concat(pieces),
            ExprKind::Meta(form) => self.compile_meta(*form),
            ExprKind::AssignParams { value } => self.compile_assign_params(value),
            ExprKind::ProceedCall { args } => {
                let handler = self
                    .meta
                    .and_then(|m| m.proceed_handler())
                    .cloned()
                    .ok_or_else(|| Error::internal("proceed call without a handler"))?;
                handler.emit(self, args, e.loc)
            }
            ExprKind::CflowLookup { key } => self.compile_cflow(key),
        }
    }

    fn compile_unary(&mut self, uop: UnOp, operand: &Expr) -> Result<()> {
        let cat = category(expr_ty(operand)?);
        self.compile_expr(operand)?;
        match uop {
            UnOp::Neg => self.code.op(op::INEG + cat_index(cat), 0),
            UnOp::Not => {
                self.code.op(op::ICONST_0 + 1, 1)?;
                self.code.op(op::IXOR, -1)
            }
            UnOp::BitNot => match cat {
                ValCat::Long => {
                    self.push_long(-1)?;
                    self.code.op(op::LXOR, -2)
                }
                _ => {
                    self.code.op(op::ICONST_M1, 1)?;
                    self.code.op(op::IXOR, -1)
                }
            },
        }
    }

    fn compile_binary(&mut self, e: &Expr) -> Result<()> {
        let (bop, lhs, rhs) = match &e.kind {
            ExprKind::Binary { op, lhs, rhs } => (*op, lhs.as_ref(), rhs.as_ref()),
            _ => return Err(Error::internal("compile_binary on a non-binary node")),
        };
        if bop.is_comparison() || bop.is_logical() {
            return self.compile_condition_value(e);
        }
        let result = expr_ty(e)?.clone();
        let lt = expr_ty(lhs)?.clone();
        let rt = expr_ty(rhs)?.clone();
        let cat = category(&result);
        self.compile_expr(lhs)?;
        if !result.is_boolean() {
            self.convert_prim(lt.base, result.base)?;
        }
        self.compile_expr(rhs)?;
        if bop.is_shift() {
            // the count is consumed as int, whatever its source type
            self.convert_prim(rt.base, BaseType::Int)?;
        } else if !result.is_boolean() {
            self.convert_prim(rt.base, result.base)?;
        }
        let opcode = arith_opcode(bop, cat)
            .ok_or_else(|| Error::internal("no opcode for binary operator"))?;
        let delta = if bop.is_shift() { -1 } else { -cat_width(cat) };
        self.code.op(opcode, delta)
    }

    /// Materialize a comparison or logical expression as 0/1
    fn compile_condition_value(&mut self, e: &Expr) -> Result<()> {
        let true_jumps = self.branch_if(e, true)?;
        let depth = self.code.stack_depth();
        self.code.op(op::ICONST_0, 1)?;
        let end = self.code.emit_jump(op::GOTO, 0)?;
        self.code.set_stack(depth);
        self.patch_all(&true_jumps)?;
        self.code.op(op::ICONST_0 + 1, 1)?;
        self.code.patch_jump(end)
    }

    fn compile_conditional(
        &mut self,
        cond: &Expr,
        then_val: &Expr,
        else_val: &Expr,
        ty: TypeDesc,
    ) -> Result<()> {
        let false_jumps = self.branch_if(cond, false)?;
        let depth = self.code.stack_depth();
        let tt = expr_ty(then_val)?.clone();
        self.compile_expr(then_val)?;
        self.assign_convert(&tt, &ty)?;
        let end = self.code.emit_jump(op::GOTO, 0)?;
        self.code.set_stack(depth);
        self.patch_all(&false_jumps)?;
        let et = expr_ty(else_val)?.clone();
        self.compile_expr(else_val)?;
        self.assign_convert(&et, &ty)?;
        self.code.patch_jump(end)
    }

    fn compile_concat(&mut self, pieces: &[Expr]) -> Result<()> {
        let sb = self.pool.class(STRING_BUILDER);
        self.op_idx(op::NEW, sb, 1)?;
        self.code.op(op::DUP, 1)?;
        self.invoke(op::INVOKESPECIAL, STRING_BUILDER, "<init>", "()V", 0, 0, 1)?;
        for p in pieces {
            let pty = expr_ty(p)?.clone();
            self.compile_expr(p)?;
            let (desc, argw) = append_descriptor(&pty);
            self.invoke(op::INVOKEVIRTUAL, STRING_BUILDER, "append", desc, argw, 1, 1)?;
        }
        self.invoke(
            op::INVOKEVIRTUAL,
            STRING_BUILDER,
            "toString",
            "()Ljava/lang/String;",
            0,
            1,
            1,
        )
    }

    /// With the current value of a string `+=` target on the stack, run it
    /// through a fresh builder and append the right-hand piece
    fn concat_onto(&mut self, value: &Expr) -> Result<()> {
        let sb = self.pool.class(STRING_BUILDER);
        self.op_idx(op::NEW, sb, 1)?;
        self.code.op(op::DUP, 1)?;
        self.invoke(op::INVOKESPECIAL, STRING_BUILDER, "<init>", "()V", 0, 0, 1)?;
        self.code.op(op::SWAP, 0)?;
        self.invoke(
            op::INVOKEVIRTUAL,
            STRING_BUILDER,
            "append",
            "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
            1,
            1,
            1,
        )?;
        let pty = expr_ty(value)?.clone();
        self.compile_expr(value)?;
        let (desc, argw) = append_descriptor(&pty);
        self.invoke(op::INVOKEVIRTUAL, STRING_BUILDER, "append", desc, argw, 1, 1)?;
        self.invoke(
            op::INVOKEVIRTUAL,
            STRING_BUILDER,
            "toString",
            "()Ljava/lang/String;",
            0,
            1,
            1,
        )
    }

    fn compile_meta(&mut self, form: MetaForm) -> Result<()> {
        match form {
            MetaForm::ParamArray => {
                let object = self.pool.class("java/lang/Object");
                self.push_int(self.param_ids.len() as i32)?;
                self.op_idx(op::ANEWARRAY, object, 0)?;
                for (i, id) in self.param_ids.clone().iter().enumerate() {
                    self.code.op(op::DUP, 1)?;
                    self.push_int(i as i32)?;
                    let ty = self.decls[id.0].ty.clone();
                    self.load_variable(*id)?;
                    if ty.is_primitive() {
                        self.box_value(ty.base)?;
                    }
                    self.code.op(op::AASTORE, -3)?;
                }
                Ok(())
            }
            MetaForm::ParamList => Err(Error::internal(
                "parameter spread survived checking in value position",
            )),
            MetaForm::ResultValue => {
                let slot = self
                    .result_slot
                    .ok_or_else(|| Error::internal("result placeholder without a slot"))?;
                let ret = self.return_type.clone();
                self.load_local(slot, &ret)
            }
            MetaForm::ClassObject => {
                let ty = TypeDesc::class(self.current_class.name.clone());
                self.push_class_object(&ty)
            }
            MetaForm::SigArray => {
                let class = self.pool.class("java/lang/Class");
                self.push_int(self.param_ids.len() as i32)?;
                self.op_idx(op::ANEWARRAY, class, 0)?;
                for (i, id) in self.param_ids.clone().iter().enumerate() {
                    self.code.op(op::DUP, 1)?;
                    self.push_int(i as i32)?;
                    let ty = self.decls[id.0].ty.clone();
                    self.push_class_object(&ty)?;
                    self.code.op(op::AASTORE, -3)?;
                }
                Ok(())
            }
            MetaForm::TypeObject => {
                let ret = self.return_type.clone();
                self.push_class_object(&ret)
            }
        }
    }

    fn push_class_object(&mut self, ty: &TypeDesc) -> Result<()> {
        if ty.is_primitive() {
            let wrapper = match ty.base {
                BaseType::Void => "java.lang.Void",
                base => wrapper_class(base)
                    .ok_or_else(|| Error::internal("primitive without a wrapper class"))?,
            };
            let idx = self
                .pool
                .field_ref(&wrapper.replace('.', "/"), "TYPE", "Ljava/lang/Class;");
            self.op_idx(op::GETSTATIC, idx, 1)
        } else {
            let idx = self.pool.class(&ty.internal_name());
            self.ldc(idx)
        }
    }

    fn compile_assign_params(&mut self, value: &Expr) -> Result<()> {
        self.compile_expr(value)?;
        for (i, id) in self.param_ids.clone().iter().enumerate() {
            self.code.op(op::DUP, 1)?;
            self.push_int(i as i32)?;
            self.code.op(op::AALOAD, -1)?;
            let ty = self.decls[id.0].ty.clone();
            self.convert_object_to(&ty)?;
            let slot = self.decls[id.0]
                .slot
                .ok_or_else(|| Error::internal("parameter without a slot"))?;
            self.store_local(slot, &ty)?;
        }
        Ok(())
    }

    fn compile_cflow(&mut self, key: &str) -> Result<()> {
        let binding = self
            .meta
            .and_then(|m| m.cflow())
            .cloned()
            .ok_or_else(|| Error::internal("cflow lookup without a binding"))?;
        let owner = binding.owner.replace('.', "/");
        let counter = binding.counter_class.replace('.', "/");
        let field = format!("cflow${}", key.replace('.', "$"));
        let desc = format!("L{};", counter);
        let idx = self.pool.field_ref(&owner, &field, &desc);
        self.op_idx(op::GETSTATIC, idx, 1)?;
        self.invoke(op::INVOKEVIRTUAL, &counter, "value", "()I", 0, 1, 1)
    }

    // ------------------------------------------------------------------
    // Calls and allocation
    // ------------------------------------------------------------------

    fn compile_call(&mut self, e: &Expr) -> Result<()> {
        let (target, args, m) = match &e.kind {
            ExprKind::Call { target, args, resolved, .. } => (
                target,
                args.as_slice(),
                resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved call"))?
                    .clone(),
            ),
            _ => return Err(Error::internal("compile_call on a non-call node")),
        };
        let needs_bridge = m.is_private() && m.class != self.current_class.name;

        let mut has_receiver = false;
        match target {
            CallTarget::Implicit => {
                if !m.is_static() {
                    self.code.emit1(op::ALOAD_0);
                    self.code.adjust(1)?;
                    has_receiver = true;
                }
            }
            CallTarget::Expr(recv) => {
                self.compile_expr(recv)?;
                if m.is_static() {
                    self.code.op(op::POP, -1)?;
                } else {
                    has_receiver = true;
                }
            }
            CallTarget::Class(_) => {}
            CallTarget::Super => {
                self.code.emit1(op::ALOAD_0);
                self.code.adjust(1)?;
                has_receiver = true;
            }
            CallTarget::Path(_) => {
                return Err(Error::internal("unclassified call receiver reached the generator"))
            }
        }

        let mut argw = 0i32;
        for (a, pty) in args.iter().zip(&m.param_types) {
            let at = expr_ty(a)?.clone();
            self.compile_expr(a)?;
            self.assign_convert(&at, pty)?;
            argw += i32::from(pty.width());
        }
        let retw = i32::from(m.ret.width());

        if needs_bridge {
            let (bname, bdesc) = self.method_bridge(&m);
            let recv = i32::from(has_receiver);
            return self.invoke(op::INVOKESTATIC, &m.class, &bname, &bdesc, argw + recv, retw, 0);
        }

        let opcode = if m.is_static() {
            op::INVOKESTATIC
        } else if matches!(target, CallTarget::Super) || m.is_private() {
            op::INVOKESPECIAL
        } else if m.on_interface {
            op::INVOKEINTERFACE
        } else {
            op::INVOKEVIRTUAL
        };
        let recv = i32::from(!m.is_static());
        self.invoke(opcode, &m.class, &m.name, &m.descriptor, argw, retw, recv)
    }

    fn compile_new(&mut self, e: &Expr) -> Result<()> {
        let (class_name, args, ctor) = match &e.kind {
            ExprKind::New { class_name, args, resolved } => (
                class_name.as_str(),
                args.as_slice(),
                resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved constructor"))?
                    .clone(),
            ),
            _ => return Err(Error::internal("compile_new on a non-new node")),
        };
        let needs_bridge = ctor.is_private() && class_name != self.current_class.name;
        if !needs_bridge {
            let idx = self.pool.class(&class_name.replace('.', "/"));
            self.op_idx(op::NEW, idx, 1)?;
            self.code.op(op::DUP, 1)?;
        }
        let mut argw = 0i32;
        for (a, pty) in args.iter().zip(&ctor.param_types) {
            let at = expr_ty(a)?.clone();
            self.compile_expr(a)?;
            self.assign_convert(&at, pty)?;
            argw += i32::from(pty.width());
        }
        if needs_bridge {
            let (bname, bdesc) = self.constructor_bridge(&ctor, class_name);
            self.invoke(op::INVOKESTATIC, class_name, &bname, &bdesc, argw, 1, 0)
        } else {
            self.invoke(op::INVOKESPECIAL, class_name, "<init>", &ctor.descriptor, argw, 0, 1)
        }
    }

    fn compile_new_array(&mut self, e: &Expr) -> Result<()> {
        let full = expr_ty(e)?.clone();
        let (dim_exprs, extra_dims) = match &e.kind {
            ExprKind::NewArray { dim_exprs, extra_dims, .. } => (dim_exprs, *extra_dims),
            _ => return Err(Error::internal("compile_new_array on a non-array node")),
        };
        for d in dim_exprs {
            self.compile_expr(d)?;
        }
        if dim_exprs.len() == 1 && extra_dims == 0 {
            let elem = full
                .element()
                .ok_or_else(|| Error::internal("array type without an element"))?;
            if elem.is_primitive() {
                let atype = newarray_atype(elem.base)?;
                self.code.op(op::NEWARRAY, 0)?;
                self.code.emit1(atype);
            } else {
                let idx = self.pool.class(&elem.internal_name());
                self.op_idx(op::ANEWARRAY, idx, 0)?;
            }
            Ok(())
        } else {
            let idx = self.pool.class(&full.internal_name());
            let n = dim_exprs.len() as i32;
            self.code.emit1(op::MULTIANEWARRAY);
            self.code.emit2(idx);
            self.code.emit1(n as u8);
            self.code.adjust(1 - n)
        }
    }

    // ------------------------------------------------------------------
    // Assignment and increment
    // ------------------------------------------------------------------

    fn compile_assign(&mut self, e: &Expr, keep: bool) -> Result<()> {
        let (aop, target, value) = match &e.kind {
            ExprKind::Assign { op, target, value } => (*op, target.as_ref(), value.as_ref()),
            _ => return Err(Error::internal("compile_assign on a non-assign node")),
        };
        let tty = expr_ty(target)?.clone();
        let w = i32::from(tty.width());

        match &target.kind {
            ExprKind::Variable(_) | ExprKind::Meta(MetaForm::ResultValue) => {
                let (slot, _) = self.lvalue_slot(target)?;
                match aop {
                    Some(bop) => {
                        self.load_local(slot, &tty)?;
                        self.compound_value(bop, &tty, value)?;
                    }
                    None => {
                        let vt = expr_ty(value)?.clone();
                        self.compile_expr(value)?;
                        self.assign_convert(&vt, &tty)?;
                    }
                }
                if keep {
                    self.dup_width(w)?;
                }
                self.store_local(slot, &tty)
            }
            ExprKind::StaticField { resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field assignment"))?
                    .clone();
                match aop {
                    Some(bop) => {
                        self.field_get(&f)?;
                        self.compound_value(bop, &tty, value)?;
                    }
                    None => {
                        let vt = expr_ty(value)?.clone();
                        self.compile_expr(value)?;
                        self.assign_convert(&vt, &tty)?;
                    }
                }
                if keep {
                    self.dup_width(w)?;
                }
                self.field_put(&f)
            }
            ExprKind::FieldAccess { target: recv, resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field assignment"))?
                    .clone();
                if f.is_static() {
                    self.compile_expr(recv)?;
                    self.code.op(op::POP, -1)?;
                    match aop {
                        Some(bop) => {
                            self.field_get(&f)?;
                            self.compound_value(bop, &tty, value)?;
                        }
                        None => {
                            let vt = expr_ty(value)?.clone();
                            self.compile_expr(value)?;
                            self.assign_convert(&vt, &tty)?;
                        }
                    }
                    if keep {
                        self.dup_width(w)?;
                    }
                    return self.field_put(&f);
                }
                self.compile_expr(recv)?;
                match aop {
                    Some(bop) => {
                        self.code.op(op::DUP, 1)?;
                        self.field_get(&f)?;
                        self.compound_value(bop, &tty, value)?;
                    }
                    None => {
                        let vt = expr_ty(value)?.clone();
                        self.compile_expr(value)?;
                        self.assign_convert(&vt, &tty)?;
                    }
                }
                if keep {
                    let dup = if w == 2 { op::DUP2_X1 } else { op::DUP_X1 };
                    self.code.op(dup, w)?;
                }
                self.field_put(&f)
            }
            ExprKind::Index { array, index } => {
                let elem = tty.clone();
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                match aop {
                    Some(bop) => {
                        self.code.op(op::DUP2, 2)?;
                        let (load, lw) = array_load_op(&elem)?;
                        self.code.op(load, -2 + lw)?;
                        self.compound_value(bop, &tty, value)?;
                    }
                    None => {
                        let vt = expr_ty(value)?.clone();
                        self.compile_expr(value)?;
                        self.assign_convert(&vt, &tty)?;
                    }
                }
                if keep {
                    let dup = if w == 2 { op::DUP2_X2 } else { op::DUP_X2 };
                    self.code.op(dup, w)?;
                }
                let (store, sw) = array_store_op(&elem)?;
                self.code.op(store, -2 - sw)
            }
            _ => Err(Error::internal("bad assignment target reached the generator")),
        }
    }

    /// With the current value of the target on the stack, compute the
    /// compound result converted back to the target type
    fn compound_value(&mut self, bop: BinOp, tty: &TypeDesc, value: &Expr) -> Result<()> {
        if bop == BinOp::Add && tty.is_string() {
            return self.concat_onto(value);
        }
        let vt = expr_ty(value)?.clone();
        let operand = compound_operand_type(bop, tty, &vt);
        let cat = category(&operand);
        if !operand.is_boolean() {
            self.convert_prim(tty.base, operand.base)?;
        }
        self.compile_expr(value)?;
        if bop.is_shift() {
            self.convert_prim(vt.base, BaseType::Int)?;
        } else if !operand.is_boolean() {
            self.convert_prim(vt.base, operand.base)?;
        }
        let opcode = arith_opcode(bop, cat)
            .ok_or_else(|| Error::internal("no opcode for compound assignment"))?;
        let delta = if bop.is_shift() { -1 } else { -cat_width(cat) };
        self.code.op(opcode, delta)?;
        if !operand.is_boolean() {
            self.convert_prim(operand.base, tty.base)?;
        }
        Ok(())
    }

    fn compile_incdec(&mut self, e: &Expr, keep: bool) -> Result<()> {
        let (inc, postfix, target) = match &e.kind {
            ExprKind::IncDec { inc, postfix, target } => (*inc, *postfix, target.as_ref()),
            _ => return Err(Error::internal("compile_incdec on a non-incdec node")),
        };
        let tty = expr_ty(target)?.clone();
        let amount: i16 = if inc { 1 } else { -1 };

        if matches!(
            &target.kind,
            ExprKind::Variable(_) | ExprKind::Meta(MetaForm::ResultValue)
        ) {
            let (slot, _) = self.lvalue_slot(target)?;
            if tty.base == BaseType::Int {
                if keep && postfix {
                    self.load_local(slot, &tty)?;
                    self.iinc(slot, amount);
                } else {
                    self.iinc(slot, amount);
                    if keep {
                        self.load_local(slot, &tty)?;
                    }
                }
                return Ok(());
            }
            self.load_local(slot, &tty)?;
            let w = i32::from(tty.width());
            if keep && postfix {
                self.dup_width(w)?;
            }
            self.step_value(inc, &tty)?;
            if keep && !postfix {
                self.dup_width(w)?;
            }
            return self.store_local(slot, &tty);
        }

        let w = i32::from(tty.width());
        match &target.kind {
            ExprKind::StaticField { resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field increment"))?
                    .clone();
                self.field_get(&f)?;
                if keep && postfix {
                    self.dup_width(w)?;
                }
                self.step_value(inc, &tty)?;
                if keep && !postfix {
                    self.dup_width(w)?;
                }
                self.field_put(&f)
            }
            ExprKind::FieldAccess { target: recv, resolved, .. } => {
                let f = resolved
                    .as_ref()
                    .ok_or_else(|| Error::internal("unresolved field increment"))?
                    .clone();
                self.compile_expr(recv)?;
                self.code.op(op::DUP, 1)?;
                self.field_get(&f)?;
                let dup = if w == 2 { op::DUP2_X1 } else { op::DUP_X1 };
                if keep && postfix {
                    self.code.op(dup, w)?;
                }
                self.step_value(inc, &tty)?;
                if keep && !postfix {
                    self.code.op(dup, w)?;
                }
                self.field_put(&f)
            }
            ExprKind::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.code.op(op::DUP2, 2)?;
                let (load, lw) = array_load_op(&tty)?;
                self.code.op(load, -2 + lw)?;
                let dup = if w == 2 { op::DUP2_X2 } else { op::DUP_X2 };
                if keep && postfix {
                    self.code.op(dup, w)?;
                }
                self.step_value(inc, &tty)?;
                if keep && !postfix {
                    self.code.op(dup, w)?;
                }
                let (store, sw) = array_store_op(&tty)?;
                self.code.op(store, -2 - sw)
            }
            _ => Err(Error::internal("bad increment target reached the generator")),
        }
    }

    /// Add or subtract one at the operand type, converting back to the
    /// target's declared type
    fn step_value(&mut self, inc: bool, tty: &TypeDesc) -> Result<()> {
        let operand = BaseType::from_promotion(tty.base);
        let cat = category(&TypeDesc::primitive(operand));
        match cat {
            ValCat::Int => self.push_int(1)?,
            ValCat::Long => self.push_long(1)?,
            ValCat::Float => self.push_float(1.0)?,
            ValCat::Double => self.push_double(1.0)?,
            ValCat::Ref => return Err(Error::internal("increment on a reference")),
        }
        let opcode = if inc {
            op::IADD + cat_index(cat)
        } else {
            op::ISUB + cat_index(cat)
        };
        self.code.op(opcode, -cat_width(cat))?;
        self.convert_prim(operand, tty.base)
    }

    fn lvalue_slot(&mut self, target: &Expr) -> Result<(u16, TypeDesc)> {
        match &target.kind {
            ExprKind::Variable(id) => {
                let d = &self.decls[id.0];
                let slot = d
                    .slot
                    .ok_or_else(|| Error::internal(format!("variable `{}` has no slot", d.name)))?;
                Ok((slot, d.ty.clone()))
            }
            ExprKind::Meta(MetaForm::ResultValue) => {
                let slot = self
                    .result_slot
                    .ok_or_else(|| Error::internal("result placeholder without a slot"))?;
                Ok((slot, self.return_type.clone()))
            }
            _ => Err(Error::internal("not a slot-backed target")),
        }
    }

    // ------------------------------------------------------------------
    // Branch fusion
    // ------------------------------------------------------------------

    /// Emit the condition so that control jumps (through every returned
    /// patch site) when it evaluates to `jump_when`, falling through
    /// otherwise
    pub fn branch_if(&mut self, e: &Expr, jump_when: bool) -> Result<Vec<usize>> {
        match &e.kind {
            ExprKind::BoolLit(b) => {
                if *b == jump_when {
                    Ok(vec![self.code.emit_jump(op::GOTO, 0)?])
                } else {
                    Ok(Vec::new())
                }
            }
            ExprKind::Unary { op: UnOp::Not, operand } => self.branch_if(operand, !jump_when),
            ExprKind::Binary { op: bop, lhs, rhs } if bop.is_logical() => {
                let both_required = (*bop == BinOp::AndAnd) == jump_when;
                if both_required {
                    // the first operand falls through to the second on the
                    // non-deciding value
                    let first = self.branch_if(lhs, !jump_when)?;
                    let second = self.branch_if(rhs, jump_when)?;
                    self.patch_all(&first)?;
                    Ok(second)
                } else {
                    let mut jumps = self.branch_if(lhs, jump_when)?;
                    jumps.extend(self.branch_if(rhs, jump_when)?);
                    Ok(jumps)
                }
            }
            ExprKind::Binary { op: bop, lhs, rhs } if bop.is_comparison() => {
                self.branch_compare(*bop, lhs, rhs, jump_when)
            }
            _ => {
                self.compile_expr(e)?;
                let opcode = if jump_when { op::IFNE } else { op::IFEQ };
                Ok(vec![self.code.emit_jump(opcode, -1)?])
            }
        }
    }

    fn branch_compare(
        &mut self,
        bop: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        jump_when: bool,
    ) -> Result<Vec<usize>> {
        let lt = expr_ty(lhs)?.clone();
        let rt = expr_ty(rhs)?.clone();
        let effective = if jump_when { bop } else { negate_compare(bop) };

        if lt.is_reference() && rt.is_reference() {
            if matches!(rhs.kind, ExprKind::NullLit) {
                self.compile_expr(lhs)?;
                let opcode = match effective {
                    BinOp::Eq => op::IFNULL,
                    _ => op::IFNONNULL,
                };
                return Ok(vec![self.code.emit_jump(opcode, -1)?]);
            }
            if matches!(lhs.kind, ExprKind::NullLit) {
                self.compile_expr(rhs)?;
                let opcode = match effective {
                    BinOp::Eq => op::IFNULL,
                    _ => op::IFNONNULL,
                };
                return Ok(vec![self.code.emit_jump(opcode, -1)?]);
            }
            self.compile_expr(lhs)?;
            self.compile_expr(rhs)?;
            let opcode = match effective {
                BinOp::Eq => op::IF_ACMPEQ,
                _ => op::IF_ACMPNE,
            };
            return Ok(vec![self.code.emit_jump(opcode, -2)?]);
        }

        if lt.is_boolean() && rt.is_boolean() {
            self.compile_expr(lhs)?;
            self.compile_expr(rhs)?;
            let opcode = icmp_opcode(effective);
            return Ok(vec![self.code.emit_jump(opcode, -2)?]);
        }

        let promoted = crate::types::binary_promotion(lt.base, rt.base);
        match promoted {
            BaseType::Int => {
                if matches!(rhs.kind, ExprKind::IntLit(0)) {
                    self.compile_expr(lhs)?;
                    return Ok(vec![self.code.emit_jump(if_opcode(effective), -1)?]);
                }
                if matches!(lhs.kind, ExprKind::IntLit(0)) {
                    self.compile_expr(rhs)?;
                    let swapped = swap_compare(effective);
                    return Ok(vec![self.code.emit_jump(if_opcode(swapped), -1)?]);
                }
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                Ok(vec![self.code.emit_jump(icmp_opcode(effective), -2)?])
            }
            _ => {
                let cat = category(&TypeDesc::primitive(promoted));
                self.compile_expr(lhs)?;
                self.convert_prim(lt.base, promoted)?;
                self.compile_expr(rhs)?;
                self.convert_prim(rt.base, promoted)?;
                // NaN falls on the side that makes < and <= false
                let cmp = match promoted {
                    BaseType::Long => op::LCMP,
                    BaseType::Float => match bop {
                        BinOp::Lt | BinOp::Le => op::FCMPG,
                        _ => op::FCMPL,
                    },
                    _ => match bop {
                        BinOp::Lt | BinOp::Le => op::DCMPG,
                        _ => op::DCMPL,
                    },
                };
                self.code.op(cmp, -2 * cat_width(cat) + 1)?;
                Ok(vec![self.code.emit_jump(if_opcode(effective), -1)?])
            }
        }
    }

    fn patch_all(&mut self, jumps: &[usize]) -> Result<()> {
        for j in jumps {
            self.code.patch_jump(*j)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field access and bridges
    // ------------------------------------------------------------------

    fn field_needs_bridge(&self, f: &FieldRef) -> bool {
        f.is_private() && f.class != self.current_class.name
    }

    fn field_get(&mut self, f: &FieldRef) -> Result<()> {
        let w = i32::from(f.ty.width());
        if self.field_needs_bridge(f) {
            let (name, desc) = self.field_bridge(f, false);
            let recv = i32::from(!f.is_static());
            return self.invoke(op::INVOKESTATIC, &f.class, &name, &desc, recv, w, 0);
        }
        let idx = self
            .pool
            .field_ref(&f.class.replace('.', "/"), &f.name, &f.descriptor);
        if f.is_static() {
            self.op_idx(op::GETSTATIC, idx, w)
        } else {
            self.op_idx(op::GETFIELD, idx, -1 + w)
        }
    }

    fn field_put(&mut self, f: &FieldRef) -> Result<()> {
        let w = i32::from(f.ty.width());
        if self.field_needs_bridge(f) {
            let (name, desc) = self.field_bridge(f, true);
            let recv = i32::from(!f.is_static());
            return self.invoke(op::INVOKESTATIC, &f.class, &name, &desc, recv + w, 0, 0);
        }
        let idx = self
            .pool
            .field_ref(&f.class.replace('.', "/"), &f.name, &f.descriptor);
        if f.is_static() {
            self.op_idx(op::PUTSTATIC, idx, -w)
        } else {
            self.op_idx(op::PUTFIELD, idx, -1 - w)
        }
    }

    fn field_bridge(&mut self, f: &FieldRef, setter: bool) -> (String, String) {
        let owner = f.class.replace('.', "/");
        let desc = match (setter, f.is_static()) {
            (false, true) => format!("(){}", f.descriptor),
            (false, false) => format!("(L{};){}", owner, f.descriptor),
            (true, true) => format!("({})V", f.descriptor),
            (true, false) => format!("(L{};{})V", owner, f.descriptor),
        };
        let kind = if setter {
            BridgeKind::FieldSet(f.clone())
        } else {
            BridgeKind::FieldGet(f.clone())
        };
        self.intern_bridge(if setter { 1 } else { 0 }, &f.class, &f.name, desc, kind)
    }

    fn method_bridge(&mut self, m: &MethodRef) -> (String, String) {
        let owner = m.class.replace('.', "/");
        let desc = if m.is_static() {
            m.descriptor.clone()
        } else {
            format!("(L{};{}", owner, &m.descriptor[1..])
        };
        self.intern_bridge(2, &m.class, &m.name, desc, BridgeKind::Method(m.clone()))
    }

    fn constructor_bridge(&mut self, ctor: &MethodRef, class_name: &str) -> (String, String) {
        let owner = class_name.replace('.', "/");
        // constructors bridge through a static factory
        let params = ctor.descriptor.trim_end_matches('V');
        let desc = format!("{}L{};", params, owner);
        self.intern_bridge(
            3,
            class_name,
            "<init>",
            desc,
            BridgeKind::Constructor(ctor.clone()),
        )
    }

    fn intern_bridge(
        &mut self,
        tag: u8,
        on_class: &str,
        member: &str,
        desc: String,
        kind: BridgeKind,
    ) -> (String, String) {
        let key = (tag, on_class.to_string(), member.to_string(), desc.clone());
        if let Some(&i) = self.bridge_index.get(&key) {
            let b = &self.bridges[i];
            return (b.name.clone(), b.descriptor.clone());
        }
        let name = format!("access${}", self.bridges.len());
        self.bridge_index.insert(key, self.bridges.len());
        self.bridges.push(BridgeMember {
            on_class: on_class.to_string(),
            name: name.clone(),
            descriptor: desc.clone(),
            kind,
        });
        (name, desc)
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Conversion applied in assignment position: widening, boxing into a
    /// wrapper or Object, unboxing out of a wrapper or Object
    pub fn assign_convert(&mut self, from: &TypeDesc, to: &TypeDesc) -> Result<()> {
        if from == to || from.is_null() {
            return Ok(());
        }
        if from.is_reference() && to.is_reference() {
            return Ok(());
        }
        if from.is_primitive() && to.is_primitive() {
            return self.convert_prim(from.base, to.base);
        }
        if from.is_primitive() && to.is_reference() {
            return self.box_value(from.base);
        }
        self.unbox_value(from, to.base)
    }

    /// Conversion applied by an explicit cast
    fn cast_convert(&mut self, from: &TypeDesc, to: &TypeDesc) -> Result<()> {
        if from == to || from.is_null() {
            return Ok(());
        }
        if from.is_primitive() && to.is_primitive() {
            return self.convert_prim(from.base, to.base);
        }
        if from.is_reference() && to.is_reference() {
            if to.dims == 0 && to.class_name.as_deref() == Some(crate::types::OBJECT) {
                return Ok(());
            }
            let idx = self.pool.class(&to.internal_name());
            return self.op_idx(op::CHECKCAST, idx, 0);
        }
        if from.is_primitive() {
            return self.box_value(from.base);
        }
        self.unbox_value(from, to.base)
    }

    fn convert_prim(&mut self, from: BaseType, to: BaseType) -> Result<()> {
        if from == to || from == BaseType::Boolean || to == BaseType::Boolean {
            return Ok(());
        }
        let fc = category(&TypeDesc::primitive(from));
        let tc = category(&TypeDesc::primitive(to));
        if fc != tc {
            let (opcode, delta) = match (fc, tc) {
                (ValCat::Int, ValCat::Long) => (op::I2L, 1),
                (ValCat::Int, ValCat::Float) => (op::I2F, 0),
                (ValCat::Int, ValCat::Double) => (op::I2D, 1),
                (ValCat::Long, ValCat::Int) => (op::L2I, -1),
                (ValCat::Long, ValCat::Float) => (op::L2F, -1),
                (ValCat::Long, ValCat::Double) => (op::L2D, 0),
                (ValCat::Float, ValCat::Int) => (op::F2I, 0),
                (ValCat::Float, ValCat::Long) => (op::F2L, 1),
                (ValCat::Float, ValCat::Double) => (op::F2D, 1),
                (ValCat::Double, ValCat::Int) => (op::D2I, -1),
                (ValCat::Double, ValCat::Long) => (op::D2L, 0),
                (ValCat::Double, ValCat::Float) => (op::D2F, -1),
                _ => return Err(Error::internal("bad primitive conversion")),
            };
            self.code.op(opcode, delta)?;
        }
        // sub-int targets truncate unless the source already fits
        match to {
            BaseType::Byte if !crate::types::widens_to(from, to) => self.code.op(op::I2B, 0),
            BaseType::Short if !crate::types::widens_to(from, to) => self.code.op(op::I2S, 0),
            BaseType::Char if !crate::types::widens_to(from, to) => self.code.op(op::I2C, 0),
            _ => Ok(()),
        }
    }

    fn box_value(&mut self, base: BaseType) -> Result<()> {
        let wrapper = wrapper_class(base)
            .ok_or_else(|| Error::internal("no wrapper class for this type"))?;
        let internal = wrapper.replace('.', "/");
        let ch = base
            .descriptor_char()
            .ok_or_else(|| Error::internal("no descriptor for this type"))?;
        let desc = format!("({})L{};", ch, internal);
        let w = i32::from(TypeDesc::primitive(base).width());
        self.invoke(op::INVOKESTATIC, wrapper, "valueOf", &desc, w, 1, 0)
    }

    fn unbox_value(&mut self, from: &TypeDesc, to: BaseType) -> Result<()> {
        let wrapper = wrapper_class(to)
            .ok_or_else(|| Error::internal("no wrapper class for this type"))?;
        if from.class_name.as_deref() != Some(wrapper) {
            let idx = self.pool.class(&wrapper.replace('.', "/"));
            self.op_idx(op::CHECKCAST, idx, 0)?;
        }
        let method = unbox_method(to)
            .ok_or_else(|| Error::internal("no unboxing method for this type"))?;
        let ch = to
            .descriptor_char()
            .ok_or_else(|| Error::internal("no descriptor for this type"))?;
        let desc = format!("(){}", ch);
        let w = i32::from(TypeDesc::primitive(to).width());
        self.invoke(op::INVOKEVIRTUAL, wrapper, method, &desc, 0, w, 1)
    }

    fn convert_object_to(&mut self, ty: &TypeDesc) -> Result<()> {
        if ty.is_primitive() {
            return self.unbox_value(&TypeDesc::object(), ty.base);
        }
        if ty.dims == 0 && ty.class_name.as_deref() == Some(crate::types::OBJECT) {
            return Ok(());
        }
        let idx = self.pool.class(&ty.internal_name());
        self.op_idx(op::CHECKCAST, idx, 0)
    }

    // ------------------------------------------------------------------
    // Low-level emission
    // ------------------------------------------------------------------

    fn op_idx(&mut self, opcode: u8, idx: u16, delta: i32) -> Result<()> {
        self.code.emit1(opcode);
        self.code.emit2(idx);
        self.code.adjust(delta)
    }

    fn invoke(
        &mut self,
        opcode: u8,
        class: &str,
        name: &str,
        desc: &str,
        argw: i32,
        retw: i32,
        recv: i32,
    ) -> Result<()> {
        let internal = class.replace('.', "/");
        let idx = if opcode == op::INVOKEINTERFACE {
            self.pool.interface_method_ref(&internal, name, desc)
        } else {
            self.pool.method_ref(&internal, name, desc)
        };
        self.code.emit1(opcode);
        self.code.emit2(idx);
        if opcode == op::INVOKEINTERFACE {
            self.code.emit1((recv + argw) as u8);
            self.code.emit1(0);
        }
        self.code.adjust(retw - argw - recv)
    }

    fn dup_width(&mut self, w: i32) -> Result<()> {
        if w == 2 {
            self.code.op(op::DUP2, 2)
        } else {
            self.code.op(op::DUP, 1)
        }
    }

    fn load_local(&mut self, slot: u16, ty: &TypeDesc) -> Result<()> {
        let cat = category(ty);
        let (base, base0) = match cat {
            ValCat::Int => (op::ILOAD, op::ILOAD_0),
            ValCat::Long => (op::LLOAD, op::LLOAD_0),
            ValCat::Float => (op::FLOAD, op::FLOAD_0),
            ValCat::Double => (op::DLOAD, op::DLOAD_0),
            ValCat::Ref => (op::ALOAD, op::ALOAD_0),
        };
        self.slot_insn(base, base0, slot);
        self.code.adjust(cat_width(cat))
    }

    fn store_local(&mut self, slot: u16, ty: &TypeDesc) -> Result<()> {
        let cat = category(ty);
        let (base, base0) = match cat {
            ValCat::Int => (op::ISTORE, op::ISTORE_0),
            ValCat::Long => (op::LSTORE, op::LSTORE_0),
            ValCat::Float => (op::FSTORE, op::FSTORE_0),
            ValCat::Double => (op::DSTORE, op::DSTORE_0),
            ValCat::Ref => (op::ASTORE, op::ASTORE_0),
        };
        self.slot_insn(base, base0, slot);
        self.code.adjust(-cat_width(cat))
    }

    fn slot_insn(&mut self, base: u8, base0: u8, slot: u16) {
        if slot < 4 {
            self.code.emit1(base0 + slot as u8);
        } else if slot <= 0xff {
            self.code.emit1(base);
            self.code.emit1(slot as u8);
        } else {
            self.code.emit1(op::WIDE);
            self.code.emit1(base);
            self.code.emit2(slot);
        }
    }

    fn iinc(&mut self, slot: u16, amount: i16) {
        if slot <= 0xff && i8::try_from(amount).is_ok() {
            self.code.emit1(op::IINC);
            self.code.emit1(slot as u8);
            self.code.emit1(amount as i8 as u8);
        } else {
            self.code.emit1(op::WIDE);
            self.code.emit1(op::IINC);
            self.code.emit2(slot);
            self.code.emit2(amount as u16);
        }
    }

    fn push_int(&mut self, v: i32) -> Result<()> {
        if (-1..=5).contains(&v) {
            let opcode = (i16::from(op::ICONST_0) + v as i16) as u8;
            return self.code.op(opcode, 1);
        }
        if let Ok(b) = i8::try_from(v) {
            self.code.emit1(op::BIPUSH);
            self.code.emit1(b as u8);
            return self.code.adjust(1);
        }
        if let Ok(s) = i16::try_from(v) {
            self.code.emit1(op::SIPUSH);
            self.code.emit2(s as u16);
            return self.code.adjust(1);
        }
        let idx = self.pool.integer(v);
        self.ldc(idx)
    }

    fn push_long(&mut self, v: i64) -> Result<()> {
        if v == 0 || v == 1 {
            return self.code.op(op::LCONST_0 + v as u8, 2);
        }
        let idx = self.pool.long(v);
        self.ldc2(idx)
    }

    fn push_float(&mut self, v: f32) -> Result<()> {
        if v.to_bits() == 0.0f32.to_bits() || v == 1.0 || v == 2.0 {
            return self.code.op(op::FCONST_0 + v as u8, 1);
        }
        let idx = self.pool.float(v);
        self.ldc(idx)
    }

    fn push_double(&mut self, v: f64) -> Result<()> {
        if v.to_bits() == 0.0f64.to_bits() || v == 1.0 {
            return self.code.op(op::DCONST_0 + v as u8, 2);
        }
        let idx = self.pool.double(v);
        self.ldc2(idx)
    }

    fn push_default(&mut self, ty: &TypeDesc) -> Result<()> {
        match category(ty) {
            ValCat::Ref => self.code.op(op::ACONST_NULL, 1),
            ValCat::Int => self.code.op(op::ICONST_0, 1),
            ValCat::Long => self.code.op(op::LCONST_0, 2),
            ValCat::Float => self.code.op(op::FCONST_0, 1),
            ValCat::Double => self.code.op(op::DCONST_0, 2),
        }
    }

    fn ldc(&mut self, idx: u16) -> Result<()> {
        if idx <= 0xff {
            self.code.emit1(op::LDC);
            self.code.emit1(idx as u8);
        } else {
            self.code.emit1(op::LDC_W);
            self.code.emit2(idx);
        }
        self.code.adjust(1)
    }

    fn ldc2(&mut self, idx: u16) -> Result<()> {
        self.code.emit1(op::LDC2_W);
        self.code.emit2(idx);
        self.code.adjust(2)
    }
}

// ----------------------------------------------------------------------
// Opcode selection tables
// ----------------------------------------------------------------------

impl BaseType {
    /// Unary numeric promotion target (sub-int computes as int)
    fn from_promotion(base: BaseType) -> BaseType {
        match base {
            BaseType::Byte | BaseType::Short | BaseType::Char => BaseType::Int,
            other => other,
        }
    }
}

fn arith_opcode(bop: BinOp, cat: ValCat) -> Option<u8> {
    let base = match bop {
        BinOp::Add => op::IADD,
        BinOp::Sub => op::ISUB,
        BinOp::Mul => op::IMUL,
        BinOp::Div => op::IDIV,
        BinOp::Rem => op::IREM,
        BinOp::Shl => op::ISHL,
        BinOp::Shr => op::ISHR,
        BinOp::Ushr => op::IUSHR,
        BinOp::BitAnd => op::IAND,
        BinOp::BitOr => op::IOR,
        BinOp::BitXor => op::IXOR,
        _ => return None,
    };
    match cat {
        ValCat::Ref => None,
        cat if bop.is_shift() && !matches!(cat, ValCat::Int | ValCat::Long) => None,
        cat => Some(base + cat_index(cat)),
    }
}

fn if_opcode(bop: BinOp) -> u8 {
    match bop {
        BinOp::Eq => op::IFEQ,
        BinOp::Ne => op::IFNE,
        BinOp::Lt => op::IFLT,
        BinOp::Ge => op::IFGE,
        BinOp::Gt => op::IFGT,
        _ => op::IFLE,
    }
}

fn icmp_opcode(bop: BinOp) -> u8 {
    match bop {
        BinOp::Eq => op::IF_ICMPEQ,
        BinOp::Ne => op::IF_ICMPNE,
        BinOp::Lt => op::IF_ICMPLT,
        BinOp::Ge => op::IF_ICMPGE,
        BinOp::Gt => op::IF_ICMPGT,
        _ => op::IF_ICMPLE,
    }
}

fn negate_compare(bop: BinOp) -> BinOp {
    match bop {
        BinOp::Eq => BinOp::Ne,
        BinOp::Ne => BinOp::Eq,
        BinOp::Lt => BinOp::Ge,
        BinOp::Ge => BinOp::Lt,
        BinOp::Gt => BinOp::Le,
        _ => BinOp::Gt,
    }
}

/// Mirror a comparison when its operands swap sides
fn swap_compare(bop: BinOp) -> BinOp {
    match bop {
        BinOp::Lt => BinOp::Gt,
        BinOp::Gt => BinOp::Lt,
        BinOp::Le => BinOp::Ge,
        BinOp::Ge => BinOp::Le,
        other => other,
    }
}

fn compound_operand_type(bop: BinOp, tty: &TypeDesc, vty: &TypeDesc) -> TypeDesc {
    if tty.is_boolean() {
        return tty.clone();
    }
    if bop.is_shift() {
        return TypeDesc::primitive(BaseType::from_promotion(tty.base));
    }
    TypeDesc::primitive(crate::types::binary_promotion(tty.base, vty.base))
}

fn array_load_op(elem: &TypeDesc) -> Result<(u8, i32)> {
    if elem.is_reference() {
        return Ok((op::AALOAD, 1));
    }
    Ok(match elem.base {
        BaseType::Byte | BaseType::Boolean => (op::BALOAD, 1),
        BaseType::Char => (op::CALOAD, 1),
        BaseType::Short => (op::SALOAD, 1),
        BaseType::Int => (op::IALOAD, 1),
        BaseType::Long => (op::LALOAD, 2),
        BaseType::Float => (op::FALOAD, 1),
        BaseType::Double => (op::DALOAD, 2),
        _ => return Err(Error::internal("bad array element type")),
    })
}

fn array_store_op(elem: &TypeDesc) -> Result<(u8, i32)> {
    if elem.is_reference() {
        return Ok((op::AASTORE, 1));
    }
    Ok(match elem.base {
        BaseType::Byte | BaseType::Boolean => (op::BASTORE, 1),
        BaseType::Char => (op::CASTORE, 1),
        BaseType::Short => (op::SASTORE, 1),
        BaseType::Int => (op::IASTORE, 1),
        BaseType::Long => (op::LASTORE, 2),
        BaseType::Float => (op::FASTORE, 1),
        BaseType::Double => (op::DASTORE, 2),
        _ => return Err(Error::internal("bad array element type")),
    })
}

fn newarray_atype(base: BaseType) -> Result<u8> {
    Ok(match base {
        BaseType::Boolean => op::atype::BOOLEAN,
        BaseType::Char => op::atype::CHAR,
        BaseType::Float => op::atype::FLOAT,
        BaseType::Double => op::atype::DOUBLE,
        BaseType::Byte => op::atype::BYTE,
        BaseType::Short => op::atype::SHORT,
        BaseType::Int => op::atype::INT,
        BaseType::Long => op::atype::LONG,
        _ => return Err(Error::internal("bad array element type")),
    })
}

fn append_descriptor(ty: &TypeDesc) -> (&'static str, i32) {
    if ty.is_string() {
        return ("(Ljava/lang/String;)Ljava/lang/StringBuilder;", 1);
    }
    if ty.is_reference() {
        return ("(Ljava/lang/Object;)Ljava/lang/StringBuilder;", 1);
    }
    match ty.base {
        BaseType::Boolean => ("(Z)Ljava/lang/StringBuilder;", 1),
        BaseType::Char => ("(C)Ljava/lang/StringBuilder;", 1),
        BaseType::Long => ("(J)Ljava/lang/StringBuilder;", 2),
        BaseType::Float => ("(F)Ljava/lang/StringBuilder;", 1),
        BaseType::Double => ("(D)Ljava/lang/StringBuilder;", 2),
        _ => ("(I)Ljava/lang/StringBuilder;", 1),
    }
}

fn case_value(e: &Expr) -> Result<i32> {
    match &e.kind {
        ExprKind::IntLit(v) => Ok(*v),
        ExprKind::CharLit(c) => Ok(*c as i32),
        _ => Err(Error::internal("non-constant case label reached the generator")),
    }
}

fn offset32(base: usize, target: usize) -> Result<u32> {
    let diff = target as i64 - base as i64;
    i32::try_from(diff)
        .map(|v| v as u32)
        .map_err(|_| Error::internal("switch offset does not fit the method body"))
}
