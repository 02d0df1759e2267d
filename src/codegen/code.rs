//! Bytecode buffer
//!
//! A single linear instruction buffer with program-counter positions. The
//! buffer tracks the running operand-stack depth (wide types take two
//! positions) to compute `max_stack`, hands out local-variable slots to
//! compute `max_locals`, records forward jumps for backpatching, and collects
//! exception-table entries.

use crate::error::{Error, Result};
use crate::types::TypeDesc;

use super::opcodes as op;

/// Exception table entry; `catch_type == 0` is the catch-all marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Instruction buffer with stack and locals accounting
pub struct Bytecode {
    code: Vec<u8>,
    stack_depth: u16,
    max_stack: u16,
    max_locals: u16,
    exception_table: Vec<ExceptionTableEntry>,
}

impl Bytecode {
    /// `reserved_locals` covers the receiver and parameter slots
    pub fn new(reserved_locals: u16) -> Self {
        Self {
            code: Vec::with_capacity(64),
            stack_depth: 0,
            max_stack: 0,
            max_locals: reserved_locals,
            exception_table: Vec::new(),
        }
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn stack_depth(&self) -> u16 {
        self.stack_depth
    }

    pub fn into_parts(self) -> (Vec<u8>, u16, u16, Vec<ExceptionTableEntry>) {
        (self.code, self.max_stack, self.max_locals, self.exception_table)
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    pub fn emit1(&mut self, b: u8) {
        self.code.push(b);
    }

    pub fn emit2(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    pub fn emit4(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    /// Emit an opcode and adjust the stack depth by `delta`
    pub fn op(&mut self, opcode: u8, delta: i32) -> Result<()> {
        self.emit1(opcode);
        self.adjust(delta)
    }

    /// Adjust the running stack depth; underflow is a compiler bug
    pub fn adjust(&mut self, delta: i32) -> Result<()> {
        let depth = i32::from(self.stack_depth) + delta;
        if depth < 0 {
            return Err(Error::internal(format!(
                "operand stack underflow at pc {}",
                self.pc()
            )));
        }
        if depth > i32::from(u16::MAX) {
            return Err(Error::internal("operand stack overflow"));
        }
        self.stack_depth = depth as u16;
        self.max_stack = self.max_stack.max(self.stack_depth);
        Ok(())
    }

    /// Force the stack depth, used at jump targets and handler entries
    pub fn set_stack(&mut self, depth: u16) {
        self.stack_depth = depth;
        self.max_stack = self.max_stack.max(depth);
    }

    // ------------------------------------------------------------------
    // Locals
    // ------------------------------------------------------------------

    /// Allocate the next free local slot(s)
    pub fn alloc_local(&mut self, ty: &TypeDesc) -> Result<u16> {
        let slot = self.max_locals;
        let next = u32::from(slot) + u32::from(ty.width().max(1));
        if next > u32::from(u16::MAX) {
            return Err(Error::internal("too many local variables"));
        }
        self.max_locals = next as u16;
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Jumps and backpatching
    // ------------------------------------------------------------------

    /// Emit a branch with a placeholder target; returns the instruction's pc
    /// for the backpatch list
    pub fn emit_jump(&mut self, opcode: u8, delta: i32) -> Result<usize> {
        let at = self.pc();
        self.op(opcode, delta)?;
        self.emit2(0);
        Ok(at)
    }

    /// Resolve a recorded jump to the current pc
    pub fn patch_jump(&mut self, at: usize) -> Result<()> {
        self.patch_jump_to(at, self.pc())
    }

    /// Resolve a recorded jump to an explicit target pc
    pub fn patch_jump_to(&mut self, at: usize, target: usize) -> Result<()> {
        let offset = target as i64 - at as i64;
        let offset = i16::try_from(offset)
            .map_err(|_| Error::internal("branch offset does not fit the method body"))?;
        let bytes = offset.to_be_bytes();
        self.code[at + 1] = bytes[0];
        self.code[at + 2] = bytes[1];
        Ok(())
    }

    /// Unconditional jump to an already-known (backward) target
    pub fn emit_goto_back(&mut self, target: usize) -> Result<()> {
        let at = self.emit_jump(op::GOTO, 0)?;
        self.patch_jump_to(at, target)
    }

    /// Pad with zero bytes until the pc is 4-byte aligned (switch payload)
    pub fn align4(&mut self) {
        while self.pc() % 4 != 0 {
            self.emit1(0);
        }
    }

    /// Write a 32-bit value at an absolute position (switch backpatching)
    pub fn patch4(&mut self, at: usize, value: u32) {
        self.code[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    // ------------------------------------------------------------------
    // Exception table
    // ------------------------------------------------------------------

    pub fn add_exception_handler(
        &mut self,
        start_pc: usize,
        end_pc: usize,
        handler_pc: usize,
        catch_type: u16,
    ) -> Result<()> {
        let conv = |v: usize| -> Result<u16> {
            u16::try_from(v).map_err(|_| Error::internal("method body too large"))
        };
        self.exception_table.push(ExceptionTableEntry {
            start_pc: conv(start_pc)?,
            end_pc: conv(end_pc)?,
            handler_pc: conv(handler_pc)?,
            catch_type,
        });
        Ok(())
    }

    pub fn exception_table(&self) -> &[ExceptionTableEntry] {
        &self.exception_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    #[test]
    fn stack_accounting_tracks_maximum() {
        let mut code = Bytecode::new(1);
        code.op(op::ICONST_0, 1).unwrap();
        code.op(op::ICONST_0, 1).unwrap();
        code.op(op::IADD, -1).unwrap();
        assert_eq!(code.max_stack(), 2);
        assert_eq!(code.stack_depth(), 1);
    }

    #[test]
    fn stack_underflow_is_an_internal_error() {
        let mut code = Bytecode::new(0);
        let err = code.op(op::POP, -1).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn jump_backpatching() {
        let mut code = Bytecode::new(0);
        code.op(op::ICONST_0, 1).unwrap();
        let j = code.emit_jump(op::IFEQ, -1).unwrap();
        code.op(op::NOP, 0).unwrap();
        code.patch_jump(j).unwrap();
        let (bytes, _, _, _) = code.into_parts();
        // offset from the ifeq at pc 1 to pc 5
        assert_eq!(&bytes[1..4], &[op::IFEQ, 0, 4]);
    }

    #[test]
    fn wide_locals_take_two_slots() {
        let mut code = Bytecode::new(1);
        let a = code.alloc_local(&TypeDesc::primitive(BaseType::Long)).unwrap();
        let b = code.alloc_local(&TypeDesc::int()).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 3);
        assert_eq!(code.max_locals(), 4);
    }
}
