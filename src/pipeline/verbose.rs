//! Tracer stage: prints each instruction that reaches it, in disassembly
//! form, to stderr.

use std::cell::RefCell;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, NodeId, Opcode, SigId};

pub struct VerboseWriter {
    out: Box<dyn LirSink>,
    buf: Rc<RefCell<LirBuffer>>,
}

impl VerboseWriter {
    pub fn new(out: Box<dyn LirSink>, buf: Rc<RefCell<LirBuffer>>) -> Self {
        VerboseWriter { out, buf }
    }

    fn trace(&self, id: NodeId) -> NodeId {
        eprintln!("@{:<5} {}", id.0, self.buf.borrow().fmt_node(id));
        id
    }
}

impl LirSink for VerboseWriter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.out.ins0(op).map(|id| self.trace(id))
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        self.out.ins1(op, a).map(|id| self.trace(id))
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        self.out.ins2(op, a, b).map(|id| self.trace(id))
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        self.out.ins3(op, a, b, c).map(|id| self.trace(id))
    }

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError> {
        self.out.imm_i(value).map(|id| self.trace(id))
    }

    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError> {
        self.out.imm_q(value).map(|id| self.trace(id))
    }

    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError> {
        self.out.imm_d(value).map(|id| self.trace(id))
    }

    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError> {
        self.out.imm_f(value).map(|id| self.trace(id))
    }

    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError> {
        self.out.imm_f4(value).map(|id| self.trace(id))
    }

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError> {
        self.out.param(op, index, kind).map(|id| self.trace(id))
    }

    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError> {
        self.out.alloc(size).map(|id| self.trace(id))
    }

    fn load(
        &mut self,
        op: Opcode,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.out.load(op, base, disp, acc).map(|id| self.trace(id))
    }

    fn store(
        &mut self,
        op: Opcode,
        value: NodeId,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.out
            .store(op, value, base, disp, acc)
            .map(|id| self.trace(id))
    }

    fn call(&mut self, sig: SigId, args: &[NodeId]) -> Result<NodeId, AsmError> {
        self.out.call(sig, args).map(|id| self.trace(id))
    }

    fn branch(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.out.branch(op, cond, target).map(|id| self.trace(id))
    }

    fn branch_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.out
            .branch_ov(op, lhs, rhs, target)
            .map(|id| self.trace(id))
    }

    fn guard(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.out.guard(op, cond, exit).map(|id| self.trace(id))
    }

    fn guard_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.out
            .guard_ov(op, lhs, rhs, exit)
            .map(|id| self.trace(id))
    }

    fn label(&mut self) -> Result<NodeId, AsmError> {
        self.out.label().map(|id| self.trace(id))
    }
}
