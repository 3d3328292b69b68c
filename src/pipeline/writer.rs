//! Terminal pipeline stage: appends nodes to the shared arena.

use std::cell::RefCell;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, LirNode, NodeId, Opcode, Payload, SigId, ValueKind};

pub struct BufWriter {
    buf: Rc<RefCell<LirBuffer>>,
}

impl BufWriter {
    pub fn new(buf: Rc<RefCell<LirBuffer>>) -> Self {
        BufWriter { buf }
    }

    fn push(&self, op: Opcode, payload: Payload) -> Result<NodeId, AsmError> {
        Ok(self.buf.borrow_mut().push(LirNode { op, payload }))
    }
}

impl LirSink for BufWriter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.push(op, Payload::None)
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Unary(a))
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Binary(a, b))
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Ternary(a, b, c))
    }

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError> {
        self.push(Opcode::ImmI, Payload::ImmI(value))
    }

    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError> {
        self.push(Opcode::ImmQ, Payload::ImmQ(value))
    }

    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError> {
        self.push(Opcode::ImmD, Payload::ImmD(value))
    }

    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError> {
        self.push(Opcode::ImmF, Payload::ImmF(value))
    }

    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError> {
        self.push(Opcode::ImmF4, Payload::ImmF4(value))
    }

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError> {
        // Kind 0 is an argument register, kind 1 a saved register.
        self.push(op, Payload::Param { index, kind })
    }

    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError> {
        self.push(Opcode::AllocP, Payload::Alloc { size })
    }

    fn load(
        &mut self,
        op: Opcode,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Load { base, disp, acc })
    }

    fn store(
        &mut self,
        op: Opcode,
        value: NodeId,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Store { value, base, disp, acc })
    }

    fn call(&mut self, sig: SigId, args: &[NodeId]) -> Result<NodeId, AsmError> {
        let op = {
            let buf = self.buf.borrow();
            match buf.sig(sig).ret {
                ValueKind::Void => Opcode::CallV,
                ValueKind::I32 => Opcode::CallI,
                ValueKind::I64 | ValueKind::Ptr => Opcode::CallQ,
                ValueKind::F64 => Opcode::CallD,
                ValueKind::F32 => Opcode::CallF,
                ValueKind::F4 => Opcode::CallF4,
            }
        };
        self.push(op, Payload::Call { sig, args: args.to_vec() })
    }

    fn branch(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Branch { cond, target })
    }

    fn branch_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::BranchOv { lhs, rhs, target })
    }

    fn guard(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::Guard { cond, exit })
    }

    fn guard_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.push(op, Payload::GuardOv { lhs, rhs, exit })
    }

    fn label(&mut self) -> Result<NodeId, AsmError> {
        self.push(Opcode::Label, Payload::None)
    }
}
