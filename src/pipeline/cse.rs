//! Streaming common-subexpression elimination.
//!
//! Pure value-producing instructions are keyed on opcode plus operands;
//! re-emitting an already-seen expression returns the old node instead of
//! growing the buffer. Float keys use bit patterns so that NaN and signed
//! zero dedup correctly. Labels are join points: the table is flushed
//! because values computed on one path are not available on another.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, NodeId, Opcode, SigId, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CseKey {
    Op1(Opcode, u32),
    Op2(Opcode, u32, u32),
    Op3(Opcode, u32, u32, u32),
    ImmI(i32),
    ImmQ(u64),
    ImmD(u64),
    ImmF(u32),
    ImmF4([u32; 4]),
}

pub struct CseFilter {
    out: Box<dyn LirSink>,
    #[allow(dead_code)]
    buf: Rc<RefCell<LirBuffer>>,
    seen: HashMap<CseKey, NodeId>,
}

impl CseFilter {
    pub fn new(out: Box<dyn LirSink>, buf: Rc<RefCell<LirBuffer>>) -> Self {
        CseFilter {
            out,
            buf,
            seen: HashMap::new(),
        }
    }

    fn cached(
        &mut self,
        key: CseKey,
        emit: impl FnOnce(&mut Box<dyn LirSink>) -> Result<NodeId, AsmError>,
    ) -> Result<NodeId, AsmError> {
        if let Some(&id) = self.seen.get(&key) {
            return Ok(id);
        }
        let id = emit(&mut self.out)?;
        self.seen.insert(key, id);
        Ok(id)
    }
}

impl LirSink for CseFilter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.out.ins0(op)
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        if op.result_kind() == ValueKind::Void {
            // Returns and liveness hints have effects; never dedup them.
            return self.out.ins1(op, a);
        }
        self.cached(CseKey::Op1(op, a.0), |out| out.ins1(op, a))
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        let (a, b) = if op.is_commutative() && b.0 < a.0 {
            (b, a)
        } else {
            (a, b)
        };
        self.cached(CseKey::Op2(op, a.0, b.0), |out| out.ins2(op, a, b))
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        self.cached(CseKey::Op3(op, a.0, b.0, c.0), |out| out.ins3(op, a, b, c))
    }

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError> {
        self.cached(CseKey::ImmI(value), |out| out.imm_i(value))
    }

    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError> {
        self.cached(CseKey::ImmQ(value), |out| out.imm_q(value))
    }

    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError> {
        self.cached(CseKey::ImmD(value.to_bits()), |out| out.imm_d(value))
    }

    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError> {
        self.cached(CseKey::ImmF(value.to_bits()), |out| out.imm_f(value))
    }

    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError> {
        let bits = [
            value[0].to_bits(),
            value[1].to_bits(),
            value[2].to_bits(),
            value[3].to_bits(),
        ];
        self.cached(CseKey::ImmF4(bits), |out| out.imm_f4(value))
    }

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError> {
        self.out.param(op, index, kind)
    }

    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError> {
        // Each alloc is a distinct stack slot.
        self.out.alloc(size)
    }

    fn load(
        &mut self,
        op: Opcode,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        // Loads may alias stores; leave them alone.
        self.out.load(op, base, disp, acc)
    }

    fn store(
        &mut self,
        op: Opcode,
        value: NodeId,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.out.store(op, value, base, disp, acc)
    }

    fn call(&mut self, sig: SigId, args: &[NodeId]) -> Result<NodeId, AsmError> {
        self.out.call(sig, args)
    }

    fn branch(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.out.branch(op, cond, target)
    }

    fn branch_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        self.out.branch_ov(op, lhs, rhs, target)
    }

    fn guard(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.out.guard(op, cond, exit)
    }

    fn guard_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.out.guard_ov(op, lhs, rhs, exit)
    }

    fn label(&mut self) -> Result<NodeId, AsmError> {
        self.seen.clear();
        self.out.label()
    }
}
