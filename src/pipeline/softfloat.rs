//! Soft-float lowering stage.
//!
//! For targets without double-precision hardware: double immediates become
//! `ii2d` of their two 32-bit halves, and double arithmetic, comparisons,
//! and conversions become calls to helper built-ins. Float and packed-float
//! operations pass through untouched.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{
    AccSet, Abi, Builtin, CallSig, Callee, ExitId, LirBuffer, NodeId, Opcode, SigId, ValueKind,
};

pub struct SoftFloatFilter {
    out: Box<dyn LirSink>,
    buf: Rc<RefCell<LirBuffer>>,
    sigs: HashMap<Builtin, SigId>,
}

struct Helper {
    builtin: Builtin,
    name: &'static str,
    args: &'static [ValueKind],
    ret: ValueKind,
}

const D: ValueKind = ValueKind::F64;
const I: ValueKind = ValueKind::I32;
const F: ValueKind = ValueKind::F32;

fn unary_helper(op: Opcode) -> Option<Helper> {
    use Builtin::*;
    use Opcode::*;
    let (builtin, name, args, ret): (Builtin, &'static str, &'static [ValueKind], ValueKind) =
        match op {
            NegD => (SfNegD, "sf_negd", &[D], D),
            I2D => (SfI2D, "sf_i2d", &[I], D),
            UI2D => (SfUi2D, "sf_ui2d", &[I], D),
            D2I => (SfD2I, "sf_d2i", &[D], I),
            D2F => (SfD2F, "sf_d2f", &[D], F),
            F2D => (SfF2D, "sf_f2d", &[F], D),
            _ => return None,
        };
    Some(Helper { builtin, name, args, ret })
}

fn binary_helper(op: Opcode) -> Option<Helper> {
    use Builtin::*;
    use Opcode::*;
    let (builtin, name, args, ret): (Builtin, &'static str, &'static [ValueKind], ValueKind) =
        match op {
            AddD => (SfAddD, "sf_addd", &[D, D], D),
            SubD => (SfSubD, "sf_subd", &[D, D], D),
            MulD => (SfMulD, "sf_muld", &[D, D], D),
            DivD => (SfDivD, "sf_divd", &[D, D], D),
            EqD => (SfEqD, "sf_eqd", &[D, D], I),
            LtD => (SfLtD, "sf_ltd", &[D, D], I),
            GtD => (SfGtD, "sf_gtd", &[D, D], I),
            LeD => (SfLeD, "sf_led", &[D, D], I),
            GeD => (SfGeD, "sf_ged", &[D, D], I),
            _ => return None,
        };
    Some(Helper { builtin, name, args, ret })
}

impl SoftFloatFilter {
    pub fn new(out: Box<dyn LirSink>, buf: Rc<RefCell<LirBuffer>>) -> Self {
        SoftFloatFilter {
            out,
            buf,
            sigs: HashMap::new(),
        }
    }

    fn sig_for(&mut self, helper: &Helper) -> SigId {
        if let Some(&id) = self.sigs.get(&helper.builtin) {
            return id;
        }
        let id = self.buf.borrow_mut().add_sig(CallSig {
            name: helper.name.to_string(),
            abi: Abi::Cdecl,
            args: helper.args.to_vec(),
            ret: helper.ret,
            callee: Callee::Builtin(helper.builtin),
        });
        self.sigs.insert(helper.builtin, id);
        id
    }
}

impl LirSink for SoftFloatFilter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.out.ins0(op)
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        if let Some(helper) = unary_helper(op) {
            let sig = self.sig_for(&helper);
            return self.out.call(sig, &[a]);
        }
        self.out.ins1(op, a)
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        if let Some(helper) = binary_helper(op) {
            let sig = self.sig_for(&helper);
            // Call args are stored in reverse source order.
            return self.out.call(sig, &[b, a]);
        }
        self.out.ins2(op, a, b)
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        self.out.ins3(op, a, b, c)
    }

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError> {
        self.out.imm_i(value)
    }

    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError> {
        self.out.imm_q(value)
    }

    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError> {
        let bits = value.to_bits();
        let lo = self.out.imm_i(bits as u32 as i32)?;
        let hi = self.out.imm_i((bits >> 32) as u32 as i32)?;
        self.out.ins2(Opcode::II2D, lo, hi)
    }

    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError> {
        self.out.imm_f(value)
    }

    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError> {
        self.out.imm_f4(value)
    }

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError> {
        self.out.param(op, index, kind)
    }

    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError> {
        self.out.alloc(size)
    }

    fn load(
        &mut self,
        op: Opcode,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
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
        self.out.label()
    }
}
