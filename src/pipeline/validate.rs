//! Structural validation stage.
//!
//! Checks operand kinds and shapes before forwarding. Installed at the top
//! and bottom of the pipeline in debug mode, so a bad instruction is
//! reported both as written and as transformed.

use std::cell::RefCell;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, NodeId, Opcode, SigId, ValueKind};

pub struct ValidateWriter {
    out: Box<dyn LirSink>,
    buf: Rc<RefCell<LirBuffer>>,
    /// Which end of the pipeline this validator sits at, for error text.
    stage: &'static str,
}

impl ValidateWriter {
    pub fn new(out: Box<dyn LirSink>, buf: Rc<RefCell<LirBuffer>>, stage: &'static str) -> Self {
        ValidateWriter { out, buf, stage }
    }

    fn kind_of(&self, id: NodeId) -> ValueKind {
        self.buf.borrow().node(id).kind()
    }

    fn check(&self, op: Opcode, which: &str, id: NodeId, want: ValueKind) -> Result<(), AsmError> {
        let got = self.kind_of(id);
        let ok = got == want || (want.is_quad() && got.is_quad());
        if ok {
            return Ok(());
        }
        Err(self.fail(format!(
            "{}: {} operand has kind {}, expected {}",
            op, which, got, want
        )))
    }

    fn fail(&self, detail: String) -> AsmError {
        AsmError::Validate {
            stage: self.stage,
            detail,
        }
    }
}

/// Expected operand kind of a unary opcode.
fn unary_input(op: Opcode) -> Option<ValueKind> {
    use Opcode::*;
    Some(match op {
        LiveI | NegI | NotI | ModI | I2Q | UI2UQ | I2D | UI2D | I2F | UI2F | RetI => {
            ValueKind::I32
        }
        LiveQ | Q2I | QasD | RetQ => ValueKind::I64,
        LiveD | NegD | Dlo2I | Dhi2I | DasQ | D2I | D2F | RetD => ValueKind::F64,
        LiveF | NegF | F2I | F2D | F2F4 | RetF => ValueKind::F32,
        LiveF4 | NegF4 | F4X | F4Y | F4Z | F4W | RetF4 => ValueKind::F4,
        _ => return None,
    })
}

/// Expected operand kinds of a binary opcode.
fn binary_inputs(op: Opcode) -> Option<(ValueKind, ValueKind)> {
    use Opcode::*;
    Some(match op {
        AddI | SubI | MulI | DivI | AndI | OrI | XorI | LshI | RshI | RshUI | EqI | LtI
        | GtI | LeI | GeI | LtUI | GtUI | LeUI | GeUI | II2D => (ValueKind::I32, ValueKind::I32),
        AddQ | SubQ | AndQ | OrQ | XorQ | EqQ | LtQ | GtQ | LeQ | GeQ | LtUQ | GtUQ | LeUQ
        | GeUQ => (ValueKind::I64, ValueKind::I64),
        // Quad shift counts are 32-bit.
        LshQ | RshQ | RshUQ => (ValueKind::I64, ValueKind::I32),
        AddD | SubD | MulD | DivD | EqD | LtD | GtD | LeD | GeD => {
            (ValueKind::F64, ValueKind::F64)
        }
        AddF | SubF | MulF | DivF | EqF | LtF | GtF | LeF | GeF => {
            (ValueKind::F32, ValueKind::F32)
        }
        AddF4 | SubF4 | MulF4 | DivF4 | EqF4 => (ValueKind::F4, ValueKind::F4),
        _ => return None,
    })
}

/// Kind of the value a store writes.
fn store_input(op: Opcode) -> ValueKind {
    use Opcode::*;
    match op {
        StI | StI2C | StI2S => ValueKind::I32,
        StQ => ValueKind::I64,
        StD | StD2F => ValueKind::F64,
        StF => ValueKind::F32,
        StF4 => ValueKind::F4,
        _ => ValueKind::Void,
    }
}

impl LirSink for ValidateWriter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.out.ins0(op)
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        match unary_input(op) {
            Some(want) => self.check(op, "value", a, want)?,
            None => return Err(self.fail(format!("{}: not a unary opcode", op))),
        }
        self.out.ins1(op, a)
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        match binary_inputs(op) {
            Some((wa, wb)) => {
                self.check(op, "left", a, wa)?;
                self.check(op, "right", b, wb)?;
            }
            None => return Err(self.fail(format!("{}: not a binary opcode", op))),
        }
        self.out.ins2(op, a, b)
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        let arm = op.result_kind();
        self.check(op, "condition", a, ValueKind::I32)?;
        self.check(op, "true-arm", b, arm)?;
        self.check(op, "false-arm", c, arm)?;
        self.out.ins3(op, a, b, c)
    }

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError> {
        self.out.imm_i(value)
    }

    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError> {
        self.out.imm_q(value)
    }

    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError> {
        self.out.imm_d(value)
    }

    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError> {
        self.out.imm_f(value)
    }

    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError> {
        self.out.imm_f4(value)
    }

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError> {
        if kind > 1 {
            return Err(self.fail(format!("param kind {} out of range", kind)));
        }
        self.out.param(op, index, kind)
    }

    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError> {
        if size <= 0 {
            return Err(self.fail(format!("alloc size {} must be positive", size)));
        }
        self.out.alloc(size)
    }

    fn load(
        &mut self,
        op: Opcode,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError> {
        self.check(op, "base", base, ValueKind::Ptr)?;
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
        self.check(op, "value", value, store_input(op))?;
        self.check(op, "base", base, ValueKind::Ptr)?;
        self.out.store(op, value, base, disp, acc)
    }

    fn call(&mut self, sig: SigId, args: &[NodeId]) -> Result<NodeId, AsmError> {
        {
            let buf = self.buf.borrow();
            let sig = buf.sig(sig);
            if sig.args.len() != args.len() {
                return Err(self.fail(format!(
                    "call {}: {} args passed, signature has {}",
                    sig.name,
                    args.len(),
                    sig.args.len()
                )));
            }
            // Stored args are reversed relative to the signature.
            for (i, (&arg, &want)) in args.iter().rev().zip(sig.args.iter()).enumerate() {
                let got = buf.node(arg).kind();
                let ok = got == want || (want.is_quad() && got.is_quad());
                if !ok {
                    return Err(self.fail(format!(
                        "call {}: arg {} has kind {}, expected {}",
                        sig.name, i, got, want
                    )));
                }
            }
        }
        self.out.call(sig, args)
    }

    fn branch(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        match (op, cond) {
            (Opcode::J, None) => {}
            (Opcode::Jt | Opcode::Jf, Some(c)) => self.check(op, "condition", c, ValueKind::I32)?,
            _ => return Err(self.fail(format!("{}: condition arity mismatch", op))),
        }
        self.out.branch(op, cond, target)
    }

    fn branch_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError> {
        let want = match op {
            Opcode::AddJovQ | Opcode::SubJovQ => ValueKind::I64,
            _ => ValueKind::I32,
        };
        self.check(op, "left", lhs, want)?;
        self.check(op, "right", rhs, want)?;
        self.out.branch_ov(op, lhs, rhs, target)
    }

    fn guard(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        match (op, cond) {
            (Opcode::X | Opcode::XBarrier, None) => {}
            (Opcode::Xt | Opcode::Xf, Some(c)) => self.check(op, "condition", c, ValueKind::I32)?,
            _ => return Err(self.fail(format!("{}: condition arity mismatch", op))),
        }
        self.out.guard(op, cond, exit)
    }

    fn guard_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        exit: ExitId,
    ) -> Result<NodeId, AsmError> {
        self.check(op, "left", lhs, ValueKind::I32)?;
        self.check(op, "right", rhs, ValueKind::I32)?;
        self.out.guard_ov(op, lhs, rhs, exit)
    }

    fn label(&mut self) -> Result<NodeId, AsmError> {
        self.out.label()
    }
}
