//! Algebraic simplification stage.
//!
//! Folds operations whose operands are immediates, using the exact
//! arithmetic of each type (wrapping two's complement for integers, IEEE
//! for doubles and floats), and rewrites a small set of identities that
//! never change an observable result. Division and remainder are never
//! folded; a zero divisor must surface at run time, not at assembly time.

use std::cell::RefCell;
use std::rc::Rc;

use super::LirSink;
use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, NodeId, Opcode, Payload, SigId};

pub struct ExprFilter {
    out: Box<dyn LirSink>,
    buf: Rc<RefCell<LirBuffer>>,
}

impl ExprFilter {
    pub fn new(out: Box<dyn LirSink>, buf: Rc<RefCell<LirBuffer>>) -> Self {
        ExprFilter { out, buf }
    }

    fn imm_i_of(&self, id: NodeId) -> Option<i32> {
        self.buf.borrow().node(id).imm_i()
    }

    fn imm_q_of(&self, id: NodeId) -> Option<u64> {
        self.buf.borrow().node(id).imm_q()
    }

    fn imm_d_of(&self, id: NodeId) -> Option<f64> {
        self.buf.borrow().node(id).imm_d()
    }

    fn imm_f_of(&self, id: NodeId) -> Option<f32> {
        self.buf.borrow().node(id).imm_f()
    }

    fn imm_f4_of(&self, id: NodeId) -> Option<[f32; 4]> {
        match self.buf.borrow().node(id).payload {
            Payload::ImmF4(v) => Some(v),
            _ => None,
        }
    }

    /// Inner operand of a unary node with the given opcode, for
    /// double-negation rewrites.
    fn unary_operand(&self, id: NodeId, op: Opcode) -> Option<NodeId> {
        let buf = self.buf.borrow();
        let node = buf.node(id);
        match node.payload {
            Payload::Unary(inner) if node.op == op => Some(inner),
            _ => None,
        }
    }
}

/// Integer folds. `None` for div: not foldable here.
fn fold_int(op: Opcode, x: i32, y: i32) -> Option<i32> {
    use Opcode::*;
    Some(match op {
        AddI => x.wrapping_add(y),
        SubI => x.wrapping_sub(y),
        MulI => x.wrapping_mul(y),
        AndI => x & y,
        OrI => x | y,
        XorI => x ^ y,
        LshI => x.wrapping_shl(y as u32 & 31),
        RshI => x.wrapping_shr(y as u32 & 31),
        RshUI => ((x as u32).wrapping_shr(y as u32 & 31)) as i32,
        EqI => (x == y) as i32,
        LtI => (x < y) as i32,
        GtI => (x > y) as i32,
        LeI => (x <= y) as i32,
        GeI => (x >= y) as i32,
        LtUI => ((x as u32) < y as u32) as i32,
        GtUI => (x as u32 > y as u32) as i32,
        LeUI => (x as u32 <= y as u32) as i32,
        GeUI => (x as u32 >= y as u32) as i32,
        _ => return None,
    })
}

/// Quad arithmetic folds (shifts handled separately: their count is i32).
fn fold_quad(op: Opcode, x: u64, y: u64) -> Option<u64> {
    use Opcode::*;
    Some(match op {
        AddQ => x.wrapping_add(y),
        SubQ => x.wrapping_sub(y),
        AndQ => x & y,
        OrQ => x | y,
        XorQ => x ^ y,
        _ => return None,
    })
}

fn fold_quad_cmp(op: Opcode, x: u64, y: u64) -> Option<i32> {
    use Opcode::*;
    let (sx, sy) = (x as i64, y as i64);
    Some(match op {
        EqQ => (x == y) as i32,
        LtQ => (sx < sy) as i32,
        GtQ => (sx > sy) as i32,
        LeQ => (sx <= sy) as i32,
        GeQ => (sx >= sy) as i32,
        LtUQ => (x < y) as i32,
        GtUQ => (x > y) as i32,
        LeUQ => (x <= y) as i32,
        GeUQ => (x >= y) as i32,
        _ => return None,
    })
}

fn fold_double(op: Opcode, x: f64, y: f64) -> Option<f64> {
    use Opcode::*;
    Some(match op {
        AddD => x + y,
        SubD => x - y,
        MulD => x * y,
        DivD => x / y,
        _ => return None,
    })
}

fn fold_double_cmp(op: Opcode, x: f64, y: f64) -> Option<i32> {
    use Opcode::*;
    Some(match op {
        EqD => (x == y) as i32,
        LtD => (x < y) as i32,
        GtD => (x > y) as i32,
        LeD => (x <= y) as i32,
        GeD => (x >= y) as i32,
        _ => return None,
    })
}

fn fold_float(op: Opcode, x: f32, y: f32) -> Option<f32> {
    use Opcode::*;
    Some(match op {
        AddF => x + y,
        SubF => x - y,
        MulF => x * y,
        DivF => x / y,
        _ => return None,
    })
}

fn fold_float_cmp(op: Opcode, x: f32, y: f32) -> Option<i32> {
    use Opcode::*;
    Some(match op {
        EqF => (x == y) as i32,
        LtF => (x < y) as i32,
        GtF => (x > y) as i32,
        LeF => (x <= y) as i32,
        GeF => (x >= y) as i32,
        _ => return None,
    })
}

fn fold_f4(op: Opcode, x: [f32; 4], y: [f32; 4]) -> Option<[f32; 4]> {
    use Opcode::*;
    let mut r = [0f32; 4];
    for i in 0..4 {
        r[i] = match op {
            AddF4 => x[i] + y[i],
            SubF4 => x[i] - y[i],
            MulF4 => x[i] * y[i],
            DivF4 => x[i] / y[i],
            _ => return None,
        };
    }
    Some(r)
}

impl LirSink for ExprFilter {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.out.ins0(op)
    }

    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError> {
        use Opcode::*;

        // neg(neg(x)) and not(not(x)) cancel exactly for every input.
        if matches!(op, NegI | NotI | NegD | NegF) {
            if let Some(inner) = self.unary_operand(a, op) {
                return Ok(inner);
            }
        }

        if let Some(x) = self.imm_i_of(a) {
            match op {
                NegI => return self.out.imm_i(x.wrapping_neg()),
                NotI => return self.out.imm_i(!x),
                I2Q => return self.out.imm_q(x as i64 as u64),
                UI2UQ => return self.out.imm_q(x as u32 as u64),
                I2D => return self.out.imm_d(x as f64),
                UI2D => return self.out.imm_d(x as u32 as f64),
                I2F => return self.out.imm_f(x as f32),
                UI2F => return self.out.imm_f(x as u32 as f32),
                _ => {}
            }
        }
        if let Some(x) = self.imm_q_of(a) {
            match op {
                Q2I => return self.out.imm_i(x as u32 as i32),
                QasD => return self.out.imm_d(f64::from_bits(x)),
                _ => {}
            }
        }
        if let Some(x) = self.imm_d_of(a) {
            match op {
                NegD => return self.out.imm_d(-x),
                DasQ => return self.out.imm_q(x.to_bits()),
                Dlo2I => return self.out.imm_i(x.to_bits() as u32 as i32),
                Dhi2I => return self.out.imm_i((x.to_bits() >> 32) as u32 as i32),
                D2I => return self.out.imm_i(x as i32),
                D2F => return self.out.imm_f(x as f32),
                _ => {}
            }
        }
        if let Some(x) = self.imm_f_of(a) {
            match op {
                NegF => return self.out.imm_f(-x),
                F2I => return self.out.imm_i(x as i32),
                F2D => return self.out.imm_d(x as f64),
                F2F4 => return self.out.imm_f4([x; 4]),
                _ => {}
            }
        }
        if let Some(x) = self.imm_f4_of(a) {
            match op {
                F4X => return self.out.imm_f(x[0]),
                F4Y => return self.out.imm_f(x[1]),
                F4Z => return self.out.imm_f(x[2]),
                F4W => return self.out.imm_f(x[3]),
                _ => {}
            }
        }
        self.out.ins1(op, a)
    }

    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError> {
        use Opcode::*;

        // Same-operand identities.
        if a == b {
            match op {
                SubI | XorI => return self.out.imm_i(0),
                SubQ | XorQ => return self.out.imm_q(0),
                AndI | OrI => return Ok(a),
                AndQ | OrQ => return Ok(a),
                EqI => return self.out.imm_i(1),
                EqQ => return self.out.imm_i(1),
                _ => {}
            }
        }

        let (ia, ib) = (self.imm_i_of(a), self.imm_i_of(b));
        if let (Some(x), Some(y)) = (ia, ib) {
            if let Some(r) = fold_int(op, x, y) {
                return self.out.imm_i(r);
            }
            if op == II2D {
                let bits = ((y as u32 as u64) << 32) | x as u32 as u64;
                return self.out.imm_d(f64::from_bits(bits));
            }
        }
        // Integer identities with one immediate operand.
        match (op, ia, ib) {
            (AddI | OrI | XorI, Some(0), _) => return Ok(b),
            (AddI | SubI | OrI | XorI | LshI | RshI | RshUI, _, Some(0)) => return Ok(a),
            (MulI, Some(1), _) => return Ok(b),
            (MulI, _, Some(1)) => return Ok(a),
            (MulI | AndI, Some(0), _) | (MulI | AndI, _, Some(0)) => return self.out.imm_i(0),
            _ => {}
        }

        let (qa, qb) = (self.imm_q_of(a), self.imm_q_of(b));
        if let (Some(x), Some(y)) = (qa, qb) {
            if let Some(r) = fold_quad(op, x, y) {
                return self.out.imm_q(r);
            }
            if let Some(r) = fold_quad_cmp(op, x, y) {
                return self.out.imm_i(r);
            }
        }
        if let (Some(x), Some(y)) = (qa, ib) {
            match op {
                LshQ => return self.out.imm_q(x.wrapping_shl(y as u32 & 63)),
                RshQ => return self.out.imm_q(((x as i64).wrapping_shr(y as u32 & 63)) as u64),
                RshUQ => return self.out.imm_q(x.wrapping_shr(y as u32 & 63)),
                _ => {}
            }
        }
        match (op, qa, qb) {
            (AddQ | OrQ | XorQ, Some(0), _) => return Ok(b),
            (AddQ | SubQ | OrQ | XorQ, _, Some(0)) => return Ok(a),
            (AndQ, Some(0), _) | (AndQ, _, Some(0)) => return self.out.imm_q(0),
            (LshQ | RshQ | RshUQ, _, _) if ib == Some(0) => return Ok(a),
            _ => {}
        }

        let (da, db) = (self.imm_d_of(a), self.imm_d_of(b));
        if let (Some(x), Some(y)) = (da, db) {
            if let Some(r) = fold_double(op, x, y) {
                return self.out.imm_d(r);
            }
            if let Some(r) = fold_double_cmp(op, x, y) {
                return self.out.imm_i(r);
            }
        }
        // x*1.0 is exact for every double, including NaN and -0.0.
        if op == MulD && (da == Some(1.0) || db == Some(1.0)) {
            return Ok(if da == Some(1.0) { b } else { a });
        }

        let (fa, fb) = (self.imm_f_of(a), self.imm_f_of(b));
        if let (Some(x), Some(y)) = (fa, fb) {
            if let Some(r) = fold_float(op, x, y) {
                return self.out.imm_f(r);
            }
            if let Some(r) = fold_float_cmp(op, x, y) {
                return self.out.imm_i(r);
            }
        }
        if op == MulF && (fa == Some(1.0) || fb == Some(1.0)) {
            return Ok(if fa == Some(1.0) { b } else { a });
        }

        if let (Some(x), Some(y)) = (self.imm_f4_of(a), self.imm_f4_of(b)) {
            if let Some(r) = fold_f4(op, x, y) {
                return self.out.imm_f4(r);
            }
            if op == EqF4 {
                return self.out.imm_i((x == y) as i32);
            }
        }

        self.out.ins2(op, a, b)
    }

    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId) -> Result<NodeId, AsmError> {
        // cmov with a known condition or identical arms.
        if let Some(cond) = self.imm_i_of(a) {
            return Ok(if cond != 0 { b } else { c });
        }
        if b == c {
            return Ok(b);
        }
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
