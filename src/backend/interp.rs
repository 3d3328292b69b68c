//! Reference backend: a direct interpreter over the IR arena.
//!
//! `compile` performs the checks a real code generator would fail on
//! (unresolved or out-of-range branches, oversized stack frames) and marks
//! the fragment runnable. `run` evaluates the fragment's node range with a
//! program counter; allocations are byte buffers, built-ins execute
//! natively, and guard exits either report their source line or transfer
//! into a patched target fragment.

use std::collections::{HashMap, HashSet};

use super::{Backend, ExecValue, BRANCH_RANGE, STACK_SIZE_B};
use crate::asm::program::Fragment;
use crate::error::{BackendError, BackendErrorKind};
use crate::ir::{
    Builtin, Callee, ExitId, FragmentId, LirBuffer, NodeId, Opcode, Payload, ValueKind,
};

/// A runtime value. Pointers index the interpreter's buffer table; when one
/// leaks into integer arithmetic it is read as a stable fake address.
#[derive(Debug, Clone, Copy)]
enum Val {
    I(i32),
    Q(u64),
    D(f64),
    F(f32),
    F4([f32; 4]),
    P(usize),
}

fn fake_addr(idx: usize) -> u64 {
    0x1000_0000u64 + ((idx as u64) << 16)
}

fn as_i(v: Val) -> Result<i32, String> {
    match v {
        Val::I(x) => Ok(x),
        other => Err(format!("expected a 32-bit integer, found {:?}", other)),
    }
}

fn as_q(v: Val) -> Result<u64, String> {
    match v {
        Val::Q(x) => Ok(x),
        Val::P(idx) => Ok(fake_addr(idx)),
        other => Err(format!("expected a 64-bit integer, found {:?}", other)),
    }
}

fn as_d(v: Val) -> Result<f64, String> {
    match v {
        Val::D(x) => Ok(x),
        other => Err(format!("expected a double, found {:?}", other)),
    }
}

fn as_f(v: Val) -> Result<f32, String> {
    match v {
        Val::F(x) => Ok(x),
        other => Err(format!("expected a float, found {:?}", other)),
    }
}

fn as_f4(v: Val) -> Result<[f32; 4], String> {
    match v {
        Val::F4(x) => Ok(x),
        other => Err(format!("expected a packed float, found {:?}", other)),
    }
}

/// Numeric coercion for the mixed-type call helpers.
fn as_num(v: Val) -> Result<f64, String> {
    match v {
        Val::I(x) => Ok(x as f64),
        Val::Q(x) => Ok(x as f64),
        Val::D(x) => Ok(x),
        Val::F(x) => Ok(x as f64),
        other => Err(format!("expected a numeric value, found {:?}", other)),
    }
}

const MAX_CALL_DEPTH: u32 = 64;
const MAX_MALLOC_B: u64 = 1 << 20;

pub struct InterpBackend {
    compiled: HashSet<u32>,
    max_steps: u64,
}

impl Default for InterpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpBackend {
    pub fn new() -> Self {
        InterpBackend {
            compiled: HashSet::new(),
            max_steps: 50_000_000,
        }
    }

    fn is_compiled(&self, frag: FragmentId) -> bool {
        self.compiled.contains(&frag.0)
    }

    fn exec(
        &self,
        buf: &LirBuffer,
        frags: &[Fragment],
        frag: FragmentId,
        mems: &mut Vec<Vec<u8>>,
        steps: &mut u64,
        depth: u32,
    ) -> Result<ExecValue, BackendError> {
        let record = &frags[frag.0 as usize];
        let name = record.name.clone();
        let rt = |detail: String| BackendError::Runtime {
            fragment: name.clone(),
            detail,
        };

        if depth > MAX_CALL_DEPTH {
            return Err(rt("call depth limit exceeded".to_string()));
        }

        let mut values: HashMap<u32, Val> = HashMap::new();
        let get = |values: &HashMap<u32, Val>, id: NodeId| -> Result<Val, String> {
            values
                .get(&id.0)
                .copied()
                .ok_or_else(|| format!("operand @{} has no value", id.0))
        };

        let mut pc = record.entry.0;
        while pc < record.end.0 {
            *steps += 1;
            if *steps > self.max_steps {
                return Err(rt("step limit exceeded".to_string()));
            }

            let id = NodeId(pc);
            let node = buf.node(id);
            pc += 1;

            use Opcode::*;
            match (&node.payload, node.op) {
                (Payload::None, _) => {}
                (Payload::Param { .. }, ParamI) => {
                    values.insert(id.0, Val::I(0));
                }
                (Payload::Param { .. }, _) => {
                    values.insert(id.0, Val::Q(0));
                }
                (Payload::ImmI(v), _) => {
                    values.insert(id.0, Val::I(*v));
                }
                (Payload::ImmQ(v), _) => {
                    values.insert(id.0, Val::Q(*v));
                }
                (Payload::ImmD(v), _) => {
                    values.insert(id.0, Val::D(*v));
                }
                (Payload::ImmF(v), _) => {
                    values.insert(id.0, Val::F(*v));
                }
                (Payload::ImmF4(v), _) => {
                    values.insert(id.0, Val::F4(*v));
                }
                (Payload::Alloc { size }, _) => {
                    mems.push(vec![0u8; *size as usize]);
                    values.insert(id.0, Val::P(mems.len() - 1));
                }
                (Payload::Unary(a), op @ (RetI | RetQ | RetD | RetF | RetF4)) => {
                    let v = get(&values, *a).map_err(|e| rt(e))?;
                    return Ok(match op {
                        RetI => ExecValue::I32(as_i(v).map_err(|e| rt(e))?),
                        RetQ => ExecValue::I64(as_q(v).map_err(|e| rt(e))? as i64),
                        RetD => ExecValue::Double(as_d(v).map_err(|e| rt(e))?),
                        RetF => ExecValue::Float(as_f(v).map_err(|e| rt(e))?),
                        _ => ExecValue::Float4(as_f4(v).map_err(|e| rt(e))?),
                    });
                }
                (Payload::Unary(a), op) => {
                    let v = get(&values, *a).map_err(|e| rt(e))?;
                    if let Some(out) = eval_unary(buf, &values, op, *a, v).map_err(|e| rt(e))? {
                        values.insert(id.0, out);
                    }
                }
                (Payload::Binary(a, b), op) => {
                    let x = get(&values, *a).map_err(|e| rt(e))?;
                    let y = get(&values, *b).map_err(|e| rt(e))?;
                    let out = eval_binary(op, x, y).map_err(|e| rt(e))?;
                    values.insert(id.0, out);
                }
                (Payload::Ternary(a, b, c), _) => {
                    let cond = as_i(get(&values, *a).map_err(|e| rt(e))?).map_err(|e| rt(e))?;
                    let pick = if cond != 0 { *b } else { *c };
                    let v = get(&values, pick).map_err(|e| rt(e))?;
                    values.insert(id.0, v);
                }
                (Payload::Load { base, disp, .. }, op) => {
                    let basev = get(&values, *base).map_err(|e| rt(e))?;
                    let v = eval_load(mems, op, basev, *disp).map_err(|e| rt(e))?;
                    values.insert(id.0, v);
                }
                (Payload::Store { value, base, disp, .. }, op) => {
                    let v = get(&values, *value).map_err(|e| rt(e))?;
                    let basev = get(&values, *base).map_err(|e| rt(e))?;
                    eval_store(mems, op, v, basev, *disp).map_err(|e| rt(e))?;
                }
                (Payload::Branch { cond, target }, op) => {
                    let target = target.ok_or_else(|| rt("unresolved branch".to_string()))?;
                    let taken = match (op, cond) {
                        (J, None) => true,
                        (Jt, Some(c)) => {
                            as_i(get(&values, *c).map_err(|e| rt(e))?).map_err(|e| rt(e))? != 0
                        }
                        (Jf, Some(c)) => {
                            as_i(get(&values, *c).map_err(|e| rt(e))?).map_err(|e| rt(e))? == 0
                        }
                        _ => return Err(rt(format!("malformed branch {}", op))),
                    };
                    if taken {
                        pc = target.0;
                    }
                }
                (Payload::BranchOv { lhs, rhs, target }, op) => {
                    let target = target.ok_or_else(|| rt("unresolved branch".to_string()))?;
                    let (val, overflow) =
                        eval_overflow(op, &values, *lhs, *rhs).map_err(|e| rt(e))?;
                    values.insert(id.0, val);
                    if overflow {
                        pc = target.0;
                    }
                }
                (Payload::Guard { cond, exit }, op) => {
                    let fire = match (op, cond) {
                        (X, None) => true,
                        (XBarrier, None) => false,
                        (Xt, Some(c)) => {
                            as_i(get(&values, *c).map_err(|e| rt(e))?).map_err(|e| rt(e))? != 0
                        }
                        (Xf, Some(c)) => {
                            as_i(get(&values, *c).map_err(|e| rt(e))?).map_err(|e| rt(e))? == 0
                        }
                        _ => return Err(rt(format!("malformed guard {}", op))),
                    };
                    if fire {
                        return self.take_exit(buf, frags, *exit, mems, steps, depth);
                    }
                }
                (Payload::GuardOv { lhs, rhs, exit }, op) => {
                    let (val, overflow) =
                        eval_overflow(op, &values, *lhs, *rhs).map_err(|e| rt(e))?;
                    values.insert(id.0, val);
                    if overflow {
                        return self.take_exit(buf, frags, *exit, mems, steps, depth);
                    }
                }
                (Payload::Call { sig, args }, _) => {
                    let sig = buf.sig(*sig);
                    // Stored args are in reverse source order.
                    let mut argv = Vec::with_capacity(args.len());
                    for a in args.iter().rev() {
                        argv.push(get(&values, *a).map_err(|e| rt(e))?);
                    }
                    match sig.callee {
                        Callee::Builtin(b) => {
                            if let Some(v) = eval_builtin(mems, b, &argv).map_err(|e| rt(e))? {
                                values.insert(id.0, v);
                            }
                        }
                        Callee::Fragment(fid) => {
                            if !self.is_compiled(fid) {
                                return Err(BackendError::NotCompiled {
                                    fragment: frags[fid.0 as usize].name.clone(),
                                });
                            }
                            let result = self.exec(buf, frags, fid, mems, steps, depth + 1)?;
                            match (sig.ret, result) {
                                (ValueKind::Void, _) => {}
                                (ValueKind::I32, ExecValue::I32(v)) => {
                                    values.insert(id.0, Val::I(v));
                                }
                                (ValueKind::I64 | ValueKind::Ptr, ExecValue::I64(v)) => {
                                    values.insert(id.0, Val::Q(v as u64));
                                }
                                (ValueKind::F64, ExecValue::Double(v)) => {
                                    values.insert(id.0, Val::D(v));
                                }
                                (ValueKind::F32, ExecValue::Float(v)) => {
                                    values.insert(id.0, Val::F(v));
                                }
                                (ValueKind::F4, ExecValue::Float4(v)) => {
                                    values.insert(id.0, Val::F4(v));
                                }
                                (_, ExecValue::Exited(_)) => {
                                    return Err(rt(format!(
                                        "callee '{}' exited through a guard",
                                        sig.name
                                    )));
                                }
                                (want, got) => {
                                    return Err(rt(format!(
                                        "callee '{}' returned {:?}, call site expects {}",
                                        sig.name, got, want
                                    )));
                                }
                            }
                        }
                    }
                }
                _ => return Err(rt(format!("cannot evaluate {}", node.op))),
            }
        }
        Err(rt("fell off the end of the fragment".to_string()))
    }

    fn take_exit(
        &self,
        buf: &LirBuffer,
        frags: &[Fragment],
        exit: ExitId,
        mems: &mut Vec<Vec<u8>>,
        steps: &mut u64,
        depth: u32,
    ) -> Result<ExecValue, BackendError> {
        let record = buf.exit(exit);
        match record.target {
            None => Ok(ExecValue::Exited(record.line)),
            Some(target) => {
                if !self.is_compiled(target) {
                    return Err(BackendError::NotCompiled {
                        fragment: frags[target.0 as usize].name.clone(),
                    });
                }
                self.exec(buf, frags, target, mems, steps, depth + 1)
            }
        }
    }
}

impl Backend for InterpBackend {
    fn compile(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        frag: FragmentId,
    ) -> Result<(), BackendError> {
        let record = &frags[frag.0 as usize];
        let fail = |kind: BackendErrorKind| BackendError::Compile {
            fragment: record.name.clone(),
            kind,
        };

        let mut stack_bytes: i64 = 0;
        for i in record.entry.0..record.end.0 {
            let id = NodeId(i);
            let node = buf.node(id);
            stack_bytes += node.size() as i64;
            let target = match node.payload {
                Payload::Branch { target, .. } => Some(target),
                Payload::BranchOv { target, .. } => Some(target),
                _ => None,
            };
            if let Some(target) = target {
                let target = target.ok_or_else(|| fail(BackendErrorKind::UnknownBranch))?;
                if target.0 < record.entry.0 || target.0 >= record.end.0 {
                    return Err(fail(BackendErrorKind::UnknownBranch));
                }
                if target.0.abs_diff(id.0) > BRANCH_RANGE {
                    return Err(fail(BackendErrorKind::BranchTooFar));
                }
            }
        }
        if stack_bytes > STACK_SIZE_B as i64 {
            return Err(fail(BackendErrorKind::StackFull));
        }

        self.compiled.insert(frag.0);
        Ok(())
    }

    fn patch(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        exit: ExitId,
    ) -> Result<(), BackendError> {
        let record = buf.exit(exit);
        match record.target {
            Some(target) if self.is_compiled(target) => Ok(()),
            Some(target) => Err(BackendError::NotCompiled {
                fragment: frags[target.0 as usize].name.clone(),
            }),
            None => Err(BackendError::Runtime {
                fragment: frags[record.from.0 as usize].name.clone(),
                detail: "patched guard has no target".to_string(),
            }),
        }
    }

    fn run(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        frag: FragmentId,
    ) -> Result<ExecValue, BackendError> {
        if !self.is_compiled(frag) {
            return Err(BackendError::NotCompiled {
                fragment: frags[frag.0 as usize].name.clone(),
            });
        }
        let mut mems = Vec::new();
        let mut steps = 0u64;
        self.exec(buf, frags, frag, &mut mems, &mut steps, 0)
    }
}

fn eval_unary(
    buf: &LirBuffer,
    values: &HashMap<u32, Val>,
    op: Opcode,
    operand: NodeId,
    v: Val,
) -> Result<Option<Val>, String> {
    use Opcode::*;
    Ok(Some(match op {
        NegI => Val::I(as_i(v)?.wrapping_neg()),
        NotI => Val::I(!as_i(v)?),
        NegD => Val::D(-as_d(v)?),
        NegF => Val::F(-as_f(v)?),
        NegF4 => {
            let x = as_f4(v)?;
            Val::F4([-x[0], -x[1], -x[2], -x[3]])
        }
        ModI => {
            // The operand must be the division whose remainder we want.
            let div = buf.node(operand);
            let (lhs, rhs) = match (div.op, &div.payload) {
                (DivI, Payload::Binary(a, b)) => (*a, *b),
                _ => return Err("modi operand is not a division".to_string()),
            };
            let x = as_i(values.get(&lhs.0).copied().ok_or("lost division operand")?)?;
            let y = as_i(values.get(&rhs.0).copied().ok_or("lost division operand")?)?;
            Val::I(x.wrapping_rem(y))
        }
        Dlo2I => Val::I(as_d(v)?.to_bits() as u32 as i32),
        Dhi2I => Val::I((as_d(v)?.to_bits() >> 32) as u32 as i32),
        Q2I => Val::I(as_q(v)? as u32 as i32),
        I2Q => Val::Q(as_i(v)? as i64 as u64),
        UI2UQ => Val::Q(as_i(v)? as u32 as u64),
        DasQ => Val::Q(as_d(v)?.to_bits()),
        QasD => Val::D(f64::from_bits(as_q(v)?)),
        I2D => Val::D(as_i(v)? as f64),
        UI2D => Val::D(as_i(v)? as u32 as f64),
        I2F => Val::F(as_i(v)? as f32),
        UI2F => Val::F(as_i(v)? as u32 as f32),
        D2I => Val::I(as_d(v)? as i32),
        F2I => Val::I(as_f(v)? as i32),
        F2D => Val::D(as_f(v)? as f64),
        D2F => Val::F(as_d(v)? as f32),
        F2F4 => Val::F4([as_f(v)?; 4]),
        F4X => Val::F(as_f4(v)?[0]),
        F4Y => Val::F(as_f4(v)?[1]),
        F4Z => Val::F(as_f4(v)?[2]),
        F4W => Val::F(as_f4(v)?[3]),
        // Liveness hints carry no runtime behavior.
        LiveI | LiveQ | LiveD | LiveF | LiveF4 => return Ok(None),
        other => return Err(format!("cannot evaluate unary {}", other)),
    }))
}

fn eval_binary(op: Opcode, x: Val, y: Val) -> Result<Val, String> {
    use Opcode::*;
    Ok(match op {
        AddI => Val::I(as_i(x)?.wrapping_add(as_i(y)?)),
        SubI => Val::I(as_i(x)?.wrapping_sub(as_i(y)?)),
        MulI => Val::I(as_i(x)?.wrapping_mul(as_i(y)?)),
        DivI => {
            let d = as_i(y)?;
            if d == 0 {
                return Err("integer division by zero".to_string());
            }
            Val::I(as_i(x)?.wrapping_div(d))
        }
        AndI => Val::I(as_i(x)? & as_i(y)?),
        OrI => Val::I(as_i(x)? | as_i(y)?),
        XorI => Val::I(as_i(x)? ^ as_i(y)?),
        LshI => Val::I(as_i(x)?.wrapping_shl(as_i(y)? as u32 & 31)),
        RshI => Val::I(as_i(x)?.wrapping_shr(as_i(y)? as u32 & 31)),
        RshUI => Val::I((as_i(x)? as u32).wrapping_shr(as_i(y)? as u32 & 31) as i32),
        EqI => Val::I((as_i(x)? == as_i(y)?) as i32),
        LtI => Val::I((as_i(x)? < as_i(y)?) as i32),
        GtI => Val::I((as_i(x)? > as_i(y)?) as i32),
        LeI => Val::I((as_i(x)? <= as_i(y)?) as i32),
        GeI => Val::I((as_i(x)? >= as_i(y)?) as i32),
        LtUI => Val::I(((as_i(x)? as u32) < as_i(y)? as u32) as i32),
        GtUI => Val::I((as_i(x)? as u32 > as_i(y)? as u32) as i32),
        LeUI => Val::I((as_i(x)? as u32 <= as_i(y)? as u32) as i32),
        GeUI => Val::I((as_i(x)? as u32 >= as_i(y)? as u32) as i32),
        AddQ => Val::Q(as_q(x)?.wrapping_add(as_q(y)?)),
        SubQ => Val::Q(as_q(x)?.wrapping_sub(as_q(y)?)),
        AndQ => Val::Q(as_q(x)? & as_q(y)?),
        OrQ => Val::Q(as_q(x)? | as_q(y)?),
        XorQ => Val::Q(as_q(x)? ^ as_q(y)?),
        LshQ => Val::Q(as_q(x)?.wrapping_shl(as_i(y)? as u32 & 63)),
        RshQ => Val::Q((as_q(x)? as i64).wrapping_shr(as_i(y)? as u32 & 63) as u64),
        RshUQ => Val::Q(as_q(x)?.wrapping_shr(as_i(y)? as u32 & 63)),
        EqQ => Val::I((as_q(x)? == as_q(y)?) as i32),
        LtQ => Val::I(((as_q(x)? as i64) < as_q(y)? as i64) as i32),
        GtQ => Val::I((as_q(x)? as i64 > as_q(y)? as i64) as i32),
        LeQ => Val::I((as_q(x)? as i64 <= as_q(y)? as i64) as i32),
        GeQ => Val::I((as_q(x)? as i64 >= as_q(y)? as i64) as i32),
        LtUQ => Val::I((as_q(x)? < as_q(y)?) as i32),
        GtUQ => Val::I((as_q(x)? > as_q(y)?) as i32),
        LeUQ => Val::I((as_q(x)? <= as_q(y)?) as i32),
        GeUQ => Val::I((as_q(x)? >= as_q(y)?) as i32),
        AddD => Val::D(as_d(x)? + as_d(y)?),
        SubD => Val::D(as_d(x)? - as_d(y)?),
        MulD => Val::D(as_d(x)? * as_d(y)?),
        DivD => Val::D(as_d(x)? / as_d(y)?),
        EqD => Val::I((as_d(x)? == as_d(y)?) as i32),
        LtD => Val::I((as_d(x)? < as_d(y)?) as i32),
        GtD => Val::I((as_d(x)? > as_d(y)?) as i32),
        LeD => Val::I((as_d(x)? <= as_d(y)?) as i32),
        GeD => Val::I((as_d(x)? >= as_d(y)?) as i32),
        AddF => Val::F(as_f(x)? + as_f(y)?),
        SubF => Val::F(as_f(x)? - as_f(y)?),
        MulF => Val::F(as_f(x)? * as_f(y)?),
        DivF => Val::F(as_f(x)? / as_f(y)?),
        EqF => Val::I((as_f(x)? == as_f(y)?) as i32),
        LtF => Val::I((as_f(x)? < as_f(y)?) as i32),
        GtF => Val::I((as_f(x)? > as_f(y)?) as i32),
        LeF => Val::I((as_f(x)? <= as_f(y)?) as i32),
        GeF => Val::I((as_f(x)? >= as_f(y)?) as i32),
        AddF4 | SubF4 | MulF4 | DivF4 => {
            let (a, b) = (as_f4(x)?, as_f4(y)?);
            let mut r = [0f32; 4];
            for i in 0..4 {
                r[i] = match op {
                    AddF4 => a[i] + b[i],
                    SubF4 => a[i] - b[i],
                    MulF4 => a[i] * b[i],
                    _ => a[i] / b[i],
                };
            }
            Val::F4(r)
        }
        EqF4 => {
            let (a, b) = (as_f4(x)?, as_f4(y)?);
            Val::I((0..4).all(|i| a[i] == b[i]) as i32)
        }
        II2D => {
            let bits = ((as_i(y)? as u32 as u64) << 32) | as_i(x)? as u32 as u64;
            Val::D(f64::from_bits(bits))
        }
        other => return Err(format!("cannot evaluate binary {}", other)),
    })
}

/// Shared by overflow jumps and overflow guards: the wrapped result plus
/// whether the operation overflowed.
fn eval_overflow(
    op: Opcode,
    values: &HashMap<u32, Val>,
    lhs: NodeId,
    rhs: NodeId,
) -> Result<(Val, bool), String> {
    use Opcode::*;
    let get = |id: NodeId| {
        values
            .get(&id.0)
            .copied()
            .ok_or_else(|| format!("operand @{} has no value", id.0))
    };
    let (x, y) = (get(lhs)?, get(rhs)?);
    Ok(match op {
        AddJovI | AddXovI => {
            let (x, y) = (as_i(x)?, as_i(y)?);
            let (r, o) = x.overflowing_add(y);
            (Val::I(r), o)
        }
        SubJovI | SubXovI => {
            let (x, y) = (as_i(x)?, as_i(y)?);
            let (r, o) = x.overflowing_sub(y);
            (Val::I(r), o)
        }
        MulJovI | MulXovI => {
            let (x, y) = (as_i(x)?, as_i(y)?);
            let (r, o) = x.overflowing_mul(y);
            (Val::I(r), o)
        }
        AddJovQ => {
            let (x, y) = (as_q(x)? as i64, as_q(y)? as i64);
            let (r, o) = x.overflowing_add(y);
            (Val::Q(r as u64), o)
        }
        SubJovQ => {
            let (x, y) = (as_q(x)? as i64, as_q(y)? as i64);
            let (r, o) = x.overflowing_sub(y);
            (Val::Q(r as u64), o)
        }
        other => return Err(format!("cannot evaluate overflow op {}", other)),
    })
}

fn mem_slice<'m>(
    mems: &'m mut [Vec<u8>],
    base: Val,
    disp: i32,
    len: usize,
) -> Result<&'m mut [u8], String> {
    let idx = match base {
        Val::P(idx) => idx,
        other => return Err(format!("memory access through non-pointer {:?}", other)),
    };
    let buf = &mut mems[idx];
    if disp < 0 {
        return Err(format!("negative displacement {}", disp));
    }
    let start = disp as usize;
    if start + len > buf.len() {
        return Err(format!(
            "access of {} bytes at offset {} overruns a {}-byte allocation",
            len,
            start,
            buf.len()
        ));
    }
    Ok(&mut buf[start..start + len])
}

/// Copies a length-checked slice into a fixed array for `from_le_bytes`.
fn arr<const N: usize>(mem: &[u8]) -> [u8; N] {
    let mut a = [0u8; N];
    a.copy_from_slice(&mem[..N]);
    a
}

fn eval_load(mems: &mut [Vec<u8>], op: Opcode, base: Val, disp: i32) -> Result<Val, String> {
    use Opcode::*;
    let bytes = op.access_bytes() as usize;
    let mem = mem_slice(mems, base, disp, bytes)?;
    Ok(match op {
        LdI => Val::I(i32::from_le_bytes(arr(mem))),
        LdQ => Val::Q(u64::from_le_bytes(arr(mem))),
        LdD => Val::D(f64::from_le_bytes(arr(mem))),
        LdF => Val::F(f32::from_le_bytes(arr(mem))),
        LdF2D => Val::D(f32::from_le_bytes(arr(mem)) as f64),
        LdF4 => {
            let mut r = [0f32; 4];
            for (i, chunk) in mem.chunks_exact(4).enumerate() {
                r[i] = f32::from_le_bytes(arr(chunk));
            }
            Val::F4(r)
        }
        LdUC2UI => Val::I(mem[0] as i32),
        LdC2I => Val::I(mem[0] as i8 as i32),
        LdUS2UI => Val::I(u16::from_le_bytes(arr(mem)) as i32),
        LdS2I => Val::I(i16::from_le_bytes(arr(mem)) as i32),
        other => return Err(format!("cannot evaluate load {}", other)),
    })
}

fn eval_store(mems: &mut [Vec<u8>], op: Opcode, v: Val, base: Val, disp: i32) -> Result<(), String> {
    use Opcode::*;
    let bytes = op.access_bytes() as usize;
    let mem = mem_slice(mems, base, disp, bytes)?;
    match op {
        StI => mem.copy_from_slice(&as_i(v)?.to_le_bytes()),
        StQ => mem.copy_from_slice(&as_q(v)?.to_le_bytes()),
        StD => mem.copy_from_slice(&as_d(v)?.to_le_bytes()),
        StF => mem.copy_from_slice(&as_f(v)?.to_le_bytes()),
        StD2F => mem.copy_from_slice(&(as_d(v)? as f32).to_le_bytes()),
        StF4 => {
            let lanes = as_f4(v)?;
            for (i, lane) in lanes.iter().enumerate() {
                mem[i * 4..i * 4 + 4].copy_from_slice(&lane.to_le_bytes());
            }
        }
        StI2C => mem[0] = as_i(v)? as u8,
        StI2S => mem.copy_from_slice(&(as_i(v)? as u16).to_le_bytes()),
        other => return Err(format!("cannot evaluate store {}", other)),
    }
    Ok(())
}

fn sum_d(args: &[Val]) -> Result<f64, String> {
    let mut acc = 0f64;
    for &a in args {
        acc += as_num(a)?;
    }
    Ok(acc)
}

fn eval_builtin(
    mems: &mut Vec<Vec<u8>>,
    builtin: Builtin,
    args: &[Val],
) -> Result<Option<Val>, String> {
    use Builtin::*;
    Ok(match builtin {
        Puts => {
            let idx = match args[0] {
                Val::P(i) => i,
                other => return Err(format!("puts of non-pointer {:?}", other)),
            };
            let buf = &mems[idx];
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            println!("{}", String::from_utf8_lossy(&buf[..end]));
            Some(Val::I(end as i32))
        }
        Sin => Some(Val::D(as_d(args[0])?.sin())),
        Malloc => {
            let size = as_q(args[0])?;
            if size > MAX_MALLOC_B {
                return Err(format!("malloc of {} bytes refused", size));
            }
            mems.push(vec![0u8; size as usize]);
            Some(Val::P(mems.len() - 1))
        }
        Free => None,
        Printi => {
            println!("{}", as_i(args[0])?);
            None
        }
        // The call-stress helpers reduce their arguments to one number so
        // that argument shuffling bugs change the observable result.
        Calld1 | Callid1 | Callid2 | Callid3 | TestDD3 | TestDD8 => Some(Val::D(sum_d(args)?)),
        Callf1 | Callif1 | Callif2 | Callif3 => Some(Val::F(sum_d(args)? as f32)),
        Callf4Sqrt => {
            let x = as_f4(args[0])?;
            Some(Val::F4([x[0].sqrt(), x[1].sqrt(), x[2].sqrt(), x[3].sqrt()]))
        }
        // Lane-wise sum of the packed arguments over the sum of the
        // integer arguments, mirroring the mixed-type double helpers.
        Callif41 | Callif42 | Callif43 => {
            let mut lanes = [0f32; 4];
            let mut denom = 0i32;
            for &a in args {
                match a {
                    Val::F4(v) => {
                        for (lane, x) in lanes.iter_mut().zip(v) {
                            *lane += x;
                        }
                    }
                    other => denom = denom.wrapping_add(as_i(other)?),
                }
            }
            Some(Val::F4(lanes.map(|l| l / denom as f32)))
        }
        Callf4Mt => {
            let (f, i, d) = (as_f(args[0])?, as_i(args[1])?, as_d(args[2])?);
            let x = as_f4(args[3])?;
            let (j, e, g) = (as_i(args[4])?, as_d(args[5])?, as_f(args[6])?);
            let y = as_f4(args[7])?;
            let scale = (f as f64 + g as f64 / d + e - i.wrapping_mul(j) as f64) as f32;
            let mut r = [0f32; 4];
            for k in 0..4 {
                r[k] = (x[k] + y[k]) / scale;
            }
            Some(Val::F4(r))
        }
        TestII1 => Some(Val::I(as_i(args[0])?)),
        TestII6 => {
            let mut acc = 0i32;
            for &a in args {
                acc = acc.wrapping_add(as_i(a)?);
            }
            Some(Val::I(acc))
        }
        TestQQ2 | TestQQ7 => {
            let mut acc = 0u64;
            for &a in args {
                acc = acc.wrapping_add(as_q(a)?);
            }
            Some(Val::Q(acc))
        }
        TestVIQD => None,
        SfNegD => Some(Val::D(-as_d(args[0])?)),
        SfAddD => Some(Val::D(as_d(args[0])? + as_d(args[1])?)),
        SfSubD => Some(Val::D(as_d(args[0])? - as_d(args[1])?)),
        SfMulD => Some(Val::D(as_d(args[0])? * as_d(args[1])?)),
        SfDivD => Some(Val::D(as_d(args[0])? / as_d(args[1])?)),
        SfI2D => Some(Val::D(as_i(args[0])? as f64)),
        SfUi2D => Some(Val::D(as_i(args[0])? as u32 as f64)),
        SfD2I => Some(Val::I(as_d(args[0])? as i32)),
        SfD2F => Some(Val::F(as_d(args[0])? as f32)),
        SfF2D => Some(Val::D(as_f(args[0])? as f64)),
        SfEqD => Some(Val::I((as_d(args[0])? == as_d(args[1])?) as i32)),
        SfLtD => Some(Val::I((as_d(args[0])? < as_d(args[1])?) as i32)),
        SfGtD => Some(Val::I((as_d(args[0])? > as_d(args[1])?) as i32)),
        SfLeD => Some(Val::I((as_d(args[0])? <= as_d(args[1])?) as i32)),
        SfGeD => Some(Val::I((as_d(args[0])? >= as_d(args[1])?) as i32)),
    })
}
