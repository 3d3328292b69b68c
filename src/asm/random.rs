//! The random fragment generator.
//!
//! Emits a well-typed `main` fragment of roughly `n_ins` instructions by
//! drawing instruction classes from a weighted distribution and pulling
//! operands from bounded live-value pools, one pool per value category.
//! A draw whose pool is empty is skipped without counting; immediates are
//! always eligible, so generation cannot stall. The fragment ends with
//! `reti` of a zero immediate and is sealed like a hand-written one.
//!
//! Not generated: params beyond the prologue, live hints, rets other than
//! the final one, jumps, and the exit guards that only pay off across
//! fragments.

use rand::rngs::SmallRng;
use rand::Rng;

use super::fragment::FragmentAssembler;
use super::program::Program;
use crate::backend::{SPILL_RESERVE_B, STACK_SIZE_B};
use crate::error::Error;
use crate::ir::{Abi, Builtin, CallSig, Callee, NodeId, Opcode, ReturnKind, SigId, ValueKind};

/// Cap on each live-value pool. Insertion past the cap overwrites a random
/// element, so old values stay reachable for a while.
const MAX_LIVE_VALUES: usize = 20;

#[derive(Clone, Copy, PartialEq)]
enum Class {
    Fence,
    Alloc,
    ImmI,
    ImmQ,
    ImmD,
    ImmF,
    ImmF4,
    IFromI,
    DFromD,
    FFromF,
    F4FromF4,
    IFromII,
    QFromQQ,
    QFromQI,
    DFromDD,
    FFromFF,
    F4FromF4F4,
    CmovI,
    CmovQ,
    CmovD,
    CmovF,
    CmovF4,
    CmpII,
    CmpQQ,
    CmpDD,
    CmpFF,
    CmpF4F4,
    QFromI,
    IFromQ,
    DFromI,
    FFromI,
    IFromF,
    IFromD,
    DFromF,
    FFromD,
    F4FromF,
    FFromF4,
    QFromD,
    DFromQ,
    LoadI,
    LoadQ,
    LoadD,
    LoadF,
    LoadF4,
    StoreI,
    StoreQ,
    StoreD,
    StoreF,
    StoreF4,
    CallII1,
    CallII6,
    CallQQ2,
    CallQQ7,
    CallDD3,
    CallDD8,
    CallVIQD,
    Label,
}

/// Relative class frequencies, roughly shaped like real code: immediates
/// and integer arithmetic dominate, fences and calls are rare.
const CLASS_FREQS: &[(Class, u32)] = &[
    (Class::Fence, 1),
    (Class::Alloc, 1),
    (Class::ImmI, 10),
    (Class::ImmQ, 4),
    (Class::ImmD, 4),
    (Class::ImmF, 4),
    (Class::ImmF4, 2),
    (Class::IFromI, 2),
    (Class::DFromD, 1),
    (Class::FFromF, 1),
    (Class::F4FromF4, 1),
    (Class::IFromII, 16),
    (Class::QFromQQ, 5),
    (Class::QFromQI, 2),
    (Class::DFromDD, 5),
    (Class::FFromFF, 5),
    (Class::F4FromF4F4, 3),
    (Class::CmovI, 2),
    (Class::CmovQ, 1),
    (Class::CmovD, 1),
    (Class::CmovF, 1),
    (Class::CmovF4, 1),
    (Class::CmpII, 4),
    (Class::CmpQQ, 2),
    (Class::CmpDD, 1),
    (Class::CmpFF, 1),
    (Class::CmpF4F4, 1),
    (Class::QFromI, 2),
    (Class::IFromQ, 2),
    (Class::DFromI, 2),
    (Class::FFromI, 2),
    (Class::IFromF, 1),
    (Class::IFromD, 1),
    (Class::DFromF, 1),
    (Class::FFromD, 1),
    (Class::F4FromF, 1),
    (Class::FFromF4, 1),
    (Class::QFromD, 1),
    (Class::DFromQ, 1),
    (Class::LoadI, 4),
    (Class::LoadQ, 2),
    (Class::LoadD, 2),
    (Class::LoadF, 2),
    (Class::LoadF4, 1),
    (Class::StoreI, 4),
    (Class::StoreQ, 2),
    (Class::StoreD, 2),
    (Class::StoreF, 2),
    (Class::StoreF4, 1),
    (Class::CallII1, 1),
    (Class::CallII6, 1),
    (Class::CallQQ2, 1),
    (Class::CallQQ7, 1),
    (Class::CallDD3, 1),
    (Class::CallDD8, 1),
    (Class::CallVIQD, 1),
    (Class::Label, 1),
];

const I_FROM_I_OPS: &[Opcode] = &[Opcode::NegI, Opcode::NotI];
const I_FROM_II_OPS: &[Opcode] = &[
    Opcode::AddI,
    Opcode::SubI,
    Opcode::MulI,
    Opcode::DivI,
    Opcode::ModI,
    Opcode::AndI,
    Opcode::OrI,
    Opcode::XorI,
    Opcode::LshI,
    Opcode::RshI,
    Opcode::RshUI,
];
const Q_FROM_QQ_OPS: &[Opcode] = &[Opcode::AddQ, Opcode::AndQ, Opcode::OrQ, Opcode::XorQ];
const Q_FROM_QI_OPS: &[Opcode] = &[Opcode::LshQ, Opcode::RshQ, Opcode::RshUQ];
const D_FROM_DD_OPS: &[Opcode] = &[Opcode::AddD, Opcode::SubD, Opcode::MulD, Opcode::DivD];
const F_FROM_FF_OPS: &[Opcode] = &[Opcode::AddF, Opcode::SubF, Opcode::MulF, Opcode::DivF];
const F4_FROM_F4F4_OPS: &[Opcode] =
    &[Opcode::AddF4, Opcode::SubF4, Opcode::MulF4, Opcode::DivF4];
const CMP_II_OPS: &[Opcode] = &[
    Opcode::EqI,
    Opcode::LtI,
    Opcode::GtI,
    Opcode::LeI,
    Opcode::GeI,
    Opcode::LtUI,
    Opcode::GtUI,
    Opcode::LeUI,
    Opcode::GeUI,
];
const CMP_QQ_OPS: &[Opcode] = &[
    Opcode::EqQ,
    Opcode::LtQ,
    Opcode::GtQ,
    Opcode::LeQ,
    Opcode::GeQ,
    Opcode::LtUQ,
    Opcode::GtUQ,
    Opcode::LeUQ,
    Opcode::GeUQ,
];
const CMP_DD_OPS: &[Opcode] =
    &[Opcode::EqD, Opcode::LtD, Opcode::GtD, Opcode::LeD, Opcode::GeD];
const CMP_FF_OPS: &[Opcode] =
    &[Opcode::EqF, Opcode::LtF, Opcode::GtF, Opcode::LeF, Opcode::GeF];
const Q_FROM_I_OPS: &[Opcode] = &[Opcode::I2Q, Opcode::UI2UQ];
const D_FROM_I_OPS: &[Opcode] = &[Opcode::I2D, Opcode::UI2D];
const F_FROM_I_OPS: &[Opcode] = &[Opcode::I2F, Opcode::UI2F];
const F_FROM_F4_OPS: &[Opcode] = &[Opcode::F4X, Opcode::F4Y, Opcode::F4Z, Opcode::F4W];
// ldi weighted more heavily, like real code.
const I_LOAD_OPS: &[Opcode] = &[
    Opcode::LdI,
    Opcode::LdI,
    Opcode::LdI,
    Opcode::LdUC2UI,
    Opcode::LdUS2UI,
    Opcode::LdC2I,
    Opcode::LdS2I,
];
const D_LOAD_OPS: &[Opcode] = &[Opcode::LdD, Opcode::LdF2D];

struct Pools {
    /// Integer-compare results, usable as select conditions.
    bs: Vec<NodeId>,
    is: Vec<NodeId>,
    qs: Vec<NodeId>,
    ds: Vec<NodeId>,
    fs: Vec<NodeId>,
    f4s: Vec<NodeId>,
    /// 4-byte stack allocations.
    m4s: Vec<NodeId>,
    /// 8-byte-or-larger stack allocations.
    m8s: Vec<NodeId>,
}

fn add_or_replace(pool: &mut Vec<NodeId>, rng: &mut SmallRng, ins: NodeId) {
    if pool.len() >= MAX_LIVE_VALUES {
        let i = rng.gen_range(0..pool.len());
        pool[i] = ins;
    } else {
        pool.push(ins);
    }
}

fn pick(pool: &[NodeId], rng: &mut SmallRng) -> NodeId {
    pool[rng.gen_range(0..pool.len())]
}

fn pick_op(ops: &[Opcode], rng: &mut SmallRng) -> Opcode {
    ops[rng.gen_range(0..ops.len())]
}

fn pick_class(rng: &mut SmallRng, total: u32) -> Class {
    let mut r = rng.gen_range(0..total);
    for &(class, freq) in CLASS_FREQS {
        if r < freq {
            return class;
        }
        r -= freq;
    }
    Class::ImmI
}

/// Biased toward 0, 1, and small multiples of 4, which are common due to
/// memory addressing. Puts realistic stress on instruction deduplication.
fn rnd_imm_i(rng: &mut SmallRng) -> i32 {
    match rng.gen_range(0..5) {
        0 => 0,
        1 => 1,
        2 => 4 * (rng.gen_range(0..256) + 1),
        3 => rng.gen_range(-9999..10000),
        _ => rng.gen(),
    }
}

fn rnd_imm_q(rng: &mut SmallRng) -> u64 {
    match rng.gen_range(0..5) {
        0 => 0,
        1 => 1,
        2 => 4 * (rng.gen_range(0u64..256) + 1),
        3 => rng.gen_range(-9999i64..10000) as u64,
        _ => rng.gen(),
    }
}

// Infinities and NaNs are not generated directly, but fall out of folded
// expressions like divd(1,0).
fn rnd_imm_d(rng: &mut SmallRng) -> f64 {
    match rng.gen_range(0..5) {
        0 => 0.0,
        1 => 1.0,
        2 | 3 => rng.gen_range(0..1000) as f64,
        _ => f64::from_bits(rng.gen()),
    }
}

fn rnd_imm_f(rng: &mut SmallRng) -> f32 {
    match rng.gen_range(0..5) {
        0 => 0.0,
        1 => 1.0,
        2 | 3 => rng.gen_range(0..1000) as f32,
        _ => f32::from_bits(rng.gen()),
    }
}

/// A random in-bounds displacement, aligned to the access width.
fn rnd_offset(rng: &mut SmallRng, base_size: i32, width: i32) -> i32 {
    if base_size <= width {
        return 0;
    }
    rng.gen_range(0..=base_size - width) & !(width - 1)
}

impl FragmentAssembler {
    /// Adds a call signature for one of the fixed-arity test functions.
    fn test_sig(&mut self, name: &str, builtin: Builtin, args: &[ValueKind], ret: ValueKind) -> SigId {
        self.buf.borrow_mut().add_sig(CallSig {
            name: name.to_string(),
            abi: Abi::Cdecl,
            args: args.to_vec(),
            ret,
            callee: Callee::Builtin(builtin),
        })
    }

    pub(crate) fn assemble_random(
        &mut self,
        program: &mut Program,
        n_ins: usize,
        rng: &mut SmallRng,
    ) -> Result<(), Error> {
        use ValueKind::{F64, I32, I64, Void};

        let total_freq: u32 = CLASS_FREQS.iter().map(|&(_, f)| f).sum();

        let sig_ii1 = self.test_sig("test_ii1", Builtin::TestII1, &[I32], I32);
        let sig_ii6 = self.test_sig("test_ii6", Builtin::TestII6, &[I32; 6], I32);
        let sig_qq2 = self.test_sig("test_qq2", Builtin::TestQQ2, &[I64; 2], I64);
        let sig_qq7 = self.test_sig("test_qq7", Builtin::TestQQ7, &[I64; 7], I64);
        let sig_dd3 = self.test_sig("test_dd3", Builtin::TestDD3, &[F64; 3], F64);
        let sig_dd8 = self.test_sig("test_dd8", Builtin::TestDD8, &[F64; 8], F64);
        let sig_viqd = self.test_sig("test_viqd", Builtin::TestVIQD, &[I32, I64, F64], Void);

        let mut pools = Pools {
            bs: Vec::new(),
            is: Vec::new(),
            qs: Vec::new(),
            ds: Vec::new(),
            fs: Vec::new(),
            f4s: Vec::new(),
            m4s: Vec::new(),
            m8s: Vec::new(),
        };

        // Tracks bytes taken by explicit allocs; the rest of the frame is
        // reserved for spills.
        let alloc_budget = STACK_SIZE_B - SPILL_RESERVE_B;
        let mut alloc_used = 0i32;

        // One alloc up front so loads and stores are possible immediately.
        let first = self.lir.alloc(16)?;
        add_or_replace(&mut pools.m8s, rng, first);
        alloc_used += 16;

        let mut n = 0usize;
        while n < n_ins {
            match pick_class(rng, total_freq) {
                Class::Fence => {
                    if rng.gen_range(0..2) == 0 {
                        self.lir.ins0(Opcode::RegFence)?;
                    } else {
                        let exit = self.create_exit();
                        self.lir.guard(Opcode::XBarrier, None, exit)?;
                    }
                    n += 1;
                }

                Class::Alloc => {
                    let size = match rng.gen_range(0..4) {
                        0 => 4,
                        1 => 8,
                        2 => 16,
                        _ => 4 * (rng.gen_range(0..6) + 3), // 12, 16, ..., 32
                    };
                    if alloc_used + size <= alloc_budget {
                        let ins = self.lir.alloc(size)?;
                        // Usable both as an ordinary operand and as a
                        // load/store base.
                        add_or_replace(&mut pools.qs, rng, ins);
                        if size == 4 {
                            add_or_replace(&mut pools.m4s, rng, ins);
                        } else {
                            add_or_replace(&mut pools.m8s, rng, ins);
                        }
                        alloc_used += size;
                        n += 1;
                    }
                }

                Class::ImmI => {
                    let ins = self.lir.imm_i(rnd_imm_i(rng))?;
                    add_or_replace(&mut pools.is, rng, ins);
                    n += 1;
                }

                Class::ImmQ => {
                    let ins = self.lir.imm_q(rnd_imm_q(rng))?;
                    add_or_replace(&mut pools.qs, rng, ins);
                    n += 1;
                }

                Class::ImmD => {
                    let ins = self.lir.imm_d(rnd_imm_d(rng))?;
                    add_or_replace(&mut pools.ds, rng, ins);
                    n += 1;
                }

                Class::ImmF => {
                    let ins = self.lir.imm_f(rnd_imm_f(rng))?;
                    add_or_replace(&mut pools.fs, rng, ins);
                    n += 1;
                }

                Class::ImmF4 => {
                    let v = [
                        rnd_imm_f(rng),
                        rnd_imm_f(rng),
                        rnd_imm_f(rng),
                        rnd_imm_f(rng),
                    ];
                    let ins = self.lir.imm_f4(v)?;
                    add_or_replace(&mut pools.f4s, rng, ins);
                    n += 1;
                }

                Class::IFromI => {
                    if !pools.is.is_empty() {
                        let a = pick(&pools.is, rng);
                        let ins = self.lir.ins1(pick_op(I_FROM_I_OPS, rng), a)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::DFromD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let ins = self.lir.ins1(Opcode::NegD, a)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::FFromF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let ins = self.lir.ins1(Opcode::NegF, a)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::F4FromF4 => {
                    if !pools.f4s.is_empty() {
                        let a = pick(&pools.f4s, rng);
                        let ins = self.lir.ins1(Opcode::NegF4, a)?;
                        add_or_replace(&mut pools.f4s, rng, ins);
                        n += 1;
                    }
                }

                Class::IFromII => {
                    if !pools.is.is_empty() {
                        let op = pick_op(I_FROM_II_OPS, rng);
                        let lhs = pick(&pools.is, rng);
                        let rhs = pick(&pools.is, rng);
                        if op == Opcode::DivI || op == Opcode::ModI {
                            n += self.random_div(&mut pools, rng, op, lhs, rhs)?;
                        } else {
                            let ins = self.lir.ins2(op, lhs, rhs)?;
                            add_or_replace(&mut pools.is, rng, ins);
                            n += 1;
                        }
                    }
                }

                Class::QFromQQ => {
                    if !pools.qs.is_empty() {
                        let a = pick(&pools.qs, rng);
                        let b = pick(&pools.qs, rng);
                        let ins = self.lir.ins2(pick_op(Q_FROM_QQ_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::QFromQI => {
                    if !pools.qs.is_empty() && !pools.is.is_empty() {
                        let a = pick(&pools.qs, rng);
                        let b = pick(&pools.is, rng);
                        let ins = self.lir.ins2(pick_op(Q_FROM_QI_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::DFromDD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let b = pick(&pools.ds, rng);
                        let ins = self.lir.ins2(pick_op(D_FROM_DD_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::FFromFF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let b = pick(&pools.fs, rng);
                        let ins = self.lir.ins2(pick_op(F_FROM_FF_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::F4FromF4F4 => {
                    if !pools.f4s.is_empty() {
                        let a = pick(&pools.f4s, rng);
                        let b = pick(&pools.f4s, rng);
                        let ins = self.lir.ins2(pick_op(F4_FROM_F4F4_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.f4s, rng, ins);
                        n += 1;
                    }
                }

                Class::CmovI => {
                    if !pools.bs.is_empty() && !pools.is.is_empty() {
                        let c = pick(&pools.bs, rng);
                        let a = pick(&pools.is, rng);
                        let b = pick(&pools.is, rng);
                        let ins = self.lir.ins3(Opcode::CmovI, c, a, b)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::CmovQ => {
                    if !pools.bs.is_empty() && !pools.qs.is_empty() {
                        let c = pick(&pools.bs, rng);
                        let a = pick(&pools.qs, rng);
                        let b = pick(&pools.qs, rng);
                        let ins = self.lir.ins3(Opcode::CmovQ, c, a, b)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::CmovD => {
                    if !pools.bs.is_empty() && !pools.ds.is_empty() {
                        let c = pick(&pools.bs, rng);
                        let a = pick(&pools.ds, rng);
                        let b = pick(&pools.ds, rng);
                        let ins = self.lir.ins3(Opcode::CmovD, c, a, b)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::CmovF => {
                    if !pools.bs.is_empty() && !pools.fs.is_empty() {
                        let c = pick(&pools.bs, rng);
                        let a = pick(&pools.fs, rng);
                        let b = pick(&pools.fs, rng);
                        let ins = self.lir.ins3(Opcode::CmovF, c, a, b)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::CmovF4 => {
                    if !pools.bs.is_empty() && !pools.f4s.is_empty() {
                        let c = pick(&pools.bs, rng);
                        let a = pick(&pools.f4s, rng);
                        let b = pick(&pools.f4s, rng);
                        let ins = self.lir.ins3(Opcode::CmovF4, c, a, b)?;
                        add_or_replace(&mut pools.f4s, rng, ins);
                        n += 1;
                    }
                }

                Class::CmpII => {
                    if !pools.is.is_empty() {
                        let a = pick(&pools.is, rng);
                        let b = pick(&pools.is, rng);
                        let ins = self.lir.ins2(pick_op(CMP_II_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.bs, rng, ins);
                        n += 1;
                    }
                }

                Class::CmpQQ => {
                    if !pools.qs.is_empty() {
                        let a = pick(&pools.qs, rng);
                        let b = pick(&pools.qs, rng);
                        let ins = self.lir.ins2(pick_op(CMP_QQ_OPS, rng), a, b)?;
                        add_or_replace(&mut pools.bs, rng, ins);
                        n += 1;
                    }
                }

                // Float-compare results are emitted for coverage but stay out
                // of the boolean pool, so selects only test integer
                // conditions.
                Class::CmpDD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let b = pick(&pools.ds, rng);
                        self.lir.ins2(pick_op(CMP_DD_OPS, rng), a, b)?;
                        n += 1;
                    }
                }

                Class::CmpFF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let b = pick(&pools.fs, rng);
                        self.lir.ins2(pick_op(CMP_FF_OPS, rng), a, b)?;
                        n += 1;
                    }
                }

                Class::CmpF4F4 => {
                    if !pools.f4s.is_empty() {
                        let a = pick(&pools.f4s, rng);
                        let b = pick(&pools.f4s, rng);
                        self.lir.ins2(Opcode::EqF4, a, b)?;
                        n += 1;
                    }
                }

                Class::QFromI => {
                    if !pools.is.is_empty() {
                        let a = pick(&pools.is, rng);
                        let ins = self.lir.ins1(pick_op(Q_FROM_I_OPS, rng), a)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::IFromQ => {
                    if !pools.qs.is_empty() {
                        let a = pick(&pools.qs, rng);
                        let ins = self.lir.ins1(Opcode::Q2I, a)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::DFromI => {
                    if !pools.is.is_empty() {
                        let a = pick(&pools.is, rng);
                        let ins = self.lir.ins1(pick_op(D_FROM_I_OPS, rng), a)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::FFromI => {
                    if !pools.is.is_empty() {
                        let a = pick(&pools.is, rng);
                        let ins = self.lir.ins1(pick_op(F_FROM_I_OPS, rng), a)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::IFromF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let ins = self.lir.ins1(Opcode::F2I, a)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::IFromD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let ins = self.lir.ins1(Opcode::D2I, a)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::DFromF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let ins = self.lir.ins1(Opcode::F2D, a)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::FFromD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let ins = self.lir.ins1(Opcode::D2F, a)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::F4FromF => {
                    if !pools.fs.is_empty() {
                        let a = pick(&pools.fs, rng);
                        let ins = self.lir.ins1(Opcode::F2F4, a)?;
                        add_or_replace(&mut pools.f4s, rng, ins);
                        n += 1;
                    }
                }

                Class::FFromF4 => {
                    if !pools.f4s.is_empty() {
                        let a = pick(&pools.f4s, rng);
                        let ins = self.lir.ins1(pick_op(F_FROM_F4_OPS, rng), a)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::QFromD => {
                    if !pools.ds.is_empty() {
                        let a = pick(&pools.ds, rng);
                        let ins = self.lir.ins1(Opcode::DasQ, a)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::DFromQ => {
                    if !pools.qs.is_empty() {
                        let a = pick(&pools.qs, rng);
                        let ins = self.lir.ins1(Opcode::QasD, a)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::LoadI => {
                    let pool = if rng.gen_range(0..2) == 0 { &pools.m4s } else { &pools.m8s };
                    if !pool.is_empty() {
                        let base = pick(pool, rng);
                        let op = pick_op(I_LOAD_OPS, rng);
                        let disp = self.rnd_disp(rng, base, op);
                        let ins = self.load_other(op, base, disp)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::LoadQ => {
                    if !pools.m8s.is_empty() {
                        let base = pick(&pools.m8s, rng);
                        let disp = self.rnd_disp(rng, base, Opcode::LdQ);
                        let ins = self.load_other(Opcode::LdQ, base, disp)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::LoadD => {
                    if !pools.m8s.is_empty() {
                        let base = pick(&pools.m8s, rng);
                        let op = pick_op(D_LOAD_OPS, rng);
                        let disp = self.rnd_disp(rng, base, op);
                        let ins = self.load_other(op, base, disp)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::LoadF => {
                    let pool = if rng.gen_range(0..2) == 0 { &pools.m4s } else { &pools.m8s };
                    if !pool.is_empty() {
                        let base = pick(pool, rng);
                        let disp = self.rnd_disp(rng, base, Opcode::LdF);
                        let ins = self.load_other(Opcode::LdF, base, disp)?;
                        add_or_replace(&mut pools.fs, rng, ins);
                        n += 1;
                    }
                }

                Class::LoadF4 => {
                    if let Some(base) = self.pick_wide_base(&pools.m8s, rng) {
                        let disp = self.rnd_disp(rng, base, Opcode::LdF4);
                        let ins = self.load_other(Opcode::LdF4, base, disp)?;
                        add_or_replace(&mut pools.f4s, rng, ins);
                        n += 1;
                    }
                }

                Class::StoreI => {
                    let pool = if rng.gen_range(0..2) == 0 { &pools.m4s } else { &pools.m8s };
                    if !pool.is_empty() && !pools.is.is_empty() {
                        let base = pick(pool, rng);
                        let value = pick(&pools.is, rng);
                        let op = match rng.gen_range(0..3) {
                            0 => Opcode::StI2C,
                            1 => Opcode::StI2S,
                            _ => Opcode::StI,
                        };
                        let disp = self.rnd_disp(rng, base, op);
                        self.store_other(op, value, base, disp)?;
                        n += 1;
                    }
                }

                Class::StoreQ => {
                    if !pools.m8s.is_empty() && !pools.qs.is_empty() {
                        let base = pick(&pools.m8s, rng);
                        let value = pick(&pools.qs, rng);
                        let disp = self.rnd_disp(rng, base, Opcode::StQ);
                        self.store_other(Opcode::StQ, value, base, disp)?;
                        n += 1;
                    }
                }

                Class::StoreD => {
                    if !pools.m8s.is_empty() && !pools.ds.is_empty() {
                        let base = pick(&pools.m8s, rng);
                        let value = pick(&pools.ds, rng);
                        let op = if rng.gen_range(0..2) == 0 { Opcode::StD } else { Opcode::StD2F };
                        let disp = self.rnd_disp(rng, base, op);
                        self.store_other(op, value, base, disp)?;
                        n += 1;
                    }
                }

                Class::StoreF => {
                    let pool = if rng.gen_range(0..2) == 0 { &pools.m4s } else { &pools.m8s };
                    if !pool.is_empty() && !pools.fs.is_empty() {
                        let base = pick(pool, rng);
                        let value = pick(&pools.fs, rng);
                        let disp = self.rnd_disp(rng, base, Opcode::StF);
                        self.store_other(Opcode::StF, value, base, disp)?;
                        n += 1;
                    }
                }

                Class::StoreF4 => {
                    if !pools.f4s.is_empty() {
                        if let Some(base) = self.pick_wide_base(&pools.m8s, rng) {
                            let value = pick(&pools.f4s, rng);
                            let disp = self.rnd_disp(rng, base, Opcode::StF4);
                            self.store_other(Opcode::StF4, value, base, disp)?;
                            n += 1;
                        }
                    }
                }

                Class::CallII1 => {
                    if !pools.is.is_empty() {
                        let args = [pick(&pools.is, rng)];
                        let ins = self.lir.call(sig_ii1, &args)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::CallII6 => {
                    if !pools.is.is_empty() {
                        let mut args = [NodeId(0); 6];
                        for slot in &mut args {
                            *slot = pick(&pools.is, rng);
                        }
                        let ins = self.lir.call(sig_ii6, &args)?;
                        add_or_replace(&mut pools.is, rng, ins);
                        n += 1;
                    }
                }

                Class::CallQQ2 => {
                    if !pools.qs.is_empty() {
                        let args = [pick(&pools.qs, rng), pick(&pools.qs, rng)];
                        let ins = self.lir.call(sig_qq2, &args)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::CallQQ7 => {
                    if !pools.qs.is_empty() {
                        let mut args = [NodeId(0); 7];
                        for slot in &mut args {
                            *slot = pick(&pools.qs, rng);
                        }
                        let ins = self.lir.call(sig_qq7, &args)?;
                        add_or_replace(&mut pools.qs, rng, ins);
                        n += 1;
                    }
                }

                Class::CallDD3 => {
                    if !pools.ds.is_empty() {
                        let mut args = [NodeId(0); 3];
                        for slot in &mut args {
                            *slot = pick(&pools.ds, rng);
                        }
                        let ins = self.lir.call(sig_dd3, &args)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::CallDD8 => {
                    if !pools.ds.is_empty() {
                        let mut args = [NodeId(0); 8];
                        for slot in &mut args {
                            *slot = pick(&pools.ds, rng);
                        }
                        let ins = self.lir.call(sig_dd8, &args)?;
                        add_or_replace(&mut pools.ds, rng, ins);
                        n += 1;
                    }
                }

                Class::CallVIQD => {
                    if !pools.is.is_empty() && !pools.qs.is_empty() && !pools.ds.is_empty() {
                        // Args in reverse source order.
                        let args = [
                            pick(&pools.ds, rng),
                            pick(&pools.qs, rng),
                            pick(&pools.is, rng),
                        ];
                        self.lir.call(sig_viqd, &args)?;
                        n += 1;
                    }
                }

                // No jumps are generated, but labels still matter: they bound
                // the regions deduplication can work over, which keeps live
                // ranges from growing without limit.
                Class::Label => {
                    self.lir.label()?;
                    n += 1;
                }
            }
        }

        self.ret_bits.insert(ReturnKind::I32);
        self.last_return = ReturnKind::I32;
        let zero = self.lir.imm_i(0)?;
        self.lir.ins1(Opcode::RetI, zero)?;

        self.finish(program)
    }

    /// Integer division traps on a zero divisor and on -2^31 / -1, so the
    /// divisor is clamped through a select: `lhs / (rhs > 0 ? rhs : -k)`
    /// with k in 2..=100, which still exercises negative divisors. Skipped
    /// when both operands are immediates, since `modi` of constants cannot
    /// be folded ahead of its paired `divi`.
    fn random_div(
        &mut self,
        pools: &mut Pools,
        rng: &mut SmallRng,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<usize, Error> {
        let both_imm = {
            let buf = self.buf.borrow();
            buf.node(lhs).imm_i().is_some() && buf.node(rhs).imm_i().is_some()
        };
        if both_imm {
            return Ok(0);
        }
        let zero = self.lir.imm_i(0)?;
        let gt0 = self.lir.ins2(Opcode::GtI, rhs, zero)?;
        let neg_k = self.lir.imm_i(-(rng.gen_range(0..99) + 2))?;
        let safe_rhs = self.lir.ins3(Opcode::CmovI, gt0, rhs, neg_k)?;
        let div = self.lir.ins2(Opcode::DivI, lhs, safe_rhs)?;
        if op == Opcode::DivI {
            add_or_replace(&mut pools.is, rng, div);
            Ok(5)
        } else {
            let rem = self.lir.ins1(Opcode::ModI, div)?;
            // The quotient goes in the pool too; a reused quotient compiles
            // differently from a dead one.
            add_or_replace(&mut pools.is, rng, div);
            add_or_replace(&mut pools.is, rng, rem);
            Ok(6)
        }
    }

    fn rnd_disp(&self, rng: &mut SmallRng, base: NodeId, op: Opcode) -> i32 {
        let size = self.buf.borrow().node(base).size();
        rnd_offset(rng, size, op.access_bytes())
    }

    fn load_other(&mut self, op: Opcode, base: NodeId, disp: i32) -> Result<NodeId, Error> {
        Ok(self.lir.load(op, base, disp, crate::ir::AccSet::Other)?)
    }

    fn store_other(
        &mut self,
        op: Opcode,
        value: NodeId,
        base: NodeId,
        disp: i32,
    ) -> Result<NodeId, Error> {
        Ok(self.lir.store(op, value, base, disp, crate::ir::AccSet::Other)?)
    }

    /// Picks an allocation wide enough for a 16-byte access: a few random
    /// tries, then a linear scan.
    fn pick_wide_base(&self, pool: &[NodeId], rng: &mut SmallRng) -> Option<NodeId> {
        if pool.is_empty() {
            return None;
        }
        let buf = self.buf.borrow();
        for _ in 0..3 {
            let id = pick(pool, rng);
            if buf.node(id).size() >= 16 {
                return Some(id);
            }
        }
        pool.iter().copied().find(|&id| buf.node(id).size() >= 16)
    }
}
