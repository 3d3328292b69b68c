//! IR nodes and their payloads.

use super::opcode::Opcode;
use super::types::{AccSet, ValueKind};

/// Index of a node in the shared [`LirBuffer`](super::buffer::LirBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of a call signature in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigId(pub u32);

/// Index of a guard side exit in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitId(pub u32);

/// Index of a fragment in the program's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentId(pub u32);

#[derive(Debug, Clone)]
pub enum Payload {
    /// `start`, `regfence`, `label`.
    None,
    Unary(NodeId),
    Binary(NodeId, NodeId),
    /// `cmov*`: condition, then-value, else-value.
    Ternary(NodeId, NodeId, NodeId),
    ImmI(i32),
    ImmQ(u64),
    ImmD(f64),
    ImmF(f32),
    ImmF4([f32; 4]),
    Param { index: u32, kind: u32 },
    Alloc { size: i32 },
    Load { base: NodeId, disp: i32, acc: AccSet },
    Store { value: NodeId, base: NodeId, disp: i32, acc: AccSet },
    /// Arguments in reverse source order (first element is the last arg).
    Call { sig: SigId, args: Vec<NodeId> },
    /// `j` has no condition. A `None` target is a pending jump.
    Branch { cond: Option<NodeId>, target: Option<NodeId> },
    /// Overflow jump: operands plus a pending/resolved target.
    BranchOv { lhs: NodeId, rhs: NodeId, target: Option<NodeId> },
    /// `x`/`xbarrier` have no condition.
    Guard { cond: Option<NodeId>, exit: ExitId },
    /// Overflow guard: operands plus a side exit taken on overflow.
    GuardOv { lhs: NodeId, rhs: NodeId, exit: ExitId },
}

#[derive(Debug, Clone)]
pub struct LirNode {
    pub op: Opcode,
    pub payload: Payload,
}

impl LirNode {
    pub fn kind(&self) -> ValueKind {
        self.op.result_kind()
    }

    /// Byte size of a stack allocation, 0 for everything else.
    pub fn size(&self) -> i32 {
        match self.payload {
            Payload::Alloc { size } => size,
            _ => 0,
        }
    }

    pub fn imm_i(&self) -> Option<i32> {
        match self.payload {
            Payload::ImmI(v) => Some(v),
            _ => None,
        }
    }

    pub fn imm_q(&self) -> Option<u64> {
        match self.payload {
            Payload::ImmQ(v) => Some(v),
            _ => None,
        }
    }

    pub fn imm_d(&self) -> Option<f64> {
        match self.payload {
            Payload::ImmD(v) => Some(v),
            _ => None,
        }
    }

    pub fn imm_f(&self) -> Option<f32> {
        match self.payload {
            Payload::ImmF(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_guard(&self) -> bool {
        self.op.is_guard()
    }

    /// Value operands in source order, for the validator and disassembler.
    pub fn operands(&self) -> Vec<NodeId> {
        match &self.payload {
            Payload::None
            | Payload::ImmI(_)
            | Payload::ImmQ(_)
            | Payload::ImmD(_)
            | Payload::ImmF(_)
            | Payload::ImmF4(_)
            | Payload::Param { .. }
            | Payload::Alloc { .. } => Vec::new(),
            Payload::Unary(a) => vec![*a],
            Payload::Binary(a, b) => vec![*a, *b],
            Payload::Ternary(a, b, c) => vec![*a, *b, *c],
            Payload::Load { base, .. } => vec![*base],
            Payload::Store { value, base, .. } => vec![*value, *base],
            Payload::Call { args, .. } => args.clone(),
            Payload::Branch { cond, .. } => cond.iter().copied().collect(),
            Payload::BranchOv { lhs, rhs, .. } => vec![*lhs, *rhs],
            Payload::Guard { cond, .. } => cond.iter().copied().collect(),
            Payload::GuardOv { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}
