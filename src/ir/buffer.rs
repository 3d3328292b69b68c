//! The shared IR arena.
//!
//! One `LirBuffer` per program holds every node, call signature, and guard
//! side exit, addressed by index handles. Fragments are contiguous node
//! ranges inside it. Cross-references (branch targets, exit targets) are
//! indices and are patched in place.

use super::node::{ExitId, FragmentId, LirNode, NodeId, Payload, SigId};
use super::opcode::Opcode;
use super::types::{Abi, Builtin, ValueKind};

/// A call signature, synthesized at each call site.
#[derive(Debug, Clone)]
pub struct CallSig {
    pub name: String,
    pub abi: Abi,
    pub args: Vec<ValueKind>,
    pub ret: ValueKind,
    pub callee: Callee,
}

#[derive(Debug, Clone, Copy)]
pub enum Callee {
    Builtin(Builtin),
    Fragment(FragmentId),
}

/// Record of a guard's exit point. `target` is `None` until the guard is
/// patched to transfer into another fragment.
#[derive(Debug, Clone)]
pub struct SideExit {
    /// Source line of the guard, reported when the exit is taken.
    pub line: u32,
    pub from: FragmentId,
    pub target: Option<FragmentId>,
}

#[derive(Debug, Default)]
pub struct LirBuffer {
    nodes: Vec<LirNode>,
    sigs: Vec<CallSig>,
    exits: Vec<SideExit>,
}

impl LirBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, node: LirNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &LirNode {
        &self.nodes[id.0 as usize]
    }

    /// Resolves a pending jump. Panics if `id` is not a branch; the
    /// assembler only records branch ids in its pending list.
    pub fn set_branch_target(&mut self, id: NodeId, target: NodeId) {
        match &mut self.nodes[id.0 as usize].payload {
            Payload::Branch { target: t, .. } => *t = Some(target),
            Payload::BranchOv { target: t, .. } => *t = Some(target),
            other => panic!("not a branch payload: {:?}", other),
        }
    }

    pub fn add_sig(&mut self, sig: CallSig) -> SigId {
        let id = SigId(self.sigs.len() as u32);
        self.sigs.push(sig);
        id
    }

    pub fn sig(&self, id: SigId) -> &CallSig {
        &self.sigs[id.0 as usize]
    }

    pub fn add_exit(&mut self, exit: SideExit) -> ExitId {
        let id = ExitId(self.exits.len() as u32);
        self.exits.push(exit);
        id
    }

    pub fn exit(&self, id: ExitId) -> &SideExit {
        &self.exits[id.0 as usize]
    }

    /// Rewrites a guard's exit to transfer into another fragment (`.patch`).
    pub fn set_exit_target(&mut self, id: ExitId, target: FragmentId) {
        self.exits[id.0 as usize].target = Some(target);
    }

    /// One-line disassembly of a node, used by the verbose tracer.
    pub fn fmt_node(&self, id: NodeId) -> String {
        let node = self.node(id);
        let op = node.op;
        match &node.payload {
            Payload::None => op.name().to_string(),
            Payload::Unary(a) => format!("{} @{}", op, a.0),
            Payload::Binary(a, b) => format!("{} @{} @{}", op, a.0, b.0),
            Payload::Ternary(a, b, c) => format!("{} @{} @{} @{}", op, a.0, b.0, c.0),
            Payload::ImmI(v) => format!("{} {}", op, v),
            Payload::ImmQ(v) => format!("{} {:#x}", op, v),
            Payload::ImmD(v) => format!("{} {}", op, v),
            Payload::ImmF(v) => format!("{} {}", op, v),
            Payload::ImmF4(v) => format!("{} {} {} {} {}", op, v[0], v[1], v[2], v[3]),
            Payload::Param { index, kind } => format!("{} {} {}", op, index, kind),
            Payload::Alloc { size } => format!("{} {}", op, size),
            Payload::Load { base, disp, .. } => format!("{} @{} {}", op, base.0, disp),
            Payload::Store { value, base, disp, .. } => {
                format!("{} @{} @{} {}", op, value.0, base.0, disp)
            }
            Payload::Call { sig, args } => {
                let sig = self.sig(*sig);
                let mut s = format!("{} {} {}", op, sig.name, sig.abi);
                // Args are stored in reverse source order.
                for a in args.iter().rev() {
                    s.push_str(&format!(" @{}", a.0));
                }
                s
            }
            Payload::Branch { cond, target } => {
                let mut s = op.name().to_string();
                if let Some(c) = cond {
                    s.push_str(&format!(" @{}", c.0));
                }
                match target {
                    Some(t) => s.push_str(&format!(" -> @{}", t.0)),
                    None => s.push_str(" -> ?"),
                }
                s
            }
            Payload::BranchOv { lhs, rhs, target } => {
                let t = match target {
                    Some(t) => format!("@{}", t.0),
                    None => "?".to_string(),
                };
                format!("{} @{} @{} -> {}", op, lhs.0, rhs.0, t)
            }
            Payload::Guard { cond, exit } => {
                let line = self.exit(*exit).line;
                match cond {
                    Some(c) => format!("{} @{} ; exit line {}", op, c.0, line),
                    None => format!("{} ; exit line {}", op, line),
                }
            }
            Payload::GuardOv { lhs, rhs, exit } => {
                let line = self.exit(*exit).line;
                format!("{} @{} @{} ; exit line {}", op, lhs.0, rhs.0, line)
            }
        }
    }
}

impl Opcode {
    /// Byte width of the memory access, for loads and stores.
    pub fn access_bytes(self) -> i32 {
        use Opcode::*;
        match self {
            LdC2I | LdUC2UI | StI2C => 1,
            LdS2I | LdUS2UI | StI2S => 2,
            LdI | LdF | LdF2D | StI | StF | StD2F => 4,
            LdQ | LdD | StQ | StD => 8,
            LdF4 | StF4 => 16,
            _ => 0,
        }
    }
}
