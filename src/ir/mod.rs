//! The low-level IR: opcodes, nodes, and the shared arena.

pub mod buffer;
pub mod node;
pub mod opcode;
pub mod types;

pub use buffer::{CallSig, Callee, LirBuffer, SideExit};
pub use node::{ExitId, FragmentId, LirNode, NodeId, Payload, SigId};
pub use opcode::{opcode_table, ArityClass, Opcode};
pub use types::{Abi, AccSet, Builtin, ReturnKind, ReturnSet, ValueKind};
