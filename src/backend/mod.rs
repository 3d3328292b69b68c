//! The code-generator seam.
//!
//! The assembler hands finished fragments to a [`Backend`]: compile on
//! fragment close, patch after a `.patch` directive, run on demand. The
//! shipped implementation is a direct interpreter over the IR arena; a
//! native code generator would implement the same trait.

use crate::asm::program::Fragment;
use crate::error::BackendError;
use crate::ir::{ExitId, FragmentId, LirBuffer};

pub mod interp;

pub use interp::InterpBackend;

/// Per-fragment stack frame limit, shared with the random generator's
/// allocation budget.
pub const STACK_SIZE_B: i32 = 16 * 1024;

/// Bytes of the stack budget the generator leaves for register spills.
pub const SPILL_RESERVE_B: i32 = 1024;

/// Maximum encodable branch displacement, in nodes.
pub const BRANCH_RANGE: u32 = 1 << 24;

/// Result of running a compiled fragment, decoded per its return kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecValue {
    I32(i32),
    I64(i64),
    Double(f64),
    Float(f32),
    Float4([f32; 4]),
    /// The fragment left through an unpatched guard on this source line.
    Exited(u32),
}

fn fmt_fp(f: &mut std::fmt::Formatter<'_>, v: f64) -> std::fmt::Result {
    if v.is_nan() {
        f.write_str("NAN")
    } else if v == f64::INFINITY {
        f.write_str("INF")
    } else if v == f64::NEG_INFINITY {
        f.write_str("-INF")
    } else {
        write!(f, "{}", v)
    }
}

impl std::fmt::Display for ExecValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecValue::I32(v) => write!(f, "{}", v),
            ExecValue::I64(v) => write!(f, "{}", v),
            ExecValue::Double(v) => fmt_fp(f, *v),
            ExecValue::Float(v) => fmt_fp(f, *v as f64),
            ExecValue::Float4(v) => {
                fmt_fp(f, v[0] as f64)?;
                for lane in &v[1..] {
                    f.write_str(",")?;
                    fmt_fp(f, *lane as f64)?;
                }
                Ok(())
            }
            ExecValue::Exited(line) => write!(f, "exited on line {}", line),
        }
    }
}

/// Contract between the assembler and the code generator.
pub trait Backend {
    /// Compiles a sealed fragment. Called exactly once, at fragment close.
    fn compile(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        frag: FragmentId,
    ) -> Result<(), BackendError>;

    /// Notifies the backend that a guard's exit was retargeted.
    fn patch(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        exit: ExitId,
    ) -> Result<(), BackendError>;

    /// Executes a compiled fragment and decodes its result.
    fn run(
        &mut self,
        buf: &LirBuffer,
        frags: &[Fragment],
        frag: FragmentId,
    ) -> Result<ExecValue, BackendError>;
}
