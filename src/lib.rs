//! lasm: a textual assembler and fuzzer for a low-level JIT IR.
//!
//! Pipeline:
//!
//! ```text
//! source (.lir) → LirTokenStream → [Tokens] → Program/FragmentAssembler
//!   → filter pipeline → [LirBuffer nodes] → Backend (compile/patch/run)
//! ```
//!
//! Filters (innermost first):
//! 1. `BufWriter`: appends nodes to the shared arena
//! 2. `ValidateWriter`: operand kind/arity checks (debug, post-opt)
//! 3. `VerboseWriter`: disassembles each emitted node
//! 4. `CseFilter`: common subexpression elimination
//! 5. `SoftFloatFilter`: lowers doubles to helper calls
//! 6. `ExprFilter`: constant folding plus identity simplification
//! 7. `ValidateWriter`: same checks on the raw input (debug, pre-opt)
//!
//! A program is a set of named fragments. Each fragment is assembled
//! through the pipeline, sealed with an exit guard, and compiled by the
//! backend; `.patch` rewires a guard's side exit to another fragment.

pub mod asm;
pub mod backend;
pub mod cli;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod pipeline;

pub use asm::Program;
pub use backend::{ExecValue, InterpBackend};
pub use error::Error;

/// Knobs for the assembly pipeline.
#[derive(Debug, Clone, Copy)]
pub struct AsmOptions {
    /// Enable the CSE and expression-folding filters.
    pub optimize: bool,
    /// Disassemble each instruction as it is emitted.
    pub verbose: bool,
    /// Insert kind/arity validation stages.
    pub debug: bool,
    /// Lower double-precision ops to helper calls.
    pub soft_float: bool,
}

impl Default for AsmOptions {
    fn default() -> Self {
        AsmOptions {
            optimize: false,
            verbose: false,
            debug: true,
            soft_float: false,
        }
    }
}

/// Assembles a source string into a ready-to-run program with the
/// default interpreter backend.
pub fn assemble(source: &str, opts: AsmOptions) -> Result<Program, Error> {
    let mut program = Program::new(opts, Box::new(InterpBackend::new()));
    program.assemble(source)?;
    Ok(program)
}
