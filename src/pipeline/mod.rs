//! The instruction-construction pipeline.
//!
//! Every stage implements [`LirSink`] and forwards to the stage below it,
//! possibly rewriting, eliding, or expanding instructions on the way down.
//! The terminal stage appends to the shared arena. Composition happens once
//! per fragment, innermost first, driven by the assembler options.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::AsmError;
use crate::ir::{AccSet, ExitId, LirBuffer, NodeId, Opcode, SigId};
use crate::AsmOptions;

pub mod cse;
pub mod expr;
pub mod softfloat;
pub mod validate;
pub mod verbose;
pub mod writer;

/// The instruction-construction surface shared by every pipeline stage.
///
/// Methods return the id of the node that ended up representing the
/// instruction, which may be a pre-existing node (CSE) or a folded
/// constant (the simplifier).
pub trait LirSink {
    fn ins0(&mut self, op: Opcode) -> Result<NodeId, AsmError>;
    fn ins1(&mut self, op: Opcode, a: NodeId) -> Result<NodeId, AsmError>;
    fn ins2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> Result<NodeId, AsmError>;
    fn ins3(&mut self, op: Opcode, a: NodeId, b: NodeId, c: NodeId)
        -> Result<NodeId, AsmError>;

    fn imm_i(&mut self, value: i32) -> Result<NodeId, AsmError>;
    fn imm_q(&mut self, value: u64) -> Result<NodeId, AsmError>;
    fn imm_d(&mut self, value: f64) -> Result<NodeId, AsmError>;
    fn imm_f(&mut self, value: f32) -> Result<NodeId, AsmError>;
    fn imm_f4(&mut self, value: [f32; 4]) -> Result<NodeId, AsmError>;

    fn param(&mut self, op: Opcode, index: u32, kind: u32) -> Result<NodeId, AsmError>;
    fn alloc(&mut self, size: i32) -> Result<NodeId, AsmError>;

    fn load(&mut self, op: Opcode, base: NodeId, disp: i32, acc: AccSet)
        -> Result<NodeId, AsmError>;
    fn store(
        &mut self,
        op: Opcode,
        value: NodeId,
        base: NodeId,
        disp: i32,
        acc: AccSet,
    ) -> Result<NodeId, AsmError>;

    /// `args` in reverse source order, matching the stored payload.
    fn call(&mut self, sig: SigId, args: &[NodeId]) -> Result<NodeId, AsmError>;

    fn branch(
        &mut self,
        op: Opcode,
        cond: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError>;
    fn branch_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        target: Option<NodeId>,
    ) -> Result<NodeId, AsmError>;

    fn guard(&mut self, op: Opcode, cond: Option<NodeId>, exit: ExitId)
        -> Result<NodeId, AsmError>;
    fn guard_ov(
        &mut self,
        op: Opcode,
        lhs: NodeId,
        rhs: NodeId,
        exit: ExitId,
    ) -> Result<NodeId, AsmError>;

    /// Emits a `label` node. A distinct method because CSE must flush its
    /// table at control-flow join points.
    fn label(&mut self) -> Result<NodeId, AsmError>;
}

/// Composes the stage chain for one fragment.
///
/// Innermost first: writer, end-of-pipeline validator (debug + optimize),
/// tracer (verbose), CSE (optimize), soft-float lowering, simplifier
/// (optimize), start-of-pipeline validator (debug).
pub fn build_pipeline(buf: Rc<RefCell<LirBuffer>>, opts: &AsmOptions) -> Box<dyn LirSink> {
    let mut sink: Box<dyn LirSink> = Box::new(writer::BufWriter::new(buf.clone()));
    if opts.debug && opts.optimize {
        sink = Box::new(validate::ValidateWriter::new(
            sink,
            buf.clone(),
            "end of writer pipeline",
        ));
    }
    if opts.verbose {
        sink = Box::new(verbose::VerboseWriter::new(sink, buf.clone()));
    }
    if opts.optimize {
        sink = Box::new(cse::CseFilter::new(sink, buf.clone()));
    }
    if opts.soft_float {
        sink = Box::new(softfloat::SoftFloatFilter::new(sink, buf.clone()));
    }
    if opts.optimize {
        sink = Box::new(expr::ExprFilter::new(sink, buf.clone()));
    }
    if opts.debug {
        sink = Box::new(validate::ValidateWriter::new(
            sink,
            buf,
            "start of writer pipeline",
        ));
    }
    sink
}
