//! The per-fragment assembler.
//!
//! Consumes one statement per line: an optional jump label (`name:`), an
//! optional value label (`name =`), an opcode, and operand tokens whose
//! shape is fixed by the opcode's arity class. Jumps to not-yet-seen labels
//! are recorded and resolved at fragment close; closing also emits the
//! final exit guard and hands the fragment to the backend.

use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use super::program::{FunctionRef, Program};
use crate::error::{AsmError, Error};
use crate::ir::{
    Abi, AccSet, ArityClass, CallSig, Callee, ExitId, FragmentId, LirBuffer, NodeId, Opcode,
    ReturnKind, ReturnSet, SideExit, ValueKind,
};
use crate::lexer::{LirTokenStream, Token, TokenKind};
use crate::pipeline::{build_pipeline, LirSink};

/// Callee-saved registers exposed as implicit parameters at fragment entry.
const NUM_SAVED_REGS: u32 = 4;

/// Most arguments a call instruction may carry.
const MAX_ARGS: usize = 8;

pub struct FragmentAssembler {
    pub(crate) name: String,
    pub(crate) id: FragmentId,
    pub(crate) buf: Rc<RefCell<LirBuffer>>,
    pub(crate) lir: Box<dyn LirSink>,
    /// Value labels: `name = op ...` operand references.
    labels: HashMap<String, NodeId>,
    /// Jump labels: `name:` branch targets.
    jump_labels: HashMap<String, NodeId>,
    /// Branches waiting for their target label.
    jumps: Vec<(String, NodeId)>,
    pub(crate) ret_bits: ReturnSet,
    pub(crate) last_return: ReturnKind,
    pub(crate) lineno: u32,
    /// Operand tokens of the statement being assembled.
    tokens: Vec<String>,
}

fn ret_kind(op: Opcode) -> Option<ReturnKind> {
    match op {
        Opcode::RetI => Some(ReturnKind::I32),
        Opcode::RetQ => Some(ReturnKind::I64),
        Opcode::RetD => Some(ReturnKind::F64),
        Opcode::RetF => Some(ReturnKind::F32),
        Opcode::RetF4 => Some(ReturnKind::F4),
        _ => None,
    }
}

/// The load displacement must look like a literal, not a label.
fn looks_like_literal(text: &str) -> bool {
    text.starts_with("0x")
        || text.starts_with("0X")
        || text.chars().next().map_or(false, |c| c.is_ascii_digit())
}

impl FragmentAssembler {
    pub(crate) fn new(program: &mut Program, name: &str) -> Result<Self, Error> {
        let buf = program.buf.clone();
        let entry = NodeId(buf.borrow().len());
        let id = program.register_fragment(name, entry);

        let mut lir = build_pipeline(buf.clone(), &program.opts);
        lir.ins0(Opcode::Start)?;
        let param_op = if cfg!(target_pointer_width = "64") {
            Opcode::ParamQ
        } else {
            Opcode::ParamI
        };
        for i in 0..NUM_SAVED_REGS {
            lir.param(param_op, i, 1)?;
        }

        Ok(FragmentAssembler {
            name: name.to_string(),
            id,
            buf,
            lir,
            labels: HashMap::new(),
            jump_labels: HashMap::new(),
            jumps: Vec::new(),
            ret_bits: ReturnSet::default(),
            last_return: ReturnKind::Guard,
            lineno: 0,
            tokens: Vec::new(),
        })
    }

    /// Assembles statements until `.end` (explicit fragments) or end of
    /// input (the implicit `main`), then seals the fragment.
    pub(crate) fn assemble(
        &mut self,
        program: &mut Program,
        ts: &mut LirTokenStream<'_>,
        implicit: bool,
        first: Option<Token>,
    ) -> Result<(), Error> {
        let mut first = first;
        loop {
            let token = match first.take() {
                Some(t) => t,
                None => match ts.get()? {
                    Some(t) => t,
                    None => {
                        if !implicit {
                            return Err(AsmError::UnexpectedEof {
                                name: self.name.clone(),
                            }
                            .into());
                        }
                        break;
                    }
                },
            };
            match token.kind {
                TokenKind::Newline => continue,
                TokenKind::Name => {}
                _ => return Err(AsmError::UnexpectedToken { text: token.text }.into()),
            }
            if token.text == ".begin" {
                return Err(AsmError::NestedBegin.into());
            }
            if token.text == ".end" {
                if implicit {
                    return Err(AsmError::StrayEnd.into());
                }
                if !ts.eat(TokenKind::Newline, None)? {
                    return Err(AsmError::ExtraJunk {
                        directive: ".end".to_string(),
                    }
                    .into());
                }
                break;
            }

            self.lineno = token.line;
            self.tokenize_line(ts, token)?;
            self.statement(program)?;
        }
        self.finish(program)
    }

    /// Collects the rest of the line's token texts after the leading name.
    fn tokenize_line(&mut self, ts: &mut LirTokenStream<'_>, first: Token) -> Result<(), Error> {
        self.tokens.clear();
        self.tokens.push(first.text);
        while let Some(token) = ts.get()? {
            if token.kind == TokenKind::Newline {
                break;
            }
            self.tokens.push(token.text);
        }
        Ok(())
    }

    /// Strips a leading `name <delim>` pair off the token line, checking it
    /// against the value-label table.
    fn extract_label(&mut self, delim: &str) -> Result<Option<String>, AsmError> {
        if self.tokens.len() > 2 && self.tokens[1] == delim {
            let lab = self.tokens.remove(0);
            self.tokens.remove(0);
            if self.labels.contains_key(&lab) {
                return Err(AsmError::DuplicateLabel {
                    line: self.lineno,
                    name: lab,
                });
            }
            return Ok(Some(lab));
        }
        Ok(None)
    }

    fn add_jump_label(&mut self, lab: String, ins: NodeId) -> Result<(), AsmError> {
        if self.jump_labels.contains_key(&lab) {
            return Err(AsmError::DuplicateJumpLabel {
                line: self.lineno,
                name: lab,
            });
        }
        self.jump_labels.insert(lab, ins);
        Ok(())
    }

    fn need(&self, n: usize) -> Result<(), AsmError> {
        if self.tokens.len() != n {
            return Err(AsmError::TokenCount {
                line: self.lineno,
                want: n,
                have: self.tokens.len(),
            });
        }
        Ok(())
    }

    /// Resolves a value-label reference.
    fn ref_name(&self, name: &str) -> Result<NodeId, AsmError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::UnknownLabel {
                line: self.lineno,
                name: name.to_string(),
            })
    }

    fn ref_at(&self, i: usize) -> Result<NodeId, AsmError> {
        self.ref_name(&self.tokens[i])
    }

    fn bad_literal(&self, text: &str) -> AsmError {
        AsmError::BadLiteral {
            line: self.lineno,
            text: text.to_string(),
        }
    }

    fn parse_i(&self, text: &str) -> Result<i32, AsmError> {
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(|v| v as i32)
                .map_err(|_| self.bad_literal(text));
        }
        text.parse::<i64>()
            .map(|v| v as i32)
            .map_err(|_| self.bad_literal(text))
    }

    fn parse_q(&self, text: &str) -> Result<u64, AsmError> {
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16).map_err(|_| self.bad_literal(text));
        }
        if let Ok(v) = text.parse::<u64>() {
            return Ok(v);
        }
        text.parse::<i64>()
            .map(|v| v as u64)
            .map_err(|_| self.bad_literal(text))
    }

    fn parse_d(&self, text: &str) -> Result<f64, AsmError> {
        text.parse::<f64>().map_err(|_| self.bad_literal(text))
    }

    fn parse_f(&self, text: &str) -> Result<f32, AsmError> {
        text.parse::<f32>().map_err(|_| self.bad_literal(text))
    }

    pub(crate) fn create_exit(&mut self) -> ExitId {
        self.buf.borrow_mut().add_exit(SideExit {
            line: self.lineno,
            from: self.id,
            target: None,
        })
    }

    /// Assembles the tokenized statement currently in `self.tokens`.
    fn statement(&mut self, program: &mut Program) -> Result<(), Error> {
        if let Some(lab) = self.extract_label(":")? {
            let ins = self.lir.label()?;
            self.add_jump_label(lab, ins)?;
        }
        let mut value_label = self.extract_label("=")?;

        let op_name = self.tokens.remove(0);
        let opcode = program
            .opcode(&op_name)
            .ok_or_else(|| AsmError::UnknownOpcode {
                line: self.lineno,
                name: op_name.clone(),
            })?;

        let ins = match opcode.arity_class() {
            ArityClass::Rejected => {
                return Err(match opcode {
                    Opcode::Start => AsmError::ExplicitStart { line: self.lineno },
                    _ => AsmError::Unsupported {
                        line: self.lineno,
                        op: op_name,
                    },
                }
                .into());
            }
            ArityClass::None => {
                self.need(0)?;
                self.lir.ins0(opcode)?
            }
            ArityClass::Label => {
                // `lab = label` binds a jump label, not a value label.
                self.need(0)?;
                let ins = self.lir.label()?;
                if let Some(lab) = value_label.take() {
                    self.add_jump_label(lab, ins)?;
                }
                ins
            }
            ArityClass::Unary => {
                self.need(1)?;
                let a = self.ref_at(0)?;
                if let Some(kind) = ret_kind(opcode) {
                    self.ret_bits.insert(kind);
                    self.last_return = kind;
                }
                self.lir.ins1(opcode, a)?
            }
            ArityClass::Binary => {
                self.need(2)?;
                let a = self.ref_at(0)?;
                let b = self.ref_at(1)?;
                self.lir.ins2(opcode, a, b)?
            }
            ArityClass::Ternary => {
                self.need(3)?;
                let a = self.ref_at(0)?;
                let b = self.ref_at(1)?;
                let c = self.ref_at(2)?;
                self.lir.ins3(opcode, a, b, c)?
            }
            ArityClass::Immediate => {
                self.need(1)?;
                match opcode {
                    Opcode::ImmI => {
                        let v = self.parse_i(&self.tokens[0])?;
                        self.lir.imm_i(v)?
                    }
                    Opcode::ImmQ => {
                        let v = self.parse_q(&self.tokens[0])?;
                        self.lir.imm_q(v)?
                    }
                    Opcode::ImmD => {
                        let v = self.parse_d(&self.tokens[0])?;
                        self.lir.imm_d(v)?
                    }
                    Opcode::ImmF => {
                        let v = self.parse_f(&self.tokens[0])?;
                        self.lir.imm_f(v)?
                    }
                    _ => {
                        let v = self.parse_i(&self.tokens[0])?;
                        self.lir.alloc(v)?
                    }
                }
            }
            ArityClass::ImmediateF4 => {
                self.need(4)?;
                let v = [
                    self.parse_f(&self.tokens[0])?,
                    self.parse_f(&self.tokens[1])?,
                    self.parse_f(&self.tokens[2])?,
                    self.parse_f(&self.tokens[3])?,
                ];
                self.lir.imm_f4(v)?
            }
            ArityClass::Param => {
                self.need(2)?;
                let index = self.parse_i(&self.tokens[0])? as u32;
                let kind = self.parse_i(&self.tokens[1])? as u32;
                self.lir.param(opcode, index, kind)?
            }
            ArityClass::Load => {
                self.need(2)?;
                if !looks_like_literal(&self.tokens[1]) {
                    return Err(AsmError::LoadNeedsImmediate { line: self.lineno }.into());
                }
                let base = self.ref_at(0)?;
                let disp = self.parse_i(&self.tokens[1])?;
                self.lir.load(opcode, base, disp, AccSet::Other)?
            }
            ArityClass::Store => {
                self.need(3)?;
                let value = self.ref_at(0)?;
                let base = self.ref_at(1)?;
                let disp = self.parse_i(&self.tokens[2])?;
                self.lir.store(opcode, value, base, disp, AccSet::Other)?
            }
            ArityClass::Jump => self.assemble_jump(opcode)?,
            ArityClass::JumpOv => self.assemble_jump_ov(opcode)?,
            ArityClass::Guard => self.assemble_guard(opcode)?,
            ArityClass::GuardOv => self.assemble_guard_ov(opcode)?,
            ArityClass::Call => self.assemble_call(program, opcode)?,
        };

        if let Some(lab) = value_label {
            self.labels.insert(lab, ins);
        }
        Ok(())
    }

    fn assemble_jump(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        let (cond, target_name) = if op == Opcode::J {
            self.need(1)?;
            (None, self.tokens[0].clone())
        } else {
            self.need(2)?;
            (Some(self.ref_at(0)?), self.tokens[1].clone())
        };
        let ins = self.lir.branch(op, cond, None)?;
        self.jumps.push((target_name, ins));
        Ok(ins)
    }

    fn assemble_jump_ov(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.need(3)?;
        let a = self.ref_at(0)?;
        let b = self.ref_at(1)?;
        let target_name = self.tokens[2].clone();
        let ins = self.lir.branch_ov(op, a, b, None)?;
        self.jumps.push((target_name, ins));
        Ok(ins)
    }

    fn assemble_guard(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        let cond = if matches!(op, Opcode::Xt | Opcode::Xf) {
            self.need(1)?;
            Some(self.ref_at(0)?)
        } else {
            self.need(0)?;
            None
        };
        let exit = self.create_exit();
        self.ret_bits.insert(ReturnKind::Guard);
        self.last_return = ReturnKind::Guard;
        self.lir.guard(op, cond, exit)
    }

    fn assemble_guard_ov(&mut self, op: Opcode) -> Result<NodeId, AsmError> {
        self.need(2)?;
        let a = self.ref_at(0)?;
        let b = self.ref_at(1)?;
        let exit = self.create_exit();
        self.ret_bits.insert(ReturnKind::Guard);
        self.last_return = ReturnKind::Guard;
        self.lir.guard_ov(op, a, b, exit)
    }

    fn assemble_call(&mut self, program: &Program, op: Opcode) -> Result<NodeId, AsmError> {
        // call syntax: callee name, ABI, then arguments.
        if self.tokens.len() < 2 {
            return Err(AsmError::CallTooShort {
                line: self.lineno,
                op: op.name().to_string(),
            });
        }
        let func = self.tokens.remove(0);
        let abi_name = self.tokens.remove(0);
        let abi = Abi::from_name(&abi_name).ok_or_else(|| AsmError::BadAbi {
            line: self.lineno,
            name: abi_name,
        })?;
        if self.tokens.len() > MAX_ARGS {
            return Err(AsmError::TooManyArgs {
                line: self.lineno,
                op: op.name().to_string(),
            });
        }

        // Argument nodes, last argument first.
        let mut args = Vec::with_capacity(self.tokens.len());
        for name in self.tokens.iter().rev() {
            args.push(self.ref_name(name)?);
        }

        let sig = match program.lookup_function(&func) {
            Some(FunctionRef::Builtin(def)) => {
                if abi != def.abi {
                    return Err(AsmError::AbiMismatch {
                        line: self.lineno,
                        func,
                    });
                }
                if args.len() != def.args.len() {
                    return Err(AsmError::ArgCountMismatch {
                        line: self.lineno,
                        func,
                    });
                }
                CallSig {
                    name: func,
                    abi,
                    args: def.args.to_vec(),
                    ret: def.ret,
                    callee: Callee::Builtin(def.builtin),
                }
            }
            Some(FunctionRef::Fragment(fid)) => {
                // Infer the signature from the call site.
                let buf = self.buf.borrow();
                let kinds = args
                    .iter()
                    .rev()
                    .map(|&a| {
                        let k = buf.node(a).kind();
                        match k {
                            ValueKind::F64 | ValueKind::F32 | ValueKind::F4 => k,
                            k if k.is_quad() => ValueKind::I64,
                            _ => ValueKind::I32,
                        }
                    })
                    .collect();
                drop(buf);
                let ret = match op {
                    Opcode::CallV => ValueKind::Void,
                    Opcode::CallI => ValueKind::I32,
                    Opcode::CallQ => ValueKind::I64,
                    Opcode::CallD => ValueKind::F64,
                    Opcode::CallF => ValueKind::F32,
                    _ => ValueKind::F4,
                };
                CallSig {
                    name: func,
                    abi,
                    args: kinds,
                    ret,
                    callee: Callee::Fragment(fid),
                }
            }
            None => return Err(AsmError::UnknownCallee { name: func }),
        };

        let sig_id = self.buf.borrow_mut().add_sig(sig);
        self.lir.call(sig_id, &args)
    }

    /// Seals the fragment: resolves pending jumps, reports return-type
    /// diagnostics, appends the final exit guard, records the node range
    /// and label snapshot, and compiles through the backend.
    pub(crate) fn finish(&mut self, program: &mut Program) -> Result<(), Error> {
        for (name, ins) in &self.jumps {
            let target = self
                .jump_labels
                .get(name)
                .copied()
                .ok_or_else(|| AsmError::UnresolvedJump { name: name.clone() })?;
            self.buf.borrow_mut().set_branch_target(*ins, target);
        }

        if self.ret_bits.is_empty() {
            program.warn(format!("no return type in fragment '{}'", self.name));
        } else if !self.ret_bits.is_single() {
            program.warn(format!("multiple return types in fragment '{}'", self.name));
        }

        let exit = self.create_exit();
        self.lir.guard(Opcode::X, None, exit)?;

        let end = NodeId(self.buf.borrow().len());
        let record = &mut program.fragments[self.id.0 as usize];
        record.end = end;
        record.ret = self.last_return;
        record.labels = self.labels.clone();

        program
            .backend
            .compile(&program.buf.borrow(), &program.fragments, self.id)?;
        Ok(())
    }
}
