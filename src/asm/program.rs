//! The program driver.
//!
//! Owns the shared IR arena, the fragment registry, the opcode name table,
//! and the built-in function table; dispatches the top-level directives
//! (`.begin`/`.end`, the implicit `main` fragment, `.patch`) and hands
//! sealed fragments to the backend. The registries are plain values passed
//! into the constructor, so tests can run with a reduced or custom set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::asm::fragment::FragmentAssembler;
use crate::backend::{Backend, ExecValue};
use crate::error::{AsmError, Error};
use crate::ir::{
    opcode_table, Abi, Builtin, FragmentId, LirBuffer, NodeId, Opcode, Payload, ReturnKind,
    ValueKind,
};
use crate::lexer::{LirTokenStream, TokenKind};
use crate::AsmOptions;

/// A named built-in callable from IR text. The signature is cross-checked
/// against each call site: the ABI and argument count must match exactly.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub builtin: Builtin,
    pub abi: Abi,
    pub args: &'static [ValueKind],
    pub ret: ValueKind,
}

const I: ValueKind = ValueKind::I32;
const D: ValueKind = ValueKind::F64;
const F: ValueKind = ValueKind::F32;
const F4: ValueKind = ValueKind::F4;
const P: ValueKind = ValueKind::Ptr;
const V: ValueKind = ValueKind::Void;

/// The default built-in table: libc-ish helpers plus the mixed-type
/// call-stress functions.
pub fn builtin_table() -> Vec<BuiltinDef> {
    use Builtin::*;
    let defs: &[(&'static str, Builtin, &'static [ValueKind], ValueKind)] = &[
        ("puts", Puts, &[P], I),
        ("sin", Sin, &[D], D),
        ("malloc", Malloc, &[P], P),
        ("free", Free, &[P], V),
        ("printi", Printi, &[I], V),
        ("calld1", Calld1, &[D, D, D, D, D, D, D, D], D),
        ("callf1", Callf1, &[F, F, F, F, F, F, F, F], F),
        ("callid1", Callid1, &[I, D, D, I, I, D], D),
        ("callid2", Callid2, &[I, I, I, D], D),
        ("callid3", Callid3, &[I, I, D, I, D, D], D),
        ("callif1", Callif1, &[I, F, F, I, I, F], F),
        ("callif2", Callif2, &[I, I, I, F], F),
        ("callif3", Callif3, &[I, I, F, I, F, F], F),
        ("callif4_1", Callif41, &[I, F4, F4, I, I, F4], F4),
        ("callif4_2", Callif42, &[I, I, I, F4], F4),
        ("callif4_3", Callif43, &[I, I, F4, I, F4, F4], F4),
        ("callf4_sqrt", Callf4Sqrt, &[F4], F4),
        ("callf4_mt", Callf4Mt, &[F, I, D, F4, I, D, F, F4], F4),
    ];
    defs.iter()
        .map(|&(name, builtin, args, ret)| BuiltinDef {
            name,
            builtin,
            abi: Abi::Cdecl,
            args,
            ret,
        })
        .collect()
}

/// A sealed fragment: a contiguous node range in the arena plus dispatch
/// metadata. Mutated after sealing only through `.patch`.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub name: String,
    /// The fragment's `start` node.
    pub entry: NodeId,
    /// One past the fragment's last node.
    pub end: NodeId,
    /// The kind the fragment's result is decoded as. When a fragment
    /// recorded several return kinds, this is the last one seen.
    pub ret: ReturnKind,
    /// Snapshot of the fragment's value labels, for `.patch` lookups.
    pub labels: HashMap<String, NodeId>,
}

/// Resolution of a callee name at a call site.
pub enum FunctionRef<'a> {
    Builtin(&'a BuiltinDef),
    Fragment(FragmentId),
}

pub struct Program {
    pub buf: Rc<RefCell<LirBuffer>>,
    pub fragments: Vec<Fragment>,
    frag_names: HashMap<String, FragmentId>,
    op_map: HashMap<&'static str, Opcode>,
    builtins: Vec<BuiltinDef>,
    pub backend: Box<dyn Backend>,
    pub opts: AsmOptions,
    warnings: Vec<String>,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("fragments", &self.fragments)
            .field("opts", &self.opts)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl Program {
    /// A driver with the default opcode and built-in registries.
    pub fn new(opts: AsmOptions, backend: Box<dyn Backend>) -> Self {
        Self::with_registries(opts, opcode_table(), builtin_table(), backend)
    }

    pub fn with_registries(
        opts: AsmOptions,
        op_map: HashMap<&'static str, Opcode>,
        builtins: Vec<BuiltinDef>,
        backend: Box<dyn Backend>,
    ) -> Self {
        Program {
            buf: Rc::new(RefCell::new(LirBuffer::new())),
            fragments: Vec::new(),
            frag_names: HashMap::new(),
            op_map,
            builtins,
            backend,
            opts,
            warnings: Vec::new(),
        }
    }

    pub fn opcode(&self, name: &str) -> Option<Opcode> {
        self.op_map.get(name).copied()
    }

    /// Built-ins shadow fragments, as at a call site.
    pub fn lookup_function(&self, name: &str) -> Option<FunctionRef<'_>> {
        if let Some(def) = self.builtins.iter().find(|d| d.name == name) {
            return Some(FunctionRef::Builtin(def));
        }
        self.frag_names.get(name).copied().map(FunctionRef::Fragment)
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.frag_names.get(name).map(|id| &self.fragments[id.0 as usize])
    }

    /// Registers a fragment record at assembly start. Re-registering a name
    /// points it at the new fragment; the old one stays runnable through
    /// already-patched guards.
    pub(crate) fn register_fragment(&mut self, name: &str, entry: NodeId) -> FragmentId {
        let id = FragmentId(self.fragments.len() as u32);
        self.fragments.push(Fragment {
            name: name.to_string(),
            entry,
            end: entry,
            ret: ReturnKind::Guard,
            labels: HashMap::new(),
        });
        self.frag_names.insert(name.to_string(), id);
        id
    }

    pub(crate) fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Assembles a whole source text: directives at the top level, or an
    /// implicit `main` fragment when the text leads with a bare
    /// instruction stream. Bare opcodes are only legal before the first
    /// `.begin`; the implicit fragment consumes the rest of the input.
    pub fn assemble(&mut self, source: &str) -> Result<(), Error> {
        let mut ts = LirTokenStream::new(source);
        let mut first = true;
        while let Some(token) = ts.get()? {
            match token.kind {
                TokenKind::Newline => {}
                TokenKind::Name if token.text == ".begin" => {
                    let name = ts.get_name()?.ok_or(AsmError::BeginNeedsName)?;
                    if !ts.eat(TokenKind::Newline, None)? {
                        return Err(AsmError::ExtraJunk {
                            directive: ".begin".to_string(),
                        }
                        .into());
                    }
                    let mut frag = FragmentAssembler::new(self, &name)?;
                    frag.assemble(self, &mut ts, false, None)?;
                    first = false;
                }
                TokenKind::Name if token.text == ".end" => {
                    return Err(AsmError::StrayEnd.into());
                }
                TokenKind::Name if token.text == ".patch" => {
                    self.handle_patch(&mut ts)?;
                }
                TokenKind::Name => {
                    if !first {
                        return Err(AsmError::StrayOpcode { name: token.text }.into());
                    }
                    let mut frag = FragmentAssembler::new(self, "main")?;
                    frag.assemble(self, &mut ts, true, Some(token))?;
                }
                _ => {
                    return Err(AsmError::UnexpectedToken { text: token.text }.into());
                }
            }
        }
        Ok(())
    }

    /// Generates and assembles a random `main` fragment of roughly
    /// `n_ins` instructions.
    pub fn assemble_random(&mut self, n_ins: usize, seed: u64) -> Result<(), Error> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut frag = FragmentAssembler::new(self, "main")?;
        frag.assemble_random(self, n_ins, &mut rng)
    }

    /// `.patch SRC.GUARD -> DEST`: retargets a named guard in an already
    /// compiled fragment to transfer into another compiled fragment.
    fn handle_patch(&mut self, ts: &mut LirTokenStream<'_>) -> Result<(), Error> {
        let src = ts.get_name()?.ok_or(AsmError::PatchSyntax)?;
        if !ts.eat(TokenKind::Punct, Some("->"))? {
            return Err(AsmError::PatchSyntax.into());
        }
        let dest = ts.get_name()?.ok_or(AsmError::PatchSyntax)?;

        // SRC is FRAG.GUARD; the dot must be interior.
        let dot = match src.find('.') {
            Some(i) if i > 0 && i < src.len() - 1 => i,
            _ => return Err(AsmError::PatchSyntax.into()),
        };
        let (frag_name, guard_name) = (&src[..dot], &src[dot + 1..]);

        let frag = self
            .fragment(frag_name)
            .ok_or_else(|| AsmError::UnknownFragment {
                name: frag_name.to_string(),
            })?;
        let guard = *frag
            .labels
            .get(guard_name)
            .ok_or_else(|| AsmError::UnknownGuard {
                name: guard_name.to_string(),
            })?;
        let dest_id = match self.frag_names.get(&dest) {
            Some(id) => *id,
            None => return Err(AsmError::UnknownFragment { name: dest }.into()),
        };

        let exit = {
            let buf = self.buf.borrow();
            match buf.node(guard).payload {
                Payload::Guard { exit, .. } => exit,
                Payload::GuardOv { exit, .. } => exit,
                _ => {
                    return Err(AsmError::NotAGuard {
                        name: guard_name.to_string(),
                    }
                    .into())
                }
            }
        };
        self.buf.borrow_mut().set_exit_target(exit, dest_id);
        self.backend
            .patch(&self.buf.borrow(), &self.fragments, exit)?;
        Ok(())
    }

    /// Runs a compiled fragment by name.
    pub fn run(&mut self, name: &str) -> Result<ExecValue, Error> {
        let id = *self
            .frag_names
            .get(name)
            .ok_or_else(|| AsmError::UnknownFragment {
                name: name.to_string(),
            })?;
        let result = self
            .backend
            .run(&self.buf.borrow(), &self.fragments, id)?;
        Ok(result)
    }
}
