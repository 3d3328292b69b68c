use thiserror::Error;

/// Top-level error type for the LASM assembly pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[lexical error] {0}")]
    Parse(#[from] ParseError),

    #[error("[assembly error] {0}")]
    Asm(#[from] AsmError),

    #[error("[backend error] {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Lexical errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unrecognized character '{ch}'")]
    UnrecognizedChar { ch: char, line: u32 },
}

// ---------------------------------------------------------------------------
// Assembly errors (syntax + semantic)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("line {line}: need {want} tokens, have {have}")]
    TokenCount { line: u32, want: usize, have: usize },

    #[error("line {line}: unknown instruction '{name}'")]
    UnknownOpcode { line: u32, name: String },

    #[error("line {line}: unknown label '{name}'")]
    UnknownLabel { line: u32, name: String },

    #[error("line {line}: duplicate label '{name}'")]
    DuplicateLabel { line: u32, name: String },

    #[error("line {line}: label '{name}' found at multiple locations")]
    DuplicateJumpLabel { line: u32, name: String },

    #[error("no label exists for jump target '{name}'")]
    UnresolvedJump { name: String },

    #[error("line {line}: bad call ABI name '{name}'")]
    BadAbi { line: u32, name: String },

    #[error("line {line}: invalid calling convention for {func}")]
    AbiMismatch { line: u32, func: String },

    #[error("line {line}: wrong number of arguments for {func}")]
    ArgCountMismatch { line: u32, func: String },

    #[error("line {line}: too many args to {op}")]
    TooManyArgs { line: u32, op: String },

    #[error("line {line}: need at least address and ABI code for {op}")]
    CallTooShort { line: u32, op: String },

    #[error("invalid function reference {name}")]
    UnknownCallee { name: String },

    #[error("line {line}: immediate offset required for load")]
    LoadNeedsImmediate { line: u32 },

    #[error("line {line}: bad literal '{text}'")]
    BadLiteral { line: u32, text: String },

    #[error("line {line}: start instructions cannot be specified explicitly")]
    ExplicitStart { line: u32 },

    #[error("line {line}: '{op}' not supported, sorry")]
    Unsupported { line: u32, op: String },

    #[error("nested fragments are not supported")]
    NestedBegin,

    #[error(".end without .begin")]
    StrayEnd,

    #[error("expected fragment name after .begin")]
    BeginNeedsName,

    #[error("extra junk after {directive}")]
    ExtraJunk { directive: String },

    #[error("unexpected end of file in fragment '{name}'")]
    UnexpectedEof { name: String },

    #[error("unexpected token '{text}'")]
    UnexpectedToken { text: String },

    #[error("unexpected stray opcode '{name}'")]
    StrayOpcode { name: String },

    #[error("incorrect .patch syntax, expected '.patch FRAG.GUARD -> DEST'")]
    PatchSyntax,

    #[error("invalid fragment reference '{name}'")]
    UnknownFragment { name: String },

    #[error("invalid guard reference '{name}'")]
    UnknownGuard { name: String },

    #[error("'{name}' does not name a guard instruction")]
    NotAGuard { name: String },

    #[error("{stage}: {detail}")]
    Validate { stage: &'static str, detail: String },
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// Error kinds the external code generator may report from `compile()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// A branch target is outside the encodable displacement range.
    BranchTooFar,
    /// The fragment's stack frame exceeds the backend's limit.
    StackFull,
    /// A branch whose target was never set survived to compilation.
    UnknownBranch,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendErrorKind::BranchTooFar => f.write_str("BranchTooFar"),
            BackendErrorKind::StackFull => f.write_str("StackFull"),
            BackendErrorKind::UnknownBranch => f.write_str("UnknownBranch"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("error during assembly of fragment '{fragment}': {kind}")]
    Compile {
        fragment: String,
        kind: BackendErrorKind,
    },

    #[error("fragment '{fragment}' was never compiled")]
    NotCompiled { fragment: String },

    #[error("runtime error in fragment '{fragment}': {detail}")]
    Runtime { fragment: String, detail: String },
}
