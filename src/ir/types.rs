//! Value categories, calling conventions, and the return-type accumulator.

/// Static type tag carried by every IR node that produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit integer (also the representation of booleans: 0 or 1).
    I32,
    /// 64-bit integer.
    I64,
    /// 64-bit IEEE double.
    F64,
    /// 32-bit IEEE float.
    F32,
    /// 4-lane packed float vector.
    F4,
    /// Pointer-sized value produced by stack allocation.
    Ptr,
    /// No value (stores, branches, returns, void calls).
    Void,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueKind::I32 => "i",
            ValueKind::I64 => "q",
            ValueKind::F64 => "d",
            ValueKind::F32 => "f",
            ValueKind::F4 => "f4",
            ValueKind::Ptr => "p",
            ValueKind::Void => "v",
        };
        f.write_str(s)
    }
}

impl ValueKind {
    /// Pointer-sized values are interchangeable with 64-bit integers
    /// for operand typing purposes.
    pub fn is_quad(self) -> bool {
        matches!(self, ValueKind::I64 | ValueKind::Ptr)
    }
}

/// Calling convention a call site must declare and a callee must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    Cdecl,
    Fastcall,
    Stdcall,
    Thiscall,
}

impl Abi {
    /// Parses the ABI token of a call instruction.
    pub fn from_name(name: &str) -> Option<Abi> {
        match name {
            "cdecl" => Some(Abi::Cdecl),
            "fastcall" => Some(Abi::Fastcall),
            "stdcall" => Some(Abi::Stdcall),
            "thiscall" => Some(Abi::Thiscall),
            _ => None,
        }
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Abi::Cdecl => "cdecl",
            Abi::Fastcall => "fastcall",
            Abi::Stdcall => "stdcall",
            Abi::Thiscall => "thiscall",
        };
        f.write_str(s)
    }
}

/// Access-region tag attached to loads and stores. Textual IR has no way
/// to spell a region, so the assembler only ever emits `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccSet {
    Other,
}

/// The kind of exit a fragment dispatches on once sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    I32,
    I64,
    F64,
    F32,
    F4,
    /// The fragment leaves through a guard side exit.
    Guard,
}

impl ReturnKind {
    fn bit(self) -> u8 {
        match self {
            ReturnKind::I32 => 1,
            ReturnKind::I64 => 2,
            ReturnKind::F64 => 4,
            ReturnKind::F32 => 8,
            ReturnKind::F4 => 16,
            ReturnKind::Guard => 32,
        }
    }
}

/// Bitmask accumulator OR-ed with each return/guard opcode seen in a
/// fragment. Used only as a diagnostic: zero or multiple bits produce a
/// warning, never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnSet(u8);

impl ReturnSet {
    pub fn insert(&mut self, kind: ReturnKind) {
        self.0 |= kind.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if exactly one return kind was recorded.
    pub fn is_single(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0
    }
}

/// Identifies a built-in native function callable from IR text, or one of
/// the fixed-arity helpers used internally by the random generator and the
/// soft-float lowering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Named built-ins reachable from IR text.
    Puts,
    Sin,
    Malloc,
    Free,
    Printi,
    Calld1,
    Callf1,
    Callid1,
    Callid2,
    Callid3,
    Callif1,
    Callif2,
    Callif3,
    Callif41,
    Callif42,
    Callif43,
    Callf4Sqrt,
    Callf4Mt,

    // Fixed-arity test helpers used by the random generator.
    TestII1,
    TestII6,
    TestQQ2,
    TestQQ7,
    TestDD3,
    TestDD8,
    TestVIQD,

    // Soft-float helpers emitted by the lowering stage.
    SfNegD,
    SfAddD,
    SfSubD,
    SfMulD,
    SfDivD,
    SfI2D,
    SfUi2D,
    SfD2I,
    SfD2F,
    SfF2D,
    SfEqD,
    SfLtD,
    SfGtD,
    SfLeD,
    SfGeD,
}
